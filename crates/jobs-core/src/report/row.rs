//! RFC 6901 JSON Pointer resolution and per-job row construction.

use serde_json::Value;

use crate::report::config::ReportConfig;

/// Resolves a JSON Pointer against `value`. Missing tokens resolve to an
/// empty string value rather than erroring; the pointer grammar is small
/// enough not to warrant an external crate.
pub fn resolve_pointer(value: &Value, pointer: &str) -> Value {
    if pointer.is_empty() {
        return value.clone();
    }
    if !pointer.starts_with('/') {
        return Value::String(String::new());
    }

    let mut current = value;
    for raw_token in pointer[1..].split('/') {
        let token = raw_token.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Object(map) => match map.get(&token) {
                Some(v) => v,
                None => return Value::String(String::new()),
            },
            Value::Array(arr) => match token.parse::<usize>().ok().and_then(|i| arr.get(i)) {
                Some(v) => v,
                None => return Value::String(String::new()),
            },
            _ => return Value::String(String::new()),
        };
    }
    current.clone()
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builds one report row for a finished job. `fail_kind` is `None` for
/// successes and for failures without a declared kind.
///
/// The `errorMappings` sentinel looks up a label by key in `error_mappings`,
/// falling back to the built-in defaults `"success" -> "Success"` and
/// `"unknown" -> "Other Error"` when the caller hasn't overridden them.
pub fn build_row(job: &Value, fail_kind: Option<&str>, is_success: bool, config: &ReportConfig) -> Value {
    let mut labels = std::collections::HashMap::from([
        ("success".to_string(), "Success".to_string()),
        ("unknown".to_string(), "Other Error".to_string()),
    ]);
    labels.extend(config.error_mappings.clone());

    let mut row = serde_json::Map::new();
    for (col, pointer) in &config.job_mappings {
        let cell = if pointer == "errorMappings" {
            let key = if is_success { "success" } else { fail_kind.unwrap_or("unknown") };
            labels.get(key).cloned().unwrap_or_else(|| labels["unknown"].clone())
        } else {
            value_to_cell(&resolve_pointer(job, pointer))
        };
        row.insert(col.clone(), Value::String(cell));
    }
    Value::Object(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_field() {
        let doc = serde_json::json!({"config": {"weight": 42}});
        assert_eq!(resolve_pointer(&doc, "/config/weight"), serde_json::json!(42));
    }

    #[test]
    fn missing_token_resolves_empty_string() {
        let doc = serde_json::json!({"config": {}});
        assert_eq!(resolve_pointer(&doc, "/config/missing"), serde_json::json!(""));
    }

    #[test]
    fn empty_pointer_resolves_whole_document() {
        let doc = serde_json::json!({"a": 1});
        assert_eq!(resolve_pointer(&doc, ""), doc);
    }

    #[test]
    fn array_index_resolution() {
        let doc = serde_json::json!({"items": [1, 2, 3]});
        assert_eq!(resolve_pointer(&doc, "/items/1"), serde_json::json!(2));
    }

    #[test]
    fn escape_sequences_are_honored() {
        let doc = serde_json::json!({"a/b": "slash", "c~d": "tilde"});
        assert_eq!(resolve_pointer(&doc, "/a~1b"), serde_json::json!("slash"));
        assert_eq!(resolve_pointer(&doc, "/c~0d"), serde_json::json!("tilde"));
    }

    #[test]
    fn error_mappings_sentinel_picks_label_by_fail_kind() {
        let config = ReportConfig {
            job_mappings: vec![("outcome".to_string(), "errorMappings".to_string())],
            error_mappings: [("timeout".to_string(), "Timed Out".to_string())]
                .into_iter()
                .collect(),
            frequency: "0 0 * * * *".to_string(),
            job_type: None,
            downstream_service: "email-service".to_string(),
            send_empty: false,
        };
        let job = serde_json::json!({});
        let success_row = build_row(&job, None, true, &config);
        assert_eq!(success_row["outcome"], "Success");

        let known_failure = build_row(&job, Some("timeout"), false, &config);
        assert_eq!(known_failure["outcome"], "Timed Out");

        let unknown_failure = build_row(&job, Some("weird"), false, &config);
        assert_eq!(unknown_failure["outcome"], "Other Error");
    }

    #[test]
    fn error_mappings_sentinel_honors_overridden_defaults() {
        let config = ReportConfig {
            job_mappings: vec![("status".to_string(), "errorMappings".to_string())],
            error_mappings: [
                ("success".to_string(), "OK".to_string()),
                ("unknown".to_string(), "Other".to_string()),
            ]
            .into_iter()
            .collect(),
            frequency: "0 0 * * * *".to_string(),
            job_type: None,
            downstream_service: "email-service".to_string(),
            send_empty: false,
        };
        let job = serde_json::json!({});

        let success_row = build_row(&job, None, true, &config);
        assert_eq!(success_row["status"], "OK");

        let generic_failure = build_row(&job, None, false, &config);
        assert_eq!(generic_failure["status"], "Other");
    }
}
