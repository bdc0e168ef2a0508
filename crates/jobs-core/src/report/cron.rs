//! Cron-driven aggregation: window computation, CSV rendering, and
//! submission of the resulting email-send job to the downstream service.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::report::config::{EmailTemplate, ReportConfig};
use crate::store::{paths, StoreClient};

/// Every calendar day (UTC) touched by `[start, end)`, inclusive of both ends.
pub fn days_overlapping(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = start.date_naive();
    let last = end.date_naive();
    while day <= last {
        days.push(day);
        day += ChronoDuration::days(1);
    }
    days
}

/// Reads one day's report rows, excluding keys whose embedded ULID
/// timestamp falls on or after midnight of the following day (late writes).
pub async fn read_day_rows(
    store: &dyn StoreClient,
    service: &str,
    report_name: &str,
    day: NaiveDate,
) -> Result<Vec<Value>> {
    let path = paths::report_day_index(service, report_name, &day.format("%Y-%m-%d").to_string());
    let doc = match store.get(&path).await {
        Ok(doc) => doc,
        Err(_) => return Ok(Vec::new()),
    };
    let Some(entries) = doc.data.as_object() else {
        return Ok(Vec::new());
    };

    let cutoff = Utc
        .from_utc_datetime(&(day + ChronoDuration::days(1)).and_hms_opt(0, 0, 0).unwrap())
        .timestamp_millis() as u64;

    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort();

    let mut rows = Vec::new();
    for key in keys {
        if let Ok(ulid) = Ulid::from_string(key) {
            if ulid.timestamp_ms() >= cutoff {
                continue;
            }
        }
        rows.push(entries[key].clone());
    }
    Ok(rows)
}

/// Renders rows to CSV with a header row taken from `job_mappings` order.
pub fn render_csv(rows: &[Value], config: &ReportConfig) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let columns: Vec<&str> = config.job_mappings.iter().map(|(c, _)| c.as_str()).collect();
    writer.write_record(&columns)?;
    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|col| row.get(col).and_then(|v| v.as_str()).unwrap_or("").to_string())
            .collect();
        writer.write_record(&record)?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Csv(e.to_string()))
}

/// Builds the email-job document for the downstream email service and
/// links it under that service's `pending` list.
pub async fn submit_email_job(
    store: &dyn StoreClient,
    downstream_service: &str,
    mut template: EmailTemplate,
    csv_bytes: &[u8],
) -> Result<()> {
    template.validate()?;
    if let Some(attachment) = template.attachments.first_mut() {
        attachment.content = BASE64.encode(csv_bytes);
    }

    let job_doc = serde_json::json!({
        "service": downstream_service,
        "type": "email",
        "config": {
            "from": template.from,
            "to": {"name": template.to.name, "email": template.to.email},
            "subject": template.subject,
            "text": template.text,
            "attachments": template.attachments,
        },
    });

    let location = store.post("/resources", job_doc).await?;
    let key = Ulid::new().to_string();
    let pending_entry = paths::pending_entry(downstream_service, &key);
    store
        .put(&pending_entry, serde_json::json!({"_id": location.path}), None)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_overlapping_single_day_window() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        assert_eq!(days_overlapping(start, end), vec![start.date_naive()]);
    }

    #[test]
    fn days_overlapping_spans_midnight() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap();
        let days = days_overlapping(start, end);
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            ]
        );
    }

    #[test]
    fn render_csv_uses_job_mappings_header_order() {
        let config = ReportConfig {
            job_mappings: vec![
                ("id".to_string(), "/id".to_string()),
                ("outcome".to_string(), "errorMappings".to_string()),
            ],
            error_mappings: Default::default(),
            frequency: "0 0 * * * *".to_string(),
            job_type: None,
            downstream_service: "email-service".to_string(),
            send_empty: false,
        };
        let rows = vec![serde_json::json!({"id": "k1", "outcome": "Success"})];
        let csv_bytes = render_csv(&rows, &config).unwrap();
        let csv_text = String::from_utf8(csv_bytes).unwrap();
        assert_eq!(csv_text, "id,outcome\nk1,Success\n");
    }
}
