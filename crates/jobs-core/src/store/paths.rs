//! Store path construction and the built-in container media-type table.
//!
//! This is not a templating engine: `ensure` only ever needs to materialize
//! one of a small, fixed set of intermediate container shapes, so the table
//! below is the entire "template" surface this crate ships.

/// One of the fixed container shapes `ensure` can materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    ServicesRoot,
    Service,
    JobsContainer,
    DayBucket,
    Job,
    ReportsContainer,
    Report,
}

pub fn media_type(kind: MediaType) -> &'static str {
    match kind {
        MediaType::ServicesRoot => "application/vnd.oada.services.1+json",
        MediaType::Service => "application/vnd.oada.service.1+json",
        MediaType::JobsContainer => "application/vnd.oada.service.jobs.1+json",
        MediaType::DayBucket => "application/vnd.oada.service.jobs.1+json",
        MediaType::Job => "application/vnd.oada.service.job.1+json",
        MediaType::ReportsContainer => "application/vnd.oada.service.reports.1+json",
        MediaType::Report => "application/vnd.oada.service.report.1+json",
    }
}

/// Root of one service's job namespace: `/bookmarks/services/<svc>/jobs`.
pub fn jobs_root(service: &str) -> String {
    format!("/bookmarks/services/{service}/jobs")
}

pub fn pending(service: &str) -> String {
    format!("{}/pending", jobs_root(service))
}

pub fn pending_entry(service: &str, job_key: &str) -> String {
    format!("{}/{}", pending(service), job_key)
}

pub fn day_index(service: &str, status: &str, day: &str) -> String {
    format!("{}/{}/day-index/{}", jobs_root(service), status, day)
}

pub fn filed_entry(service: &str, status: &str, day: &str, job_key: &str) -> String {
    format!("{}/{}", day_index(service, status, day), job_key)
}

pub fn typed_failure_day_index(service: &str, fail_kind: &str, day: &str) -> String {
    format!(
        "{}/typed-failure/{}/day-index/{}",
        jobs_root(service),
        fail_kind,
        day
    )
}

pub fn typed_failure_entry(service: &str, fail_kind: &str, day: &str, job_key: &str) -> String {
    format!(
        "{}/{}",
        typed_failure_day_index(service, fail_kind, day),
        job_key
    )
}

pub fn reports_root(service: &str) -> String {
    format!("{}/reports", jobs_root(service))
}

pub fn report_day_index(service: &str, report_name: &str, day: &str) -> String {
    format!("{}/{}/day-index/{}", reports_root(service), report_name, day)
}

pub fn report_row(service: &str, report_name: &str, day: &str, job_key: &str) -> String {
    format!(
        "{}/{}",
        report_day_index(service, report_name, day),
        job_key
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_pending_entry() {
        assert_eq!(
            pending_entry("weighticket", "01HX"),
            "/bookmarks/services/weighticket/jobs/pending/01HX"
        );
    }

    #[test]
    fn builds_typed_failure_entry() {
        assert_eq!(
            typed_failure_entry("weighticket", "timeout", "2024-01-02", "01HX"),
            "/bookmarks/services/weighticket/jobs/typed-failure/timeout/day-index/2024-01-02/01HX"
        );
    }

    #[test]
    fn media_types_match_contract() {
        assert_eq!(media_type(MediaType::Job), "application/vnd.oada.service.job.1+json");
        assert_eq!(
            media_type(MediaType::ReportsContainer),
            "application/vnd.oada.service.reports.1+json"
        );
    }
}
