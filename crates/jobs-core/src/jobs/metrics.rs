//! Prometheus-compatible metrics facade.
//!
//! One gauge, `oada_jobs_total{service,type,state}`, and one histogram,
//! `job_times{service,type,status}`, with fixed bucket boundaries. The
//! recorder is installed once per process (the teacher's `once_cell`
//! singleton idiom); this module never starts its own HTTP server — the
//! embedding service mounts `recorder_handle().render()` wherever it likes.

use metrics::{describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

const DURATION_BUCKETS: &[f64] = &[
    1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0, 8192.0,
    16384.0, 32768.0, 65536.0, 131072.0, 262144.0, 524288.0,
];

/// Install the Prometheus recorder on first call; every later call returns
/// the same handle.
pub fn recorder_handle() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .set_buckets_for_metric(Matcher::Full("job_times".to_string()), DURATION_BUCKETS)
                .expect("static bucket list is always valid")
                .install_recorder()
                .expect("failed to install prometheus recorder");
            describe_gauge!(
                "oada_jobs_total",
                Unit::Count,
                "jobs currently in a given state for a service/type pair"
            );
            describe_histogram!(
                "job_times",
                Unit::Seconds,
                "job execution duration by terminal status"
            );
            handle
        })
        .clone()
}

fn ensure_installed() {
    let _ = recorder_handle();
}

/// Initializes all four state gauges at zero for a newly registered type.
pub fn register_worker_type(service: &str, job_type: &str) {
    ensure_installed();
    for state in ["queued", "running", "success", "failure"] {
        state_gauge(service, job_type, state).set(0.0);
    }
}

fn state_gauge(service: &str, job_type: &str, state: &str) -> metrics::Gauge {
    gauge!(
        "oada_jobs_total",
        "service" => service.to_string(),
        "type" => job_type.to_string(),
        "state" => state.to_string(),
    )
}

pub fn inc_queued(service: &str, job_type: &str) {
    state_gauge(service, job_type, "queued").increment(1.0);
}

pub fn dec_queued(service: &str, job_type: &str) {
    state_gauge(service, job_type, "queued").decrement(1.0);
}

pub fn inc_running(service: &str, job_type: &str) {
    state_gauge(service, job_type, "running").increment(1.0);
}

pub fn dec_running(service: &str, job_type: &str) {
    state_gauge(service, job_type, "running").decrement(1.0);
}

/// `status` is the terminal status path segment, `"success"` or `"failure"`.
pub fn inc_terminal(service: &str, job_type: &str, status: &str) {
    state_gauge(service, job_type, status).increment(1.0);
}

pub fn observe_job_time(service: &str, job_type: &str, status: &str, elapsed: Duration) {
    histogram!(
        "job_times",
        "service" => service.to_string(),
        "type" => job_type.to_string(),
        "status" => status.to_string(),
    )
    .record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_handle_is_idempotent() {
        let a = recorder_handle();
        let b = recorder_handle();
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn register_and_observe_do_not_panic() {
        register_worker_type("svc", "demo");
        inc_queued("svc", "demo");
        dec_queued("svc", "demo");
        inc_running("svc", "demo");
        dec_running("svc", "demo");
        inc_terminal("svc", "demo", "success");
        observe_job_time("svc", "demo", "success", Duration::from_secs(2));
        assert!(recorder_handle().render().contains("oada_jobs_total"));
    }
}
