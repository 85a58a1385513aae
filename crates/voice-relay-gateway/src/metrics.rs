//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a finished `/process_audio` request with its duration.
pub fn record_request(status: u16, duration_secs: f64) {
    let labels = [("status", status.to_string())];
    metrics::counter!("voice_requests_total", &labels).increment(1);
    metrics::histogram!("voice_request_duration_seconds").record(duration_secs);
}

/// Record one pipeline stage.
pub fn record_stage(stage: &str, duration_secs: f64, ok: bool) {
    let labels = [("stage", stage.to_string())];
    metrics::histogram!("pipeline_stage_duration_seconds", &labels).record(duration_secs);
    if !ok {
        record_error(stage);
    }
}

/// Record a reply that fell back to the fixed text.
pub fn record_fallback() {
    metrics::counter!("generation_fallbacks_total").increment(1);
}

/// Record an error at a given stage.
pub fn record_error(stage: &str) {
    let labels = [("stage", stage.to_string())];
    metrics::counter!("pipeline_errors_total", &labels).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_prometheus_recorder() {
        // Only one recorder per process; a second install is an error, not a panic.
        if let Ok(handle) = install_prometheus_recorder() {
            record_fallback();
            assert!(handle.render().contains("generation_fallbacks_total"));
        }
    }

    #[test]
    fn test_record_without_recorder_does_not_panic() {
        record_request(200, 0.123);
        record_stage("transcribe", 0.5, false);
    }
}
