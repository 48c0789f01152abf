//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install a Prometheus recorder
/// Returns a handle whose `render()` output is printed when the CLI exits
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    tracing::debug!("Prometheus metrics recorder installed");

    Ok(handle)
}

/// Record which tier satisfied a resolution (`local_dev`, `cache`, `remote`)
pub fn record_resolution(tier: &'static str) {
    metrics::counter!("dermai_resolutions_total", "tier" => tier).increment(1);
}

/// Record a completed download
pub fn record_download(file: &str, bytes: u64) {
    metrics::counter!("dermai_downloads_total", "file" => file.to_string()).increment(1);
    metrics::counter!("dermai_downloaded_bytes_total").increment(bytes);
}

/// Record a failed remote fetch
pub fn record_download_failure() {
    metrics::counter!("dermai_download_failures_total").increment(1);
}

/// Record one prediction batch
pub fn record_predictions(total: usize, degraded: usize) {
    metrics::counter!("dermai_predictions_total").increment(total as u64);
    metrics::counter!("dermai_degraded_predictions_total").increment(degraded as u64);
}
