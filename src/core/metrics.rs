use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn session_recorded() {
    metrics::counter!("attendance_sessions_recorded_total").increment(1);
}

pub(crate) fn risk_recalculated(students: usize) {
    metrics::counter!("risk_recalculations_total").increment(students as u64);
}

pub(crate) fn alert_upserted(alert_type: &'static str, created: bool) {
    let outcome = if created { "created" } else { "refreshed" };
    metrics::counter!("alerts_upserted_total", "alert_type" => alert_type, "outcome" => outcome)
        .increment(1);
}

pub(crate) fn case_auto_created() {
    metrics::counter!("cases_auto_created_total").increment(1);
}

pub(crate) fn alert_auto_resolved() {
    metrics::counter!("alerts_auto_resolved_total").increment(1);
}

pub(crate) fn dashboard_cache(outcome: &'static str) {
    metrics::counter!("dashboard_cache_total", "outcome" => outcome).increment(1);
}

pub(crate) fn dashboard_built(role: &'static str, elapsed: Duration) {
    metrics::histogram!("dashboard_build_seconds", "role" => role).record(elapsed.as_secs_f64());
}
