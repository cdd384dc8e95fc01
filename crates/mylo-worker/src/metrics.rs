//! Prometheus metrics for the workflow engine.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP listener on `port`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}

/// Metric names as constants for consistency.
pub mod names {
    // Step metrics
    pub const STEPS_TOTAL: &str = "mylo_steps_total";
    pub const STEP_DURATION_SECONDS: &str = "mylo_step_duration_seconds";

    // Instance metrics
    pub const INSTANCES_TOTAL: &str = "mylo_instances_total";
    pub const INSTANCE_RETRIES_TOTAL: &str = "mylo_instance_retries_total";
    pub const INSTANCES_ACTIVE: &str = "mylo_instances_active";

    // Gate metrics
    pub const GATE_WAIT_SECONDS: &str = "mylo_gate_wait_seconds";

    // Trigger metrics
    pub const TRIGGERS_TOTAL: &str = "mylo_triggers_total";

    // Domain metrics
    pub const CLIPS_CREATED_TOTAL: &str = "mylo_clips_created_total";
    pub const CREDITS_DEDUCTED_TOTAL: &str = "mylo_credits_deducted_total";
}

/// Record a step run. `result` is `executed`, `replayed` or `failed`.
pub fn record_step(step: &str, result: &'static str, duration_secs: f64) {
    counter!(names::STEPS_TOTAL, "step" => step.to_string(), "result" => result).increment(1);
    if result != "replayed" {
        histogram!(names::STEP_DURATION_SECONDS, "step" => step.to_string()).record(duration_secs);
    }
}

/// Record a finished instance. `outcome` is `completed` or `failed`.
pub fn record_instance(workflow: &str, outcome: &'static str) {
    counter!(
        names::INSTANCES_TOTAL,
        "workflow" => workflow.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_instance_retry(workflow: &str) {
    counter!(names::INSTANCE_RETRIES_TOTAL, "workflow" => workflow.to_string()).increment(1);
}

pub fn set_active_instances(count: usize) {
    gauge!(names::INSTANCES_ACTIVE).set(count as f64);
}

pub fn record_gate_wait(wait_secs: f64) {
    histogram!(names::GATE_WAIT_SECONDS).record(wait_secs);
}

/// Record a trigger. `source` is `submit` or `stream`; `result` is
/// `started` or `duplicate`.
pub fn record_trigger(source: &'static str, result: &'static str) {
    counter!(names::TRIGGERS_TOTAL, "source" => source, "result" => result).increment(1);
}

pub fn record_clips_created(count: usize) {
    counter!(names::CLIPS_CREATED_TOTAL).increment(count as u64);
}

pub fn record_credits_deducted(amount: u32) {
    counter!(names::CREDITS_DEDUCTED_TOTAL).increment(u64::from(amount));
}
