use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, TextEncoder,
};

static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "mention_service_messages_total",
            "Story messages handled by mention-service, by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create mention_service_messages_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register mention_service_messages_total");
    counter
});

static MENTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "mention_service_mentions_total",
            "Brand mention writes, by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create mention_service_mentions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register mention_service_mentions_total");
    counter
});

static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "mention_service_dispatch_queue_depth",
        "Tasks queued in the dispatcher but not yet started",
    )
    .expect("failed to create mention_service_dispatch_queue_depth");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register mention_service_dispatch_queue_depth");
    gauge
});

static TASKS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "mention_service_tasks_in_flight",
        "Tasks currently executing on dispatcher workers",
    )
    .expect("failed to create mention_service_tasks_in_flight");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register mention_service_tasks_in_flight");
    gauge
});

static SUBMIT_WAIT_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "mention_service_submit_wait_seconds",
            "Time the delivery loop spent blocked on a full dispatch queue",
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("failed to create mention_service_submit_wait_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register mention_service_submit_wait_seconds");
    histogram
});

/// `outcome`: `matched`, `no_mentions`, `decode_failed`, `rejected`
pub fn record_message(outcome: &str) {
    MESSAGES_TOTAL.with_label_values(&[outcome]).inc();
}

/// `outcome`: `inserted`, `duplicate`, `failed`
pub fn record_mention_write(outcome: &str) {
    MENTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as i64);
}

pub fn task_started() {
    TASKS_IN_FLIGHT.inc();
}

pub fn task_finished() {
    TASKS_IN_FLIGHT.dec();
}

pub fn observe_submit_wait(elapsed: Duration) {
    SUBMIT_WAIT_SECONDS.observe(elapsed.as_secs_f64());
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_series() {
        record_message("matched");
        record_mention_write("inserted");
        observe_submit_wait(Duration::from_millis(3));

        let (content_type, body) = render().expect("encode metrics");
        let text = String::from_utf8(body).expect("utf8 metrics");

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("mention_service_messages_total"));
        assert!(text.contains("mention_service_mentions_total"));
        assert!(text.contains("mention_service_submit_wait_seconds"));
    }
}
