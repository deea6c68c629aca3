//! Lifecycle counters for the toast pipeline.
//!
//! The toast manager reports events by name (`ui.notifications.shown`, ...)
//! to an optional `MetricsSink`. Sink failures are logged and dropped; they
//! never change toast behaviour.

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};

/// Prefix applied to every toast lifecycle event name.
pub const METRIC_PREFIX: &str = "ui.notifications.";

/// External counter sink.
pub trait MetricsSink: Send + Sync {
    fn count(&self, name: &str) -> anyhow::Result<()>;
}

/// Prometheus-backed sink with its own registry, so several instances can
/// coexist in one process.
pub struct PrometheusSink {
    registry: Registry,
    events_total: CounterVec,
}

impl PrometheusSink {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let events_total = CounterVec::new(
            Opts::new(
                "efnotify_ui_notifications_total",
                "Toast lifecycle events by name",
            ),
            &["event"],
        )?;
        registry.register(Box::new(events_total.clone()))?;
        Ok(Self {
            registry,
            events_total,
        })
    }

    /// Current value for one event label.
    pub fn value(&self, event: &str) -> f64 {
        self.events_total.with_label_values(&[event]).get()
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl MetricsSink for PrometheusSink {
    fn count(&self, name: &str) -> anyhow::Result<()> {
        let event = name.strip_prefix(METRIC_PREFIX).unwrap_or(name);
        if event.is_empty() {
            anyhow::bail!("empty metric name");
        }
        self.events_total.with_label_values(&[event]).inc();
        Ok(())
    }
}
