//! Prometheus-backed upload metrics.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Counts enqueues, terminal outcomes by status and bytes sent; tracks active uploads.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

/// Prometheus-backed registry for upload activity.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    uploads_enqueued_total: IntCounter,
    uploads_finished_total: IntCounterVec,
    upload_bytes_sent_total: IntCounter,
    active_uploads: IntGauge,
}

/// Snapshot of selected gauges and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Uploads accepted since start.
    pub uploads_enqueued_total: u64,
    /// Uploads that completed successfully.
    pub uploads_completed_total: u64,
    /// Uploads that failed.
    pub uploads_failed_total: u64,
    /// Uploads that were canceled.
    pub uploads_canceled_total: u64,
    /// Body bytes handed to the network.
    pub upload_bytes_sent_total: u64,
    /// Uploads currently registered.
    pub active_uploads: i64,
}

impl Metrics {
    /// Construct a registry with the upload collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let uploads_enqueued_total = IntCounter::with_opts(Opts::new(
            "uploads_enqueued_total",
            "Uploads accepted for transfer",
        ))
        .map_err(|source| collector("uploads_enqueued_total", source))?;
        let uploads_finished_total = IntCounterVec::new(
            Opts::new("uploads_finished_total", "Uploads that reached a terminal state"),
            &["status"],
        )
        .map_err(|source| collector("uploads_finished_total", source))?;
        let upload_bytes_sent_total = IntCounter::with_opts(Opts::new(
            "upload_bytes_sent_total",
            "Request body bytes sent",
        ))
        .map_err(|source| collector("upload_bytes_sent_total", source))?;
        let active_uploads = IntGauge::with_opts(Opts::new(
            "active_uploads",
            "Uploads currently registered",
        ))
        .map_err(|source| collector("active_uploads", source))?;

        register(&registry, "uploads_enqueued_total", uploads_enqueued_total.clone())?;
        register(&registry, "uploads_finished_total", uploads_finished_total.clone())?;
        register(&registry, "upload_bytes_sent_total", upload_bytes_sent_total.clone())?;
        register(&registry, "active_uploads", active_uploads.clone())?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                uploads_enqueued_total,
                uploads_finished_total,
                upload_bytes_sent_total,
                active_uploads,
            }),
        })
    }

    /// Record an accepted upload.
    pub fn inc_enqueued(&self) {
        self.inner.uploads_enqueued_total.inc();
    }

    /// Record a terminal outcome (`completed`, `failed` or `canceled`).
    pub fn inc_finished(&self, status: &str) {
        self.inner
            .uploads_finished_total
            .with_label_values(&[status])
            .inc();
    }

    /// Add newly sent body bytes.
    pub fn add_bytes_sent(&self, bytes: u64) {
        self.inner.upload_bytes_sent_total.inc_by(bytes);
    }

    /// Set the active upload gauge.
    pub fn set_active_uploads(&self, count: usize) {
        self.inner
            .active_uploads
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Encode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::Utf8 { source })
    }

    /// Take a point-in-time snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let finished = |status: &str| {
            self.inner
                .uploads_finished_total
                .with_label_values(&[status])
                .get()
        };
        MetricsSnapshot {
            uploads_enqueued_total: self.inner.uploads_enqueued_total.get(),
            uploads_completed_total: finished("completed"),
            uploads_failed_total: finished("failed"),
            uploads_canceled_total: finished("canceled"),
            upload_bytes_sent_total: self.inner.upload_bytes_sent_total.get(),
            active_uploads: self.inner.active_uploads.get(),
        }
    }
}

const fn collector(name: &'static str, source: prometheus::Error) -> TelemetryError {
    TelemetryError::metric("metrics.build", name, source)
}

fn register<C>(registry: &Registry, name: &'static str, collector: C) -> TelemetryResult<()>
where
    C: prometheus::core::Collector + 'static,
{
    registry
        .register(Box::new(collector))
        .map_err(|source| TelemetryError::metric("metrics.register", name, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() -> TelemetryResult<()> {
        let metrics = Metrics::new()?;
        metrics.inc_enqueued();
        metrics.inc_enqueued();
        metrics.inc_finished("completed");
        metrics.inc_finished("failed");
        metrics.add_bytes_sent(2_048);
        metrics.set_active_uploads(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.uploads_enqueued_total, 2);
        assert_eq!(snapshot.uploads_completed_total, 1);
        assert_eq!(snapshot.uploads_failed_total, 1);
        assert_eq!(snapshot.uploads_canceled_total, 0);
        assert_eq!(snapshot.upload_bytes_sent_total, 2_048);
        assert_eq!(snapshot.active_uploads, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("uploads_enqueued_total 2"));
        assert!(rendered.contains("uploads_finished_total{status=\"completed\"} 1"));
        assert!(rendered.contains("active_uploads 1"));
        Ok(())
    }

    #[test]
    fn snapshot_serializes_as_flat_object() -> Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        let value = serde_json::to_value(metrics.snapshot())?;
        assert_eq!(value["uploads_enqueued_total"], 0);
        assert_eq!(value["active_uploads"], 0);
        Ok(())
    }
}
