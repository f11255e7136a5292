//! Best-effort product analytics.

use async_trait::async_trait;
use tracing::{debug, info};

/// Receives product events. Failures never affect the calling flow.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn capture(&self, event: &str, distinct_id: &str) -> Result<(), String>;
}

/// Writes analytics events to the log.
pub struct LogSink;

#[async_trait]
impl AnalyticsSink for LogSink {
    async fn capture(&self, event: &str, distinct_id: &str) -> Result<(), String> {
        info!(event_name = event, distinct_id, "analytics event");
        Ok(())
    }
}

/// Capture `event`, swallowing any failure.
pub async fn capture_best_effort(sink: &dyn AnalyticsSink, event: &str, distinct_id: &str) {
    if let Err(e) = sink.capture(event, distinct_id).await {
        debug!("Analytics capture of '{}' failed: {}", event, e);
    }
}
