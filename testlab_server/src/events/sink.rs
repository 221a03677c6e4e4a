//! Event sinks: Segment over HTTP, tracing-only, and in-memory.

use std::sync::Mutex;

use super::testing::TrackedEvent;

/// Fire-and-forget delivery of analytics events.
pub trait EventSink: Send + Sync + 'static {
    fn send(&self, event: TrackedEvent);
}

/// Posts events to the Segment tracking API on a spawned task.
#[derive(Clone)]
pub struct SegmentSink {
    http: reqwest::Client,
    write_key: String,
    endpoint: String,
}

impl SegmentSink {
    pub fn new(write_key: &str, endpoint: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            write_key: write_key.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    fn payload(event: &TrackedEvent) -> serde_json::Value {
        serde_json::json!({
            "anonymousId": event.app_slug,
            "event": event.event.name(),
            "properties": event,
            "timestamp": event.occurred_at.to_rfc3339(),
            "messageId": uuid::Uuid::new_v4().to_string(),
        })
    }
}

impl EventSink for SegmentSink {
    fn send(&self, event: TrackedEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(event = event.event.name(), "No async runtime, dropping analytics event");
            return;
        };

        let http = self.http.clone();
        let write_key = self.write_key.clone();
        let endpoint = self.endpoint.clone();
        let body = Self::payload(&event);
        let name = event.event.name();

        runtime.spawn(async move {
            let result = http
                .post(&endpoint)
                .basic_auth(write_key, Some(""))
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(event = name, "Analytics event delivered");
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    tracing::warn!(event = name, "Analytics delivery failed: {} {}", status, text);
                }
                Err(e) => {
                    tracing::warn!(event = name, "Analytics delivery error: {e}");
                }
            }
        });
    }
}

/// Logs events instead of delivering them. Used when no write key is set.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl EventSink for LogSink {
    fn send(&self, event: TrackedEvent) {
        tracing::info!(
            event = event.event.name(),
            app_slug = %event.app_slug,
            build_slug = %event.build_slug,
            payload = %serde_json::to_string(&event.event).unwrap_or_default(),
            "Analytics event"
        );
    }
}

/// Records events in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TrackedEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event.name()).collect()
    }
}

impl EventSink for MemorySink {
    fn send(&self, event: TrackedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
