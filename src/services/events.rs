//! Lifecycle signal sink: best-effort signup/login events for analytics.
//!
//! Delivery is fire-and-forget and at-most-once per call. Failures are
//! logged and swallowed; sign-in never depends on the sink.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::models::UserId;

/// One lifecycle signal (e.g. "signup", "login").
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub event: String,
    /// Resolved user id; `None` for anonymous events (e.g. a signup whose id
    /// assignment failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub properties: Value,
}

impl LifecycleEvent {
    pub fn new(event: &str, user_id: Option<UserId>, properties: Value) -> Self {
        Self {
            event: event.to_string(),
            user_id,
            properties,
        }
    }
}

/// Accepts lifecycle signals. Implementations must never fail the caller.
#[async_trait]
pub trait LifecycleSink: Send + Sync {
    async fn track(&self, event: LifecycleEvent);
}

/// Sink that only logs, for local development and tests without an endpoint.
pub struct NoopSink;

#[async_trait]
impl LifecycleSink for NoopSink {
    async fn track(&self, event: LifecycleEvent) {
        tracing::debug!(event = %event.event, user_id = ?event.user_id, "Lifecycle event (sink disabled)");
    }
}

/// Posts events to an HTTP collector endpoint.
pub struct HttpSink {
    http: reqwest::Client,
    endpoint: String,
    write_key: Option<String>,
}

impl HttpSink {
    pub fn new(endpoint: String, write_key: Option<String>) -> Self {
        Self {
            http: crate::providers::http_client(),
            endpoint,
            write_key,
        }
    }
}

#[async_trait]
impl LifecycleSink for HttpSink {
    async fn track(&self, event: LifecycleEvent) {
        let mut request = self.http.post(&self.endpoint).json(&event);
        if let Some(key) = &self.write_key {
            request = request.basic_auth(key, Option::<&str>::None);
        }

        let name = event.event.clone();
        // Detach delivery so a slow collector cannot delay sign-in.
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!(event = %name, status = %response.status(), "Lifecycle event rejected");
                }
                Err(e) => {
                    tracing::warn!(event = %name, error = %e, "Lifecycle event delivery failed");
                }
            }
        });
    }
}
