//! Bounty marketplace capability.
//!
//! The marketplace is one of the two independent availability sources. Only
//! the read side exists here; claiming and submission stay manual.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Failures talking to either external signal source.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("issue tracker request failed: {0}")]
    Tracker(String),
    #[error("marketplace request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("marketplace returned an unexpected payload: {0}")]
    Payload(String),
}

/// Claim status as reported by the marketplace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketSignal {
    pub claimed: bool,
    /// Whether the listing itself is still open, when the marketplace
    /// reports it at all.
    pub listed_open: Option<bool>,
}

#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Fresh claim status for one task. Never served from a cache; the
    /// consistency validator insists on live signals at admission time.
    async fn claim_signal(&self, task_id: &str) -> Result<MarketSignal, SignalError>;
}

#[derive(Debug, Deserialize)]
struct TaskPayload {
    claimed: Option<bool>,
    #[serde(default)]
    status: Option<String>,
}

pub struct HttpMarketplace {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpMarketplace {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/tasks/{task_id}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Marketplace for HttpMarketplace {
    async fn claim_signal(&self, task_id: &str) -> Result<MarketSignal, SignalError> {
        let mut request = self.client.get(self.task_url(task_id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let payload: TaskPayload = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let signal = signal_from_payload(task_id, payload)?;
        debug!("Marketplace signal for {task_id}: {signal:?}");
        Ok(signal)
    }
}

fn signal_from_payload(task_id: &str, payload: TaskPayload) -> Result<MarketSignal, SignalError> {
    let claimed = payload.claimed.ok_or_else(|| {
        SignalError::Payload(format!("task {task_id} is missing the claimed field"))
    })?;
    let listed_open = payload.status.as_deref().map(|status| {
        matches!(status.to_lowercase().as_str(), "open" | "active" | "listed")
    });
    Ok(MarketSignal {
        claimed,
        listed_open,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(raw: &str) -> TaskPayload {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_signal_from_full_payload() {
        let signal =
            signal_from_payload("t-1", payload(r#"{"claimed": true, "status": "open"}"#)).unwrap();
        assert_eq!(
            signal,
            MarketSignal {
                claimed: true,
                listed_open: Some(true),
            }
        );
    }

    #[test]
    fn test_closed_statuses_map_to_not_open() {
        for status in ["closed", "completed", "Cancelled"] {
            let raw = format!(r#"{{"claimed": false, "status": "{status}"}}"#);
            let signal = signal_from_payload("t-1", payload(&raw)).unwrap();
            assert_eq!(signal.listed_open, Some(false), "status {status:?}");
        }
    }

    #[test]
    fn test_missing_status_stays_unknown() {
        let signal = signal_from_payload("t-1", payload(r#"{"claimed": false}"#)).unwrap();
        assert_eq!(signal.listed_open, None);
    }

    #[test]
    fn test_missing_claimed_is_a_payload_error() {
        let err = signal_from_payload("t-1", payload(r#"{"status": "open"}"#)).unwrap_err();
        assert!(matches!(err, SignalError::Payload(_)));
        assert!(err.to_string().contains("t-1"));
    }

    #[test]
    fn test_task_url_handles_trailing_slash() {
        let market = HttpMarketplace::new("https://market.example/api/", None);
        assert_eq!(market.task_url("t-9"), "https://market.example/api/tasks/t-9");
    }
}
