use crate::reconcile::AlertEvent;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const ALERT_TAGS: [&str; 2] = ["tada", "shopping_cart"];

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification server returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Delivers an alert to whoever is watching.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;

    /// Human-readable destination, used in logs.
    fn destination(&self) -> String;
}

/// Publishes alerts to an ntfy topic.
pub struct NtfyNotifier {
    client: reqwest::Client,
    server: String,
    topic: String,
}

/// JSON publish body accepted at the ntfy server root.
#[derive(Debug, Serialize)]
struct Publish<'a> {
    topic: &'a str,
    title: String,
    message: String,
    click: String,
    tags: [&'a str; 2],
}

impl NtfyNotifier {
    pub fn new(server: impl Into<String>, topic: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
            topic: topic.into(),
        })
    }

    fn payload<'a>(&'a self, event: &AlertEvent) -> Publish<'a> {
        Publish {
            topic: &self.topic,
            title: event.title(),
            message: event.message(),
            click: event.url(),
            tags: ALERT_TAGS,
        }
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.server)
            .json(&self.payload(event))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    fn destination(&self) -> String {
        format!("{}/{}", self.server, self.topic)
    }
}
