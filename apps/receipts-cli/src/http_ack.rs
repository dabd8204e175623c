use std::time::Duration;

use async_trait::async_trait;
use receipts_core::{AckError, Acknowledger, MessageId};
use serde::Serialize;

use crate::http_client;

#[derive(Serialize)]
struct MarkReadBody<'a> {
    message_ids: &'a [MessageId],
}

/// Posts each batch as `{"message_ids": [...]}` to a fixed endpoint.
pub struct HttpAcknowledger {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAcknowledger {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client::client_with_timeout(timeout)?,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Acknowledger for HttpAcknowledger {
    async fn mark_as_read(&self, ids: &[MessageId]) -> Result<(), AckError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&MarkReadBody { message_ids: ids })
            .send()
            .await
            .map_err(|e| AckError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_client_error() {
            let body = resp.text().await.unwrap_or_default();
            let body = body.trim();
            return Err(AckError::Rejected(if body.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {body}")
            }));
        }
        Err(AckError::Status {
            status: status.as_u16(),
        })
    }
}
