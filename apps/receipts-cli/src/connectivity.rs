use std::time::Duration;

use futures_util::Stream;
use tracing::debug;

use crate::http_client;

/// Polls a URL to decide whether the acknowledgement endpoint is reachable.
///
/// Any HTTP response counts as online; only transport failures count as offline.
#[derive(Clone)]
pub struct ConnectivityProbe {
    client: reqwest::Client,
    url: String,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(url: impl Into<String>, interval: Duration, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client::client_with_timeout(timeout)?,
            url: url.into(),
            interval: interval.max(Duration::from_millis(10)),
        })
    }

    pub async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(_) => true,
            Err(err) => {
                debug!(url = %self.url, %err, "connectivity probe failed");
                false
            }
        }
    }

    /// Readings that differ from the previous one, starting from `initial`.
    pub fn transitions(self, initial: bool) -> impl Stream<Item = bool> {
        futures_util::stream::unfold((self, initial), |(probe, last)| async move {
            loop {
                tokio::time::sleep(probe.interval).await;
                let online = probe.check().await;
                if online != last {
                    return Some((online, (probe, online)));
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use httpmock::prelude::*;

    fn probe(url: String) -> ConnectivityProbe {
        ConnectivityProbe::new(url, Duration::from_millis(20), Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn any_response_counts_as_online() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(503);
            })
            .await;
        assert!(probe(server.url("/healthz")).check().await);
    }

    #[tokio::test]
    async fn refused_connection_counts_as_offline() {
        assert!(!probe("http://127.0.0.1:9/healthz".into()).check().await);
    }

    #[tokio::test]
    async fn transitions_skip_unchanged_readings() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(200);
            })
            .await;
        let stream = probe(server.url("/healthz")).transitions(false);
        futures_util::pin_mut!(stream);
        let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("transition");
        assert_eq!(first, Some(true));
        let steady = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
        assert!(steady.is_err(), "no further transitions while the server stays up");
    }
}
