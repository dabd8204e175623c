use std::time::Duration;

use receipts_core::env_u64;

fn connect_timeout() -> Duration {
    Duration::from_secs(env_u64("RECEIPTS_HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(3).max(1))
}

fn keepalive() -> Duration {
    Duration::from_secs(env_u64("RECEIPTS_HTTP_TCP_KEEPALIVE_SECS").unwrap_or(60).max(1))
}

fn pool_idle() -> Duration {
    Duration::from_secs(env_u64("RECEIPTS_HTTP_POOL_IDLE_SECS").unwrap_or(90).max(1))
}

fn user_agent() -> String {
    format!("receipts-cli/{}", env!("CARGO_PKG_VERSION"))
}

/// Client builder with harmonized defaults; callers add a request timeout.
pub fn builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(connect_timeout())
        .tcp_keepalive(keepalive())
        .pool_idle_timeout(pool_idle())
}

pub fn client_with_timeout(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(builder().timeout(timeout).build()?)
}
