use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::adapter::SourceError;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, SourceError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("market-decision-engine/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {}", e)))
}

/// GET `url` with `query` and decode the JSON body, classifying failures
/// into [`SourceError`].
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, SourceError> {
    let response = client.get(url).query(query).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!("HTTP {} from {}: {}", status, url, body);
        return Err(SourceError::from_status(status, body));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(e.to_string()))
}
