use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use scrumbot_core::errors::PortError;

const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Sends a request and maps transport failures, 429s and non-success statuses to
/// [`PortError`].
pub(crate) async fn send(
    service: &'static str,
    request: RequestBuilder,
) -> Result<Response, PortError> {
    let response = request
        .send()
        .await
        .map_err(|error| PortError::Transport { service, message: error.to_string() })?;

    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(PortError::RateLimited { service, retry_after_secs });
    }

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(PortError::Status { service, status, body });
    }

    Ok(response)
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    service: &'static str,
    request: RequestBuilder,
) -> Result<T, PortError> {
    let response = send(service, request).await?;
    let body = response
        .text()
        .await
        .map_err(|error| PortError::Transport { service, message: error.to_string() })?;
    decode(service, &body)
}

pub(crate) fn decode<T: DeserializeOwned>(service: &'static str, body: &str) -> Result<T, PortError> {
    serde_json::from_str(body)
        .map_err(|error| PortError::Decode { service, message: error.to_string() })
}
