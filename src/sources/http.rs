//! Shared HTTP plumbing for source adapters

use super::SourceError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

pub(crate) fn client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_default()
}

/// Send a request and map transport failures and error statuses.
///
/// - 401 / 403 → `Auth`
/// - 429 → `RateLimited` (honours `Retry-After`)
/// - 5xx, connect errors, timeouts → `Unavailable`
/// - Other non-2xx → `Api`
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;
    check_status(response).await
}

pub(crate) async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(SourceError::RateLimited { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{} {}", status, truncate(&body, 300));

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::Auth(detail),
        s if s.is_server_error() => SourceError::Unavailable(detail),
        _ => SourceError::Api(detail),
    })
}

/// Decode a JSON body, reporting envelope mismatches as `Parse`
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, SourceError> {
    let body = response
        .text()
        .await
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    async fn status_error(status: usize, header: Option<(&'static str, &'static str)>) -> SourceError {
        let mut server = Server::new_async().await;
        let mut mock = server.mock("GET", "/x").with_status(status).with_body("nope");
        if let Some((k, v)) = header {
            mock = mock.with_header(k, v);
        }
        let _mock = mock.create_async().await;

        send(client().get(format!("{}/x", server.url())))
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_status_mapping() {
        assert!(matches!(status_error(401, None).await, SourceError::Auth(_)));
        assert!(matches!(status_error(403, None).await, SourceError::Auth(_)));
        assert!(matches!(status_error(503, None).await, SourceError::Unavailable(_)));
        assert!(matches!(status_error(404, None).await, SourceError::Api(_)));
        assert!(matches!(
            status_error(429, Some(("Retry-After", "7"))).await,
            SourceError::RateLimited { retry_after: Some(7) }
        ));
        assert!(matches!(
            status_error(429, None).await,
            SourceError::RateLimited { retry_after: None }
        ));
    }

    #[tokio::test]
    async fn test_connect_error_is_unavailable() {
        // Nothing listens on port 9
        let err = send(client().get("http://127.0.0.1:9/x")).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_read_json_parse_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/x")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let resp = send(client().get(format!("{}/x", server.url()))).await.unwrap();
        let err = read_json::<serde_json::Value>(resp).await.unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("hi", 3), "hi");
    }
}
