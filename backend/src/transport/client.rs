//! Thin REST client.
//!
//! Prefixes paths with the configured base URL, attaches the bearer token and
//! decodes the `{success, data, error}` envelope every endpoint answers with.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::error::{TransportError, TransportResult};
use crate::models::ApiEnvelope;

/// REST API client.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    /// Absolute URL for an API path such as `/lessons`.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Start a request with auth applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a prepared request and decode the envelope's `data`.
    pub async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> TransportResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode_envelope(status, &body)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> TransportResult<T> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> TransportResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.request(Method::POST, path).json(body)).await
    }
}

/// Decode an API response body.
///
/// `success: true` with a 2xx status yields `data`; anything else becomes
/// [`TransportError::Api`] carrying the backend's own message when it sent one.
pub fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> TransportResult<T> {
    match serde_json::from_str::<ApiEnvelope<T>>(body) {
        Ok(envelope) if envelope.success && status.is_success() => envelope
            .data
            .ok_or_else(|| TransportError::InvalidResponse("response has no data".to_string())),
        Ok(envelope) => Err(TransportError::Api(
            envelope
                .error_text()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status)),
        )),
        Err(_) if !status.is_success() => Err(TransportError::Api(error_message(status, body))),
        Err(e) => Err(TransportError::InvalidResponse(format!(
            "{}: {}",
            e,
            body.chars().take(200).collect::<String>()
        ))),
    }
}

/// Best error text for a failed response: JSON `error`/`message`, else the raw
/// body, else the status line.
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body) {
        if let Some(text) = envelope.error_text() {
            return text.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("Upload failed with status {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Init {
        upload_id: String,
        key: String,
    }

    #[test]
    fn test_decode_success() {
        let body = r#"{"success":true,"data":{"uploadId":"u1","key":"documents/x.pdf"}}"#;
        let init: Init = decode_envelope(StatusCode::OK, body).unwrap();
        assert_eq!(init.upload_id, "u1");
        assert_eq!(init.key, "documents/x.pdf");
    }

    #[test]
    fn test_decode_backend_error() {
        let body = r#"{"success":false,"error":"Not authorized"}"#;
        let err = decode_envelope::<Init>(StatusCode::FORBIDDEN, body).unwrap_err();
        assert!(matches!(err, TransportError::Api(ref m) if m == "Not authorized"));
    }

    #[test]
    fn test_decode_non_json_failure() {
        let err = decode_envelope::<Init>(StatusCode::BAD_GATEWAY, "upstream timeout").unwrap_err();
        assert!(matches!(err, TransportError::Api(ref m) if m == "upstream timeout"));

        let err = decode_envelope::<Init>(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse(_)));
    }

    #[test]
    fn test_error_message_fallback() {
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "Upload failed with status 500"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"message":"title required"}"#),
            "title required"
        );
    }

    #[test]
    fn test_url_join() {
        let config = Config::new("https://api.example.org/").unwrap();
        let client = ApiClient::new(&config);
        assert_eq!(client.url("/lessons"), "https://api.example.org/lessons");
        assert_eq!(client.url("lessons"), "https://api.example.org/lessons");
    }
}
