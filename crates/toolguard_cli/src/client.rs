//! Client for a running validation service.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use toolguard_core::{CoreError, ValidationResult};
use toolguard_engine::ValidationRequest;

/// Remote validation failure. Always a hard failure for the caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Service could not be reached
    #[error("cannot reach {url}: {reason}")]
    Transport {
        /// Endpoint
        url: String,
        /// Underlying error
        reason: String,
    },
    /// Service answered with an error status
    #[error("service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
    /// Response did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<ClientError> for CoreError {
    fn from(err: ClientError) -> Self {
        CoreError::ServiceUnavailable {
            reason: err.to_string(),
        }
    }
}

/// Successful response from `POST /api/v1/validate`
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVerdicts {
    /// One verdict per call
    pub results: ValidationResult,
    /// Server-side processing time
    #[serde(default)]
    pub processing_time_ms: u64,
    /// Server request id
    #[serde(default)]
    pub request_id: String,
}

/// HTTP client for the validation service
pub struct ValidationClient {
    base_url: String,
    api_key: Option<SecretString>,
    http: reqwest::Client,
}

impl ValidationClient {
    /// Create a client for a service base URL such as `http://127.0.0.1:8080`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Transport {
                url: base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            api_key: api_key.map(SecretString::from),
            http,
        })
    }

    /// Full URL of the validate endpoint
    #[must_use]
    pub fn validate_url(&self) -> String {
        format!("{}/api/v1/validate", self.base_url)
    }

    /// Submit a batch
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable, answers with an error
    /// status, or returns something other than one verdict per call
    pub async fn validate(&self, request: &ValidationRequest) -> Result<RemoteVerdicts, ClientError> {
        let url = self.validate_url();
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| ClientError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ClientError::Transport {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body, request.tool_calls.len())
    }
}

fn parse_response(body: &str, expected: usize) -> Result<RemoteVerdicts, ClientError> {
    let parsed: RemoteVerdicts =
        serde_json::from_str(body).map_err(|e| ClientError::Malformed(e.to_string()))?;
    if parsed.results.len() != expected {
        return Err(ClientError::Malformed(format!(
            "{} verdicts for {} calls",
            parsed.results.len(),
            expected
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolguard_core::ToolCall;

    #[test]
    fn test_validate_url() {
        let client = ValidationClient::new("http://localhost:8080/", None).unwrap();
        assert_eq!(client.validate_url(), "http://localhost:8080/api/v1/validate");
    }

    #[test]
    fn test_parse_response_checks_length() {
        let body = r#"{"status":"success","results":[{"tool_call_id":"c1","status":"approved","execution_allowed":true}],"processing_time_ms":3,"request_id":"req_1"}"#;
        let parsed = parse_response(body, 1).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.request_id, "req_1");

        assert!(matches!(parse_response(body, 2), Err(ClientError::Malformed(_))));
        assert!(matches!(parse_response("<html>", 1), Err(ClientError::Malformed(_))));
    }

    #[test]
    fn test_errors_map_to_service_unavailable() {
        let err: CoreError = ClientError::Malformed("x".to_string()).into();
        assert!(matches!(err, CoreError::ServiceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ValidationClient::new(format!("http://{}", addr), None).unwrap();
        let request = ValidationRequest::new(vec![ToolCall::new("c1", "get_weather")], Default::default());
        let err = client.validate(&request).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
    }
}
