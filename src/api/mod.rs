pub mod ask;
pub mod registry;

use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};

/// Client for the local PDF question-answering service.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        // A trailing slash makes `Url::join` append instead of replacing the last segment.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Endpoint with `segment` appended as one percent-encoded path segment.
    fn endpoint_with_segment(&self, path: &str, segment: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }
}

/// Reply envelope shared by the upload and delete endpoints.
///
/// The service reports failures with HTTP 200 and an `error` field.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceReply {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub chunks: Option<u32>,
    #[serde(default)]
    pub collection_name: Option<String>,
}

impl ServiceReply {
    pub fn into_result(self) -> Result<Self, ApiError> {
        match self.error {
            Some(error) => Err(ApiError::Service(error)),
            None => Ok(self),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Service(String),
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Turns a non-2xx response into `ApiError::Status` carrying the body text.
pub(crate) async fn check_status(resp: Response) -> Result<Response, ApiError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = BackendClient::new("http://localhost:8000/api").unwrap();
        assert_eq!(
            client.endpoint("list-pdfs").unwrap().as_str(),
            "http://localhost:8000/api/list-pdfs"
        );
    }

    #[test]
    fn test_segment_is_percent_encoded() {
        let client = BackendClient::new("http://localhost:8000").unwrap();
        let url = client
            .endpoint_with_segment("delete-pdf/", "my report?.pdf")
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/delete-pdf/my%20report%3F.pdf");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            BackendClient::new("not a url"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_service_reply_error_field() {
        let reply: ServiceReply = serde_json::from_str(r#"{"error":"API key missing"}"#).unwrap();
        match reply.into_result() {
            Err(ApiError::Service(msg)) => assert_eq!(msg, "API key missing"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
