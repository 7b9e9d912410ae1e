//! HTTP transport to the script endpoint.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::action::TransportKind;
use super::envelope::RequestEnvelope;
use super::error::ApiError;

/// Longest body excerpt written to the debug log.
const LOG_SNIPPET_LEN: usize = 200;

/// One request/response exchange with the backend.
///
/// Implementations return the decoded JSON body; shape interpretation is left
/// to the normalizer.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, kind: TransportKind, envelope: &RequestEnvelope) -> Result<Value, ApiError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  url: Url,
  timeout: Duration,
}

impl HttpTransport {
  pub fn new(url: &str, timeout: Duration) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid API url {}: {}", url, e))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      url,
      timeout,
    })
  }

  fn map_error(&self, err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
      ApiError::Timeout(self.timeout)
    } else if err.is_builder() {
      ApiError::Request(err.to_string())
    } else if err.is_decode() {
      ApiError::Malformed(err.to_string())
    } else {
      ApiError::Transport(format!("Network error: {}", err))
    }
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, kind: TransportKind, envelope: &RequestEnvelope) -> Result<Value, ApiError> {
    let request = match kind {
      TransportKind::Get => {
        let mut url = self.url.clone();
        url.query_pairs_mut().extend_pairs(envelope.query_pairs());
        self.client.get(url)
      }
      TransportKind::Post => {
        let body =
          serde_json::to_string(envelope).map_err(|e| ApiError::Request(e.to_string()))?;
        // text/plain keeps the script host on its simple-request path
        self
          .client
          .post(self.url.clone())
          .header(CONTENT_TYPE, "text/plain;charset=utf-8")
          .body(body)
      }
    };

    debug!(action = %envelope.action, ?kind, "sending request");

    let response = request.send().await.map_err(|e| self.map_error(e))?;
    let status = response.status();
    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let text = response.text().await.map_err(|e| self.map_error(e))?;

    debug!(action = %envelope.action, %status, "received response");

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
      return Err(ApiError::Auth(format!("HTTP {}", status.as_u16())));
    }

    if !status.is_success() {
      debug!(action = %envelope.action, body = %snippet(&text), "error response body");
      return Err(ApiError::Transport(format!(
        "HTTP error! status: {}",
        status.as_u16()
      )));
    }

    decode_body(content_type.as_deref(), &text)
  }
}

/// Decode a 2xx body, rejecting anything that is not JSON.
pub fn decode_body(content_type: Option<&str>, text: &str) -> Result<Value, ApiError> {
  let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));

  if !is_json {
    debug!(body = %snippet(text), "non-JSON response received");
    let detail = match content_type {
      Some(ct) => format!("content type {}", ct),
      None => "missing content type".to_string(),
    };
    return Err(ApiError::Deployment(detail));
  }

  serde_json::from_str(text).map_err(|e| {
    if looks_like_markup(text) {
      ApiError::Deployment(format!("Unexpected token < in body ({})", e))
    } else {
      ApiError::Malformed(e.to_string())
    }
  })
}

fn looks_like_markup(text: &str) -> bool {
  text.trim_start().starts_with('<')
}

fn snippet(text: &str) -> String {
  text.chars().take(LOG_SNIPPET_LEN).collect()
}
