//! Outbound HTTP clients for the two collaborators.
//!
//! - [`GraphClient`]: Messenger Graph API (user profile + Send API)
//! - [`CatalogClient`]: product catalog lookups
//!
//! Both wrap the same pooled `reqwest::Client` and report failures as
//! [`ApiError`].

pub mod catalog;
pub mod graph;
pub mod types;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

pub use catalog::CatalogClient;
pub use graph::GraphClient;
pub use types::{
    Attachment, AttachmentPayload, MessageBody, OutboundMessage, Product, Recipient,
    SendResponse, UserInfo,
};

/// Longest response body excerpt kept in an error.
const MAX_ERROR_BODY: usize = 512;

/// Failure of a single outbound call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("cannot build request url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status if the collaborator answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode(_) | ApiError::InvalidUrl(_) => None,
        }
    }
}

/// Append path segments to a base URL, percent-encoding each one.
///
/// Empty, `.` and `..` segments are rejected rather than silently dropped, so
/// a caller-supplied id can never address a different route.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
    if let Some(bad) = segments
        .iter()
        .find(|s| s.is_empty() || **s == "." || **s == "..")
    {
        return Err(ApiError::InvalidUrl(format!("path segment {bad:?}")));
    }

    let mut url = Url::parse(base).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidUrl(format!("{base} cannot be a base")))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

/// Read a response, requiring exactly 200 OK, and return its body text.
async fn expect_ok(response: Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if status != StatusCode::OK {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: truncate(body, MAX_ERROR_BODY),
        });
    }

    Ok(body)
}

/// Read a 200 OK response and decode it as JSON.
async fn expect_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = expect_ok(response).await?;
    Ok(serde_json::from_str(&body)?)
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
