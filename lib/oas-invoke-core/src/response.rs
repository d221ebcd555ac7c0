//! Response normalization.
//!
//! Every raw response maps to the same `{status, payload}` shape: the body is
//! parsed as JSON when possible and kept as text otherwise. Only a missing
//! response is an error.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::transport::RawResponse;

/// Uniform result of an invocation, on both the success and error channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult {
    /// Raw HTTP status code.
    pub status: u16,
    /// Normalized body.
    pub payload: ResultPayload,
}

/// Normalized response body.
///
/// Serialization is one-way: a text body and a JSON string body look alike.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultPayload {
    /// The body parsed as JSON.
    Json(Value),
    /// The body as (lossy UTF-8) text.
    Text(String),
}

impl ResultPayload {
    /// The payload as a JSON value; text becomes a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        }
    }

    /// The parsed JSON, if the body was JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// The raw text, if the body was not JSON.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

/// The transport completed without producing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Error, derive_more::Display)]
#[display("No response received")]
pub struct NoResponse;

/// Maps a raw response to an [`InvocationResult`].
///
/// Total for any defined response: a body that is not JSON becomes a text
/// payload and a diagnostic event is emitted on `oas_invoke::normalize`.
pub fn normalize(raw: Option<RawResponse>) -> Result<InvocationResult, NoResponse> {
    let raw = raw.ok_or(NoResponse)?;

    let payload = match serde_json::from_slice::<Value>(&raw.body) {
        Ok(value) => ResultPayload::Json(value),
        Err(error) => {
            warn!(
                target: "oas_invoke::normalize",
                status = raw.status,
                length = raw.body.len(),
                %error,
                "response body is not JSON, falling back to text"
            );
            ResultPayload::Text(String::from_utf8_lossy(&raw.body).into_owned())
        }
    };

    Ok(InvocationResult {
        status: raw.status,
        payload,
    })
}
