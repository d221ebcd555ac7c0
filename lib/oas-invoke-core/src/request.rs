use bytes::Bytes;
use serde_json::Value;

use crate::content::ContentTypes;
use crate::error::InvokeError;

/// Raw payload supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    /// No payload: the call is made with an empty parameter set.
    #[default]
    Empty,
    /// Text, parsed as JSON when the request content type is JSON.
    Text(String),
    /// Bytes, parsed as JSON when the request content type is JSON.
    Bytes(Bytes),
    /// An already structured value, taken as is.
    Structured(Value),
}

impl Payload {
    /// `true` for [`Payload::Empty`] and zero-length text or bytes.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Structured(_) => false,
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

impl From<Option<Value>> for Payload {
    /// Message payloads: `null`/absent is empty, a JSON string is raw text.
    fn from(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Empty,
            Some(Value::String(text)) => Self::Text(text),
            Some(value) => Self::Structured(value),
        }
    }
}

/// Input of one invocation: which operation, with what payload.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub(crate) resource: String,
    pub(crate) method: String,
    pub(crate) payload: Payload,
    pub(crate) request_content_type: Option<String>,
    pub(crate) response_content_type: Option<String>,
}

impl InvocationRequest {
    /// Targets the operation `method` of `resource`, without payload.
    pub fn new(resource: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            method: method.into(),
            payload: Payload::Empty,
            request_content_type: None,
            response_content_type: None,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Overrides the request content type.
    #[must_use]
    pub fn with_request_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.request_content_type = Some(content_type.into());
        self
    }

    /// Overrides the response content type.
    #[must_use]
    pub fn with_response_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.response_content_type = Some(content_type.into());
        self
    }

    /// Resource (tag) name.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Operation name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The raw payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Effective call parameters after payload normalization.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Parameters {
    /// No payload.
    Empty,
    /// A JSON value: parsed from the payload or given structured.
    Structured(Value),
    /// Raw content for a non-JSON content type, sent verbatim.
    Opaque(Bytes),
}

impl Parameters {
    /// Normalizes a payload for the effective request content type.
    pub(crate) fn normalize(
        operation: &str,
        payload: &Payload,
        content_types: &ContentTypes,
    ) -> Result<Self, InvokeError> {
        if payload.is_empty() {
            return Ok(Self::Empty);
        }

        let parse_error = |error| InvokeError::PayloadParse {
            operation: operation.to_string(),
            error,
        };
        let parameters = match payload {
            Payload::Empty => Self::Empty,
            Payload::Structured(value) => Self::Structured(value.clone()),
            Payload::Text(text) if content_types.request_is_json() => {
                Self::Structured(serde_json::from_str(text).map_err(parse_error)?)
            }
            Payload::Bytes(bytes) if content_types.request_is_json() => {
                Self::Structured(serde_json::from_slice(bytes).map_err(parse_error)?)
            }
            Payload::Text(text) => Self::Opaque(Bytes::from(text.clone())),
            Payload::Bytes(bytes) => Self::Opaque(bytes.clone()),
        };
        Ok(parameters)
    }

    /// Looks a named value up in a structured object parameter set.
    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Structured(Value::Object(object)) => object.get(name),
            _ => None,
        }
    }
}
