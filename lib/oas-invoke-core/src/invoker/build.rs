use std::sync::LazyLock;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::auth::Authentication;
use crate::content::{self, ContentTypes};
use crate::description::{Operation, ParamLocation};
use crate::error::InvokeError;
use crate::request::Parameters;

/// Placeholders of a path template, e.g. `{petId}`.
static RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(?<name>[^{}/]+)}").expect("a valid regex"));

/// Everything but RFC 3986 unreserved characters is encoded in path segments.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Builds the single HTTP request of an invocation.
pub(super) struct RequestBuilder<'a> {
    pub(super) operation: &'a Operation,
    pub(super) base_url: Option<&'a Url>,
    pub(super) parameters: &'a Parameters,
    pub(super) content_types: &'a ContentTypes,
    pub(super) authentication: Option<&'a Authentication>,
}

impl RequestBuilder<'_> {
    pub(super) fn build(&self) -> Result<reqwest::Request, InvokeError> {
        let operation_name = self.operation.name();
        let base_url = self
            .base_url
            .ok_or_else(|| InvokeError::MissingBaseUrl {
                operation: operation_name.to_string(),
            })?;

        let path = self.resolve_path()?;
        // `./` keeps a first segment like `search:run` from parsing as a scheme.
        let relative = format!("./{}", path.trim_start_matches('/'));
        let mut url = base_url.join(&relative)?;
        self.append_query(&mut url);

        let mut request = reqwest::Request::new(self.operation.method().clone(), url);
        let headers = request.headers_mut();
        headers.insert(ACCEPT, HeaderValue::from_str(&self.content_types.response)?);
        self.insert_headers(headers)?;
        if let Some(authentication) = self.authentication {
            let (name, value) = authentication.to_header()?;
            headers.insert(name, value);
        }

        if let Some(body) = self.body()? {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_str(&self.content_types.request)?,
            );
            *request.body_mut() = Some(reqwest::Body::from(body));
        }

        Ok(request)
    }

    /// Substitutes placeholders with percent-encoded parameter values.
    fn resolve_path(&self) -> Result<String, InvokeError> {
        let template = self.operation.path();
        let mut missings = Vec::<String>::new();

        let path = RE.replace_all(template, |captures: &regex::Captures<'_>| {
            let name = captures.name("name").map_or("", |name| name.as_str());
            match self.parameters.get(name).and_then(scalar_to_string) {
                Some(value) => utf8_percent_encode(&value, PATH_SEGMENT).to_string(),
                None => {
                    if !missings.iter().any(|missing| missing == name) {
                        missings.push(name.to_string());
                    }
                    captures
                        .get(0)
                        .map_or_else(String::new, |all| all.as_str().to_string())
                }
            }
        });

        if missings.is_empty() {
            Ok(path.into_owned())
        } else {
            Err(InvokeError::PathUnresolved {
                operation: self.operation.name().to_string(),
                path: template.to_string(),
                missings,
            })
        }
    }

    fn append_query(&self, url: &mut Url) {
        let mut pairs = Vec::<(&str, String)>::new();
        for param in self.operation.parameters_in(ParamLocation::Query) {
            match self.parameters.get(param.name()) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => pairs.extend(
                    items
                        .iter()
                        .filter_map(scalar_to_string)
                        .map(|value| (param.name(), value)),
                ),
                Some(value) => {
                    if let Some(value) = scalar_to_string(value) {
                        pairs.push((param.name(), value));
                    }
                }
            }
        }

        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
    }

    fn insert_headers(&self, headers: &mut HeaderMap) -> Result<(), InvokeError> {
        for param in self.operation.parameters_in(ParamLocation::Header) {
            if let Some(value) = self.parameters.get(param.name()).and_then(scalar_to_string) {
                let name = HeaderName::from_bytes(param.name().as_bytes())?;
                headers.insert(name, HeaderValue::from_str(&value)?);
            }
        }

        let cookies = self
            .operation
            .parameters_in(ParamLocation::Cookie)
            .filter_map(|param| {
                let value = self.parameters.get(param.name()).and_then(scalar_to_string)?;
                Some(format!("{}={value}", param.name()))
            })
            .collect::<Vec<_>>();
        if !cookies.is_empty() {
            headers.insert(COOKIE, HeaderValue::from_str(&cookies.join("; "))?);
        }
        Ok(())
    }

    /// The encoded body, if one has to be sent.
    fn body(&self) -> Result<Option<Bytes>, InvokeError> {
        let value = match self.parameters {
            Parameters::Empty => return Ok(None),
            Parameters::Opaque(bytes) => return Ok(Some(bytes.clone())),
            Parameters::Structured(_) if !self.operation.accepts_body() => {
                warn!(
                    operation = %self.operation.name(),
                    "operation declares no body, payload only used for parameters"
                );
                return Ok(None);
            }
            Parameters::Structured(value) => self
                .operation
                .body_parameter()
                .and_then(|param| self.parameters.get(param.name()))
                .unwrap_or(value),
        };

        let content_type = &self.content_types.request;
        let serialization_error = |message: String| InvokeError::Serialization {
            operation: self.operation.name().to_string(),
            message,
        };
        let data = if content::is_form(content_type) {
            serde_urlencoded::to_string(value)
                .map_err(|error| serialization_error(format!("Failed to serialize form data: {error}")))?
                .into_bytes()
        } else if let (false, Value::String(text)) = (content::is_json(content_type), value) {
            text.clone().into_bytes()
        } else {
            serde_json::to_vec(value)
                .map_err(|error| serialization_error(format!("Failed to serialize JSON: {error}")))?
        };
        Ok(Some(Bytes::from(data)))
    }
}

/// String form of a scalar parameter value; objects and arrays are sent as JSON text.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}
