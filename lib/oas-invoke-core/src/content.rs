//! Two-sided content-type resolution.
//!
//! The request and the response content types are resolved independently with
//! the same precedence: explicit per-call override, then the first type the
//! operation declares, then `application/json`.

use mime::Mime;

use crate::description::Operation;

/// Content type used when neither an override nor a declaration is available.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Resolved request/response content types of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypes {
    /// Sent as `Content-Type` of the request body.
    pub request: String,
    /// Sent as `Accept`.
    pub response: String,
}

impl ContentTypes {
    /// Resolves both sides for an operation.
    pub fn resolve(
        operation: &Operation,
        request_override: Option<&str>,
        response_override: Option<&str>,
    ) -> Self {
        Self {
            request: resolve_content_type(request_override, operation.consumes()),
            response: resolve_content_type(response_override, operation.produces()),
        }
    }

    /// Whether the request payload must be JSON.
    pub fn request_is_json(&self) -> bool {
        is_json(&self.request)
    }
}

/// Applies the precedence `override → first declared → application/json`.
///
/// Blank overrides count as absent.
pub fn resolve_content_type(override_type: Option<&str>, declared: &[String]) -> String {
    override_type
        .map(str::trim)
        .filter(|content_type| !content_type.is_empty())
        .or_else(|| declared.first().map(String::as_str))
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

fn parse(content_type: &str) -> Option<Mime> {
    content_type.trim().parse::<Mime>().ok()
}

/// `application/json` and any `+json` structured syntax suffix.
pub fn is_json(content_type: &str) -> bool {
    parse(content_type).is_some_and(|mime| {
        mime.essence_str() == mime::APPLICATION_JSON.essence_str()
            || mime.suffix() == Some(mime::JSON)
    })
}

/// `application/x-www-form-urlencoded`.
pub fn is_form(content_type: &str) -> bool {
    parse(content_type).is_some_and(|mime| {
        mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str()
    })
}
