use crate::auth::AuthenticationError;
use crate::response::InvocationResult;
use crate::transport::TransportError;

/// Failure to turn a spec source into an [`ApiDescription`](crate::ApiDescription).
///
/// Terminal for the [`ClientHandle`](crate::ClientHandle) being opened: the handle
/// moves to `Failed` and callers must open a fresh one.
#[derive(Debug, derive_more::Error, derive_more::Display)]
#[display("Failed to load API description from '{url}': {cause}")]
pub struct SpecLoadError {
    /// The spec URL (or path) exactly as requested.
    pub url: String,
    /// What went wrong.
    #[error(source)]
    pub cause: SpecLoadCause,
}

/// Underlying cause of a [`SpecLoadError`].
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum SpecLoadCause {
    /// The source is neither an `http(s)`/`file` URL nor a usable local path.
    #[display("Invalid spec source: {message}")]
    #[from(skip)]
    InvalidSource {
        /// Why the source was rejected.
        message: String,
    },

    /// The transport could not fetch the document.
    Transport(TransportError),

    /// The transport produced no response at all.
    #[display("No response received while fetching the document")]
    #[from(skip)]
    NoResponse,

    /// The server answered with a non-success status.
    #[display("Unexpected HTTP status {status} while fetching the document")]
    #[from(skip)]
    HttpStatus {
        /// The status code received.
        status: u16,
    },

    /// The local document could not be read.
    Io(std::io::Error),

    /// The document is not valid JSON.
    Json(serde_json::Error),

    /// The document is not valid YAML.
    #[display("Invalid YAML document: {message}")]
    #[from(skip)]
    Yaml {
        /// Parser message.
        message: String,
    },

    /// The document parsed but is not a Swagger 2.0 / OpenAPI 3.x description.
    #[display("Unsupported API description: {message}")]
    #[from(skip)]
    UnsupportedDocument {
        /// Description of the problem.
        message: String,
    },
}

/// Errors reported by a single invocation.
///
/// These never affect the readiness of the [`ClientHandle`](crate::ClientHandle) nor other
/// in-flight invocations.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum InvokeError {
    /// The handle is `Pending` or `Failed`.
    #[display("Client for '{url}' is not ready (state: {state})")]
    #[from(skip)]
    NotReady {
        /// Spec URL of the handle.
        url: String,
        /// Current handle state.
        state: &'static str,
    },

    /// `(resource, method)` does not resolve to a declared operation.
    #[display("Unknown operation '{resource}.{method}' in API description from '{url}'")]
    #[from(skip)]
    UnknownOperation {
        /// Spec URL of the handle.
        url: String,
        /// Requested resource (tag).
        resource: String,
        /// Requested operation name.
        method: String,
    },

    /// The payload must be JSON for the effective content type but is not.
    #[display("Invalid JSON payload for operation '{operation}': {error}")]
    #[from(skip)]
    PayloadParse {
        /// Operation being invoked.
        operation: String,
        /// Parser error.
        #[error(source)]
        error: serde_json::Error,
    },

    /// Path template still contains placeholders after parameter substitution.
    #[display("Path '{path}' of operation '{operation}' is missing required arguments: {missings:?}")]
    #[from(skip)]
    PathUnresolved {
        /// Operation being invoked.
        operation: String,
        /// The path template.
        path: String,
        /// Names of the unresolved parameters.
        missings: Vec<String>,
    },

    /// The API description gives no usable base URL to call.
    #[display("No base URL available for operation '{operation}'")]
    #[from(skip)]
    MissingBaseUrl {
        /// Operation being invoked.
        operation: String,
    },

    /// The request body could not be encoded for the effective content type.
    #[display("Serialization error for operation '{operation}': {message}")]
    #[from(skip)]
    Serialization {
        /// Operation being invoked.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// Credentials cannot be turned into a header.
    Authentication(AuthenticationError),

    /// URL construction failed.
    UrlError(url::ParseError),

    /// Invalid HTTP header name.
    InvalidHeaderName(http::header::InvalidHeaderName),

    /// Invalid HTTP header value.
    InvalidHeaderValue(http::header::InvalidHeaderValue),

    /// The transport failed (connection refused, TLS, reset...).
    #[display("Transport error for operation '{operation}' ({url}): {error}")]
    #[from(skip)]
    Transport {
        /// Operation being invoked.
        operation: String,
        /// Target URL.
        url: String,
        /// Underlying failure.
        #[error(source)]
        error: TransportError,
    },

    /// The transport produced nothing at all.
    #[display("No response received for operation '{operation}'")]
    #[from(skip)]
    NoResponse {
        /// Operation being invoked.
        operation: String,
    },

    /// The caller cancelled the invocation before it completed.
    #[display("Invocation of operation '{operation}' was cancelled")]
    #[from(skip)]
    Cancelled {
        /// Operation being invoked.
        operation: String,
    },

    /// The server answered with a status outside the success set.
    ///
    /// Carries the normalized result, identical in shape to a successful one.
    #[display("Operation '{operation}' answered with status {}", result.status)]
    #[from(skip)]
    Rejected {
        /// Operation being invoked.
        operation: String,
        /// The normalized response.
        result: InvocationResult,
    },
}

impl InvokeError {
    /// The normalized result when the failure comes from the remote API.
    pub fn result(&self) -> Option<&InvocationResult> {
        match self {
            Self::Rejected { result, .. } => Some(result),
            _ => None,
        }
    }
}
