//! # oas-invoke core
//!
//! Invoke operations of a remote HTTP API described by a Swagger 2.0 or
//! OpenAPI 3.x document.
//!
//! The crate is organized around four pieces:
//! - **[`SpecRegistry`]** loads, parses and caches the [`ApiDescription`] of a spec URL,
//! - **[`ClientLifecycle`]** turns a spec URL into a [`ClientHandle`] that is
//!   `Pending`, then `Ready` or `Failed`,
//! - **[`OperationInvoker`]** resolves `(resource, method)` to an operation and
//!   performs exactly one HTTP request per invocation,
//! - **[`normalize`]** maps the raw response to a uniform `{status, payload}` [`InvocationResult`].
//!
//! The [`node`] module adapts all of this to a message-driven flow.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oas_invoke_core::{ClientLifecycle, InvocationRequest, InvokeError};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let lifecycle = ClientLifecycle::builder().build();
//! let handle = lifecycle
//!     .open("https://petstore.swagger.io/v2/swagger.json")
//!     .await;
//!
//! let request = InvocationRequest::new("pet", "getPetById").with_payload(r#"{"petId": 1}"#);
//! match lifecycle.invoker().invoke(&handle, request).await {
//!     Ok(result) => println!("{}: {:?}", result.status, result.payload),
//!     Err(InvokeError::Rejected { result, .. }) => eprintln!("rejected with {}", result.status),
//!     Err(error) => eprintln!("{error}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error channels
//!
//! Responses with a status in the [`SuccessStatuses`] (`2xx` by default) are
//! returned as `Ok`. Any other status yields [`InvokeError::Rejected`], which
//! carries the same [`InvocationResult`] shape. Every other [`InvokeError`]
//! variant is local to the invocation and never changes the handle state.
//!
//! ## Features
//!
//! - `yaml` (default): accept YAML documents, parsed with `serde-saphyr`.

mod auth;
mod content;
mod description;
mod error;
mod invoker;
mod lifecycle;
pub mod node;
mod registry;
mod request;
mod response;
mod status;
mod transport;

pub use self::auth::{
    AuthType, Authentication, AuthenticationError, Credentials, SecureString,
};
pub use self::content::{ContentTypes, DEFAULT_CONTENT_TYPE, is_form, is_json, resolve_content_type};
pub use self::description::{
    ApiDescription, DEFAULT_RESOURCE, Operation, ParamLocation, Parameter, Resource, SpecVersion,
};
pub use self::error::{InvokeError, SpecLoadCause, SpecLoadError};
pub use self::invoker::{CancelTrigger, Cancellation, OperationInvoker, cancellation};
pub use self::lifecycle::{
    ClientHandle, ClientLifecycle, ClientLifecycleBuilder, HandleState, LifecycleEvent,
};
pub use self::registry::SpecRegistry;
pub use self::request::{InvocationRequest, Payload};
pub use self::response::{InvocationResult, NoResponse, ResultPayload, normalize};
pub use self::status::SuccessStatuses;
pub use self::transport::{RawResponse, ReqwestTransport, Transport, TransportError};

/// Creates a [`SuccessStatuses`] from status codes and ranges.
///
/// - Single codes: `200`, `201`
/// - Inclusive ranges: `200-299`
/// - Exclusive ranges: `200..300`
///
/// # Examples
///
/// ```rust
/// use oas_invoke_core::success_statuses;
///
/// let statuses = success_statuses!(200-299, 304, 404);
/// assert!(statuses.contains(204));
/// assert!(statuses.contains(404));
/// assert!(!statuses.contains(500));
/// ```
#[macro_export]
macro_rules! success_statuses {
    () => {
        $crate::SuccessStatuses::default()
    };

    ($single:literal) => {
        $crate::SuccessStatuses::from_single($single)
    };

    ($start:literal - $end:literal) => {
        $crate::SuccessStatuses::from_inclusive_range($start..=$end)
    };

    ($start:literal .. $end:literal) => {
        $crate::SuccessStatuses::from_exclusive_range($start..$end)
    };

    ($first:literal, $($rest:tt)*) => {{
        #[allow(unused_mut)]
        let mut statuses = $crate::SuccessStatuses::from_single($first);
        $crate::success_statuses!(@accumulate statuses, $($rest)*);
        statuses
    }};

    ($start:literal - $end:literal, $($rest:tt)*) => {{
        #[allow(unused_mut)]
        let mut statuses = $crate::SuccessStatuses::from_inclusive_range($start..=$end);
        $crate::success_statuses!(@accumulate statuses, $($rest)*);
        statuses
    }};

    ($start:literal .. $end:literal, $($rest:tt)*) => {{
        #[allow(unused_mut)]
        let mut statuses = $crate::SuccessStatuses::from_exclusive_range($start..$end);
        $crate::success_statuses!(@accumulate statuses, $($rest)*);
        statuses
    }};

    (@accumulate $statuses:ident,) => {};

    (@accumulate $statuses:ident) => {};

    (@accumulate $statuses:ident, $single:literal $(, $($rest:tt)*)?) => {
        $statuses = $statuses.add_single($single);
        $crate::success_statuses!(@accumulate $statuses $(, $($rest)*)?);
    };

    (@accumulate $statuses:ident, $start:literal - $end:literal $(, $($rest:tt)*)?) => {
        $statuses = $statuses.add_inclusive_range($start..=$end);
        $crate::success_statuses!(@accumulate $statuses $(, $($rest)*)?);
    };

    (@accumulate $statuses:ident, $start:literal .. $end:literal $(, $($rest:tt)*)?) => {
        $statuses = $statuses.add_exclusive_range($start..$end);
        $crate::success_statuses!(@accumulate $statuses $(, $($rest)*)?);
    };
}
