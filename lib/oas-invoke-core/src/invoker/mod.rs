//! Operation invocation.
//!
//! [`OperationInvoker::invoke`] resolves `(resource, method)` against a ready
//! [`ClientHandle`], normalizes the payload, performs exactly one HTTP exchange
//! and normalizes the response. Nothing touches the network before the handle
//! and the operation are validated.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::content::ContentTypes;
use crate::description::Operation;
use crate::error::InvokeError;
use crate::lifecycle::ClientHandle;
use crate::request::{InvocationRequest, Parameters};
use crate::response::{InvocationResult, normalize};
use crate::status::SuccessStatuses;
use crate::transport::{RawResponse, ReqwestTransport, Transport, TransportError};

mod build;
mod cancel;

pub use self::cancel::{CancelTrigger, Cancellation, cancellation};

use self::build::RequestBuilder;

/// Invokes operations of ready client handles.
///
/// Cheap to clone; clones share the transport. Invocations are independent:
/// there is no per-handle lock and no retry.
#[derive(Debug)]
pub struct OperationInvoker<T = ReqwestTransport> {
    transport: Arc<T>,
    success: SuccessStatuses,
}

impl<T> Clone for OperationInvoker<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            success: self.success.clone(),
        }
    }
}

impl Default for OperationInvoker {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::default()))
    }
}

/// A validated invocation, ready to be sent.
struct Prepared {
    operation: Arc<Operation>,
    request: reqwest::Request,
}

impl<T> OperationInvoker<T>
where
    T: Transport,
{
    /// Creates an invoker sending requests through `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            success: SuccessStatuses::default(),
        }
    }

    /// Sets the statuses delivered on the success channel.
    #[must_use]
    pub fn with_success_statuses(mut self, success: SuccessStatuses) -> Self {
        self.success = success;
        self
    }

    /// Performs one invocation.
    ///
    /// # Errors
    ///
    /// - [`InvokeError::NotReady`] and [`InvokeError::UnknownOperation`] without any network call,
    /// - [`InvokeError::PayloadParse`] and the request building errors, also without network call,
    /// - [`InvokeError::Transport`] or [`InvokeError::NoResponse`] when the exchange fails,
    /// - [`InvokeError::Rejected`] with the normalized result for a non-success status.
    pub async fn invoke(
        &self,
        handle: &ClientHandle,
        request: InvocationRequest,
    ) -> Result<InvocationResult, InvokeError> {
        let Prepared { operation, request } = prepare(handle, &request)?;
        let url = request.url().to_string();

        let outcome = self.transport.send(request).await;
        self.complete(&operation, url, outcome)
    }

    /// Like [`invoke`](Self::invoke), resolving with [`InvokeError::Cancelled`] as soon as
    /// `cancellation` fires.
    ///
    /// The exchange runs on its own task: on cancellation it is abandoned and
    /// left to complete in the background, its outcome discarded.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke), plus [`InvokeError::Cancelled`].
    pub async fn invoke_cancellable(
        &self,
        handle: &ClientHandle,
        request: InvocationRequest,
        cancellation: &Cancellation,
    ) -> Result<InvocationResult, InvokeError> {
        let Prepared { operation, request } = prepare(handle, &request)?;
        let cancelled = || InvokeError::Cancelled {
            operation: operation.name().to_string(),
        };
        if cancellation.is_cancelled() {
            return Err(cancelled());
        }
        let url = request.url().to_string();

        let transport = Arc::clone(&self.transport);
        let mut exchange = tokio::spawn(async move { transport.send(request).await });

        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                debug!(operation = %operation.name(), %url, "invocation cancelled, abandoning the exchange");
                Err(cancelled())
            }
            joined = &mut exchange => {
                let outcome = joined.unwrap_or_else(|error| {
                    Err(TransportError::Other {
                        message: format!("exchange task failed: {error}"),
                    })
                });
                self.complete(&operation, url, outcome)
            }
        }
    }

    fn complete(
        &self,
        operation: &Operation,
        url: String,
        outcome: Result<Option<RawResponse>, TransportError>,
    ) -> Result<InvocationResult, InvokeError> {
        let operation_name = operation.name();
        let raw = outcome.map_err(|error| {
            warn!(operation = %operation_name, %url, %error, "transport failure");
            InvokeError::Transport {
                operation: operation_name.to_string(),
                url,
                error,
            }
        })?;

        let result = normalize(raw).map_err(|_| InvokeError::NoResponse {
            operation: operation_name.to_string(),
        })?;
        debug!(operation = %operation_name, status = result.status, "invocation completed");

        if self.success.contains(result.status) {
            Ok(result)
        } else {
            Err(InvokeError::Rejected {
                operation: operation_name.to_string(),
                result,
            })
        }
    }
}

/// Validates the handle and the operation, then builds the HTTP request.
fn prepare(handle: &ClientHandle, request: &InvocationRequest) -> Result<Prepared, InvokeError> {
    let Some(description) = handle.description() else {
        return Err(InvokeError::NotReady {
            url: handle.url().to_string(),
            state: handle.state().name(),
        });
    };

    let operation = description
        .operation(request.resource(), request.method())
        .cloned()
        .ok_or_else(|| InvokeError::UnknownOperation {
            url: handle.url().to_string(),
            resource: request.resource().to_string(),
            method: request.method().to_string(),
        })?;

    let content_types = ContentTypes::resolve(
        &operation,
        request.request_content_type.as_deref(),
        request.response_content_type.as_deref(),
    );
    let parameters = Parameters::normalize(operation.name(), request.payload(), &content_types)?;

    let http_request = RequestBuilder {
        operation: &operation,
        base_url: description.base_url(),
        parameters: &parameters,
        content_types: &content_types,
        authentication: handle.authentication(),
    }
    .build()?;
    debug!(
        operation = %operation.name(),
        method = %http_request.method(),
        url = %http_request.url(),
        request_content_type = %content_types.request,
        response_content_type = %content_types.response,
        "invoking operation"
    );

    Ok(Prepared {
        operation,
        request: http_request,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::Method;
    use insta::assert_debug_snapshot;
    use rstest::rstest;
    use serde_json::{Value, json};
    use tokio::sync::Notify;

    use super::*;
    use crate::lifecycle::ClientLifecycle;
    use crate::request::Payload;
    use crate::response::ResultPayload;
    use crate::transport::mock::{MockReply, MockTransport};

    const SPEC_URL: &str = "http://pets.test/swagger.json";

    const SWAGGER: &str = r#"{
        "swagger": "2.0",
        "info": { "title": "Pets", "version": "1.0" },
        "host": "pets.test",
        "basePath": "/api",
        "paths": {
            "/pets": {
                "post": {
                    "tags": ["pet"],
                    "operationId": "addPet",
                    "consumes": ["application/json", "text/plain"],
                    "parameters": [{ "name": "pet", "in": "body", "schema": { "type": "object" } }]
                }
            },
            "/pets/{petId}": {
                "get": {
                    "tags": ["pet"],
                    "operationId": "getPet",
                    "produces": ["application/json"],
                    "parameters": [{ "name": "petId", "in": "path", "required": true, "type": "integer" }]
                }
            },
            "/notes": {
                "put": {
                    "tags": ["note"],
                    "operationId": "putNote",
                    "consumes": ["text/plain"],
                    "produces": ["text/plain"],
                    "parameters": [{ "name": "note", "in": "body", "schema": { "type": "string" } }]
                }
            }
        }
    }"#;

    const ADD_PET_URL: &str = "http://pets.test/api/pets";

    async fn ready(transport: &MockTransport) -> (ClientLifecycle<MockTransport>, ClientHandle) {
        let lifecycle = ClientLifecycle::builder()
            .with_transport(transport.clone())
            .build();
        let handle = lifecycle.open(SPEC_URL).await;
        assert!(handle.is_ready(), "handle should be ready: {:?}", handle.state());
        (lifecycle, handle)
    }

    fn transport() -> MockTransport {
        MockTransport::default().respond(Method::GET, SPEC_URL, 200, SWAGGER)
    }

    #[tokio::test]
    async fn test_json_payload_scenario() {
        let transport = transport().respond(Method::POST, ADD_PET_URL, 200, r#"{"ok":true}"#);
        let (lifecycle, handle) = ready(&transport).await;

        let result = lifecycle
            .invoker()
            .invoke(
                &handle,
                InvocationRequest::new("pet", "addPet").with_payload(r#"{"id":42}"#),
            )
            .await
            .expect("success");

        assert_eq!(
            result,
            InvocationResult {
                status: 200,
                payload: ResultPayload::Json(json!({"ok": true})),
            }
        );
        let sent = transport.last();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.url, ADD_PET_URL);
        assert_eq!(sent.json_body(), json!({"id": 42}));
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.header("accept"), Some("application/json"));
    }

    #[rstest]
    #[case::object(r#"{"id":42,"tags":["a","b"],"owner":{"name":"Ann"}}"#)]
    #[case::array(r"[1,2,3]")]
    #[case::number("42")]
    #[case::string(r#""rex""#)]
    #[case::null_in_object(r#"{"id":null}"#)]
    #[tokio::test]
    async fn test_json_payload_is_sent_as_parsed(#[case] payload: &str) {
        let transport = transport().respond(Method::POST, ADD_PET_URL, 200, "{}");
        let (lifecycle, handle) = ready(&transport).await;

        lifecycle
            .invoker()
            .invoke(&handle, InvocationRequest::new("pet", "addPet").with_payload(payload))
            .await
            .expect("success");

        let expected = serde_json::from_str::<Value>(payload).expect("valid JSON");
        assert_eq!(transport.last().json_body(), expected);
    }

    #[tokio::test]
    async fn test_non_json_payload_passes_through_byte_for_byte() {
        let transport = transport().respond(Method::PUT, "http://pets.test/api/notes", 200, "stored");
        let (lifecycle, handle) = ready(&transport).await;
        let payload = "  not {json} at all\n";

        let result = lifecycle
            .invoker()
            .invoke(&handle, InvocationRequest::new("note", "putNote").with_payload(payload))
            .await
            .expect("success");

        let sent = transport.last();
        assert_eq!(sent.body.as_deref(), Some(payload.as_bytes()));
        assert_eq!(sent.header("content-type"), Some("text/plain"));
        assert_eq!(sent.header("accept"), Some("text/plain"));
        assert_eq!(result.payload, ResultPayload::Text("stored".to_string()));
    }

    #[tokio::test]
    async fn test_content_type_override() {
        let transport = transport().respond(Method::POST, ADD_PET_URL, 201, "{}");
        let (lifecycle, handle) = ready(&transport).await;

        lifecycle
            .invoker()
            .invoke(
                &handle,
                InvocationRequest::new("pet", "addPet")
                    .with_payload("raw text")
                    .with_request_content_type("text/plain")
                    .with_response_content_type("application/xml"),
            )
            .await
            .expect("success");

        let sent = transport.last();
        assert_eq!(sent.body.as_deref(), Some(&b"raw text"[..]));
        assert_eq!(sent.header("content-type"), Some("text/plain"));
        assert_eq!(sent.header("accept"), Some("application/xml"));
    }

    #[tokio::test]
    async fn test_error_status_scenario() {
        let transport = transport().respond(
            Method::GET,
            "http://pets.test/api/pets/7",
            500,
            "internal error",
        );
        let (lifecycle, handle) = ready(&transport).await;

        let error = lifecycle
            .invoker()
            .invoke(
                &handle,
                InvocationRequest::new("pet", "getPet").with_payload(json!({"petId": 7})),
            )
            .await
            .expect_err("error channel");

        let InvokeError::Rejected { operation, result } = error else {
            panic!("expected a rejected result, got {error:?}");
        };
        assert_eq!(operation, "getPet");
        assert_eq!(
            result,
            InvocationResult {
                status: 500,
                payload: ResultPayload::Text("internal error".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_custom_success_statuses() {
        let transport = transport().respond(Method::GET, "http://pets.test/api/pets/7", 404, "{}");
        let (lifecycle, handle) = ready(&transport).await;
        let invoker = lifecycle
            .invoker()
            .with_success_statuses(SuccessStatuses::default().add_single(404));

        let result = invoker
            .invoke(
                &handle,
                InvocationRequest::new("pet", "getPet").with_payload(json!({"petId": 7})),
            )
            .await
            .expect("404 accepted");

        assert_eq!(result.status, 404);
    }

    #[tokio::test]
    async fn test_unknown_operation_makes_no_call() {
        let transport = transport();
        let (lifecycle, handle) = ready(&transport).await;
        let calls = transport.calls();

        let error = lifecycle
            .invoker()
            .invoke(&handle, InvocationRequest::new("pet", "deletePet"))
            .await
            .expect_err("unknown operation");

        assert_debug_snapshot!(error, @r#"
        UnknownOperation {
            url: "http://pets.test/swagger.json",
            resource: "pet",
            method: "deletePet",
        }
        "#);
        assert_eq!(transport.calls(), calls);
    }

    #[tokio::test]
    async fn test_invalid_json_payload_makes_no_call() {
        let transport = transport();
        let (lifecycle, handle) = ready(&transport).await;
        let calls = transport.calls();

        let error = lifecycle
            .invoker()
            .invoke(
                &handle,
                InvocationRequest::new("pet", "addPet").with_payload("{id: 42"),
            )
            .await
            .expect_err("invalid JSON");

        assert!(matches!(error, InvokeError::PayloadParse { .. }), "{error:?}");
        assert!(error.to_string().contains("addPet"));
        assert_eq!(transport.calls(), calls);
    }

    #[tokio::test]
    async fn test_missing_path_parameter_makes_no_call() {
        let transport = transport();
        let (lifecycle, handle) = ready(&transport).await;
        let calls = transport.calls();

        let error = lifecycle
            .invoker()
            .invoke(&handle, InvocationRequest::new("pet", "getPet"))
            .await
            .expect_err("missing petId");

        assert!(matches!(error, InvokeError::PathUnresolved { .. }), "{error:?}");
        assert_eq!(transport.calls(), calls);
    }

    #[rstest]
    #[case::no_response(MockReply::NoResponse)]
    #[case::transport(MockReply::Fail("connection refused".to_string()))]
    #[tokio::test]
    async fn test_exchange_failures(#[case] reply: MockReply) {
        let transport = transport().route(Method::POST, ADD_PET_URL, reply);
        let (lifecycle, handle) = ready(&transport).await;

        let error = lifecycle
            .invoker()
            .invoke(&handle, InvocationRequest::new("pet", "addPet"))
            .await
            .expect_err("exchange failure");

        assert!(error.to_string().contains("addPet"), "{error}");
        assert!(
            matches!(
                error,
                InvokeError::NoResponse { .. } | InvokeError::Transport { .. }
            ),
            "{error:?}"
        );
        assert_eq!(error.result(), None);
    }

    #[tokio::test]
    async fn test_transport_error_carries_url_and_cause() {
        let transport = transport().route(
            Method::POST,
            ADD_PET_URL,
            MockReply::Fail("connection refused".to_string()),
        );
        let (lifecycle, handle) = ready(&transport).await;

        let error = lifecycle
            .invoker()
            .invoke(&handle, InvocationRequest::new("pet", "addPet"))
            .await
            .expect_err("transport failure");

        assert_eq!(
            error.to_string(),
            "Transport error for operation 'addPet' (http://pets.test/api/pets): connection refused"
        );
    }

    #[tokio::test]
    async fn test_each_invocation_is_one_attempt() {
        let transport = transport().respond(Method::POST, ADD_PET_URL, 503, "unavailable");
        let (lifecycle, handle) = ready(&transport).await;
        let calls = transport.calls();

        let _ = lifecycle
            .invoker()
            .invoke(&handle, InvocationRequest::new("pet", "addPet"))
            .await;

        assert_eq!(transport.calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_hung_call() {
        let transport = transport().route(Method::POST, ADD_PET_URL, MockReply::Hang);
        let (lifecycle, handle) = ready(&transport).await;
        let (trigger, cancellation) = cancellation();
        let invoker = lifecycle.invoker();

        let call = invoker.invoke_cancellable(
            &handle,
            InvocationRequest::new("pet", "addPet").with_payload(Payload::Empty),
            &cancellation,
        );
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(2), async {
            tokio::join!(call, cancel)
        })
        .await
        .expect("cancellation resolves the call");

        let Err(InvokeError::Cancelled { operation }) = result else {
            panic!("expected a cancelled invocation, got {result:?}");
        };
        assert_eq!(operation, "addPet");
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_call() {
        let transport = transport();
        let (lifecycle, handle) = ready(&transport).await;
        let calls = transport.calls();
        let (trigger, cancellation) = cancellation();
        trigger.cancel();

        let result = lifecycle
            .invoker()
            .invoke_cancellable(&handle, InvocationRequest::new("pet", "addPet"), &cancellation)
            .await;

        assert!(matches!(result, Err(InvokeError::Cancelled { .. })));
        assert_eq!(transport.calls(), calls);
    }

    #[tokio::test]
    async fn test_cancellable_completes_when_not_cancelled() {
        let gate = Arc::new(Notify::new());
        let transport = transport().route(
            Method::POST,
            ADD_PET_URL,
            MockReply::Gated {
                gate: Arc::clone(&gate),
                status: 200,
                body: r#"{"ok":true}"#.to_string(),
            },
        );
        let (lifecycle, handle) = ready(&transport).await;
        let (_trigger, cancellation) = cancellation();
        gate.notify_one();

        let result = lifecycle
            .invoker()
            .invoke_cancellable(&handle, InvocationRequest::new("pet", "addPet"), &cancellation)
            .await
            .expect("completed");

        assert_eq!(result.payload.as_json(), Some(&json!({"ok": true})));
    }
}
