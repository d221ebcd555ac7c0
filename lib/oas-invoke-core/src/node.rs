//! Flow adapter: turns inbound messages into invocations.
//!
//! An [`InvokerNode`] is configured with a spec URL and default operation. Each
//! [`InboundMessage`] may override the operation and content types; the result
//! goes out as an [`OutboundMessage`] on the success or the error output, with
//! the message's other fields preserved.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::Credentials;
use crate::error::InvokeError;
use crate::invoker::OperationInvoker;
use crate::lifecycle::{ClientLifecycle, HandleState};
use crate::request::{InvocationRequest, Payload};
use crate::response::InvocationResult;
use crate::transport::{ReqwestTransport, Transport};

/// Static configuration of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// URL or path of the API description.
    pub spec_url: String,
    /// Credentials attached to every request.
    #[serde(default)]
    pub credentials: Credentials,
    /// Resource used when the message has none.
    #[serde(default)]
    pub resource: Option<String>,
    /// Operation used when the message has none.
    #[serde(default)]
    pub method: Option<String>,
    /// Request content type used when the message has none.
    #[serde(default)]
    pub request_content_type: Option<String>,
    /// Response content type used when the message has none.
    #[serde(default)]
    pub response_content_type: Option<String>,
}

/// Message received by the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Resource (tag) to call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Operation to call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Payload: a JSON string is raw text, anything else is structured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Request content type override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_content_type: Option<String>,
    /// Response content type override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_content_type: Option<String>,
    /// Any other field, passed through to the output.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Message sent by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// HTTP status, absent for local errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Normalized response body, or the original payload for local errors.
    pub payload: Value,
    /// Error description, only on the error output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fields preserved from the inbound message.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which output a message goes to.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    /// The call completed with a success status.
    Success(OutboundMessage),
    /// The call failed, locally or remotely.
    Error(OutboundMessage),
}

impl NodeOutput {
    /// The message, whatever the output.
    pub fn message(&self) -> &OutboundMessage {
        match self {
            Self::Success(message) | Self::Error(message) => message,
        }
    }

    /// Whether this goes to the success output.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Status indicator of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    /// No client opened yet.
    Idle,
    /// The description is loading.
    Connecting,
    /// Ready to invoke.
    Ready,
    /// The description could not be loaded.
    Failed(String),
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

impl From<&HandleState> for NodeStatus {
    fn from(state: &HandleState) -> Self {
        match state {
            HandleState::Pending => Self::Connecting,
            HandleState::Ready(_) => Self::Ready,
            HandleState::Failed(error) => Self::Failed(error.to_string()),
        }
    }
}

/// Errors of a node call.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum NodeError {
    /// Neither the message nor the configuration names a resource.
    #[display("No resource given in the message nor in the node configuration")]
    #[from(skip)]
    MissingResource,

    /// Neither the message nor the configuration names an operation.
    #[display("No method given in the message nor in the node configuration")]
    #[from(skip)]
    MissingMethod,

    /// The invocation failed.
    Invoke(InvokeError),
}

/// Processing node bound to a shared [`ClientLifecycle`].
#[derive(Debug)]
pub struct InvokerNode<T = ReqwestTransport> {
    lifecycle: Arc<ClientLifecycle<T>>,
    invoker: OperationInvoker<T>,
    config: NodeConfig,
}

impl InvokerNode {
    /// Creates a node with its own lifecycle, using the configured credentials.
    pub fn from_config(config: NodeConfig) -> Self {
        let lifecycle = ClientLifecycle::builder()
            .with_credentials(config.credentials.clone())
            .build();
        Self::new(Arc::new(lifecycle), config)
    }
}

impl<T> InvokerNode<T>
where
    T: Transport,
{
    /// Creates a node sharing `lifecycle` with other nodes.
    pub fn new(lifecycle: Arc<ClientLifecycle<T>>, config: NodeConfig) -> Self {
        let invoker = lifecycle.invoker();
        Self {
            lifecycle,
            invoker,
            config,
        }
    }

    /// The node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Opens the configured spec URL and reports the resulting status.
    pub async fn start(&self) -> NodeStatus {
        let handle = self.lifecycle.open(&self.config.spec_url).await;
        NodeStatus::from(&handle.state())
    }

    /// Current status, from the lifecycle's current handle.
    pub fn status(&self) -> NodeStatus {
        self.lifecycle
            .current()
            .map_or(NodeStatus::Idle, |handle| NodeStatus::from(&handle.state()))
    }

    /// Releases the client if it is still the current one.
    pub async fn stop(&self) {
        if let Some(handle) = self.lifecycle.current() {
            self.lifecycle.close(&handle).await;
        }
    }

    /// Performs the invocation described by `message`.
    ///
    /// # Errors
    ///
    /// Returns a [`NodeError`] when no operation can be determined or the invocation fails.
    pub async fn call(&self, message: &InboundMessage) -> Result<InvocationResult, NodeError> {
        let resource = message
            .resource
            .as_ref()
            .or(self.config.resource.as_ref())
            .ok_or(NodeError::MissingResource)?;
        let method = message
            .method
            .as_ref()
            .or(self.config.method.as_ref())
            .ok_or(NodeError::MissingMethod)?;

        let mut request = InvocationRequest::new(resource.as_str(), method.as_str())
            .with_payload(Payload::from(message.payload.clone()));
        if let Some(content_type) = message
            .request_content_type
            .as_ref()
            .or(self.config.request_content_type.as_ref())
        {
            request = request.with_request_content_type(content_type.as_str());
        }
        if let Some(content_type) = message
            .response_content_type
            .as_ref()
            .or(self.config.response_content_type.as_ref())
        {
            request = request.with_response_content_type(content_type.as_str());
        }

        let handle = self.lifecycle.open(&self.config.spec_url).await;
        let result = self.invoker.invoke(&handle, request).await?;
        Ok(result)
    }

    /// Handles one message, routing the outcome to the success or error output.
    pub async fn handle(&self, message: InboundMessage) -> NodeOutput {
        let outcome = self.call(&message).await;
        let InboundMessage { payload, extra, .. } = message;

        match outcome {
            Ok(result) => NodeOutput::Success(OutboundMessage {
                status: Some(result.status),
                payload: result.payload.into_value(),
                error: None,
                extra,
            }),
            Err(error) => {
                debug!(%error, "message routed to the error output");
                let message = error.to_string();
                match error {
                    NodeError::Invoke(InvokeError::Rejected { result, .. }) => {
                        NodeOutput::Error(OutboundMessage {
                            status: Some(result.status),
                            payload: result.payload.into_value(),
                            error: Some(message),
                            extra,
                        })
                    }
                    _ => NodeOutput::Error(OutboundMessage {
                        status: None,
                        payload: payload.unwrap_or(Value::Null),
                        error: Some(message),
                        extra,
                    }),
                }
            }
        }
    }
}
