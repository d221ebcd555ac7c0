use std::io::Write;

use anyhow::{Context, Result, bail};
use oas_invoke_core::Credentials;
use oas_invoke_core::node::{InboundMessage, InvokerNode, NodeConfig, NodeOutput, NodeStatus};
use serde_json::Value;
use tracing::info;

/// Arguments of a one-shot invocation.
#[derive(Debug, Clone)]
pub struct CallArgs {
    /// URL or path of the API description.
    pub spec: String,
    /// Resource (tag) of the operation.
    pub resource: String,
    /// Operation name.
    pub method: String,
    /// Raw payload text, parsed as JSON for JSON request types.
    pub payload: Option<String>,
    /// Request content type override.
    pub request_content_type: Option<String>,
    /// Response content type override.
    pub response_content_type: Option<String>,
    /// Credentials attached to every request.
    pub credentials: Credentials,
}

impl CallArgs {
    fn into_parts(self) -> (NodeConfig, InboundMessage) {
        let Self {
            spec,
            resource,
            method,
            payload,
            request_content_type,
            response_content_type,
            credentials,
        } = self;

        let config = NodeConfig {
            spec_url: spec,
            credentials,
            ..NodeConfig::default()
        };
        let message = InboundMessage {
            resource: Some(resource),
            method: Some(method),
            payload: payload.map(Value::String),
            request_content_type,
            response_content_type,
            ..InboundMessage::default()
        };
        (config, message)
    }
}

/// Loads the API description and performs one invocation.
///
/// # Errors
///
/// Fails when the API description cannot be loaded. Invocation failures are
/// reported through [`NodeOutput::Error`].
pub async fn run(args: CallArgs) -> Result<NodeOutput> {
    let (config, message) = args.into_parts();
    let spec = config.spec_url.clone();
    let node = InvokerNode::from_config(config);

    let status = node.start().await;
    if let NodeStatus::Failed(reason) = &status {
        bail!("cannot load '{spec}': {reason}");
    }
    info!(%spec, %status, "client ready");

    let output = node.handle(message).await;
    node.stop().await;
    Ok(output)
}

/// Writes the outbound message as pretty JSON.
///
/// # Errors
///
/// Fails when the writer fails.
pub fn write_output(mut writer: impl Write, output: &NodeOutput) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, output.message()).context("writing output")?;
    writeln!(writer).context("writing output")?;
    Ok(())
}
