//! JSON-RPC method dispatch.
//!
//! Requests are first validated into an [`McpMethod`] and then executed.
//! Every outcome, including tool failures, comes back as a [`JsonRpcResponse`]
//! echoing the request id; transports never see an error from here.

use crate::protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerCapabilities, ServerInfo, ToolContent, ToolSchema,
    PROTOCOL_VERSION,
};
use crate::tools::{ToolInvoker, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// A validated MCP method
#[derive(Debug, Clone, PartialEq)]
pub enum McpMethod {
    Initialize,
    ListTools,
    CallTool(CallToolParams),
    Ping,
    Unrecognized(String),
}

impl McpMethod {
    /// Validate a raw request into a method variant
    pub fn parse(method: &str, params: Option<&Value>) -> Result<Self, JsonRpcError> {
        match method {
            "initialize" => Ok(Self::Initialize),
            "tools/list" => Ok(Self::ListTools),
            "ping" => Ok(Self::Ping),
            "tools/call" => {
                let name = params
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| JsonRpcError::application("Tool name required"))?;
                let arguments = params
                    .and_then(|p| p.get("arguments"))
                    .filter(|args| !args.is_null())
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                Ok(Self::CallTool(CallToolParams {
                    name: name.to_string(),
                    arguments,
                }))
            }
            other => Ok(Self::Unrecognized(other.to_string())),
        }
    }
}

/// Interprets JSON-RPC requests, delegating tool calls to a [`ToolInvoker`]
pub struct Dispatcher {
    server_info: ServerInfo,
    protocol_version: String,
    tools: Vec<ToolSchema>,
    invoker: Arc<dyn ToolInvoker>,
}

impl Dispatcher {
    pub fn new(
        server_info: ServerInfo,
        tools: Vec<ToolSchema>,
        invoker: Arc<dyn ToolInvoker>,
    ) -> Self {
        Self {
            server_info,
            protocol_version: PROTOCOL_VERSION.to_string(),
            tools,
            invoker,
        }
    }

    /// Catalog and invoker both come from the registry
    pub fn from_registry(server_info: ServerInfo, registry: Arc<ToolRegistry>) -> Self {
        let tools = registry.list_schemas();
        Self::new(server_info, tools, registry)
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Handle a single request
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;
        debug!("MCP: Handling method: {}", request.method);

        let method = match McpMethod::parse(&request.method, request.params.as_ref()) {
            Ok(method) => method,
            Err(err) => return JsonRpcResponse::error(id, err),
        };

        match method {
            McpMethod::Initialize => JsonRpcResponse::success(id, self.initialize_result()),
            McpMethod::ListTools => JsonRpcResponse::success(
                id,
                to_value(ListToolsResult {
                    tools: self.tools.clone(),
                }),
            ),
            McpMethod::CallTool(params) => match self.call_tool(params).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => JsonRpcResponse::error(id, err),
            },
            McpMethod::Ping => JsonRpcResponse::success(id, json!({})),
            McpMethod::Unrecognized(method) => {
                JsonRpcResponse::error(id, JsonRpcError::method_not_found(&method))
            }
        }
    }

    fn initialize_result(&self) -> Value {
        to_value(InitializeResult {
            protocol_version: self.protocol_version.clone(),
            capabilities: ServerCapabilities::tools_and_resources(),
            server_info: self.server_info.clone(),
        })
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<Value, JsonRpcError> {
        let output = self
            .invoker
            .execute(&params.name, params.arguments)
            .await
            .map_err(|err| {
                error!("Tool {} failed: {:#}", params.name, err);
                JsonRpcError::application(format!("{:#}", err))
            })?;

        let text = serde_json::to_string_pretty(&output)
            .map_err(|err| JsonRpcError::application(err.to_string()))?;

        Ok(to_value(CallToolResult {
            content: vec![ToolContent::text(text)],
            is_error: None,
        }))
    }
}

// Protocol structs only hold strings and JSON values, so this cannot fail
fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
