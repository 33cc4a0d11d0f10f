// Tool collaborator seam: the static catalog and the invoker the dispatcher calls

use crate::protocol::ToolSchema;
use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::Arc;

/// Executes a named tool on behalf of the dispatcher
#[async_trait::async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value>;
}

/// A single tool exposed over MCP
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, arguments: Value) -> Result<Value>;
}

/// Tool registry for managing available tools
///
/// Registration order is the order reported by `tools/list`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<(ToolSchema, Arc<dyn Tool>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any earlier tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        match self.tools.iter_mut().find(|(s, _)| s.name == schema.name) {
            Some(slot) => *slot = (schema, tool),
            None => self.tools.push((schema, tool)),
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|(schema, _)| schema.name == name)
            .map(|(_, tool)| tool.clone())
    }

    /// List all tool schemas
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|(schema, _)| schema.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait::async_trait]
impl ToolInvoker for ToolRegistry {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        let Some(tool) = self.get(name) else {
            bail!("Tool not found: {}", name);
        };
        tool.execute(arguments).await
    }
}
