// MCP (Model Context Protocol) building blocks for the document backend adapter
// Transports (stdio here, streamable HTTP in the server crate) share one dispatcher

pub mod dispatcher;
pub mod protocol;
pub mod server;
pub mod tools;

pub use dispatcher::{Dispatcher, McpMethod};
pub use server::McpServer;
pub use tools::{Tool, ToolInvoker, ToolRegistry};
