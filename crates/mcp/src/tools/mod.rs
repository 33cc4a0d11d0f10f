pub mod remote;
mod registry;

pub use registry::{Tool, ToolInvoker, ToolRegistry};
pub use remote::RemoteTool;
