// Streamable HTTP transport for the document backend MCP adapter

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod stream;
pub mod transport;

pub use config::ServerConfig;
pub use error::{TransportError, TransportResult};
pub use session::{Clock, ManualClock, SessionError, SessionStore, SweepTask, SystemClock};
pub use stream::StreamManager;
pub use transport::{AppState, HttpTransport};
