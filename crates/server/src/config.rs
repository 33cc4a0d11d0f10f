use anyhow::{bail, Context, Result};
use ragbridge_mcp::protocol::{ServerInfo, ToolSchema, PROTOCOL_VERSION};
use ragbridge_mcp::tools::{RemoteTool, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    /// Static tool catalog, each entry forwarded to the backend
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions expire this long after creation
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Per-session replay buffer bound, oldest frames are dropped first
    #[serde(default = "default_max_buffered_events")]
    pub max_buffered_events: usize,
}

fn default_ttl_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_buffered_events() -> usize {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_buffered_events: default_max_buffered_events(),
        }
    }
}

// chrono::Duration::seconds panics well before i64::MAX
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

impl SessionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(MAX_TTL_SECS) as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Interval between SSE keep-alive comments on open streams
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_keepalive_secs() -> u64 {
    15
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl StreamConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default = "default_server_version")]
    pub server_version: String,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

fn default_server_name() -> String {
    "ragbridge".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_protocol_version() -> String {
    PROTOCOL_VERSION.to_string()
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            server_version: default_server_version(),
            protocol_version: default_protocol_version(),
        }
    }
}

impl McpConfig {
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server_name.clone(),
            version: self.server_version.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_input_schema")]
    pub input_schema: serde_json::Value,
}

fn default_input_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ServerConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.ttl_secs == 0 {
            bail!("session.ttl_secs must be greater than zero");
        }
        if self.session.sweep_interval_secs == 0 {
            bail!("session.sweep_interval_secs must be greater than zero");
        }
        if self.session.max_buffered_events == 0 {
            bail!("session.max_buffered_events must be greater than zero");
        }
        if self.stream.keepalive_secs == 0 {
            bail!("stream.keepalive_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Build the tool registry from the `[[tools]]` catalog
    pub fn tool_registry(&self) -> Result<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        if self.tools.is_empty() {
            return Ok(registry);
        }

        let Some(url) = self.backend.url.as_deref() else {
            bail!("backend.url is required when tools are configured");
        };
        let backend = Url::parse(url).context("Invalid backend URL")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.backend.timeout_secs))
            .build()
            .context("Failed to build backend HTTP client")?;

        for tool in &self.tools {
            let schema = ToolSchema {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            };
            registry.register(Arc::new(RemoteTool::new(client.clone(), &backend, schema)?));
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfig::load(&temp_dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.session.ttl_secs, 1800);
        assert_eq!(config.session.sweep_interval_secs, 60);
        assert_eq!(config.session.max_buffered_events, 1000);
        assert_eq!(config.stream.keepalive_secs, 15);
        assert_eq!(config.mcp.server_name, "ragbridge");
        assert_eq!(config.listen_addr(), "127.0.0.1:8080");
        assert!(config.tool_registry().unwrap().is_empty());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ragbridge.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9090

[session]
ttl_secs = 120

[backend]
url = "http://localhost:7000/api"

[[tools]]
name = "search_documents"
description = "Full-text search over the document store"

[tools.input_schema]
type = "object"
required = ["query"]

[tools.input_schema.properties.query]
type = "string"
"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session.ttl(), chrono::Duration::seconds(120));
        assert_eq!(config.session.sweep_interval(), Duration::from_secs(60));

        let registry = config.tool_registry().unwrap();
        let schemas = registry.list_schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "search_documents");
        assert_eq!(schemas[0].input_schema["required"][0], "query");
        assert_eq!(schemas[0].input_schema["properties"]["query"]["type"], "string");
    }

    #[test]
    fn test_tools_require_backend() {
        let mut config = ServerConfig::default();
        config.tools.push(ToolConfig {
            name: "search".to_string(),
            description: String::new(),
            input_schema: default_input_schema(),
        });
        assert!(config.tool_registry().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ragbridge.toml");
        std::fs::write(&path, "[session]\nttl_secs = 0\n").unwrap();
        assert!(ServerConfig::load(&path).is_err());
    }
}
