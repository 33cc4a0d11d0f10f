// MCP server over stdio: one JSON-RPC message per line

use crate::dispatcher::Dispatcher;
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec};

pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve on the process stdin/stdout until stdin closes
    pub async fn start(&self) -> Result<()> {
        tracing::info!("MCP server listening on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC until the reader is exhausted
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = FramedRead::new(reader, LinesCodec::new());

        while let Some(line) = lines.next().await {
            let line = line.context("Failed to read from input")?;
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.dispatcher.dispatch(request).await,
                Err(e) => {
                    tracing::warn!("Discarding unparsable message: {}", e);
                    JsonRpcResponse::error(
                        Some(serde_json::Value::Null),
                        JsonRpcError::parse_error(e.to_string()),
                    )
                }
            };

            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }

        tracing::info!("Input closed, MCP server stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerInfo;
    use crate::tools::ToolRegistry;
    use serde_json::{json, Value};

    fn server() -> McpServer {
        let dispatcher = Dispatcher::from_registry(
            ServerInfo {
                name: "ragbridge".to_string(),
                version: "0.1.0".to_string(),
            },
            Arc::new(ToolRegistry::new()),
        );
        McpServer::new(Arc::new(dispatcher))
    }

    fn responses(output: &[u8]) -> Vec<Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_answers_each_line_in_order() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );
        let mut output = Vec::new();

        server().serve(input.as_bytes(), &mut output).await.unwrap();

        let out = responses(&output);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        assert_eq!(out[1]["id"], 2);
        assert_eq!(out[1]["result"]["tools"], json!([]));
    }

    #[tokio::test]
    async fn test_unparsable_line_yields_parse_error() {
        let input = "{not json\n";
        let mut output = Vec::new();

        server().serve(input.as_bytes(), &mut output).await.unwrap();

        let out = responses(&output);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], Value::Null);
        assert_eq!(out[0]["error"]["code"], -32700);
    }
}
