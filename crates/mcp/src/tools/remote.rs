// Tools forwarded to the document backend over HTTP

use crate::protocol::ToolSchema;
use crate::tools::Tool;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use url::Url;

/// Tool whose execution is a `POST {backend}/tools/{name}` carrying the JSON arguments
pub struct RemoteTool {
    schema: ToolSchema,
    endpoint: Url,
    client: reqwest::Client,
}

impl RemoteTool {
    pub fn new(client: reqwest::Client, backend: &Url, schema: ToolSchema) -> Result<Self> {
        // Url::join replaces the last path segment unless the base ends in '/'
        let mut base = backend.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let endpoint = base
            .join(&format!("tools/{}", schema.name))
            .with_context(|| format!("Invalid endpoint for tool {}", schema.name))?;

        Ok(Self {
            schema,
            endpoint,
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Tool for RemoteTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        tracing::debug!("Forwarding tool {} to {}", self.schema.name, self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&arguments)
            .send()
            .await
            .with_context(|| format!("Backend request for {} failed", self.schema.name))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            bail!("{} (backend status {})", message, status.as_u16());
        }

        response
            .json::<Value>()
            .await
            .context("Backend returned invalid JSON")
    }
}
