//! MCP front-end.
//!
//! A thin `ServerHandler` over the [`Toolbox`]: tool declarations come from
//! the registered adapters, calls dispatch by name, and domain errors map to
//! kind-tagged JSON tool errors. The protocol envelope itself is the MCP
//! SDK's; nothing here redesigns it.

use std::sync::Arc;

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    ErrorData, ServerHandler,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::{error::ToolError, tools::Toolbox};

#[derive(Clone)]
pub struct ToolhostServer {
    toolbox: Arc<Toolbox>,
}

impl ToolhostServer {
    pub fn new(toolbox: Arc<Toolbox>) -> Self {
        Self { toolbox }
    }
}

impl ServerHandler for ToolhostServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Calendar, weather, media playback, and document lookup tools.".to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.toolbox.declarations(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = request.arguments.unwrap_or_default();
        debug!(tool = %request.name, "dispatching tool call");
        match self.toolbox.dispatch(&request.name, args).await {
            Ok(payload) => Ok(CallToolResult::success(vec![Content::text(
                payload.to_string(),
            )])),
            Err(err @ ToolError::UnknownTool(_)) => {
                Err(ErrorData::invalid_params(err.to_string(), None))
            }
            Err(err) => Ok(CallToolResult::error(vec![Content::text(
                error_envelope(&err).to_string(),
            )])),
        }
    }
}

/// Kind-tagged error body; initialization failures also carry the
/// classification of their underlying cause.
pub(crate) fn error_envelope(err: &ToolError) -> Value {
    let mut body = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });
    if let ToolError::NotInitialized(cause) = err {
        body["cause"] = Value::String(cause.kind().to_string());
    }
    body
}
