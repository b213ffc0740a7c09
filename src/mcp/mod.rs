//! MCP (Model Context Protocol) Server
//!
//! Exposes the flowchart tool over JSON-RPC 2.0.
//!
//! 1. **Protocol Layer** (`protocol`): JSON-RPC 2.0 message types
//! 2. **Tool Layer** (`tool`): `code_to_flowchart` schema and argument handling
//! 3. **Server Layer** (`server`): axum router for the single MCP path

pub mod protocol;
pub mod server;
pub mod tool;

pub use protocol::{
    Content, InitializeResult, McpError, McpMethod, McpRequest, McpResponse, RequestId,
    ServerInfo, Tool, ToolCallParams, ToolCallResult,
};
pub use server::{router, AppState};
pub use tool::TOOL_NAME;
