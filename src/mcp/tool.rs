//! The `code_to_flowchart` tool
//!
//! Argument decoding, the advertised schema, and the mapping from pipeline
//! outcomes onto `tools/call` results.

use serde::Deserialize;
use serde_json::json;

use super::protocol::{McpError, Tool, ToolCallResult};
use crate::error::PipelineError;
use crate::pipeline::{GenerationRequest, Orchestrator, MAX_CODE_CHARS};

/// Tool name as listed by `tools/list`
pub const TOOL_NAME: &str = "code_to_flowchart";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FlowchartArgs {
    code: String,
    gmail: String,
}

/// Tool definition with its JSON Schema
pub fn definition() -> Tool {
    Tool {
        name: TOOL_NAME.to_string(),
        description: "Turn a source code snippet into a self-contained interactive HTML \
                      flowchart. Each successful call uses one turn of the account's quota."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "minLength": 1,
                    "maxLength": MAX_CODE_CHARS,
                    "description": "Source code to diagram"
                },
                "gmail": {
                    "type": "string",
                    "format": "email",
                    "description": "Email address of the subscribed account"
                }
            },
            "required": ["code", "gmail"],
            "additionalProperties": false
        }),
    }
}

/// Run the tool.
///
/// Malformed arguments are a protocol error. Pipeline failures come back as
/// a result with `isError: true` and the category message only.
pub async fn call(
    orchestrator: &Orchestrator,
    arguments: serde_json::Value,
) -> Result<ToolCallResult, McpError> {
    let args: FlowchartArgs = serde_json::from_value(arguments)
        .map_err(|e| McpError::invalid_params(format!("Invalid arguments for {}: {}", TOOL_NAME, e)))?;

    let request = GenerationRequest::new(args.code, args.gmail).map_err(|e| match e {
        PipelineError::InvalidArguments(msg) => McpError::invalid_params(msg),
        other => McpError::invalid_params(other.to_string()),
    })?;

    match orchestrator.handle(request).await {
        Ok(result) => Ok(ToolCallResult::success(
            result.document,
            json!({
                "generatedAt": result.generated_at.to_rfc3339(),
                "codeLength": result.code_length,
            }),
        )),
        Err(e) => Ok(ToolCallResult::failure(e.to_string())),
    }
}
