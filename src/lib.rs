//! Codeflow Library
//!
//! MCP server exposing `code_to_flowchart`: a source snippet goes in, a
//! self-contained interactive flowchart document comes out. Each call passes
//! a per-identity rate limit and a prepaid quota check, and a turn is debited
//! only after a document was produced.

pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod metrics_server;
pub mod pipeline;
pub mod quota;
pub mod rate_limit;
pub mod timeout;


pub use error::PipelineError;
pub use pipeline::{GenerationRequest, GenerationResult, Orchestrator};
