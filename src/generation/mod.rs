//! Flowchart Generation Module
//!
//! - `prompt`: fixed instructions plus the caller's code
//! - `client`: `CompletionClient` seam and the Gemini REST client
//! - `sanitize`: fence stripping on model output
//! - `adapter`: `GenerationAdapter`, the pipeline-facing wrapper

pub mod adapter;
pub mod client;
pub mod prompt;
pub mod sanitize;

pub use adapter::GenerationAdapter;
pub use client::{CompletionClient, CompletionError, GeminiClient, SamplingConfig};
pub use prompt::build_prompt;
pub use sanitize::strip_code_fences;
