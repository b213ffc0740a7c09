//! Pipeline Error Taxonomy
//!
//! Every way a `code_to_flowchart` invocation can end without a document.
//! The `Display` text of each variant is the caller-facing message; upstream
//! detail (HTTP bodies, provider diagnostics) is logged where it happens and
//! never carried in these variants.

use std::time::Duration;

/// Terminal failure of a single tool invocation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Rate limit exceeded: too many requests, retry in {}s", .retry_after.as_secs().max(1))]
    RateLimitExceeded {
        /// Time until the current window closes
        retry_after: Duration,
    },

    #[error("No active subscription or no remaining turns for this account")]
    NotSubscribed,

    #[error("Code input is empty")]
    EmptyInput,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Flowchart generation failed")]
    GenerationFailed,

    /// The row read that precedes the debit failed
    #[error("Could not read the account quota to debit it; the generated flowchart was withheld")]
    QuotaFetchFailed,

    #[error("Could not debit the account quota; the generated flowchart was withheld")]
    QuotaUpdateFailed,

    #[error("{stage} timed out after {}s{}", .elapsed.as_secs(), .stage.timeout_suffix())]
    Timeout {
        /// Which external call stalled
        stage: Stage,
        /// Configured limit that was hit
        elapsed: Duration,
    },
}

/// External call that a timeout applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    QuotaCheck,
    Generation,
    QuotaDebit,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::QuotaCheck => "Quota check",
            Stage::Generation => "Flowchart generation",
            Stage::QuotaDebit => "Quota debit",
        };
        f.write_str(name)
    }
}

impl Stage {
    /// Extra wording for a timeout; a debit timeout discards a finished document
    fn timeout_suffix(&self) -> &'static str {
        match self {
            Stage::QuotaDebit => "; the generated flowchart was withheld",
            Stage::QuotaCheck | Stage::Generation => "",
        }
    }
}

impl PipelineError {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            PipelineError::NotSubscribed => "not_subscribed",
            PipelineError::EmptyInput => "empty_input",
            PipelineError::InvalidArguments(_) => "invalid_arguments",
            PipelineError::GenerationFailed => "generation_failed",
            PipelineError::QuotaFetchFailed => "quota_fetch_failed",
            PipelineError::QuotaUpdateFailed => "quota_update_failed",
            PipelineError::Timeout { .. } => "timeout",
        }
    }

    /// Whether the caller caused the failure (as opposed to a collaborator)
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimitExceeded { .. }
                | PipelineError::NotSubscribed
                | PipelineError::EmptyInput
                | PipelineError::InvalidArguments(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_message_rounds_up_to_one_second() {
        let err = PipelineError::RateLimitExceeded {
            retry_after: Duration::from_millis(200),
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: too many requests, retry in 1s"
        );
    }

    #[test]
    fn test_timeout_message_names_stage() {
        let err = PipelineError::Timeout {
            stage: Stage::Generation,
            elapsed: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "Flowchart generation timed out after 120s");
    }

    #[test]
    fn test_debit_stage_failures_say_document_withheld() {
        let fetch = PipelineError::QuotaFetchFailed.to_string();
        assert!(fetch.contains("withheld"), "{}", fetch);

        let debit_timeout = PipelineError::Timeout {
            stage: Stage::QuotaDebit,
            elapsed: Duration::from_secs(10),
        };
        assert_eq!(
            debit_timeout.to_string(),
            "Quota debit timed out after 10s; the generated flowchart was withheld"
        );

        let check_timeout = PipelineError::Timeout {
            stage: Stage::QuotaCheck,
            elapsed: Duration::from_secs(10),
        };
        assert!(!check_timeout.to_string().contains("withheld"));
    }

    #[test]
    fn test_kinds_are_distinct() {
        let all = [
            PipelineError::RateLimitExceeded {
                retry_after: Duration::ZERO,
            },
            PipelineError::NotSubscribed,
            PipelineError::EmptyInput,
            PipelineError::InvalidArguments("x".into()),
            PipelineError::GenerationFailed,
            PipelineError::QuotaFetchFailed,
            PipelineError::QuotaUpdateFailed,
            PipelineError::Timeout {
                stage: Stage::QuotaCheck,
                elapsed: Duration::ZERO,
            },
        ];
        let mut kinds: Vec<_> = all.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), all.len());
    }

    #[test]
    fn test_caller_fault_split() {
        assert!(PipelineError::NotSubscribed.is_caller_fault());
        assert!(PipelineError::EmptyInput.is_caller_fault());
        assert!(!PipelineError::GenerationFailed.is_caller_fault());
        assert!(!PipelineError::QuotaUpdateFailed.is_caller_fault());
    }
}
