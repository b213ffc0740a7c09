//! Flowchart Pipeline
//!
//! One `code_to_flowchart` invocation moves through
//! `Received -> RateChecked -> QuotaChecked -> Generated -> Decremented -> Completed`
//! or stops in `Failed`. Every stage runs once; nothing is retried.
//!
//! A document is only returned after its turn has been debited. If the debit
//! fails the document is dropped.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::TimeoutConfig;
use crate::error::{PipelineError, Stage};
use crate::generation::GenerationAdapter;
use crate::metrics;
use crate::quota::QuotaGate;
use crate::rate_limit::RateLimiter;
use crate::timeout::StageTimeout;

/// Longest accepted snippet, in characters
pub const MAX_CODE_CHARS: usize = 5000;

/// Longest accepted address (RFC 5321 path limit)
const MAX_EMAIL_LEN: usize = 254;

/// Validated tool input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    code: String,
    identity: String,
}

impl GenerationRequest {
    /// Validate the raw tool arguments.
    ///
    /// Blank code is accepted here and rejected by the pipeline after rate
    /// limiting, so blank submissions still count against the window.
    pub fn new(code: impl Into<String>, gmail: impl Into<String>) -> Result<Self, PipelineError> {
        let code = code.into();
        let identity = gmail.into().trim().to_string();

        let chars = code.chars().count();
        if chars > MAX_CODE_CHARS {
            return Err(PipelineError::InvalidArguments(format!(
                "code must be at most {} characters (got {})",
                MAX_CODE_CHARS, chars
            )));
        }
        if !is_email_shaped(&identity) {
            return Err(PipelineError::InvalidArguments(
                "gmail must be a valid email address".to_string(),
            ));
        }

        Ok(Self { code, identity })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// Shape check only; the domain is not resolved.
pub fn is_email_shaped(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_EMAIL_LEN || s.chars().any(|c| c.is_whitespace()) {
        return false;
    }

    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

/// Completed invocation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Sanitized document text
    pub document: String,

    /// When the document was produced
    pub generated_at: DateTime<Utc>,

    /// Input length in characters
    pub code_length: usize,
}

/// Where an invocation is in the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Received,
    RateChecked,
    QuotaChecked,
    Generated,
    Decremented,
    Completed,
    Failed(PipelineError),
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed(_))
    }

    fn name(&self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::RateChecked => "rate_checked",
            RequestState::QuotaChecked => "quota_checked",
            RequestState::Generated => "generated",
            RequestState::Decremented => "decremented",
            RequestState::Completed => "completed",
            RequestState::Failed(_) => "failed",
        }
    }
}

/// Request handler for `code_to_flowchart`
pub struct Orchestrator {
    limiter: RateLimiter,
    quota: Arc<QuotaGate>,
    generator: Arc<GenerationAdapter>,
    timeouts: TimeoutConfig,
}

impl Orchestrator {
    pub fn new(
        limiter: RateLimiter,
        quota: Arc<QuotaGate>,
        generator: Arc<GenerationAdapter>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            limiter,
            quota,
            generator,
            timeouts,
        }
    }

    /// Shared limiter, for the background sweeper
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run one invocation to completion
    pub async fn handle(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, PipelineError> {
        let span = tracing::info_span!(
            "code_to_flowchart",
            request_id = %Uuid::new_v4(),
            identity = %request.identity
        );

        async {
            let mut state = RequestState::Received;
            let result = self.execute(&request, &mut state).await;

            match &result {
                Ok(_) => {
                    metrics::INVOCATIONS_TOTAL.with_label_values(&["success"]).inc();
                }
                Err(e) => {
                    metrics::INVOCATIONS_TOTAL.with_label_values(&[e.kind()]).inc();
                    if e.is_caller_fault() {
                        tracing::warn!(kind = e.kind(), "Invocation rejected: {}", e);
                    } else {
                        tracing::error!(kind = e.kind(), "Invocation failed: {}", e);
                    }
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &GenerationRequest,
        state: &mut RequestState,
    ) -> Result<GenerationResult, PipelineError> {
        let outcome = self.stages(request, state).await;
        if let Err(e) = &outcome {
            transition(state, RequestState::Failed(e.clone()));
        }
        outcome
    }

    async fn stages(
        &self,
        request: &GenerationRequest,
        state: &mut RequestState,
    ) -> Result<GenerationResult, PipelineError> {
        let identity = request.identity();

        let remaining_requests = self.limiter.admit(identity).await?;
        transition(state, RequestState::RateChecked);
        tracing::debug!("Admitted, {} requests left in window", remaining_requests);

        if request.code().trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let subscribed = StageTimeout::new(Stage::QuotaCheck, self.timeouts.store())
            .run_value(self.quota.has_remaining_turns(identity))
            .await?;
        if !subscribed {
            return Err(PipelineError::NotSubscribed);
        }
        transition(state, RequestState::QuotaChecked);

        let timer = metrics::GENERATION_DURATION_SECONDS.start_timer();
        let document = StageTimeout::new(Stage::Generation, self.timeouts.generation())
            .run(self.generator.generate(request.code()))
            .await?;
        timer.observe_duration();
        transition(state, RequestState::Generated);

        // Fail closed: the document is dropped if the debit does not land
        let turns_left = StageTimeout::new(Stage::QuotaDebit, self.timeouts.store())
            .run(self.quota.decrement_turn(identity))
            .await?;
        metrics::TURNS_DEBITED_TOTAL.inc();
        transition(state, RequestState::Decremented);

        let result = GenerationResult {
            document,
            generated_at: Utc::now(),
            code_length: request.code().chars().count(),
        };
        transition(state, RequestState::Completed);

        tracing::info!(
            code_length = result.code_length,
            turns_left,
            "Flowchart generated ({} bytes)",
            result.document.len()
        );
        Ok(result)
    }
}

fn transition(state: &mut RequestState, next: RequestState) {
    tracing::debug!("{} -> {}", state.name(), next.name());
    *state = next;
}
