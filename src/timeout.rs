//! Stage Timeouts
//!
//! Bounds each external call the pipeline makes. Expiry becomes
//! `PipelineError::Timeout` naming the stage; the abandoned future is dropped.

use std::future::Future;
use std::time::Duration;
use tokio::time;

use crate::error::{PipelineError, Stage};

/// Timeout for one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeout {
    stage: Stage,
    duration: Duration,
}

impl StageTimeout {
    /// Create a timeout for `stage`
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use codeflow::error::Stage;
    /// use codeflow::timeout::StageTimeout;
    ///
    /// let timeout = StageTimeout::new(Stage::Generation, Duration::from_secs(120));
    /// assert_eq!(timeout.duration(), Duration::from_secs(120));
    /// ```
    pub fn new(stage: Stage, duration: Duration) -> Self {
        Self { stage, duration }
    }

    /// Get the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn expired(&self) -> PipelineError {
        tracing::error!("{} exceeded {:?}", self.stage, self.duration);
        PipelineError::Timeout {
            stage: self.stage,
            elapsed: self.duration,
        }
    }

    /// Run a fallible future under the timeout
    pub async fn run<F, T>(&self, future: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        match time::timeout(self.duration, future).await {
            Ok(result) => result,
            Err(_) => Err(self.expired()),
        }
    }

    /// Run an infallible future under the timeout
    pub async fn run_value<F, T>(&self, future: F) -> Result<T, PipelineError>
    where
        F: Future<Output = T>,
    {
        time::timeout(self.duration, future)
            .await
            .map_err(|_| self.expired())
    }
}
