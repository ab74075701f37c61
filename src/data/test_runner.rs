use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::PerformanceReport;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to start test runner: {0}")]
    Spawn(String),

    #[error("test run exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("test run timed out after {0:?}")]
    Timeout(Duration),

    #[error("unreadable test report: {0}")]
    Report(String),
}

/// Executes a combined load-test script.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn execute(
        &self,
        script_path: &Path,
        virtual_users: u32,
        duration: Duration,
    ) -> Result<PerformanceReport, ExecutionError>;
}
