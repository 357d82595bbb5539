use stagehand_exec::ExecError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("missing required tools: {}", .tools.join(", "))]
    MissingTool { tools: Vec<String> },
    #[error("cloud credentials not usable: {0}")]
    CredentialError(String),
    #[error("container daemon is not running: {0}")]
    DaemonNotRunning(String),
    #[error("tests failed: {0}")]
    TestFailure(String),
    #[error("backup failed: {0}")]
    BackupFailure(String),
    #[error("deployment cancelled: {0}")]
    DeploymentCancelled(String),
    #[error("rollout of {} did not finish within {timeout_secs}s", .workloads.join(", "))]
    RolloutTimeout {
        workloads: Vec<String>,
        timeout_secs: u64,
    },
    #[error("validation failed: {}", .failures.join("; "))]
    ValidationFailure { failures: Vec<String> },
    #[error("cancelled by operator: {0}")]
    Cancelled(String),
    #[error("{step} failed: {message}")]
    ToolFailure { step: String, message: String },
    #[error("rollback is not implemented; redeploy a known-good revision instead")]
    RollbackNotImplemented,
    #[error("{command} does not apply to the {environment} environment")]
    UnsupportedEnvironment {
        command: String,
        environment: String,
    },
}

impl StageError {
    pub fn tool(step: impl Into<String>, message: impl Into<String>) -> Self {
        StageError::ToolFailure {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Operator interrupts halt the run whatever the stage policy says.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StageError::Cancelled(_))
    }
}

impl From<ExecError> for StageError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Interrupted { command } => StageError::Cancelled(command),
            ExecError::Spawn { program, message } => StageError::ToolFailure {
                step: program,
                message,
            },
            other => StageError::ToolFailure {
                step: "tool".to_string(),
                message: other.to_string(),
            },
        }
    }
}
