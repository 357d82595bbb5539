use chrono::{DateTime, Local};
use stagehand_core_domain::{BackupRecord, Environment, RunFlags};
use stagehand_exec::{OutputStream, ToolExecutor, ToolInvocation, ToolOutput};
use tracing::debug;

use crate::{Confirmer, PipelineConfig, RunLog, StageError};

/// Everything a stage may touch while it runs.
pub struct StageContext<'a> {
    pub executor: &'a dyn ToolExecutor,
    pub config: &'a PipelineConfig,
    pub confirmer: &'a dyn Confirmer,
    pub log: &'a RunLog,
    pub flags: &'a RunFlags,
    pub environment: Option<Environment>,
}

impl<'a> StageContext<'a> {
    pub fn environment(&self, step: &str) -> Result<Environment, StageError> {
        self.environment
            .ok_or_else(|| StageError::tool(step, "no target environment selected"))
    }

    /// Runs without echoing output, for checks whose exit code is the answer.
    pub fn probe(&self, invocation: &ToolInvocation) -> Result<ToolOutput, StageError> {
        debug!(command = %invocation.command_line(), "probe");
        Ok(self.executor.run(invocation)?)
    }

    /// Runs and streams every output line into the run log.
    pub fn run_logged(&self, invocation: &ToolInvocation) -> Result<ToolOutput, StageError> {
        self.log.info(format!("$ {}", invocation.command_line()));
        let log = self.log;
        let output = self
            .executor
            .run_streaming(invocation, &mut |stream, line| match stream {
                OutputStream::Stdout => log.info(format!("  {line}")),
                OutputStream::Stderr => log.info(format!("  ! {line}")),
            })?;
        Ok(output)
    }

    /// `run_logged`, with a non-zero exit turned into a `ToolFailure`.
    pub fn run_checked(
        &self,
        step: &str,
        invocation: &ToolInvocation,
    ) -> Result<ToolOutput, StageError> {
        let output = self.run_logged(invocation)?;
        if !output.success() {
            return Err(StageError::tool(step, output.failure_summary()));
        }
        Ok(output)
    }

    /// Yes/no question to the operator, recorded in the run log. A Ctrl-C
    /// while the prompt was open cancels the run whatever was answered.
    pub fn confirm(&self, step: &str, prompt: &str) -> Result<bool, StageError> {
        self.ensure_not_interrupted(step)?;
        self.log.transcript(prompt.trim_end());
        let approved = self.confirmer.confirm(prompt);
        self.ensure_not_interrupted(step)?;
        self.log
            .transcript(format!("operator answered {}", if approved { "yes" } else { "no" }));
        Ok(approved)
    }

    /// Free-form answer from the operator, recorded in the run log.
    pub fn ask(&self, step: &str, prompt: &str) -> Result<String, StageError> {
        self.ensure_not_interrupted(step)?;
        self.log.transcript(prompt.trim_end());
        let answer = self.confirmer.ask(prompt).unwrap_or_default();
        self.ensure_not_interrupted(step)?;
        self.log.transcript(format!("operator typed '{}'", answer.trim()));
        Ok(answer)
    }

    fn ensure_not_interrupted(&self, step: &str) -> Result<(), StageError> {
        if self.executor.interrupt_requested() {
            return Err(StageError::Cancelled(format!("{step} prompt")));
        }
        Ok(())
    }
}

/// What a passing (or warn-failing) stage hands back to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub warnings: Vec<String>,
    pub applied_at: Option<DateTime<Local>>,
    pub backup: Option<BackupRecord>,
}

impl StageReport {
    pub fn warn(mut self, message: impl Into<String>) -> Self {
        self.warnings.push(message.into());
        self
    }
}
