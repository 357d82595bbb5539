use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("unknown environment: {0} (expected dev, staging or production)")]
    UnknownEnvironment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Environment::Dev, Environment::Staging, Environment::Production];

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_local(self) -> bool {
        self.profile().backend == Backend::LocalCompose
    }

    pub fn profile(self) -> EnvironmentProfile {
        match self {
            Environment::Dev => EnvironmentProfile {
                environment: self,
                backend: Backend::LocalCompose,
                policy: SafetyPolicy::Unattended,
            },
            Environment::Staging => EnvironmentProfile {
                environment: self,
                backend: Backend::CloudIacCluster,
                policy: SafetyPolicy::ConfirmApply,
            },
            Environment::Production => EnvironmentProfile {
                environment: self,
                backend: Backend::CloudIacCluster,
                policy: SafetyPolicy::ConfirmDeploy,
            },
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Environment::Dev),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(DomainError::UnknownEnvironment(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    LocalCompose,
    CloudIacCluster,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::LocalCompose => "local-compose",
            Backend::CloudIacCluster => "cloud-iac+cluster",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafetyPolicy {
    Unattended,
    ConfirmApply,
    ConfirmDeploy,
}

impl SafetyPolicy {
    pub fn confirms_apply(self) -> bool {
        matches!(self, SafetyPolicy::ConfirmApply | SafetyPolicy::ConfirmDeploy)
    }

    pub fn gates_deploy(self) -> bool {
        matches!(self, SafetyPolicy::ConfirmDeploy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub environment: Environment,
    pub backend: Backend,
    pub policy: SafetyPolicy,
}

pub fn registry() -> Vec<EnvironmentProfile> {
    Environment::ALL.iter().map(|env| env.profile()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Dev,
    Staging,
    Production,
    Validate,
    Terraform(Environment),
    Kubernetes(Environment),
    Status(Environment),
    Destroy(Environment),
    Logs,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Dev => "dev",
            Command::Staging => "staging",
            Command::Production => "production",
            Command::Validate => "validate",
            Command::Terraform(_) => "terraform",
            Command::Kubernetes(_) => "kubernetes",
            Command::Status(_) => "status",
            Command::Destroy(_) => "destroy",
            Command::Logs => "logs",
        }
    }

    pub fn environment(&self) -> Option<Environment> {
        match self {
            Command::Dev => Some(Environment::Dev),
            Command::Staging => Some(Environment::Staging),
            Command::Production => Some(Environment::Production),
            Command::Terraform(env)
            | Command::Kubernetes(env)
            | Command::Status(env)
            | Command::Destroy(env) => Some(*env),
            Command::Validate | Command::Logs => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    pub skip_tests: bool,
    pub skip_backup: bool,
    pub dry_run: bool,
    pub auto_approve: bool,
    pub component: Option<String>,
    pub rollback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Prerequisites,
    Preflight,
    Tests,
    Backup,
    ProductionGate,
    ProvisionInfra,
    DeployApp,
    LocalCompose,
    HealthCheck,
    SmokeTest,
    IntegrationTest,
    StaticValidation,
    Teardown,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Prerequisites => "prerequisites",
            StageKind::Preflight => "preflight",
            StageKind::Tests => "tests",
            StageKind::Backup => "backup",
            StageKind::ProductionGate => "production-gate",
            StageKind::ProvisionInfra => "provision-infra",
            StageKind::DeployApp => "deploy-app",
            StageKind::LocalCompose => "local-compose",
            StageKind::HealthCheck => "health-check",
            StageKind::SmokeTest => "smoke-test",
            StageKind::IntegrationTest => "integration-test",
            StageKind::StaticValidation => "static-validation",
            StageKind::Teardown => "teardown",
        }
    }

    /// Pipeline state entered once this stage passes (or is skipped).
    pub fn reaches(self) -> Option<PipelineState> {
        match self {
            StageKind::Prerequisites => Some(PipelineState::PrerequisitesChecked),
            StageKind::Preflight => Some(PipelineState::PreflightPassed),
            StageKind::Tests => Some(PipelineState::Tested),
            StageKind::Backup => Some(PipelineState::BackedUp),
            StageKind::ProvisionInfra => Some(PipelineState::ProvisionedInfra),
            StageKind::DeployApp | StageKind::LocalCompose => Some(PipelineState::DeployedApp),
            StageKind::SmokeTest | StageKind::IntegrationTest | StageKind::HealthCheck => {
                Some(PipelineState::SmokeTested)
            }
            StageKind::ProductionGate | StageKind::StaticValidation | StageKind::Teardown => None,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    Fatal,
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Pending,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineState {
    NotStarted,
    PrerequisitesChecked,
    PreflightPassed,
    Tested,
    BackedUp,
    ProvisionedInfra,
    DeployedApp,
    SmokeTested,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub policy: FailurePolicy,
    pub outcome: StageOutcome,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    pub fn pending(stage: StageKind, policy: FailurePolicy) -> Self {
        Self {
            stage,
            policy,
            outcome: StageOutcome::Pending,
            started_at: None,
            finished_at: None,
            applied_at: None,
            warnings: Vec::new(),
            skip_reason: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub environment: Environment,
    pub artifacts: Vec<PathBuf>,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level.label(),
            self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRun {
    pub command: Command,
    pub environment: Option<Environment>,
    pub flags: RunFlags,
    pub stages: Vec<StageRecord>,
    pub status: RunStatus,
    pub state: PipelineState,
    pub started_at: DateTime<Local>,
    pub log_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentRun {
    pub fn new(
        command: Command,
        flags: RunFlags,
        stages: Vec<(StageKind, FailurePolicy)>,
        log_path: PathBuf,
    ) -> Self {
        Self {
            command,
            environment: command.environment(),
            flags,
            stages: stages
                .into_iter()
                .map(|(stage, policy)| StageRecord::pending(stage, policy))
                .collect(),
            status: RunStatus::Pending,
            state: PipelineState::NotStarted,
            started_at: Local::now(),
            log_path,
            backup: None,
            error: None,
        }
    }

    pub fn record(&self, stage: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.stage == stage)
    }

    pub fn outcome(&self, stage: StageKind) -> Option<StageOutcome> {
        self.record(stage).map(|record| record.outcome)
    }

    /// Stages that actually ran (passed or failed), in execution order.
    pub fn executed(&self) -> Vec<StageKind> {
        self.stages
            .iter()
            .filter(|record| matches!(record.outcome, StageOutcome::Passed | StageOutcome::Failed))
            .map(|record| record.stage)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Passed
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_aliases() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("Staging".parse::<Environment>(), Ok(Environment::Staging));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Dev));
        assert!(matches!(
            "qa".parse::<Environment>(),
            Err(DomainError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn registry_describes_backends_and_policies() {
        let profiles = registry();
        assert_eq!(profiles.len(), 3);

        let dev = Environment::Dev.profile();
        assert_eq!(dev.backend, Backend::LocalCompose);
        assert!(!dev.policy.confirms_apply());
        assert!(Environment::Dev.is_local());

        let staging = Environment::Staging.profile();
        assert_eq!(staging.backend.as_str(), "cloud-iac+cluster");
        assert!(staging.policy.confirms_apply());
        assert!(!staging.policy.gates_deploy());

        assert!(Environment::Production.profile().policy.gates_deploy());
    }

    #[test]
    fn stage_states_follow_pipeline_order() {
        let chain = [
            StageKind::Prerequisites,
            StageKind::Preflight,
            StageKind::Tests,
            StageKind::Backup,
            StageKind::ProvisionInfra,
            StageKind::DeployApp,
            StageKind::SmokeTest,
        ];
        let states: Vec<PipelineState> = chain.iter().filter_map(|stage| stage.reaches()).collect();
        let mut sorted = states.clone();
        sorted.sort();
        assert_eq!(states, sorted);
        assert_eq!(StageKind::ProductionGate.reaches(), None);
    }

    #[test]
    fn log_record_renders_timestamp_and_level() {
        let timestamp = Local::now();
        let record = LogRecord {
            timestamp,
            level: LogLevel::Warn,
            message: "cluster context missing".to_string(),
        };
        let rendered = record.render();
        assert!(rendered.starts_with(&format!("[{}]", timestamp.format("%Y-%m-%d %H:%M:%S"))));
        assert!(rendered.ends_with("[WARN] cluster context missing"));
    }

    #[test]
    fn run_reports_executed_stages_and_exit_code() {
        let mut run = DeploymentRun::new(
            Command::Dev,
            RunFlags::default(),
            vec![
                (StageKind::Prerequisites, FailurePolicy::Fatal),
                (StageKind::Preflight, FailurePolicy::Fatal),
            ],
            PathBuf::from("/tmp/run.log"),
        );
        assert_eq!(run.environment, Some(Environment::Dev));
        assert_eq!(run.exit_code(), 1);

        run.stages[0].outcome = StageOutcome::Passed;
        run.stages[1].outcome = StageOutcome::Skipped;
        run.status = RunStatus::Passed;
        assert_eq!(run.executed(), vec![StageKind::Prerequisites]);
        assert_eq!(run.outcome(StageKind::Preflight), Some(StageOutcome::Skipped));
        assert_eq!(run.exit_code(), 0);
    }
}
