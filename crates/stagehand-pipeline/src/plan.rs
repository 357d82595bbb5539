use stagehand_core_domain::{Command, Environment, FailurePolicy, RunFlags, StageKind};

use crate::PipelineConfig;

const DEV_CHAIN: &[StageKind] = &[
    StageKind::Prerequisites,
    StageKind::Preflight,
    StageKind::LocalCompose,
    StageKind::HealthCheck,
];

const STAGING_CHAIN: &[StageKind] = &[
    StageKind::Prerequisites,
    StageKind::Preflight,
    StageKind::Tests,
    StageKind::Backup,
    StageKind::ProvisionInfra,
    StageKind::DeployApp,
    StageKind::SmokeTest,
];

const PRODUCTION_CHAIN: &[StageKind] = &[
    StageKind::Prerequisites,
    StageKind::Preflight,
    StageKind::Tests,
    StageKind::Backup,
    StageKind::ProductionGate,
    StageKind::ProvisionInfra,
    StageKind::DeployApp,
    StageKind::IntegrationTest,
];

const VALIDATE_CHAIN: &[StageKind] = &[StageKind::StaticValidation];

const TERRAFORM_CHAIN: &[StageKind] = &[
    StageKind::Prerequisites,
    StageKind::Preflight,
    StageKind::ProvisionInfra,
];

const KUBERNETES_CHAIN: &[StageKind] = &[
    StageKind::Prerequisites,
    StageKind::Preflight,
    StageKind::DeployApp,
];

const DESTROY_CHAIN: &[StageKind] = &[
    StageKind::Prerequisites,
    StageKind::Preflight,
    StageKind::Teardown,
];

/// Ordered stages run by a command. Commands outside the pipeline get none.
pub fn stage_table(command: Command) -> &'static [StageKind] {
    match command {
        Command::Dev => DEV_CHAIN,
        Command::Staging => STAGING_CHAIN,
        Command::Production => PRODUCTION_CHAIN,
        Command::Validate => VALIDATE_CHAIN,
        Command::Terraform(_) => TERRAFORM_CHAIN,
        Command::Kubernetes(_) => KUBERNETES_CHAIN,
        Command::Destroy(_) => DESTROY_CHAIN,
        Command::Status(_) | Command::Logs => &[],
    }
}

pub fn failure_policy(stage: StageKind, config: &PipelineConfig) -> FailurePolicy {
    match stage {
        StageKind::Backup if !config.strict_backup => FailurePolicy::Warn,
        _ => FailurePolicy::Fatal,
    }
}

pub fn plan(command: Command, config: &PipelineConfig) -> Vec<(StageKind, FailurePolicy)> {
    stage_table(command)
        .iter()
        .map(|stage| (*stage, failure_policy(*stage, config)))
        .collect()
}

/// Why a stage is skipped for this run, if it is.
pub fn skip_reason(stage: StageKind, flags: &RunFlags) -> Option<&'static str> {
    match stage {
        StageKind::Tests if flags.skip_tests => Some("--skip-tests"),
        StageKind::Backup if flags.skip_backup => Some("--skip-backup"),
        StageKind::Backup if flags.dry_run => Some("dry run"),
        StageKind::ProductionGate if flags.dry_run => Some("dry run"),
        StageKind::ProductionGate if flags.auto_approve => Some("--auto-approve"),
        StageKind::SmokeTest | StageKind::IntegrationTest if flags.dry_run => Some("dry run"),
        _ => None,
    }
}

/// Commands that only make sense against a cloud environment.
pub fn rejects_environment(command: Command, env: Environment) -> bool {
    matches!(command, Command::Terraform(_) | Command::Kubernetes(_)) && env.is_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_gate_sits_right_before_provisioning() {
        let table = stage_table(Command::Production);
        let gate = table
            .iter()
            .position(|stage| *stage == StageKind::ProductionGate)
            .expect("gate present");
        assert_eq!(table[gate + 1], StageKind::ProvisionInfra);
        assert_eq!(table.last(), Some(&StageKind::IntegrationTest));
        assert!(!stage_table(Command::Staging).contains(&StageKind::ProductionGate));
    }

    #[test]
    fn tests_gate_provisioning() {
        for command in [Command::Staging, Command::Production] {
            let table = stage_table(command);
            let tests = table.iter().position(|s| *s == StageKind::Tests);
            let infra = table.iter().position(|s| *s == StageKind::ProvisionInfra);
            assert!(tests < infra);
        }
    }

    #[test]
    fn dev_never_touches_cloud_stages() {
        let table = stage_table(Command::Dev);
        for stage in [
            StageKind::Tests,
            StageKind::Backup,
            StageKind::ProvisionInfra,
            StageKind::DeployApp,
        ] {
            assert!(!table.contains(&stage));
        }
    }

    #[test]
    fn out_of_pipeline_commands_have_no_stages() {
        assert!(stage_table(Command::Status(Environment::Staging)).is_empty());
        assert!(stage_table(Command::Logs).is_empty());
        assert_eq!(stage_table(Command::Validate), &[StageKind::StaticValidation]);
    }

    #[test]
    fn backup_policy_follows_strict_setting() {
        let mut config = PipelineConfig::default();
        assert_eq!(failure_policy(StageKind::Backup, &config), FailurePolicy::Warn);
        config.strict_backup = true;
        assert_eq!(failure_policy(StageKind::Backup, &config), FailurePolicy::Fatal);
        assert_eq!(failure_policy(StageKind::Tests, &config), FailurePolicy::Fatal);
    }

    #[test]
    fn dry_run_skips_mutating_and_verifying_stages() {
        let flags = RunFlags {
            dry_run: true,
            ..RunFlags::default()
        };
        assert_eq!(skip_reason(StageKind::Backup, &flags), Some("dry run"));
        assert_eq!(skip_reason(StageKind::SmokeTest, &flags), Some("dry run"));
        assert_eq!(skip_reason(StageKind::Tests, &flags), None);
        assert_eq!(skip_reason(StageKind::ProvisionInfra, &flags), None);
    }

    #[test]
    fn cloud_only_commands_reject_dev() {
        assert!(rejects_environment(Command::Terraform(Environment::Dev), Environment::Dev));
        assert!(!rejects_environment(Command::Destroy(Environment::Dev), Environment::Dev));
        assert!(!rejects_environment(
            Command::Kubernetes(Environment::Staging),
            Environment::Staging
        ));
    }
}
