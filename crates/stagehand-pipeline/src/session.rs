use chrono::Local;
use stagehand_core_domain::{
    Command, DeploymentRun, FailurePolicy, PipelineState, RunFlags, RunStatus, StageKind,
    StageOutcome,
};
use stagehand_exec::ToolExecutor;
use tracing::{debug, info_span};

use crate::app::deploy_app;
use crate::backup::create_backup;
use crate::infra::provision_infra;
use crate::local::{compose_up, health_check};
use crate::plan::{plan, rejects_environment, skip_reason};
use crate::preflight::run_preflight;
use crate::prerequisites::check_prerequisites;
use crate::teardown::teardown;
use crate::test_runner::run_tests;
use crate::validate::validate_all;
use crate::verify::verify_deployment;
use crate::{Confirmer, PipelineConfig, RunLog, StageContext, StageError, StageReport};

/// Finished run plus the fatal error that stopped it, if any.
#[derive(Debug)]
pub struct PipelineResult {
    pub run: DeploymentRun,
    pub failure: Option<StageError>,
}

impl PipelineResult {
    pub fn exit_code(&self) -> i32 {
        self.run.exit_code()
    }
}

/// Runs a command's stage table in order, stopping at the first fatal
/// failure.
pub struct Pipeline<'a> {
    executor: &'a dyn ToolExecutor,
    config: &'a PipelineConfig,
    confirmer: &'a dyn Confirmer,
    log: &'a RunLog,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        executor: &'a dyn ToolExecutor,
        config: &'a PipelineConfig,
        confirmer: &'a dyn Confirmer,
        log: &'a RunLog,
    ) -> Self {
        Self {
            executor,
            config,
            confirmer,
            log,
        }
    }

    pub fn execute(&self, command: Command, flags: RunFlags) -> PipelineResult {
        let span = info_span!("pipeline", command = command.name());
        let _enter = span.enter();

        let mut run = DeploymentRun::new(
            command,
            flags.clone(),
            plan(command, self.config),
            self.log.path().to_path_buf(),
        );
        run.status = RunStatus::Running;
        self.log.info(format!("Starting {}", describe(command)));
        if !run.log_path.as_os_str().is_empty() {
            self.log
                .info(format!("Log file: {}", run.log_path.display()));
        }

        if flags.rollback {
            return self.halt(run, None, StageError::RollbackNotImplemented);
        }
        if let Some(env) = run.environment {
            if rejects_environment(command, env) {
                let err = StageError::UnsupportedEnvironment {
                    command: command.name().to_string(),
                    environment: env.to_string(),
                };
                return self.halt(run, None, err);
            }
        }
        if flags.dry_run {
            self.log.warn("Dry run: nothing will be applied");
        }

        let ctx = StageContext {
            executor: self.executor,
            config: self.config,
            confirmer: self.confirmer,
            log: self.log,
            flags: &flags,
            environment: run.environment,
        };

        for index in 0..run.stages.len() {
            let stage = run.stages[index].stage;
            let policy = run.stages[index].policy;

            if let Some(reason) = skip_reason(stage, &flags) {
                let record = &mut run.stages[index];
                record.outcome = StageOutcome::Skipped;
                record.skip_reason = Some(reason.to_string());
                self.log.info(format!("Skipping {stage} ({reason})"));
                advance(&mut run, stage);
                continue;
            }

            self.log.info(format!("==> {stage}"));
            run.stages[index].started_at = Some(Local::now());
            let result = run_stage(stage, &ctx);
            run.stages[index].finished_at = Some(Local::now());
            debug!(stage = stage.name(), ok = result.is_ok(), "stage finished");

            match result {
                Ok(report) => {
                    let record = &mut run.stages[index];
                    record.outcome = StageOutcome::Passed;
                    record.applied_at = report.applied_at;
                    record.warnings = report.warnings;
                    if report.backup.is_some() {
                        run.backup = report.backup;
                    }
                    advance(&mut run, stage);
                }
                Err(err) if policy == FailurePolicy::Warn && !err.is_cancellation() => {
                    self.log.warn(format!("{stage} failed, continuing: {err}"));
                    let record = &mut run.stages[index];
                    record.outcome = StageOutcome::Failed;
                    record.warnings.push(err.to_string());
                    advance(&mut run, stage);
                }
                Err(err) => return self.halt(run, Some(index), err),
            }
        }

        run.state = PipelineState::Complete;
        run.status = RunStatus::Passed;
        self.log.success(format!("{} finished", capitalize(&describe(command))));
        PipelineResult { run, failure: None }
    }

    fn halt(&self, mut run: DeploymentRun, index: Option<usize>, err: StageError) -> PipelineResult {
        if let Some(index) = index {
            let record = &mut run.stages[index];
            record.outcome = StageOutcome::Failed;
            record.error = Some(err.to_string());
            self.log.error(format!("{} failed: {err}", record.stage));
        } else {
            self.log.error(err.to_string());
        }
        run.state = PipelineState::Failed;
        run.status = RunStatus::Failed;
        run.error = Some(err.to_string());
        PipelineResult {
            run,
            failure: Some(err),
        }
    }
}

fn run_stage(stage: StageKind, ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    match stage {
        StageKind::Prerequisites => check_prerequisites(ctx),
        StageKind::Preflight => run_preflight(ctx),
        StageKind::Tests => run_tests(ctx),
        StageKind::Backup => create_backup(ctx),
        StageKind::ProductionGate => production_gate(ctx),
        StageKind::ProvisionInfra => provision_infra(ctx),
        StageKind::DeployApp => deploy_app(ctx),
        StageKind::LocalCompose => compose_up(ctx),
        StageKind::HealthCheck => health_check(ctx),
        StageKind::SmokeTest | StageKind::IntegrationTest => verify_deployment(ctx, stage),
        StageKind::StaticValidation => validate_all(ctx),
        StageKind::Teardown => teardown(ctx),
    }
}

fn production_gate(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let env = ctx.environment("production-gate")?;
    ctx.log.warn(format!("You are about to deploy to {env}"));
    let prompt = format!("Continue with the {env} deployment? [y/N]: ");
    if !ctx.confirm("production-gate", &prompt)? {
        return Err(StageError::DeploymentCancelled(format!(
            "{env} deployment declined at the gate"
        )));
    }
    ctx.log.info("Production deployment confirmed");
    Ok(StageReport::default())
}

fn advance(run: &mut DeploymentRun, stage: StageKind) {
    if let Some(state) = stage.reaches() {
        if state > run.state {
            run.state = state;
        }
    }
}

fn describe(command: Command) -> String {
    match command {
        Command::Validate => "static validation".to_string(),
        Command::Terraform(env) => format!("infrastructure provisioning for {env}"),
        Command::Kubernetes(env) => format!("application rollout for {env}"),
        Command::Destroy(env) => format!("teardown of {env}"),
        Command::Status(env) => format!("status query for {env}"),
        other => format!("{} deployment", other.name()),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
