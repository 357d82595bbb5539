use std::path::PathBuf;

use chrono::Local;
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use stagehand_cli_core::logs::{page_log, previous_run_log};
use stagehand_cli_core::prompt::StdinConfirmer;
use stagehand_cli_core::{config, CliError};
use stagehand_core_domain::{Command, DeploymentRun, Environment, RunFlags, StageOutcome};
use stagehand_exec::{InterruptFlag, ProcessExecutor};
use stagehand_pipeline::{query_status, DenyAll, Pipeline, PipelineConfig, RunLog, StageContext};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(about = "Deployment orchestrator for dev, staging and production", long_about = None)]
#[command(arg_required_else_help = true)]
struct StagehandCli {
    /// Project configuration file (default: $STAGEHAND_CONFIG or ./stagehand.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: StagehandCommand,
}

#[derive(Subcommand, Debug)]
enum StagehandCommand {
    /// Build and start the local compose stack
    Dev,
    /// Full pipeline against staging
    Staging(DeployArgs),
    /// Full pipeline against production, behind a confirmation gate
    Production(DeployArgs),
    /// Static checks for every environment, no mutation
    Validate,
    /// Provision infrastructure only
    Terraform(TerraformArgs),
    /// Roll out manifests only
    Kubernetes(KubernetesArgs),
    /// Show what is currently deployed
    Status(EnvArg),
    /// Tear an environment down
    Destroy(DestroyArgs),
    /// Page through the most recent earlier run log
    Logs,
}

#[derive(Args, Debug, Default)]
struct DeployArgs {
    #[arg(long)]
    skip_tests: bool,
    #[arg(long)]
    skip_backup: bool,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    auto_approve: bool,
    /// Limit the rollout to one component
    #[arg(long, value_name = "NAME")]
    component: Option<String>,
    #[arg(long)]
    rollback: bool,
}

#[derive(Args, Debug)]
struct EnvArg {
    #[arg(default_value = "staging", value_parser = parse_environment)]
    env: Environment,
}

#[derive(Args, Debug)]
struct TerraformArgs {
    #[arg(default_value = "staging", value_parser = parse_environment)]
    env: Environment,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    auto_approve: bool,
}

#[derive(Args, Debug)]
struct KubernetesArgs {
    #[arg(default_value = "staging", value_parser = parse_environment)]
    env: Environment,
    #[arg(long)]
    dry_run: bool,
    #[arg(long, value_name = "NAME")]
    component: Option<String>,
}

#[derive(Args, Debug)]
struct DestroyArgs {
    #[arg(default_value = "staging", value_parser = parse_environment)]
    env: Environment,
    #[arg(long)]
    auto_approve: bool,
}

fn parse_environment(value: &str) -> Result<Environment, String> {
    value.parse::<Environment>().map_err(|err| err.to_string())
}

impl From<DeployArgs> for RunFlags {
    fn from(args: DeployArgs) -> Self {
        RunFlags {
            skip_tests: args.skip_tests,
            skip_backup: args.skip_backup,
            dry_run: args.dry_run,
            auto_approve: args.auto_approve,
            component: args.component,
            rollback: args.rollback,
        }
    }
}

impl StagehandCommand {
    fn into_invocation(self) -> (Command, RunFlags) {
        match self {
            StagehandCommand::Dev => (Command::Dev, RunFlags::default()),
            StagehandCommand::Staging(args) => (Command::Staging, args.into()),
            StagehandCommand::Production(args) => (Command::Production, args.into()),
            StagehandCommand::Validate => (Command::Validate, RunFlags::default()),
            StagehandCommand::Terraform(args) => (
                Command::Terraform(args.env),
                RunFlags {
                    dry_run: args.dry_run,
                    auto_approve: args.auto_approve,
                    ..RunFlags::default()
                },
            ),
            StagehandCommand::Kubernetes(args) => (
                Command::Kubernetes(args.env),
                RunFlags {
                    dry_run: args.dry_run,
                    component: args.component,
                    ..RunFlags::default()
                },
            ),
            StagehandCommand::Status(args) => (Command::Status(args.env), RunFlags::default()),
            StagehandCommand::Destroy(args) => (
                Command::Destroy(args.env),
                RunFlags {
                    auto_approve: args.auto_approve,
                    ..RunFlags::default()
                },
            ),
            StagehandCommand::Logs => (Command::Logs, RunFlags::default()),
        }
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn parse_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn run() -> Result<i32, CliError> {
    let cli = match StagehandCli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return Ok(parse_exit_code(err.kind()));
        }
    };
    init_tracing();

    let config = config::load_config(cli.config.as_deref())?;
    let (command, flags) = cli.command.into_invocation();
    let log = RunLog::open(&config::log_dir(&config), &config.project)?;

    let interrupt = InterruptFlag::new();
    let handler_flag = interrupt.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        handler_flag.trigger();
        eprintln!("interrupt received, letting the current step wind down");
    }) {
        tracing::warn!(error = %err, "failed to install interrupt handler");
    }
    let executor = ProcessExecutor::with_interrupt(interrupt).interrupt_grace(config.interrupt_grace());

    match command {
        Command::Logs => show_previous_log(&config, &log),
        Command::Status(env) => show_status(&executor, &config, &log, env),
        _ => {
            let result = Pipeline::new(&executor, &config, &StdinConfirmer, &log).execute(command, flags);
            print_summary(&log, &result.run);
            Ok(result.exit_code())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("STAGEHAND_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn show_status(
    executor: &ProcessExecutor,
    config: &PipelineConfig,
    log: &RunLog,
    env: Environment,
) -> Result<i32, CliError> {
    let flags = RunFlags::default();
    let ctx = StageContext {
        executor,
        config,
        confirmer: &DenyAll,
        log,
        flags: &flags,
        environment: Some(env),
    };
    match query_status(&ctx) {
        Ok(report) => {
            for line in report.render().lines() {
                log.info(line);
            }
            Ok(0)
        }
        Err(err) => {
            log.error(format!("status query failed: {err}"));
            Ok(1)
        }
    }
}

fn show_previous_log(config: &PipelineConfig, log: &RunLog) -> Result<i32, CliError> {
    let dir = config::log_dir(config);
    match previous_run_log(&dir, &config.project, log.path())? {
        Some(path) => {
            log.info(format!("Opening {}", path.display()));
            page_log(&path)?;
        }
        None => log.info(format!("No earlier run logs in {}", dir.display())),
    }
    Ok(0)
}

fn print_summary(log: &RunLog, run: &DeploymentRun) {
    if run.stages.is_empty() {
        return;
    }
    log.info("Stage summary:");
    for record in &run.stages {
        let outcome = match record.outcome {
            StageOutcome::Pending => "pending".to_string(),
            StageOutcome::Passed if !record.warnings.is_empty() => {
                format!("passed ({} warning(s))", record.warnings.len())
            }
            StageOutcome::Passed => "passed".to_string(),
            StageOutcome::Failed => "failed".to_string(),
            StageOutcome::Skipped => format!(
                "skipped ({})",
                record.skip_reason.as_deref().unwrap_or("precondition")
            ),
        };
        log.info(format!("  {:<18} {outcome}", record.stage.name()));
    }
    let elapsed = Local::now() - run.started_at;
    if run.is_success() {
        log.success(format!("Finished in {}s", elapsed.num_seconds()));
    } else {
        log.error(format!(
            "Failed after {}s: {}",
            elapsed.num_seconds(),
            run.error.as_deref().unwrap_or("unknown error")
        ));
    }
}
