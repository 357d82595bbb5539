use std::thread;
use std::time::Instant;

use stagehand_core_domain::Environment;
use stagehand_exec::ToolInvocation;
use tracing::debug;

use crate::{StageContext, StageError, StageReport};

const ROLLED_OUT: &str = "successfully rolled out";

pub fn component_selector(component: &str) -> String {
    format!("app={component}")
}

/// Writes kubeconfig for the environment's cluster through the cloud CLI.
pub fn configure_cluster_access(ctx: &StageContext<'_>, env: Environment) -> Result<(), StageError> {
    let target = ctx.config.target(env);
    ctx.run_checked(
        "update-kubeconfig",
        &ToolInvocation::new(&ctx.config.tools.cloud_cli).args([
            "eks",
            "update-kubeconfig",
            "--name",
            target.cluster.as_str(),
            "--region",
            target.region.as_str(),
        ]),
    )?;
    Ok(())
}

fn kustomize(ctx: &StageContext<'_>, verb: &str, env: Environment) -> ToolInvocation {
    let overlay = ctx.config.target(env).overlay;
    let mut invocation = ToolInvocation::new(&ctx.config.tools.cluster_client)
        .arg(verb)
        .arg("-k")
        .arg(overlay.to_string_lossy());
    if let Some(component) = &ctx.flags.component {
        invocation = invocation.arg("-l").arg(component_selector(component));
    }
    invocation
}

pub fn deploy_app(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let env = ctx.environment("deploy-app")?;
    if env.is_local() {
        return Err(StageError::UnsupportedEnvironment {
            command: "deploy-app".to_string(),
            environment: env.to_string(),
        });
    }

    configure_cluster_access(ctx, env)?;

    if ctx.flags.dry_run {
        // kubectl diff exits 1 when differences exist
        let output = ctx.run_logged(&kustomize(ctx, "diff", env))?;
        match output.exit_code {
            0 => ctx.log.success("Dry run: manifests match the cluster"),
            1 => ctx.log.success("Dry run: diff shown, nothing applied"),
            _ => return Err(StageError::tool("kubectl diff", output.failure_summary())),
        }
        return Ok(StageReport::default());
    }

    ctx.log.info(format!("Applying manifests to {env}"));
    ctx.run_checked("kubectl apply", &kustomize(ctx, "apply", env))?;

    let workloads = match &ctx.flags.component {
        Some(component) => vec![component.clone()],
        None => ctx.config.components.clone(),
    };
    let mut report = StageReport::default();
    if workloads.is_empty() {
        let message = "no components configured; rollout not watched";
        ctx.log.warn(message);
        report = report.warn(message);
    } else {
        wait_for_rollout(ctx, env, workloads)?;
    }
    ctx.log.success(format!("Application deployed to {env}"));
    Ok(report)
}

/// Polls every workload until it reports a finished rollout or the
/// configured timeout passes.
pub fn wait_for_rollout(
    ctx: &StageContext<'_>,
    env: Environment,
    mut pending: Vec<String>,
) -> Result<(), StageError> {
    let namespace = ctx.config.target(env).namespace;
    let timeout = ctx.config.rollout_timeout();
    let deadline = Instant::now() + timeout;
    ctx.log.info(format!(
        "Waiting up to {}s for rollout of {}",
        timeout.as_secs(),
        pending.join(", ")
    ));

    loop {
        let mut still_pending = Vec::new();
        for workload in pending {
            let output = ctx.probe(
                &ToolInvocation::new(&ctx.config.tools.cluster_client).args([
                    "rollout".to_string(),
                    "status".to_string(),
                    format!("deployment/{workload}"),
                    "-n".to_string(),
                    namespace.clone(),
                    "--watch=false".to_string(),
                ]),
            )?;
            if output.success() && output.stdout.contains(ROLLED_OUT) {
                ctx.log.success(format!("deployment/{workload} rolled out"));
            } else {
                debug!(workload = %workload, status = %output.stdout.trim(), "rollout pending");
                still_pending.push(workload);
            }
        }
        pending = still_pending;

        if pending.is_empty() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            ctx.log
                .error(format!("Rollout timed out: {}", pending.join(", ")));
            return Err(StageError::RolloutTimeout {
                workloads: pending,
                timeout_secs: timeout.as_secs(),
            });
        }
        thread::sleep(ctx.config.rollout_poll());
    }
}
