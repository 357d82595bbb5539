use stagehand_exec::ToolInvocation;

use crate::{StageContext, StageError, StageReport};

pub fn run_preflight(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let env = ctx.environment("preflight")?;
    let tools = &ctx.config.tools;
    let mut report = StageReport::default();

    if !env.is_local() {
        ctx.log.info("Verifying cloud credentials");
        let identity = ctx.probe(
            &ToolInvocation::new(&tools.cloud_cli).args(["sts", "get-caller-identity"]),
        )?;
        if !identity.success() {
            return Err(StageError::CredentialError(identity.failure_summary()));
        }

        let context = ctx.probe(
            &ToolInvocation::new(&tools.cluster_client).args(["config", "current-context"]),
        )?;
        if context.success() {
            ctx.log
                .info(format!("Cluster context: {}", context.stdout.trim()));
        } else {
            let message = "no cluster context selected; it will be configured during deploy-app";
            ctx.log.warn(message);
            report = report.warn(message);
        }
    }

    ctx.log.info("Checking container daemon");
    let daemon = ctx.probe(&ToolInvocation::new(&tools.container_engine).arg("info"))?;
    if !daemon.success() {
        return Err(StageError::DaemonNotRunning(daemon.failure_summary()));
    }

    ctx.log.success(format!("Pre-flight checks passed for {env}"));
    Ok(report)
}
