use std::thread;

use stagehand_exec::ToolInvocation;

use crate::{StageContext, StageError, StageReport};

pub fn compose(ctx: &StageContext<'_>) -> ToolInvocation {
    ToolInvocation::new(&ctx.config.tools.container_compose)
        .arg("-f")
        .arg(ctx.config.compose_file.to_string_lossy())
}

/// Builds images and starts the local stack detached.
pub fn compose_up(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    ctx.log.info("Building local images");
    ctx.run_checked("compose build", &compose(ctx).arg("build"))?;
    ctx.log.info("Starting local stack");
    ctx.run_checked("compose up", &compose(ctx).args(["up", "-d"]))?;
    ctx.log.success("Local stack is up");
    Ok(StageReport::default())
}

/// Polls each health endpoint until it answers or attempts run out.
pub fn health_check(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let attempts = ctx.config.health_attempts.max(1);
    for url in &ctx.config.health_urls {
        ctx.log.info(format!("Waiting for {url}"));
        let probe = ToolInvocation::new(&ctx.config.tools.http_client).args(["-fsS", url.as_str()]);
        let mut healthy = false;
        for attempt in 1..=attempts {
            if ctx.probe(&probe)?.success() {
                healthy = true;
                break;
            }
            tracing::debug!(url = %url, attempt, "health probe failed");
            if attempt < attempts {
                thread::sleep(ctx.config.health_interval());
            }
        }
        if !healthy {
            return Err(StageError::tool(
                "health-check",
                format!("{url} not healthy after {attempts} attempts"),
            ));
        }
        ctx.log.success(format!("{url} is healthy"));
    }
    Ok(StageReport::default())
}
