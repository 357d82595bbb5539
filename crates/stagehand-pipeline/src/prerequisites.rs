use crate::{StageContext, StageError, StageReport};

/// Probes every configured tool and reports all missing ones at once.
pub fn check_prerequisites(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    ctx.log.info("Checking required tools");
    let mut missing = Vec::new();
    for (role, program) in ctx.config.tools.roles() {
        if ctx.executor.is_available(program) {
            tracing::debug!(role, program, "tool found");
        } else {
            ctx.log.error(format!("{program} ({role}) is not installed"));
            missing.push(program.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(StageError::MissingTool { tools: missing });
    }
    ctx.log.success("All required tools are installed");
    Ok(StageReport::default())
}
