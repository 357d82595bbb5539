use crate::{StageContext, StageError, StageReport};

/// Installs declared test dependencies, then runs the suite.
pub fn run_tests(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let env = ctx.environment("tests")?;

    if let Some(install) = &ctx.config.test_install {
        ctx.log.info("Installing test dependencies");
        let invocation = ctx.config.command(install, env, None)?;
        let output = ctx.run_logged(&invocation)?;
        if !output.success() {
            return Err(StageError::TestFailure(format!(
                "dependency install failed: {}",
                output.failure_summary()
            )));
        }
    }

    ctx.log.info("Running test suite");
    let invocation = ctx.config.command(&ctx.config.test_command, env, None)?;
    let output = ctx.run_logged(&invocation)?;
    if !output.success() {
        return Err(StageError::TestFailure(output.failure_summary()));
    }
    ctx.log.success("Test suite passed");
    Ok(StageReport::default())
}
