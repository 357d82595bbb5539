use stagehand_core_domain::StageKind;

use crate::{StageContext, StageError, StageReport};

/// Runs the smoke suite (staging) or the integration suite (production)
/// against the freshly deployed environment.
pub fn verify_deployment(ctx: &StageContext<'_>, stage: StageKind) -> Result<StageReport, StageError> {
    let env = ctx.environment(stage.name())?;
    let (label, template) = match stage {
        StageKind::IntegrationTest => ("integration tests", &ctx.config.integration_command),
        _ => ("smoke tests", &ctx.config.smoke_command),
    };

    ctx.log.info(format!("Running {label} against {env}"));
    let invocation = ctx.config.command(template, env, None)?;
    let output = ctx.run_logged(&invocation)?;
    if !output.success() {
        return Err(StageError::TestFailure(format!(
            "{label} failed: {}",
            output.failure_summary()
        )));
    }
    ctx.log.success(format!("{label} passed"));
    Ok(StageReport::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, fail, fast_config, FakeExecutor, ScriptedConfirmer};
    use crate::RunLog;
    use stagehand_core_domain::{Environment, RunFlags};

    #[test]
    fn production_runs_integration_suite() {
        let executor = FakeExecutor::new();
        let config = fast_config();
        let confirmer = ScriptedConfirmer::default();
        let log = RunLog::in_memory();
        let flags = RunFlags::default();
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Production);

        verify_deployment(&ctx, StageKind::IntegrationTest).expect("verify");
        assert_eq!(
            executor.commands(),
            vec!["./scripts/integration-test.sh production"]
        );
    }

    #[test]
    fn failing_smoke_suite_fails_stage() {
        let executor = FakeExecutor::new()
            .respond("./scripts/smoke-test.sh staging", fail(1, "GET /health -> 502"));
        let config = fast_config();
        let confirmer = ScriptedConfirmer::default();
        let log = RunLog::in_memory();
        let flags = RunFlags::default();
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Staging);

        let err = verify_deployment(&ctx, StageKind::SmokeTest).expect_err("smoke fails");
        assert_eq!(
            err,
            StageError::TestFailure("smoke tests failed: GET /health -> 502".to_string())
        );
    }
}
