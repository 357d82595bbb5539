use stagehand_exec::ToolInvocation;

use crate::infra::prepare_workspace;
use crate::local::compose;
use crate::{StageContext, StageError, StageReport};

/// Destroys an environment once the operator has typed its name back.
pub fn teardown(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let env = ctx.environment("teardown")?;

    if !ctx.flags.auto_approve {
        ctx.log.warn(format!("About to destroy every resource in {env}"));
        let prompt = format!("Type '{env}' to confirm destruction: ");
        let answer = ctx.ask("teardown", &prompt)?;
        if answer.trim() != env.as_str() {
            return Err(StageError::DeploymentCancelled(format!(
                "destroy of {env} not confirmed"
            )));
        }
    }

    if env.is_local() {
        ctx.run_checked("compose down", &compose(ctx).args(["down", "-v"]))?;
    } else {
        prepare_workspace(ctx, env)?;
        let var_file = format!("-var-file={}", ctx.config.target(env).tfvars.display());
        ctx.run_checked(
            "terraform destroy",
            &ToolInvocation::new(&ctx.config.tools.iac_tool)
                .current_dir(&ctx.config.terraform_dir)
                .args(["destroy", "-input=false", "-auto-approve"])
                .arg(var_file),
        )?;
    }
    ctx.log.success(format!("{env} destroyed"));
    Ok(StageReport::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, fast_config, FakeExecutor, ScriptedConfirmer};
    use crate::RunLog;
    use stagehand_core_domain::{Environment, RunFlags};

    #[test]
    fn wrong_name_cancels_destroy() {
        let executor = FakeExecutor::new();
        let config = fast_config();
        let confirmer = ScriptedConfirmer::typing("prod");
        let log = RunLog::in_memory();
        let flags = RunFlags::default();
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Production);

        let err = teardown(&ctx).expect_err("cancelled");
        assert!(matches!(err, StageError::DeploymentCancelled(_)));
        assert!(executor.commands().is_empty());
    }

    #[test]
    fn typed_answer_is_recorded_in_run_log() {
        let executor = FakeExecutor::new();
        let config = fast_config();
        let confirmer = ScriptedConfirmer::typing("staging");
        let log = RunLog::in_memory();
        let flags = RunFlags::default();
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Staging);

        teardown(&ctx).expect("destroyed");
        assert!(log
            .records()
            .iter()
            .any(|record| record.message == "operator typed 'staging'"));
    }

    #[test]
    fn dev_teardown_removes_volumes() {
        let executor = FakeExecutor::new();
        let config = fast_config();
        let confirmer = ScriptedConfirmer::typing("dev");
        let log = RunLog::in_memory();
        let flags = RunFlags::default();
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Dev);

        teardown(&ctx).expect("destroyed");
        assert_eq!(
            executor.commands(),
            vec!["docker-compose -f docker-compose.yml down -v"]
        );
    }

    #[test]
    fn auto_approved_cloud_teardown_destroys_workspace() {
        let executor = FakeExecutor::new();
        let config = fast_config();
        let confirmer = ScriptedConfirmer::default();
        let log = RunLog::in_memory();
        let flags = RunFlags {
            auto_approve: true,
            ..RunFlags::default()
        };
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Staging);

        teardown(&ctx).expect("destroyed");
        assert_eq!(confirmer.prompt_count(), 0);
        assert_eq!(
            executor.commands().last().map(String::as_str),
            Some("terraform destroy -input=false -auto-approve -var-file=environments/staging.tfvars")
        );
    }
}
