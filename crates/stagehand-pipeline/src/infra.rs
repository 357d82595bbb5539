use chrono::Local;
use stagehand_core_domain::Environment;
use stagehand_exec::ToolInvocation;

use crate::{StageContext, StageError, StageReport};

fn terraform(ctx: &StageContext<'_>) -> ToolInvocation {
    ToolInvocation::new(&ctx.config.tools.iac_tool).current_dir(&ctx.config.terraform_dir)
}

fn var_file_arg(ctx: &StageContext<'_>, env: Environment) -> String {
    format!("-var-file={}", ctx.config.target(env).tfvars.display())
}

pub fn plan_file(env: Environment) -> String {
    format!("{env}.tfplan")
}

/// `init`, then select the environment workspace, creating it on first use.
pub fn prepare_workspace(ctx: &StageContext<'_>, env: Environment) -> Result<(), StageError> {
    ctx.run_checked("terraform init", &terraform(ctx).args(["init", "-input=false"]))?;

    let select = ctx.run_logged(&terraform(ctx).args(["workspace", "select", env.as_str()]))?;
    if !select.success() {
        ctx.log.info(format!("Creating workspace {env}"));
        ctx.run_checked(
            "terraform workspace",
            &terraform(ctx).args(["workspace", "new", env.as_str()]),
        )?;
    }
    Ok(())
}

pub fn provision_infra(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let env = ctx.environment("provision-infra")?;
    if env.is_local() {
        return Err(StageError::UnsupportedEnvironment {
            command: "provision-infra".to_string(),
            environment: env.to_string(),
        });
    }

    ctx.log.info(format!("Provisioning infrastructure for {env}"));
    prepare_workspace(ctx, env)?;

    if ctx.flags.dry_run {
        ctx.run_checked(
            "terraform plan",
            &terraform(ctx).args(["plan".to_string(), "-input=false".to_string(), var_file_arg(ctx, env)]),
        )?;
        ctx.log.success("Dry run: plan shown, nothing applied");
        return Ok(StageReport::default());
    }

    let plan = plan_file(env);
    ctx.run_checked(
        "terraform plan",
        &terraform(ctx).args([
            "plan".to_string(),
            "-input=false".to_string(),
            var_file_arg(ctx, env),
            format!("-out={plan}"),
        ]),
    )?;

    if env.profile().policy.confirms_apply() && !ctx.flags.auto_approve {
        let prompt = format!("Apply this plan to {env}? [y/N]: ");
        if !ctx.confirm("terraform apply", &prompt)? {
            ctx.log.warn("Apply declined by operator");
            return Err(StageError::DeploymentCancelled(format!(
                "terraform apply to {env} declined"
            )));
        }
        ctx.log.info(format!("Apply to {env} confirmed by operator"));
    }

    ctx.run_checked(
        "terraform apply",
        &terraform(ctx).args(["apply", "-input=false", plan.as_str()]),
    )?;
    let applied_at = Local::now();
    ctx.log.success(format!("Infrastructure applied to {env}"));
    Ok(StageReport {
        applied_at: Some(applied_at),
        ..StageReport::default()
    })
}
