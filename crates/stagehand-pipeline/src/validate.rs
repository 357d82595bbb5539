use stagehand_core_domain::Environment;
use stagehand_exec::ToolInvocation;

use crate::local::compose;
use crate::{StageContext, StageError, StageReport};

/// Static checks only: formatting, module validation and manifest
/// dry-applies for every known environment. Failures are collected, not
/// short-circuited.
pub fn validate_all(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let terraform =
        || ToolInvocation::new(&ctx.config.tools.iac_tool).current_dir(&ctx.config.terraform_dir);

    let mut checks: Vec<(String, ToolInvocation)> = vec![
        (
            "terraform fmt".to_string(),
            terraform().args(["fmt", "-check", "-recursive"]),
        ),
        (
            "terraform init".to_string(),
            terraform().args(["init", "-backend=false", "-input=false"]),
        ),
        ("terraform validate".to_string(), terraform().arg("validate")),
    ];
    for env in Environment::ALL {
        if env.is_local() {
            checks.push((format!("{env} compose config"), compose(ctx).args(["config", "-q"])));
        } else {
            let overlay = ctx.config.target(env).overlay;
            checks.push((
                format!("{env} manifests"),
                ToolInvocation::new(&ctx.config.tools.cluster_client)
                    .args(["apply", "-k"])
                    .arg(overlay.to_string_lossy())
                    .arg("--dry-run=client"),
            ));
        }
    }

    let mut failures = Vec::new();
    for (label, invocation) in checks {
        ctx.log.info(format!("Checking {label}"));
        match ctx.run_logged(&invocation) {
            Ok(output) if output.success() => ctx.log.success(format!("{label}: ok")),
            Ok(output) => {
                let message = format!("{label}: {}", output.failure_summary());
                ctx.log.error(&message);
                failures.push(message);
            }
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                let message = format!("{label}: {err}");
                ctx.log.error(&message);
                failures.push(message);
            }
        }
    }

    if !failures.is_empty() {
        return Err(StageError::ValidationFailure { failures });
    }
    ctx.log.success("All static checks passed");
    Ok(StageReport::default())
}
