use serde::Serialize;
use stagehand_core_domain::Environment;
use stagehand_exec::ToolInvocation;

use crate::app::configure_cluster_access;
use crate::local::compose;
use crate::{StageContext, StageError};

const CLUSTER_RESOURCES: [(&str, &str); 4] = [
    ("Workloads", "deployments"),
    ("Services", "services"),
    ("Ingress", "ingress"),
    ("Autoscalers", "hpa"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSection {
    pub title: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub environment: Environment,
    pub sections: Vec<StatusSection>,
}

impl StatusReport {
    pub fn render(&self) -> String {
        let mut out = format!("Status of {}\n", self.environment);
        for section in &self.sections {
            out.push_str(&format!("\n== {} ==\n", section.title));
            let body = section.output.trim_end();
            if body.is_empty() {
                out.push_str("(none)\n");
            } else {
                out.push_str(body);
                out.push('\n');
            }
        }
        out
    }
}

/// Read-only snapshot of what is currently deployed.
pub fn query_status(ctx: &StageContext<'_>) -> Result<StatusReport, StageError> {
    let env = ctx.environment("status")?;
    let mut sections = Vec::new();

    if env.is_local() {
        let output = ctx.probe(&compose(ctx).arg("ps"))?;
        if !output.success() {
            return Err(StageError::tool("compose ps", output.failure_summary()));
        }
        sections.push(StatusSection {
            title: "Containers".to_string(),
            output: output.stdout,
        });
    } else {
        configure_cluster_access(ctx, env)?;
        let namespace = ctx.config.target(env).namespace;
        for (title, resource) in CLUSTER_RESOURCES {
            let output = ctx.probe(
                &ToolInvocation::new(&ctx.config.tools.cluster_client).args([
                    "get",
                    resource,
                    "-n",
                    namespace.as_str(),
                    "-o",
                    "wide",
                ]),
            )?;
            if !output.success() {
                return Err(StageError::tool(
                    format!("kubectl get {resource}"),
                    output.failure_summary(),
                ));
            }
            sections.push(StatusSection {
                title: title.to_string(),
                output: output.stdout,
            });
        }
    }

    Ok(StatusReport {
        environment: env,
        sections,
    })
}
