use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagehand_core_domain::Environment;
use stagehand_exec::ToolInvocation;

use crate::StageError;

/// Project configuration, usually read from `stagehand.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub project: String,
    pub log_dir: Option<PathBuf>,
    pub backup_dir: PathBuf,
    pub strict_backup: bool,
    pub tools: ToolSet,
    pub terraform_dir: PathBuf,
    pub compose_file: PathBuf,
    pub health_urls: Vec<String>,
    pub health_attempts: u32,
    pub health_interval_secs: u64,
    pub components: Vec<String>,
    pub rollout_timeout_secs: u64,
    pub rollout_poll_secs: u64,
    /// Seconds an interrupted tool may spend shutting down before it is killed.
    pub interrupt_grace_secs: u64,
    pub test_install: Option<String>,
    pub test_command: String,
    pub smoke_command: String,
    pub integration_command: String,
    pub data_backup_hook: Option<String>,
    pub environments: BTreeMap<Environment, EnvironmentSettings>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project: "stagehand".to_string(),
            log_dir: None,
            backup_dir: PathBuf::from("backups"),
            strict_backup: false,
            tools: ToolSet::default(),
            terraform_dir: PathBuf::from("terraform"),
            compose_file: PathBuf::from("docker-compose.yml"),
            health_urls: vec!["http://localhost:8000/health".to_string()],
            health_attempts: 30,
            health_interval_secs: 2,
            components: Vec::new(),
            rollout_timeout_secs: 600,
            rollout_poll_secs: 10,
            interrupt_grace_secs: 30,
            test_install: None,
            test_command: "make test".to_string(),
            smoke_command: "./scripts/smoke-test.sh {env}".to_string(),
            integration_command: "./scripts/integration-test.sh {env}".to_string(),
            data_backup_hook: None,
            environments: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn rollout_timeout(&self) -> Duration {
        Duration::from_secs(self.rollout_timeout_secs)
    }

    pub fn rollout_poll(&self) -> Duration {
        Duration::from_secs(self.rollout_poll_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_secs(self.interrupt_grace_secs)
    }

    pub fn target(&self, env: Environment) -> EnvironmentTarget {
        let settings = self.environments.get(&env).cloned().unwrap_or_default();
        let name = env.as_str();
        EnvironmentTarget {
            environment: env,
            namespace: settings
                .namespace
                .unwrap_or_else(|| format!("{}-{name}", self.project)),
            cluster: settings
                .cluster
                .unwrap_or_else(|| format!("{}-{name}", self.project)),
            region: settings.region.unwrap_or_else(|| "us-east-1".to_string()),
            tfvars: settings
                .tfvars
                .unwrap_or_else(|| PathBuf::from(format!("environments/{name}.tfvars"))),
            overlay: settings
                .overlay
                .unwrap_or_else(|| PathBuf::from(format!("k8s/overlays/{name}"))),
            config_file: settings
                .config_file
                .unwrap_or_else(|| PathBuf::from(format!("config/{name}.env"))),
        }
    }

    /// Builds an invocation from a configured command line, filling `{env}`
    /// and `{backup_dir}`.
    pub fn command(
        &self,
        template: &str,
        env: Environment,
        backup_dir: Option<&Path>,
    ) -> Result<ToolInvocation, StageError> {
        let mut line = template.replace("{env}", env.as_str());
        if let Some(dir) = backup_dir {
            let quoted = shell_words::quote(&dir.to_string_lossy()).into_owned();
            line = line.replace("{backup_dir}", &quoted);
        }
        ToolInvocation::parse(&line).map_err(|err| StageError::tool("config", err.to_string()))
    }
}

/// Concrete program for every external collaborator role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSet {
    pub container_engine: String,
    pub container_compose: String,
    pub cluster_client: String,
    pub iac_tool: String,
    pub config_manager: String,
    pub cloud_cli: String,
    pub json_tool: String,
    pub http_client: String,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self {
            container_engine: "docker".to_string(),
            container_compose: "docker-compose".to_string(),
            cluster_client: "kubectl".to_string(),
            iac_tool: "terraform".to_string(),
            config_manager: "helm".to_string(),
            cloud_cli: "aws".to_string(),
            json_tool: "jq".to_string(),
            http_client: "curl".to_string(),
        }
    }
}

impl ToolSet {
    pub fn roles(&self) -> [(&'static str, &str); 8] {
        [
            ("container-engine", &self.container_engine),
            ("container-compose", &self.container_compose),
            ("cluster-client", &self.cluster_client),
            ("iac-tool", &self.iac_tool),
            ("config-manager", &self.config_manager),
            ("cloud-cli", &self.cloud_cli),
            ("json-tool", &self.json_tool),
            ("http-client", &self.http_client),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub namespace: Option<String>,
    pub cluster: Option<String>,
    pub region: Option<String>,
    pub tfvars: Option<PathBuf>,
    pub overlay: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

/// Settings of one environment with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentTarget {
    pub environment: Environment,
    pub namespace: String,
    pub cluster: String,
    pub region: String,
    pub tfvars: PathBuf,
    pub overlay: PathBuf,
    pub config_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.rollout_timeout(), Duration::from_secs(600));
        assert_eq!(config.tools.roles()[2], ("cluster-client", "kubectl"));
    }

    #[test]
    fn environment_settings_override_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{
                "project": "shop",
                "environments": {
                    "production": { "namespace": "shop", "region": "eu-west-1" }
                }
            }"#,
        )
        .expect("parse");

        let prod = config.target(Environment::Production);
        assert_eq!(prod.namespace, "shop");
        assert_eq!(prod.region, "eu-west-1");
        assert_eq!(prod.cluster, "shop-production");
        assert_eq!(prod.tfvars, PathBuf::from("environments/production.tfvars"));

        let staging = config.target(Environment::Staging);
        assert_eq!(staging.namespace, "shop-staging");
        assert_eq!(staging.overlay, PathBuf::from("k8s/overlays/staging"));
    }

    #[test]
    fn substitutes_placeholders_in_command_lines() {
        let config = PipelineConfig::default();
        let invocation = config
            .command(
                "./hooks/db-backup.sh --env {env} --out {backup_dir}",
                Environment::Staging,
                Some(Path::new("/var/backups/20240101-000000 staging")),
            )
            .expect("command");
        assert_eq!(invocation.program, "./hooks/db-backup.sh");
        assert_eq!(
            invocation.args,
            vec!["--env", "staging", "--out", "/var/backups/20240101-000000 staging"]
        );
    }
}
