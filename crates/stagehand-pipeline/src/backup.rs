use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use stagehand_core_domain::BackupRecord;

use crate::{StageContext, StageError, StageReport};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Snapshots the environment's configuration (and data, for cloud targets)
/// before anything is mutated.
pub fn create_backup(ctx: &StageContext<'_>) -> Result<StageReport, StageError> {
    let env = ctx.environment("backup")?;
    let target = ctx.config.target(env);
    let created_at = Local::now();
    let dir = ctx
        .config
        .backup_dir
        .join(format!("{}-{env}", created_at.format("%Y%m%d-%H%M%S")));
    fs::create_dir_all(&dir).map_err(|err| {
        StageError::BackupFailure(format!("cannot create {}: {err}", dir.display()))
    })?;
    ctx.log.info(format!("Backing up {env} into {}", dir.display()));

    let mut report = StageReport::default();
    let mut sources = vec![target.config_file.clone()];
    if !env.is_local() {
        sources.push(ctx.config.terraform_dir.join(&target.tfvars));
    }

    let mut artifacts = Vec::new();
    for source in sources {
        if !source.is_file() {
            let message = format!("{} not found; not backed up", source.display());
            ctx.log.warn(&message);
            report = report.warn(message);
            continue;
        }
        artifacts.push(copy_into(&source, &dir)?);
    }

    if !env.is_local() {
        match &ctx.config.data_backup_hook {
            Some(hook) => {
                ctx.log.info("Running data backup hook");
                let invocation = ctx.config.command(hook, env, Some(&dir))?;
                let output = ctx.run_logged(&invocation)?;
                if !output.success() {
                    return Err(StageError::BackupFailure(format!(
                        "data backup hook failed: {}",
                        output.failure_summary()
                    )));
                }
            }
            None => {
                let message = "no data backup hook configured; data not backed up";
                ctx.log.warn(message);
                report = report.warn(message);
            }
        }
    }

    let record = BackupRecord {
        path: dir.clone(),
        environment: env,
        artifacts,
        created_at,
    };
    let manifest = serde_json::to_string_pretty(&record)
        .map_err(|err| StageError::BackupFailure(format!("cannot encode manifest: {err}")))?;
    fs::write(dir.join(MANIFEST_FILE), manifest)
        .map_err(|err| StageError::BackupFailure(format!("cannot write manifest: {err}")))?;

    ctx.log.success(format!("Backup written to {}", dir.display()));
    report.backup = Some(record);
    Ok(report)
}

fn copy_into(source: &Path, dir: &Path) -> Result<PathBuf, StageError> {
    let name = source
        .file_name()
        .ok_or_else(|| StageError::BackupFailure(format!("{} has no file name", source.display())))?;
    let dest = dir.join(name);
    fs::copy(source, &dest).map_err(|err| {
        StageError::BackupFailure(format!("cannot copy {}: {err}", source.display()))
    })?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, fail, fast_config, FakeExecutor, ScriptedConfirmer};
    use crate::{EnvironmentSettings, RunLog};
    use stagehand_core_domain::{Environment, RunFlags};

    #[test]
    fn copies_config_and_writes_manifest() {
        let temp = tempfile::tempdir().expect("temp dir");
        let config_file = temp.path().join("staging.env");
        fs::write(&config_file, "API_URL=https://staging.example.com\n").expect("write config");

        let mut config = fast_config();
        config.backup_dir = temp.path().join("backups");
        config.terraform_dir = temp.path().join("terraform");
        config.data_backup_hook = Some("./hooks/db-backup.sh {env} {backup_dir}".to_string());
        config.environments.insert(
            Environment::Staging,
            EnvironmentSettings {
                config_file: Some(config_file.clone()),
                ..EnvironmentSettings::default()
            },
        );

        let executor = FakeExecutor::new();
        let confirmer = ScriptedConfirmer::default();
        let log = RunLog::in_memory();
        let flags = RunFlags::default();
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Staging);

        let report = create_backup(&ctx).expect("backup");
        let record = report.backup.expect("record");
        assert_eq!(record.environment, Environment::Staging);
        assert!(record.path.ends_with(format!(
            "{}-staging",
            record.created_at.format("%Y%m%d-%H%M%S")
        )));
        assert_eq!(record.artifacts, vec![record.path.join("staging.env")]);
        assert!(record.path.join(MANIFEST_FILE).is_file());
        // tfvars file is absent in this fixture
        assert_eq!(report.warnings.len(), 1);
        assert!(executor.ran_matching("./hooks/db-backup.sh staging"));
    }

    #[test]
    fn failing_data_hook_is_a_backup_failure() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut config = fast_config();
        config.backup_dir = temp.path().to_path_buf();
        config.data_backup_hook = Some("pg-backup".to_string());

        let executor = FakeExecutor::new().respond("pg-backup", fail(1, "connection refused"));
        let confirmer = ScriptedConfirmer::default();
        let log = RunLog::in_memory();
        let flags = RunFlags::default();
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Production);

        let err = create_backup(&ctx).expect_err("hook fails");
        assert!(matches!(err, StageError::BackupFailure(message) if message.contains("connection refused")));
    }

    #[test]
    fn dev_backup_never_runs_the_data_hook() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut config = fast_config();
        config.backup_dir = temp.path().to_path_buf();
        config.data_backup_hook = Some("pg-backup".to_string());

        let executor = FakeExecutor::new();
        let confirmer = ScriptedConfirmer::default();
        let log = RunLog::in_memory();
        let flags = RunFlags::default();
        let ctx = context(&executor, &config, &confirmer, &log, &flags, Environment::Dev);

        create_backup(&ctx).expect("backup");
        assert!(executor.commands().is_empty());
    }
}
