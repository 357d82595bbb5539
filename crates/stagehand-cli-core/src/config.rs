use std::path::{Path, PathBuf};
use std::{env, fs};

use stagehand_pipeline::PipelineConfig;
use tracing::debug;

use crate::CliError;

pub const CONFIG_FILE: &str = "stagehand.json";
pub const CONFIG_ENV: &str = "STAGEHAND_CONFIG";
pub const LOG_DIR_ENV: &str = "STAGEHAND_LOG_DIR";
pub const BACKUP_DIR_ENV: &str = "STAGEHAND_BACKUP_DIR";

fn resolve_home_dir() -> Option<PathBuf> {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}

fn normalize_path(value: &str) -> Result<PathBuf, CliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CliError::Config("empty path".to_string()));
    }
    match trimmed.strip_prefix("~/") {
        Some(rest) => resolve_home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| CliError::Config("home directory not found".to_string())),
        None => Ok(PathBuf::from(trimmed)),
    }
}

fn env_path(name: &str) -> Result<Option<PathBuf>, CliError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => normalize_path(&value).map(Some),
        _ => Ok(None),
    }
}

/// `--config`, then `STAGEHAND_CONFIG`, then `./stagehand.json` when present.
/// An explicitly named file must exist.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, CliError> {
    let named = match explicit {
        Some(path) => Some(normalize_path(&path.to_string_lossy())?),
        None => env_path(CONFIG_ENV)?,
    };
    if let Some(path) = named {
        if !path.is_file() {
            return Err(CliError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }
        return Ok(Some(path));
    }
    let default = PathBuf::from(CONFIG_FILE);
    Ok(default.is_file().then_some(default))
}

pub fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig, CliError> {
    let mut config = match resolve_config_path(explicit)? {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|err| {
                CliError::Config(format!("{}: {err}", path.display()))
            })?
        }
        None => PipelineConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut PipelineConfig) -> Result<(), CliError> {
    if let Some(dir) = env_path(LOG_DIR_ENV)? {
        config.log_dir = Some(dir);
    }
    if let Some(dir) = env_path(BACKUP_DIR_ENV)? {
        config.backup_dir = dir;
    }
    Ok(())
}

/// Directory holding run logs; the system temp dir unless configured.
pub fn log_dir(config: &PipelineConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env_lock;

    fn clear_env() {
        for name in [CONFIG_ENV, LOG_DIR_ENV, BACKUP_DIR_ENV] {
            env::remove_var(name);
        }
    }

    #[test]
    fn explicit_config_is_loaded() {
        let _guard = env_lock();
        clear_env();
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("deploy.json");
        fs::write(
            &path,
            r#"{ "project": "shop", "strict_backup": true, "components": ["api"] }"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.project, "shop");
        assert!(config.strict_backup);
        assert_eq!(config.components, vec!["api"]);
        assert_eq!(config.rollout_timeout_secs, 600);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let _guard = env_lock();
        clear_env();
        let err = load_config(Some(Path::new("/nonexistent/stagehand.json"))).expect_err("missing");
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn env_selects_config_and_overrides_dirs() {
        let _guard = env_lock();
        clear_env();
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("stagehand.json");
        fs::write(&path, r#"{ "backup_dir": "from-file" }"#).expect("write config");

        env::set_var(CONFIG_ENV, &path);
        env::set_var(LOG_DIR_ENV, temp.path().join("logs"));
        env::set_var(BACKUP_DIR_ENV, temp.path().join("backups"));
        let config = load_config(None).expect("load");
        clear_env();

        assert_eq!(config.backup_dir, temp.path().join("backups"));
        assert_eq!(log_dir(&config), temp.path().join("logs"));
    }

    #[test]
    fn malformed_config_names_the_file() {
        let _guard = env_lock();
        clear_env();
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("broken.json");
        fs::write(&path, "{ project: ").expect("write config");

        let err = load_config(Some(&path)).expect_err("malformed");
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn log_dir_defaults_to_temp() {
        let config = PipelineConfig::default();
        assert_eq!(log_dir(&config), env::temp_dir());
    }
}
