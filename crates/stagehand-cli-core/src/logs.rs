use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::CliError;

/// Run logs of `prefix` in `dir`, oldest first. Names embed a sortable
/// timestamp, so name order is start order.
pub fn list_run_logs(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, CliError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let stem = format!("{prefix}-deploy-");
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name().and_then(|name| name.to_str()) {
            Some(value) => value,
            None => continue,
        };
        if name.starts_with(&stem) && name.ends_with(".log") && path.is_file() {
            logs.push(path);
        }
    }
    logs.sort();
    Ok(logs)
}

/// Most recent log other than the current invocation's own.
pub fn previous_run_log(
    dir: &Path,
    prefix: &str,
    current: &Path,
) -> Result<Option<PathBuf>, CliError> {
    Ok(list_run_logs(dir, prefix)?
        .into_iter()
        .filter(|path| path != current)
        .last())
}

/// Opens `path` in `$PAGER` (default `less`); prints it when no pager runs.
pub fn page_log(path: &Path) -> Result<(), CliError> {
    let pager = std::env::var("PAGER")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "less".to_string());
    let mut words = shell_words::split(&pager)
        .map_err(|err| CliError::Config(format!("invalid PAGER: {err}")))?;
    if !words.is_empty() {
        let program = words.remove(0);
        match Command::new(&program).args(&words).arg(path).status() {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => debug!(pager = %program, code = ?status.code(), "pager exited non-zero"),
            Err(err) => debug!(pager = %program, error = %err, "pager unavailable"),
        }
    }
    let content = fs::read_to_string(path)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
