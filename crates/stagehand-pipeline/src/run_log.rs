use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use colored::Colorize;
use stagehand_core_domain::{LogLevel, LogRecord};

pub fn log_file_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{prefix}-deploy-{}.log", at.format("%Y%m%d-%H%M%S"))
}

/// Operator transcript of one invocation, mirrored to the terminal and the
/// run's log file.
pub struct RunLog {
    path: PathBuf,
    file: Option<Mutex<File>>,
    console: bool,
    records: Mutex<Vec<LogRecord>>,
}

impl RunLog {
    pub fn open(dir: &Path, prefix: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name(prefix, Local::now()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Some(Mutex::new(file)),
            console: true,
            records: Mutex::new(Vec::new()),
        })
    }

    /// Keeps records in memory only.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            file: None,
            console: false,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn quiet(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Info, message.as_ref());
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Success, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Error, message.as_ref());
    }

    /// File and record only; for lines the terminal already shows, such as
    /// an interactive prompt.
    pub fn transcript(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Info, message.as_ref(), false);
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    fn write(&self, level: LogLevel, message: &str) {
        self.emit(level, message, self.console);
    }

    fn emit(&self, level: LogLevel, message: &str, echo: bool) {
        let record = LogRecord {
            timestamp: Local::now(),
            level,
            message: message.to_string(),
        };
        let line = record.render();

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                if let Err(err) = writeln!(file, "{line}") {
                    tracing::warn!(path = %self.path.display(), error = %err, "failed to append run log");
                }
            }
        }

        if echo {
            match level {
                LogLevel::Info => println!("{}", line.blue()),
                LogLevel::Success => println!("{}", line.green()),
                LogLevel::Warn => println!("{}", line.yellow()),
                LogLevel::Error => eprintln!("{}", line.red()),
            }
        }

        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
