use std::borrow::Cow;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DRAIN_QUIET: Duration = Duration::from_millis(200);
const DRAIN_LIMIT: Duration = Duration::from_secs(2);
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    /// Splits a configured command line with shell-word rules.
    pub fn parse(command_line: &str) -> Result<Self, ExecError> {
        let mut words = shell_words::split(command_line).map_err(|err| ExecError::InvalidCommand {
            message: format!("{command_line}: {err}"),
        })?;
        if words.is_empty() {
            return Err(ExecError::InvalidCommand {
                message: "empty command line".to_string(),
            });
        }
        let program = words.remove(0);
        Ok(Self::new(program).args(words))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|word| render_word(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// `key=value` style flags stay unquoted; anything else shell-unsafe is quoted.
fn render_word(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=/,.+:@%".contains(c));
    if plain {
        Cow::Borrowed(word)
    } else {
        shell_words::quote(word)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, or stdout when stderr is silent.
    pub fn failure_summary(&self) -> String {
        let pick = |text: &str| {
            text.lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
        };
        pick(&self.stderr)
            .or_else(|| pick(&self.stdout))
            .unwrap_or_else(|| format!("exit code {}", self.exit_code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    Spawn { program: String, message: String },
    InvalidCommand { message: String },
    Timeout { command: String, after: Duration },
    Interrupted { command: String },
    Io { message: String },
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Spawn { program, message } => {
                write!(f, "failed to start {program}: {message}")
            }
            ExecError::InvalidCommand { message } => write!(f, "invalid command: {message}"),
            ExecError::Timeout { command, after } => {
                write!(f, "command timed out after {}s: {command}", after.as_secs())
            }
            ExecError::Interrupted { command } => write!(f, "interrupted by operator: {command}"),
            ExecError::Io { message } => write!(f, "io error: {message}"),
        }
    }
}

impl std::error::Error for ExecError {}

pub trait ToolExecutor {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ExecError>;

    fn run_streaming(
        &self,
        invocation: &ToolInvocation,
        on_output: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<ToolOutput, ExecError> {
        let output = self.run(invocation)?;
        for line in output.stdout.lines() {
            on_output(OutputStream::Stdout, line);
        }
        for line in output.stderr.lines() {
            on_output(OutputStream::Stderr, line);
        }
        Ok(output)
    }

    fn is_available(&self, program: &str) -> bool;

    /// Whether the operator asked the run to stop.
    fn interrupt_requested(&self) -> bool {
        false
    }
}

/// Operator interrupt shared between the signal handler and running commands.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    interrupt: InterruptFlag,
    interrupt_grace: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            interrupt: InterruptFlag::new(),
            interrupt_grace: DEFAULT_INTERRUPT_GRACE,
        }
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interrupt(interrupt: InterruptFlag) -> Self {
        Self {
            interrupt,
            ..Self::default()
        }
    }

    /// How long an interrupted command may keep running before it is killed.
    pub fn interrupt_grace(mut self, grace: Duration) -> Self {
        self.interrupt_grace = grace;
        self
    }
}

impl ToolExecutor for ProcessExecutor {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ExecError> {
        self.run_streaming(invocation, &mut |_, _| {})
    }

    fn run_streaming(
        &self,
        invocation: &ToolInvocation,
        on_output: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<ToolOutput, ExecError> {
        let command_line = invocation.command_line();
        if self.interrupt.is_set() {
            return Err(ExecError::Interrupted {
                command: command_line,
            });
        }
        debug!(command = %command_line, "spawning tool");
        let started = Instant::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|err| ExecError::Spawn {
            program: invocation.program.clone(),
            message: err.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| ExecError::Io {
            message: format!("failed to capture stdout of {}", invocation.program),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| ExecError::Io {
            message: format!("failed to capture stderr of {}", invocation.program),
        })?;

        let (tx, rx) = mpsc::channel::<(OutputStream, String)>();
        let tx_out = tx.clone();
        let stdout_handle = thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(Result::ok) {
                let _ = tx_out.send((OutputStream::Stdout, line));
            }
        });
        let tx_err = tx.clone();
        let stderr_handle = thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                let _ = tx_err.send((OutputStream::Stderr, line));
            }
        });
        drop(tx);

        let timeout = invocation.timeout;
        let deadline = timeout.map(|timeout| started + timeout);
        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        let mut record = |stream: OutputStream, line: String| {
            on_output(stream, &line);
            let buf = match stream {
                OutputStream::Stdout => &mut stdout_buf,
                OutputStream::Stderr => &mut stderr_buf,
            };
            buf.push_str(&line);
            buf.push('\n');
        };

        let mut pipes_open = true;
        let mut interrupted_at: Option<Instant> = None;
        let status = loop {
            if pipes_open {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok((stream, line)) => record(stream, line),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => pipes_open = false,
                }
            } else {
                thread::sleep(POLL_INTERVAL);
            }

            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => {
                    return Err(ExecError::Io {
                        message: format!("failed to wait on {}: {err}", invocation.program),
                    })
                }
            }

            if let (Some(deadline), Some(after)) = (deadline, timeout) {
                if Instant::now() >= deadline {
                    let err = ExecError::Timeout {
                        command: command_line.clone(),
                        after,
                    };
                    warn!(command = %command_line, error = %err, "killing tool");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(err);
                }
            }

            // The terminal already sent SIGINT to the child; let it wind down
            // before forcing it.
            if self.interrupt.is_set() {
                let since = *interrupted_at.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.interrupt_grace {
                    warn!(command = %command_line, "tool ignored interrupt, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExecError::Interrupted {
                        command: command_line.clone(),
                    });
                }
            }
        };

        // Background grandchildren may keep the pipes open after the command
        // exits; take what is buffered and leave the readers behind.
        let drain_until = Instant::now() + DRAIN_LIMIT;
        let mut drained = !pipes_open;
        while !drained && Instant::now() < drain_until {
            match rx.recv_timeout(DRAIN_QUIET) {
                Ok((stream, line)) => record(stream, line),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => drained = true,
            }
        }
        if drained {
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
        } else {
            debug!(command = %command_line, "output pipes still held after exit");
        }

        if interrupted_at.is_some() {
            return Err(ExecError::Interrupted {
                command: command_line,
            });
        }

        let exit_code = status.code().unwrap_or(-1);
        debug!(
            command = %command_line,
            exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool finished"
        );

        Ok(ToolOutput {
            exit_code,
            stdout: stdout_buf,
            stderr: stderr_buf,
        })
    }

    fn is_available(&self, program: &str) -> bool {
        find_executable(program).is_some()
    }

    fn interrupt_requested(&self) -> bool {
        self.interrupt.is_set()
    }
}

pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if name.contains(std::path::MAIN_SEPARATOR) || path.is_absolute() {
        return is_executable(path).then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
