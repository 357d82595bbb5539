use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use stagehand_core_domain::{Environment, RunFlags};
use stagehand_exec::{ExecError, InterruptFlag, ToolExecutor, ToolInvocation, ToolOutput};

use crate::{Confirmer, PipelineConfig, RunLog, StageContext};

pub fn ok(stdout: &str) -> Result<ToolOutput, ExecError> {
    Ok(ToolOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    })
}

pub fn fail(exit_code: i32, stderr: &str) -> Result<ToolOutput, ExecError> {
    Ok(ToolOutput {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

/// Canned responses keyed by command line; unknown commands succeed silently.
/// Queued responses are consumed in order, the last one repeats.
#[derive(Debug, Clone, Default)]
pub struct FakeExecutor {
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<ToolOutput, ExecError>>>>>,
    missing: HashSet<String>,
    commands: Arc<Mutex<Vec<String>>>,
    interrupt: InterruptFlag,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, command: &str, result: Result<ToolOutput, ExecError>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses
                .entry(command.to_string())
                .or_default()
                .push_back(result);
        }
        self
    }

    pub fn without_tool(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }

    pub fn with_interrupt(mut self, interrupt: &InterruptFlag) -> Self {
        self.interrupt = interrupt.clone();
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn ran(&self, command: &str) -> bool {
        self.commands().iter().any(|c| c == command)
    }

    pub fn ran_matching(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.contains(needle))
    }
}

impl ToolExecutor for FakeExecutor {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ExecError> {
        let line = invocation.command_line();
        if let Ok(mut guard) = self.commands.lock() {
            guard.push(line.clone());
        }
        let mut responses = self.responses.lock().expect("responses lock");
        match responses.get_mut(&line) {
            Some(queue) if queue.len() > 1 => queue.pop_front().expect("queued response"),
            Some(queue) => queue.front().cloned().expect("queued response"),
            None => ok(""),
        }
    }

    fn is_available(&self, program: &str) -> bool {
        !self.missing.contains(program)
    }

    fn interrupt_requested(&self) -> bool {
        self.interrupt.is_set()
    }
}

/// Replays prepared answers; runs out into refusals.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: RefCell<VecDeque<bool>>,
    typed: RefCell<VecDeque<String>>,
    pub prompts: RefCell<Vec<String>>,
    ctrl_c: Option<InterruptFlag>,
}

impl ScriptedConfirmer {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn typing(text: &str) -> Self {
        Self {
            typed: RefCell::new(VecDeque::from([text.to_string()])),
            ..Self::default()
        }
    }

    /// Operator presses Ctrl-C while the prompt is open.
    pub fn interrupted_by(mut self, interrupt: &InterruptFlag) -> Self {
        self.ctrl_c = Some(interrupt.clone());
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.borrow_mut().push(prompt.to_string());
        if let Some(interrupt) = &self.ctrl_c {
            interrupt.trigger();
        }
        self.answers.borrow_mut().pop_front().unwrap_or(false)
    }

    fn ask(&self, prompt: &str) -> Option<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        if let Some(interrupt) = &self.ctrl_c {
            interrupt.trigger();
        }
        self.typed.borrow_mut().pop_front()
    }
}

/// Config with every wait shortened for tests.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        components: vec!["api".to_string(), "worker".to_string()],
        health_attempts: 2,
        health_interval_secs: 0,
        rollout_timeout_secs: 0,
        rollout_poll_secs: 0,
        ..PipelineConfig::default()
    }
}

pub fn context<'a>(
    executor: &'a FakeExecutor,
    config: &'a PipelineConfig,
    confirmer: &'a ScriptedConfirmer,
    log: &'a RunLog,
    flags: &'a RunFlags,
    environment: Environment,
) -> StageContext<'a> {
    StageContext {
        executor,
        config,
        confirmer,
        log,
        flags,
        environment: Some(environment),
    }
}
