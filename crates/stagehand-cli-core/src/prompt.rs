use std::io::{self, BufRead, Write};

use stagehand_pipeline::Confirmer;

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub fn prompt_line(label: &str) -> io::Result<String> {
    let mut input = String::new();
    print!("{label}");
    io::stdout().flush()?;
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Asks the operator on the controlling terminal. A read failure counts as
/// a refusal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        prompt_line(prompt)
            .map(|answer| is_affirmative(&answer))
            .unwrap_or(false)
    }

    fn ask(&self, prompt: &str) -> Option<String> {
        prompt_line(prompt).ok()
    }
}
