/// Interactive operator gate consulted by confirmation-gated stages.
pub trait Confirmer {
    /// Yes/no question; anything but an explicit yes is a refusal.
    fn confirm(&self, prompt: &str) -> bool;

    /// Free-form answer, used when the operator must type a value back.
    fn ask(&self, prompt: &str) -> Option<String>;
}

/// Refuses everything. Used where no terminal is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl Confirmer for DenyAll {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }

    fn ask(&self, _prompt: &str) -> Option<String> {
        None
    }
}
