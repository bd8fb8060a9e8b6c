//! Interactive confirmation for the watch-root sweep.

use std::io::{self, BufRead, IsTerminal, Write};

use harvest_core::SweepPrompt;
use tracing::debug;

/// Asks the operator on stdin whether the watch root may be cleared.
///
/// When stdin is not a terminal (a service unit, a pipe) the sweep is
/// declined without blocking; the prompt must never stall the loop waiting
/// for input that will not arrive.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinSweepPrompt;

impl StdinSweepPrompt {
    /// Construct a prompt.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SweepPrompt for StdinSweepPrompt {
    fn confirm(&self) -> bool {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            debug!("stdin is not a terminal, declining sweep");
            return false;
        }
        print!("Clear the watch root of all remaining entries? [y/N] ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() {
            return false;
        }
        approves(&line)
    }
}

/// Only an explicit yes clears the watch root.
fn approves(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
