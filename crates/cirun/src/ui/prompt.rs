//! Confirmation prompt on the controlling terminal

use cirun_core::gate::Confirm;
use console::{style, Term};

/// Asks yes/no questions on stderr and reads the answer from the terminal
#[derive(Debug, Clone)]
pub struct TerminalConfirm {
    term: Term,
}

impl TerminalConfirm {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for TerminalConfirm {
    fn default() -> Self {
        Self::new()
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, question: &str) -> std::io::Result<bool> {
        self.term.write_str(&format!(
            "{} {} {} ",
            style("?").yellow().bold(),
            question,
            style("[y/N]").dim()
        ))?;
        let answer = self.term.read_line()?;
        Ok(is_yes(&answer))
    }
}

/// Anything but an explicit yes declines
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
