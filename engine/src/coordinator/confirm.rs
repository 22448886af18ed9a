//! Confirmation gate
//!
//! Mutating and external actions are presented to a [`Confirmer`] and block
//! until it answers. [`TerminalConfirmer`] asks a human on the terminal;
//! [`AutoConfirmer`] approves everything and is used for `--yes` runs.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::ActionKind;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::actions::Classification;

/// What the coordinator shows before running a gated action.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub kind: ActionKind,
    pub classification: Classification,
    pub target_path: String,
    pub instruction: String,
    /// Unified diff (or a warning) for create/edit with content
    pub diff: Option<String>,
    /// `clientName`/operation summary for external calls
    pub external: Option<String>,
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Proposed action: {} ({})", self.kind, self.classification)?;
        if !self.target_path.is_empty() {
            writeln!(f, "Target: {}", self.target_path)?;
        }
        writeln!(f, "Instruction: {}", self.instruction)?;
        if let Some(external) = &self.external {
            writeln!(f, "External call: {}", external)?;
        }
        if let Some(diff) = &self.diff {
            writeln!(f, "\n{}", diff.trim_end())?;
        }
        Ok(())
    }
}

/// A human's answer to a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Execute as proposed
    Proceed,
    /// Do not execute
    Decline,
    /// Replace the instruction and present again
    Modify(String),
}

#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, proposal: &Proposal) -> Result<Decision, EngineError>;

    /// Asked after a failed action: keep going with the episode?
    async fn continue_after_failure(&self, message: &str) -> Result<bool, EngineError>;
}

/// Line-oriented access to the process's stdin.
///
/// Shared between the confirmer and the REPL so buffered input is never lost.
pub struct Terminal {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Terminal {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// Print `prompt` and read one line. `None` at end of input.
    pub async fn read_line(&self, prompt: &str) -> Result<Option<String>, EngineError> {
        print!("{}", prompt);
        std::io::stdout()
            .flush()
            .map_err(|e| EngineError::Prompt(format!("Failed to flush stdout: {}", e)))?;

        let mut lines = self.lines.lock().await;
        lines
            .next_line()
            .await
            .map_err(|e| EngineError::Prompt(format!("Failed to read input: {}", e)))
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

/// Asks on the terminal: yes / no / modify.
pub struct TerminalConfirmer {
    terminal: Arc<Terminal>,
}

impl TerminalConfirmer {
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self { terminal }
    }
}

/// Interpret a typed answer. Unrecognized input yields `None`.
pub fn parse_choice(input: &str) -> Option<Choice> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(Choice::Yes),
        "n" | "no" => Some(Choice::No),
        "m" | "modify" => Some(Choice::Modify),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Yes,
    No,
    Modify,
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, proposal: &Proposal) -> Result<Decision, EngineError> {
        println!("\n{}", proposal);
        loop {
            let Some(answer) = self
                .terminal
                .read_line("Do you want to proceed with this action? [y]es / [n]o / [m]odify: ")
                .await?
            else {
                // End of input counts as a refusal.
                return Ok(Decision::Decline);
            };

            match parse_choice(&answer) {
                Some(Choice::Yes) => return Ok(Decision::Proceed),
                Some(Choice::No) => {
                    println!("Action cancelled by user.");
                    return Ok(Decision::Decline);
                }
                Some(Choice::Modify) => {
                    let prompt = format!("Enter modified prompt [{}]: ", proposal.instruction);
                    let modified = self
                        .terminal
                        .read_line(&prompt)
                        .await?
                        .map(|line| line.trim().to_string())
                        .filter(|line| !line.is_empty())
                        .unwrap_or_else(|| proposal.instruction.clone());
                    println!("Prompt modified. Continuing with updated prompt.");
                    return Ok(Decision::Modify(modified));
                }
                None => println!("Please answer y, n or m."),
            }
        }
    }

    async fn continue_after_failure(&self, message: &str) -> Result<bool, EngineError> {
        println!("\nAction failed: {}", message);
        let answer = self
            .terminal
            .read_line("Do you want to continue with the remaining tasks? [y/N]: ")
            .await?;
        Ok(answer
            .as_deref()
            .and_then(parse_choice)
            .is_some_and(|choice| choice == Choice::Yes))
    }
}

/// Approves every proposal and stops the episode on the first failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirmer;

#[async_trait]
impl Confirmer for AutoConfirmer {
    async fn confirm(&self, proposal: &Proposal) -> Result<Decision, EngineError> {
        tracing::info!("Auto-approving {} on {}", proposal.kind, proposal.target_path);
        Ok(Decision::Proceed)
    }

    async fn continue_after_failure(&self, message: &str) -> Result<bool, EngineError> {
        tracing::warn!("Stopping after failure: {}", message);
        Ok(false)
    }
}
