//! Context Store for the episode loop
//!
//! Journals what happened during the current episode: one operation record
//! per attempted action, free-form notes, and the last action result. Each
//! entry carries a token cost so the remembered history can be held under a
//! budget.
//!
//! Two bounds coexist. [`ContextStore::windowed_summary`] bounds how much
//! history goes into a single planner request, while
//! [`ContextStore::bounded_summary`] bounds how much history is kept at all,
//! evicting from the front: every operation goes before the first note does.

use sdk::types::{
    estimate_tokens, last_result_note, EpisodeContext, LastResult, Note, OperationRecord,
    OperationType,
};
use std::fmt;

/// Default token budget for the remembered episode history
pub const DEFAULT_TOKEN_BUDGET: usize = 50_000;

/// Operations shown by [`ContextStore::human_summary`]
const HUMAN_SUMMARY_OPERATIONS: usize = 5;

/// What a call to [`ContextStore::bounded_summary`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimReport {
    pub budget: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub operations_evicted: usize,
    pub notes_evicted: usize,
}

impl TrimReport {
    /// Whether anything was evicted.
    pub fn trimmed(&self) -> bool {
        self.operations_evicted > 0 || self.notes_evicted > 0
    }
}

impl fmt::Display for TrimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.trimmed() {
            write!(
                f,
                "trimmed {} operations and {} notes ({} -> {} tokens, budget {})",
                self.operations_evicted,
                self.notes_evicted,
                self.tokens_before,
                self.tokens_after,
                self.budget
            )
        } else {
            write!(f, "within budget ({} of {} tokens)", self.tokens_after, self.budget)
        }
    }
}

/// Rendered history plus the eviction report that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedSummary {
    pub text: String,
    pub report: TrimReport,
}

/// The episode journal.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    context: EpisodeContext,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the episode context with an empty one.
    pub fn reset(&mut self) {
        self.context = EpisodeContext::default();
    }

    /// Append an operation record and its derived note.
    pub fn add_operation(&mut self, kind: OperationType, path: &str, description: &str) {
        self.context.operations.push(OperationRecord {
            kind,
            target_path: path.to_string(),
            description: description.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            token_cost: estimate_tokens(description),
        });
        self.add_note(format!(
            "{} on {}: {}",
            kind.as_str().to_uppercase(),
            path,
            description
        ));
    }

    pub fn add_note(&mut self, text: impl Into<String>) {
        self.context.notes.push(Note::new(text));
    }

    /// Overwrite the last result and append the matching note.
    pub fn set_last_result(&mut self, success: bool, message: &str) {
        self.add_note(last_result_note(success, message));
        self.context.last_result = Some(LastResult {
            success,
            message: message.to_string(),
        });
    }

    /// An independent copy of the current episode context.
    pub fn snapshot(&self) -> EpisodeContext {
        self.context.clone()
    }

    /// Fold a handler's returned context into the journal.
    ///
    /// Operations and notes are appended, never replaced. Token costs are
    /// recomputed since the incoming context may come from the model.
    pub fn merge_from(&mut self, partial: EpisodeContext) {
        let now = chrono::Utc::now().timestamp_millis();
        for mut op in partial.operations {
            op.token_cost = estimate_tokens(&op.description);
            if op.timestamp == 0 {
                op.timestamp = now;
            }
            self.context.operations.push(op);
        }
        for note in partial.notes {
            self.context.notes.push(Note::new(note.content));
        }
        if let Some(last) = partial.last_result {
            self.context.last_result = Some(last);
        }
    }

    /// Total token cost of all operations and notes.
    pub fn total_tokens(&self) -> usize {
        self.context.operations.iter().map(|op| op.token_cost).sum::<usize>()
            + self.context.notes.iter().map(|n| n.token_cost).sum::<usize>()
    }

    pub fn operations(&self) -> &[OperationRecord] {
        &self.context.operations
    }

    pub fn notes(&self) -> &[Note] {
        &self.context.notes
    }

    pub fn last_result(&self) -> Option<&LastResult> {
        self.context.last_result.as_ref()
    }

    /// Render the most recent `n` operations and notes for the planner.
    pub fn windowed_summary(&self, n: usize) -> String {
        if self.context.operations.is_empty() && self.context.notes.is_empty() {
            return "No previous operations in this episode.".to_string();
        }

        let mut out = String::new();

        let ops = tail(&self.context.operations, n);
        if !ops.is_empty() {
            out.push_str("Recent operations:\n");
            for op in ops {
                out.push_str(&format!(
                    "- {} {}: {}\n",
                    op.kind.as_str().to_uppercase(),
                    op.target_path,
                    op.description
                ));
            }
        }

        if let Some(last) = &self.context.last_result {
            out.push_str(&format!(
                "\nLast action result: {} - {}\n",
                if last.success { "SUCCESS" } else { "FAILURE" },
                last.message
            ));
        }

        let notes = tail(&self.context.notes, n);
        if !notes.is_empty() {
            out.push_str("\nRecent notes:\n");
            for note in notes {
                out.push_str(&format!("- {}\n", note.content));
            }
        }

        out.push_str(&format!(
            "\nTotals: {} operations, {} notes\n",
            self.context.operations.len(),
            self.context.notes.len()
        ));
        out
    }

    /// Evict oldest entries until the journal fits `max_tokens`, then render
    /// what is left.
    ///
    /// Operations are evicted to exhaustion before the first note goes.
    pub fn bounded_summary(&mut self, max_tokens: usize) -> BoundedSummary {
        let tokens_before = self.total_tokens();
        let mut total = tokens_before;

        let mut operations_evicted = 0;
        for op in &self.context.operations {
            if total <= max_tokens {
                break;
            }
            total -= op.token_cost;
            operations_evicted += 1;
        }
        self.context.operations.drain(..operations_evicted);

        let mut notes_evicted = 0;
        for note in &self.context.notes {
            if total <= max_tokens {
                break;
            }
            total -= note.token_cost;
            notes_evicted += 1;
        }
        self.context.notes.drain(..notes_evicted);

        let report = TrimReport {
            budget: max_tokens,
            tokens_before,
            tokens_after: total,
            operations_evicted,
            notes_evicted,
        };
        if report.trimmed() {
            tracing::warn!("Context store {}", report);
        }

        BoundedSummary {
            text: self.render(),
            report,
        }
    }

    /// Short summary for the end user: recent operations and the last result.
    pub fn human_summary(&self) -> String {
        let mut summary = String::from("Context Summary:\n");

        let recent = tail(&self.context.operations, HUMAN_SUMMARY_OPERATIONS);
        if !recent.is_empty() {
            summary.push_str("\nRecent operations:\n");
            for op in recent {
                summary.push_str(&format!(
                    "- {} {}\n",
                    op.kind.as_str().to_uppercase(),
                    op.target_path
                ));
            }
        }

        if let Some(last) = &self.context.last_result {
            summary.push_str(&format!(
                "\nLast action: {} {}\n",
                if last.success { "✅" } else { "❌" },
                last.message
            ));
        }

        summary
    }

    /// Render everything older than the last `n` operations and notes.
    ///
    /// Complements [`ContextStore::windowed_summary`] so the planner request
    /// never carries an entry twice.
    pub fn history_before_window(&self, n: usize) -> String {
        let ops = &self.context.operations;
        let notes = &self.context.notes;
        render_entries(
            &ops[..ops.len().saturating_sub(n)],
            &notes[..notes.len().saturating_sub(n)],
        )
    }

    fn render(&self) -> String {
        render_entries(&self.context.operations, &self.context.notes)
    }
}

fn render_entries(operations: &[OperationRecord], notes: &[Note]) -> String {
    let mut out = String::new();
    if !operations.is_empty() {
        out.push_str("Operations:\n");
        for op in operations {
            out.push_str(&format!(
                "- [{}] {}: {}\n",
                op.kind, op.target_path, op.description
            ));
        }
    }
    if !notes.is_empty() {
        out.push_str("Notes:\n");
        for note in notes {
            out.push_str(&format!("- {}\n", note.content));
        }
    }
    out
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}
