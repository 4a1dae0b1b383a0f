use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::input::InputLines;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    Overwrite,
    Merge,
    Skip,
}

/// Asks what to do with an output directory that already exists.
pub trait ConflictPrompt: Send + Sync {
    /// `allow_merge` is only set for flattened output.
    fn prompt_overwrite_merge_skip(&self, dir: &Path, allow_merge: bool) -> ConflictChoice;
}

/// Reads the answer from the shared input: `y` overwrites, `m` merges (when
/// allowed), anything else skips. Closed input skips.
pub struct ConsolePrompt {
    input: Arc<InputLines>,
}

impl ConsolePrompt {
    pub fn new(input: Arc<InputLines>) -> Self {
        Self { input }
    }
}

impl ConflictPrompt for ConsolePrompt {
    fn prompt_overwrite_merge_skip(&self, dir: &Path, allow_merge: bool) -> ConflictChoice {
        eprintln!("!! Output directory exists: {}", dir.display());
        let merge_hint = if allow_merge { " or Merge? [m]" } else { "" };
        eprint!(">> Overwrite? [y/n]{merge_hint}: ");
        let _ = std::io::stderr().flush();

        match self.input.next_line() {
            Some(line) => parse_answer(&line, allow_merge),
            None => ConflictChoice::Skip,
        }
    }
}

pub fn parse_answer(line: &str, allow_merge: bool) -> ConflictChoice {
    let answer = line.trim();
    if answer.eq_ignore_ascii_case("y") {
        ConflictChoice::Overwrite
    } else if allow_merge && answer.eq_ignore_ascii_case("m") {
        ConflictChoice::Merge
    } else {
        ConflictChoice::Skip
    }
}

/// Always gives the same answer. Used for non-interactive runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub ConflictChoice);

impl ConflictPrompt for FixedPrompt {
    fn prompt_overwrite_merge_skip(&self, _dir: &Path, allow_merge: bool) -> ConflictChoice {
        match self.0 {
            ConflictChoice::Merge if !allow_merge => ConflictChoice::Skip,
            choice => choice,
        }
    }
}
