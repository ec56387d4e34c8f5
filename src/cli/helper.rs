// src/cli/helper.rs
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper, Result as RustylineResult};

// Slash-commands offered for completion
pub const APP_COMMANDS: [&str; 10] = [
    "/help", "/keys", "/key", "/clear", "/reset", "/hist", "/model", "/salir", "/exit", "/quit",
];

#[derive(Helper)]
pub struct ReplHelper {}

impl ReplHelper {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for ReplHelper {
    fn default() -> Self {
        Self::new()
    }
}

/// Commands starting with `prefix` (which includes the leading `/`).
pub fn matching_commands(prefix: &str) -> Vec<&'static str> {
    APP_COMMANDS
        .iter()
        .copied()
        .filter(|cmd| cmd.starts_with(prefix))
        .collect()
}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> RustylineResult<(usize, Vec<Self::Candidate>)> {
        if !line.starts_with('/') || pos == 0 {
            return Ok((pos, Vec::new()));
        }
        // Only the command word itself is completed, never its arguments.
        if line.find(' ').is_some_and(|space_idx| pos > space_idx) {
            return Ok((pos, Vec::new()));
        }
        let completions = matching_commands(&line[..pos])
            .into_iter()
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, completions))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;
    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Validator for ReplHelper {}

impl Highlighter for ReplHelper {}
