//! Blocking operator prompts on stdin/stderr.

use std::io::{self, BufRead, Write};

use servercon_core::ConfirmationToken;

/// `y`/`yes` (any case) approves; anything else, including EOF, declines.
pub fn ask_yes_no(question: &str, assume_yes: bool) -> bool {
    if assume_yes {
        tracing::debug!(question, "confirmation assumed by --yes");
        return true;
    }
    read_answer(&format!("{question} [y/N] "))
        .is_some_and(|answer| is_affirmative(&answer))
}

/// The token as typed, with only the line terminator removed. A blank line or
/// EOF means the operator gave up.
pub fn ask_token(token: ConfirmationToken) -> Option<String> {
    ask_line(&format!("Type \"{}\" to proceed (empty to cancel): ", token.literal()))
}

pub fn ask_line(prompt: &str) -> Option<String> {
    read_answer(prompt).filter(|line| !line.trim().is_empty())
}

fn read_answer(prompt: &str) -> Option<String> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{prompt}").ok()?;
    stderr.flush().ok()?;
    drop(stderr);

    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line).ok()?;
    if read == 0 {
        return None;
    }
    Some(strip_line_ending(&line).to_string())
}

fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line)
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
