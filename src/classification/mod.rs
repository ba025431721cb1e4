//! Classification of the submission tool's output
//!
//! [`classify`] turns the captured standard output, standard error and exit
//! code of one invocation into a [`ResponseSummary`]. It performs no I/O and
//! never fails: output it cannot interpret becomes
//! [`ResponseState::Indeterminate`].
//!
//! # Example
//!
//! ```
//! use saft_submit::classification::classify;
//! use saft_submit::ResponseState;
//!
//! let summary = classify("Envio efetuado com sucesso.", "", Some(0));
//! assert_eq!(summary.state, ResponseState::Success);
//! assert!(summary.success);
//! ```

mod rules;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::types::{ResponseState, ResponseSummary};
use rules::{CODE_PATTERN, LineKind, classify_line, clean_line, is_statistics_marker, is_success_marker};
use tracing::debug;

const GENERIC_UPDATE_MESSAGE: &str =
    "The tax authority requires an updated command-line client. Try again after updating it.";
const GENERIC_SUCCESS_MESSAGE: &str = "Submission completed.";
const CLEAN_EXIT_MESSAGE: &str = "Process exited cleanly without reporting errors.";
const NO_OUTPUT_MESSAGE: &str = "The process produced no output.";

/// Classify one invocation's output
///
/// Lines are trimmed and scanned stdout first, then stderr. The final state is
/// chosen by priority: client update required, success, error, warning,
/// indeterminate. A client update demand overrides a success phrase on
/// another line.
pub fn classify(stdout: &str, stderr: &str, exit_code: Option<i32>) -> ResponseSummary {
    let out_lines = non_empty_lines(stdout);
    let err_lines = non_empty_lines(stderr);

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut codes: Vec<String> = Vec::new();
    let mut update_lines: Vec<String> = Vec::new();
    let mut update_required = false;

    for line in out_lines.iter().chain(err_lines.iter()) {
        for code in CODE_PATTERN.find_iter(line) {
            if !codes.iter().any(|c| c == code.as_str()) {
                codes.push(code.as_str().to_string());
            }
        }

        match classify_line(line) {
            LineKind::ClientUpdate => {
                update_required = true;
                let cleaned = clean_line(line);
                if !cleaned.is_empty() && !update_lines.contains(&cleaned) {
                    update_lines.push(cleaned);
                }
            }
            LineKind::Error => errors.push(clean_line(line)),
            LineKind::Warning => warnings.push(clean_line(line)),
            LineKind::Other => {}
        }
    }

    let success_line = out_lines.iter().find(|l| is_success_marker(l));
    let has_statistics = out_lines.iter().any(|l| is_statistics_marker(l));
    let clean_exit = exit_code == Some(0);
    // A demanded client update is a deferred failure whatever else was printed
    let mut success = errors.is_empty()
        && !update_required
        && (success_line.is_some() || has_statistics || clean_exit);

    let (state, headline_message) = if update_required {
        let message = if update_lines.is_empty() {
            GENERIC_UPDATE_MESSAGE.to_string()
        } else {
            update_lines.join(" ")
        };
        (ResponseState::ClientUpdateRequired, message)
    } else if success {
        let message = match success_line.map(|l| clean_line(l)).filter(|m| !m.is_empty()) {
            Some(line) => line,
            None if success_line.is_some() || has_statistics => GENERIC_SUCCESS_MESSAGE.to_string(),
            None => CLEAN_EXIT_MESSAGE.to_string(),
        };
        (ResponseState::Success, message)
    } else if !errors.is_empty() || !err_lines.is_empty() {
        let message = errors
            .iter()
            .find(|e| !e.is_empty())
            .cloned()
            .or_else(|| first_cleaned(&err_lines))
            .unwrap_or_else(|| generic_error_message(exit_code));
        (ResponseState::Error, message)
    } else if let Some(first) = warnings.iter().find(|w| !w.is_empty()) {
        (ResponseState::Warning, first.clone())
    } else {
        success = clean_exit;
        let message = first_cleaned(&out_lines)
            .or_else(|| first_cleaned(&err_lines))
            .unwrap_or_else(|| NO_OUTPUT_MESSAGE.to_string());
        (ResponseState::Indeterminate, message)
    };

    debug!(
        state = state.as_str(),
        success,
        errors = errors.len(),
        warnings = warnings.len(),
        codes = codes.len(),
        ?exit_code,
        "classified process response"
    );

    ResponseSummary {
        state,
        success,
        headline_message,
        errors,
        warnings,
        codes,
        raw_stdout: stdout.to_string(),
        raw_stderr: stderr.to_string(),
    }
}

fn non_empty_lines(text: &str) -> Vec<&str> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

fn first_cleaned(lines: &[&str]) -> Option<String> {
    lines.iter().map(|l| clean_line(l)).find(|l| !l.is_empty())
}

fn generic_error_message(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("An error occurred during submission (exit code {code})."),
        None => "An error occurred during submission.".to_string(),
    }
}
