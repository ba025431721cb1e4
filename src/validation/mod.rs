//! Schema validation of the payload before submission
//!
//! The official schema is checked by an external XSD 1.1 validator run as
//! `java -jar <validator> -sf <schema> -if <payload>`. This module builds that
//! argument list, keeps a local copy of the schema ([`SchemaStore`]) and
//! turns the validator's output into a [`ValidationReport`]. Running the
//! process is left to the caller.
//!
//! # Example
//!
//! ```
//! use saft_submit::validation::validate_output;
//!
//! let report = validate_output(
//!     "Error: cvc-pattern-valid: Value '12345' is not facet-valid with respect \
//!      to pattern for type 'SAFPTPortugueseVatNumber' of TaxRegistrationNumber. \
//!      [Line 14, Column 52]",
//!     "",
//!     Some(1),
//! );
//! assert!(!report.valid);
//! assert_eq!(report.issues[0].line, Some(14));
//! ```

mod rules;
mod schema;


pub use rules::suggestion_for;
pub use schema::SchemaStore;

use crate::types::{ValidationIssue, ValidationReport};
use rules::{is_issue_line, parse_issue_line};
use std::ffi::OsString;
use std::path::Path;
use tracing::debug;

const VALID_SUMMARY: &str = "The SAF-T file is compatible with the official schema.";
const VALID_SUGGESTION: &str = "No structural errors. The file can be submitted.";
const GENERIC_FIX: &str = "Review the field named in each error so it follows the official schema.";
const REVALIDATE: &str = "After fixing the file, run the validation again.";

/// Extract issues from the validator's output
///
/// A zero exit code means the file is valid and the output is not read.
/// Otherwise every stdout or stderr line starting with `Error:` or
/// `Exception in thread` becomes one issue, in output order.
pub fn parse_validator_output(
    stdout: &str,
    stderr: &str,
    exit_code: Option<i32>,
) -> Vec<ValidationIssue> {
    if exit_code == Some(0) {
        return Vec::new();
    }

    stdout
        .split(['\r', '\n'])
        .chain(stderr.split(['\r', '\n']))
        .filter(|line| !line.is_empty() && is_issue_line(line))
        .map(parse_issue_line)
        .collect()
}

/// Parse the validator's output and summarize it
pub fn validate_output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> ValidationReport {
    let issues = parse_validator_output(stdout, stderr, exit_code);
    debug!(?exit_code, issues = issues.len(), "parsed validator output");
    report(issues)
}

/// Summarize a list of issues
pub fn report(issues: Vec<ValidationIssue>) -> ValidationReport {
    if issues.is_empty() {
        return ValidationReport {
            valid: true,
            issues,
            summary: VALID_SUMMARY.to_string(),
            suggestions: vec![VALID_SUGGESTION.to_string()],
        };
    }

    let mut suggestions: Vec<String> = Vec::new();
    for suggestion in issues.iter().filter_map(|i| i.suggestion.as_deref()) {
        if !suggestion.trim().is_empty() && !suggestions.iter().any(|s| s == suggestion) {
            suggestions.push(suggestion.to_string());
        }
    }
    if suggestions.is_empty() {
        suggestions.push(GENERIC_FIX.to_string());
    }
    suggestions.push(REVALIDATE.to_string());

    ValidationReport {
        valid: false,
        summary: format!("{} error(s) detected in the SAF-T file.", issues.len()),
        issues,
        suggestions,
    }
}

/// Arguments for `java` that run the validator on one payload
pub fn validator_arguments(validator_jar: &Path, schema: &Path, payload: &Path) -> Vec<OsString> {
    vec![
        "-jar".into(),
        validator_jar.into(),
        "-sf".into(),
        schema.into(),
        "-if".into(),
        payload.into(),
    ]
}
