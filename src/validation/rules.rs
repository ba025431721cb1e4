//! Validator line parsing and fix suggestions

use crate::types::ValidationIssue;
use regex::Regex;
use std::sync::LazyLock;

/// `cvc-<rule>: <message> [Line N, Column M]`
#[allow(clippy::expect_used)]
static LOCATED_CVC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"cvc-[^:]+:\s+(.*)\s+\[Line\s+(\d+),\s+Column\s+(\d+)\]").expect("valid regex")
});

/// Line prefixes the validator uses for reportable problems
const ISSUE_PREFIXES: &[&str] = &["Error:", "Exception in thread"];

/// First matching keyword group wins; matching ignores case
const SUGGESTIONS: &[(&[&str], &str)] = &[
    (
        &["TaxRegistrationNumber"],
        "Check the tax number in Header/TaxRegistrationNumber (9 digits).",
    ),
    (
        &["InvoiceNo", "DocumentNumber"],
        "Check the document number format, including the series and separators.",
    ),
    (
        &["DocumentStatus"],
        "Check that the document status is one of the values the schema allows.",
    ),
    (
        &["TaxType", "TaxCode"],
        "Check that the tax type and code match the SAF-T table (IVA, IS, NS, ...).",
    ),
    (
        &["Amount", "Total"],
        "Review totals and rounding so they agree with the declared values.",
    ),
    (
        &["Date"],
        "Check the date format (YYYY-MM-DD) and that dates fall inside the file's period.",
    ),
];

pub(crate) const FALLBACK_SUGGESTION: &str =
    "Adjust the element to match the official schema and validate again.";

const EMPTY_MESSAGE_SUGGESTION: &str = "Review the reported field against the SAF-T schema.";

pub(crate) fn is_issue_line(line: &str) -> bool {
    ISSUE_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

/// Turn one reportable line into an issue
///
/// Lines without a `[Line N, Column M]` location keep their full text and get
/// no location or suggestion.
pub(crate) fn parse_issue_line(line: &str) -> ValidationIssue {
    let located = LOCATED_CVC.captures(line).and_then(|caps| {
        let line_no: u32 = caps[2].parse().ok()?;
        let column: u32 = caps[3].parse().ok()?;
        Some((single_line(&caps[1]), line_no, column))
    });

    match located {
        Some((message, line_no, column)) => ValidationIssue {
            suggestion: Some(suggestion_for(&message).to_string()),
            message,
            line: Some(line_no),
            column: Some(column),
        },
        None => ValidationIssue {
            message: line.to_string(),
            line: None,
            column: None,
            suggestion: None,
        },
    }
}

/// Fix hint for the field a validator message names
pub fn suggestion_for(message: &str) -> &'static str {
    if message.trim().is_empty() {
        return EMPTY_MESSAGE_SUGGESTION;
    }

    let lower = message.to_lowercase();
    SUGGESTIONS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(&k.to_lowercase())))
        .map(|(_, suggestion)| *suggestion)
        .unwrap_or(FALLBACK_SUGGESTION)
}

fn single_line(message: &str) -> String {
    message.replace(['\r', '\n'], " ").trim().to_string()
}
