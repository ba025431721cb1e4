//! Line rules for response classification
//!
//! Every output line is tested against [`LINE_RULES`] in order; the first rule
//! that matches decides the line's kind. Success and statistics markers are
//! looked up separately because they do not classify individual lines.

use regex::Regex;
use std::sync::LazyLock;

/// Diagnostic codes issued by the tax authority (`AT12345`) and two-letter
/// prefixed codes such as `PT50001`
#[allow(clippy::expect_used)]
pub(crate) static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)AT[0-9]{4,6}|\b[A-Z]{2}\d{3,}\b").expect("valid regex")
});

#[allow(clippy::expect_used)]
static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Status attribute the remote side uses to demand a newer client
#[allow(clippy::expect_used)]
static CLIENT_UPDATE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)code\s*=\s*"-9""#).expect("valid regex"));

/// `erros: 0`, `erro = 0`, `0 erros`
#[allow(clippy::expect_used)]
static ZERO_ERROR_COUNTS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"erros?\s*[:=\-]\s*0\b").expect("valid regex"),
        Regex::new(r"\b0\s+erros?").expect("valid regex"),
    ]
});

const CLIENT_UPDATE_PHRASES: &[&str] = &[
    "necessita de atualizar o cliente de comando",
    "obtenção do jar",
    "ser iniciada a obtenção do jar",
    "nova versão",
    "obter o jar",
];

const NO_ERROR_PHRASES: &[&str] = &[
    "sem erro",
    "sem erros",
    "sem qualquer erro",
    "sem nenhum erro",
    "nenhum erro",
    "zero erros",
];

const WARNING_KEYWORDS: &[&str] = &["aviso", "warning"];

const SUCCESS_KEYWORDS: &[&str] = &["sucesso", "enviado", "enviada", "concluído"];

const SUCCESS_NEGATIONS: &[&str] = &["sem sucesso", "não enviado", "não foi enviado"];

const STATISTICS_KEYWORDS: &[&str] = &[
    "total de faturas",
    "total de documentos",
    "faturas processadas",
    "documentos processados",
    "número de faturas",
];

/// Classification of a single output line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LineKind {
    /// Demands a newer client before resubmission
    ClientUpdate,
    /// Reports a failure
    Error,
    /// Reports a warning
    Warning,
    /// None of the above
    Other,
}

/// A line rule: the kind it assigns and the test over the lowercased line
pub(crate) struct LineRule {
    pub(crate) kind: LineKind,
    pub(crate) matches: fn(&str) -> bool,
}

/// Rules in priority order
pub(crate) const LINE_RULES: &[LineRule] = &[
    LineRule {
        kind: LineKind::ClientUpdate,
        matches: is_client_update,
    },
    LineRule {
        kind: LineKind::Error,
        matches: is_error,
    },
    LineRule {
        kind: LineKind::Warning,
        matches: is_warning,
    },
];

/// Kind of `line` according to the first matching rule
pub(crate) fn classify_line(line: &str) -> LineKind {
    let lower = line.to_lowercase();
    LINE_RULES
        .iter()
        .find(|rule| (rule.matches)(&lower))
        .map_or(LineKind::Other, |rule| rule.kind)
}

fn is_client_update(lower: &str) -> bool {
    CLIENT_UPDATE_CODE.is_match(lower) || contains_any(lower, CLIENT_UPDATE_PHRASES)
}

fn is_error(lower: &str) -> bool {
    lower.contains("erro")
        && !contains_any(lower, NO_ERROR_PHRASES)
        && !ZERO_ERROR_COUNTS.iter().any(|re| re.is_match(lower))
}

fn is_warning(lower: &str) -> bool {
    contains_any(lower, WARNING_KEYWORDS)
}

/// Explicit success phrase that is not negated
pub(crate) fn is_success_marker(line: &str) -> bool {
    let lower = line.to_lowercase();
    contains_any(&lower, SUCCESS_KEYWORDS) && !contains_any(&lower, SUCCESS_NEGATIONS)
}

/// Processing statistics printed only after a completed submission
pub(crate) fn is_statistics_marker(line: &str) -> bool {
    contains_any(&line.to_lowercase(), STATISTICS_KEYWORDS)
}

/// Remove markup tags and surrounding whitespace
pub(crate) fn clean_line(line: &str) -> String {
    MARKUP.replace_all(line, "").trim().to_string()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
