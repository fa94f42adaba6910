//! Non-fatal compilation diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why part of a query was degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticReason {
    /// The subtree exceeded a size, depth or hierarchy limit.
    Truncated,
    /// A concept referenced itself, directly or through other concepts.
    CycleDetected,
    /// The comparator cannot be applied to the datum's type.
    UnsupportedComparator,
}

impl fmt::Display for DiagnosticReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Truncated => "truncated",
            Self::CycleDetected => "cycle detected",
            Self::UnsupportedComparator => "unsupported comparator",
        };
        write!(f, "{name}")
    }
}

/// One degraded subtree: what it was, why, and how it was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Query string of the affected subtree.
    pub subtree: String,
    pub reason: DiagnosticReason,
    pub detail: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        subtree: impl Into<String>,
        reason: DiagnosticReason,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            subtree: subtree.into(),
            reason,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn truncated(subtree: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(subtree, DiagnosticReason::Truncated, detail)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.reason, self.subtree, self.detail)
    }
}

/// Ordered collection of diagnostics gathered during one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(
            reason = %diagnostic.reason,
            subtree = %diagnostic.subtree,
            "{}",
            diagnostic.detail
        );
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// Number of diagnostics with the given reason.
    #[must_use]
    pub fn count(&self, reason: DiagnosticReason) -> usize {
        self.0.iter().filter(|d| d.reason == reason).count()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_by_reason() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::truncated("[[Category:A]]", "too deep"));
        diagnostics.push(Diagnostic::new(
            "[[Concept:A]]",
            DiagnosticReason::CycleDetected,
            "Concept:A references itself",
        ));
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.count(DiagnosticReason::Truncated), 1);
        assert_eq!(diagnostics.count(DiagnosticReason::UnsupportedComparator), 0);
    }

    #[test]
    fn serializes_as_plain_list() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::truncated("+", "x"));
        let json = serde_json::to_value(&diagnostics).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["reason"], "truncated");
    }
}
