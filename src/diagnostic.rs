//! Diagnostics emitted during a rewrite run.
//!
//! No diagnostic aborts a run. The engine's failure policy is uniform: leave
//! the node unchanged, report, and keep going. Matching nothing at all is the
//! expected majority case and produces no diagnostic.

use crate::arena::NodeId;
use crate::rule::RuleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A call matched a registered trigger selector but no template fits its
    /// argument shape; the original call was preserved.
    UnsupportedShape,
    /// A call on a known receiver type used a selector no rule registers;
    /// the call was left verbatim.
    UnknownSelector,
    /// A marker was never consumed (or was displaced by a later writer) and
    /// was discarded without structural effect.
    OrphanMarker,
    /// The pipeline consumed its whole pass budget while still producing
    /// changes. The tree is returned as-is; this signals incompleteness,
    /// not failure.
    BudgetExhausted,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::UnsupportedShape => write!(f, "unsupported shape"),
            DiagnosticKind::UnknownSelector => write!(f, "unknown selector"),
            DiagnosticKind::OrphanMarker => write!(f, "orphan marker"),
            DiagnosticKind::BudgetExhausted => write!(f, "pass budget exhausted"),
        }
    }
}

/// A single diagnostic: where, which rule (if any matched), and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The call site or declaration the diagnostic refers to, when it refers
    /// to one (`BudgetExhausted` is unit-wide).
    pub site: Option<NodeId>,
    /// The rule that matched, or `None` for unmatched nodes and unit-wide
    /// diagnostics.
    pub rule: Option<RuleId>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic anchored at a node, with no matched rule.
    pub fn unmatched(site: NodeId, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            site: Some(site),
            rule: None,
            kind,
            message: message.into(),
        }
    }

    /// Creates a unit-wide diagnostic.
    pub fn unit_wide(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            site: None,
            rule: None,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.site, &self.rule) {
            (Some(site), Some(rule)) => {
                write!(f, "[{}] {} at {}: {}", self.kind, rule, site, self.message)
            }
            (Some(site), None) => write!(f, "[{}] unmatched at {}: {}", self.kind, site, self.message),
            _ => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_site() {
        let d = Diagnostic::unmatched(NodeId::new(7), DiagnosticKind::UnknownSelector, "cookie");
        let text = d.to_string();
        assert!(text.contains("unknown selector"));
        assert!(text.contains("NodeId(7)"));
        assert!(text.contains("unmatched"));
    }
}
