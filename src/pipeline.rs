//! Multi-pass bottom-up orchestration.
//!
//! A pass is one full post-order traversal of the unit. Each visited node is
//! tested against the node-kind-indexed rule tables in registration order;
//! the first rule producing an outcome fires, and at most one rule fires per
//! node per pass. A pass returns an explicit change count, with no hidden "did
//! anything change" flags, and the pipeline loops until a pass produces
//! zero changes (fixpoint) or the pass budget runs out. Budget exhaustion is
//! an incompleteness signal, not a failure: the tree is returned as-is with
//! a diagnostic.
//!
//! Execution is single-threaded and synchronous. Passes are strictly
//! sequential, the marker store belongs to the one in-flight run, and only
//! the firing rule replaces the node it matched.
//!
//! # Citations
//! - Fixpoint rule application: Baader & Nipkow, "Term Rewriting and All That" (1998)
//! - Traversal strategies: Visser, "A survey of strategies in rule-based program transformation systems" (2005)

use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::marker::{Marker, MarkerKind, MarkerStore};
use crate::rule::{RewriteCx, RuleSet};
use crate::tree::{ExprData, NodeId, QualifiedName, SourceTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, trace, warn};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Convergence {
    /// A pass produced zero changes.
    Converged,
    /// Every budgeted pass produced changes; the rewrite may be incomplete.
    BudgetExhausted,
}

/// The result of one `apply_rules` run.
#[derive(Debug)]
pub struct RewriteReport {
    /// Whether any pass changed the tree.
    pub changed: bool,
    pub convergence: Convergence,
    /// Change count per pass, in pass order.
    pub pass_changes: Vec<usize>,
    pub diagnostics: Vec<Diagnostic>,
    /// External symbols the rewrites newly require, deduplicated.
    pub required_symbols: BTreeSet<QualifiedName>,
}

/// Applies `rules` to the unit held by `tree`, running bottom-up passes
/// until fixpoint or until `pass_budget` passes have been consumed.
///
/// No failure aborts the run; every degraded case leaves its node unchanged
/// and reports a diagnostic. After the terminal state the marker store is
/// drained (orphans are reported) and the arena is compacted.
pub fn apply_rules(tree: &mut SourceTree, rules: &RuleSet, pass_budget: usize) -> RewriteReport {
    let budget = pass_budget.max(1);
    let mut markers = MarkerStore::new();
    let mut diagnosed: HashSet<NodeId> = HashSet::new();
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut required: BTreeSet<QualifiedName> = BTreeSet::new();
    let mut pass_changes: Vec<usize> = Vec::new();
    let mut convergence = Convergence::BudgetExhausted;

    for pass in 1..=budget {
        let changes = run_pass(
            tree,
            rules,
            &mut markers,
            &mut diagnosed,
            &mut diagnostics,
            &mut required,
        );
        debug!(pass, changes, "rewrite pass complete");
        pass_changes.push(changes);
        if changes == 0 {
            convergence = Convergence::Converged;
            break;
        }
    }

    if convergence == Convergence::BudgetExhausted {
        diagnostics.push(Diagnostic::unit_wide(
            DiagnosticKind::BudgetExhausted,
            format!(
                "still changing after {} pass(es); tree returned as-is",
                budget
            ),
        ));
    }

    for (node, marker) in markers.drain() {
        diagnostics.push(orphan(node, &marker, "unconsumed at end of run"));
    }

    let reclaimed = tree.compact();
    trace!(reclaimed, "arena compacted");

    RewriteReport {
        changed: pass_changes.iter().sum::<usize>() > 0,
        convergence,
        pass_changes,
        diagnostics,
        required_symbols: required,
    }
}

fn orphan(node: NodeId, marker: &Marker, reason: &str) -> Diagnostic {
    Diagnostic::unmatched(
        node,
        DiagnosticKind::OrphanMarker,
        format!("{} marker {}", marker.kind(), reason),
    )
}

/// Runs one pass. Returns the pass's change count, including the
/// declarations retyped by the end-of-pass type-correction sweep.
fn run_pass(
    tree: &mut SourceTree,
    rules: &RuleSet,
    markers: &mut MarkerStore,
    diagnosed: &mut HashSet<NodeId>,
    diagnostics: &mut Vec<Diagnostic>,
    required: &mut BTreeSet<QualifiedName>,
) -> usize {
    // Snapshot the traversal order; nodes replaced mid-pass are skipped when
    // their turn comes.
    let order = tree.post_order();
    let mut changes = 0usize;
    let mut detached: HashSet<NodeId> = HashSet::new();

    for node in order {
        if detached.contains(&node) || !tree.contains(node) {
            continue;
        }
        let table = rules.rules_for(tree, node);
        if table.is_empty() {
            continue;
        }

        let mut any_trigger_matched = false;
        let mut fired = false;
        for rule in table {
            if !rule.matches(tree, markers, node) {
                continue;
            }
            any_trigger_matched = true;
            let outcome = {
                let mut cx = RewriteCx {
                    tree: &mut *tree,
                    markers: &mut *markers,
                };
                rule.apply(&mut cx, node)
            };
            // Declining is NoMatch: the expected majority case.
            let Some(outcome) = outcome else { continue };
            trace!(rule = %rule.id(), %node, "rule fired");

            if let Some(replacement) = outcome.replacement {
                if replacement != node {
                    if let Err(err) = tree.replace_expr(node, replacement) {
                        // Degrade: leave the node unchanged.
                        warn!(%err, rule = %rule.id(), "replacement not attached");
                        break;
                    }
                    for displaced in markers.transfer(node, replacement) {
                        diagnostics.push(orphan(
                            replacement,
                            &displaced,
                            "displaced while transferring to a replacement",
                        ));
                    }
                    detached.insert(node);
                }
            }
            for (target, marker) in outcome.markers {
                if let Some(displaced) = markers.attach(target, marker) {
                    diagnostics.push(orphan(target, &displaced, "displaced by a later writer"));
                }
            }
            required.extend(outcome.required_symbols);
            diagnostics.extend(outcome.diagnostics);
            if outcome.changed {
                changes += 1;
            }
            fired = true;
            break;
        }

        if !fired && !any_trigger_matched {
            diagnose_unmatched(tree, rules, node, diagnosed, diagnostics);
        }
    }

    // Unit-wide sweep: consume the type corrections recorded this pass and
    // retype declarations accordingly.
    for (_, marker) in markers.take_all_of_kind(MarkerKind::TypeCorrection) {
        if let Marker::TypeCorrection { from, to } = marker {
            let retyped = tree.retype_declarations(&from, &to);
            debug!(%from, %to, retyped, "type correction sweep");
            changes += retyped;
        }
    }

    changes
}

/// Emits the unmatched-call diagnostics: a call still producing (or made on)
/// a known source receiver type that no trigger covered. Each site is
/// reported at most once per run.
fn diagnose_unmatched(
    tree: &SourceTree,
    rules: &RuleSet,
    node: NodeId,
    diagnosed: &mut HashSet<NodeId>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(ExprData::Call {
        receiver,
        selector,
        ty,
        ..
    }) = tree.expr(node)
    else {
        return;
    };
    // Calls already carrying a settled target type are finished rewrites.
    if ty.as_deref().is_some_and(|t| rules.is_settled(t)) {
        return;
    }
    let receiver_ty = receiver.and_then(|r| tree.static_type(r));
    let own_ty = ty.as_deref();
    let Some(site_ty) = [receiver_ty, own_ty]
        .into_iter()
        .flatten()
        .find(|t| rules.is_known_receiver(t))
    else {
        return;
    };
    if !diagnosed.insert(node) {
        return;
    }
    let diagnostic = if rules.is_registered_selector(site_ty, selector) {
        Diagnostic::unmatched(
            node,
            DiagnosticKind::UnsupportedShape,
            format!(
                "no template fits the argument shape of `{}` on {}; call left unchanged: {}",
                selector,
                site_ty,
                tree.render_expr(node)
            ),
        )
    } else {
        Diagnostic::unmatched(
            node,
            DiagnosticKind::UnknownSelector,
            format!(
                "no registered rewrite for selector `{}` on {}; call left verbatim: {}",
                selector,
                site_ty,
                tree.render_expr(node)
            ),
        )
    };
    diagnostics.push(diagnostic);
}
