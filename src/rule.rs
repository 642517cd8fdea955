//! Rules and rule sets.
//!
//! A `Rule` is one self-contained (match, rewrite) pair: a trigger decided
//! by the matcher and a rewrite function producing a `RewriteOutcome`. A
//! `RuleSet` is the closed, ordered collection the pipeline dispatches from;
//! rules are registered before a run, never during traversal. The set also
//! indexes the receiver types and selectors its call signatures cover, which
//! is what lets the pipeline tell "unknown selector on a known receiver"
//! apart from calls that are simply none of our business.

use crate::arena::NodeId;
use crate::diagnostic::Diagnostic;
use crate::marker::{Marker, MarkerKind, MarkerStore};
use crate::matcher::CallSignature;
use crate::tree::{DeclKind, ExprData, NodeKind, QualifiedName, SourceTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier for a rewrite rule.
///
/// Used in diagnostics to report which rule matched at a site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a rule triggers on.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// A call expression matching a signature.
    Call(CallSignature),
    /// A declaration of the given kind. The rewrite function inspects
    /// annotations itself and declines when nothing applies.
    Declaration(DeclKind),
    /// A call with the given selector whose receiver carries a marker of
    /// the given kind: the terminal call of a chain mid-deferral.
    Marked { marker: MarkerKind, selector: String },
}

/// Mutable context handed to a rewrite function.
pub struct RewriteCx<'a> {
    pub tree: &'a mut SourceTree,
    pub markers: &'a mut MarkerStore,
}

/// The product of one rule firing.
#[derive(Debug, Default)]
pub struct RewriteOutcome {
    /// Replacement node for the matched node, if the rewrite replaces it.
    /// In-place rewrites (annotation consolidation) leave this `None`.
    pub replacement: Option<NodeId>,
    /// Markers to attach after the replacement is wired in.
    pub markers: Vec<(NodeId, Marker)>,
    /// External symbols the rewrite newly requires.
    pub required_symbols: Vec<QualifiedName>,
    /// Diagnostics raised by the rule itself.
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the tree changed. Diagnostic-only outcomes leave this false
    /// so the pipeline can still converge.
    pub changed: bool,
}

impl RewriteOutcome {
    /// An outcome replacing the matched node.
    pub fn replaced(replacement: NodeId) -> Self {
        Self {
            replacement: Some(replacement),
            changed: true,
            ..Self::default()
        }
    }

    /// An outcome recording an in-place change.
    pub fn changed_in_place() -> Self {
        Self {
            changed: true,
            ..Self::default()
        }
    }

    /// Queues a marker to attach to `node`.
    pub fn with_marker(mut self, node: NodeId, marker: Marker) -> Self {
        self.markers.push((node, marker));
        self
    }

    /// Records newly required external symbols.
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<QualifiedName>,
    {
        self.required_symbols
            .extend(symbols.into_iter().map(Into::into));
        self
    }
}

/// Rewrite function: rewrites the matched node or declines with `None`.
///
/// Declining is the expected majority case (`NoMatch` in the error
/// taxonomy) and is not an error.
pub type RewriteFn = Box<dyn Fn(&mut RewriteCx<'_>, NodeId) -> Option<RewriteOutcome>>;

/// One registered (match, rewrite) pair.
pub struct Rule {
    id: RuleId,
    trigger: Trigger,
    rewrite: RewriteFn,
    /// Bridging rules re-enter partially rewritten chains (their signatures
    /// mention target-side receiver types). Their signatures are excluded
    /// from the unmatched-call diagnostic surface.
    bridging: bool,
}

impl Rule {
    /// Creates a rule.
    pub fn new(
        id: &str,
        trigger: Trigger,
        rewrite: impl Fn(&mut RewriteCx<'_>, NodeId) -> Option<RewriteOutcome> + 'static,
    ) -> Self {
        Self {
            id: RuleId(id.to_owned()),
            trigger,
            rewrite: Box::new(rewrite),
            bridging: false,
        }
    }

    /// Marks this rule as bridging (see the field docs).
    pub fn bridging(mut self) -> Self {
        self.bridging = true;
        self
    }

    pub fn id(&self) -> &RuleId {
        &self.id
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Decides whether this rule's trigger matches `node`. Side-effect-free.
    pub fn matches(&self, tree: &SourceTree, markers: &MarkerStore, node: NodeId) -> bool {
        match &self.trigger {
            Trigger::Call(signature) => signature.matches(tree, node),
            Trigger::Declaration(kind) => {
                matches!(tree.decl(node), Some(decl) if decl.kind == *kind)
            }
            Trigger::Marked { marker, selector } => match tree.expr(node) {
                Some(ExprData::Call {
                    receiver: Some(recv),
                    selector: sel,
                    ..
                }) => sel == selector && markers.get(*recv, *marker).is_some(),
                _ => false,
            },
        }
    }

    /// Runs the rewrite function. `None` means the rule declined.
    pub fn apply(&self, cx: &mut RewriteCx<'_>, node: NodeId) -> Option<RewriteOutcome> {
        (self.rewrite)(cx, node)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("bridging", &self.bridging)
            .finish_non_exhaustive()
    }
}

/// Which dispatch table a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Declaration,
    Expression,
}

/// The closed, ordered rule collection for a run.
///
/// Rules are indexed by the node kind they trigger on; within a table the
/// registration order is the match order, and at most one rule fires per
/// node per pass.
#[derive(Debug, Default)]
pub struct RuleSet {
    decl_rules: Vec<Rule>,
    expr_rules: Vec<Rule>,
    known_receivers: BTreeSet<QualifiedName>,
    registered_selectors: BTreeSet<(QualifiedName, String)>,
    settled_types: BTreeSet<QualifiedName>,
}

impl RuleSet {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule at the end of its dispatch table.
    pub fn push(&mut self, rule: Rule) {
        match &rule.trigger {
            Trigger::Call(signature) => {
                if !rule.bridging {
                    self.known_receivers.insert(signature.receiver().to_owned());
                    self.registered_selectors.insert((
                        signature.receiver().to_owned(),
                        signature.selector().to_owned(),
                    ));
                }
                self.expr_rules.push(rule);
            }
            Trigger::Marked { .. } => self.expr_rules.push(rule),
            Trigger::Declaration(_) => self.decl_rules.push(rule),
        }
    }

    /// Returns the dispatch table for a node, if any rules can apply to it.
    pub fn rules_for(&self, tree: &SourceTree, node: NodeId) -> &[Rule] {
        match tree.kind(node) {
            Some(NodeKind::Decl(_)) => &self.decl_rules,
            Some(NodeKind::Expr(ExprData::Call { .. })) => &self.expr_rules,
            _ => &[],
        }
    }

    /// Returns the dispatch table by kind.
    pub fn table(&self, kind: DispatchKind) -> &[Rule] {
        match kind {
            DispatchKind::Declaration => &self.decl_rules,
            DispatchKind::Expression => &self.expr_rules,
        }
    }

    /// Whether `ty` is a source receiver type some non-bridging signature
    /// triggers on.
    pub fn is_known_receiver(&self, ty: &str) -> bool {
        self.known_receivers.contains(ty)
    }

    /// Whether some non-bridging signature registers `selector` on `ty`.
    pub fn is_registered_selector(&self, ty: &str, selector: &str) -> bool {
        self.registered_selectors
            .contains(&(ty.to_owned(), selector.to_owned()))
    }

    /// Declares `ty` a settled target-vocabulary type: calls already
    /// carrying it are finished rewrites and draw no unmatched diagnostics.
    pub fn settle(&mut self, ty: &str) {
        self.settled_types.insert(ty.to_owned());
    }

    /// Whether `ty` was declared settled.
    pub fn is_settled(&self, ty: &str) -> bool {
        self.settled_types.contains(ty)
    }

    /// Total number of registered rules.
    pub fn len(&self) -> usize {
        self.decl_rules.len() + self.expr_rules.len()
    }

    /// Returns `true` if no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
