//! Restitch: a rule-based source-to-source rewriting engine for API
//! migrations.
//!
//! This crate rewrites structured code elements (declarations, annotations,
//! and chained method-call expressions) from one API's idioms into a
//! structurally different but semantically equivalent target API. The
//! registered rule sets migrate JAX-RS resources to Spring Web: routing
//! annotations consolidate into `@RequestMapping`, and `Response` builder
//! chains become `ResponseEntity` chains.
//!
//! The hard case is fluent builder chains whose source and target forms
//! disagree about call order: `Response.status(s).entity(e).build()` must
//! become `ResponseEntity.status(s).body(e)`, relocating the payload to the
//! terminal call. No single local substitution expresses that, so the engine
//! runs repeated bottom-up passes over an arena-backed tree, with a
//! marker-mediated two-phase protocol carrying the deferred payload from the
//! producing rule to the consuming one, until a pass changes nothing
//! (fixpoint) or the pass budget runs out.
//!
//! The engine is single-threaded and synchronous, processes one compilation
//! unit at a time, and never aborts a run: unsupported shapes and unknown
//! selectors are left unchanged and reported as diagnostics.
//!
//! # Example
//!
//! ```
//! use restitch::prelude::*;
//!
//! let mut tree = SourceTree::new();
//! let resource = tree.push_type("PingResource");
//! let base = tree.literal("\"/ping\"", Some("java.lang.String"));
//! tree.annotate_with(resource, "javax.ws.rs.Path", vec![("value", base)])
//!     .unwrap();
//! let method = tree
//!     .push_method(resource, "ping", Some("java.lang.String"))
//!     .unwrap();
//! tree.annotate(method, "javax.ws.rs.GET").unwrap();
//!
//! let report = apply_rules(&mut tree, &migration_rules(), 4);
//! assert!(report.changed);
//! assert_eq!(report.convergence, Convergence::Converged);
//! ```

pub mod arena;
pub mod diagnostic;
pub mod marker;
pub mod matcher;
pub mod pipeline;
pub mod rule;
pub mod rules;
pub mod template;
pub mod tree;

pub use arena::{NodeArena, NodeId};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use marker::{Marker, MarkerKind, MarkerStore};
pub use matcher::CallSignature;
pub use pipeline::{apply_rules, Convergence, RewriteReport};
pub use rule::{Rule, RuleId, RuleSet, Trigger};
pub use rules::migration_rules;
pub use template::CallTemplate;
pub use tree::{NodeKind, SourceTree};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::arena::{NodeArena, NodeId};
    pub use crate::diagnostic::{Diagnostic, DiagnosticKind};
    pub use crate::marker::{Marker, MarkerKind, MarkerStore};
    pub use crate::matcher::{CallSignature, ParamSpec, SignatureParseError};
    pub use crate::pipeline::{apply_rules, Convergence, RewriteReport};
    pub use crate::rule::{RewriteCx, RewriteOutcome, Rule, RuleId, RuleSet, Trigger};
    pub use crate::rules::migration_rules;
    pub use crate::template::{well_known_stub, CallTemplate, TemplateArg};
    pub use crate::tree::{
        AnnotationData, DeclData, DeclKind, ExprData, NodeKind, QualifiedName, SourceTree,
        TreeError,
    };
}
