//! Annotation consolidation: JAX-RS routing annotations → Spring Web.
//!
//! A routed type (one carrying `javax.ws.rs.Path`) and its methods express
//! one capability (route path, verb, content negotiation) across several
//! source-vocabulary annotations. Each rule here folds the recognized ones
//! into a single consolidated `@RequestMapping`, in original annotation
//! order, and leaves everything it does not recognize untouched.
//!
//! The method-level rule additionally tags the implicit payload parameter:
//! the first parameter carrying neither a source-vocabulary nor an
//! already-applied target-vocabulary annotation gets `@RequestBody` (first
//! match only, not all eligible parameters).

use crate::arena::NodeId;
use crate::matcher::in_namespace;
use crate::rule::{RewriteCx, RewriteOutcome, Rule, Trigger};
use crate::tree::{DeclKind, QualifiedName, SourceTree};
use indexmap::IndexMap;

const JAXRS_NS: &str = "javax.ws.rs.";
const SPRING_BIND_NS: &str = "org.springframework.web.bind.";

const PATH: &str = "javax.ws.rs.Path";
const CONSUMES: &str = "javax.ws.rs.Consumes";
const PRODUCES: &str = "javax.ws.rs.Produces";

const REQUEST_MAPPING: &str = "org.springframework.web.bind.annotation.RequestMapping";
const REQUEST_METHOD: &str = "org.springframework.web.bind.annotation.RequestMethod";
const REST_CONTROLLER: &str = "org.springframework.web.bind.annotation.RestController";
const REQUEST_BODY: &str = "org.springframework.web.bind.annotation.RequestBody";

/// The verb annotations the consolidation recognizes, with their rendered
/// names, in no particular order (output order is first-seen declaration
/// order, never this table's order).
const VERBS: [(&str, &str); 7] = [
    ("javax.ws.rs.GET", "GET"),
    ("javax.ws.rs.POST", "POST"),
    ("javax.ws.rs.PUT", "PUT"),
    ("javax.ws.rs.DELETE", "DELETE"),
    ("javax.ws.rs.HEAD", "HEAD"),
    ("javax.ws.rs.PATCH", "PATCH"),
    ("javax.ws.rs.TRACE", "TRACE"),
];

/// The declaration-level consolidation rules, in match order.
pub fn annotation_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "jaxrs-method-annotations",
            Trigger::Declaration(DeclKind::Method),
            convert_method_annotations,
        ),
        Rule::new(
            "jaxrs-type-annotations",
            Trigger::Declaration(DeclKind::Type),
            convert_type_annotations,
        ),
    ]
}

fn lookup_verb(name: &str) -> Option<&'static str> {
    VERBS.iter().find(|(fq, _)| *fq == name).map(|(_, verb)| *verb)
}

fn has_annotation_in(tree: &SourceTree, decl: NodeId, ns: &str) -> bool {
    tree.annotations(decl)
        .iter()
        .any(|&a| tree.annotation_name(a).is_some_and(|n| in_namespace(n, ns)))
}

fn carries(tree: &SourceTree, decl: NodeId, name: &str) -> bool {
    tree.annotations(decl)
        .iter()
        .any(|&a| tree.annotation_name(a) == Some(name))
}

/// Rewrites the annotations of one method on a routed type.
fn convert_method_annotations(cx: &mut RewriteCx<'_>, node: NodeId) -> Option<RewriteOutcome> {
    let tree = &mut *cx.tree;

    // Only methods of types that carry the triggering marker annotation.
    let owner = tree.parent(node)?;
    let owner_routed =
        matches!(tree.decl(owner), Some(d) if d.kind == DeclKind::Type) && carries(tree, owner, PATH);
    if !owner_routed || !has_annotation_in(tree, node, JAXRS_NS) {
        return None;
    }

    let mut symbols: Vec<QualifiedName> = Vec::new();
    let mut changed = false;

    // Implicit payload parameter, first match only. Once any parameter
    // carries a target-vocabulary annotation the tagging already happened.
    let params: Vec<NodeId> = tree
        .decl(node)
        .unwrap()
        .children
        .iter()
        .copied()
        .filter(|&c| matches!(tree.decl(c), Some(d) if d.kind == DeclKind::Parameter))
        .collect();
    let already_tagged = params.iter().any(|&p| has_annotation_in(tree, p, SPRING_BIND_NS));
    if !already_tagged {
        let untouched = params.iter().copied().find(|&p| {
            !has_annotation_in(tree, p, JAXRS_NS) && !has_annotation_in(tree, p, SPRING_BIND_NS)
        });
        if let Some(param) = untouched {
            tree.annotate(param, REQUEST_BODY).unwrap();
            symbols.push(REQUEST_BODY.to_owned());
            changed = true;
        }
    }

    // Accumulate attributes in first-seen order, verbs as an ordered set.
    let anns: Vec<NodeId> = tree.annotations(node).to_vec();
    let mut attrs: IndexMap<String, NodeId> = IndexMap::new();
    let mut verbs: Vec<&'static str> = Vec::new();
    let mut removed: Vec<NodeId> = Vec::new();
    for &ann in &anns {
        let Some(name) = tree.annotation_name(ann) else {
            continue;
        };
        match name {
            PATH => {
                if let Some(value) = tree.annotation_arg(ann, "value") {
                    attrs.insert("value".to_owned(), value);
                }
                removed.push(ann);
            }
            CONSUMES => {
                if let Some(value) = tree.annotation_arg(ann, "value") {
                    attrs.insert("consumes".to_owned(), value);
                }
                removed.push(ann);
            }
            PRODUCES => {
                if let Some(value) = tree.annotation_arg(ann, "value") {
                    attrs.insert("produces".to_owned(), value);
                }
                removed.push(ann);
            }
            other => {
                if let Some(verb) = lookup_verb(other) {
                    if !verbs.contains(&verb) {
                        verbs.push(verb);
                    }
                    removed.push(ann);
                }
                // Unrecognized kinds are left untouched and do not count
                // toward "at least one removed".
            }
        }
    }

    if removed.is_empty() {
        // Trigger present but nothing recognized: no synthesis.
        if changed {
            return Some(RewriteOutcome::changed_in_place().with_symbols(symbols));
        }
        return None;
    }

    for &ann in &removed {
        tree.remove_annotation(node, ann).unwrap();
    }

    let mut args: Vec<(String, NodeId)> = attrs.into_iter().collect();
    if !verbs.is_empty() {
        let expr = if verbs.len() == 1 {
            tree.identifier(&format!("RequestMethod.{}", verbs[0]), None)
        } else {
            let list = verbs
                .iter()
                .map(|verb| format!("RequestMethod.{}", verb))
                .collect::<Vec<_>>()
                .join(", ");
            tree.literal(&format!("{{{}}}", list), None)
        };
        args.push(("method".to_owned(), expr));
        symbols.push(REQUEST_METHOD.to_owned());
    }
    symbols.push(REQUEST_MAPPING.to_owned());

    let arg_refs: Vec<(&str, NodeId)> = args.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    tree.annotate_with(node, REQUEST_MAPPING, arg_refs).unwrap();

    Some(RewriteOutcome::changed_in_place().with_symbols(symbols))
}

/// Rewrites the annotations of a routed type declaration itself.
fn convert_type_annotations(cx: &mut RewriteCx<'_>, node: NodeId) -> Option<RewriteOutcome> {
    let tree = &mut *cx.tree;
    let anns: Vec<NodeId> = tree.annotations(node).to_vec();
    let path = anns
        .iter()
        .copied()
        .find(|&a| tree.annotation_name(a) == Some(PATH))?;

    let mut attrs: IndexMap<String, NodeId> = IndexMap::new();
    if let Some(value) = tree.annotation_arg(path, "value") {
        attrs.insert("value".to_owned(), value);
    }
    let mut removed = vec![path];
    for &ann in &anns {
        if ann == path {
            continue;
        }
        match tree.annotation_name(ann) {
            Some(CONSUMES) => {
                if let Some(value) = tree.annotation_arg(ann, "value") {
                    attrs.insert("consumes".to_owned(), value);
                }
                removed.push(ann);
            }
            Some(PRODUCES) => {
                if let Some(value) = tree.annotation_arg(ann, "value") {
                    attrs.insert("produces".to_owned(), value);
                }
                removed.push(ann);
            }
            _ => {}
        }
    }

    for &ann in &removed {
        tree.remove_annotation(node, ann).unwrap();
    }
    tree.annotate(node, REST_CONTROLLER).unwrap();
    let args: Vec<(String, NodeId)> = attrs.into_iter().collect();
    let arg_refs: Vec<(&str, NodeId)> = args.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    tree.annotate_with(node, REQUEST_MAPPING, arg_refs).unwrap();

    Some(
        RewriteOutcome::changed_in_place()
            .with_symbols([REST_CONTROLLER.to_owned(), REQUEST_MAPPING.to_owned()]),
    )
}
