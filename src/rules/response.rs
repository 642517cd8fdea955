//! Deferred call-chain rewriting: `Response` builders → `ResponseEntity`.
//!
//! The two builder APIs disagree about call order: JAX-RS sets the payload
//! mid-chain (`Response.status(s).entity(e).build()`) while Spring takes it
//! at the terminal call (`ResponseEntity.status(s).body(e)`). No local
//! substitution can express that, so the rewrite is a two-phase,
//! marker-mediated protocol:
//!
//! 1. one-for-one calls are substituted directly;
//! 2. the producing rule elides `entity(e)` down to its receiver and parks
//!    the unevaluated payload on it as a deferred-payload marker;
//! 3. the consuming rule rewrites the terminal `build()`, merging the
//!    deferred payload into `body(e)` when the marker is present, or doing a
//!    context-free type rename when it is not (the correct shape then
//!    emerges on a later pass, once the receiver has stabilized);
//! 4. a marker-only fallback, registered last, catches terminals whose
//!    receivers acquire the marker only after the terminal was already
//!    renamed.
//!
//! Because a pass rewrites receivers before the calls wrapping them, every
//! instance rule is registered twice: once against the source builder type
//! and once, as a bridging rule, against the target builder type it may
//! find already in place mid-chain.
//!
//! Every terminal rewrite records a type-correction marker; the pipeline's
//! end-of-pass sweep retypes declarations unit-wide and discards it.
//!
//! Relative evaluation order of side-effecting sub-expressions is preserved
//! except for the single explicit payload relocation; arguments are never
//! reordered past another argument.

use crate::marker::{Marker, MarkerKind};
use crate::matcher::CallSignature;
use crate::rule::{RewriteCx, RewriteOutcome, Rule, Trigger};
use crate::template::{CallTemplate, TemplateArg};
use crate::tree::{ExprData, NodeId};

pub const RESPONSE: &str = "javax.ws.rs.core.Response";
pub const RESPONSE_BUILDER: &str = "javax.ws.rs.core.Response.ResponseBuilder";
pub const RESPONSE_ENTITY: &str = "org.springframework.http.ResponseEntity";
pub const BODY_BUILDER: &str = "org.springframework.http.ResponseEntity.BodyBuilder";
pub const HTTP_HEADERS: &str = "org.springframework.http.HttpHeaders";

/// Target-vocabulary static types marking a call as already rewritten.
/// The pipeline suppresses unmatched-call diagnostics for them.
pub fn settled_types() -> [&'static str; 2] {
    [RESPONSE_ENTITY, BODY_BUILDER]
}

fn signature(text: &str) -> CallSignature {
    CallSignature::parse(text).expect("registered signature parses")
}

/// A direct one-for-one substitution driven by a call template.
fn substitution(id: &str, sig: &str, template: CallTemplate) -> Rule {
    Rule::new(id, Trigger::Call(signature(sig)), move |cx, node| {
        let replacement = template.instantiate(cx.tree, node).ok()?;
        Some(
            RewriteOutcome::replaced(replacement)
                .with_symbols(template.required_symbols().iter().cloned()),
        )
    })
}

/// Registers an instance substitution against both builder receiver types:
/// the source form, and a bridging form for receivers rewritten earlier in
/// the same pass.
fn builder_substitution(id: &str, member_sig: &str, template: CallTemplate) -> [Rule; 2] {
    let source = format!("{} {}", RESPONSE_BUILDER, member_sig);
    let target = format!("{} {}", BODY_BUILDER, member_sig);
    let bridged = template.clone();
    [
        substitution(id, &source, template),
        substitution(&format!("{}-rewritten", id), &target, bridged).bridging(),
    ]
}

fn type_correction() -> Marker {
    Marker::TypeCorrection {
        from: RESPONSE.to_owned(),
        to: RESPONSE_ENTITY.to_owned(),
    }
}

fn header_pair(member: &str) -> CallTemplate {
    CallTemplate::with_args(
        "header",
        vec![
            TemplateArg::Symbol {
                qualified: HTTP_HEADERS.to_owned(),
                member: Some(member.to_owned()),
            },
            TemplateArg::Bound(0),
        ],
    )
    .result_type(BODY_BUILDER)
    .requires(HTTP_HEADERS)
}

/// The registered chain rule list, in match order. The deferred-payload
/// fallback must stay last.
pub fn response_builder_rules() -> Vec<Rule> {
    let mut rules = Vec::new();

    // Static entry points.
    rules.push(substitution(
        "response-status",
        "javax.ws.rs.core.Response status(int)",
        CallTemplate::rename("status")
            .static_receiver(RESPONSE_ENTITY)
            .result_type(BODY_BUILDER),
    ));
    rules.push(substitution(
        "response-ok",
        "javax.ws.rs.core.Response ok()",
        CallTemplate::rename("ok")
            .static_receiver(RESPONSE_ENTITY)
            .result_type(BODY_BUILDER),
    ));
    // ok(entity) carries a payload the target API only accepts at the
    // terminal call, so it is a producing form too.
    rules.push(Rule::new(
        "response-ok-entity",
        Trigger::Call(signature("javax.ws.rs.core.Response ok(_)")),
        |cx, node| {
            let payload = match cx.tree.expr(node) {
                Some(ExprData::Call { args, .. }) => *args.first()?,
                _ => return None,
            };
            let receiver = cx.tree.identifier("ResponseEntity", Some(RESPONSE_ENTITY));
            let replacement = cx.tree.call(Some(receiver), "ok", vec![], Some(BODY_BUILDER));
            Some(
                RewriteOutcome::replaced(replacement)
                    .with_marker(replacement, Marker::DeferredPayload { payload })
                    .with_symbols([RESPONSE_ENTITY.to_owned()]),
            )
        },
    ));

    // One-for-one builder calls.
    rules.extend(builder_substitution(
        "builder-tag",
        "tag(java.lang.String)",
        CallTemplate::rename("eTag").result_type(BODY_BUILDER),
    ));
    rules.extend(builder_substitution(
        "builder-content-location",
        "contentLocation(java.net.URI)",
        CallTemplate::rename("location").result_type(BODY_BUILDER),
    ));
    rules.extend(builder_substitution(
        "builder-type-media",
        "type(javax.ws.rs.core.MediaType)",
        CallTemplate::rename("contentType").result_type(BODY_BUILDER),
    ));
    rules.extend(builder_substitution(
        "builder-type-string",
        "type(java.lang.String)",
        header_pair("CONTENT_TYPE"),
    ));
    rules.extend(builder_substitution(
        "builder-encoding",
        "encoding(java.lang.String)",
        header_pair("CONTENT_ENCODING"),
    ));
    rules.extend(builder_substitution(
        "builder-language",
        "language(java.lang.String)",
        header_pair("CONTENT_LANGUAGE"),
    ));
    rules.extend(builder_substitution(
        "builder-last-modified",
        "lastModified(java.util.Date)",
        CallTemplate::with_args(
            "lastModified",
            vec![TemplateArg::Wrapped {
                index: 0,
                selector: "toInstant".to_owned(),
            }],
        )
        .result_type(BODY_BUILDER),
    ));

    // Producing rule: elide entity(..) to its receiver, defer the payload.
    rules.push(Rule::new(
        "builder-entity",
        Trigger::Call(signature(
            "javax.ws.rs.core.Response.ResponseBuilder entity(_, ..)",
        )),
        produce_deferred_payload,
    ));
    rules.push(
        Rule::new(
            "builder-entity-rewritten",
            Trigger::Call(signature(
                "org.springframework.http.ResponseEntity.BodyBuilder entity(_, ..)",
            )),
            produce_deferred_payload,
        )
        .bridging(),
    );

    // Consuming rule: the terminal call of the chain kind.
    rules.push(Rule::new(
        "builder-build",
        Trigger::Call(signature("javax.ws.rs.core.Response.ResponseBuilder build()")),
        consume_or_rename_terminal,
    ));
    rules.push(
        Rule::new(
            "builder-build-rewritten",
            Trigger::Call(signature(
                "org.springframework.http.ResponseEntity.BodyBuilder build()",
            )),
            consume_or_rename_terminal,
        )
        .bridging(),
    );

    // Deferred-payload fallback. Always last: it catches terminals whose
    // receiver acquired the marker after the terminal was already renamed.
    rules.push(Rule::new(
        "deferred-body",
        Trigger::Marked {
            marker: MarkerKind::DeferredPayload,
            selector: "build".to_owned(),
        },
        |cx, node| {
            let receiver = match cx.tree.expr(node) {
                Some(ExprData::Call {
                    receiver: Some(recv),
                    ..
                }) => *recv,
                _ => return None,
            };
            let Marker::DeferredPayload { payload } =
                cx.markers.take(receiver, MarkerKind::DeferredPayload)?
            else {
                return None;
            };
            let replacement =
                cx.tree
                    .call(Some(receiver), "body", vec![payload], Some(RESPONSE_ENTITY));
            Some(
                RewriteOutcome::replaced(replacement)
                    .with_marker(replacement, type_correction())
                    .with_symbols([RESPONSE_ENTITY.to_owned()]),
            )
        },
    ));

    rules
}

/// The producing half of the deferral protocol: the call replaces itself
/// with its own receiver, and the unevaluated payload rides along on a
/// marker.
fn produce_deferred_payload(cx: &mut RewriteCx<'_>, node: NodeId) -> Option<RewriteOutcome> {
    let (receiver, payload) = match cx.tree.expr(node) {
        Some(ExprData::Call {
            receiver: Some(recv),
            args,
            ..
        }) => (*recv, *args.first()?),
        _ => return None,
    };
    Some(
        RewriteOutcome::replaced(receiver)
            .with_marker(receiver, Marker::DeferredPayload { payload }),
    )
}

/// The consuming half: merge a deferred payload into the terminal call, or
/// fall back to a context-free type rename. Declines once the terminal is
/// already retyped, which is what lets the pipeline converge.
fn consume_or_rename_terminal(cx: &mut RewriteCx<'_>, node: NodeId) -> Option<RewriteOutcome> {
    let (receiver, current_ty) = match cx.tree.expr(node) {
        Some(ExprData::Call {
            receiver: Some(recv),
            ty,
            ..
        }) => (*recv, ty.clone()),
        _ => return None,
    };
    if let Some(Marker::DeferredPayload { payload }) =
        cx.markers.take(receiver, MarkerKind::DeferredPayload)
    {
        // Merge: the deferred payload becomes the terminal argument;
        // whatever build() itself carried is discarded.
        let replacement = cx
            .tree
            .call(Some(receiver), "body", vec![payload], Some(RESPONSE_ENTITY));
        Some(
            RewriteOutcome::replaced(replacement)
                .with_marker(replacement, type_correction())
                .with_symbols([RESPONSE_ENTITY.to_owned()]),
        )
    } else if current_ty.as_deref() != Some(RESPONSE_ENTITY) {
        let replacement = cx
            .tree
            .call(Some(receiver), "build", vec![], Some(RESPONSE_ENTITY));
        Some(
            RewriteOutcome::replaced(replacement)
                .with_marker(replacement, type_correction())
                .with_symbols([RESPONSE_ENTITY.to_owned()]),
        )
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerStore;
    use crate::tree::SourceTree;

    fn find<'a>(rules: &'a [Rule], id: &str) -> &'a Rule {
        rules
            .iter()
            .find(|r| r.id().0 == id)
            .unwrap_or_else(|| panic!("rule {id} not registered"))
    }

    fn apply(
        rule: &Rule,
        tree: &mut SourceTree,
        markers: &mut MarkerStore,
        node: NodeId,
    ) -> Option<RewriteOutcome> {
        assert!(rule.matches(tree, markers, node), "trigger must match");
        let mut cx = RewriteCx { tree, markers };
        rule.apply(&mut cx, node)
    }

    #[test]
    fn tag_renames_to_etag() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(RESPONSE_BUILDER));
        let arg = tree.literal("\"v1\"", Some("java.lang.String"));
        let call = tree.call(Some(recv), "tag", vec![arg], Some(RESPONSE_BUILDER));

        let rules = response_builder_rules();
        let outcome = apply(find(&rules, "builder-tag"), &mut tree, &mut markers, call).unwrap();
        let replacement = outcome.replacement.unwrap();
        assert_eq!(tree.render_expr(replacement), "b.eTag(\"v1\")");
        assert_eq!(tree.static_type(replacement), Some(BODY_BUILDER));
    }

    #[test]
    fn bridging_variant_accepts_rewritten_receivers() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(BODY_BUILDER));
        let arg = tree.literal("\"v1\"", Some("java.lang.String"));
        let call = tree.call(Some(recv), "tag", vec![arg], Some(RESPONSE_BUILDER));

        let rules = response_builder_rules();
        assert!(!find(&rules, "builder-tag").matches(&tree, &markers, call));
        let outcome = apply(
            find(&rules, "builder-tag-rewritten"),
            &mut tree,
            &mut markers,
            call,
        )
        .unwrap();
        assert_eq!(tree.render_expr(outcome.replacement.unwrap()), "b.eTag(\"v1\")");
    }

    #[test]
    fn encoding_reshapes_to_header_pair() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(RESPONSE_BUILDER));
        let arg = tree.identifier("enc", Some("java.lang.String"));
        let call = tree.call(Some(recv), "encoding", vec![arg], Some(RESPONSE_BUILDER));

        let rules = response_builder_rules();
        let outcome = apply(find(&rules, "builder-encoding"), &mut tree, &mut markers, call).unwrap();
        let replacement = outcome.replacement.unwrap();
        assert_eq!(
            tree.render_expr(replacement),
            "b.header(HttpHeaders.CONTENT_ENCODING, enc)"
        );
        assert!(outcome.required_symbols.contains(&HTTP_HEADERS.to_owned()));
    }

    #[test]
    fn last_modified_wraps_its_argument() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(RESPONSE_BUILDER));
        let arg = tree.identifier("date", Some("java.util.Date"));
        let call = tree.call(Some(recv), "lastModified", vec![arg], Some(RESPONSE_BUILDER));

        let rules = response_builder_rules();
        let outcome = apply(
            find(&rules, "builder-last-modified"),
            &mut tree,
            &mut markers,
            call,
        )
        .unwrap();
        assert_eq!(
            tree.render_expr(outcome.replacement.unwrap()),
            "b.lastModified(date.toInstant())"
        );
    }

    #[test]
    fn entity_elides_to_receiver_and_defers_payload() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(RESPONSE_BUILDER));
        let payload = tree.identifier("e", Some("java.lang.Object"));
        let call = tree.call(Some(recv), "entity", vec![payload], Some(RESPONSE_BUILDER));

        let rules = response_builder_rules();
        let outcome = apply(find(&rules, "builder-entity"), &mut tree, &mut markers, call).unwrap();
        assert_eq!(outcome.replacement, Some(recv));
        assert_eq!(
            outcome.markers,
            vec![(recv, Marker::DeferredPayload { payload })]
        );
    }

    #[test]
    fn build_merges_deferred_payload() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(RESPONSE_BUILDER));
        let payload = tree.identifier("e", Some("java.lang.Object"));
        markers.attach(recv, Marker::DeferredPayload { payload });
        let call = tree.call(Some(recv), "build", vec![], Some(RESPONSE));

        let rules = response_builder_rules();
        let outcome = apply(find(&rules, "builder-build"), &mut tree, &mut markers, call).unwrap();
        let replacement = outcome.replacement.unwrap();
        assert_eq!(tree.render_expr(replacement), "b.body(e)");
        assert_eq!(tree.static_type(replacement), Some(RESPONSE_ENTITY));
        // Marker consumed, type correction recorded for the sweep.
        assert!(markers.get(recv, MarkerKind::DeferredPayload).is_none());
        assert_eq!(outcome.markers, vec![(replacement, type_correction())]);
    }

    #[test]
    fn build_discards_its_own_arguments_on_merge() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(RESPONSE_BUILDER));
        let payload = tree.identifier("e", Some("java.lang.Object"));
        markers.attach(recv, Marker::DeferredPayload { payload });
        let stray = tree.literal("0", Some("int"));
        let call = tree.call(Some(recv), "build", vec![stray], Some(RESPONSE));

        // The zero-arg signature does not match a one-arg build(); go
        // through the rewrite function directly, as the fallback would.
        let mut cx = RewriteCx {
            tree: &mut tree,
            markers: &mut markers,
        };
        let outcome = consume_or_rename_terminal(&mut cx, call).unwrap();
        let replacement = outcome.replacement.unwrap();
        assert_eq!(tree.render_expr(replacement), "b.body(e)");
    }

    #[test]
    fn build_without_marker_is_a_type_only_rename() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(RESPONSE_BUILDER));
        let call = tree.call(Some(recv), "build", vec![], Some(RESPONSE));

        let rules = response_builder_rules();
        let outcome = apply(find(&rules, "builder-build"), &mut tree, &mut markers, call).unwrap();
        let replacement = outcome.replacement.unwrap();
        assert_eq!(tree.render_expr(replacement), "b.build()");
        assert_eq!(tree.static_type(replacement), Some(RESPONSE_ENTITY));
    }

    #[test]
    fn build_already_retyped_declines() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(RESPONSE_BUILDER));
        let call = tree.call(Some(recv), "build", vec![], Some(RESPONSE_ENTITY));

        let rules = response_builder_rules();
        let rule = find(&rules, "builder-build");
        assert!(rule.matches(&tree, &markers, call));
        let mut cx = RewriteCx {
            tree: &mut tree,
            markers: &mut markers,
        };
        assert!(rule.apply(&mut cx, call).is_none());
    }

    #[test]
    fn fallback_only_rewrites_the_terminal_selector() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let recv = tree.identifier("b", Some(BODY_BUILDER));
        let payload = tree.identifier("e", Some("java.lang.Object"));
        markers.attach(recv, Marker::DeferredPayload { payload });
        let cookie = tree.call(Some(recv), "cookie", vec![], Some(RESPONSE_BUILDER));

        let rules = response_builder_rules();
        let fallback = find(&rules, "deferred-body");
        // The marker sits on the receiver, but a non-terminal selector is
        // not the trigger; the marker stays put.
        assert!(!fallback.matches(&tree, &markers, cookie));
        assert!(markers.get(recv, MarkerKind::DeferredPayload).is_some());

        let build = tree.call(Some(recv), "build", vec![], Some(RESPONSE_ENTITY));
        let outcome = apply(fallback, &mut tree, &mut markers, build).unwrap();
        assert_eq!(tree.render_expr(outcome.replacement.unwrap()), "b.body(e)");
    }

    #[test]
    fn ok_with_entity_defers_its_argument() {
        let mut tree = SourceTree::new();
        let mut markers = MarkerStore::new();
        let response = tree.identifier("Response", Some(RESPONSE));
        let payload = tree.identifier("e", Some("java.lang.String"));
        let call = tree.call(Some(response), "ok", vec![payload], Some(RESPONSE_BUILDER));

        let rules = response_builder_rules();
        let outcome = apply(
            find(&rules, "response-ok-entity"),
            &mut tree,
            &mut markers,
            call,
        )
        .unwrap();
        let replacement = outcome.replacement.unwrap();
        assert_eq!(tree.render_expr(replacement), "ResponseEntity.ok()");
        assert_eq!(
            outcome.markers,
            vec![(replacement, Marker::DeferredPayload { payload })]
        );
    }
}
