//! Benchmarks for the rewrite pipeline.
//!
//! These measure full `apply_rules` runs over synthesized units: the
//! annotation-consolidation path, the deferred call-chain path, and the
//! no-op path that establishes the traversal baseline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use restitch::prelude::*;

const RESPONSE: &str = "javax.ws.rs.core.Response";
const RESPONSE_BUILDER: &str = "javax.ws.rs.core.Response.ResponseBuilder";

/// A unit with `methods` routed methods, each carrying a path annotation, a
/// verb, and a status/entity/build chain.
fn synthesize_unit(methods: usize) -> SourceTree {
    let mut tree = SourceTree::new();
    let resource = tree.push_type("BenchResource");
    let base = tree.literal("\"/bench\"", Some("java.lang.String"));
    tree.annotate_with(resource, "javax.ws.rs.Path", vec![("value", base)])
        .unwrap();
    for i in 0..methods {
        let method = tree
            .push_method(resource, &format!("m{i}"), Some(RESPONSE))
            .unwrap();
        let path = tree.literal(&format!("\"/m{i}\""), Some("java.lang.String"));
        tree.annotate_with(method, "javax.ws.rs.Path", vec![("value", path)])
            .unwrap();
        tree.annotate(method, "javax.ws.rs.GET").unwrap();

        let response = tree.identifier("Response", Some(RESPONSE));
        let code = tree.literal("200", Some("int"));
        let status = tree.call(Some(response), "status", vec![code], Some(RESPONSE_BUILDER));
        let payload = tree.identifier("e", Some("java.lang.Object"));
        let entity = tree.call(Some(status), "entity", vec![payload], Some(RESPONSE_BUILDER));
        let build = tree.call(Some(entity), "build", vec![], Some(RESPONSE));
        tree.push_statement(method, build).unwrap();
    }
    tree
}

/// A unit of the same shape with no registered triggers anywhere.
fn synthesize_untriggered_unit(methods: usize) -> SourceTree {
    let mut tree = SourceTree::new();
    let resource = tree.push_type("PlainType");
    for i in 0..methods {
        let method = tree
            .push_method(resource, &format!("m{i}"), Some("long"))
            .unwrap();
        let stream = tree.identifier("LongStream", Some("java.util.stream.LongStream"));
        let builder = tree.call(
            Some(stream),
            "builder",
            vec![],
            Some("java.util.stream.LongStream.Builder"),
        );
        let one = tree.literal("1", Some("long"));
        let add = tree.call(
            Some(builder),
            "add",
            vec![one],
            Some("java.util.stream.LongStream.Builder"),
        );
        let build = tree.call(Some(add), "build", vec![], Some("java.util.stream.LongStream"));
        tree.push_statement(method, build).unwrap();
    }
    tree
}

fn bench_migrate_100_methods(c: &mut Criterion) {
    let rules = migration_rules();
    let unit = synthesize_unit(100);

    c.bench_function("migrate_100_methods", |b| {
        b.iter(|| {
            let mut tree = unit.clone();
            let report = apply_rules(black_box(&mut tree), black_box(&rules), 5);
            assert!(report.changed);
            report
        });
    });
}

fn bench_noop_traversal_100_methods(c: &mut Criterion) {
    let rules = migration_rules();
    let unit = synthesize_untriggered_unit(100);

    c.bench_function("noop_traversal_100_methods", |b| {
        b.iter(|| {
            let mut tree = unit.clone();
            let report = apply_rules(black_box(&mut tree), black_box(&rules), 5);
            assert!(!report.changed);
            report
        });
    });
}

fn bench_reconverge_on_rewritten_unit(c: &mut Criterion) {
    let rules = migration_rules();
    let mut unit = synthesize_unit(100);
    apply_rules(&mut unit, &rules, 5);

    c.bench_function("reconverge_on_rewritten_unit", |b| {
        b.iter(|| {
            let mut tree = unit.clone();
            let report = apply_rules(black_box(&mut tree), black_box(&rules), 5);
            assert!(!report.changed);
            report
        });
    });
}

criterion_group!(
    benches,
    bench_migrate_100_methods,
    bench_noop_traversal_100_methods,
    bench_reconverge_on_rewritten_unit
);
criterion_main!(benches);
