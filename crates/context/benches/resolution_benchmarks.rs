//! Performance benchmarks for binding lookup and value resolution
//!
//! Measures how resolution and tag lookups scale with the number of
//! bindings and the depth of the context hierarchy.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use elif_context::{filter_by_tag, BindingScope, Context};

/// Context with `count` tagged constant bindings
fn populated_context(name: &str, count: usize) -> Context {
    let ctx = Context::named(name);
    for i in 0..count {
        ctx.bind(format!("services.service{}", i))
            .unwrap()
            .to(i)
            .tag(if i % 2 == 0 { "even" } else { "odd" });
    }
    ctx
}

/// Chain of `depth` contexts below `root`, returning the innermost
fn nested_context(root: &Context, depth: usize) -> Context {
    let mut current = root.clone();
    for level in 0..depth {
        current = Context::with_parent(&current, format!("level{}", level));
    }
    current
}

fn benchmark_constant_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("constant_resolution");

    for depth in [0, 4, 16].iter() {
        let root = populated_context("root", 100);
        let leaf = nested_context(&root, *depth);
        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, _| {
            b.iter(|| {
                let value = leaf.get_sync::<usize>(black_box("services.service50")).unwrap();
                black_box(value);
            });
        });
    }

    group.finish();
}

fn benchmark_scoped_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped_resolution");

    let ctx = Context::named("app");
    ctx.bind("transient")
        .unwrap()
        .to_dynamic_value(|_| Ok(vec![0u8; 64]));
    ctx.bind("singleton")
        .unwrap()
        .to_dynamic_value(|_| Ok(vec![0u8; 64]))
        .in_scope(BindingScope::Singleton);

    group.bench_function("transient", |b| {
        b.iter(|| black_box(ctx.get_sync::<Vec<u8>>("transient").unwrap()));
    });
    group.bench_function("singleton", |b| {
        b.iter(|| black_box(ctx.get_sync::<Vec<u8>>("singleton").unwrap()));
    });

    group.finish();
}

fn benchmark_find_by_tag(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_tag");

    for count in [10, 100, 1000].iter() {
        let ctx = populated_context("app", *count);
        group.bench_with_input(BenchmarkId::new("index", count), count, |b, _| {
            b.iter(|| black_box(ctx.find_by_tag("even")));
        });
        group.bench_with_input(BenchmarkId::new("scan", count), count, |b, _| {
            let filter = elif_context::BindingFilter::new(|binding| binding.has_tag("even"));
            b.iter(|| black_box(ctx.find(&filter)));
        });
    }

    group.finish();
}

fn benchmark_view_values(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("view_values");

    for count in [10, 100].iter() {
        let ctx = populated_context("app", *count);
        let view = runtime.block_on(async { ctx.create_view(filter_by_tag("odd"), None).unwrap() });
        group.bench_with_input(BenchmarkId::new("cached", count), count, |b, _| {
            b.iter(|| {
                let values = runtime.block_on(view.values()).unwrap();
                black_box(Arc::new(values));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_constant_resolution,
    benchmark_scoped_resolution,
    benchmark_find_by_tag,
    benchmark_view_values
);
criterion_main!(benches);
