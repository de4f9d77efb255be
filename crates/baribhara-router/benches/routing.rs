//! Dispatch benchmarks.
//!
//! Run with: `cargo bench -p baribhara-router`

use baribhara_router::{Protection, Route, RouteTable};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::Method;

fn build_table(num_routes: usize) -> RouteTable {
    let per_kind = num_routes / 3;
    let mut builder = RouteTable::builder();

    for i in 0..per_kind {
        builder = builder.route(Route::new(
            Method::GET,
            format!("/api/v1/resource{i}"),
            Protection::Public,
            format!("service{i}"),
        ));
    }

    for i in 0..per_kind {
        builder = builder.route(Route::new(
            Method::GET,
            format!("/api/v1/resource{i}/:id"),
            Protection::Authenticated,
            format!("service{i}"),
        ));
    }

    for i in 0..per_kind {
        builder = builder.route(
            Route::new(
                Method::GET,
                format!("/api/v1/org/:org/resource{i}/:id"),
                Protection::AdminOnly,
                format!("service{i}"),
            )
            .with_target(format!("/internal/resource{i}/:id")),
        );
    }

    builder.build().expect("benchmark routes are valid")
}

fn bench_static_match(c: &mut Criterion) {
    let table = build_table(100);

    c.bench_function("static_match", |b| {
        b.iter(|| black_box(table.dispatch(&Method::GET, "/api/v1/resource20")));
    });
}

fn bench_param_match(c: &mut Criterion) {
    let table = build_table(100);

    c.bench_function("param_match", |b| {
        b.iter(|| black_box(table.dispatch(&Method::GET, "/api/v1/resource25/12345")));
    });
}

fn bench_nested_param_with_rewrite(c: &mut Criterion) {
    let table = build_table(100);

    c.bench_function("nested_param_with_rewrite", |b| {
        b.iter(|| {
            let matched = table
                .dispatch(&Method::GET, "/api/v1/org/acme/resource10/12345")
                .ok();
            black_box(matched.map(|m| m.target_path()))
        });
    });
}

fn bench_miss(c: &mut Criterion) {
    let table = build_table(100);

    c.bench_function("miss", |b| {
        b.iter(|| black_box(table.dispatch(&Method::GET, "/api/v1/nonexistent/path")));
    });
}

fn bench_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("scaling");

    for num_routes in [30, 90, 300, 900] {
        let table = build_table(num_routes);

        group.bench_with_input(
            BenchmarkId::new("param_match", num_routes),
            &num_routes,
            |b, &n| {
                let path = format!("/api/v1/resource{}/12345", n / 6);
                b.iter(|| black_box(table.dispatch(&Method::GET, &path)));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_static_match,
    bench_param_match,
    bench_nested_param_with_rewrite,
    bench_miss,
    bench_scaling
);
criterion_main!(benches);
