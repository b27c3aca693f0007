//! Tree walking benchmarks using Criterion

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use distguard_benchmarks::build_site;
use distguard_core::{
    DomainWhitelist, FileTransformer, ObfuscationPolicy, TreeWalker, WalkOptions,
};
use tempfile::TempDir;

fn walker(policy: ObfuscationPolicy, parallel: bool) -> TreeWalker {
    let transformer =
        FileTransformer::new(Arc::new(policy), Arc::new(DomainWhitelist::default())).unwrap();
    TreeWalker::new(
        transformer,
        WalkOptions {
            parallel,
            ..WalkOptions::default()
        },
    )
}

fn protect_tree_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("protect_tree");
    group.sample_size(20);

    let site = TempDir::new().unwrap();
    build_site(site.path(), 64, 8 * 1024).unwrap();
    let dist = site.path().join("dist");

    for (name, policy, parallel) in [
        ("guard_only_sequential", ObfuscationPolicy::disabled(), false),
        ("guard_only_parallel", ObfuscationPolicy::disabled(), true),
        ("default_sequential", ObfuscationPolicy::default(), false),
        ("default_parallel", ObfuscationPolicy::default(), true),
    ] {
        let walker = walker(policy, parallel);
        group.bench_function(name, |b| {
            b.iter_with_setup(
                || TempDir::new().unwrap(),
                |out| black_box(walker.walk(&dist, &out.path().join("protected")).unwrap()),
            )
        });
    }

    group.finish();
}

criterion_group!(benches, protect_tree_benchmarks);
criterion_main!(benches);
