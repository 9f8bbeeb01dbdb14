//! Line-up benchmarks
//!
//! Measures resolving configs end to end and the raw graph ordering.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keel_benchmarks::{criterion_config, host_features, host_registry};
use keel_core::types::{FeatureId, SpecId};
use keel_resolver::{FeatureEdge, FeatureGraph, FeatureNode, MainConfigBuilder};
use petgraph::graph::NodeIndex;

/// Benchmark building a config whose referrers precede their targets
fn bench_build_config(c: &mut Criterion) {
    let registry = host_registry();
    let mut group = c.benchmark_group("build_config");
    group.sample_size(20);

    for count in [10, 100, 1000].iter() {
        let features = host_features(*count);
        group.throughput(Throughput::Elements(features.len() as u64));

        group.bench_with_input(BenchmarkId::new("features", count), &features, |b, features| {
            b.iter(|| {
                let mut builder = MainConfigBuilder::new(registry.clone());
                for config in features {
                    builder.add_feature(config.clone()).expect("add");
                }
                black_box(builder.build().expect("build"))
            });
        });
    }

    group.finish();
}

/// Layered chain `f0 <- f1 <- ... <- fn` with a fan-out edge at every step
fn chain_graph(length: usize) -> (FeatureGraph, Vec<NodeIndex>) {
    let mut graph = FeatureGraph::new();
    let nodes: Vec<_> = (0..length)
        .map(|i| {
            graph.add_feature(FeatureNode {
                index: i,
                id: Some(FeatureId::single(SpecId::new("node"), "name", format!("n{}", i))),
                label: format!("node:name=n{}", i),
            })
        })
        .collect();
    for i in 1..length {
        graph.add_edge(nodes[i], nodes[i - 1], FeatureEdge::Dependency);
        if i >= 2 {
            graph.add_edge(nodes[i], nodes[i / 2], FeatureEdge::Reference("parent".to_string()));
        }
    }
    (graph, nodes)
}

/// Benchmark cycle detection and DFS line-up on the feature graph
fn bench_graph_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_ordering");

    for length in [100, 1000, 10000].iter() {
        let (graph, nodes) = chain_graph(*length);
        group.throughput(Throughput::Elements(*length as u64));

        group.bench_with_input(BenchmarkId::new("detect_cycles", length), &graph, |b, graph| {
            b.iter(|| black_box(graph.detect_cycles().is_ok()));
        });

        let roots: Vec<_> = nodes.iter().rev().copied().collect();
        group.bench_with_input(BenchmarkId::new("line_up", length), &roots, |b, roots| {
            b.iter(|| black_box(graph.line_up(roots.iter().copied())));
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_build_config, bench_graph_ordering
}
criterion_main!(benches);
