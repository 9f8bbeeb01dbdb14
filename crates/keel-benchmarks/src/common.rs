//! Common utilities for benchmarks

use std::sync::Arc;

use criterion::Criterion;
use pprof::criterion::{Output, PProfProfiler};

use keel_core::types::{
    FeatureConfig, FeatureParameterSpec, FeatureReferenceSpec, FeatureSpec, FeatureSpecRegistry,
};

/// Configure criterion with flamegraph profiling support
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .sample_size(100)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

/// Registry with a `host` spec and a `binding` spec referencing it
pub fn host_registry() -> Arc<FeatureSpecRegistry> {
    let host = FeatureSpec::builder("host")
        .param(FeatureParameterSpec::id("name"))
        .param(FeatureParameterSpec::new("os").with_default("linux"))
        .build()
        .expect("host spec");
    let binding = FeatureSpec::builder("binding")
        .param(FeatureParameterSpec::id("host"))
        .param(FeatureParameterSpec::id("port"))
        .reference(FeatureReferenceSpec::to("host").map("host", "name"))
        .build()
        .expect("binding spec");

    let registry = FeatureSpecRegistry::builder()
        .add(host)
        .and_then(|builder| builder.add(binding))
        .and_then(|builder| builder.build())
        .expect("registry");
    Arc::new(registry)
}

/// `count` hosts, each with one binding, declared bindings first
pub fn host_features(count: usize) -> Vec<FeatureConfig> {
    let bindings = (0..count).map(|i| {
        FeatureConfig::new("binding")
            .param("host", format!("h{}", i))
            .param("port", (8000 + i).to_string())
    });
    let hosts = (0..count).map(|i| FeatureConfig::new("host").param("name", format!("h{}", i)));
    bindings.chain(hosts).collect()
}
