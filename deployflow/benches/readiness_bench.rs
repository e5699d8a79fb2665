//! Benchmarks for status decoding, readiness predicates and descriptors.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deployflow::poll::Condition;
use deployflow::resources::{datacenter_ready, deployment_ready, CassandraDatacenterView, ReaperDescriptor};
use k8s_openapi::api::apps::v1::Deployment;
use serde_json::json;

fn readiness_benchmark(c: &mut Criterion) {
    let datacenter = json!({
        "metadata": { "name": "reaper-test", "namespace": "deploy-reaper-test" },
        "spec": { "clusterName": "reaper-test", "size": 3 },
        "status": {
            "cassandraOperatorProgress": "Ready",
            "conditions": [
                { "type": "Ready", "status": "True" },
                { "type": "Initialized", "status": "True" },
            ],
        },
    });
    let deployment = json!({
        "spec": { "replicas": 1, "selector": {}, "template": {} },
        "status": { "replicas": 1, "readyReplicas": 1, "availableReplicas": 1 },
    });

    c.bench_function("decode_datacenter_and_check", |b| {
        b.iter(|| {
            let dc: CassandraDatacenterView = serde_json::from_value(black_box(datacenter.clone())).unwrap_or_default();
            datacenter_ready(&dc)
        });
    });

    let view: Deployment = serde_json::from_value(deployment).unwrap_or_default();
    let both = deployment_ready.and(|d: &Deployment| {
        d.status.as_ref().and_then(|s| s.available_replicas).unwrap_or(0) >= 1
    });
    c.bench_function("deployment_combined_condition", |b| {
        b.iter(|| both.matches(black_box(&view)));
    });

    c.bench_function("reaper_descriptor_build", |b| {
        b.iter(|| {
            ReaperDescriptor::builder()
                .namespace(black_box("deploy-reaper-test"))
                .name("cass-backend")
                .cluster_name("reaper-test")
                .cassandra_service("reaper-test-reaper-test-service")
                .build()
        });
    });
}

criterion_group!(benches, readiness_benchmark);
criterion_main!(benches);
