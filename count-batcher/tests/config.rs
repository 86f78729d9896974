// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use assert2::{check, let_assert};
use count_batcher::{Backpressure, BatcherBuilder, BatcherConfig, ConfigError, Count, RejectReason};
use count_batcher_core::test_util::TestSubmitter;

#[test]
fn empty_object_uses_defaults() {
    let config: BatcherConfig = serde_json::from_str("{}").unwrap();
    check!(config == BatcherConfig::default());
    check!(config.batch_size == 500);
    check!(config.backpressure == Backpressure::Block);
}

#[test]
fn reads_every_field() {
    let config: BatcherConfig = serde_json::from_str(
        r#"{
            "queue_capacity": 128,
            "batch_size": 0,
            "backpressure": "reject",
            "max_in_flight": 8,
            "submit_timeout_ms": 250,
            "shutdown_timeout_ms": 1000,
            "thread_name": "counters",
            "name": "api-counters"
        }"#,
    )
    .unwrap();

    check!(config.queue_capacity == 128);
    check!(config.batch_size == 0);
    check!(config.backpressure == Backpressure::Reject);
    check!(config.max_in_flight == 8);
    check!(config.submit_timeout_ms == 250);
    check!(config.shutdown_timeout_ms == 1000);
    check!(config.thread_name == "counters");
    check!(config.name.as_deref() == Some("api-counters"));
}

#[test]
fn unknown_fields_are_errors() {
    let_assert!(Err(err) = serde_json::from_str::<BatcherConfig>(r#"{"batch_sise": 10}"#));
    check!(err.to_string().contains("batch_sise"));
    check!(serde_json::from_str::<BatcherConfig>(r#"{"backpressure": "drop"}"#).is_err());
}

#[test]
fn invalid_settings_fail_before_building() {
    let config: BatcherConfig = serde_json::from_str(r#"{"queue_capacity": 0}"#).unwrap();
    let_assert!(Err(ConfigError::ZeroQueueCapacity) = BatcherBuilder::from_config(&config));
}

#[test]
fn configured_batcher_runs() {
    let config: BatcherConfig =
        serde_json::from_str(r#"{"batch_size": 2, "name": "configured"}"#).unwrap();
    let submitter = TestSubmitter::new();
    let batcher = BatcherBuilder::from_config(&config)
        .unwrap()
        .start(submitter.clone())
        .unwrap();
    check!(batcher.name() == "configured");

    batcher.submit(Count::new("a", 1)).unwrap();
    batcher.submit(Count::new("a", 1)).unwrap();
    batcher.stop();
    check!(batcher.submission_count() == 1);

    let_assert!(Err(rejected) = batcher.submit(Count::increment("a")));
    check!(rejected.reason() == RejectReason::NotRunning);
}

#[test]
fn batches_serialize_as_maps() {
    let batch: count_batcher::Batch = [Count::new("a", 2), Count::new("b", -1), Count::new("a", 1)]
        .into_iter()
        .collect();
    let value = serde_json::to_value(&batch).unwrap();
    check!(value["entries"]["a"] == 3);
    check!(value["entries"]["b"] == -1);
    check!(value["local_call_count"] == 3);
}
