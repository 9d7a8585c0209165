// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! End-to-end scheduling behavior over wired graphs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::{Agent, Batch, Step, Transform};
use crate::errors::{FaultKind, TransformError};
use crate::graph::GraphBuilder;
use crate::scheduler::Scheduler;
use crate::stream::Stream;
use crate::transforms::{BatchSum, Map, OverConsuming};

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// Records the size of every offered batch, then sums it.
struct RecordingSum {
    offered: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Transform<i64> for RecordingSum {
    async fn apply(&mut self, inputs: Vec<Batch<i64>>) -> Result<Step<i64>, TransformError> {
        self.offered
            .lock()
            .unwrap()
            .push(inputs[0].values.len());
        let total: i64 = inputs[0].values.iter().sum();
        Ok(Step::consume_all(&inputs, vec![total]))
    }
}

/// Two-input merge that records what each invocation was offered.
struct MergingSum {
    offered: Arc<Mutex<Vec<(usize, usize)>>>,
}

#[async_trait]
impl Transform<i64> for MergingSum {
    async fn apply(&mut self, inputs: Vec<Batch<i64>>) -> Result<Step<i64>, TransformError> {
        self.offered
            .lock()
            .unwrap()
            .push((inputs[0].values.len(), inputs[1].values.len()));
        let total: i64 = inputs.iter().flat_map(|b| b.values.iter()).sum();
        Ok(Step::consume_all(&inputs, vec![total]))
    }
}

/// A source: emits one queued batch per invocation, then nothing.
struct EmitSeries {
    remaining: Vec<Vec<i64>>,
}

#[async_trait]
impl Transform<i64> for EmitSeries {
    async fn apply(&mut self, _inputs: Vec<Batch<i64>>) -> Result<Step<i64>, TransformError> {
        let outputs = if self.remaining.is_empty() {
            Vec::new()
        } else {
            self.remaining.remove(0)
        };
        Ok(Step {
            consumed: Vec::new(),
            outputs: vec![outputs],
        })
    }
}

/// Fails on the first invocation, sums afterwards.
struct FlakySum {
    attempts: u32,
}

#[async_trait]
impl Transform<i64> for FlakySum {
    async fn apply(&mut self, inputs: Vec<Batch<i64>>) -> Result<Step<i64>, TransformError> {
        self.attempts += 1;
        if self.attempts == 1 {
            return Err(TransformError::new("first attempt fails"));
        }
        let total: i64 = inputs[0].values.iter().sum();
        Ok(Step::consume_all(&inputs, vec![total]))
    }
}

#[tokio::test]
async fn batch_boundaries_are_respected() {
    let mut builder = GraphBuilder::new();
    let input = builder.stream("in");
    let output = builder.stream("out");
    builder.agent("summer", Box::new(BatchSum), &["in"], &["out"], 1);
    let mut graph = builder.build();
    let sink = output.register_reader(true);

    let handle = tokio::spawn(async move { graph.run().await });

    input.extend([1i64, 2, 3]).unwrap();
    // Let the first batch be consumed before offering the second, so the
    // two feeds stay separate invocations.
    wait_until(|| output.write_index() == 1).await;
    input.append(4).unwrap();
    input.close();

    let summary = handle.await.unwrap();
    assert_eq!(output.read_available(sink), vec![6, 4]);
    assert_eq!(summary.agents_done, 1);
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn coalesced_wakes_produce_one_invocation() {
    let offered = Arc::new(Mutex::new(Vec::new()));
    let (mut scheduler, _faults) = Scheduler::detached();
    let input: Stream<i64> = Stream::new("in");
    let output: Stream<i64> = Stream::new("out");
    let sink = output.register_reader(true);
    let agent = Agent::new(
        "summer",
        Box::new(RecordingSum {
            offered: Arc::clone(&offered),
        }),
        &[input.clone()],
        &[output.clone()],
    );
    scheduler.add_agent(agent, &[input.clone()]);

    // Two wake signals before the scheduler runs at all.
    input.append(1).unwrap();
    input.append(2).unwrap();
    input.close();

    scheduler.run().await;

    // One invocation consumed everything; the wakes were coalesced.
    assert_eq!(*offered.lock().unwrap(), vec![2]);
    assert_eq!(output.read_available(sink), vec![3]);
}

#[tokio::test]
async fn multi_input_wakes_coalesce_to_one_invocation() {
    let offered = Arc::new(Mutex::new(Vec::new()));
    let mut builder = GraphBuilder::new();
    let left = builder.stream("left");
    let right = builder.stream("right");
    let merged = builder.stream("merged");
    builder.agent(
        "merger",
        Box::new(MergingSum {
            offered: Arc::clone(&offered),
        }),
        &["left", "right"],
        &["merged"],
        1,
    );
    let mut graph = builder.build();
    let sink = merged.register_reader(true);

    // Both inputs gain data before the scheduler runs; the wake signals
    // from each must collapse into a single invocation over both batches.
    left.extend([1i64, 2]).unwrap();
    right.append(3).unwrap();
    left.close();
    right.close();
    let summary = graph.run().await;

    assert_eq!(*offered.lock().unwrap(), vec![(2, 1)]);
    assert_eq!(merged.read_available(sink), vec![6]);
    assert_eq!(summary.agents_done, 1);
}

#[tokio::test]
async fn no_input_source_runs_to_done() {
    let mut builder = GraphBuilder::new();
    let output = builder.stream("out");
    builder.agent(
        "source",
        Box::new(EmitSeries {
            remaining: vec![vec![1, 2], vec![3]],
        }),
        &[],
        &["out"],
        1,
    );
    let mut graph = builder.build();
    let sink = output.register_reader(true);

    // Must terminate without any external wake: the source re-runs until
    // it emits nothing, then the graph drains.
    let summary = tokio::time::timeout(Duration::from_secs(5), graph.run())
        .await
        .expect("graph with a source agent failed to terminate");

    assert_eq!(summary.agents_done, 1);
    assert!(output.is_closed());
    assert_eq!(output.read_available(sink), vec![1, 2, 3]);
}

#[tokio::test]
async fn teardown_drains_pipeline_to_done() {
    let mut builder = GraphBuilder::new();
    let input = builder.stream("raw");
    let output = builder.stream("totals");
    builder.agent(
        "doubler",
        Box::new(Map::new(|v: i64| v * 2)),
        &["raw"],
        &["doubled"],
        1,
    );
    builder.agent("summer", Box::new(BatchSum), &["doubled"], &["totals"], 1);
    let mut graph = builder.build();
    let controller = graph.controller();
    let sink = output.register_reader(true);

    let handle = tokio::spawn(async move { graph.run().await });

    input.extend([1i64, 2, 3]).unwrap();
    controller.shutdown();

    let summary = handle.await.unwrap();
    assert_eq!(summary.agents_done, 2);
    assert_eq!(summary.agents_failed, 0);
    assert!(!summary.cancelled);
    let total: i64 = output.read_available(sink).iter().sum();
    assert_eq!(total, 12);
    assert!(output.is_closed());
}

#[tokio::test]
async fn transform_failure_redelivers_same_input() {
    let mut builder = GraphBuilder::new();
    let input = builder.stream("in");
    let output = builder.stream("out");
    builder.agent(
        "flaky",
        Box::new(FlakySum { attempts: 0 }),
        &["in"],
        &["out"],
        1,
    );
    let mut graph = builder.build();
    let mut faults = graph.take_faults().unwrap();
    let sink = output.register_reader(true);

    let handle = tokio::spawn(async move { graph.run().await });

    input.extend([1i64, 2]).unwrap();
    let fault = faults.recv().await.unwrap();
    assert_eq!(fault.kind, FaultKind::TransformFailure);
    assert!(!fault.fatal);

    // The close wakes the agent again; the retry sees the same unconsumed
    // batch and succeeds.
    input.close();
    let summary = handle.await.unwrap();
    assert_eq!(output.read_available(sink), vec![3]);
    assert_eq!(summary.agents_done, 1);
}

#[tokio::test]
async fn fatal_agent_fault_is_isolated_from_siblings() {
    let mut builder = GraphBuilder::new();
    let input = builder.stream("in");
    let output = builder.stream("out");
    builder.agent("greedy", Box::new(OverConsuming), &["in"], &[], 1);
    builder.agent("summer", Box::new(BatchSum), &["in"], &["out"], 1);
    let mut graph = builder.build();
    let mut faults = graph.take_faults().unwrap();
    let sink = output.register_reader(true);

    input.extend([1i64, 2, 3]).unwrap();
    input.close();
    let summary = graph.run().await;

    assert_eq!(summary.agents_done, 1);
    assert_eq!(summary.agents_failed, 1);
    let fault = faults.recv().await.unwrap();
    assert_eq!(fault.source, "greedy");
    assert_eq!(fault.kind, FaultKind::InvalidAdvance);
    assert!(fault.fatal);
    // The sibling agent still consumed everything.
    assert_eq!(output.read_available(sink), vec![6]);
}

#[tokio::test]
async fn two_schedulers_share_a_stream_across_tasks() {
    // Upstream graph: doubles raw values onto the shared stream.
    let mut upstream = GraphBuilder::new();
    let raw = upstream.stream("raw");
    let shared = upstream.stream("shared");
    upstream.agent(
        "doubler",
        Box::new(Map::new(|v: i64| v * 2)),
        &["raw"],
        &["shared"],
        1,
    );
    let mut upstream_graph = upstream.build();

    // Downstream graph in its own scheduler, adopting the shared stream.
    let mut downstream = GraphBuilder::new();
    downstream.adopt_stream(shared.clone());
    let collected = downstream.stream("collected");
    downstream.agent(
        "relay",
        Box::new(Map::new(|v: i64| v)),
        &["shared"],
        &["collected"],
        1,
    );
    let mut downstream_graph = downstream.build();
    let sink = collected.register_reader(true);

    let up = tokio::spawn(async move { upstream_graph.run().await });
    let down = tokio::spawn(async move { downstream_graph.run().await });

    for v in 1..=50i64 {
        raw.append(v).unwrap();
    }
    raw.close();

    let up_summary = up.await.unwrap();
    let down_summary = down.await.unwrap();
    assert_eq!(up_summary.agents_done, 1);
    assert_eq!(down_summary.agents_done, 1);

    // Appends serialize through the stream, so order is preserved end to
    // end even across scheduler tasks.
    let values = collected.read_available(sink);
    let expected: Vec<i64> = (1..=50).map(|v| v * 2).collect();
    assert_eq!(values, expected);
}
