// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Graph wiring: builder, run handle, and teardown.
//!
//! A [`GraphBuilder`] creates named streams, binds agents to them, and
//! produces a [`Graph`] owning one scheduler. Teardown follows the
//! cooperative contract: [`GraphController::shutdown`] closes every root
//! stream (streams no agent produces), after which the scheduler drains
//! pending wakes, lets in-flight invocations finish, and exits once all
//! agents are terminal. [`GraphController::abort`] cancels the run loop and
//! any bridge or feeder tasks sharing the token without waiting for drain.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, Transform};
use crate::errors::GraphFault;
use crate::scheduler::{Scheduler, SchedulerSummary};
use crate::stream::Stream;

pub struct GraphBuilder<T> {
    scheduler: Scheduler<T>,
    fault_rx: mpsc::UnboundedReceiver<GraphFault>,
    cancel: CancellationToken,
    streams: HashMap<String, Stream<T>>,
    produced: HashSet<String>,
}

impl<T: Clone + Send + 'static> GraphBuilder<T> {
    pub fn new() -> Self {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        Self {
            scheduler: Scheduler::new(fault_tx).with_cancellation(cancel.clone()),
            fault_rx,
            cancel,
            streams: HashMap::new(),
            produced: HashSet::new(),
        }
    }

    /// Create (or fetch) a named stream.
    pub fn stream(&mut self, name: &str) -> Stream<T> {
        self.streams
            .entry(name.to_string())
            .or_insert_with(|| Stream::new(name))
            .clone()
    }

    /// Create a named stream with a retention window. Fetches the existing
    /// stream if the name is already wired.
    pub fn stream_with_retention(&mut self, name: &str, retention: usize) -> Stream<T> {
        self.streams
            .entry(name.to_string())
            .or_insert_with(|| Stream::with_retention(name, Some(retention)))
            .clone()
    }

    /// Wire in a stream owned elsewhere (typically produced by an agent in
    /// another scheduler's graph, or mirrored by a bridge). Adopted streams
    /// are never treated as roots of this graph, so `shutdown` leaves them
    /// to their real producer.
    pub fn adopt_stream(&mut self, stream: Stream<T>) -> Stream<T> {
        let name = stream.name().to_string();
        self.produced.insert(name.clone());
        self.streams.entry(name).or_insert(stream).clone()
    }

    /// Wire an agent between named streams. Output streams get this agent as
    /// their producer role, so they are closed when the agent finishes and
    /// are excluded from the root set that `shutdown` closes.
    pub fn agent(
        &mut self,
        id: &str,
        transform: Box<dyn Transform<T>>,
        inputs: &[&str],
        outputs: &[&str],
        min_batch: usize,
    ) {
        let input_streams: Vec<Stream<T>> = inputs.iter().map(|n| self.stream(n)).collect();
        let output_streams: Vec<Stream<T>> = outputs.iter().map(|n| self.stream(n)).collect();
        for name in outputs {
            self.produced.insert((*name).to_string());
        }
        let agent = Agent::new(id, transform, &input_streams, &output_streams)
            .with_min_batch(min_batch);
        self.scheduler.add_agent(agent, &input_streams);
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn build(self) -> Graph<T> {
        let roots = self
            .streams
            .iter()
            .filter(|(name, _)| !self.produced.contains(*name))
            .map(|(_, s)| s.clone())
            .collect();
        Graph {
            scheduler: self.scheduler,
            fault_rx: Some(self.fault_rx),
            cancel: self.cancel,
            streams: self.streams,
            roots,
        }
    }
}

impl<T: Clone + Send + 'static> Default for GraphBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A wired agent graph: one scheduler plus its streams and fault channel.
pub struct Graph<T> {
    scheduler: Scheduler<T>,
    fault_rx: Option<mpsc::UnboundedReceiver<GraphFault>>,
    cancel: CancellationToken,
    streams: HashMap<String, Stream<T>>,
    roots: Vec<Stream<T>>,
}

impl<T: Clone + Send + 'static> Graph<T> {
    pub fn stream(&self, name: &str) -> Option<Stream<T>> {
        self.streams.get(name).cloned()
    }

    /// Faults from agents and bridge bindings land here. Returns `None` if
    /// the receiver was already taken.
    pub fn take_faults(&mut self) -> Option<mpsc::UnboundedReceiver<GraphFault>> {
        self.fault_rx.take()
    }

    /// Handle for tearing the graph down from outside the run loop.
    pub fn controller(&self) -> GraphController<T> {
        GraphController {
            roots: self.roots.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Explicitly wake an agent with no inputs.
    pub fn kick(&mut self, agent_id: &str) {
        self.scheduler.kick(agent_id);
    }

    /// Run the scheduler to completion (all agents terminal) or
    /// cancellation.
    pub async fn run(&mut self) -> SchedulerSummary {
        self.scheduler.run().await
    }
}

/// Cloneable teardown handle.
pub struct GraphController<T> {
    roots: Vec<Stream<T>>,
    cancel: CancellationToken,
}

impl<T> Clone for GraphController<T> {
    fn clone(&self) -> Self {
        Self {
            roots: self.roots.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> GraphController<T> {
    /// Orderly teardown: close every root stream. Closure propagates through
    /// the graph as agents drain and close their own outputs; the scheduler
    /// exits once the queue is empty and all agents are terminal, within a
    /// number of steps proportional to the buffered data.
    pub fn shutdown(&self) {
        for stream in &self.roots {
            stream.close();
        }
    }

    /// Hard stop: cancel the run loop and any tasks sharing the token.
    /// In-flight invocations still run to completion before the loop exits.
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}
