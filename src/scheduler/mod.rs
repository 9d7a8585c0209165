// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Wake-driven cooperative scheduler.
//!
//! The scheduler owns a set of agents and a deduplicated FIFO work queue.
//! Streams deliver wake signals (their id) on the scheduler's wake channel;
//! each signal fans out to the agents subscribed to that stream. An agent
//! appears at most once in the queue no matter how many of its inputs
//! signalled, so a burst of wakes coalesces into a single invocation that is
//! offered all available data.
//!
//! One scheduler is one cooperative run loop: an agent invocation runs to
//! completion before the next is dispatched. For thread-parallel execution,
//! spawn several schedulers over disjoint agent subsets wired together
//! through shared streams; the stream interior serializes appends and wake
//! delivery across the boundary.
//!
//! Because the scheduler owns its agents exclusively, it is the only entity
//! that can move one out of `Idle`, which is what enforces the
//! one-invocation-in-flight invariant.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentStatus, RunOutcome};
use crate::errors::{AgentError, FaultKind, GraphFault};
use crate::observability::messages::scheduler::{
    AgentDone, AgentRemoved, SchedulerDrained, SchedulerStarted, TransformFailed,
};
use crate::observability::messages::StructuredLog;
use crate::stream::StreamId;

#[cfg(test)]
mod integration_tests;

/// Counters reported when a scheduler run loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSummary {
    /// Number of agent invocation attempts dispatched.
    pub steps: u64,
    pub agents_done: usize,
    pub agents_failed: usize,
    /// True when the loop exited because of cancellation rather than drain.
    pub cancelled: bool,
}

impl std::fmt::Display for SchedulerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} steps, {} done, {} failed{}",
            self.steps,
            self.agents_done,
            self.agents_failed,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

pub struct Scheduler<T> {
    agents: HashMap<String, Agent<T>>,
    subscriptions: HashMap<StreamId, Vec<String>>,
    subscribed_streams: HashSet<StreamId>,
    wake_tx: mpsc::UnboundedSender<StreamId>,
    wake_rx: mpsc::UnboundedReceiver<StreamId>,
    queue: VecDeque<String>,
    pending: HashSet<String>,
    fault_tx: mpsc::UnboundedSender<GraphFault>,
    cancel: CancellationToken,
    steps: u64,
    agents_done: usize,
    agents_failed: usize,
}

impl<T: Clone + Send + 'static> Scheduler<T> {
    pub fn new(fault_tx: mpsc::UnboundedSender<GraphFault>) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        Self {
            agents: HashMap::new(),
            subscriptions: HashMap::new(),
            subscribed_streams: HashSet::new(),
            wake_tx,
            wake_rx,
            queue: VecDeque::new(),
            pending: HashSet::new(),
            fault_tx,
            cancel: CancellationToken::new(),
            steps: 0,
            agents_done: 0,
            agents_failed: 0,
        }
    }

    /// A scheduler with its own fault receiver, for standalone use.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<GraphFault>) {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        (Self::new(fault_tx), fault_rx)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Add an agent, subscribing this scheduler to every input stream it
    /// reads. The agent is queued once immediately so data appended before
    /// registration is not stranded.
    pub fn add_agent(&mut self, agent: Agent<T>, input_streams: &[crate::stream::Stream<T>]) {
        let id = agent.id().to_string();
        for stream in input_streams {
            if self.subscribed_streams.insert(stream.id()) {
                stream.subscribe_wakes(self.wake_tx.clone());
            }
            self.subscriptions
                .entry(stream.id())
                .or_default()
                .push(id.clone());
        }
        self.agents.insert(id.clone(), agent);
        self.enqueue(id);
    }

    /// Explicitly wake an agent. This is how agents with no inputs run.
    pub fn kick(&mut self, agent_id: &str) {
        if self.agents.contains_key(agent_id) {
            self.enqueue(agent_id.to_string());
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn enqueue(&mut self, agent_id: String) {
        // Dedup: at most one queue entry per agent regardless of how many
        // inputs signalled.
        if self.pending.insert(agent_id.clone()) {
            self.queue.push_back(agent_id);
        }
    }

    fn fan_out(&mut self, stream_id: StreamId) {
        let Some(subscribers) = self.subscriptions.get(&stream_id) else {
            return;
        };
        for id in subscribers.clone() {
            if self.agents.contains_key(&id) {
                self.enqueue(id);
            }
        }
    }

    fn report(&self, source: &str, kind: FaultKind, detail: String, fatal: bool) {
        let _ = self.fault_tx.send(GraphFault {
            source: source.to_string(),
            kind,
            detail,
            fatal,
        });
    }

    async fn step(&mut self, agent_id: &str) {
        let Some(agent) = self.agents.get_mut(agent_id) else {
            return;
        };
        if agent.status() != AgentStatus::Idle {
            return;
        }
        self.steps += 1;
        match agent.run_once().await {
            Ok(RunOutcome::NotReady) => {}
            Ok(RunOutcome::Ran { .. }) => {
                // Source agents have no wake edges; keep re-running one
                // until an invocation emits nothing and it completes.
                if !agent.has_inputs() {
                    self.enqueue(agent_id.to_string());
                }
            }
            Ok(RunOutcome::TransformFailed(e)) => {
                let failures = agent.failures();
                TransformFailed {
                    agent_id,
                    failures,
                    detail: &e.message,
                }
                .log();
                self.report(agent_id, FaultKind::TransformFailure, e.message, false);
            }
            Ok(RunOutcome::Completed) => {
                AgentDone {
                    agent_id,
                    invocations: agent.invocations(),
                }
                .log();
                agent.close_outputs();
                self.retire(agent_id, true);
            }
            Err(err) => {
                let kind = match &err {
                    AgentError::OutputClosed { .. } => FaultKind::OutputClosed,
                    AgentError::InvalidAdvance { .. } | AgentError::StepShape { .. } => {
                        FaultKind::InvalidAdvance
                    }
                };
                let detail = err.to_string();
                AgentRemoved {
                    agent_id,
                    reason: &detail,
                }
                .log();
                self.report(agent_id, kind, detail, true);
                self.retire(agent_id, false);
            }
        }
    }

    fn retire(&mut self, agent_id: &str, done: bool) {
        if self.agents.remove(agent_id).is_some() {
            if done {
                self.agents_done += 1;
            } else {
                self.agents_failed += 1;
            }
        }
        self.pending.remove(agent_id);
    }

    /// Drive the run loop until every agent is terminal and the queue is
    /// empty, or until cancelled. Wake signals are processed in
    /// first-signalled order across agents.
    pub async fn run(&mut self) -> SchedulerSummary {
        SchedulerStarted {
            agent_count: self.agents.len(),
        }
        .log();
        let cancelled = loop {
            // Fan out every wake already delivered before dispatching, so
            // bursts coalesce instead of producing duplicate invocations.
            while let Ok(stream_id) = self.wake_rx.try_recv() {
                self.fan_out(stream_id);
            }
            if let Some(agent_id) = self.queue.pop_front() {
                self.pending.remove(&agent_id);
                self.step(&agent_id).await;
                continue;
            }
            if self.agents.is_empty() {
                break false;
            }
            let cancel = self.cancel.clone();
            tokio::select! {
                _ = cancel.cancelled() => break true,
                maybe_wake = self.wake_rx.recv() => {
                    // The scheduler holds its own sender, so the wake
                    // channel cannot close while this loop runs.
                    if let Some(stream_id) = maybe_wake {
                        self.fan_out(stream_id);
                    }
                }
            }
        };
        let summary = SchedulerSummary {
            steps: self.steps,
            agents_done: self.agents_done,
            agents_failed: self.agents_failed,
            cancelled,
        };
        SchedulerDrained {
            steps: summary.steps,
            agents_done: summary.agents_done,
            agents_failed: summary.agents_failed,
        }
        .log();
        summary
    }
}
