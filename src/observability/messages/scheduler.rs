// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Message types for scheduler and agent lifecycle events.

use std::fmt::{Display, Formatter};

use crate::observability::messages::StructuredLog;

/// Scheduler run loop started.
pub struct SchedulerStarted {
    pub agent_count: usize,
}

impl Display for SchedulerStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scheduler started with {} agents",
            self.agent_count
        )
    }
}

impl StructuredLog for SchedulerStarted {
    fn log(&self) {
        tracing::info!(agent_count = self.agent_count, "{}", self);
    }
}

/// Scheduler drained: work queue empty, all feeders closed, all agents
/// terminal.
pub struct SchedulerDrained {
    pub steps: u64,
    pub agents_done: usize,
    pub agents_failed: usize,
}

impl Display for SchedulerDrained {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scheduler drained after {} steps: {} done, {} failed",
            self.steps, self.agents_done, self.agents_failed
        )
    }
}

impl StructuredLog for SchedulerDrained {
    fn log(&self) {
        tracing::info!(
            steps = self.steps,
            agents_done = self.agents_done,
            agents_failed = self.agents_failed,
            "{}",
            self
        );
    }
}

/// An agent reached its terminal `DONE` state (all inputs closed and
/// drained) and was removed from future scheduling.
pub struct AgentDone<'a> {
    pub agent_id: &'a str,
    pub invocations: u64,
}

impl Display for AgentDone<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Agent '{}' done after {} invocations",
            self.agent_id, self.invocations
        )
    }
}

impl StructuredLog for AgentDone<'_> {
    fn log(&self) {
        tracing::info!(
            agent_id = self.agent_id,
            invocations = self.invocations,
            "{}",
            self
        );
    }
}

/// A transform raised. The invocation was aborted without consuming input;
/// the same data is redelivered on the next wake.
pub struct TransformFailed<'a> {
    pub agent_id: &'a str,
    pub failures: u64,
    pub detail: &'a str,
}

impl Display for TransformFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Agent '{}' transform failed ({} so far): {}",
            self.agent_id, self.failures, self.detail
        )
    }
}

impl StructuredLog for TransformFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            agent_id = self.agent_id,
            failures = self.failures,
            detail = self.detail,
            "{}",
            self
        );
    }
}

/// An agent hit a fatal condition and was removed from scheduling. Sibling
/// agents keep running.
pub struct AgentRemoved<'a> {
    pub agent_id: &'a str,
    pub reason: &'a str,
}

impl Display for AgentRemoved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Agent '{}' removed from scheduling: {}",
            self.agent_id, self.reason
        )
    }
}

impl StructuredLog for AgentRemoved<'_> {
    fn log(&self) {
        tracing::error!(agent_id = self.agent_id, reason = self.reason, "{}", self);
    }
}
