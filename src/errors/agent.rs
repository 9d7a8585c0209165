// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Failure reported by a wrapped transform function.
///
/// Transforms are opaque to the runtime, so the only payload is a message.
/// The invocation that produced it is aborted without advancing any cursor,
/// which means the same unconsumed input is redelivered on the next wake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transform failed: {message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fatal per-agent errors. One agent's fatal error removes that agent from
/// scheduling; sibling agents keep running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The transform reported consuming more than it was offered. This is a
    /// programming error in the transform, fatal to the agent.
    #[error("agent '{agent}' input {input}: consumed {consumed} but only {offered} offered")]
    InvalidAdvance {
        agent: String,
        input: usize,
        consumed: usize,
        offered: usize,
    },

    /// The transform returned the wrong number of consumed counts or output
    /// batches for the agent's bindings.
    #[error("agent '{agent}' step shape mismatch: {detail}")]
    StepShape { agent: String, detail: String },

    /// An output stream was closed underneath the agent.
    #[error("agent '{agent}' output stream '{stream}' is closed")]
    OutputClosed { agent: String, stream: String },
}
