// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Agents: stateful wrappers around terminating transform functions.
//!
//! An agent binds input streams (each with its own cursor) and output streams
//! around a [`Transform`]. The scheduler wakes it when an input gains data;
//! the agent offers everything available to the transform in one invocation,
//! advances each cursor by exactly the consumed count the transform reports,
//! and appends the returned values downstream.
//!
//! The transform owns its persisted state as ordinary struct fields behind
//! `&mut self`; there is no hidden shared state. A transform that raises
//! consumes nothing, so the same input is redelivered on the next wake
//! (at-least-once within the process).
//!
//! An agent with no inputs is a source: it runs when kicked, the scheduler
//! re-runs it after every invocation that emitted output, and it reaches
//! `Done` after an invocation that emits nothing.

use async_trait::async_trait;

use crate::errors::{AgentError, TransformError};
use crate::stream::{ReaderId, Stream};

/// One input's view for a single invocation: every currently unread value,
/// plus whether the producer has closed the stream.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    pub values: Vec<T>,
    pub closed: bool,
}

/// What a transform did with one invocation: per-input consumed counts and
/// per-output values to append.
#[derive(Debug, Clone)]
pub struct Step<T> {
    pub consumed: Vec<usize>,
    pub outputs: Vec<Vec<T>>,
}

impl<T> Step<T> {
    /// A step that consumes every offered value and emits one batch on a
    /// single output.
    pub fn consume_all(inputs: &[Batch<T>], output: Vec<T>) -> Self {
        Self {
            consumed: inputs.iter().map(|b| b.values.len()).collect(),
            outputs: vec![output],
        }
    }

    /// A step that consumes nothing and emits nothing, for transforms that
    /// need a larger batch before acting.
    pub fn hold(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            consumed: vec![0; num_inputs],
            outputs: (0..num_outputs).map(|_| Vec::new()).collect(),
        }
    }
}

/// The fixed calling convention at the boundary to the opaque transform
/// functions: offered batches in, consumed counts and outputs back, or an
/// error. Terminating by contract; a transform that blocks indefinitely is a
/// caller error, not something the runtime guards against.
#[async_trait]
pub trait Transform<T>: Send {
    async fn apply(&mut self, inputs: Vec<Batch<T>>) -> Result<Step<T>, TransformError>;

    fn name(&self) -> &str {
        "transform"
    }
}

/// Agent lifecycle states. The scheduler is the only entity that moves an
/// agent out of `Idle`, which enforces the one-invocation-in-flight rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Idle,
    Running,
    /// All required inputs closed and fully drained. Terminal.
    Done,
    /// Hit a fatal per-agent error. Terminal.
    Failed,
}

/// What a single scheduling step did with an agent.
#[derive(Debug)]
pub enum RunOutcome {
    /// No input met the minimum batch size; nothing was invoked.
    NotReady,
    /// The transform ran and its results were applied.
    Ran { appended: usize },
    /// The transform raised; nothing was consumed or appended.
    TransformFailed(TransformError),
    /// The agent transitioned to `Done`.
    Completed,
}

struct InputBinding<T> {
    stream: Stream<T>,
    reader: ReaderId,
}

pub struct Agent<T> {
    id: String,
    inputs: Vec<InputBinding<T>>,
    outputs: Vec<Stream<T>>,
    transform: Box<dyn Transform<T>>,
    status: AgentStatus,
    min_batch: usize,
    invocations: u64,
    failures: u64,
}

impl<T: Clone + Send + 'static> Agent<T> {
    pub fn new(
        id: impl Into<String>,
        transform: Box<dyn Transform<T>>,
        input_streams: &[Stream<T>],
        output_streams: &[Stream<T>],
    ) -> Self {
        let inputs = input_streams
            .iter()
            .map(|s| InputBinding {
                stream: s.clone(),
                reader: s.register_reader(false),
            })
            .collect();
        Self {
            id: id.into(),
            inputs,
            outputs: output_streams.to_vec(),
            transform,
            status: AgentStatus::Idle,
            min_batch: 1,
            invocations: 0,
            failures: 0,
        }
    }

    /// Eligibility policy: the agent runs only when some input offers at
    /// least this many unread values (closed inputs drain regardless).
    pub fn with_min_batch(mut self, min_batch: usize) -> Self {
        self.min_batch = min_batch.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn input_stream_ids(&self) -> impl Iterator<Item = crate::stream::StreamId> + '_ {
        self.inputs.iter().map(|b| b.stream.id())
    }

    pub fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }

    fn all_inputs_drained(&self) -> bool {
        !self.inputs.is_empty()
            && self
                .inputs
                .iter()
                .all(|b| b.stream.is_drained(b.reader))
    }

    fn eligible(&self) -> bool {
        self.inputs.iter().any(|b| {
            let available = b.stream.available(b.reader);
            available >= self.min_batch || (b.stream.is_closed() && available > 0)
        })
    }

    /// One scheduling step. Offers all available input in a single
    /// invocation; multiple wake signals before this runs coalesce into one
    /// call. Fatal conditions come back as `Err` and leave the agent
    /// `Failed`; the caller reports them and drops the agent from
    /// scheduling.
    pub async fn run_once(&mut self) -> Result<RunOutcome, AgentError> {
        debug_assert_eq!(self.status, AgentStatus::Idle);
        if self.all_inputs_drained() {
            self.status = AgentStatus::Done;
            return Ok(RunOutcome::Completed);
        }
        if !self.inputs.is_empty() && !self.eligible() {
            return Ok(RunOutcome::NotReady);
        }

        self.status = AgentStatus::Running;
        let batches: Vec<Batch<T>> = self
            .inputs
            .iter()
            .map(|b| Batch {
                values: b.stream.read_available(b.reader),
                closed: b.stream.is_closed(),
            })
            .collect();
        let offered: Vec<usize> = batches.iter().map(|b| b.values.len()).collect();

        let step = match self.transform.apply(batches).await {
            Ok(step) => step,
            Err(e) => {
                // Nothing consumed: the same data is redelivered next wake.
                self.failures += 1;
                self.status = AgentStatus::Idle;
                return Ok(RunOutcome::TransformFailed(e));
            }
        };

        if step.consumed.len() != self.inputs.len() || step.outputs.len() != self.outputs.len() {
            self.status = AgentStatus::Failed;
            return Err(AgentError::StepShape {
                agent: self.id.clone(),
                detail: format!(
                    "got {} consumed counts for {} inputs, {} output batches for {} outputs",
                    step.consumed.len(),
                    self.inputs.len(),
                    step.outputs.len(),
                    self.outputs.len()
                ),
            });
        }
        for (i, (&consumed, &offered_n)) in step.consumed.iter().zip(&offered).enumerate() {
            if consumed > offered_n {
                self.status = AgentStatus::Failed;
                return Err(AgentError::InvalidAdvance {
                    agent: self.id.clone(),
                    input: i,
                    consumed,
                    offered: offered_n,
                });
            }
        }

        for (binding, &consumed) in self.inputs.iter().zip(&step.consumed) {
            if binding.stream.advance(binding.reader, consumed).is_err() {
                // Offered counts were captured from these same cursors, so
                // this cannot happen unless the consumed check above is out
                // of sync with the stream.
                self.status = AgentStatus::Failed;
                return Err(AgentError::InvalidAdvance {
                    agent: self.id.clone(),
                    input: 0,
                    consumed,
                    offered: 0,
                });
            }
        }

        let mut appended = 0;
        for (stream, values) in self.outputs.iter().zip(step.outputs) {
            if values.is_empty() {
                continue;
            }
            appended += values.len();
            if stream.extend(values).is_err() {
                self.status = AgentStatus::Failed;
                return Err(AgentError::OutputClosed {
                    agent: self.id.clone(),
                    stream: stream.name().to_string(),
                });
            }
        }

        self.invocations += 1;
        // A source agent has no inputs to drain; it is done once an
        // invocation emits nothing.
        if self.inputs.is_empty() && appended == 0 {
            self.status = AgentStatus::Done;
            return Ok(RunOutcome::Completed);
        }
        if self.all_inputs_drained() {
            self.status = AgentStatus::Done;
            return Ok(RunOutcome::Completed);
        }
        self.status = AgentStatus::Idle;
        Ok(RunOutcome::Ran { appended })
    }

    /// Close every output stream this agent produces. Called when the agent
    /// reaches a terminal state so downstream agents can drain and finish.
    pub fn close_outputs(&self) {
        for stream in &self.outputs {
            stream.close();
        }
    }
}
