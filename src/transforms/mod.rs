// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Built-in transforms, plus stubs used by tests.
//!
//! These are ordinary terminating functions lifted into the [`Transform`]
//! calling convention. Anything with the same shape plugs in the same way;
//! the runtime treats them all as opaque.

use async_trait::async_trait;

use crate::agent::{Batch, Step, Transform};
use crate::errors::TransformError;

/// Applies a function to every offered element. Consumes everything.
pub struct Map<T, F> {
    f: F,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, F> Map<T, F>
where
    F: FnMut(T) -> T + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> Transform<T> for Map<T, F>
where
    T: Send + 'static,
    F: FnMut(T) -> T + Send,
{
    async fn apply(&mut self, mut inputs: Vec<Batch<T>>) -> Result<Step<T>, TransformError> {
        let batch = inputs.remove(0);
        let n = batch.values.len();
        let mapped: Vec<T> = batch.values.into_iter().map(&mut self.f).collect();
        Ok(Step {
            consumed: vec![n],
            outputs: vec![mapped],
        })
    }

    fn name(&self) -> &str {
        "map"
    }
}

/// Keeps only elements the predicate accepts. Consumes everything.
pub struct Filter<T, F> {
    pred: F,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, F> Filter<T, F>
where
    F: FnMut(&T) -> bool + Send,
{
    pub fn new(pred: F) -> Self {
        Self {
            pred,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> Transform<T> for Filter<T, F>
where
    T: Send + 'static,
    F: FnMut(&T) -> bool + Send,
{
    async fn apply(&mut self, mut inputs: Vec<Batch<T>>) -> Result<Step<T>, TransformError> {
        let batch = inputs.remove(0);
        let n = batch.values.len();
        let kept: Vec<T> = batch.values.into_iter().filter(|v| (self.pred)(v)).collect();
        Ok(Step {
            consumed: vec![n],
            outputs: vec![kept],
        })
    }

    fn name(&self) -> &str {
        "filter"
    }
}

/// Emits one element per invocation: the sum of the offered batch. Batch
/// boundaries are respected, never artificially merged or split.
pub struct BatchSum;

#[async_trait]
impl<T> Transform<T> for BatchSum
where
    T: std::iter::Sum<T> + Clone + Send + Sync + 'static,
{
    async fn apply(&mut self, inputs: Vec<Batch<T>>) -> Result<Step<T>, TransformError> {
        if inputs[0].values.is_empty() {
            return Ok(Step::hold(inputs.len(), 1));
        }
        let total: T = inputs[0].values.iter().cloned().sum();
        Ok(Step::consume_all(&inputs, vec![total]))
    }

    fn name(&self) -> &str {
        "batch_sum"
    }
}

/// Sliding window aggregation: applies `f` to each full window of `window`
/// elements, sliding by `step`. Consumes `step` per emitted window; the
/// overlap stays unconsumed and is redelivered with the next batch.
pub struct SlidingWindow<T, F> {
    window: usize,
    step: usize,
    f: F,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, F> SlidingWindow<T, F>
where
    F: FnMut(&[T]) -> T + Send,
{
    pub fn new(window: usize, step: usize, f: F) -> Self {
        Self {
            window: window.max(1),
            step: step.max(1),
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> Transform<T> for SlidingWindow<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: FnMut(&[T]) -> T + Send,
{
    async fn apply(&mut self, inputs: Vec<Batch<T>>) -> Result<Step<T>, TransformError> {
        let values = &inputs[0].values;
        let mut out = Vec::new();
        let mut consumed = 0;
        while consumed + self.window <= values.len() {
            out.push((self.f)(&values[consumed..consumed + self.window]));
            consumed += self.step;
        }
        Ok(Step {
            consumed: vec![consumed.min(values.len())],
            outputs: vec![out],
        })
    }

    fn name(&self) -> &str {
        "sliding_window"
    }
}

/// A transform that always fails, for exercising redelivery and fault
/// reporting paths.
pub struct Failing;

#[async_trait]
impl<T: Send + 'static> Transform<T> for Failing {
    async fn apply(&mut self, _inputs: Vec<Batch<T>>) -> Result<Step<T>, TransformError> {
        Err(TransformError::new("simulated transform failure"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// A transform that reports consuming one more element than it was offered,
/// for exercising the invalid-advance path.
pub struct OverConsuming;

#[async_trait]
impl<T: Send + 'static> Transform<T> for OverConsuming {
    async fn apply(&mut self, inputs: Vec<Batch<T>>) -> Result<Step<T>, TransformError> {
        Ok(Step {
            consumed: inputs.iter().map(|b| b.values.len() + 1).collect(),
            outputs: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "over_consuming"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch<T>(values: Vec<T>) -> Vec<Batch<T>> {
        vec![Batch {
            values,
            closed: false,
        }]
    }

    #[tokio::test]
    async fn map_transforms_every_element() {
        let mut map = Map::new(|v: i64| v * 10);
        let step = map.apply(batch(vec![1, 2, 3])).await.unwrap();
        assert_eq!(step.consumed, vec![3]);
        assert_eq!(step.outputs, vec![vec![10, 20, 30]]);
    }

    #[tokio::test]
    async fn sliding_window_leaves_overlap_unconsumed() {
        let mut win = SlidingWindow::new(3, 1, |w: &[i64]| w.iter().sum());
        let step = win.apply(batch(vec![1, 2, 3, 4])).await.unwrap();
        // Windows [1,2,3] and [2,3,4]; two steps consumed, overlap stays.
        assert_eq!(step.outputs, vec![vec![6, 9]]);
        assert_eq!(step.consumed, vec![2]);
    }

    #[tokio::test]
    async fn sliding_window_holds_short_batch() {
        let mut win = SlidingWindow::new(4, 4, |w: &[i64]| w.iter().sum());
        let step = win.apply(batch(vec![1, 2])).await.unwrap();
        assert_eq!(step.consumed, vec![0]);
        assert!(step.outputs[0].is_empty());
    }

    #[tokio::test]
    async fn batch_sum_respects_batch_boundaries() {
        let mut sum = BatchSum;
        let first = sum.apply(batch(vec![1i64, 2, 3])).await.unwrap();
        let second = sum.apply(batch(vec![4i64])).await.unwrap();
        assert_eq!(first.outputs, vec![vec![6]]);
        assert_eq!(second.outputs, vec![vec![4]]);
    }
}
