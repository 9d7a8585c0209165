// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Name-to-factory registry for transforms referenced by topology configs.

use std::collections::HashMap;

use crate::agent::Transform;
use crate::config::loader::AgentSpec;
use crate::errors::ConfigError;
use crate::transforms::{BatchSum, Filter, Map, SlidingWindow};

pub type TransformFactory<T> =
    Box<dyn Fn(&AgentSpec) -> Result<Box<dyn Transform<T>>, ConfigError> + Send + Sync>;

/// Maps the `transform:` names a topology uses onto constructors. Callers
/// register their own transforms alongside (or instead of) the built-ins.
pub struct TransformRegistry<T> {
    factories: HashMap<String, TransformFactory<T>>,
}

impl<T> TransformRegistry<T> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AgentSpec) -> Result<Box<dyn Transform<T>>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn build(&self, spec: &AgentSpec) -> Result<Box<dyn Transform<T>>, ConfigError> {
        let factory =
            self.factories
                .get(&spec.transform)
                .ok_or_else(|| ConfigError::UnknownTransform {
                    agent: spec.id.clone(),
                    transform: spec.transform.clone(),
                })?;
        factory(spec)
    }
}

impl<T> Default for TransformRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn param_f64(spec: &AgentSpec, key: &str) -> Result<f64, ConfigError> {
    spec.params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| invalid(spec, format!("missing or non-numeric param '{key}'")))
}

fn param_usize(spec: &AgentSpec, key: &str) -> Result<usize, ConfigError> {
    spec.params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| invalid(spec, format!("missing or non-integer param '{key}'")))
}

fn invalid(spec: &AgentSpec, detail: String) -> ConfigError {
    ConfigError::InvalidParams {
        agent: spec.id.clone(),
        transform: spec.transform.clone(),
        detail,
    }
}

/// The built-in `f64` transforms:
///
/// - `map_scale` with `factor`
/// - `filter_above` with `threshold`
/// - `batch_sum`
/// - `sliding_window` (sum aggregate) with `window` and `step`
pub fn builtin_registry() -> TransformRegistry<f64> {
    let mut registry = TransformRegistry::new();
    registry.register("map_scale", |spec| {
        let factor = param_f64(spec, "factor")?;
        Ok(Box::new(Map::new(move |v: f64| v * factor)))
    });
    registry.register("filter_above", |spec| {
        let threshold = param_f64(spec, "threshold")?;
        Ok(Box::new(Filter::new(move |v: &f64| *v > threshold)))
    });
    registry.register("batch_sum", |_spec| Ok(Box::new(BatchSum)));
    registry.register("sliding_window", |spec| {
        let window = param_usize(spec, "window")?;
        let step = param_usize(spec, "step")?;
        Ok(Box::new(SlidingWindow::new(window, step, |w: &[f64]| {
            w.iter().sum()
        })))
    });
    registry
}
