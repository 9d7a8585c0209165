// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Declarative topology configuration.
//!
//! A topology names streams, agents, and the transforms behind them; the
//! loader parses it, validation rejects structural faults, and
//! [`build_graph`] wires a runnable [`Graph`] through a
//! [`TransformRegistry`].

pub mod loader;
pub mod registry;
pub mod validation;

pub use loader::{AgentSpec, StreamSpec, Topology};
pub use registry::{builtin_registry, TransformFactory, TransformRegistry};
pub use validation::validate;

use crate::errors::ConfigError;
use crate::graph::{Graph, GraphBuilder};

/// Validate a topology and wire it into a graph, resolving each agent's
/// transform through the registry.
pub fn build_graph<T>(
    topology: &Topology,
    registry: &TransformRegistry<T>,
) -> Result<Graph<T>, ConfigError>
where
    T: Clone + Send + 'static,
{
    validate(topology)?;
    let mut builder = GraphBuilder::new();
    for stream in &topology.streams {
        match stream.retention {
            Some(retention) => builder.stream_with_retention(&stream.name, retention),
            None => builder.stream(&stream.name),
        };
    }
    for spec in &topology.agents {
        let transform = registry.build(spec)?;
        let inputs: Vec<&str> = spec.inputs.iter().map(String::as_str).collect();
        let outputs: Vec<&str> = spec.outputs.iter().map(String::as_str).collect();
        builder.agent(&spec.id, transform, &inputs, &outputs, spec.min_batch);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn topology_runs_end_to_end() {
        let topology = Topology::parse(
            r#"
streams:
  - name: raw
  - name: scaled
  - name: totals
agents:
  - id: scaler
    transform: map_scale
    params: { factor: 10 }
    inputs: [raw]
    outputs: [scaled]
  - id: summer
    transform: batch_sum
    inputs: [scaled]
    outputs: [totals]
"#,
        )
        .unwrap();

        let mut graph = build_graph(&topology, &builtin_registry()).unwrap();
        let raw = graph.stream("raw").unwrap();
        let totals = graph.stream("totals").unwrap();
        let sink = totals.register_reader(true);

        raw.extend([1.0f64, 2.0, 3.0]).unwrap();
        raw.close();
        let summary = graph.run().await;

        assert_eq!(summary.agents_done, 2);
        let total: f64 = totals.read_available(sink).iter().sum();
        assert_eq!(total, 60.0);
    }

    #[test]
    fn invalid_topology_fails_before_wiring() {
        let topology = Topology::parse(
            r#"
agents:
  - { id: a, transform: batch_sum, inputs: [missing], outputs: [out] }
"#,
        )
        .unwrap();
        assert!(matches!(
            build_graph(&topology, &builtin_registry()),
            Err(ConfigError::UnresolvedStream { .. })
        ));
    }
}
