// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

use std::path::Path;

use serde::Deserialize;

use crate::errors::ConfigError;

/// A declarative agent graph, typically loaded from YAML.
///
/// ```yaml
/// streams:
///   - name: raw
///   - name: smoothed
///     retention: 1024
/// agents:
///   - id: smoother
///     transform: sliding_window
///     params: { window: 4, step: 1 }
///     inputs: [raw]
///     outputs: [smoothed]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub streams: Vec<StreamSpec>,
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSpec {
    pub name: String,
    /// Values retained behind the slowest cursor. Unset means unbounded.
    #[serde(default)]
    pub retention: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    /// Registry name of the transform to instantiate.
    pub transform: String,
    /// Free-form parameter block handed to the transform factory.
    #[serde(default)]
    pub params: serde_yaml::Value,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default = "default_min_batch")]
    pub min_batch: usize,
}

fn default_min_batch() -> usize {
    1
}

impl Topology {
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_topology() {
        let topology = Topology::parse(
            r#"
streams:
  - name: raw
  - name: out
    retention: 16
agents:
  - id: summer
    transform: batch_sum
    inputs: [raw]
    outputs: [out]
"#,
        )
        .unwrap();
        assert_eq!(topology.streams.len(), 2);
        assert_eq!(topology.streams[1].retention, Some(16));
        let agent = &topology.agents[0];
        assert_eq!(agent.id, "summer");
        assert_eq!(agent.min_batch, 1);
        assert!(agent.params.is_null());
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(matches!(
            Topology::parse("agents: [ { id: "),
            Err(ConfigError::Parse(_))
        ));
    }
}
