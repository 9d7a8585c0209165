// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Structural validation of a loaded topology, before any stream or agent
//! is constructed.

use std::collections::{HashMap, HashSet};

use crate::config::loader::Topology;
use crate::errors::ConfigError;

/// Check a topology for structural faults. Cycles are allowed; feedback
/// loops are a legitimate wiring. What is rejected: duplicate ids and
/// names, two producer roles on one stream, and reads from a stream that
/// nothing declares or produces.
pub fn validate(topology: &Topology) -> Result<(), ConfigError> {
    let mut stream_names = HashSet::new();
    for stream in &topology.streams {
        if !stream_names.insert(stream.name.as_str()) {
            return Err(ConfigError::DuplicateStream {
                stream: stream.name.clone(),
            });
        }
    }

    let mut agent_ids = HashSet::new();
    let mut producers: HashMap<&str, Vec<&str>> = HashMap::new();
    for agent in &topology.agents {
        if !agent_ids.insert(agent.id.as_str()) {
            return Err(ConfigError::DuplicateAgentId {
                agent: agent.id.clone(),
            });
        }
        for output in &agent.outputs {
            producers.entry(output).or_default().push(&agent.id);
        }
    }

    for (stream, who) in &producers {
        if who.len() > 1 {
            return Err(ConfigError::ProducerConflict {
                stream: (*stream).to_string(),
                producers: who.iter().map(|p| (*p).to_string()).collect(),
            });
        }
    }

    // An input resolves if some declaration or some agent output names it.
    for agent in &topology.agents {
        for input in &agent.inputs {
            if !stream_names.contains(input.as_str()) && !producers.contains_key(input.as_str()) {
                return Err(ConfigError::UnresolvedStream {
                    agent: agent.id.clone(),
                    stream: input.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Topology {
        Topology::parse(yaml).unwrap()
    }

    #[test]
    fn accepts_a_cycle() {
        let topology = parse(
            r#"
streams: [ { name: seed } ]
agents:
  - { id: a, transform: map_scale, inputs: [seed, fed_back], outputs: [fwd] }
  - { id: b, transform: map_scale, inputs: [fwd], outputs: [fed_back] }
"#,
        );
        assert!(validate(&topology).is_ok());
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let topology = parse(
            r#"
streams: [ { name: raw } ]
agents:
  - { id: a, transform: batch_sum, inputs: [raw], outputs: [x] }
  - { id: a, transform: batch_sum, inputs: [raw], outputs: [y] }
"#,
        );
        assert!(matches!(
            validate(&topology),
            Err(ConfigError::DuplicateAgentId { agent }) if agent == "a"
        ));
    }

    #[test]
    fn rejects_two_producers_for_one_stream() {
        let topology = parse(
            r#"
streams: [ { name: raw } ]
agents:
  - { id: a, transform: batch_sum, inputs: [raw], outputs: [shared] }
  - { id: b, transform: batch_sum, inputs: [raw], outputs: [shared] }
"#,
        );
        assert!(matches!(
            validate(&topology),
            Err(ConfigError::ProducerConflict { stream, .. }) if stream == "shared"
        ));
    }

    #[test]
    fn rejects_reads_from_nowhere() {
        let topology = parse(
            r#"
agents:
  - { id: a, transform: batch_sum, inputs: [ghost], outputs: [out] }
"#,
        );
        assert!(matches!(
            validate(&topology),
            Err(ConfigError::UnresolvedStream { stream, .. }) if stream == "ghost"
        ));
    }
}
