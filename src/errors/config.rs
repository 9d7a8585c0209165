// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors that can occur while loading or validating a topology config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read topology file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse topology: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Two agents declare the same id.
    #[error("duplicate agent id: '{agent}'")]
    DuplicateAgentId { agent: String },

    /// Two streams declare the same name.
    #[error("duplicate stream name: '{stream}'")]
    DuplicateStream { stream: String },

    /// An agent reads from a stream that no declaration produces.
    #[error("agent '{agent}' reads from undeclared stream '{stream}'")]
    UnresolvedStream { agent: String, stream: String },

    /// More than one producer role writes to the same stream.
    #[error("stream '{stream}' has more than one producer: {producers:?}")]
    ProducerConflict {
        stream: String,
        producers: Vec<String>,
    },

    /// The transform registry has no factory under this name.
    #[error("agent '{agent}' names unknown transform '{transform}'")]
    UnknownTransform { agent: String, transform: String },

    /// A transform factory rejected its params block.
    #[error("agent '{agent}': invalid params for transform '{transform}': {detail}")]
    InvalidParams {
        agent: String,
        transform: String,
        detail: String,
    },
}
