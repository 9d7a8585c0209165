// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

mod agent;
mod bridge;
mod config;
mod fault;
mod stream;

pub use agent::{AgentError, TransformError};
pub use bridge::{BridgeError, BrokerError, CodecError};
pub use config::ConfigError;
pub use fault::{FaultKind, GraphFault};
pub use stream::StreamError;
