// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Errors for the shared-memory and distributed bridges.
//!
//! Bridge failures are fatal for the affected binding only. They are carried
//! as data to the graph error sink; no live error object crosses a process or
//! network boundary.

use thiserror::Error;

/// Errors surfaced by a message-broker client behind the `Broker` trait.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The transport is currently unavailable; delivery is suspended.
    #[error("broker disconnected")]
    Disconnected,

    /// The broker connection has been closed for good.
    #[error("broker closed")]
    Closed,

    /// The named channel does not exist or cannot be used.
    #[error("broker channel '{channel}' unavailable: {detail}")]
    Channel { channel: String, detail: String },
}

/// Errors from encoding or decoding a value at a bridge boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("codec error: {detail}")]
pub struct CodecError {
    pub detail: String,
}

impl CodecError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Errors raised by bridge bindings.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A shared-memory consumer fell behind the ring by more than its
    /// capacity. Data loss is not silently tolerated.
    #[error("consumer overrun: {behind} elements behind a ring of capacity {capacity}")]
    Overrun { behind: u64, capacity: u64 },

    /// A serialized value does not fit in one ring slot.
    #[error("encoded value of {len} bytes exceeds slot size {slot_size}")]
    SlotOverflow { len: usize, slot_size: usize },

    /// The mapped region does not carry a valid ring header.
    #[error("invalid ring header in '{path}': {detail}")]
    InvalidHeader { path: String, detail: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
