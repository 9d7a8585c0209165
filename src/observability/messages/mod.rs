// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for human-readable output and
//! [`StructuredLog`] to emit the same event with structured fields through
//! `tracing`.

pub mod bridge;
pub mod scheduler;
pub mod stream;

/// Emit a message as a structured tracing event at its natural level.
pub trait StructuredLog {
    fn log(&self);
}
