// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Diagnostic and operational events are expressed as message types (struct +
//! `Display` + [`messages::StructuredLog`]) rather than magic strings at call
//! sites. Messages are organized by subsystem:
//!
//! * `messages::scheduler` - scheduler and agent lifecycle events
//! * `messages::bridge` - shared-memory and distributed bridge events
//! * `messages::stream` - stream-level conditions (cursor lag)

pub mod messages;
