// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::stream::StreamId;

/// Errors raised by stream read/write operations.
///
/// `InsufficientData` is recoverable: the caller waits for the next wake
/// signal. It is handled inside the scheduler and never surfaced past it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A reader asked for more elements than are currently available.
    #[error("insufficient data: requested {requested}, available {available}")]
    InsufficientData { requested: usize, available: usize },

    /// A cursor advance would move past the write index.
    #[error("invalid advance: requested {requested}, available {available}")]
    InvalidAdvance { requested: usize, available: usize },

    /// The producer role has closed the stream; no further appends.
    #[error("stream is closed")]
    Closed,

    /// A reader asked for history that the retention window already discarded.
    #[error("history discarded: index {index} is below retained base {base}")]
    HistoryDiscarded { index: u64, base: u64 },

    /// A reader id issued by one stream was used on another.
    #[error("reader issued by stream {issuer} used on stream {stream}")]
    ForeignReader { issuer: StreamId, stream: StreamId },
}
