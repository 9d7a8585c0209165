// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Message types for stream-level conditions.

use std::fmt::{Display, Formatter};

use crate::observability::messages::StructuredLog;

/// A reader cursor has fallen behind the write index past the configured
/// threshold. Emitted once per stream; growth stays bounded only when a
/// retention window is configured.
pub struct CursorLagging<'a> {
    pub stream: &'a str,
    pub reader_slot: usize,
    pub lag: u64,
    pub threshold: u64,
}

impl Display for CursorLagging<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream '{}' reader {} is {} elements behind (threshold {})",
            self.stream, self.reader_slot, self.lag, self.threshold
        )
    }
}

impl StructuredLog for CursorLagging<'_> {
    fn log(&self) {
        tracing::warn!(
            stream = self.stream,
            reader_slot = self.reader_slot,
            lag = self.lag,
            threshold = self.threshold,
            "{}",
            self
        );
    }
}
