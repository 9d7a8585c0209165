// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

use std::fmt;

/// Classification of a fault delivered to the graph error sink.
///
/// Everything here is plain data. Cross-boundary failures (thread, process,
/// network) degrade to one of these kinds before they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A transform raised; input was not consumed and will be redelivered.
    TransformFailure,
    /// A transform reported an impossible consumed count. Fatal per-agent.
    InvalidAdvance,
    /// A shared-memory consumer fell behind ring capacity. Fatal per-binding.
    Overrun,
    /// A distributed binding exhausted its disconnect queue. Fatal per-binding.
    TransportUnavailable,
    /// A bridge could not encode or decode a value. Fatal per-binding.
    Codec,
    /// An agent tried to append to a closed output stream.
    OutputClosed,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::TransformFailure => "transform_failure",
            FaultKind::InvalidAdvance => "invalid_advance",
            FaultKind::Overrun => "overrun",
            FaultKind::TransportUnavailable => "transport_unavailable",
            FaultKind::Codec => "codec",
            FaultKind::OutputClosed => "output_closed",
        };
        f.write_str(name)
    }
}

/// A failure report observed at graph level.
///
/// Per-agent and per-bridge failures are isolated: the source keeps its
/// siblings running, but every fault lands here so an operator can observe
/// and restart affected bindings.
#[derive(Debug, Clone)]
pub struct GraphFault {
    /// Agent id or bridge binding label that produced the fault.
    pub source: String,
    pub kind: FaultKind,
    pub detail: String,
    /// True when the source has been removed from further scheduling.
    pub fatal: bool,
}

impl fmt::Display for GraphFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}{}",
            self.kind,
            self.source,
            self.detail,
            if self.fatal { " (fatal)" } else { "" }
        )
    }
}
