// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Message types for shared-memory and distributed bridge events.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::observability::messages::StructuredLog;

/// A publisher binding lost its transport and is retrying with backoff.
pub struct PublisherReconnecting<'a> {
    pub channel: &'a str,
    pub attempt: u32,
    pub delay: Duration,
    pub queued: usize,
}

impl Display for PublisherReconnecting<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Publisher for '{}' reconnecting (attempt {}, next delay {:?}, {} queued)",
            self.channel, self.attempt, self.delay, self.queued
        )
    }
}

impl StructuredLog for PublisherReconnecting<'_> {
    fn log(&self) {
        tracing::warn!(
            channel = self.channel,
            attempt = self.attempt,
            delay_ms = self.delay.as_millis() as u64,
            queued = self.queued,
            "{}",
            self
        );
    }
}

/// A publisher binding exhausted its bounded disconnect queue. Fatal for
/// that binding.
pub struct PublisherQueueExhausted<'a> {
    pub channel: &'a str,
    pub bound: usize,
}

impl Display for PublisherQueueExhausted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Publisher for '{}' exhausted its disconnect queue (bound {})",
            self.channel, self.bound
        )
    }
}

impl StructuredLog for PublisherQueueExhausted<'_> {
    fn log(&self) {
        tracing::error!(channel = self.channel, bound = self.bound, "{}", self);
    }
}

/// A shared-memory consumer fell behind the ring by more than its capacity.
/// Fatal for that consumer binding.
pub struct ConsumerOverrun<'a> {
    pub binding: &'a str,
    pub behind: u64,
    pub capacity: u64,
}

impl Display for ConsumerOverrun<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Shared-memory consumer '{}' overrun: {} behind, ring capacity {}",
            self.binding, self.behind, self.capacity
        )
    }
}

impl StructuredLog for ConsumerOverrun<'_> {
    fn log(&self) {
        tracing::error!(
            binding = self.binding,
            behind = self.behind,
            capacity = self.capacity,
            "{}",
            self
        );
    }
}

/// A subscriber binding closed its mirror stream after the channel ended.
pub struct MirrorClosed<'a> {
    pub channel: &'a str,
    pub delivered: u64,
}

impl Display for MirrorClosed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Mirror for '{}' closed after {} messages",
            self.channel, self.delivered
        )
    }
}

impl StructuredLog for MirrorClosed<'_> {
    fn log(&self) {
        tracing::info!(channel = self.channel, delivered = self.delivered, "{}", self);
    }
}
