// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Bridges: transports that mirror a stream's append/consume semantics
//! across a process or network boundary.
//!
//! Both bridges bind one local stream to one remote-visible channel or ring,
//! in one direction. No lock is shared across the boundary: the
//! shared-memory bridge synchronizes through an atomic write index over a
//! mapped ring, the distributed bridge through per-channel message order.
//! Binding failures are fatal for that binding only and are reported to the
//! graph fault sink as data.

pub mod broker;
pub mod codec;
pub mod distributed;
pub mod shm;

pub use broker::{Broker, ConnectionState, LoopbackBroker};
pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use distributed::{publish_stream, subscribe_stream, BackoffPolicy, PublisherOptions};
pub use shm::{shm_publish, shm_subscribe, RingConsumer, RingProducer, ShmConsumerOptions};
