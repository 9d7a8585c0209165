// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Shared-memory bridge: a single-producer ring over a mapped file.
//!
//! The ring is a fixed number of fixed-size slots behind a 64-byte header.
//! No lock crosses the process boundary: the producer writes a slot's
//! payload first and publishes it by storing the write index with release
//! ordering; consumers load the index with acquire ordering, copy the slot,
//! then re-check the index to detect a torn read. A consumer that falls more
//! than one ring capacity behind has lost data, which is a fatal fault for
//! that binding rather than a silent gap.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memmap2::{Mmap, MmapMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::codec::Codec;
use crate::errors::{BridgeError, FaultKind, GraphFault};
use crate::observability::messages::bridge::{ConsumerOverrun, MirrorClosed};
use crate::observability::messages::StructuredLog;
use crate::stream::Stream;

const MAGIC: u64 = u64::from_le_bytes(*b"RILLSHM1");
const VERSION: u64 = 1;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 8;
const OFF_CAPACITY: usize = 16;
const OFF_SLOT_SIZE: usize = 24;
const OFF_WRITE_INDEX: usize = 32;
const OFF_CLOSED: usize = 40;
const HEADER_LEN: usize = 64;

/// Bytes per slot on disk: a length prefix plus the payload area.
fn slot_stride(slot_size: usize) -> usize {
    8 + slot_size
}

fn read_u64(map: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&map[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn write_u64(map: &mut [u8], offset: usize, value: u64) {
    map[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

// The header offsets are 8-aligned and the mapping is page-aligned, so the
// cast to AtomicU64 is sound.
fn atomic_at(map: &[u8], offset: usize) -> &AtomicU64 {
    unsafe { &*(map.as_ptr().add(offset) as *const AtomicU64) }
}

/// The producer side of a mapped ring. Exactly one producer per ring.
pub struct RingProducer {
    map: MmapMut,
    capacity: u64,
    slot_size: usize,
}

impl RingProducer {
    /// Create (or truncate) the ring file with `capacity` slots of
    /// `slot_size` payload bytes each.
    pub fn create(
        path: impl AsRef<Path>,
        capacity: u64,
        slot_size: usize,
    ) -> Result<Self, BridgeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let total = HEADER_LEN as u64 + capacity * slot_stride(slot_size) as u64;
        file.set_len(total)?;
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        write_u64(&mut map, OFF_MAGIC, MAGIC);
        write_u64(&mut map, OFF_VERSION, VERSION);
        write_u64(&mut map, OFF_CAPACITY, capacity);
        write_u64(&mut map, OFF_SLOT_SIZE, slot_size as u64);
        write_u64(&mut map, OFF_WRITE_INDEX, 0);
        write_u64(&mut map, OFF_CLOSED, 0);
        Ok(Self {
            map,
            capacity,
            slot_size,
        })
    }

    pub fn write_index(&self) -> u64 {
        atomic_at(&self.map, OFF_WRITE_INDEX).load(Ordering::Relaxed)
    }

    /// Append one encoded value. The payload lands in its slot before the
    /// write index is published, so consumers never observe a half-written
    /// current slot.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        if bytes.len() > self.slot_size {
            return Err(BridgeError::SlotOverflow {
                len: bytes.len(),
                slot_size: self.slot_size,
            });
        }
        let index = self.write_index();
        let stride = slot_stride(self.slot_size);
        let slot = HEADER_LEN + (index % self.capacity) as usize * stride;
        write_u64(&mut self.map, slot, bytes.len() as u64);
        self.map[slot + 8..slot + 8 + bytes.len()].copy_from_slice(bytes);
        atomic_at(&self.map, OFF_WRITE_INDEX).store(index + 1, Ordering::Release);
        Ok(())
    }

    /// Mark the ring closed. Consumers drain what remains, then stop.
    pub fn close(&mut self) {
        atomic_at(&self.map, OFF_CLOSED).store(1, Ordering::Release);
    }
}

/// The consumer side of a mapped ring. Holds its own position; any number of
/// consumers may read the same ring independently.
pub struct RingConsumer {
    map: Mmap,
    capacity: u64,
    slot_size: usize,
    position: u64,
}

impl RingConsumer {
    /// Map an existing ring read-only. `from_start` begins at index 0 (valid
    /// only while the producer has not wrapped); otherwise consumption starts
    /// at the current write index.
    pub fn open(path: impl AsRef<Path>, from_start: bool) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        if map.len() < HEADER_LEN {
            return Err(BridgeError::InvalidHeader {
                path: path.display().to_string(),
                detail: format!("file is {} bytes, header needs {HEADER_LEN}", map.len()),
            });
        }
        if read_u64(&map, OFF_MAGIC) != MAGIC {
            return Err(BridgeError::InvalidHeader {
                path: path.display().to_string(),
                detail: "bad magic".to_string(),
            });
        }
        let version = read_u64(&map, OFF_VERSION);
        if version != VERSION {
            return Err(BridgeError::InvalidHeader {
                path: path.display().to_string(),
                detail: format!("unsupported version {version}"),
            });
        }
        let capacity = read_u64(&map, OFF_CAPACITY);
        let slot_size = read_u64(&map, OFF_SLOT_SIZE) as usize;
        let position = if from_start {
            0
        } else {
            atomic_at(&map, OFF_WRITE_INDEX).load(Ordering::Acquire)
        };
        Ok(Self {
            map,
            capacity,
            slot_size,
            position,
        })
    }

    fn write_index(&self) -> u64 {
        atomic_at(&self.map, OFF_WRITE_INDEX).load(Ordering::Acquire)
    }

    /// Unread element count for this consumer.
    pub fn lag(&self) -> u64 {
        self.write_index() - self.position
    }

    /// True when the producer has closed the ring and this consumer has
    /// caught up.
    pub fn is_drained(&self) -> bool {
        atomic_at(&self.map, OFF_CLOSED).load(Ordering::Acquire) == 1
            && self.position == self.write_index()
    }

    /// Copy out the next value, or `None` when caught up. Falling more than
    /// one ring capacity behind means the slot has been overwritten; that is
    /// an overrun, not a silently skipped value.
    pub fn try_next(&mut self) -> Result<Option<Vec<u8>>, BridgeError> {
        let write_index = self.write_index();
        if self.position == write_index {
            return Ok(None);
        }
        let behind = write_index - self.position;
        if behind > self.capacity {
            return Err(BridgeError::Overrun {
                behind,
                capacity: self.capacity,
            });
        }
        let stride = slot_stride(self.slot_size);
        let slot = HEADER_LEN + (self.position % self.capacity) as usize * stride;
        let len = read_u64(&self.map, slot) as usize;
        if len > self.slot_size {
            return Err(BridgeError::InvalidHeader {
                path: String::new(),
                detail: format!("slot length {len} exceeds slot size {}", self.slot_size),
            });
        }
        let bytes = self.map[slot + 8..slot + 8 + len].to_vec();
        // The producer may have lapped us mid-copy; re-check before trusting
        // the bytes.
        let after = self.write_index();
        if after - self.position > self.capacity {
            return Err(BridgeError::Overrun {
                behind: after - self.position,
                capacity: self.capacity,
            });
        }
        self.position += 1;
        Ok(Some(bytes))
    }
}

/// Options for the polling consumer task.
#[derive(Debug, Clone)]
pub struct ShmConsumerOptions {
    /// Sleep between polls when the ring is empty.
    pub poll_interval: Duration,
}

impl Default for ShmConsumerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Bind a stream to a ring as its producer. The task forwards every value in
/// append order and closes the ring when the stream drains.
pub fn shm_publish<T>(
    stream: Stream<T>,
    mut producer: RingProducer,
    codec: Arc<dyn Codec<T>>,
    fault_tx: mpsc::UnboundedSender<GraphFault>,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let binding = format!("shm-publish:{}", stream.name());
        let reader = stream.register_reader(true);
        let (wake_tx, mut wake_rx) = mpsc::unbounded_channel();
        stream.subscribe_wakes(wake_tx);
        loop {
            let values = stream.read_available(reader);
            if !values.is_empty() {
                let n = values.len();
                for value in &values {
                    let bytes = match codec.encode(value) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            report(&fault_tx, &binding, FaultKind::Codec, e.to_string());
                            return;
                        }
                    };
                    if let Err(e) = producer.push(&bytes) {
                        report(&fault_tx, &binding, FaultKind::Codec, e.to_string());
                        return;
                    }
                }
                let _ = stream.advance(reader, n);
            }
            if stream.is_drained(reader) {
                producer.close();
                return;
            }
            if wake_rx.recv().await.is_none() {
                producer.close();
                return;
            }
        }
    })
}

/// Bind a ring to a local mirror stream as its producer. Polls at the
/// configured interval; the mirror closes when the ring does.
pub fn shm_subscribe<T>(
    mut consumer: RingConsumer,
    mirror: Stream<T>,
    codec: Arc<dyn Codec<T>>,
    options: ShmConsumerOptions,
    fault_tx: mpsc::UnboundedSender<GraphFault>,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let binding = format!("shm-subscribe:{}", mirror.name());
        let mut delivered = 0u64;
        loop {
            match consumer.try_next() {
                Ok(Some(bytes)) => {
                    let value = match codec.decode(&bytes) {
                        Ok(v) => v,
                        Err(e) => {
                            report(&fault_tx, &binding, FaultKind::Codec, e.to_string());
                            return;
                        }
                    };
                    if mirror.append(value).is_err() {
                        return;
                    }
                    delivered += 1;
                }
                Ok(None) => {
                    if consumer.is_drained() {
                        mirror.close();
                        MirrorClosed {
                            channel: &binding,
                            delivered,
                        }
                        .log();
                        return;
                    }
                    tokio::time::sleep(options.poll_interval).await;
                }
                Err(BridgeError::Overrun { behind, capacity }) => {
                    ConsumerOverrun {
                        binding: &binding,
                        behind,
                        capacity,
                    }
                    .log();
                    report(
                        &fault_tx,
                        &binding,
                        FaultKind::Overrun,
                        format!("{behind} behind a ring of capacity {capacity}"),
                    );
                    return;
                }
                Err(e) => {
                    report(&fault_tx, &binding, FaultKind::Codec, e.to_string());
                    return;
                }
            }
        }
    })
}

fn report(
    fault_tx: &mpsc::UnboundedSender<GraphFault>,
    binding: &str,
    kind: FaultKind,
    detail: String,
) {
    let _ = fault_tx.send(GraphFault {
        source: binding.to_string(),
        kind,
        detail,
        fatal: true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::codec::BincodeCodec;
    use crate::feeder::collect_into;

    fn ring_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        dir.path().join(name)
    }

    #[test]
    fn ring_round_trip_and_drain() {
        let dir = tempfile::tempdir().unwrap();
        let path = ring_path(&dir, "ring");
        let mut producer = RingProducer::create(&path, 8, 16).unwrap();
        producer.push(b"alpha").unwrap();
        producer.push(b"beta").unwrap();

        let mut consumer = RingConsumer::open(&path, true).unwrap();
        assert_eq!(consumer.try_next().unwrap().unwrap(), b"alpha");
        assert_eq!(consumer.try_next().unwrap().unwrap(), b"beta");
        assert_eq!(consumer.try_next().unwrap(), None);
        assert!(!consumer.is_drained());
        producer.close();
        assert!(consumer.is_drained());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut producer = RingProducer::create(ring_path(&dir, "ring"), 4, 4).unwrap();
        let err = producer.push(b"too large for a slot").unwrap_err();
        assert!(matches!(
            err,
            BridgeError::SlotOverflow { len: 20, slot_size: 4 }
        ));
    }

    #[test]
    fn lapped_consumer_sees_overrun() {
        let dir = tempfile::tempdir().unwrap();
        let path = ring_path(&dir, "ring");
        let mut producer = RingProducer::create(&path, 2, 8).unwrap();
        let mut consumer = RingConsumer::open(&path, true).unwrap();
        for _ in 0..5 {
            producer.push(b"x").unwrap();
        }
        // Position 0 is 5 behind a ring of 2; slot 0 has been overwritten.
        let err = consumer.try_next().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Overrun {
                behind: 5,
                capacity: 2
            }
        ));
    }

    #[test]
    fn open_rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = ring_path(&dir, "junk");
        std::fs::write(&path, vec![0u8; 128]).unwrap();
        assert!(matches!(
            RingConsumer::open(&path, true).err().unwrap(),
            BridgeError::InvalidHeader { .. }
        ));
    }

    #[tokio::test]
    async fn stream_mirrors_across_the_ring() {
        let dir = tempfile::tempdir().unwrap();
        let path = ring_path(&dir, "ring");
        let (fault_tx, _faults) = mpsc::unbounded_channel();
        let codec: Arc<dyn Codec<i64>> = Arc::new(BincodeCodec);

        let local: Stream<i64> = Stream::new("local");
        let producer = RingProducer::create(&path, 64, 16).unwrap();
        let publisher = shm_publish(local.clone(), producer, codec.clone(), fault_tx.clone());

        let consumer = RingConsumer::open(&path, true).unwrap();
        let mirror: Stream<i64> = Stream::new("mirror");
        let sink = collect_into(mirror.clone());
        let _subscriber = shm_subscribe(
            consumer,
            mirror,
            codec,
            ShmConsumerOptions::default(),
            fault_tx,
        );

        local.extend([1, 2, 3]).unwrap();
        local.append(4).unwrap();
        local.close();
        publisher.await.unwrap();

        assert_eq!(sink.await.unwrap(), vec![1, 2, 3, 4]);
    }
}
