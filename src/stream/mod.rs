// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Append-only streams with independent reader cursors.
//!
//! A [`Stream`] is a growable sequence of values with a monotonically
//! increasing write index. Exactly one producer role appends; any number of
//! readers hold cursors and consume at their own pace. Appending wakes every
//! subscribed wake channel, which is how schedulers and bridges learn that
//! new data exists.
//!
//! Storage keeps a base offset so element indices stay absolute across
//! retention gc: element `i` of the logical sequence is `buf[i - base]`.
//! Values below the minimum cursor may be discarded once they also fall
//! outside the configured retention window. Without a retention window the
//! stream grows without bound and a lagging cursor only produces a warning
//! (producers never block; see DESIGN.md on backpressure).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::errors::StreamError;
use crate::observability::messages::stream::CursorLagging;
use crate::observability::messages::StructuredLog;

/// Process-wide unique stream identity, carried in wake signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(0);

/// A reader's cursor handle, tagged with the stream that issued it. Used on
/// a different stream, fallible operations report `ForeignReader` and
/// infallible ones observe nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId {
    stream: StreamId,
    slot: usize,
}

/// Sender half used to deliver wake signals. A wake carries the id of the
/// stream that gained data (or closed); receivers coalesce as they see fit.
pub type WakeSender = mpsc::UnboundedSender<StreamId>;

struct Cursor {
    position: u64,
}

struct State<T> {
    buf: VecDeque<T>,
    /// Absolute index of `buf[0]`.
    base: u64,
    write_index: u64,
    cursors: Vec<Cursor>,
    closed: bool,
    wakers: Vec<WakeSender>,
    retention: Option<usize>,
    lag_warn: Option<u64>,
    lag_warned: bool,
}

struct Inner<T> {
    id: StreamId,
    name: String,
    state: Mutex<State<T>>,
}

/// Cloneable handle to an append-only stream of `T`.
pub struct Stream<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl<T> Stream<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_retention(name, None)
    }

    /// A stream that keeps at most `retention` values behind the slowest
    /// cursor. `None` retains everything (needed for `from_start` readers).
    pub fn with_retention(name: impl Into<String>, retention: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)),
                name: name.into(),
                state: Mutex::new(State {
                    buf: VecDeque::new(),
                    base: 0,
                    write_index: 0,
                    cursors: Vec::new(),
                    closed: false,
                    wakers: Vec::new(),
                    retention,
                    lag_warn: None,
                    lag_warned: false,
                }),
            }),
        }
    }

    pub fn id(&self) -> StreamId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Log a warning through the observability layer once a cursor falls more
    /// than `threshold` elements behind the write index.
    pub fn set_lag_warn_threshold(&self, threshold: u64) {
        self.state().lag_warn = Some(threshold);
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        // A poisoned lock here means a panic inside a non-async critical
        // section; the state itself is still coherent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a wake channel. Every append (and the close) sends this
    /// stream's id on the channel. The send happens under the same lock as
    /// the write, so the new value is visible before the signal is observed.
    pub fn subscribe_wakes(&self, sender: WakeSender) {
        self.state().wakers.push(sender);
    }

    /// Append one value and wake all subscribers. Never blocks.
    pub fn append(&self, value: T) -> Result<(), StreamError> {
        let mut st = self.state();
        if st.closed {
            return Err(StreamError::Closed);
        }
        st.buf.push_back(value);
        st.write_index += 1;
        self.check_lag(&mut st);
        self.signal(&st);
        Ok(())
    }

    /// Append a batch under one lock acquisition, waking subscribers once.
    pub fn extend(&self, values: impl IntoIterator<Item = T>) -> Result<(), StreamError> {
        let mut st = self.state();
        if st.closed {
            return Err(StreamError::Closed);
        }
        let before = st.buf.len();
        st.buf.extend(values);
        st.write_index += (st.buf.len() - before) as u64;
        if st.buf.len() == before {
            return Ok(());
        }
        self.check_lag(&mut st);
        self.signal(&st);
        Ok(())
    }

    /// Mark the stream closed by its producer role. Idempotent. Subscribers
    /// are woken so drained agents can reach their terminal state.
    pub fn close(&self) {
        let mut st = self.state();
        if st.closed {
            return;
        }
        st.closed = true;
        self.signal(&st);
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Count of values ever appended.
    pub fn write_index(&self) -> u64 {
        self.state().write_index
    }

    /// Create a cursor. New readers start at the current write index and do
    /// not see history; pass `from_start` to begin at the oldest retained
    /// value instead.
    pub fn register_reader(&self, from_start: bool) -> ReaderId {
        let mut st = self.state();
        let position = if from_start { st.base } else { st.write_index };
        st.cursors.push(Cursor { position });
        ReaderId {
            stream: self.inner.id,
            slot: st.cursors.len() - 1,
        }
    }

    fn slot_for(&self, reader: ReaderId) -> Result<usize, StreamError> {
        if reader.stream != self.inner.id {
            return Err(StreamError::ForeignReader {
                issuer: reader.stream,
                stream: self.inner.id,
            });
        }
        Ok(reader.slot)
    }

    /// Unread element count for this cursor. Non-negative by invariant. A
    /// reader issued by another stream has nothing available here.
    pub fn available(&self, reader: ReaderId) -> usize {
        let Ok(slot) = self.slot_for(reader) else {
            return 0;
        };
        let st = self.state();
        (st.write_index - st.cursors[slot].position) as usize
    }

    /// True when the producer has closed and this cursor has drained.
    pub fn is_drained(&self, reader: ReaderId) -> bool {
        let Ok(slot) = self.slot_for(reader) else {
            return false;
        };
        let st = self.state();
        st.closed && st.cursors[slot].position == st.write_index
    }

    /// Advance the cursor by `n` consumed elements, then gc anything behind
    /// the minimum cursor that has also aged out of the retention window.
    pub fn advance(&self, reader: ReaderId, n: usize) -> Result<(), StreamError> {
        let slot = self.slot_for(reader)?;
        let mut st = self.state();
        let cursor = &st.cursors[slot];
        let available = (st.write_index - cursor.position) as usize;
        if n > available {
            return Err(StreamError::InvalidAdvance {
                requested: n,
                available,
            });
        }
        st.cursors[slot].position += n as u64;
        self.gc(&mut st);
        Ok(())
    }

    fn gc(&self, st: &mut State<T>) {
        let Some(retention) = st.retention else {
            return;
        };
        let min_cursor = st
            .cursors
            .iter()
            .map(|c| c.position)
            .min()
            .unwrap_or(st.write_index);
        let window_floor = st.write_index.saturating_sub(retention as u64);
        let cut = min_cursor.min(window_floor);
        while st.base < cut {
            st.buf.pop_front();
            st.base += 1;
        }
    }

    fn check_lag(&self, st: &mut State<T>) {
        let Some(threshold) = st.lag_warn else {
            return;
        };
        if st.lag_warned {
            return;
        }
        let lagging = st
            .cursors
            .iter()
            .enumerate()
            .map(|(slot, c)| (slot, st.write_index - c.position))
            .find(|(_, lag)| *lag > threshold);
        if let Some((slot, lag)) = lagging {
            CursorLagging {
                stream: &self.inner.name,
                reader_slot: slot,
                lag,
                threshold,
            }
            .log();
            st.lag_warned = true;
        }
    }

    fn signal(&self, st: &State<T>) {
        for waker in &st.wakers {
            // A dropped receiver just means that scheduler or bridge is gone.
            let _ = waker.send(self.inner.id);
        }
    }
}

impl<T: Clone> Stream<T> {
    /// Return the next `n` unread values without advancing the cursor.
    /// Re-reading an unadvanced cursor always returns identical values.
    pub fn read_slice(&self, reader: ReaderId, n: usize) -> Result<Vec<T>, StreamError> {
        let slot = self.slot_for(reader)?;
        let st = self.state();
        let cursor = &st.cursors[slot];
        let available = (st.write_index - cursor.position) as usize;
        if n > available {
            return Err(StreamError::InsufficientData {
                requested: n,
                available,
            });
        }
        if cursor.position < st.base {
            return Err(StreamError::HistoryDiscarded {
                index: cursor.position,
                base: st.base,
            });
        }
        let start = (cursor.position - st.base) as usize;
        Ok(st.buf.iter().skip(start).take(n).cloned().collect())
    }

    /// Everything currently unread for this cursor, without advancing it. A
    /// foreign reader observes an empty slice.
    pub fn read_available(&self, reader: ReaderId) -> Vec<T> {
        let n = self.available(reader);
        self.read_slice(reader, n).unwrap_or_default()
    }
}
