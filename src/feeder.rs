// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Feeders: external sources that drive root streams.
//!
//! A feeder is just another producer role: it calls `append` and `close` on
//! a root stream exactly like an agent output, from its own task. There is
//! no special-case API; the stream's wake channel carries the signal into
//! whichever scheduler subscribed.
//!
//! Sinks are the mirror image: register a cursor and poll like any agent
//! input. [`collect_into`] is the common case for tests and demos.

use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::task::JoinHandle;

use crate::stream::Stream;

/// Options shared by the feeder variants.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Values appended per step. Batches are appended atomically, so
    /// downstream agents see whole chunks.
    pub chunk: usize,
    /// Sleep between steps. `None` feeds as fast as the stream accepts.
    pub interval: Option<Duration>,
    /// Close the stream when the source is exhausted.
    pub close_on_end: bool,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            chunk: 1,
            interval: None,
            close_on_end: true,
        }
    }
}

/// Feed a list into a stream, `opts.chunk` values per step.
pub fn feed_list<T: Clone + Send + 'static>(
    stream: Stream<T>,
    items: Vec<T>,
    opts: FeedOptions,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let chunk = opts.chunk.max(1);
        // Owned chunks so no borrow of `items` lives across an await.
        let chunks: Vec<Vec<T>> = items.chunks(chunk).map(|w| w.to_vec()).collect();
        for window in chunks {
            if stream.extend(window).is_err() {
                // Closed underneath us during teardown; stop quietly.
                return;
            }
            if let Some(interval) = opts.interval {
                tokio::time::sleep(interval).await;
            }
        }
        if opts.close_on_end {
            stream.close();
        }
    })
}

/// Repeatedly call a stateful generator and append its values. The
/// generator returns `None` when exhausted; `max_steps` bounds the number
/// of calls for generators that never are.
pub fn feed_fn<T, F>(
    stream: Stream<T>,
    mut next: F,
    max_steps: Option<u64>,
    opts: FeedOptions,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: FnMut() -> Option<T> + Send + 'static,
{
    tokio::spawn(async move {
        let mut steps = 0u64;
        loop {
            if let Some(limit) = max_steps {
                if steps >= limit {
                    break;
                }
            }
            let mut batch = Vec::with_capacity(opts.chunk.max(1));
            for _ in 0..opts.chunk.max(1) {
                match next() {
                    Some(v) => batch.push(v),
                    None => break,
                }
            }
            let exhausted = batch.len() < opts.chunk.max(1);
            if !batch.is_empty() && stream.extend(batch).is_err() {
                return;
            }
            if exhausted {
                break;
            }
            steps += 1;
            if let Some(interval) = opts.interval {
                tokio::time::sleep(interval).await;
            }
        }
        if opts.close_on_end {
            stream.close();
        }
    })
}

/// Feed a file line by line through a parse function. Lines the parser
/// rejects are skipped.
pub fn feed_lines<T, F>(
    stream: Stream<T>,
    path: std::path::PathBuf,
    mut parse: F,
    opts: FeedOptions,
) -> JoinHandle<std::io::Result<()>>
where
    T: Clone + Send + 'static,
    F: FnMut(&str) -> Option<T> + Send + 'static,
{
    tokio::spawn(async move {
        let file = tokio::fs::File::open(&path).await?;
        let mut lines = tokio::io::BufReader::new(file).lines();
        let mut batch = Vec::with_capacity(opts.chunk.max(1));
        while let Some(line) = lines.next_line().await? {
            if let Some(value) = parse(&line) {
                batch.push(value);
            }
            if batch.len() >= opts.chunk.max(1) {
                if stream.extend(std::mem::take(&mut batch)).is_err() {
                    return Ok(());
                }
                if let Some(interval) = opts.interval {
                    tokio::time::sleep(interval).await;
                }
            }
        }
        if !batch.is_empty() {
            let _ = stream.extend(batch);
        }
        if opts.close_on_end {
            stream.close();
        }
        Ok(())
    })
}

/// Sink helper: drain a stream into a `Vec` until it closes. Registers its
/// own cursor and consumes only through it.
pub fn collect_into<T: Clone + Send + 'static>(stream: Stream<T>) -> JoinHandle<Vec<T>> {
    tokio::spawn(async move {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        stream.subscribe_wakes(tx);
        let reader = stream.register_reader(true);
        let mut out = Vec::new();
        loop {
            let values = stream.read_available(reader);
            let n = values.len();
            out.extend(values);
            if n > 0 {
                // Cannot fail: n came from the same cursor.
                let _ = stream.advance(reader, n);
            }
            if stream.is_drained(reader) {
                break;
            }
            if rx.recv().await.is_none() {
                break;
            }
        }
        out
    })
}
