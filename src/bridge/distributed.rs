// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! Distributed bridge: streams mirrored over a message broker.
//!
//! `publish_stream` binds a local stream to a broker channel and forwards
//! every value in append order. `subscribe_stream` is the other side: it
//! appends each received value to a local mirror stream in receive order, so
//! agents downstream of the mirror cannot tell it from a local producer.
//!
//! Delivery is at-least-once. A publisher that loses its transport queues
//! encoded values in a bounded in-memory queue and retries with backoff;
//! exhausting the bound is fatal for that binding and is reported to the
//! graph fault sink.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::broker::Broker;
use crate::bridge::codec::Codec;
use crate::errors::{BrokerError, FaultKind, GraphFault};
use crate::observability::messages::bridge::{
    MirrorClosed, PublisherQueueExhausted, PublisherReconnecting,
};
use crate::observability::messages::StructuredLog;
use crate::stream::Stream;

/// Exponential backoff for publisher reconnects.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
    /// Give up after this many consecutive failed attempts. `None` retries
    /// for as long as the queue bound holds.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(50),
            multiplier: 2.0,
            max: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = self.initial.as_secs_f64() * factor;
        Duration::from_secs_f64(raw.min(self.max.as_secs_f64()))
    }
}

#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Encoded values held in memory while the transport is down. Exceeding
    /// this is fatal for the binding.
    pub queue_bound: usize,
    pub backoff: BackoffPolicy,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            queue_bound: 1024,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Bind a stream to a broker channel as its publisher. The task ends when
/// the stream is closed and fully forwarded, or on a fatal binding fault.
pub fn publish_stream<T>(
    stream: Stream<T>,
    channel: impl Into<String>,
    broker: Arc<dyn Broker>,
    codec: Arc<dyn Codec<T>>,
    options: PublisherOptions,
    fault_tx: mpsc::UnboundedSender<GraphFault>,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    let channel = channel.into();
    tokio::spawn(async move {
        let binding = format!("publish:{channel}");
        let reader = stream.register_reader(true);
        let (wake_tx, mut wake_rx) = mpsc::unbounded_channel();
        stream.subscribe_wakes(wake_tx);
        let mut pending: VecDeque<Vec<u8>> = VecDeque::new();
        let mut attempt = 0u32;

        loop {
            // Move unread values into the pending queue. The cursor advances
            // once a value is queued locally, so a value is either unread on
            // the stream or held in `pending` until the broker accepts it.
            let values = stream.read_available(reader);
            if !values.is_empty() {
                let n = values.len();
                for value in &values {
                    if pending.len() >= options.queue_bound {
                        PublisherQueueExhausted {
                            channel: &channel,
                            bound: options.queue_bound,
                        }
                        .log();
                        report(
                            &fault_tx,
                            &binding,
                            FaultKind::TransportUnavailable,
                            format!("disconnect queue bound {} exceeded", options.queue_bound),
                        );
                        return;
                    }
                    match codec.encode(value) {
                        Ok(bytes) => pending.push_back(bytes),
                        Err(e) => {
                            report(&fault_tx, &binding, FaultKind::Codec, e.to_string());
                            return;
                        }
                    }
                }
                let _ = stream.advance(reader, n);
            }

            // Flush in queue order. A failed attempt backs off, then falls
            // back to the ingest step so the queue stays honest about how far
            // behind the binding is.
            while let Some(bytes) = pending.front().cloned() {
                match broker.publish(&channel, bytes).await {
                    Ok(()) => {
                        pending.pop_front();
                        attempt = 0;
                    }
                    Err(BrokerError::Disconnected) => {
                        attempt += 1;
                        if let Some(max) = options.backoff.max_attempts {
                            if attempt > max {
                                report(
                                    &fault_tx,
                                    &binding,
                                    FaultKind::TransportUnavailable,
                                    format!("gave up after {max} reconnect attempts"),
                                );
                                return;
                            }
                        }
                        let delay = options.backoff.delay(attempt);
                        PublisherReconnecting {
                            channel: &channel,
                            attempt,
                            delay,
                            queued: pending.len(),
                        }
                        .log();
                        tokio::time::sleep(delay).await;
                        break;
                    }
                    Err(e) => {
                        report(
                            &fault_tx,
                            &binding,
                            FaultKind::TransportUnavailable,
                            e.to_string(),
                        );
                        return;
                    }
                }
            }

            if !pending.is_empty() {
                continue;
            }
            if stream.is_drained(reader) {
                return;
            }
            if wake_rx.recv().await.is_none() {
                return;
            }
        }
    })
}

/// Bind a broker channel to a local mirror stream as its producer. The
/// subscription is registered before this returns, so values published
/// afterwards are never missed. Values arrive in channel order; the mirror
/// closes when the channel ends.
pub async fn subscribe_stream<T>(
    channel: impl Into<String>,
    broker: Arc<dyn Broker>,
    codec: Arc<dyn Codec<T>>,
    mirror: Stream<T>,
    fault_tx: mpsc::UnboundedSender<GraphFault>,
) -> Result<JoinHandle<()>, BrokerError>
where
    T: Clone + Send + Sync + 'static,
{
    let channel = channel.into();
    let mut rx = broker.subscribe(&channel).await?;
    Ok(tokio::spawn(async move {
        let binding = format!("subscribe:{channel}");
        let mut delivered = 0u64;
        while let Some(bytes) = rx.recv().await {
            let value = match codec.decode(&bytes) {
                Ok(v) => v,
                Err(e) => {
                    report(&fault_tx, &binding, FaultKind::Codec, e.to_string());
                    return;
                }
            };
            if mirror.append(value).is_err() {
                // Mirror closed locally during teardown; stop forwarding.
                return;
            }
            delivered += 1;
        }
        mirror.close();
        MirrorClosed {
            channel: &channel,
            delivered,
        }
        .log();
    }))
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
    use crate::bridge::broker::LoopbackBroker;
    use crate::bridge::codec::BincodeCodec;
    use crate::feeder::collect_into;

    fn codec() -> Arc<dyn Codec<i64>> {
        Arc::new(BincodeCodec)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(50),
            multiplier: 2.0,
            max: Duration::from_millis(300),
            max_attempts: None,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(50));
        assert_eq!(policy.delay(2), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(300));
        assert_eq!(policy.delay(10), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn mirrors_values_in_append_order() {
        let broker = Arc::new(LoopbackBroker::new());
        let (fault_tx, _faults) = mpsc::unbounded_channel();

        let mirror: Stream<i64> = Stream::new("mirror");
        let sink = collect_into(mirror.clone());
        let _subscriber = subscribe_stream(
            "ticks",
            broker.clone() as Arc<dyn Broker>,
            codec(),
            mirror,
            fault_tx.clone(),
        )
        .await
        .unwrap();

        let local: Stream<i64> = Stream::new("local");
        let publisher = publish_stream(
            local.clone(),
            "ticks",
            broker.clone() as Arc<dyn Broker>,
            codec(),
            PublisherOptions::default(),
            fault_tx,
        );

        local.extend([1, 2, 3]).unwrap();
        local.close();
        publisher.await.unwrap();
        broker.close().await;

        assert_eq!(sink.await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn reconnect_preserves_order_across_disconnect() {
        let broker = Arc::new(LoopbackBroker::new());
        let (fault_tx, _faults) = mpsc::unbounded_channel();

        let mirror: Stream<i64> = Stream::new("mirror");
        let sink = collect_into(mirror.clone());
        let _subscriber = subscribe_stream(
            "ticks",
            broker.clone() as Arc<dyn Broker>,
            codec(),
            mirror.clone(),
            fault_tx.clone(),
        )
        .await
        .unwrap();

        let local: Stream<i64> = Stream::new("local");
        let publisher = publish_stream(
            local.clone(),
            "ticks",
            broker.clone() as Arc<dyn Broker>,
            codec(),
            PublisherOptions {
                backoff: BackoffPolicy {
                    initial: Duration::from_millis(5),
                    max: Duration::from_millis(20),
                    ..Default::default()
                },
                ..Default::default()
            },
            fault_tx,
        );

        local.extend([10, 20]).unwrap();
        // Wait for the first two to cross before dropping the transport.
        tokio::time::timeout(Duration::from_secs(5), async {
            while mirror.write_index() < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        broker.set_connected(false);
        local.append(30).unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        broker.set_connected(true);

        local.close();
        publisher.await.unwrap();
        broker.close().await;

        assert_eq!(sink.await.unwrap(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn exhausted_queue_is_a_fatal_binding_fault() {
        let broker = Arc::new(LoopbackBroker::new());
        broker.set_connected(false);
        let (fault_tx, mut faults) = mpsc::unbounded_channel();

        let local: Stream<i64> = Stream::new("local");
        let publisher = publish_stream(
            local.clone(),
            "ticks",
            broker as Arc<dyn Broker>,
            codec(),
            PublisherOptions {
                queue_bound: 2,
                backoff: BackoffPolicy {
                    initial: Duration::from_millis(1),
                    max: Duration::from_millis(1),
                    ..Default::default()
                },
            },
            fault_tx,
        );

        local.extend([1, 2, 3]).unwrap();
        publisher.await.unwrap();

        let fault = faults.recv().await.unwrap();
        assert_eq!(fault.kind, FaultKind::TransportUnavailable);
        assert!(fault.fatal);
        assert_eq!(fault.source, "publish:ticks");
    }
}
