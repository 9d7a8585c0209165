// Copyright (c) 2025 Rill Contributors
// SPDX-License-Identifier: MIT

//! The message-broker boundary.
//!
//! The distributed bridge depends on exactly three operations plus a
//! connectivity signal; any broker client that can express
//! `publish`/`subscribe`/`close` plugs in behind [`Broker`].
//!
//! [`LoopbackBroker`] is the in-process implementation used by tests and
//! single-machine deployments. It preserves per-channel order and can
//! simulate disconnects for reconnection testing.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::errors::BrokerError;

/// Transport connectivity as observed by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Up,
    Down,
    Closed,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish bytes to a channel. Per-channel delivery order is preserved;
    /// nothing is guaranteed across channels.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Subscribe to a channel. Messages published after this call arrive on
    /// the returned receiver in publish order.
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, BrokerError>;

    /// Close the connection. Subscribers observe end-of-channel.
    async fn close(&self);

    /// Watchable connectivity state, for callers that want to observe
    /// transport health. Publisher bindings react to `Disconnected` errors
    /// from `publish` rather than watching this.
    fn connectivity(&self) -> watch::Receiver<ConnectionState>;
}

struct LoopbackState {
    channels: HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    closed: bool,
}

/// In-memory broker: per-channel fan-out with publish-order delivery.
pub struct LoopbackBroker {
    state: Mutex<LoopbackState>,
    connectivity_tx: watch::Sender<ConnectionState>,
    connectivity_rx: watch::Receiver<ConnectionState>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        let (connectivity_tx, connectivity_rx) = watch::channel(ConnectionState::Up);
        Self {
            state: Mutex::new(LoopbackState {
                channels: HashMap::new(),
                closed: false,
            }),
            connectivity_tx,
            connectivity_rx,
        }
    }

    /// Fault injection: drop or restore the simulated transport. While down,
    /// `publish` fails with `Disconnected`; subscriptions survive.
    pub fn set_connected(&self, connected: bool) {
        let state = if connected {
            ConnectionState::Up
        } else {
            ConnectionState::Down
        };
        let _ = self.connectivity_tx.send(state);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for LoopbackBroker {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if *self.connectivity_rx.borrow() == ConnectionState::Down {
            return Err(BrokerError::Disconnected);
        }
        let mut state = self.lock();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        if let Some(subscribers) = state.channels.get_mut(channel) {
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, BrokerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.channels.entry(channel.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        // Dropping the senders ends every subscription.
        state.channels.clear();
        let _ = self.connectivity_tx.send(ConnectionState::Closed);
    }

    fn connectivity(&self) -> watch::Receiver<ConnectionState> {
        self.connectivity_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let broker = LoopbackBroker::new();
        let mut rx = broker.subscribe("ticks").await.unwrap();
        for payload in [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()] {
            broker.publish("ticks", payload).await.unwrap();
        }
        assert_eq!(rx.recv().await.unwrap(), b"a");
        assert_eq!(rx.recv().await.unwrap(), b"b");
        assert_eq!(rx.recv().await.unwrap(), b"c");
    }

    #[tokio::test]
    async fn publish_fails_while_disconnected() {
        let broker = LoopbackBroker::new();
        broker.set_connected(false);
        assert_eq!(*broker.connectivity().borrow(), ConnectionState::Down);
        assert_eq!(
            broker.publish("ticks", b"x".to_vec()).await,
            Err(BrokerError::Disconnected)
        );
        broker.set_connected(true);
        assert_eq!(*broker.connectivity().borrow(), ConnectionState::Up);
        assert!(broker.publish("ticks", b"x".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn close_ends_subscriptions() {
        let broker = LoopbackBroker::new();
        let mut rx = broker.subscribe("ticks").await.unwrap();
        broker.close().await;
        assert!(rx.recv().await.is_none());
        assert_eq!(*broker.connectivity().borrow(), ConnectionState::Closed);
    }
}
