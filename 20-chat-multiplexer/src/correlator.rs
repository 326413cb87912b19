//! Synchronous request/response calls on top of tag-routed delivery.
//!
//! A call registers one channel under its success tag and every error tag,
//! sends the request, and waits for a success body, an error body, or the
//! call timeout. The router holds the only senders of that channel and drops
//! them when it stops on disconnect, after handing over every frame the
//! reader queued, so a closed channel is the disconnect. The registrations
//! are guards, so they are released on every exit path, including when the
//! calling future is dropped.
//!
//! Responses carry no per-call identifier, so two in-flight calls that listen
//! on the same success tag could not be told apart. Calls are therefore
//! serialised per success tag ("lane"); calls on different lanes run
//! concurrently.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    error::ClientError,
    frame::Frame,
    router::{Delivery, Router},
    tasks::DisconnectMonitor,
};

/// Tags that make up one request/response operation.
#[derive(Debug, Clone, Copy)]
pub struct Exchange {
    pub operation: &'static str,
    pub request: &'static str,
    pub success: &'static str,
    pub errors: &'static [&'static str],
}

type Lane = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone)]
pub struct Correlator {
    router: Router,
    outbound: mpsc::Sender<Frame>,
    monitor: DisconnectMonitor,
    timeout: Option<Duration>,
    lanes: Arc<Mutex<HashMap<&'static str, Lane>>>,
}

impl Correlator {
    /// `router` must stop when `monitor` fires; a pending call only learns
    /// about the disconnect from the router dropping its channel.
    pub fn new(
        router: Router,
        outbound: mpsc::Sender<Frame>,
        monitor: DisconnectMonitor,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            router,
            outbound,
            monitor,
            timeout,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn monitor(&self) -> &DisconnectMonitor {
        &self.monitor
    }

    /// Performs one exchange and returns the success body.
    pub async fn call(&self, exchange: Exchange, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let lane = self.lane(exchange.success);
        let _turn = lane.lock().await;

        let wait = self.exchange(exchange, body);
        match self.timeout {
            None => wait.await,
            Some(after) => match tokio::time::timeout(after, wait).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout {
                    operation: exchange.operation,
                    after,
                }),
            },
        }
    }

    /// Queues a request that expects no response.
    ///
    /// Frames the wire cannot carry are refused here, so they fail only this
    /// call instead of the writer and with it the session.
    pub async fn send(&self, frame: Frame) -> Result<(), ClientError> {
        if let Err(source) = frame.check_limits() {
            return Err(ClientError::InvalidFrame {
                tag: frame.tag,
                source,
            });
        }
        if self.monitor.is_disconnected() {
            return Err(ClientError::Disconnected);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    async fn exchange(&self, exchange: Exchange, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        if self.monitor.is_disconnected() {
            return Err(ClientError::Disconnected);
        }

        let (tx, mut rx) = mpsc::channel::<Delivery>(1);
        let _registrations: Vec<_> = std::iter::once(exchange.success)
            .chain(exchange.errors.iter().copied())
            .map(|tag| self.router.register(tag, tx.clone()))
            .collect();
        // Only the router may hold senders, so a stopped router closes `rx`.
        drop(tx);

        self.send(Frame::new(exchange.request, body)).await?;
        debug!(operation = exchange.operation, "waiting for response");

        match rx.recv().await {
            Some(delivery) if delivery.tag == exchange.success => Ok(delivery.body),
            Some(delivery) => Err(ClientError::Rejected {
                operation: exchange.operation,
                tag: delivery.tag,
            }),
            None => Err(ClientError::Disconnected),
        }
    }

    fn lane(&self, success: &'static str) -> Lane {
        let mut lanes = self
            .lanes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(lanes.entry(success).or_default())
    }
}
