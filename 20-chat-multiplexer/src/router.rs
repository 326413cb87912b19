//! Dispatch router: routes inbound frames to whoever is waiting for their tag.
//!
//! The registry lives inside a single actor task. Registrations, removals and
//! routed frames all reach it as commands, so the map is only ever touched by
//! one task and "one live registration per tag" holds by construction.
//!
//! Two queues feed the actor:
//!
//! - a control queue (unbounded) for register/deregister, usable from `Drop`;
//! - a data queue (bounded) for inbound frames, which gives the reader
//!   backpressure when a consumer is slow.
//!
//! The actor always drains control before data. A caller registers before it
//! sends its request, and the response can only be read after the request was
//! sent, so the registration is always applied before the response is routed.
//!
//! On shutdown the frames still queued are handed over without waiting on
//! any consumer, then every sender is dropped. A response that reached the
//! wire just before the stream ended is therefore still delivered.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{select, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::frame::Frame;

/// Inbound message handed to a registered consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: String,
    pub body: Vec<u8>,
}

impl From<Frame> for Delivery {
    fn from(frame: Frame) -> Self {
        Self {
            tag: frame.tag,
            body: frame.body,
        }
    }
}

pub type DeliverySender = mpsc::Sender<Delivery>;

type RegistrationId = u64;

enum Control {
    Register {
        tag: String,
        id: RegistrationId,
        sender: DeliverySender,
    },
    Deregister {
        tag: String,
        id: Option<RegistrationId>,
    },
}

/// Cloneable handle to the router actor.
#[derive(Clone)]
pub struct Router {
    control: mpsc::UnboundedSender<Control>,
    data: mpsc::Sender<Frame>,
    next_id: Arc<AtomicU64>,
}

impl Router {
    /// Starts the actor. It stops once `shutdown` fires or every handle is gone,
    /// dropping all registered senders so their consumers observe the end.
    pub fn spawn(capacity: usize, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::channel(capacity.max(1));
        let actor = RouterActor {
            control: control_rx,
            data: data_rx,
            handlers: HashMap::new(),
            shutdown,
        };
        let handle = tokio::spawn(actor.run());
        let router = Self {
            control: control_tx,
            data: data_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (router, handle)
    }

    /// Registers `sender` for `tag`, replacing any current registration.
    ///
    /// The entry is removed when the returned guard is dropped, unless it has
    /// been replaced by a newer registration in the meantime.
    pub fn register(&self, tag: &str, sender: DeliverySender) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let command = Control::Register {
            tag: tag.to_string(),
            id,
            sender,
        };
        if self.control.send(command).is_err() {
            debug!(tag, "router stopped; registration ignored");
        }
        Registration {
            tag: tag.to_string(),
            id,
            control: self.control.clone(),
        }
    }

    /// Removes whatever is registered for `tag`.
    pub fn deregister(&self, tag: &str) {
        let _ = self.control.send(Control::Deregister {
            tag: tag.to_string(),
            id: None,
        });
    }

    /// Hands an inbound frame to the actor, waiting while its queue is full.
    ///
    /// Fails only when the actor has stopped.
    pub async fn route(&self, frame: Frame) -> Result<(), Frame> {
        self.data.send(frame).await.map_err(|err| err.0)
    }
}

/// Keeps a registration alive; dropping it deregisters.
#[derive(Debug)]
pub struct Registration {
    tag: String,
    id: RegistrationId,
    control: mpsc::UnboundedSender<Control>,
}

impl Registration {
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Deregister {
            tag: std::mem::take(&mut self.tag),
            id: Some(self.id),
        });
    }
}

struct Handler {
    id: RegistrationId,
    sender: DeliverySender,
}

struct RouterActor {
    control: mpsc::UnboundedReceiver<Control>,
    data: mpsc::Receiver<Frame>,
    handlers: HashMap<String, Handler>,
    shutdown: CancellationToken,
}

impl RouterActor {
    async fn run(mut self) {
        let mut interrupted = None;
        loop {
            select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = self.control.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                frame = self.data.recv() => match frame {
                    Some(frame) => {
                        if let Err(frame) = self.dispatch(frame).await {
                            interrupted = Some(frame);
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        self.drain(interrupted);
        debug!(live = self.handlers.len(), "router stopped");
        self.handlers.clear();
    }

    /// Hands over every frame still queued, in order, without waiting: a
    /// consumer with no room left loses the frame.
    fn drain(&mut self, interrupted: Option<Frame>) {
        self.data.close();
        let queued = std::iter::from_fn(|| self.data.try_recv().ok());
        let frames: Vec<Frame> = interrupted.into_iter().chain(queued).collect();
        for frame in frames {
            self.apply_pending();
            let Some(handler) = self.handlers.get(&frame.tag) else {
                warn!(tag = %frame.tag, bytes = frame.body.len(), "no handler registered; dropping message");
                continue;
            };
            let tag = frame.tag.clone();
            if handler.sender.try_send(Delivery::from(frame)).is_err() {
                debug!(%tag, "consumer full or gone at shutdown; dropping message");
            }
        }
    }

    fn apply_pending(&mut self) {
        while let Ok(command) = self.control.try_recv() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Control) {
        match command {
            Control::Register { tag, id, sender } => {
                let handler = Handler { id, sender };
                if let Some(previous) = self.handlers.insert(tag.clone(), handler) {
                    debug!(%tag, replaced = previous.id, by = id, "registration replaced");
                }
            }
            Control::Deregister { tag, id } => {
                let current = self.handlers.get(&tag).map(|handler| handler.id);
                match (current, id) {
                    (Some(_), None) => {
                        self.handlers.remove(&tag);
                    }
                    (Some(current), Some(id)) if current == id => {
                        self.handlers.remove(&tag);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Delivers one frame, waiting for room at its consumer. Gives the frame
    /// back when shutdown fires first.
    async fn dispatch(&mut self, frame: Frame) -> Result<(), Frame> {
        // Registrations queued ahead of this frame must be visible to it.
        self.apply_pending();

        let Some(handler) = self.handlers.get(&frame.tag) else {
            warn!(tag = %frame.tag, bytes = frame.body.len(), "no handler registered; dropping message");
            return Ok(());
        };
        let sender = handler.sender.clone();

        select! {
            biased;
            permit = sender.reserve() => {
                match permit {
                    Ok(permit) => permit.send(Delivery::from(frame)),
                    Err(_) => debug!(tag = %frame.tag, "consumer went away before delivery"),
                }
                Ok(())
            }
            _ = self.shutdown.cancelled() => Err(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    async fn recv(rx: &mut mpsc::Receiver<Delivery>) -> Option<Delivery> {
        timeout(WAIT, rx.recv()).await.expect("delivery timed out")
    }

    #[tokio::test]
    async fn routes_by_tag_in_arrival_order() {
        let (router, _task) = Router::spawn(8, CancellationToken::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _registration = router.register("message", tx);

        router.route(Frame::new("message", vec![1])).await.unwrap();
        router.route(Frame::new("message", vec![2])).await.unwrap();

        assert_eq!(recv(&mut rx).await.unwrap().body, vec![1]);
        assert_eq!(recv(&mut rx).await.unwrap().body, vec![2]);
    }

    #[tokio::test]
    async fn second_registration_replaces_first() {
        let (router, _task) = Router::spawn(8, CancellationToken::new());
        let (first_tx, mut first_rx) = mpsc::channel(8);
        let (second_tx, mut second_rx) = mpsc::channel(8);
        let first = router.register("group", first_tx);
        let _second = router.register("group", second_tx);

        router.route(Frame::new("group", vec![7])).await.unwrap();
        assert_eq!(recv(&mut second_rx).await.unwrap().body, vec![7]);

        // The stale guard must not remove the newer registration.
        drop(first);
        router.route(Frame::new("group", vec![8])).await.unwrap();
        assert_eq!(recv(&mut second_rx).await.unwrap().body, vec![8]);

        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unroutable_frames_are_dropped() {
        let (router, _task) = Router::spawn(8, CancellationToken::new());
        let (tx, mut rx) = mpsc::channel(8);
        let registration = router.register("auth", tx);

        router.route(Frame::empty("authErr")).await.unwrap();
        router.route(Frame::empty("auth")).await.unwrap();
        assert_eq!(recv(&mut rx).await.unwrap().tag, "auth");

        drop(registration);
        router.route(Frame::empty("auth")).await.unwrap();
        // Once deregistered the sender held by the router is released.
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn explicit_deregister_removes_entry() {
        let (router, _task) = Router::spawn(8, CancellationToken::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _registration = router.register("getGroups", tx);

        router.deregister("getGroups");
        router.route(Frame::empty("getGroups")).await.unwrap();
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_releases_all_consumers() {
        let shutdown = CancellationToken::new();
        let (router, task) = Router::spawn(8, shutdown.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let _registration = router.register("getInvites", tx);

        shutdown.cancel();
        timeout(WAIT, task).await.expect("router stops").unwrap();
        assert!(recv(&mut rx).await.is_none());
        assert!(router.route(Frame::empty("getInvites")).await.is_err());
    }

    #[tokio::test]
    async fn frames_queued_before_shutdown_are_still_delivered() {
        let shutdown = CancellationToken::new();
        let (router, task) = Router::spawn(8, shutdown.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let _registration = router.register("message", tx);

        router.route(Frame::new("message", vec![1])).await.unwrap();
        router.route(Frame::new("message", vec![2])).await.unwrap();
        shutdown.cancel();
        timeout(WAIT, task).await.expect("router stops").unwrap();

        assert_eq!(recv(&mut rx).await.unwrap().body, vec![1]);
        assert_eq!(recv(&mut rx).await.unwrap().body, vec![2]);
        assert!(recv(&mut rx).await.is_none());
    }
}
