use prost::Message;
use tokio::{select, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::router::{Delivery, Router};

/// Buffered pushes before the router starts waiting on the consumer.
const STREAM_BUFFER: usize = 32;

/// A long-lived registration consumed by its own task.
///
/// The consumer decodes every push on `tag` as `T` and hands it to the
/// handler until [`Subscription::close`] is called or the router stops.
pub struct Subscription {
    tag: String,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn spawn<T, F>(router: &Router, tag: &str, mut handler: F) -> Self
    where
        T: Message + Default + Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Delivery>(STREAM_BUFFER);
        let registration = router.register(tag, tx);
        let stop = CancellationToken::new();
        let token = stop.clone();

        let task = tokio::spawn(async move {
            loop {
                let delivery = select! {
                    _ = token.cancelled() => break,
                    delivery = rx.recv() => delivery,
                };
                let Some(delivery) = delivery else {
                    debug!(tag = %registration.tag(), "stream source closed");
                    break;
                };
                match T::decode(delivery.body.as_slice()) {
                    Ok(item) => handler(item),
                    Err(error) => {
                        warn!(tag = %delivery.tag, ?error, "skipping undecodable push");
                    }
                }
            }
            // Removes the registry entry.
            drop(registration);
        });

        Self {
            tag: tag.to_string(),
            stop,
            task,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the consumer and waits for it, so no further item is handled
    /// once this returns.
    pub async fn close(mut self) {
        self.stop.cancel();
        if let Err(error) = (&mut self.task).await {
            warn!(tag = %self.tag, ?error, "stream consumer failed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
