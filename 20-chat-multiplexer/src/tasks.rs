//! Background tasks that own the two halves of the connection.
//!
//! - the writer is the only task writing to the stream and drains the
//!   outbound queue in FIFO order;
//! - the reader is the only task reading from the stream and forwards frames
//!   to the router in wire order.
//!
//! Either one hitting an I/O failure or end of stream trips the disconnect
//! signal, which stops the other and unblocks every pending call.

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    frame::{Frame, read_frame, write_frame},
    router::Router,
};

/// Process-wide signal that the connection is gone.
#[derive(Clone, Debug, Default)]
pub struct DisconnectMonitor {
    token: CancellationToken,
}

impl DisconnectMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts the disconnect. Only the first trigger is logged.
    pub fn trigger(&self, reason: &str) {
        if !self.token.is_cancelled() {
            warn!(reason, "disconnected from server");
        }
        self.token.cancel();
    }

    /// Local shutdown; same effect as a disconnect, logged quietly.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!("closing session");
        }
        self.token.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the disconnect has been broadcast.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

pub async fn run_writer<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Frame>,
    monitor: DisconnectMonitor,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        select! {
            _ = monitor.wait() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    debug!("outbound queue closed");
                    if let Err(error) = writer.shutdown().await {
                        debug!(?error, "failed to shut down writer cleanly");
                    }
                    break;
                };
                if let Err(error) = write_frame(&mut writer, &frame).await {
                    warn!(tag = %frame.tag, ?error, "failed to write frame");
                    monitor.trigger("write failed");
                    break;
                }
                debug!(tag = %frame.tag, bytes = frame.body.len(), "frame sent");
            }
        }
    }
    info!("writer stopped");
}

pub async fn run_reader<R>(mut reader: R, router: Router, monitor: DisconnectMonitor)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = select! {
            _ = monitor.wait() => break,
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(Some(frame)) => {
                debug!(tag = %frame.tag, bytes = frame.body.len(), "frame received");
                let routed = select! {
                    _ = monitor.wait() => break,
                    routed = router.route(frame) => routed,
                };
                if routed.is_err() {
                    monitor.trigger("router stopped");
                    break;
                }
            }
            Ok(None) => {
                monitor.trigger("server closed the connection");
                break;
            }
            Err(error) => {
                warn!(?error, "failed to read frame");
                monitor.trigger("read failed");
                break;
            }
        }
    }
    info!("reader stopped");
}
