//! Client engine for a group chat server.
//!
//! One long-lived connection (plain TCP or TLS) carries every request,
//! response and server push. Each module owns one responsibility:
//!
//! - [`frame`] is the length-prefixed `(tag, body)` wire codec.
//! - [`transport`] dials the server, optionally over TLS.
//! - [`tasks`] runs the single writer and single reader over the connection
//!   and the disconnect signal they share.
//! - [`router`] is the actor that owns the tag → consumer registry.
//! - [`correlator`] turns tag-routed delivery into request/response calls.
//! - [`subscription`] consumes long-lived pushes such as chat messages.
//! - [`client`] exposes the session operations and file transfer.
//! - [`messages`] declares the protobuf payloads carried in frame bodies.
//! - [`cli`], [`command`] and [`shell`] make up the terminal front end.

pub mod cli;
pub mod client;
pub mod command;
pub mod correlator;
pub mod error;
pub mod frame;
pub mod messages;
pub mod router;
pub mod shell;
pub mod subscription;
pub mod tasks;
pub mod transport;

pub use client::{ChatClient, ClientOptions};
pub use error::{ClientError, ConnectionError};
pub use frame::Frame;
