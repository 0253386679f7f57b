//! Asynchronous RSocket 1.0 protocol core.
//!
//! `weft` implements the connection-and-stream machinery of RSocket — the
//! binary frame codec, fragmentation, the setup/keepalive/lease
//! connection state machine, per-stream interaction state machines with
//! request-N flow control, and the symmetric requester/responder facade —
//! over any transport that can carry whole frames.
//!
//! Transports, payload semantics (MIME handling, routing metadata), and
//! reactive-library bindings live outside this crate: byte-stream
//! transports plug in through [`transport::framed`], message-boundary
//! transports by implementing [`transport::FrameIo`] directly.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use weft::{Client, Payload, Responder, Server};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Responder for Echo {
//!     async fn request_response(&self, payload: Payload) -> weft::Result<Payload> {
//!         Ok(payload)
//!     }
//! }
//!
//! # async fn demo() -> weft::Result<()> {
//! let (client_io, server_io) = tokio::io::duplex(4096);
//! let (_server, _server_conn) = Server::new()
//!     .responder(Echo)
//!     .accept(weft::transport::framed(server_io));
//! let (client, _client_conn) = Client::new().connect(weft::transport::framed(client_io));
//!
//! let reply = client.request_response(Payload::from_data("ping")).await?;
//! assert_eq!(reply.data().as_ref(), b"ping");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod handler;
pub mod payload;
pub mod requester;
pub mod server;
pub mod stream;
pub mod transport;

pub use client::Client;
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionHandle};
pub use error::{Error, ErrorCode, Result};
pub use frame::{Frame, FrameError};
pub use handler::Responder;
pub use payload::{Payload, PayloadStream};
pub use requester::{PayloadReceiver, Requester};
pub use server::Server;
pub use transport::{FrameIo, WireCodec, framed};
