//! Responder handler trait.
//!
//! Applications register one [`Responder`] per connection; the actor
//! invokes the method matching the inbound interaction pattern. Every
//! default implementation rejects, so a handler implements only the
//! patterns it serves.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::{Error, Result},
    payload::{Payload, PayloadStream},
    requester::PayloadReceiver,
};

/// Serves inbound interactions on a connection.
///
/// Stream- and channel-pattern methods are synchronous constructors of a
/// lazy [`PayloadStream`]: they must not block, and the returned stream
/// is polled by the connection only while the requester has granted
/// credit.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use weft::{Payload, Responder};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Responder for Echo {
///     async fn request_response(&self, payload: Payload) -> weft::Result<Payload> {
///         Ok(payload)
///     }
/// }
/// ```
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    /// Serve a fire-and-forget request.
    ///
    /// Failures are logged by the connection and otherwise ignored; the
    /// requester receives no acknowledgement either way.
    async fn fire_and_forget(&self, payload: Payload) -> Result<()> {
        let _ = payload;
        Err(Error::rejected("fire-and-forget is not supported"))
    }

    /// Serve a request/response interaction with exactly one payload.
    async fn request_response(&self, payload: Payload) -> Result<Payload> {
        let _ = payload;
        Err(Error::rejected("request-response is not supported"))
    }

    /// Serve a request/stream interaction.
    ///
    /// The returned stream's items become PAYLOAD(N) frames; its end
    /// becomes the completion frame; an `Err` item becomes an ERROR
    /// frame terminating the stream.
    fn request_stream(&self, payload: Payload) -> Result<PayloadStream> {
        let _ = payload;
        Err(Error::rejected("request-stream is not supported"))
    }

    /// Serve a request/channel interaction.
    ///
    /// `initial` is the payload carried by the REQUEST_CHANNEL frame;
    /// further requester payloads arrive on `inbound` as credit is
    /// granted through [`PayloadReceiver::request`].
    fn request_channel(&self, initial: Payload, inbound: PayloadReceiver) -> Result<PayloadStream> {
        let _ = (initial, inbound);
        Err(Error::rejected("request-channel is not supported"))
    }

    /// Observe pushed connection metadata.
    async fn metadata_push(&self, metadata: Bytes) -> Result<()> {
        let _ = metadata;
        Ok(())
    }
}

/// The unit responder rejects every pattern; useful for pure clients.
#[async_trait]
impl Responder for () {}
