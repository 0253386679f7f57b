//! Public facade for issuing interactions on a connection.
//!
//! A [`Requester`] is a cheap, cloneable handle feeding commands into the
//! connection actor. Inbound sequences surface as [`PayloadReceiver`], a
//! pull-based stream: consumers grant credit with
//! [`request`](PayloadReceiver::request) and the peer may never exceed
//! it.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::{
    connection::Command,
    error::{Error, ErrorCode, Result},
    frame::{FrameError, StreamId},
    payload::Payload,
    stream::{StreamEvent, StreamIdAllocator},
};

/// Handle for issuing requests on a live connection.
///
/// Clones share the connection; the connection closes gracefully once
/// every clone (and the [`ConnectionHandle`](crate::ConnectionHandle))
/// has been dropped or [`close`](Requester::close) is called.
#[derive(Clone)]
pub struct Requester {
    commands: mpsc::UnboundedSender<Command>,
    allocator: Arc<StreamIdAllocator>,
}

impl Requester {
    pub(crate) fn from_parts(
        commands: mpsc::UnboundedSender<Command>,
        allocator: Arc<StreamIdAllocator>,
    ) -> Self {
        Self { commands, allocator }
    }

    /// Send a payload with no response.
    ///
    /// Resolves once the frame has been handed to the transport; there is
    /// no remote acknowledgement.
    pub async fn fire_and_forget(&self, payload: Payload) -> Result<()> {
        let id = self.allocate()?;
        let (done, ack) = oneshot::channel();
        self.send(Command::FireAndForget { id, payload, done })?;
        ack.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Push connection-scoped metadata to the peer.
    pub async fn metadata_push(&self, metadata: Bytes) -> Result<()> {
        let (done, ack) = oneshot::channel();
        self.send(Command::MetadataPush { metadata, done })?;
        ack.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Issue a request expecting exactly one response payload.
    pub async fn request_response(&self, payload: Payload) -> Result<Payload> {
        let id = self.allocate()?;
        let (reply, response) = oneshot::channel();
        self.send(Command::RequestResponse { id, payload, reply })?;
        response.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Open a responder-to-requester stream with `initial_n` credit.
    ///
    /// The returned receiver yields payloads as the responder emits them;
    /// grant further credit with [`PayloadReceiver::request`].
    pub fn request_stream(&self, payload: Payload, initial_n: u32) -> Result<PayloadReceiver> {
        if initial_n == 0 {
            return Err(FrameError::ZeroRequestN.into());
        }
        let id = self.allocate()?;
        let (events, inbound) = mpsc::unbounded_channel();
        self.send(Command::RequestStream { id, payload, initial_n, events })?;
        Ok(PayloadReceiver::from_parts(id, inbound, self.commands.clone()))
    }

    /// Open a bidirectional channel.
    ///
    /// `initial` rides inside the REQUEST_CHANNEL frame as the first
    /// outbound payload; `outbound` supplies the rest and is pulled only
    /// while the responder has granted credit. An `Err` item terminates
    /// the channel with an ERROR frame.
    pub fn request_channel<S>(
        &self,
        initial: Payload,
        outbound: S,
        initial_n: u32,
    ) -> Result<PayloadReceiver>
    where
        S: Stream<Item = Result<Payload>> + Send + 'static,
    {
        if initial_n == 0 {
            return Err(FrameError::ZeroRequestN.into());
        }
        let id = self.allocate()?;
        let (events, inbound) = mpsc::unbounded_channel();
        self.send(Command::RequestChannel {
            id,
            initial,
            outbound: outbound.boxed(),
            initial_n,
            events,
        })?;
        Ok(PayloadReceiver::from_parts(id, inbound, self.commands.clone()))
    }

    /// Issue a lease allowing the peer `requests` requests within `ttl`.
    ///
    /// Only meaningful when the connection negotiated lease semantics;
    /// otherwise the call is rejected locally.
    pub async fn grant_lease(&self, ttl: Duration, requests: u32) -> Result<()> {
        let (done, ack) = oneshot::channel();
        self.send(Command::GrantLease { ttl, requests, done })?;
        ack.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Close the connection gracefully.
    pub fn close(&self) -> Result<()> { self.send(Command::Close) }

    fn allocate(&self) -> Result<StreamId> {
        self.allocator.allocate().ok_or_else(|| Error::Connection {
            code: ErrorCode::ConnectionError,
            message: "stream id space exhausted".to_owned(),
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::ConnectionClosed)
    }
}

/// Pull-based inbound payload sequence.
///
/// Implements [`futures::Stream`]; items are payloads or the stream's
/// terminal error, and the stream ends on completion. Dropping an
/// unterminated receiver cancels the interaction.
pub struct PayloadReceiver {
    id: StreamId,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    commands: mpsc::UnboundedSender<Command>,
    terminated: bool,
}

impl PayloadReceiver {
    pub(crate) fn from_parts(
        id: StreamId,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self { id, events, commands, terminated: false }
    }

    /// Grant the peer credit for `n` further payloads.
    pub fn request(&self, n: u32) {
        if n == 0 || self.terminated {
            return;
        }
        let _ = self.commands.send(Command::RequestN { id: self.id, n });
    }

    /// Cancel the interaction.
    ///
    /// In-flight payloads already on the wire are discarded silently.
    pub fn cancel(&mut self) {
        if !self.terminated {
            self.terminated = true;
            let _ = self.commands.send(Command::CancelStream { id: self.id });
        }
    }
}

impl Stream for PayloadReceiver {
    type Item = Result<Payload>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        match this.events.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(StreamEvent::Next(payload))) => Poll::Ready(Some(Ok(payload))),
            Poll::Ready(Some(StreamEvent::Complete)) | Poll::Ready(None) => {
                this.terminated = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(StreamEvent::Failed(error))) => {
                this.terminated = true;
                Poll::Ready(Some(Err(error)))
            }
        }
    }
}

impl Drop for PayloadReceiver {
    fn drop(&mut self) {
        if !self.terminated {
            let _ = self.commands.send(Command::CancelStream { id: self.id });
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use rstest::rstest;

    use super::*;

    fn receiver() -> (
        mpsc::UnboundedSender<StreamEvent>,
        mpsc::UnboundedReceiver<Command>,
        PayloadReceiver,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let id = StreamId::new(1).expect("valid id");
        (events_tx, command_rx, PayloadReceiver::from_parts(id, events_rx, command_tx))
    }

    #[rstest]
    #[tokio::test]
    async fn payloads_arrive_in_order_then_complete() {
        let (events, _commands, mut inbound) = receiver();
        events.send(StreamEvent::Next(Payload::from_data("a"))).expect("send");
        events.send(StreamEvent::Next(Payload::from_data("b"))).expect("send");
        events.send(StreamEvent::Complete).expect("send");

        let first = inbound.next().await.expect("item").expect("payload");
        assert_eq!(first.data().as_ref(), b"a");
        let second = inbound.next().await.expect("item").expect("payload");
        assert_eq!(second.data().as_ref(), b"b");
        assert!(inbound.next().await.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn a_failure_is_the_final_item() {
        let (events, _commands, mut inbound) = receiver();
        events.send(StreamEvent::Failed(Error::Canceled)).expect("send");

        assert!(matches!(inbound.next().await, Some(Err(Error::Canceled))));
        assert!(inbound.next().await.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn dropping_an_active_receiver_cancels_the_stream() {
        let (_events, mut commands, inbound) = receiver();
        drop(inbound);
        assert!(matches!(commands.recv().await, Some(Command::CancelStream { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn completed_receivers_do_not_cancel_on_drop() {
        let (events, mut commands, mut inbound) = receiver();
        events.send(StreamEvent::Complete).expect("send");
        assert!(inbound.next().await.is_none());
        drop(inbound);
        assert!(commands.try_recv().is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn request_forwards_credit_grants() {
        let (_events, mut commands, inbound) = receiver();
        inbound.request(5);
        let Some(Command::RequestN { n, .. }) = commands.recv().await else {
            panic!("expected a request-n command");
        };
        assert_eq!(n, 5);
    }
}
