//! Per-stream bookkeeping for the four interaction patterns.
//!
//! A [`StreamEntry`] tracks one live stream from the perspective of the
//! connection actor: which pattern it follows, which side we play, the
//! credit ledger in both directions, and the half-close state of each
//! direction. A stream is terminated once both directions are done.

use futures::{StreamExt, stream};
use tokio::sync::{mpsc, oneshot};

use super::credit::Credit;
use crate::{
    error::Error,
    payload::{Payload, PayloadStream},
};

/// Interaction pattern a stream follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    /// Single request, no response.
    FireAndForget,
    /// Single request, single response.
    Response,
    /// Single request, responder-to-requester stream.
    Stream,
    /// Bidirectional stream.
    Channel,
}

/// Which role this endpoint plays on a particular stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// We issued the request.
    Requester,
    /// The peer issued the request.
    Responder,
}

/// Event delivered to the application for one inbound stream direction.
#[derive(Debug)]
pub enum StreamEvent {
    /// A payload value.
    Next(Payload),
    /// Orderly completion of the direction.
    Complete,
    /// The stream failed; no further events follow.
    Failed(Error),
}

/// Item yielded by an outbound source wrapped for the actor.
///
/// The explicit `End` marker lets the actor observe orderly completion,
/// which a bare stream would signal only by vanishing from the polled
/// set.
pub enum SourceItem {
    /// The next outbound payload, or the source's failure.
    Next(Result<Payload, Error>),
    /// The source finished cleanly.
    End,
}

/// An outbound payload source adapted for the actor's polled set.
pub type SourceStream = futures::stream::BoxStream<'static, SourceItem>;

/// Adapt a payload stream into a [`SourceStream`] with an end marker.
#[must_use]
pub fn into_source(payloads: PayloadStream) -> SourceStream {
    payloads
        .map(SourceItem::Next)
        .chain(stream::once(async { SourceItem::End }))
        .boxed()
}

/// Live state of one stream inside the connection actor.
pub struct StreamEntry {
    /// Interaction pattern.
    pub pattern: Pattern,
    /// Role we play on this stream.
    pub side: Side,
    /// Delivery channel for inbound payload events, when this side
    /// consumes an inbound direction.
    pub events: Option<mpsc::UnboundedSender<StreamEvent>>,
    /// Reply slot for the request/response requester.
    pub reply: Option<oneshot::Sender<Result<Payload, Error>>>,
    /// Credit the peer has granted our outbound direction.
    pub outbound_credit: Credit,
    /// Credit we have granted the peer's outbound direction.
    pub credit_owed: Credit,
    /// Outbound source parked while credit is exhausted.
    pub parked: Option<SourceStream>,
    /// One payload pulled from the source before credit ran dry.
    pub buffered: Option<Payload>,
    /// The outbound source finished while a payload was still buffered;
    /// completion is deferred until the buffer drains.
    pub end_of_source: bool,
    /// The peer's direction towards us has terminated.
    pub inbound_done: bool,
    /// Our direction towards the peer has terminated.
    pub outbound_done: bool,
}

impl StreamEntry {
    fn new(pattern: Pattern, side: Side) -> Self {
        Self {
            pattern,
            side,
            events: None,
            reply: None,
            outbound_credit: Credit::default(),
            credit_owed: Credit::default(),
            parked: None,
            buffered: None,
            end_of_source: false,
            inbound_done: false,
            outbound_done: false,
        }
    }

    /// Requester side of request/response: inbound only.
    #[must_use]
    pub fn requester_response(reply: oneshot::Sender<Result<Payload, Error>>) -> Self {
        let mut entry = Self::new(Pattern::Response, Side::Requester);
        entry.reply = Some(reply);
        entry.outbound_done = true;
        entry
    }

    /// Requester side of request/stream: inbound only.
    #[must_use]
    pub fn requester_stream(
        events: mpsc::UnboundedSender<StreamEvent>,
        initial_n: u32,
    ) -> Self {
        let mut entry = Self::new(Pattern::Stream, Side::Requester);
        entry.events = Some(events);
        entry.credit_owed = Credit::new(initial_n);
        entry.outbound_done = true;
        entry
    }

    /// Requester side of request/channel: both directions open. The
    /// outbound source stays parked until the responder grants credit.
    #[must_use]
    pub fn requester_channel(
        events: mpsc::UnboundedSender<StreamEvent>,
        outbound: SourceStream,
        initial_n: u32,
    ) -> Self {
        let mut entry = Self::new(Pattern::Channel, Side::Requester);
        entry.events = Some(events);
        entry.parked = Some(outbound);
        entry.credit_owed = Credit::new(initial_n);
        entry
    }

    /// Responder side of request/response: outbound only, one implicit
    /// unit of credit.
    #[must_use]
    pub fn responder_response() -> Self {
        let mut entry = Self::new(Pattern::Response, Side::Responder);
        entry.outbound_credit = Credit::new(1);
        entry.inbound_done = true;
        entry
    }

    /// Responder side of request/stream: outbound only.
    #[must_use]
    pub fn responder_stream(initial_n: u32) -> Self {
        let mut entry = Self::new(Pattern::Stream, Side::Responder);
        entry.outbound_credit = Credit::new(initial_n);
        entry.inbound_done = true;
        entry
    }

    /// Responder side of request/channel.
    ///
    /// `requester_complete` reflects the COMPLETE flag on the
    /// REQUEST_CHANNEL frame: the requester may close its direction in
    /// the opening frame.
    #[must_use]
    pub fn responder_channel(
        events: mpsc::UnboundedSender<StreamEvent>,
        initial_n: u32,
        requester_complete: bool,
    ) -> Self {
        let mut entry = Self::new(Pattern::Channel, Side::Responder);
        entry.events = Some(events);
        entry.outbound_credit = Credit::new(initial_n);
        entry.inbound_done = requester_complete;
        entry
    }

    /// Whether both directions have terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool { self.inbound_done && self.outbound_done }

    /// Whether this stream still expects payloads from the peer.
    #[must_use]
    pub fn expects_inbound(&self) -> bool { !self.inbound_done }

    /// Deliver a terminal event to whoever is waiting on the inbound
    /// direction, consuming the delivery channels.
    pub fn fail(&mut self, error: Error) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(Err(error));
        } else if let Some(events) = self.events.take() {
            let _ = events.send(StreamEvent::Failed(error));
        }
        self.inbound_done = true;
        self.outbound_done = true;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn response_requester_waits_on_inbound_only() {
        let (reply, _rx) = oneshot::channel();
        let entry = StreamEntry::requester_response(reply);
        assert!(entry.outbound_done);
        assert!(entry.expects_inbound());
        assert!(!entry.is_terminated());
    }

    #[rstest]
    fn stream_responder_starts_with_the_initial_grant() {
        let entry = StreamEntry::responder_stream(5);
        assert_eq!(entry.outbound_credit.available(), 5);
        assert!(entry.inbound_done);
    }

    #[rstest]
    fn channel_tracks_both_directions() {
        let (events, _rx) = mpsc::unbounded_channel();
        let mut entry = StreamEntry::responder_channel(events, 1, false);
        assert!(!entry.is_terminated());
        entry.inbound_done = true;
        assert!(!entry.is_terminated());
        entry.outbound_done = true;
        assert!(entry.is_terminated());
    }

    #[rstest]
    fn opening_complete_closes_the_requester_direction() {
        let (events, _rx) = mpsc::unbounded_channel();
        let entry = StreamEntry::responder_channel(events, 1, true);
        assert!(entry.inbound_done);
    }

    #[rstest]
    fn failing_a_stream_reaches_the_reply_slot() {
        let (reply, mut rx) = oneshot::channel();
        let mut entry = StreamEntry::requester_response(reply);
        entry.fail(Error::Canceled);
        assert!(matches!(rx.try_recv(), Ok(Err(Error::Canceled))));
        assert!(entry.is_terminated());
    }
}
