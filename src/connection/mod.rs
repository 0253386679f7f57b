//! Connection actor: one cooperative event loop per connection.
//!
//! The actor owns every piece of protocol state — the stream registry,
//! credit ledgers, reassembly buffers, keepalive timers, and lease
//! accounting — and serialises all frame emission and state transitions
//! on a single `tokio::select!` loop. Application handlers never run
//! protocol code: responder sources are polled by the loop under credit,
//! and inbound payloads reach applications through channels.

pub(crate) mod event;
pub mod keepalive;
pub mod lease;
pub mod state;

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt, stream};
use tokio::sync::mpsc;
use tokio_stream::StreamMap;
use tokio_util::sync::CancellationToken;

pub(crate) use event::Command;
use keepalive::KeepaliveTimer;
use lease::Leases;
pub use state::ConnectionState;

use crate::{
    config::ConnectionConfig,
    error::{Error, ErrorCode},
    fragment::{Fragmenter, Reassembler},
    frame::{
        ErrorBody,
        Frame,
        FrameBody,
        Keepalive as KeepaliveBody,
        Lease as LeaseBody,
        MetadataPush as MetadataPushBody,
        PayloadFrame,
        RequestChannel as RequestChannelBody,
        RequestFnf as RequestFnfBody,
        RequestN as RequestNBody,
        RequestResponse as RequestResponseBody,
        RequestStream as RequestStreamBody,
        Setup,
        StreamId,
        Version,
    },
    handler::Responder,
    payload::Payload,
    requester::PayloadReceiver,
    stream::{
        Pattern,
        Role,
        Side,
        SourceItem,
        SourceStream,
        StreamEntry,
        StreamEvent,
        Tombstones,
        into_source,
    },
    transport::FrameIo,
};

/// Server-side SETUP acceptor.
///
/// Inspects the decoded handshake and either admits the connection or
/// rejects it with a reason, which travels to the client inside
/// ERROR(REJECTED_SETUP).
pub type SetupAcceptor = Box<dyn Fn(&Setup) -> std::result::Result<(), String> + Send + Sync>;

/// Handle to a spawned connection task.
///
/// Lets the owner request shutdown and await the connection's final
/// outcome. Dropping the handle leaves the connection running; it closes
/// once every [`Requester`](crate::requester::Requester) clone is gone.
pub struct ConnectionHandle {
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<crate::error::Result<()>>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        shutdown: CancellationToken,
        task: tokio::task::JoinHandle<crate::error::Result<()>>,
    ) -> Self {
        Self { shutdown, task }
    }

    /// Request a graceful close.
    pub fn shutdown(&self) { self.shutdown.cancel(); }

    /// Whether the connection task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool { self.task.is_finished() }

    /// Wait for the connection to finish and return its outcome.
    ///
    /// # Errors
    ///
    /// Returns the connection's fatal error, or an I/O error when the
    /// driving task panicked.
    pub async fn closed(self) -> crate::error::Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(join_error) => Err(Error::Io(std::io::Error::other(join_error))),
        }
    }
}

/// Why the actor stopped.
enum Shutdown {
    /// Orderly close; outstanding requester streams fail with
    /// [`Error::ConnectionClosed`].
    Graceful,
    /// The connection failed.
    Failed {
        /// Error surfaced from [`Connection::run`].
        error: Error,
        /// Wire code to report to the peer, when the fault is local and
        /// the peer has not already been told.
        notify: Option<ErrorCode>,
    },
}

impl Shutdown {
    fn local(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failed {
            error: Error::Connection { code, message: message.into() },
            notify: Some(code),
        }
    }

    fn remote(error: Error) -> Self { Self::Failed { error, notify: None } }
}

/// Map a transport-layer failure onto a shutdown reason.
///
/// Wire errors are local detections the peer should hear about; anything
/// else means the transport is unusable.
fn classify_transport(error: Error) -> Shutdown {
    match error {
        Error::Frame(_) => Shutdown::Failed { error, notify: Some(ErrorCode::ConnectionError) },
        other => Shutdown::remote(other),
    }
}

fn loss_error(cause: Option<&Error>) -> Error {
    match cause {
        Some(Error::Connection { code, message }) => {
            Error::Connection { code: *code, message: message.clone() }
        }
        Some(Error::Io(error)) => Error::Io(std::io::Error::new(error.kind(), error.to_string())),
        _ => Error::ConnectionClosed,
    }
}

/// An ERROR frame reporting `error`, preserving application payloads.
fn error_frame_for(id: StreamId, error: &Error) -> Frame {
    match error {
        Error::Application(payload) => Frame::new(
            id,
            FrameBody::Error(ErrorBody {
                code: ErrorCode::ApplicationError,
                data: payload.data().clone(),
            }),
        ),
        error => Frame::error(id, error.wire_code(), error.to_string()),
    }
}

type Step = std::result::Result<(), Shutdown>;

/// How an inbound request frame on a given id is treated.
enum Admission {
    /// A fresh stream; dispatch it.
    New,
    /// A replay inside the tombstone horizon; drop it silently.
    Replay,
    /// An id that is live or belongs to us; a protocol violation.
    Violation,
}

/// Outcome of inspecting an inbound PAYLOAD against its stream entry.
enum PayloadAction {
    Reject(&'static str),
    MaybeFinish,
}

/// The per-connection protocol actor.
///
/// Created by [`Client`](crate::client::Client) or
/// [`Server`](crate::server::Server); [`run`](Connection::run) drives it
/// to completion and resolves with the reason the connection ended.
pub struct Connection<T> {
    io: T,
    role: Role,
    config: ConnectionConfig,
    state: ConnectionState,
    commands: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
    handler: Arc<dyn Responder>,
    acceptor: Option<SetupAcceptor>,
    streams: HashMap<StreamId, StreamEntry>,
    tombstones: Tombstones,
    sources: StreamMap<StreamId, SourceStream>,
    reassembler: Reassembler,
    fragmenter: Fragmenter,
    keepalive: KeepaliveTimer,
    leases: Leases,
    shutdown: CancellationToken,
}

impl<T: FrameIo> Connection<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        io: T,
        role: Role,
        config: ConnectionConfig,
        handler: Arc<dyn Responder>,
        acceptor: Option<SetupAcceptor>,
        commands: mpsc::UnboundedReceiver<Command>,
        command_tx: mpsc::UnboundedSender<Command>,
        shutdown: CancellationToken,
    ) -> Self {
        let keepalive = KeepaliveTimer::new(config.keepalive_interval, config.max_lifetime);
        let tombstones = Tombstones::new(config.tombstone_horizon());
        let reassembler = Reassembler::new(config.reassembly_max_bytes);
        let fragmenter = Fragmenter::new(config.fragment_size);
        // The server learns the lease flag from SETUP.
        let leases = Leases::new(role == Role::Client && config.honor_lease);
        Self {
            io,
            role,
            config,
            state: ConnectionState::Connecting,
            commands,
            command_tx,
            handler,
            acceptor,
            streams: HashMap::new(),
            tombstones,
            sources: StreamMap::new(),
            reassembler,
            fragmenter,
            keepalive,
            leases,
            shutdown,
        }
    }

    /// Drive the connection until it closes.
    ///
    /// Resolves with `Ok(())` after a graceful close and with the
    /// connection's fatal error otherwise. Either way, every outstanding
    /// requester-side stream is failed before this returns.
    ///
    /// # Errors
    ///
    /// Returns the connection-fatal [`Error`]: a wire fault, a peer
    /// ERROR, a keepalive timeout, or transport loss.
    pub async fn run(mut self) -> crate::error::Result<()> {
        let shutdown = self.drive().await;
        let result = match shutdown {
            Shutdown::Graceful => Ok(()),
            Shutdown::Failed { error, notify } => {
                if let Some(code) = notify {
                    let frame = Frame::error(StreamId::CONNECTION, code, error.to_string());
                    if let Err(send_error) = self.io.send(frame).await {
                        log::debug!("could not report {code} to the peer: {send_error}");
                    }
                }
                Err(error)
            }
        };
        if let Err(close_error) = self.io.close().await {
            log::debug!("transport close failed: {close_error}");
        }
        self.state.advance(ConnectionState::Closed);
        self.fail_outstanding(result.as_ref().err());
        result
    }

    async fn drive(&mut self) -> Shutdown {
        self.state.advance(ConnectionState::SettingUp);
        if let Err(shutdown) = self.handshake().await {
            return shutdown;
        }
        self.state.advance(ConnectionState::Active);
        loop {
            if let Err(shutdown) = self.step().await {
                return shutdown;
            }
        }
    }

    async fn step(&mut self) -> Step {
        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => self.begin_close().await,

            inbound = self.io.next() => match inbound {
                Some(Ok(frame)) => self.on_frame(frame).await,
                Some(Err(error)) => Err(classify_transport(error)),
                None => Err(Shutdown::remote(Error::ConnectionClosed)),
            },

            command = self.commands.recv() => match command {
                Some(command) => self.on_command(command).await,
                // Every facade handle has been dropped.
                None => self.begin_close().await,
            },

            () = self.keepalive.tick() => self.on_keepalive_tick().await,

            Some((id, item)) = self.sources.next(), if !self.sources.is_empty() => {
                self.on_source_item(id, item).await
            }
        }
    }

    // ---- handshake -----------------------------------------------------

    async fn handshake(&mut self) -> Step {
        match self.role {
            Role::Client => {
                let setup = self.setup_frame();
                self.send_raw(setup).await
            }
            Role::Server => self.accept_setup().await,
        }
    }

    fn setup_frame(&self) -> Frame {
        Frame::new(
            StreamId::CONNECTION,
            FrameBody::Setup(Setup {
                version: Version::V1,
                keepalive_interval_ms: self.config.keepalive_interval_ms(),
                max_lifetime_ms: self.config.max_lifetime_ms(),
                resume_token: None,
                metadata_mime: self.config.metadata_mime.clone(),
                data_mime: self.config.data_mime.clone(),
                lease: self.config.honor_lease,
                payload: self.config.setup_payload.clone().unwrap_or_default(),
            }),
        )
    }

    async fn accept_setup(&mut self) -> Step {
        let frame = match self.io.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => return Err(classify_transport(error)),
            None => return Err(Shutdown::remote(Error::ConnectionClosed)),
        };
        if !frame.is_connection() {
            return self
                .reject_setup(ErrorCode::InvalidSetup, "first frame must be SETUP")
                .await;
        }
        match frame.body {
            FrameBody::Setup(setup) => self.apply_setup(setup).await,
            FrameBody::Resume(_) => {
                self.reject_setup(ErrorCode::RejectedResume, "resumption is not supported")
                    .await
            }
            _ => {
                self.reject_setup(ErrorCode::InvalidSetup, "first frame must be SETUP")
                    .await
            }
        }
    }

    async fn apply_setup(&mut self, setup: Setup) -> Step {
        if setup.version.major != Version::V1.major {
            let reason = format!("unsupported protocol version {}", setup.version);
            return self.reject_setup(ErrorCode::UnsupportedSetup, reason).await;
        }
        if setup.resume_token.is_some() {
            return self
                .reject_setup(ErrorCode::RejectedResume, "resumption is not supported")
                .await;
        }
        if let Some(acceptor) = &self.acceptor
            && let Err(reason) = acceptor(&setup)
        {
            return self.reject_setup(ErrorCode::RejectedSetup, reason).await;
        }
        // The client's declared settings govern both directions.
        let cadence = Duration::from_millis(u64::from(setup.keepalive_interval_ms));
        let lifetime = Duration::from_millis(u64::from(setup.max_lifetime_ms));
        self.config.keepalive_interval = cadence;
        self.config.max_lifetime = lifetime;
        self.keepalive = KeepaliveTimer::new(cadence, lifetime);
        self.tombstones.set_horizon(cadence * 2);
        self.leases.set_enabled(setup.lease);
        log::debug!(
            "setup accepted: keepalive {cadence:?}, lifetime {lifetime:?}, lease {}",
            setup.lease
        );
        Ok(())
    }

    async fn reject_setup(&mut self, code: ErrorCode, reason: impl Into<String>) -> Step {
        let reason = reason.into();
        log::warn!("rejecting setup ({code}): {reason}");
        let frame = Frame::error(StreamId::CONNECTION, code, reason.clone());
        if let Err(error) = self.io.send(frame).await {
            log::debug!("could not report setup rejection: {error}");
        }
        Err(Shutdown::Failed {
            error: Error::Connection { code, message: reason },
            notify: None,
        })
    }

    // ---- connection-level frames ---------------------------------------

    async fn on_frame(&mut self, frame: Frame) -> Step {
        log::trace!("recv {:?} on stream {}", frame.frame_type(), frame.stream_id);
        if frame.is_connection() {
            return self.on_connection_frame(frame).await;
        }
        let whole = match self.reassembler.absorb(frame) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(error) => {
                let id = error.stream_id();
                if error.is_fatal() {
                    return Err(Shutdown::local(ErrorCode::ConnectionError, error.to_string()));
                }
                log::warn!("fragment violation on stream {id}: {error}");
                return self
                    .reject_stream(id, ErrorCode::Invalid, &error.to_string())
                    .await;
            }
        };
        self.on_stream_frame(whole).await
    }

    async fn on_connection_frame(&mut self, frame: Frame) -> Step {
        let frame_type = frame.frame_type();
        match frame.body {
            FrameBody::Setup(_) => {
                Err(Shutdown::local(ErrorCode::ConnectionError, "unexpected second SETUP"))
            }
            FrameBody::Lease(lease) => {
                self.leases.on_received(lease.ttl_ms, lease.requests);
                Ok(())
            }
            FrameBody::Keepalive(keepalive) => {
                self.keepalive.record_heard();
                if keepalive.respond {
                    let echo = Frame::new(
                        StreamId::CONNECTION,
                        FrameBody::Keepalive(KeepaliveBody {
                            respond: false,
                            last_position: 0,
                            data: keepalive.data,
                        }),
                    );
                    return self.send_raw(echo).await;
                }
                Ok(())
            }
            FrameBody::Error(body) => match body.code {
                ErrorCode::ConnectionClose => {
                    log::debug!("peer closed the connection");
                    self.state.advance(ConnectionState::Closing);
                    Err(Shutdown::Graceful)
                }
                code => Err(Shutdown::remote(Error::from_wire(code, body.data))),
            },
            FrameBody::MetadataPush(push) => {
                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    if let Err(error) = handler.metadata_push(push.metadata).await {
                        log::debug!("metadata push handler failed: {error}");
                    }
                });
                Ok(())
            }
            FrameBody::Resume(_) | FrameBody::ResumeOk(_) => {
                Err(Shutdown::local(ErrorCode::RejectedResume, "resumption is not supported"))
            }
            FrameBody::Ext(ext) => {
                if ext.can_ignore {
                    log::debug!("ignoring unknown extension {:#x}", ext.extended_type);
                    return Ok(());
                }
                Err(Shutdown::local(
                    ErrorCode::ConnectionError,
                    format!("unsupported extension {:#x}", ext.extended_type),
                ))
            }
            _ => Err(Shutdown::local(
                ErrorCode::ConnectionError,
                format!("{frame_type:?} frame on stream 0"),
            )),
        }
    }

    // ---- stream-level frames -------------------------------------------

    async fn on_stream_frame(&mut self, frame: Frame) -> Step {
        let id = frame.stream_id;
        match frame.body {
            FrameBody::RequestResponse(body) => {
                self.on_inbound_request_response(id, body.payload).await
            }
            FrameBody::RequestFnf(body) => self.on_inbound_fnf(id, body.payload).await,
            FrameBody::RequestStream(body) => {
                self.on_inbound_request_stream(id, body.initial_n, body.payload).await
            }
            FrameBody::RequestChannel(body) => self.on_inbound_request_channel(id, body).await,
            FrameBody::RequestN(body) => self.on_inbound_request_n(id, body.n).await,
            FrameBody::Cancel => self.on_inbound_cancel(id).await,
            FrameBody::Payload(body) => self.on_inbound_payload(id, body).await,
            FrameBody::Error(body) => self.on_inbound_error(id, &body),
            FrameBody::Ext(ext) if ext.can_ignore => Ok(()),
            body => Err(Shutdown::local(
                ErrorCode::ConnectionError,
                format!("{:?} frame on stream {id}", body.frame_type()),
            )),
        }
    }

    fn admit_request(&mut self, id: StreamId) -> Admission {
        if self.streams.contains_key(&id) {
            return Admission::Violation;
        }
        if self.tombstones.contains(id) {
            return Admission::Replay;
        }
        if self.role.owns(id) {
            return Admission::Violation;
        }
        Admission::New
    }

    /// Run the shared admission gate for an inbound request frame.
    ///
    /// Returns `Ok(true)` when the request may proceed; replays and
    /// violations are handled (or silently dropped) internally.
    async fn admit_or_reject(&mut self, id: StreamId) -> std::result::Result<bool, Shutdown> {
        match self.admit_request(id) {
            Admission::New => {}
            Admission::Replay => {
                log::trace!("replayed request on terminated stream {id} dropped");
                return Ok(false);
            }
            Admission::Violation => {
                self.reject_stream(id, ErrorCode::Invalid, "request on a live or local stream id")
                    .await?;
                return Ok(false);
            }
        }
        if !self.leases.admit_inbound() {
            self.tombstones.bury(id);
            self.send_frame(Frame::error(id, ErrorCode::Rejected, "lease exhausted"))
                .await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn on_inbound_request_response(&mut self, id: StreamId, payload: Payload) -> Step {
        if !self.admit_or_reject(id).await? {
            return Ok(());
        }
        let handler = Arc::clone(&self.handler);
        let source = into_source(
            stream::once(async move { handler.request_response(payload).await }).boxed(),
        );
        self.streams.insert(id, StreamEntry::responder_response());
        self.sources.insert(id, source);
        Ok(())
    }

    async fn on_inbound_fnf(&mut self, id: StreamId, payload: Payload) -> Step {
        if !self.admit_or_reject(id).await? {
            return Ok(());
        }
        // No stream state survives the request; the id is buried so late
        // fragments cannot masquerade as a new stream.
        self.tombstones.bury(id);
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            if let Err(error) = handler.fire_and_forget(payload).await {
                log::debug!("fire-and-forget handler failed: {error}");
            }
        });
        Ok(())
    }

    async fn on_inbound_request_stream(
        &mut self,
        id: StreamId,
        initial_n: u32,
        payload: Payload,
    ) -> Step {
        if !self.admit_or_reject(id).await? {
            return Ok(());
        }
        match self.handler.request_stream(payload) {
            Ok(outbound) => {
                self.streams.insert(id, StreamEntry::responder_stream(initial_n));
                self.sources.insert(id, into_source(outbound));
                Ok(())
            }
            Err(error) => {
                self.tombstones.bury(id);
                let frame = error_frame_for(id, &error);
                self.send_frame(frame).await
            }
        }
    }

    async fn on_inbound_request_channel(&mut self, id: StreamId, body: RequestChannelBody) -> Step {
        if !self.admit_or_reject(id).await? {
            return Ok(());
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let receiver = PayloadReceiver::from_parts(id, events_rx, self.command_tx.clone());
        match self.handler.request_channel(body.payload, receiver) {
            Ok(outbound) => {
                if body.complete {
                    // The requester closed its direction in the opening frame.
                    let _ = events_tx.send(StreamEvent::Complete);
                }
                let entry = StreamEntry::responder_channel(events_tx, body.initial_n, body.complete);
                self.streams.insert(id, entry);
                self.sources.insert(id, into_source(outbound));
                Ok(())
            }
            Err(error) => {
                self.tombstones.bury(id);
                let frame = error_frame_for(id, &error);
                self.send_frame(frame).await
            }
        }
    }

    async fn on_inbound_request_n(&mut self, id: StreamId, n: u32) -> Step {
        if self.streams.contains_key(&id) {
            if let Some(entry) = self.streams.get_mut(&id) {
                entry.outbound_credit.add(n);
            }
            return self.pump_stream(id).await;
        }
        // Late REQUEST_N frames are dropped silently, tombstoned or not.
        log::trace!("request-n on unknown stream {id} dropped");
        Ok(())
    }

    async fn on_inbound_cancel(&mut self, id: StreamId) -> Step {
        let Some(side) = self.streams.get(&id).map(|entry| entry.side) else {
            if !self.tombstones.contains(id) {
                log::warn!("cancel on unknown stream {id} dropped");
            }
            return Ok(());
        };
        match side {
            Side::Responder => {
                // Best-effort stop: dropping the source abandons the work.
                if let Some(mut entry) = self.streams.remove(&id) {
                    entry.fail(Error::Canceled);
                }
                self.finish_stream(id);
                Ok(())
            }
            Side::Requester => {
                // The responder no longer wants our outbound direction.
                self.sources.remove(&id);
                let mut finished = false;
                if let Some(entry) = self.streams.get_mut(&id) {
                    entry.parked = None;
                    entry.buffered = None;
                    entry.outbound_done = true;
                    finished = entry.is_terminated();
                }
                if finished {
                    self.finish_stream(id);
                }
                Ok(())
            }
        }
    }

    async fn on_inbound_payload(&mut self, id: StreamId, body: PayloadFrame) -> Step {
        let action = {
            let Some(entry) = self.streams.get_mut(&id) else {
                if self.tombstones.contains(id) {
                    log::trace!("post-terminal payload on stream {id} discarded");
                    return Ok(());
                }
                return self
                    .reject_stream(id, ErrorCode::Invalid, "payload on unknown stream")
                    .await;
            };
            if entry.inbound_done {
                PayloadAction::Reject("payload after completion")
            } else if entry.pattern == Pattern::Response {
                if body.complete {
                    if let Some(reply) = entry.reply.take() {
                        let _ = reply.send(Ok(body.payload));
                    }
                    entry.inbound_done = true;
                    PayloadAction::MaybeFinish
                } else {
                    PayloadAction::Reject("response stream expects a single terminal payload")
                }
            } else if body.next && !entry.credit_owed.try_consume() {
                PayloadAction::Reject("payload exceeds granted request-n credit")
            } else {
                if body.next
                    && let Some(events) = &entry.events
                {
                    let _ = events.send(StreamEvent::Next(body.payload));
                }
                if body.complete {
                    if let Some(events) = entry.events.take() {
                        let _ = events.send(StreamEvent::Complete);
                    }
                    entry.inbound_done = true;
                }
                PayloadAction::MaybeFinish
            }
        };
        match action {
            PayloadAction::Reject(reason) => {
                self.reject_stream(id, ErrorCode::Invalid, reason).await
            }
            PayloadAction::MaybeFinish => {
                if self.streams.get(&id).is_some_and(StreamEntry::is_terminated) {
                    self.finish_stream(id);
                }
                Ok(())
            }
        }
    }

    fn on_inbound_error(&mut self, id: StreamId, body: &ErrorBody) -> Step {
        if let Some(mut entry) = self.streams.remove(&id) {
            log::debug!("stream {id} failed by peer: {}", body.code);
            entry.fail(Error::from_wire(body.code, body.data.clone()));
            self.finish_stream(id);
        } else if !self.tombstones.contains(id) {
            // Answering an ERROR with an ERROR invites a ping-pong; drop it.
            log::warn!("error frame on unknown stream {id} dropped: {}", body.message());
        }
        Ok(())
    }

    // ---- facade commands -----------------------------------------------

    async fn on_command(&mut self, command: Command) -> Step {
        match command {
            Command::FireAndForget { id, payload, done } => {
                if let Err(error) = self.leases.check_outbound() {
                    let _ = done.send(Err(error));
                    return Ok(());
                }
                let frame =
                    Frame::new(id, FrameBody::RequestFnf(RequestFnfBody { payload, follows: false }));
                self.send_frame(frame).await?;
                let _ = done.send(Ok(()));
                Ok(())
            }
            Command::MetadataPush { metadata, done } => {
                let frame = Frame::new(
                    StreamId::CONNECTION,
                    FrameBody::MetadataPush(MetadataPushBody { metadata }),
                );
                self.send_raw(frame).await?;
                let _ = done.send(Ok(()));
                Ok(())
            }
            Command::RequestResponse { id, payload, reply } => {
                if let Err(error) = self.leases.check_outbound() {
                    let _ = reply.send(Err(error));
                    return Ok(());
                }
                self.streams.insert(id, StreamEntry::requester_response(reply));
                let frame = Frame::new(
                    id,
                    FrameBody::RequestResponse(RequestResponseBody { payload, follows: false }),
                );
                self.send_frame(frame).await
            }
            Command::RequestStream { id, payload, initial_n, events } => {
                if let Err(error) = self.leases.check_outbound() {
                    let _ = events.send(StreamEvent::Failed(error));
                    return Ok(());
                }
                self.streams.insert(id, StreamEntry::requester_stream(events, initial_n));
                let frame = Frame::new(
                    id,
                    FrameBody::RequestStream(RequestStreamBody {
                        initial_n,
                        payload,
                        follows: false,
                    }),
                );
                self.send_frame(frame).await
            }
            Command::RequestChannel { id, initial, outbound, initial_n, events } => {
                if let Err(error) = self.leases.check_outbound() {
                    let _ = events.send(StreamEvent::Failed(error));
                    return Ok(());
                }
                let entry = StreamEntry::requester_channel(events, into_source(outbound), initial_n);
                self.streams.insert(id, entry);
                let frame = Frame::new(
                    id,
                    FrameBody::RequestChannel(RequestChannelBody {
                        initial_n,
                        payload: initial,
                        follows: false,
                        complete: false,
                    }),
                );
                self.send_frame(frame).await
            }
            Command::RequestN { id, n } => {
                let mut granted = false;
                if let Some(entry) = self.streams.get_mut(&id)
                    && !entry.inbound_done
                {
                    entry.credit_owed.add(n);
                    granted = true;
                }
                if granted {
                    let frame = Frame::new(id, FrameBody::RequestN(RequestNBody { n }));
                    return self.send_frame(frame).await;
                }
                Ok(())
            }
            Command::CancelStream { id } => self.on_local_cancel(id).await,
            Command::GrantLease { ttl, requests, done } => {
                if !self.leases.is_enabled() {
                    let _ = done.send(Err(Error::rejected("leases are not enabled")));
                    return Ok(());
                }
                self.leases.on_granted(ttl, requests);
                let ttl_ms = u32::try_from(ttl.as_millis()).unwrap_or(u32::MAX).min(0x7FFF_FFFF);
                let frame = Frame::new(
                    StreamId::CONNECTION,
                    FrameBody::Lease(LeaseBody { ttl_ms, requests, metadata: None }),
                );
                self.send_raw(frame).await?;
                let _ = done.send(Ok(()));
                Ok(())
            }
            Command::Close => self.begin_close().await,
        }
    }

    async fn on_local_cancel(&mut self, id: StreamId) -> Step {
        let Some(side) = self.streams.get(&id).map(|entry| entry.side) else {
            return Ok(());
        };
        match side {
            Side::Requester => {
                // The consumer abandoned the whole interaction.
                self.streams.remove(&id);
                self.finish_stream(id);
                self.send_frame(Frame::cancel(id)).await
            }
            Side::Responder => {
                // The handler dropped its inbound receiver: cancel only
                // the requester's outbound direction.
                let mut cancel = false;
                let mut finished = false;
                if let Some(entry) = self.streams.get_mut(&id)
                    && !entry.inbound_done
                {
                    entry.events = None;
                    entry.inbound_done = true;
                    cancel = true;
                    finished = entry.is_terminated();
                }
                if cancel {
                    self.send_frame(Frame::cancel(id)).await?;
                }
                if finished {
                    self.finish_stream(id);
                }
                Ok(())
            }
        }
    }

    // ---- outbound sources ----------------------------------------------

    async fn on_source_item(&mut self, id: StreamId, item: SourceItem) -> Step {
        match item {
            SourceItem::Next(Ok(payload)) => self.emit_from_source(id, payload).await,
            SourceItem::Next(Err(error)) => {
                log::debug!("outbound source for stream {id} failed: {error}");
                let frame = error_frame_for(id, &error);
                if let Some(mut entry) = self.streams.remove(&id) {
                    entry.fail(Error::Canceled);
                }
                self.finish_stream(id);
                self.send_frame(frame).await
            }
            SourceItem::End => self.complete_outbound(id).await,
        }
    }

    async fn emit_from_source(&mut self, id: StreamId, payload: Payload) -> Step {
        let Some(entry) = self.streams.get_mut(&id) else {
            // Raced with termination; drop the item and the source.
            self.sources.remove(&id);
            return Ok(());
        };
        if entry.outbound_credit.try_consume() {
            self.emit_next(id, payload).await
        } else {
            // One item of lookahead: buffer it and park the source until
            // the peer grants more credit. Completion is not credit-gated,
            // so the source's end marker must stay reachable via the
            // parked stream, not be dropped here.
            entry.buffered = Some(payload);
            if let Some(source) = self.sources.remove(&id)
                && let Some(entry) = self.streams.get_mut(&id)
            {
                entry.parked = Some(source);
            }
            Ok(())
        }
    }

    async fn emit_next(&mut self, id: StreamId, payload: Payload) -> Step {
        let mut finished = false;
        let mut frame = None;
        if let Some(entry) = self.streams.get_mut(&id) {
            frame = Some(match entry.pattern {
                Pattern::Response => {
                    entry.outbound_done = true;
                    finished = entry.is_terminated();
                    Frame::last_payload(id, payload)
                }
                _ => Frame::next_payload(id, payload),
            });
        }
        let Some(frame) = frame else { return Ok(()) };
        self.send_frame(frame).await?;
        if finished {
            self.finish_stream(id);
        }
        Ok(())
    }

    async fn complete_outbound(&mut self, id: StreamId) -> Step {
        self.sources.remove(&id);
        let mut send_complete = false;
        if let Some(entry) = self.streams.get_mut(&id) {
            if entry.buffered.is_some() {
                // Completion is deferred until the buffered payload drains.
                entry.end_of_source = true;
            } else if !entry.outbound_done {
                entry.outbound_done = true;
                send_complete = true;
            }
        }
        if send_complete {
            self.send_frame(Frame::complete(id)).await?;
        }
        if self.streams.get(&id).is_some_and(StreamEntry::is_terminated) {
            self.finish_stream(id);
        }
        Ok(())
    }

    /// React to newly granted credit: flush the buffered payload, send a
    /// deferred completion, and re-admit a parked source.
    async fn pump_stream(&mut self, id: StreamId) -> Step {
        let mut flushed = None;
        if let Some(entry) = self.streams.get_mut(&id)
            && entry.buffered.is_some()
            && entry.outbound_credit.try_consume()
        {
            flushed = entry.buffered.take();
        }
        if let Some(payload) = flushed {
            self.emit_next(id, payload).await?;
        }

        let mut complete = false;
        if let Some(entry) = self.streams.get_mut(&id)
            && entry.end_of_source
            && entry.buffered.is_none()
            && !entry.outbound_done
        {
            entry.outbound_done = true;
            complete = true;
        }
        if complete {
            self.send_frame(Frame::complete(id)).await?;
            if self.streams.get(&id).is_some_and(StreamEntry::is_terminated) {
                self.finish_stream(id);
            }
            return Ok(());
        }

        let mut unparked = None;
        if let Some(entry) = self.streams.get_mut(&id)
            && entry.buffered.is_none()
            && !entry.outbound_credit.is_exhausted()
            && entry.parked.is_some()
        {
            unparked = entry.parked.take();
        }
        if let Some(source) = unparked {
            self.sources.insert(id, source);
        }
        Ok(())
    }

    // ---- shared plumbing -----------------------------------------------

    async fn on_keepalive_tick(&mut self) -> Step {
        if self.keepalive.is_overdue() {
            let message = format!("no keepalive within {:?}", self.config.max_lifetime);
            log::error!("{message}");
            return Err(Shutdown::local(ErrorCode::ConnectionError, message));
        }
        let frame = Frame::new(
            StreamId::CONNECTION,
            FrameBody::Keepalive(KeepaliveBody {
                respond: true,
                last_position: 0,
                data: Bytes::new(),
            }),
        );
        self.send_raw(frame).await
    }

    async fn begin_close(&mut self) -> Step {
        self.state.advance(ConnectionState::Closing);
        let frame =
            Frame::error(StreamId::CONNECTION, ErrorCode::ConnectionClose, "connection closed");
        if let Err(error) = self.io.send(frame).await {
            log::debug!("close notification failed: {error}");
        }
        Err(Shutdown::Graceful)
    }

    /// Fail a stream with ERROR(`code`) and drop its local state.
    async fn reject_stream(&mut self, id: StreamId, code: ErrorCode, reason: &str) -> Step {
        log::warn!("rejecting stream {id} ({code}): {reason}");
        if let Some(mut entry) = self.streams.remove(&id) {
            entry.fail(Error::Stream { code, message: reason.to_owned() });
        }
        self.finish_stream(id);
        self.send_frame(Frame::error(id, code, reason)).await
    }

    fn finish_stream(&mut self, id: StreamId) {
        self.streams.remove(&id);
        self.sources.remove(&id);
        self.reassembler.abandon(id);
        self.tombstones.bury(id);
        log::debug!("stream {id} terminated");
    }

    /// Send a frame, fragmenting it when it exceeds the negotiated size.
    async fn send_frame(&mut self, frame: Frame) -> Step {
        for fragment in self.fragmenter.fragment(frame) {
            log::trace!("send {:?} on stream {}", fragment.frame_type(), fragment.stream_id);
            self.io.send(fragment).await.map_err(classify_transport)?;
        }
        Ok(())
    }

    /// Send a frame that is never fragmented (connection frames).
    async fn send_raw(&mut self, frame: Frame) -> Step {
        log::trace!("send {:?} on stream {}", frame.frame_type(), frame.stream_id);
        self.io.send(frame).await.map_err(classify_transport)
    }

    fn fail_outstanding(&mut self, cause: Option<&Error>) {
        for (id, mut entry) in self.streams.drain() {
            log::debug!("failing stream {id}: connection terminated");
            entry.fail(loss_error(cause));
        }
        self.sources = StreamMap::new();
    }
}
