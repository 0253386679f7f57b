//! Client endpoint: configure, connect, and spawn the connection actor.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConnectionConfig,
    connection::{Connection, ConnectionHandle},
    handler::Responder,
    payload::Payload,
    requester::Requester,
    stream::{Role, StreamIdAllocator},
    transport::FrameIo,
};

/// Builder for the initiating side of a connection.
///
/// # Examples
///
/// ```no_run
/// # async fn demo() -> weft::Result<()> {
/// let socket = tokio::net::TcpStream::connect("127.0.0.1:7878").await?;
/// let (requester, _connection) = weft::Client::new()
///     .keepalive_interval(std::time::Duration::from_secs(30))
///     .connect(weft::transport::framed(socket));
/// let reply = requester.request_response(weft::Payload::from_data("ping")).await?;
/// # let _ = reply;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ConnectionConfig,
    responder: Arc<dyn Responder>,
}

impl Default for Client {
    fn default() -> Self { Self::new() }
}

impl Client {
    /// Start from the default configuration and a reject-all responder.
    #[must_use]
    pub fn new() -> Self {
        Self { config: ConnectionConfig::default(), responder: Arc::new(()) }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Cadence of outbound keepalive frames.
    #[must_use]
    pub fn keepalive_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Liveness deadline for the peer's keepalive echo.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: std::time::Duration) -> Self {
        self.config.max_lifetime = lifetime;
        self
    }

    /// MIME types advertised for metadata and data.
    #[must_use]
    pub fn mime_types(mut self, metadata: impl Into<String>, data: impl Into<String>) -> Self {
        self.config.metadata_mime = metadata.into();
        self.config.data_mime = data.into();
        self
    }

    /// Enable lease semantics: requests wait for responder-issued leases.
    #[must_use]
    pub fn honor_lease(mut self) -> Self {
        self.config.honor_lease = true;
        self
    }

    /// Fragment frames whose payload exceeds `bytes` (zero disables).
    #[must_use]
    pub fn fragment_size(mut self, bytes: usize) -> Self {
        self.config.fragment_size = bytes;
        self
    }

    /// Cap the per-stream reassembly buffer.
    #[must_use]
    pub fn reassembly_limit(mut self, bytes: usize) -> Self {
        self.config.reassembly_max_bytes = bytes;
        self
    }

    /// Payload carried inside the SETUP frame.
    #[must_use]
    pub fn setup_payload(mut self, payload: Payload) -> Self {
        self.config.setup_payload = Some(payload);
        self
    }

    /// Serve inbound interactions with `responder`.
    #[must_use]
    pub fn responder(mut self, responder: impl Responder) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    /// Send SETUP over `io` and spawn the connection actor.
    ///
    /// Returns the requester facade plus a handle to the spawned task.
    /// Must be called within a tokio runtime.
    pub fn connect<T>(self, io: T) -> (Requester, ConnectionHandle)
    where
        T: FrameIo + 'static,
    {
        spawn_connection(io, Role::Client, self.config, self.responder, None)
    }
}

pub(crate) fn spawn_connection<T>(
    io: T,
    role: Role,
    config: ConnectionConfig,
    responder: Arc<dyn Responder>,
    acceptor: Option<crate::connection::SetupAcceptor>,
) -> (Requester, ConnectionHandle)
where
    T: FrameIo + 'static,
{
    let shutdown = CancellationToken::new();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let allocator = Arc::new(StreamIdAllocator::new(role));
    let connection = Connection::new(
        io,
        role,
        config,
        responder,
        acceptor,
        command_rx,
        command_tx.clone(),
        shutdown.clone(),
    );
    let task = tokio::spawn(connection.run());
    (
        Requester::from_parts(command_tx, allocator),
        ConnectionHandle::new(shutdown, task),
    )
}
