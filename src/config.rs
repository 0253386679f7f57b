//! Connection configuration types.
//!
//! [`ConnectionConfig`] gathers every negotiable SETUP parameter plus the
//! local resource bounds that never appear on the wire (fragment size,
//! reassembly cap). Defaults follow the protocol's recommended values.

use std::time::Duration;

use crate::payload::Payload;

/// Default MIME type advertised for metadata and data.
pub const DEFAULT_MIME: &str = "application/binary";

/// Default keepalive cadence.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Default liveness deadline.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(60);

/// Default fragment threshold and reassembly cap (16 MiB).
///
/// At this size fragmentation is effectively off for ordinary payloads.
pub const DEFAULT_FRAGMENT_SIZE: usize = 16 * 1024 * 1024;

/// Parameters governing a single connection.
///
/// The client's values are carried in SETUP and govern both directions;
/// a server adopts the keepalive settings the SETUP declares.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Cadence of outbound KEEPALIVE(R=1) frames.
    pub keepalive_interval: Duration,
    /// Deadline after which a silent peer is considered dead.
    pub max_lifetime: Duration,
    /// MIME type describing payload metadata.
    pub metadata_mime: String,
    /// MIME type describing payload data.
    pub data_mime: String,
    /// Whether requests are gated by responder-issued leases.
    pub honor_lease: bool,
    /// Frames whose payload exceeds this many bytes are fragmented.
    /// Zero disables fragmentation entirely.
    pub fragment_size: usize,
    /// Cap on the pending reassembly buffer per stream.
    pub reassembly_max_bytes: usize,
    /// Payload carried inside the SETUP frame.
    pub setup_payload: Option<Payload>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            metadata_mime: DEFAULT_MIME.to_owned(),
            data_mime: DEFAULT_MIME.to_owned(),
            honor_lease: false,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            reassembly_max_bytes: DEFAULT_FRAGMENT_SIZE,
            setup_payload: None,
        }
    }
}

impl ConnectionConfig {
    /// Retention horizon for terminated stream ids.
    ///
    /// Twice the keepalive interval: long enough to swallow a late CANCEL
    /// or REQUEST_N that was in flight when the stream terminated.
    #[must_use]
    pub fn tombstone_horizon(&self) -> Duration { self.keepalive_interval * 2 }

    /// The keepalive interval as the 31-bit millisecond value SETUP carries.
    #[must_use]
    pub fn keepalive_interval_ms(&self) -> u32 { clamp_u31_millis(self.keepalive_interval) }

    /// The max lifetime as the 31-bit millisecond value SETUP carries.
    #[must_use]
    pub fn max_lifetime_ms(&self) -> u32 { clamp_u31_millis(self.max_lifetime) }
}

fn clamp_u31_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis())
        .unwrap_or(u32::MAX)
        .min(0x7FFF_FFFF)
}
