//! Application payload carried by request and response frames.
//!
//! A [`Payload`] pairs an optional metadata blob with a data blob. The
//! distinction between *absent* and *empty* metadata is significant on the
//! wire: it is carried by the metadata flag, not by the length.

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Error;

/// A lazily produced sequence of payloads.
///
/// Responder handlers return one of these for the stream and channel
/// patterns, and `request_channel` accepts one as its outbound direction.
/// Items are pulled only while the peer has outstanding request-N credit,
/// so a source sees backpressure as ordinary `Stream` pending-ness.
pub type PayloadStream = BoxStream<'static, Result<Payload, Error>>;

/// Metadata and data blobs exchanged over a stream.
///
/// Payload contents are opaque to the protocol core; MIME interpretation
/// happens above it.
///
/// # Examples
///
/// ```
/// use weft::Payload;
///
/// let p = Payload::with_metadata("route", "body");
/// assert_eq!(p.metadata().map(|m| m.as_ref()), Some(b"route".as_ref()));
/// assert_eq!(p.data().as_ref(), b"body");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    metadata: Option<Bytes>,
    data: Bytes,
}

impl Payload {
    /// Construct a payload from explicit parts.
    #[must_use]
    pub const fn new(metadata: Option<Bytes>, data: Bytes) -> Self { Self { metadata, data } }

    /// A payload with no metadata and empty data.
    #[must_use]
    pub const fn empty() -> Self { Self { metadata: None, data: Bytes::new() } }

    /// A payload carrying only data.
    #[must_use]
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self { metadata: None, data: data.into() }
    }

    /// A payload carrying both metadata and data.
    #[must_use]
    pub fn with_metadata(metadata: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Self { metadata: Some(metadata.into()), data: data.into() }
    }

    /// Borrow the metadata blob, if present.
    #[must_use]
    pub const fn metadata(&self) -> Option<&Bytes> { self.metadata.as_ref() }

    /// Borrow the data blob.
    #[must_use]
    pub const fn data(&self) -> &Bytes { &self.data }

    /// Total number of payload bytes (metadata plus data).
    #[must_use]
    pub fn len(&self) -> usize {
        self.metadata.as_ref().map_or(0, Bytes::len) + self.data.len()
    }

    /// Whether the payload carries no bytes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Decompose into `(metadata, data)`.
    #[must_use]
    pub fn into_parts(self) -> (Option<Bytes>, Bytes) { (self.metadata, self.data) }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self { Self::from_data(data) }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self { Self::from_data(data) }
}

impl From<&'static str> for Payload {
    fn from(data: &'static str) -> Self { Self::from_data(data) }
}
