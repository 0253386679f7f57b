//! Wire-level error taxonomy for frame encoding and decoding.

use thiserror::Error;

/// Errors raised while parsing or serialising a single frame.
///
/// Any of these on a live connection is a connection-fatal condition: the
/// peer is sent ERROR(CONNECTION_ERROR) and the transport is closed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer ended before the fixed-size portion of the frame.
    #[error("truncated frame: have {have} bytes, need {need}")]
    Truncated {
        /// Bytes available.
        have: usize,
        /// Bytes required.
        need: usize,
    },

    /// The reserved top bit of the stream id word was set.
    #[error("reserved stream id bit set")]
    ReservedBit,

    /// The 6-bit type code is not a known frame type.
    #[error("unknown frame type {code:#04x}")]
    UnknownType {
        /// The unrecognised type code.
        code: u8,
    },

    /// A flag combination the frame type forbids.
    #[error("illegal flags {bits:#05x} on {kind} frame")]
    IllegalFlags {
        /// Frame type name.
        kind: &'static str,
        /// Offending flag bits.
        bits: u16,
    },

    /// The declared metadata length overruns the frame.
    #[error("metadata length {len} overruns frame of {frame} bytes")]
    MetadataOverrun {
        /// Declared metadata length.
        len: usize,
        /// Bytes remaining in the frame.
        frame: usize,
    },

    /// A request-N value of zero, which the protocol forbids.
    #[error("request-n must be positive")]
    ZeroRequestN,

    /// A frame larger than the transport's 24-bit length prefix allows.
    #[error("frame of {size} bytes exceeds maximum {max}")]
    Oversized {
        /// Encoded frame size.
        size: usize,
        /// Largest permitted size.
        max: usize,
    },

    /// A connection frame arrived on a stream id, or vice versa.
    #[error("{kind} frame on unexpected stream {id}")]
    WrongStream {
        /// Frame type name.
        kind: &'static str,
        /// Offending stream id.
        id: u32,
    },

    /// A MIME type that is not ASCII or exceeds 255 bytes.
    #[error("mime type must be ascii and at most 255 bytes")]
    BadMime,
}
