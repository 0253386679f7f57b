//! Error types for fragment reassembly.

use thiserror::Error;

use crate::frame::StreamId;

/// Errors raised while stitching fragments back together.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// A continuation was not a PAYLOAD frame, or a new head arrived
    /// while a fragment sequence was pending on the same stream.
    #[error("fragment type mismatch on stream {id}")]
    TypeMismatch {
        /// Stream carrying the offending fragment.
        id: StreamId,
    },

    /// A fragment carried metadata after data bytes had already arrived.
    #[error("fragment metadata after data began on stream {id}")]
    Interleaved {
        /// Stream carrying the offending fragment.
        id: StreamId,
    },

    /// The pending buffer for a stream outgrew the configured cap.
    #[error("reassembly buffer for stream {id} exceeds {limit} bytes")]
    BufferExceeded {
        /// Stream whose buffer overflowed.
        id: StreamId,
        /// Configured cap in bytes.
        limit: usize,
    },
}

impl ReassemblyError {
    /// The stream the offending fragment arrived on.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        match self {
            Self::TypeMismatch { id }
            | Self::Interleaved { id }
            | Self::BufferExceeded { id, .. } => *id,
        }
    }

    /// Whether the error must terminate the connection rather than just
    /// the stream.
    ///
    /// Buffer breaches are a resource-exhaustion defence and close the
    /// connection; ordering violations terminate only the stream.
    #[must_use]
    pub const fn is_fatal(&self) -> bool { matches!(self, Self::BufferExceeded { .. }) }
}
