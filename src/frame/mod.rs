//! Frame model and binary codec.
//!
//! Sub-modules split the concern three ways: [`header`] holds the
//! primitives packed into the six header bytes, [`variants`] the typed
//! bodies, and [`codec`] the encode/decode logic over [`bytes`] buffers.

pub mod codec;
pub mod error;
pub mod header;
pub mod variants;

pub use codec::{HEADER_LEN, MAX_METADATA_LEN};
pub use error::FrameError;
pub use header::{Flags, FrameType, StreamId};
pub use variants::{
    ErrorBody,
    Ext,
    Frame,
    FrameBody,
    Keepalive,
    Lease,
    MetadataPush,
    PayloadFrame,
    RequestChannel,
    RequestFnf,
    RequestN,
    RequestResponse,
    RequestStream,
    Resume,
    ResumeOk,
    Setup,
    Version,
};
