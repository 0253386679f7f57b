//! Frame header primitives: stream identifiers, frame types, and flags.
//!
//! Every frame begins with a 32-bit word holding a 31-bit stream id (the
//! top bit is reserved and must be zero) followed by a 16-bit word packing
//! a 6-bit frame type and 10 flag bits. Network byte order throughout.

use super::FrameError;

/// 31-bit identifier of an interaction within a connection.
///
/// Id zero addresses the connection itself; odd ids are allocated by the
/// connection's initiating side, even ids by the accepting side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u32);

impl StreamId {
    /// The connection-scoped stream id.
    pub const CONNECTION: Self = Self(0);

    /// Largest representable stream id.
    pub const MAX: u32 = 0x7FFF_FFFF;

    /// Construct a stream id, rejecting values with the reserved bit set.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        if value > Self::MAX { None } else { Some(Self(value)) }
    }

    /// The raw 31-bit value.
    #[must_use]
    pub const fn value(self) -> u32 { self.0 }

    /// Whether this id addresses the connection rather than a stream.
    #[must_use]
    pub const fn is_connection(self) -> bool { self.0 == 0 }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The 6-bit frame type discriminant.
///
/// Values are fixed by the RSocket 1.0 wire specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Connection handshake, sent once by the client.
    Setup,
    /// Responder-issued grant of requests within a TTL.
    Lease,
    /// Periodic liveness probe and echo.
    Keepalive,
    /// Single request expecting a single response.
    RequestResponse,
    /// Request with no response.
    RequestFnf,
    /// Request opening a responder-to-requester stream.
    RequestStream,
    /// Request opening a bidirectional stream.
    RequestChannel,
    /// Additional request-N credit for a stream.
    RequestN,
    /// Requester abandons an in-flight interaction.
    Cancel,
    /// Stream data, completion, or both.
    Payload,
    /// Stream- or connection-scoped failure.
    Error,
    /// Connection-scoped metadata, no stream state.
    MetadataPush,
    /// Resumption attempt (unsupported; answered with REJECTED_RESUME).
    Resume,
    /// Resumption acknowledgement (unsupported).
    ResumeOk,
    /// Extension frame.
    Ext,
}

impl FrameType {
    /// The wire discriminant of this type.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Setup => 0x01,
            Self::Lease => 0x02,
            Self::Keepalive => 0x03,
            Self::RequestResponse => 0x04,
            Self::RequestFnf => 0x05,
            Self::RequestStream => 0x06,
            Self::RequestChannel => 0x07,
            Self::RequestN => 0x08,
            Self::Cancel => 0x09,
            Self::Payload => 0x0A,
            Self::Error => 0x0B,
            Self::MetadataPush => 0x0C,
            Self::Resume => 0x0D,
            Self::ResumeOk => 0x0E,
            Self::Ext => 0x3F,
        }
    }

    /// Map a wire discriminant back to a frame type.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::Setup,
            0x02 => Self::Lease,
            0x03 => Self::Keepalive,
            0x04 => Self::RequestResponse,
            0x05 => Self::RequestFnf,
            0x06 => Self::RequestStream,
            0x07 => Self::RequestChannel,
            0x08 => Self::RequestN,
            0x09 => Self::Cancel,
            0x0A => Self::Payload,
            0x0B => Self::Error,
            0x0C => Self::MetadataPush,
            0x0D => Self::Resume,
            0x0E => Self::ResumeOk,
            0x3F => Self::Ext,
            _ => return None,
        })
    }

    /// Whether this type opens a new stream when it arrives on an
    /// unknown id.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::RequestResponse | Self::RequestFnf | Self::RequestStream | Self::RequestChannel
        )
    }

    /// Whether this type is legal on stream id zero.
    #[must_use]
    pub const fn is_connection_type(self) -> bool {
        matches!(
            self,
            Self::Setup
                | Self::Lease
                | Self::Keepalive
                | Self::Error
                | Self::MetadataPush
                | Self::Resume
                | Self::ResumeOk
        )
    }
}

/// The 10 flag bits of the frame header.
///
/// Bit meaning depends on the frame type; the universal bits are
/// [`Flags::IGNORE`] and [`Flags::METADATA`].
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u16);

impl Flags {
    /// Receiver may ignore the frame if it cannot understand it.
    pub const IGNORE: u16 = 0x200;
    /// A metadata blob is present.
    pub const METADATA: u16 = 0x100;
    /// More fragments of this frame follow.
    pub const FOLLOWS: u16 = 0x080;
    /// The stream (or one direction of a channel) is complete.
    pub const COMPLETE: u16 = 0x040;
    /// The payload carries a next value.
    pub const NEXT: u16 = 0x020;
    /// SETUP: client requests resume support.
    pub const RESUME_ENABLE: u16 = 0x080;
    /// SETUP: client will honor leases.
    pub const LEASE: u16 = 0x040;
    /// KEEPALIVE: the receiver must echo.
    pub const RESPOND: u16 = 0x080;

    /// Mask of the bits a header can carry.
    pub const MASK: u16 = 0x3FF;

    /// Construct from raw bits, discarding anything outside the mask.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self { Self(bits & Self::MASK) }

    /// The raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 { self.0 }

    /// Whether every bit of `flag` is set.
    #[must_use]
    pub const fn contains(self, flag: u16) -> bool { self.0 & flag == flag }

    /// A copy with `flag` set.
    #[must_use]
    pub const fn with(self, flag: u16) -> Self { Self(self.0 | (flag & Self::MASK)) }

    /// A copy with `flag` set when `condition` holds.
    #[must_use]
    pub const fn with_if(self, flag: u16, condition: bool) -> Self {
        if condition { self.with(flag) } else { self }
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Flags({:#05x})", self.0)
    }
}

/// Pack a frame type and flags into the 16-bit header word.
#[must_use]
pub(crate) const fn pack_type_and_flags(frame_type: FrameType, flags: Flags) -> u16 {
    ((frame_type.code() as u16) << 10) | flags.bits()
}

/// Split the 16-bit header word into the raw type code and flags.
#[must_use]
pub(crate) const fn unpack_type_and_flags(word: u16) -> (u8, Flags) {
    ((word >> 10) as u8, Flags::from_bits(word))
}

/// Validate and wrap the stream id word.
pub(crate) fn stream_id_from_wire(word: u32) -> Result<StreamId, FrameError> {
    StreamId::new(word).ok_or(FrameError::ReservedBit)
}
