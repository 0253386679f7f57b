//! Binary encoding and decoding of frames.
//!
//! Frame layout (network order, no length prefix — framing belongs to the
//! transport adapter):
//!
//! ```text
//! +-------------------------------+----------------+-----------------+
//! | stream id (31 bits, bit 31=0) | type (6 bits)  | flags (10 bits) |
//! |            4 bytes            |           2 bytes                |
//! +-------------------------------+----------------------------------+
//! | type-dependent body; metadata carries a 24-bit length prefix     |
//! | wherever metadata and data can coexist                           |
//! +------------------------------------------------------------------+
//! ```
//!
//! The codec is stateless across frames; fragmentation state lives in the
//! stream layer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    FrameError,
    FrameType,
    header::{Flags, pack_type_and_flags, stream_id_from_wire, unpack_type_and_flags},
    variants::{
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
    },
};
use crate::{error::ErrorCode, payload::Payload};

/// Fixed bytes before any type-specific body.
pub const HEADER_LEN: usize = 6;

/// Largest metadata blob the 24-bit length prefix can describe.
pub const MAX_METADATA_LEN: usize = 0xFF_FFFF;

const U31_MASK: u32 = 0x7FFF_FFFF;
const U63_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

impl Frame {
    /// Serialise the frame, appending its bytes to `dst`.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when a field cannot be represented on the
    /// wire (oversized metadata, zero request-N, non-ASCII MIME).
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), FrameError> {
        let flags = self.wire_flags()?;
        dst.put_u32(self.stream_id.value());
        dst.put_u16(pack_type_and_flags(self.frame_type(), flags));
        self.encode_body(dst)
    }

    /// Parse one whole frame from `buf`.
    ///
    /// `buf` must hold exactly one frame, as delivered by the transport
    /// adapter. Returns `Ok(None)` for an unknown frame type whose IGNORE
    /// flag permits skipping it.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] for any malformed frame.
    pub fn decode(mut buf: BytesMut) -> Result<Option<Self>, FrameError> {
        need(&buf, HEADER_LEN)?;
        let stream_id = stream_id_from_wire(buf.get_u32())?;
        let (code, flags) = unpack_type_and_flags(buf.get_u16());
        let Some(frame_type) = FrameType::from_code(code) else {
            if flags.contains(Flags::IGNORE) {
                return Ok(None);
            }
            return Err(FrameError::UnknownType { code });
        };
        let body = decode_body(frame_type, flags, &mut buf)?;
        Ok(Some(Self { stream_id, body }))
    }

    fn wire_flags(&self) -> Result<Flags, FrameError> {
        let flags = Flags::default();
        Ok(match &self.body {
            FrameBody::Setup(setup) => flags
                .with_if(Flags::METADATA, setup.payload.metadata().is_some())
                .with_if(Flags::RESUME_ENABLE, setup.resume_token.is_some())
                .with_if(Flags::LEASE, setup.lease),
            FrameBody::Lease(lease) => flags.with_if(Flags::METADATA, lease.metadata.is_some()),
            FrameBody::Keepalive(keepalive) => flags.with_if(Flags::RESPOND, keepalive.respond),
            FrameBody::RequestResponse(body) => flags
                .with_if(Flags::METADATA, body.payload.metadata().is_some())
                .with_if(Flags::FOLLOWS, body.follows),
            FrameBody::RequestFnf(body) => flags
                .with_if(Flags::METADATA, body.payload.metadata().is_some())
                .with_if(Flags::FOLLOWS, body.follows),
            FrameBody::RequestStream(body) => flags
                .with_if(Flags::METADATA, body.payload.metadata().is_some())
                .with_if(Flags::FOLLOWS, body.follows),
            FrameBody::RequestChannel(body) => flags
                .with_if(Flags::METADATA, body.payload.metadata().is_some())
                .with_if(Flags::FOLLOWS, body.follows)
                .with_if(Flags::COMPLETE, body.complete),
            FrameBody::Payload(body) => flags
                .with_if(Flags::METADATA, body.payload.metadata().is_some())
                .with_if(Flags::FOLLOWS, body.follows)
                .with_if(Flags::COMPLETE, body.complete)
                .with_if(Flags::NEXT, body.next),
            FrameBody::MetadataPush(_) => flags.with(Flags::METADATA),
            FrameBody::Ext(ext) => flags
                .with_if(Flags::METADATA, ext.payload.metadata().is_some())
                .with_if(Flags::IGNORE, ext.can_ignore),
            FrameBody::RequestN(_)
            | FrameBody::Cancel
            | FrameBody::Error(_)
            | FrameBody::Resume(_)
            | FrameBody::ResumeOk(_) => flags,
        })
    }

    fn encode_body(&self, dst: &mut BytesMut) -> Result<(), FrameError> {
        match &self.body {
            FrameBody::Setup(setup) => {
                dst.put_u16(setup.version.major);
                dst.put_u16(setup.version.minor);
                dst.put_u32(setup.keepalive_interval_ms & U31_MASK);
                dst.put_u32(setup.max_lifetime_ms & U31_MASK);
                if let Some(token) = &setup.resume_token {
                    let len = u16::try_from(token.len())
                        .map_err(|_| FrameError::Oversized { size: token.len(), max: usize::from(u16::MAX) })?;
                    dst.put_u16(len);
                    dst.extend_from_slice(token);
                }
                put_mime(&setup.metadata_mime, dst)?;
                put_mime(&setup.data_mime, dst)?;
                put_payload(&setup.payload, dst)
            }
            FrameBody::Lease(lease) => {
                dst.put_u32(lease.ttl_ms & U31_MASK);
                dst.put_u32(lease.requests & U31_MASK);
                if let Some(metadata) = &lease.metadata {
                    dst.extend_from_slice(metadata);
                }
                Ok(())
            }
            FrameBody::Keepalive(keepalive) => {
                dst.put_u64(keepalive.last_position & U63_MASK);
                dst.extend_from_slice(&keepalive.data);
                Ok(())
            }
            FrameBody::RequestResponse(body) => put_payload(&body.payload, dst),
            FrameBody::RequestFnf(body) => put_payload(&body.payload, dst),
            FrameBody::RequestStream(body) => {
                put_request_n(body.initial_n, dst)?;
                put_payload(&body.payload, dst)
            }
            FrameBody::RequestChannel(body) => {
                put_request_n(body.initial_n, dst)?;
                put_payload(&body.payload, dst)
            }
            FrameBody::RequestN(body) => put_request_n(body.n, dst),
            FrameBody::Cancel => Ok(()),
            FrameBody::Payload(body) => put_payload(&body.payload, dst),
            FrameBody::Error(body) => {
                dst.put_u32(body.code.to_u32());
                dst.extend_from_slice(&body.data);
                Ok(())
            }
            FrameBody::MetadataPush(push) => {
                dst.extend_from_slice(&push.metadata);
                Ok(())
            }
            FrameBody::Resume(resume) => {
                dst.put_u16(resume.version.major);
                dst.put_u16(resume.version.minor);
                let len = u16::try_from(resume.token.len())
                    .map_err(|_| FrameError::Oversized { size: resume.token.len(), max: usize::from(u16::MAX) })?;
                dst.put_u16(len);
                dst.extend_from_slice(&resume.token);
                dst.put_u64(resume.last_server_position & U63_MASK);
                dst.put_u64(resume.first_client_position & U63_MASK);
                Ok(())
            }
            FrameBody::ResumeOk(resume_ok) => {
                dst.put_u64(resume_ok.last_client_position & U63_MASK);
                Ok(())
            }
            FrameBody::Ext(ext) => {
                dst.put_u32(ext.extended_type & U31_MASK);
                put_payload(&ext.payload, dst)
            }
        }
    }
}

fn decode_body(
    frame_type: FrameType,
    flags: Flags,
    buf: &mut BytesMut,
) -> Result<FrameBody, FrameError> {
    match frame_type {
        FrameType::Setup => decode_setup(flags, buf),
        FrameType::Lease => {
            need(buf, 8)?;
            let ttl_ms = get_u31(buf);
            let requests = get_u31(buf);
            let metadata = flags
                .contains(Flags::METADATA)
                .then(|| take_rest(buf));
            Ok(FrameBody::Lease(Lease { ttl_ms, requests, metadata }))
        }
        FrameType::Keepalive => {
            if flags.contains(Flags::METADATA) {
                return Err(FrameError::IllegalFlags { kind: "KEEPALIVE", bits: flags.bits() });
            }
            need(buf, 8)?;
            let last_position = get_u63(buf);
            Ok(FrameBody::Keepalive(Keepalive {
                respond: flags.contains(Flags::RESPOND),
                last_position,
                data: take_rest(buf),
            }))
        }
        FrameType::RequestResponse => Ok(FrameBody::RequestResponse(RequestResponse {
            payload: split_payload(flags, buf)?,
            follows: flags.contains(Flags::FOLLOWS),
        })),
        FrameType::RequestFnf => Ok(FrameBody::RequestFnf(RequestFnf {
            payload: split_payload(flags, buf)?,
            follows: flags.contains(Flags::FOLLOWS),
        })),
        FrameType::RequestStream => {
            let initial_n = get_request_n(buf)?;
            Ok(FrameBody::RequestStream(RequestStream {
                initial_n,
                payload: split_payload(flags, buf)?,
                follows: flags.contains(Flags::FOLLOWS),
            }))
        }
        FrameType::RequestChannel => {
            let initial_n = get_request_n(buf)?;
            Ok(FrameBody::RequestChannel(RequestChannel {
                initial_n,
                payload: split_payload(flags, buf)?,
                follows: flags.contains(Flags::FOLLOWS),
                complete: flags.contains(Flags::COMPLETE),
            }))
        }
        FrameType::RequestN => Ok(FrameBody::RequestN(RequestN { n: get_request_n(buf)? })),
        FrameType::Cancel => Ok(FrameBody::Cancel),
        FrameType::Payload => {
            let next = flags.contains(Flags::NEXT);
            let complete = flags.contains(Flags::COMPLETE);
            let follows = flags.contains(Flags::FOLLOWS);
            if !next && !complete && !follows {
                return Err(FrameError::IllegalFlags { kind: "PAYLOAD", bits: flags.bits() });
            }
            Ok(FrameBody::Payload(PayloadFrame {
                payload: split_payload(flags, buf)?,
                next,
                complete,
                follows,
            }))
        }
        FrameType::Error => {
            need(buf, 4)?;
            let code = ErrorCode::from_u32(buf.get_u32());
            Ok(FrameBody::Error(ErrorBody { code, data: take_rest(buf) }))
        }
        FrameType::MetadataPush => {
            if !flags.contains(Flags::METADATA) {
                return Err(FrameError::IllegalFlags { kind: "METADATA_PUSH", bits: flags.bits() });
            }
            Ok(FrameBody::MetadataPush(MetadataPush { metadata: take_rest(buf) }))
        }
        FrameType::Resume => {
            need(buf, 6)?;
            let version = Version { major: buf.get_u16(), minor: buf.get_u16() };
            let token_len = usize::from(buf.get_u16());
            need(buf, token_len + 16)?;
            let token = buf.split_to(token_len).freeze();
            Ok(FrameBody::Resume(Resume {
                version,
                token,
                last_server_position: get_u63(buf),
                first_client_position: get_u63(buf),
            }))
        }
        FrameType::ResumeOk => {
            need(buf, 8)?;
            Ok(FrameBody::ResumeOk(ResumeOk { last_client_position: get_u63(buf) }))
        }
        FrameType::Ext => {
            need(buf, 4)?;
            let extended_type = get_u31(buf);
            Ok(FrameBody::Ext(Ext {
                extended_type,
                payload: split_payload(flags, buf)?,
                can_ignore: flags.contains(Flags::IGNORE),
            }))
        }
    }
}

fn decode_setup(flags: Flags, buf: &mut BytesMut) -> Result<FrameBody, FrameError> {
    need(buf, 12)?;
    let version = Version { major: buf.get_u16(), minor: buf.get_u16() };
    let keepalive_interval_ms = get_u31(buf);
    let max_lifetime_ms = get_u31(buf);
    let resume_token = if flags.contains(Flags::RESUME_ENABLE) {
        need(buf, 2)?;
        let len = usize::from(buf.get_u16());
        need(buf, len)?;
        Some(buf.split_to(len).freeze())
    } else {
        None
    };
    let metadata_mime = get_mime(buf)?;
    let data_mime = get_mime(buf)?;
    Ok(FrameBody::Setup(Setup {
        version,
        keepalive_interval_ms,
        max_lifetime_ms,
        resume_token,
        metadata_mime,
        data_mime,
        lease: flags.contains(Flags::LEASE),
        payload: split_payload(flags, buf)?,
    }))
}

fn need(buf: &BytesMut, len: usize) -> Result<(), FrameError> {
    if buf.len() < len {
        return Err(FrameError::Truncated { have: buf.len(), need: len });
    }
    Ok(())
}

fn get_u31(buf: &mut BytesMut) -> u32 { buf.get_u32() & U31_MASK }

fn get_u63(buf: &mut BytesMut) -> u64 { buf.get_u64() & U63_MASK }

fn get_request_n(buf: &mut BytesMut) -> Result<u32, FrameError> {
    need(buf, 4)?;
    let n = get_u31(buf);
    if n == 0 {
        return Err(FrameError::ZeroRequestN);
    }
    Ok(n)
}

fn put_request_n(n: u32, dst: &mut BytesMut) -> Result<(), FrameError> {
    if n == 0 {
        return Err(FrameError::ZeroRequestN);
    }
    dst.put_u32(n & U31_MASK);
    Ok(())
}

fn take_rest(buf: &mut BytesMut) -> Bytes { buf.split().freeze() }

/// Decode an optional length-prefixed metadata blob plus the trailing data.
fn split_payload(flags: Flags, buf: &mut BytesMut) -> Result<Payload, FrameError> {
    let metadata = if flags.contains(Flags::METADATA) {
        need(buf, 3)?;
        let len = usize::try_from(buf.get_uint(3)).unwrap_or(usize::MAX);
        if len > buf.len() {
            return Err(FrameError::MetadataOverrun { len, frame: buf.len() });
        }
        Some(buf.split_to(len).freeze())
    } else {
        None
    };
    Ok(Payload::new(metadata, take_rest(buf)))
}

/// Encode an optional metadata blob (24-bit length prefix) plus data.
fn put_payload(payload: &Payload, dst: &mut BytesMut) -> Result<(), FrameError> {
    if let Some(metadata) = payload.metadata() {
        if metadata.len() > MAX_METADATA_LEN {
            return Err(FrameError::Oversized { size: metadata.len(), max: MAX_METADATA_LEN });
        }
        dst.put_uint(metadata.len() as u64, 3);
        dst.extend_from_slice(metadata);
    }
    dst.extend_from_slice(payload.data());
    Ok(())
}

fn get_mime(buf: &mut BytesMut) -> Result<String, FrameError> {
    need(buf, 1)?;
    let len = usize::from(buf.get_u8());
    need(buf, len)?;
    let raw = buf.split_to(len);
    let mime = std::str::from_utf8(&raw).map_err(|_| FrameError::BadMime)?;
    if !mime.is_ascii() {
        return Err(FrameError::BadMime);
    }
    Ok(mime.to_owned())
}

fn put_mime(mime: &str, dst: &mut BytesMut) -> Result<(), FrameError> {
    if !mime.is_ascii() || mime.len() > usize::from(u8::MAX) {
        return Err(FrameError::BadMime);
    }
    dst.put_u8(mime.len() as u8);
    dst.extend_from_slice(mime.as_bytes());
    Ok(())
}
