//! Transport adapter: whole-frame delivery over byte-stream transports.
//!
//! The frame codec consumes whole frames. Byte-stream transports (TCP,
//! QUIC streams) therefore prepend a 24-bit big-endian length prefix to
//! every frame; [`WireCodec`] implements that framing as a [`tokio_util`]
//! codec. Message-boundary transports (WebSocket, QUIC datagrams) must
//! not prefix: they implement [`FrameIo`] directly by mapping one
//! transport message to one frame.

use bytes::{Buf, BufMut, BytesMut};
use futures::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::{
    error::Error,
    frame::{Frame, FrameError},
};

/// Largest frame the 24-bit length prefix can describe.
pub const MAX_FRAME_LEN: usize = 0xFF_FFFF;

const PREFIX_LEN: usize = 3;

/// Duplex channel of whole frames, as the connection actor consumes it.
///
/// Any `Stream + Sink` of [`Frame`] qualifies, so WebSocket-style
/// transports can skip the length prefix and adapt their native message
/// boundary instead.
pub trait FrameIo:
    Stream<Item = Result<Frame, Error>> + Sink<Frame, Error = Error> + Send + Unpin
{
}

impl<T> FrameIo for T where
    T: Stream<Item = Result<Frame, Error>> + Sink<Frame, Error = Error> + Send + Unpin
{
}

/// Length-prefixed frame codec for byte-stream transports.
#[derive(Clone, Copy, Debug)]
pub struct WireCodec {
    max_frame_len: usize,
}

impl WireCodec {
    /// Construct a codec with an explicit frame ceiling.
    #[must_use]
    pub const fn new(max_frame_len: usize) -> Self { Self { max_frame_len } }
}

impl Default for WireCodec {
    fn default() -> Self { Self::new(MAX_FRAME_LEN) }
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        loop {
            if src.len() < PREFIX_LEN {
                return Ok(None);
            }
            let len = usize::try_from(u32::from_be_bytes([0, src[0], src[1], src[2]]))
                .unwrap_or(usize::MAX);
            if len > self.max_frame_len {
                return Err(FrameError::Oversized { size: len, max: self.max_frame_len }.into());
            }
            if src.len() < PREFIX_LEN + len {
                src.reserve(PREFIX_LEN + len - src.len());
                return Ok(None);
            }
            src.advance(PREFIX_LEN);
            let frame_bytes = src.split_to(len);
            match Frame::decode(frame_bytes)? {
                Some(frame) => return Ok(Some(frame)),
                // An ignorable unknown frame; carry on with the next one.
                None => continue,
            }
        }
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        let mut body = BytesMut::new();
        frame.encode(&mut body)?;
        if body.len() > self.max_frame_len {
            return Err(FrameError::Oversized { size: body.len(), max: self.max_frame_len }.into());
        }
        dst.reserve(PREFIX_LEN + body.len());
        dst.put_uint(body.len() as u64, PREFIX_LEN);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

/// Wrap a byte-stream transport in length-prefixed framing.
///
/// # Examples
///
/// ```no_run
/// # async fn demo() -> weft::Result<()> {
/// let socket = tokio::net::TcpStream::connect("127.0.0.1:7878").await?;
/// let io = weft::transport::framed(socket);
/// # let _ = io;
/// # Ok(())
/// # }
/// ```
pub fn framed<T>(io: T) -> Framed<T, WireCodec>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, WireCodec::default())
}
