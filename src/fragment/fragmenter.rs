//! Outbound helper that splits oversized frames into fragment sequences.
//!
//! The head fragment keeps the original frame type with the FOLLOWS flag
//! set; continuations are PAYLOAD frames carrying NEXT, with FOLLOWS on
//! all but the last. Metadata is emitted in full before any data, so a
//! single fragment may carry tail-of-metadata plus head-of-data but never
//! interleaved runs.

use bytes::Bytes;

use crate::{
    frame::{Frame, FrameBody, PayloadFrame},
    payload::Payload,
};

/// Splits frames whose payload exceeds a configured threshold.
#[derive(Clone, Copy, Debug)]
pub struct Fragmenter {
    fragment_size: usize,
}

impl Fragmenter {
    /// Create a fragmenter. A `fragment_size` of zero disables splitting.
    #[must_use]
    pub const fn new(fragment_size: usize) -> Self { Self { fragment_size } }

    /// Whether this fragmenter ever splits frames.
    #[must_use]
    pub const fn is_enabled(&self) -> bool { self.fragment_size > 0 }

    /// Split `frame` into a fragment sequence, or return it unchanged when
    /// it fits (or is not a fragmentable type).
    #[must_use]
    pub fn fragment(&self, frame: Frame) -> Vec<Frame> {
        if !self.is_enabled() {
            return vec![frame];
        }
        let stream_id = frame.stream_id;
        let (payload, rest) = match frame.body {
            FrameBody::RequestResponse(body) if body.payload.len() > self.fragment_size => {
                (body.payload, HeadKind::RequestResponse)
            }
            FrameBody::RequestFnf(body) if body.payload.len() > self.fragment_size => {
                (body.payload, HeadKind::RequestFnf)
            }
            FrameBody::RequestStream(body) if body.payload.len() > self.fragment_size => {
                (body.payload, HeadKind::RequestStream { initial_n: body.initial_n })
            }
            FrameBody::RequestChannel(body) if body.payload.len() > self.fragment_size => (
                body.payload,
                HeadKind::RequestChannel { initial_n: body.initial_n, complete: body.complete },
            ),
            FrameBody::Payload(body) if body.payload.len() > self.fragment_size => {
                (body.payload, HeadKind::Payload { next: body.next, complete: body.complete })
            }
            body => return vec![Frame::new(stream_id, body)],
        };

        let chunks = chunk_payload(&payload, self.fragment_size);
        let last = chunks.len() - 1;
        let mut frames = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.into_iter().enumerate() {
            if index == 0 {
                frames.push(Frame::new(stream_id, rest.head(chunk)));
            } else {
                frames.push(Frame::new(
                    stream_id,
                    FrameBody::Payload(PayloadFrame {
                        payload: chunk,
                        next: true,
                        complete: rest.completes() && index == last,
                        follows: index != last,
                    }),
                ));
            }
        }
        frames
    }
}

/// The original frame's identity, re-applied to the head fragment.
enum HeadKind {
    RequestResponse,
    RequestFnf,
    RequestStream { initial_n: u32 },
    RequestChannel { initial_n: u32, complete: bool },
    Payload { next: bool, complete: bool },
}

impl HeadKind {
    /// Build the head fragment body around the first chunk.
    fn head(&self, chunk: Payload) -> FrameBody {
        match *self {
            Self::RequestResponse => FrameBody::RequestResponse(crate::frame::RequestResponse {
                payload: chunk,
                follows: true,
            }),
            Self::RequestFnf => {
                FrameBody::RequestFnf(crate::frame::RequestFnf { payload: chunk, follows: true })
            }
            Self::RequestStream { initial_n } => {
                FrameBody::RequestStream(crate::frame::RequestStream {
                    initial_n,
                    payload: chunk,
                    follows: true,
                })
            }
            Self::RequestChannel { initial_n, .. } => {
                FrameBody::RequestChannel(crate::frame::RequestChannel {
                    initial_n,
                    payload: chunk,
                    follows: true,
                    // Completion travels on the final fragment.
                    complete: false,
                })
            }
            Self::Payload { next, .. } => FrameBody::Payload(PayloadFrame {
                payload: chunk,
                next,
                complete: false,
                follows: true,
            }),
        }
    }

    /// Whether the final fragment must carry the COMPLETE flag.
    const fn completes(&self) -> bool {
        match *self {
            Self::RequestChannel { complete, .. } | Self::Payload { complete, .. } => complete,
            _ => false,
        }
    }
}

/// Slice a payload into fragments of at most `size` bytes each, metadata
/// strictly before data.
fn chunk_payload(payload: &Payload, size: usize) -> Vec<Payload> {
    let metadata = payload.metadata();
    let metadata_len = metadata.map_or(0, Bytes::len);
    let data = payload.data();

    let mut chunks = Vec::new();
    let mut metadata_offset = 0;
    let mut data_offset = 0;
    loop {
        let take_metadata = size.min(metadata_len - metadata_offset);
        let take_data = (size - take_metadata).min(data.len() - data_offset);
        let chunk_metadata = match metadata {
            Some(blob) if take_metadata > 0 => {
                Some(blob.slice(metadata_offset..metadata_offset + take_metadata))
            }
            // Preserve metadata-present on the head even when empty.
            Some(_) if chunks.is_empty() => Some(Bytes::new()),
            _ => None,
        };
        chunks.push(Payload::new(
            chunk_metadata,
            data.slice(data_offset..data_offset + take_data),
        ));
        metadata_offset += take_metadata;
        data_offset += take_data;
        if metadata_offset >= metadata_len && data_offset >= data.len() {
            return chunks;
        }
    }
}
