//! Inbound helper that stitches fragment sequences back into whole frames.
//!
//! The reassembler keys pending sequences by stream id, mirroring the
//! outbound [`Fragmenter`](super::Fragmenter). Buffers are capped per
//! stream to bound what a slow or malicious peer can allocate, and freed
//! as soon as the stream terminates.

use std::collections::HashMap;

use bytes::BytesMut;

use super::ReassemblyError;
use crate::{
    frame::{Frame, FrameBody, PayloadFrame, StreamId},
    payload::Payload,
};

#[derive(Debug)]
struct PartialFrame {
    head: FrameBody,
    metadata: BytesMut,
    data: BytesMut,
    has_metadata: bool,
}

impl PartialFrame {
    fn len(&self) -> usize { self.metadata.len() + self.data.len() }

    fn push(&mut self, id: StreamId, payload: &Payload) -> Result<(), ReassemblyError> {
        if let Some(metadata) = payload.metadata() {
            if !self.data.is_empty() {
                return Err(ReassemblyError::Interleaved { id });
            }
            self.has_metadata = true;
            self.metadata.extend_from_slice(metadata);
        }
        self.data.extend_from_slice(payload.data());
        Ok(())
    }

    fn finish(self, final_fragment: &PayloadFrame) -> FrameBody {
        let payload = Payload::new(
            self.has_metadata.then(|| self.metadata.freeze()),
            self.data.freeze(),
        );
        match self.head {
            FrameBody::RequestResponse(mut body) => {
                body.payload = payload;
                body.follows = false;
                FrameBody::RequestResponse(body)
            }
            FrameBody::RequestFnf(mut body) => {
                body.payload = payload;
                body.follows = false;
                FrameBody::RequestFnf(body)
            }
            FrameBody::RequestStream(mut body) => {
                body.payload = payload;
                body.follows = false;
                FrameBody::RequestStream(body)
            }
            FrameBody::RequestChannel(mut body) => {
                body.payload = payload;
                body.follows = false;
                body.complete |= final_fragment.complete;
                FrameBody::RequestChannel(body)
            }
            FrameBody::Payload(mut body) => {
                body.payload = payload;
                body.follows = false;
                body.next |= final_fragment.next;
                body.complete |= final_fragment.complete;
                FrameBody::Payload(body)
            }
            // Only fragmentable bodies are ever stored as heads.
            other => other,
        }
    }
}

/// Stateful per-stream fragment reassembler with a byte cap.
#[derive(Debug)]
pub struct Reassembler {
    max_bytes: usize,
    partials: HashMap<StreamId, PartialFrame>,
}

impl Reassembler {
    /// Create a reassembler enforcing `max_bytes` per pending stream.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self { Self { max_bytes, partials: HashMap::new() } }

    /// Feed one inbound frame through the reassembler.
    ///
    /// Returns `Ok(Some(frame))` when the frame is whole (either it never
    /// was a fragment, or this fragment completed the sequence) and
    /// `Ok(None)` while more fragments are required.
    ///
    /// # Errors
    ///
    /// Returns a [`ReassemblyError`] when a fragment violates ordering,
    /// type consistency, or the byte cap. The pending sequence is
    /// discarded on error.
    pub fn absorb(&mut self, frame: Frame) -> Result<Option<Frame>, ReassemblyError> {
        let id = frame.stream_id;
        if let Some(partial) = self.partials.get_mut(&id) {
            let FrameBody::Payload(fragment) = &frame.body else {
                self.partials.remove(&id);
                return Err(ReassemblyError::TypeMismatch { id });
            };
            if let Err(err) = partial.push(id, &fragment.payload) {
                self.partials.remove(&id);
                return Err(err);
            }
            if partial.len() > self.max_bytes {
                self.partials.remove(&id);
                return Err(ReassemblyError::BufferExceeded { id, limit: self.max_bytes });
            }
            if fragment.follows {
                return Ok(None);
            }
            let partial = self
                .partials
                .remove(&id)
                .ok_or(ReassemblyError::TypeMismatch { id })?;
            let body = partial.finish(fragment);
            return Ok(Some(Frame::new(id, body)));
        }

        if !frame.follows() {
            return Ok(Some(frame));
        }
        if frame.len_hint() > self.max_bytes {
            return Err(ReassemblyError::BufferExceeded { id, limit: self.max_bytes });
        }
        self.partials.insert(id, start_partial(frame.body));
        Ok(None)
    }

    /// Discard any pending sequence for a terminated stream.
    pub fn abandon(&mut self, id: StreamId) { self.partials.remove(&id); }

    /// Whether a fragment sequence is pending on `id`.
    #[must_use]
    pub fn is_pending(&self, id: StreamId) -> bool { self.partials.contains_key(&id) }

    /// Number of streams with pending fragments.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.partials.len() }
}

impl Frame {
    /// Payload bytes this frame would contribute to a reassembly buffer.
    fn len_hint(&self) -> usize {
        match &self.body {
            FrameBody::RequestResponse(body) => body.payload.len(),
            FrameBody::RequestFnf(body) => body.payload.len(),
            FrameBody::RequestStream(body) => body.payload.len(),
            FrameBody::RequestChannel(body) => body.payload.len(),
            FrameBody::Payload(body) => body.payload.len(),
            _ => 0,
        }
    }
}

fn start_partial(head: FrameBody) -> PartialFrame {
    let (payload, head) = match head {
        FrameBody::RequestResponse(mut body) => {
            (std::mem::take(&mut body.payload), FrameBody::RequestResponse(body))
        }
        FrameBody::RequestFnf(mut body) => {
            (std::mem::take(&mut body.payload), FrameBody::RequestFnf(body))
        }
        FrameBody::RequestStream(mut body) => {
            (std::mem::take(&mut body.payload), FrameBody::RequestStream(body))
        }
        FrameBody::RequestChannel(mut body) => {
            (std::mem::take(&mut body.payload), FrameBody::RequestChannel(body))
        }
        FrameBody::Payload(mut body) => {
            (std::mem::take(&mut body.payload), FrameBody::Payload(body))
        }
        other => (Payload::empty(), other),
    };
    let mut partial = PartialFrame {
        head,
        metadata: BytesMut::new(),
        data: BytesMut::new(),
        has_metadata: false,
    };
    if let Some(metadata) = payload.metadata() {
        partial.has_metadata = true;
        partial.metadata.extend_from_slice(metadata);
    }
    partial.data.extend_from_slice(payload.data());
    partial
}
