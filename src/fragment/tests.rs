//! Fragmentation and reassembly coverage.
//!
//! The size-3 splitting table mirrors the behaviour of the reference
//! implementation for mixed metadata/data payloads.

use bytes::Bytes;
use rstest::rstest;

use super::*;
use crate::{
    frame::{Frame, FrameBody, PayloadFrame, RequestChannel, RequestResponse, RequestStream, StreamId},
    payload::Payload,
};

fn sid(value: u32) -> StreamId { StreamId::new(value).expect("valid stream id") }

fn payload_of(data: &'static [u8], metadata: &'static [u8]) -> Payload {
    if metadata.is_empty() {
        Payload::from_data(Bytes::from_static(data))
    } else {
        Payload::with_metadata(Bytes::from_static(metadata), Bytes::from_static(data))
    }
}

fn reassemble_all(frames: Vec<Frame>, cap: usize) -> Frame {
    let mut reassembler = Reassembler::new(cap);
    let mut complete = None;
    for frame in frames {
        complete = reassembler.absorb(frame).expect("absorb fragment");
    }
    complete.expect("sequence completed")
}

#[rstest]
#[case(b"", b"123abc456def", 4)]
#[case(b"123abc456def", b"", 4)]
#[case(b"123abc", b"456def", 4)]
#[case(b"123abc89", b"456def", 5)]
#[case(b"123ab", b"456def", 4)]
#[case(b"123", b"456def", 3)]
#[case(b"123", b"45", 2)]
#[case(b"12", b"45", 2)]
#[case(b"12", b"456", 2)]
#[case(b"123", b"456", 2)]
fn payload_fragment_counts_match_reference(
    #[case] data: &'static [u8],
    #[case] metadata: &'static [u8],
    #[case] expected_frames: usize,
) {
    let original = Frame::new(
        sid(1),
        FrameBody::Payload(PayloadFrame {
            payload: payload_of(data, metadata),
            next: true,
            complete: false,
            follows: false,
        }),
    );
    let fragments = Fragmenter::new(3).fragment(original.clone());
    assert_eq!(fragments.len(), expected_frames);
    for fragment in &fragments[..expected_frames - 1] {
        assert!(fragment.follows());
    }
    assert!(!fragments[expected_frames - 1].follows());

    let whole = reassemble_all(fragments, 1024);
    let FrameBody::Payload(body) = whole.body else {
        panic!("reassembled frame is not PAYLOAD");
    };
    assert_eq!(body.payload.data().as_ref(), data);
    assert_eq!(
        body.payload.metadata().map_or(&[][..], |m| m.as_ref()),
        metadata
    );
}

#[rstest]
fn request_head_keeps_its_type() {
    let original = Frame::new(
        sid(3),
        FrameBody::RequestStream(RequestStream {
            initial_n: 7,
            payload: payload_of(b"123abc456def", b""),
            follows: false,
        }),
    );
    let fragments = Fragmenter::new(3).fragment(original);
    assert_eq!(fragments.len(), 4);
    assert!(matches!(fragments[0].body, FrameBody::RequestStream(_)));
    for continuation in &fragments[1..] {
        assert!(matches!(continuation.body, FrameBody::Payload(_)));
    }

    let whole = reassemble_all(fragments, 1024);
    let FrameBody::RequestStream(body) = whole.body else {
        panic!("reassembled frame is not REQUEST_STREAM");
    };
    assert_eq!(body.initial_n, 7);
    assert_eq!(body.payload.data().as_ref(), b"123abc456def");
    assert!(!body.follows);
}

#[rstest]
fn channel_completion_travels_on_the_last_fragment() {
    let original = Frame::new(
        sid(5),
        FrameBody::RequestChannel(RequestChannel {
            initial_n: 1,
            payload: payload_of(b"abcdef", b""),
            follows: false,
            complete: true,
        }),
    );
    let fragments = Fragmenter::new(2).fragment(original);
    let FrameBody::RequestChannel(head) = &fragments[0].body else {
        panic!("head is not REQUEST_CHANNEL");
    };
    assert!(!head.complete);
    let FrameBody::Payload(last) = &fragments[fragments.len() - 1].body else {
        panic!("continuation is not PAYLOAD");
    };
    assert!(last.complete);

    let whole = reassemble_all(fragments, 1024);
    let FrameBody::RequestChannel(body) = whole.body else {
        panic!("reassembled frame is not REQUEST_CHANNEL");
    };
    assert!(body.complete);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(5)]
#[case(100)]
fn fragmentation_is_idempotent_for_any_size(#[case] fragment_size: usize) {
    let original = Frame::new(
        sid(7),
        FrameBody::RequestResponse(RequestResponse {
            payload: payload_of(b"the quick brown fox", b"jumps over"),
            follows: false,
        }),
    );
    let fragments = Fragmenter::new(fragment_size).fragment(original.clone());
    assert_eq!(reassemble_all(fragments, 1024), original);
}

#[rstest]
fn small_frames_pass_through_untouched() {
    let original = Frame::next_payload(sid(9), Payload::from_data("tiny"));
    let fragments = Fragmenter::new(1024).fragment(original.clone());
    assert_eq!(fragments, vec![original]);
}

#[rstest]
fn disabled_fragmenter_never_splits() {
    let original = Frame::next_payload(sid(9), Payload::from_data(vec![0u8; 4096]));
    let fragments = Fragmenter::new(0).fragment(original.clone());
    assert_eq!(fragments, vec![original]);
}

#[rstest]
fn mismatched_continuation_type_is_rejected() {
    let mut reassembler = Reassembler::new(1024);
    let head = Frame::new(
        sid(11),
        FrameBody::RequestResponse(RequestResponse {
            payload: Payload::from_data("123"),
            follows: true,
        }),
    );
    assert!(reassembler.absorb(head).expect("head absorbed").is_none());

    let stray = Frame::new(
        sid(11),
        FrameBody::RequestChannel(RequestChannel {
            initial_n: 1,
            payload: Payload::from_data("123"),
            follows: false,
            complete: true,
        }),
    );
    assert!(matches!(
        reassembler.absorb(stray),
        Err(ReassemblyError::TypeMismatch { .. })
    ));
    assert!(!reassembler.is_pending(sid(11)));
}

#[rstest]
fn buffer_cap_is_enforced() {
    let mut reassembler = Reassembler::new(8);
    let head = Frame::new(
        sid(13),
        FrameBody::Payload(PayloadFrame {
            payload: Payload::from_data("12345"),
            next: true,
            complete: false,
            follows: true,
        }),
    );
    assert!(reassembler.absorb(head).expect("head absorbed").is_none());

    let continuation = Frame::new(
        sid(13),
        FrameBody::Payload(PayloadFrame {
            payload: Payload::from_data("67890"),
            next: true,
            complete: false,
            follows: false,
        }),
    );
    let err = reassembler.absorb(continuation).expect_err("cap breached");
    assert!(err.is_fatal());
    assert_eq!(reassembler.pending_len(), 0);
}

#[rstest]
fn fragments_of_different_streams_interleave_freely() {
    let mut reassembler = Reassembler::new(1024);
    let head = |id: u32, text: &'static str| {
        Frame::new(
            sid(id),
            FrameBody::Payload(PayloadFrame {
                payload: Payload::from_data(text),
                next: true,
                complete: false,
                follows: true,
            }),
        )
    };
    let tail = |id: u32, text: &'static str| {
        Frame::new(
            sid(id),
            FrameBody::Payload(PayloadFrame {
                payload: Payload::from_data(text),
                next: true,
                complete: false,
                follows: false,
            }),
        )
    };

    assert!(reassembler.absorb(head(1, "aa")).expect("absorb").is_none());
    assert!(reassembler.absorb(head(3, "xx")).expect("absorb").is_none());
    let first = reassembler
        .absorb(tail(1, "bb"))
        .expect("absorb")
        .expect("stream 1 complete");
    let second = reassembler
        .absorb(tail(3, "yy"))
        .expect("absorb")
        .expect("stream 3 complete");

    let FrameBody::Payload(first) = first.body else { panic!("not PAYLOAD") };
    let FrameBody::Payload(second) = second.body else { panic!("not PAYLOAD") };
    assert_eq!(first.payload.data().as_ref(), b"aabb");
    assert_eq!(second.payload.data().as_ref(), b"xxyy");
}

#[rstest]
fn metadata_after_data_is_rejected() {
    let mut reassembler = Reassembler::new(1024);
    let head = Frame::new(
        sid(15),
        FrameBody::Payload(PayloadFrame {
            payload: Payload::from_data("data"),
            next: true,
            complete: false,
            follows: true,
        }),
    );
    assert!(reassembler.absorb(head).expect("absorb").is_none());

    let bad = Frame::new(
        sid(15),
        FrameBody::Payload(PayloadFrame {
            payload: Payload::with_metadata("late", "more"),
            next: true,
            complete: false,
            follows: false,
        }),
    );
    let err = reassembler.absorb(bad).expect_err("interleaved metadata");
    assert!(matches!(err, ReassemblyError::Interleaved { .. }));
    assert!(!err.is_fatal());
}
