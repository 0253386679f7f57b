//! Fire-and-forget and metadata-push delivery.

mod common;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use weft::{Client, Payload, Responder, Server};

enum Seen {
    Fnf(Payload),
    Metadata(Bytes),
}

struct Recorder {
    seen: mpsc::UnboundedSender<Seen>,
}

#[async_trait]
impl Responder for Recorder {
    async fn fire_and_forget(&self, payload: Payload) -> weft::Result<()> {
        let _ = self.seen.send(Seen::Fnf(payload));
        Ok(())
    }

    async fn metadata_push(&self, metadata: Bytes) -> weft::Result<()> {
        let _ = self.seen.send(Seen::Metadata(metadata));
        Ok(())
    }
}

#[tokio::test]
async fn fire_and_forget_reaches_the_handler() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let pair = common::connect(Client::new(), Server::new().responder(Recorder { seen: seen_tx }));

    pair.client
        .fire_and_forget(Payload::from_data("logline"))
        .await
        .expect("local dispatch");

    let Some(Seen::Fnf(payload)) = seen_rx.recv().await else {
        panic!("handler saw nothing");
    };
    assert_eq!(payload.data().as_ref(), b"logline");
}

#[tokio::test]
async fn fire_and_forget_failures_are_ignored() {
    struct AlwaysFails;

    #[async_trait]
    impl Responder for AlwaysFails {
        async fn fire_and_forget(&self, _payload: Payload) -> weft::Result<()> {
            Err(weft::Error::rejected("nope"))
        }

        async fn request_response(&self, payload: Payload) -> weft::Result<Payload> {
            Ok(payload)
        }
    }

    let pair = common::connect(Client::new(), Server::new().responder(AlwaysFails));
    pair.client
        .fire_and_forget(Payload::from_data("dropped"))
        .await
        .expect("local dispatch still succeeds");

    // The handler failure never surfaces; the connection stays healthy.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let reply = pair
        .client
        .request_response(Payload::from_data("alive?"))
        .await
        .expect("connection survived");
    assert_eq!(reply.data().as_ref(), b"alive?");
}

#[tokio::test]
async fn metadata_push_reaches_the_handler() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let pair = common::connect(Client::new(), Server::new().responder(Recorder { seen: seen_tx }));

    pair.client
        .metadata_push(Bytes::from_static(b"routing-table"))
        .await
        .expect("local dispatch");

    let Some(Seen::Metadata(metadata)) = seen_rx.recv().await else {
        panic!("handler saw nothing");
    };
    assert_eq!(metadata.as_ref(), b"routing-table");
}
