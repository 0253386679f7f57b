//! Request/stream: credit-gated delivery, cancellation, completion.

mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use weft::{Client, Error, Payload, PayloadStream, Responder, Server};

/// Serves a fixed number of counted payloads.
struct Counter {
    total: usize,
}

#[async_trait]
impl Responder for Counter {
    fn request_stream(&self, _payload: Payload) -> weft::Result<PayloadStream> {
        let total = self.total;
        Ok(stream::iter((0..total).map(|n| Ok(Payload::from_data(vec![u8::try_from(n).unwrap_or(0)]))))
            .boxed())
    }
}

/// Flags when the served stream is dropped (cancelled or completed).
struct DropWatcher {
    dropped: Arc<AtomicBool>,
}

impl Drop for DropWatcher {
    fn drop(&mut self) { self.dropped.store(true, Ordering::SeqCst); }
}

struct Endless {
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl Responder for Endless {
    fn request_stream(&self, _payload: Payload) -> weft::Result<PayloadStream> {
        let watcher = DropWatcher { dropped: Arc::clone(&self.dropped) };
        Ok(stream::iter(0u64..)
            .map(move |n| {
                let _ = &watcher;
                Ok(Payload::from_data(n.to_be_bytes().to_vec()))
            })
            .boxed())
    }
}

#[tokio::test]
async fn five_payloads_with_staged_credit() {
    let pair = common::connect(Client::new(), Server::new().responder(Counter { total: 5 }));

    let mut inbound = pair
        .client
        .request_stream(Payload::from_data("give me five"), 2)
        .expect("stream opened");

    let mut received = Vec::new();
    for _ in 0..2 {
        let payload = inbound.next().await.expect("item").expect("payload");
        received.push(payload.data()[0]);
    }

    // No credit left: the responder must not emit a third payload.
    let starved = tokio::time::timeout(Duration::from_millis(100), inbound.next()).await;
    assert!(starved.is_err(), "server emitted beyond granted credit");

    inbound.request(3);
    for _ in 0..3 {
        let payload = inbound.next().await.expect("item").expect("payload");
        received.push(payload.data()[0]);
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);

    // Completion follows once the credit covers the whole sequence.
    assert!(inbound.next().await.is_none());
}

#[tokio::test]
async fn unbounded_initial_credit_drains_the_stream() {
    let pair = common::connect(Client::new(), Server::new().responder(Counter { total: 4 }));

    let inbound = pair
        .client
        .request_stream(Payload::empty(), u32::MAX >> 1)
        .expect("stream opened");
    let payloads: Vec<_> = inbound.collect().await;
    assert_eq!(payloads.len(), 4);
    assert!(payloads.iter().all(Result::is_ok));
}

#[tokio::test]
async fn cancel_mid_stream_stops_the_responder() {
    let dropped = Arc::new(AtomicBool::new(false));
    let pair = common::connect(
        Client::new(),
        Server::new().responder(Endless { dropped: Arc::clone(&dropped) }),
    );

    let mut inbound = pair
        .client
        .request_stream(Payload::empty(), 1)
        .expect("stream opened");
    inbound.next().await.expect("first item").expect("payload");

    inbound.cancel();

    // The responder's source is dropped best-effort once CANCEL lands.
    tokio::time::timeout(Duration::from_secs(1), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("responder kept the stream alive after cancel");

    // No ERROR was emitted: the connection still serves new interactions.
    let pair_client = pair.client.clone();
    let follow_up = pair_client
        .request_stream(Payload::empty(), 1)
        .expect("stream opened")
        .next()
        .await;
    assert!(matches!(follow_up, Some(Ok(_))));
}

#[tokio::test]
async fn responder_stream_errors_terminate_the_stream() {
    struct FailsAfterOne;

    #[async_trait]
    impl Responder for FailsAfterOne {
        fn request_stream(&self, _payload: Payload) -> weft::Result<PayloadStream> {
            Ok(stream::iter(vec![
                Ok(Payload::from_data("fine")),
                Err(Error::application(Payload::from_data("broke"))),
            ])
            .boxed())
        }
    }

    let pair = common::connect(Client::new(), Server::new().responder(FailsAfterOne));
    let mut inbound = pair
        .client
        .request_stream(Payload::empty(), 10)
        .expect("stream opened");

    assert!(matches!(inbound.next().await, Some(Ok(_))));
    let failure = inbound.next().await.expect("terminal item");
    let Err(Error::Application(payload)) = failure else {
        panic!("expected an application error, got {failure:?}");
    };
    assert_eq!(payload.data().as_ref(), b"broke");
    assert!(inbound.next().await.is_none());
}

#[tokio::test]
async fn zero_initial_credit_is_rejected_locally() {
    let pair = common::connect(Client::new(), Server::new().responder(Counter { total: 1 }));
    assert!(pair.client.request_stream(Payload::empty(), 0).is_err());
}
