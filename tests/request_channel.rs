//! Request/channel: bidirectional sequences with independent credit.

mod common;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use weft::{Client, Payload, PayloadReceiver, PayloadStream, Responder, Server};

/// Echoes every inbound payload back with a prefix, then completes.
struct PrefixEcho;

#[async_trait]
impl Responder for PrefixEcho {
    fn request_channel(
        &self,
        initial: Payload,
        inbound: PayloadReceiver,
    ) -> weft::Result<PayloadStream> {
        // Grant the requester room for its whole outbound direction.
        inbound.request(64);
        let echoed = stream::once(async move { initial })
            .map(Ok)
            .chain(inbound)
            .map(|item| {
                item.map(|payload| {
                    let mut data = b"echo:".to_vec();
                    data.extend_from_slice(payload.data());
                    Payload::from_data(data)
                })
            });
        Ok(echoed.boxed())
    }
}

#[tokio::test]
async fn both_directions_flow_and_complete() {
    let pair = common::connect(Client::new(), Server::new().responder(PrefixEcho));

    let outbound = stream::iter(vec![
        Ok(Payload::from_data("two")),
        Ok(Payload::from_data("three")),
    ]);
    let inbound = pair
        .client
        .request_channel(Payload::from_data("one"), outbound, 16)
        .expect("channel opened");

    let echoed: Vec<String> = inbound
        .map(|item| {
            let payload = item.expect("payload");
            String::from_utf8_lossy(payload.data()).into_owned()
        })
        .collect()
        .await;
    assert_eq!(echoed, vec!["echo:one", "echo:two", "echo:three"]);
}

#[tokio::test]
async fn requester_outbound_is_credit_gated() {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    /// Consumes inbound payloads one at a time, counting them.
    struct SlowConsumer {
        seen: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Responder for SlowConsumer {
        fn request_channel(
            &self,
            _initial: Payload,
            inbound: PayloadReceiver,
        ) -> weft::Result<PayloadStream> {
            let seen = Arc::clone(&self.seen);
            inbound.request(1);
            let counted = inbound.map(move |item| {
                seen.fetch_add(1, Ordering::SeqCst);
                item
            });
            // Nothing flows back until the inbound direction ends.
            Ok(counted
                .filter_map(|_| async { None })
                .chain(stream::once(async { Ok(Payload::from_data("done")) }))
                .boxed())
        }
    }

    let seen = Arc::new(AtomicU32::new(0));
    let pair = common::connect(
        Client::new(),
        Server::new().responder(SlowConsumer { seen: Arc::clone(&seen) }),
    );

    let outbound = stream::iter((0..8u8).map(|n| Ok(Payload::from_data(vec![n]))));
    let mut inbound = pair
        .client
        .request_channel(Payload::empty(), outbound, 1)
        .expect("channel opened");

    // One unit of credit was granted; the requester may not flood the
    // other seven payloads. Wait for the single delivery to land.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    // The responder never granted more, so the channel only finishes when
    // the consumer is cancelled.
    inbound.cancel();
}

#[tokio::test]
async fn empty_outbound_still_completes() {
    let pair = common::connect(Client::new(), Server::new().responder(PrefixEcho));

    let inbound = pair
        .client
        .request_channel(Payload::from_data("only"), stream::empty(), 8)
        .expect("channel opened");

    let echoed: Vec<_> = inbound.collect().await;
    assert_eq!(echoed.len(), 1);
    assert_eq!(
        echoed[0].as_ref().expect("payload").data().as_ref(),
        b"echo:only"
    );
}

#[tokio::test]
async fn responder_sees_live_requester_payloads() {
    let pair = common::connect(Client::new(), Server::new().responder(PrefixEcho));

    let (feed, outbound) = mpsc::unbounded_channel();
    let mut inbound = pair
        .client
        .request_channel(
            Payload::from_data("first"),
            UnboundedReceiverStream::new(outbound),
            16,
        )
        .expect("channel opened");

    let first = inbound.next().await.expect("item").expect("payload");
    assert_eq!(first.data().as_ref(), b"echo:first");

    feed.send(Ok(Payload::from_data("second"))).expect("feed");
    let second = inbound.next().await.expect("item").expect("payload");
    assert_eq!(second.data().as_ref(), b"echo:second");

    drop(feed);
    assert!(inbound.next().await.is_none());
}
