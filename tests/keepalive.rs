//! Keepalive liveness: echoes keep the connection up, silence kills it.

mod common;

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use weft::{
    Client,
    Error,
    ErrorCode,
    Payload,
    Responder,
    Server,
    frame::{Frame, FrameBody},
    transport,
};

struct Echo;

#[async_trait]
impl Responder for Echo {
    async fn request_response(&self, payload: Payload) -> weft::Result<Payload> {
        Ok(payload)
    }
}

#[tokio::test]
async fn echoed_keepalives_keep_the_connection_alive() {
    let pair = common::connect(
        Client::new()
            .keepalive_interval(Duration::from_millis(50))
            .max_lifetime(Duration::from_millis(200)),
        Server::new().responder(Echo),
    );

    // Outlive several lifetimes worth of silence-would-be-death.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let reply = pair
        .client
        .request_response(Payload::from_data("still here"))
        .await
        .expect("connection alive");
    assert_eq!(reply.data().as_ref(), b"still here");
    assert!(!pair.client_conn.is_finished());
}

#[tokio::test]
async fn a_silent_peer_is_disconnected_within_the_lifetime() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client, client_conn) = Client::new()
        .keepalive_interval(Duration::from_millis(50))
        .max_lifetime(Duration::from_millis(200))
        .connect(transport::framed(client_io));

    // A mute peer: drains inbound frames (so the transport never backs
    // up) but answers nothing, not even keepalives.
    let mut mute = transport::framed(server_io);
    let drain = tokio::spawn(async move { while mute.next().await.is_some() {} });

    // An in-flight request rides the doomed connection.
    let pending = tokio::spawn(async move { client.request_response(Payload::empty()).await });

    let outcome = tokio::time::timeout(Duration::from_secs(2), client_conn.closed())
        .await
        .expect("client must give up within the lifetime");
    let Err(Error::Connection { code, .. }) = outcome else {
        panic!("expected a connection error, got {outcome:?}");
    };
    assert_eq!(code, ErrorCode::ConnectionError);

    // The outstanding stream completed with a transport-loss condition.
    let request_outcome = pending.await.expect("task join");
    assert!(matches!(request_outcome, Err(Error::Connection { .. })));

    drain.abort();
}

#[tokio::test]
async fn keepalive_requests_are_echoed_with_respond_cleared() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    // Hand-drive the server side of the wire.
    let mut wire = transport::framed(server_io);
    let (_client, client_conn) = Client::new()
        .keepalive_interval(Duration::from_millis(50))
        .max_lifetime(Duration::from_secs(5))
        .connect(transport::framed(client_io));

    // First frame is SETUP.
    let setup = wire.next().await.expect("frame").expect("decoded");
    assert!(matches!(setup.body, FrameBody::Setup(_)));

    // Probe the client: it must echo with the respond flag cleared and
    // our data intact.
    let probe = Frame::new(
        weft::frame::StreamId::CONNECTION,
        FrameBody::Keepalive(weft::frame::Keepalive {
            respond: true,
            last_position: 0,
            data: bytes::Bytes::from_static(b"probe"),
        }),
    );
    futures::SinkExt::send(&mut wire, probe).await.expect("send probe");

    let echo = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let frame = wire.next().await.expect("frame").expect("decoded");
            if let FrameBody::Keepalive(body) = frame.body
                && !body.respond
            {
                return body;
            }
        }
    })
    .await
    .expect("echo arrived");
    assert_eq!(echo.data.as_ref(), b"probe");

    client_conn.shutdown();
}
