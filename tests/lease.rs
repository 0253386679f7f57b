//! Lease semantics: responder-issued grants gate requests.

mod common;

use std::time::Duration;

use async_trait::async_trait;
use weft::{Client, Error, Payload, Responder, Server};

struct Echo;

#[async_trait]
impl Responder for Echo {
    async fn request_response(&self, payload: Payload) -> weft::Result<Payload> {
        Ok(payload)
    }
}

async fn first_success(pair: &common::Pair) -> Payload {
    // The LEASE frame races the first request; retry until it lands.
    for _ in 0..50 {
        if let Ok(reply) = pair.client.request_response(Payload::from_data("lease?")).await {
            return reply;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no request admitted after the lease was granted");
}

#[tokio::test]
async fn requests_wait_for_a_lease() {
    let pair = common::connect(Client::new().honor_lease(), Server::new().responder(Echo));

    // No lease yet: rejected locally, before anything hits the wire.
    let outcome = pair.client.request_response(Payload::empty()).await;
    assert!(matches!(outcome, Err(Error::Rejected(_))));

    pair.server
        .grant_lease(Duration::from_secs(5), 3)
        .await
        .expect("lease issued");
    let reply = first_success(&pair).await;
    assert_eq!(reply.data().as_ref(), b"lease?");
}

#[tokio::test]
async fn the_third_request_exceeds_a_lease_of_two() {
    let pair = common::connect(Client::new().honor_lease(), Server::new().responder(Echo));

    pair.server
        .grant_lease(Duration::from_secs(5), 2)
        .await
        .expect("lease issued");

    // First success consumes one unit; the retry loop may burn none
    // beyond it because pre-lease attempts fail without consuming.
    first_success(&pair).await;
    pair.client
        .request_response(Payload::from_data("second"))
        .await
        .expect("second request within the lease");

    let third = pair.client.request_response(Payload::from_data("third")).await;
    assert!(matches!(third, Err(Error::Rejected(_))));

    // The connection itself survives lease exhaustion.
    assert!(!pair.client_conn.is_finished());
    assert!(!pair.server_conn.is_finished());
}

#[tokio::test]
async fn expired_leases_reject_before_send() {
    let pair = common::connect(Client::new().honor_lease(), Server::new().responder(Echo));

    pair.server
        .grant_lease(Duration::from_millis(150), 10)
        .await
        .expect("lease issued");
    first_success(&pair).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let outcome = pair.client.request_response(Payload::from_data("late")).await;
    assert!(matches!(outcome, Err(Error::Rejected(_))));
}

#[tokio::test]
async fn a_fresh_lease_restores_service() {
    let pair = common::connect(Client::new().honor_lease(), Server::new().responder(Echo));

    pair.server
        .grant_lease(Duration::from_secs(5), 1)
        .await
        .expect("lease issued");
    first_success(&pair).await;
    assert!(matches!(
        pair.client.request_response(Payload::empty()).await,
        Err(Error::Rejected(_))
    ));

    pair.server
        .grant_lease(Duration::from_secs(5), 1)
        .await
        .expect("second lease issued");
    first_success(&pair).await;
}

#[tokio::test]
async fn leases_are_refused_when_not_negotiated() {
    // SETUP did not set the lease flag.
    let pair = common::connect(Client::new(), Server::new().responder(Echo));
    let outcome = pair.server.grant_lease(Duration::from_secs(1), 5).await;
    assert!(matches!(outcome, Err(Error::Rejected(_))));
}
