//! Shared wiring for integration tests: a client and server connected
//! over an in-memory duplex transport.

use weft::{Client, ConnectionHandle, Requester, Server, transport};

pub struct Pair {
    pub client: Requester,
    pub client_conn: ConnectionHandle,
    pub server: Requester,
    pub server_conn: ConnectionHandle,
}

/// Wire `client` and `server` together over `tokio::io::duplex`.
pub fn connect(client: Client, server: Server) -> Pair {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_requester, server_conn) = server.accept(transport::framed(server_io));
    let (client_requester, client_conn) = client.connect(transport::framed(client_io));
    Pair {
        client: client_requester,
        client_conn,
        server: server_requester,
        server_conn,
    }
}
