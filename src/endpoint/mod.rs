//! The four endpoint kinds, thin facades over [`TransportSocket`]
//! (§4.3).

mod publisher;
mod reply_server;
mod request_client;
mod subscriber;

pub use publisher::Publisher;
pub use reply_server::{ReplyFn, ReplyServer};
pub use request_client::{RequestClient, DEFAULT_REQUEST_TIMEOUT_MS};
pub use subscriber::Subscriber;

use crate::socket::SocketError;

/// A local client endpoint (`SUB` or `REQ`) that the node's wiring policy
/// can connect once discovery reports a matching server (§4.6). Servers
/// never implement this — they bind, they do not connect.
pub trait ClientConnector: Send + Sync {
    fn connect(&self, address: &str, port: u16) -> Result<(), SocketError>;
}
