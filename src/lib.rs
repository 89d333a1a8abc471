//! A brokerless pub/sub + request/reply messaging fabric for small LAN
//! applications, wired together automatically by mDNS discovery.
//!
//! Endpoints are addressed by topic rather than host/port: a [`Node`]
//! hosts [`Publisher`](endpoint::Publisher), [`Subscriber`](endpoint::Subscriber),
//! [`RequestClient`](endpoint::RequestClient) and [`ReplyServer`](endpoint::ReplyServer)
//! instances, and the fabric connects clients to matching servers as they
//! appear and disappear on the network.

pub mod config;
pub mod directory;
pub mod discovery;
pub mod endpoint;
pub mod node;
pub mod service;
pub mod socket;
pub mod timer;
pub mod types;

pub use directory::Directory;
pub use endpoint::{ClientConnector, Publisher, ReplyFn, ReplyServer, RequestClient, Subscriber};
pub use node::{Node, NodeError};
pub use service::Service;
pub use socket::{Message, SocketError, TransportSocket};
pub use timer::Timer;
pub use types::{NodeUuid, SocketKind, Topic, TopicError};
