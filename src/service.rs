//! The directory record describing one endpoint on the network (§3, §4.4).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::types::{NodeUuid, SocketKind, Topic};

pub(crate) const MDNS_DOMAIN: &str = "_colugo._tcp.local.";

/// An opaque back-reference to the live transport socket behind a local
/// endpoint. Remote entries never carry one.
pub type SocketHandle = Arc<dyn Any + Send + Sync>;

/// One directory record: the network identity of one endpoint.
///
/// Two services are equal exactly when `topic`, `address`, `port`, `kind`
/// and `node_uuid` all match (§3) — `socket_handle` and `mdns_name` are
/// derived, not part of identity.
#[derive(Clone)]
pub struct Service {
    pub topic: Topic,
    pub address: String,
    pub port: u16,
    pub kind: SocketKind,
    pub node_uuid: NodeUuid,
    pub socket_handle: Option<SocketHandle>,
}

impl Service {
    pub fn new_remote(
        topic: Topic,
        address: String,
        port: u16,
        kind: SocketKind,
        node_uuid: NodeUuid,
    ) -> Self {
        Service {
            topic,
            address,
            port,
            kind,
            node_uuid,
            socket_handle: None,
        }
    }

    pub fn new_local(
        topic: Topic,
        address: String,
        port: u16,
        kind: SocketKind,
        node_uuid: NodeUuid,
        socket_handle: SocketHandle,
    ) -> Self {
        Service {
            topic,
            address,
            port,
            kind,
            node_uuid,
            socket_handle: Some(socket_handle),
        }
    }

    /// `_<topic>._<node_uuid>._colugo._tcp.local.` (§4.5).
    pub fn mdns_name(&self) -> String {
        format!("_{}._{}.{}", self.topic, self.node_uuid, MDNS_DOMAIN)
    }

    pub fn is_local(&self) -> bool {
        self.socket_handle.is_some()
    }
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic
            && self.address == other.address
            && self.port == other.port
            && self.kind == other.kind
            && self.node_uuid == other.node_uuid
    }
}

impl Eq for Service {}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("topic", &self.topic)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("node_uuid", &self.node_uuid)
            .field("local", &self.is_local())
            .finish()
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}@{}:{} ({})",
            self.kind, self.topic, self.address, self.port, self.node_uuid
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(topic: &str, port: u16, uuid: NodeUuid) -> Service {
        Service::new_remote(
            Topic::new(topic).unwrap(),
            "127.0.0.1".to_string(),
            port,
            SocketKind::Pub,
            uuid,
        )
    }

    #[test]
    fn equality_is_the_five_tuple() {
        let uuid = NodeUuid::generate();
        assert_eq!(svc("t", 10001, uuid), svc("t", 10001, uuid));
    }

    #[test]
    fn equality_differs_on_port() {
        let uuid = NodeUuid::generate();
        assert_ne!(svc("t", 10001, uuid), svc("t", 10002, uuid));
    }

    #[test]
    fn mdns_name_format() {
        let uuid = NodeUuid::generate();
        let s = svc("chat", 10001, uuid);
        assert_eq!(s.mdns_name(), format!("_chat._{}._colugo._tcp.local.", uuid));
    }

    #[test]
    fn local_vs_remote() {
        let uuid = NodeUuid::generate();
        let remote = svc("t", 10001, uuid);
        assert!(!remote.is_local());
        let local = Service::new_local(
            Topic::new("t").unwrap(),
            "127.0.0.1".to_string(),
            10001,
            SocketKind::Pub,
            uuid,
            Arc::new(()),
        );
        assert!(local.is_local());
        // identity ignores socket_handle presence
        assert_eq!(local, remote);
    }
}
