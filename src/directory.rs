//! In-memory set of [`Service`] records, partitioned into `servers` and
//! `clients` per node (§3, §4.4).

use crate::service::Service;
use crate::types::{NodeUuid, Topic};

/// Holds the `servers` (locally bound + all remotely announced) and
/// `clients` (locally created clients) subsets for one node.
#[derive(Default)]
pub struct Directory {
    servers: Vec<Service>,
    clients: Vec<Service>,
}

impl Directory {
    pub fn new() -> Self {
        Directory::default()
    }

    /// Rejects equal duplicates (returns `false`); otherwise appends and
    /// returns `true`.
    pub fn add_server(&mut self, service: Service) -> bool {
        Self::add_into(&mut self.servers, service)
    }

    pub fn add_client(&mut self, service: Service) -> bool {
        Self::add_into(&mut self.clients, service)
    }

    fn add_into(set: &mut Vec<Service>, service: Service) -> bool {
        if set.contains(&service) {
            return false;
        }
        set.push(service);
        true
    }

    pub fn contains_server(&self, service: &Service) -> bool {
        self.servers.contains(service)
    }

    pub fn contains_client(&self, service: &Service) -> bool {
        self.clients.contains(service)
    }

    /// Removes the first server Service matching both `topic` and
    /// `node_uuid`; this is the only key recoverable from an mDNS
    /// withdrawal (§4.4). Returns the removed Service, if any.
    pub fn remove_server(&mut self, topic: &Topic, node_uuid: NodeUuid) -> Option<Service> {
        let idx = self
            .servers
            .iter()
            .position(|s| &s.topic == topic && s.node_uuid == node_uuid)?;
        Some(self.servers.remove(idx))
    }

    pub fn servers(&self) -> &[Service] {
        &self.servers
    }

    pub fn clients(&self) -> &[Service] {
        &self.clients
    }

    /// Local clients whose topic matches `topic` — the wiring rule's
    /// iteration target (§4.6).
    pub fn clients_on_topic<'a>(&'a self, topic: &'a Topic) -> impl Iterator<Item = &'a Service> {
        self.clients.iter().filter(move |s| &s.topic == topic)
    }

    pub fn has_local_server(&self, topic: &Topic, kind: crate::types::SocketKind) -> bool {
        self.servers
            .iter()
            .any(|s| s.is_local() && &s.topic == topic && s.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SocketKind;
    use std::sync::Arc;

    fn local(topic: &str, uuid: NodeUuid) -> Service {
        Service::new_local(
            Topic::new(topic).unwrap(),
            "127.0.0.1".to_string(),
            10001,
            SocketKind::Pub,
            uuid,
            Arc::new(()),
        )
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut dir = Directory::new();
        let uuid = NodeUuid::generate();
        assert!(dir.add_server(local("t", uuid)));
        assert!(!dir.add_server(local("t", uuid)));
        assert_eq!(dir.servers().len(), 1);
    }

    #[test]
    fn remove_by_topic_and_uuid() {
        let mut dir = Directory::new();
        let uuid = NodeUuid::generate();
        dir.add_server(local("t", uuid));
        let topic = Topic::new("t").unwrap();
        assert!(dir.remove_server(&topic, uuid).is_some());
        assert!(dir.servers().is_empty());
    }

    #[test]
    fn clients_on_topic_filters() {
        let mut dir = Directory::new();
        let uuid = NodeUuid::generate();
        dir.add_client(local("a", uuid));
        dir.add_client(local("b", uuid));
        let topic = Topic::new("a").unwrap();
        let matched: Vec<_> = dir.clients_on_topic(&topic).collect();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn has_local_server_checks_kind_and_topic() {
        let mut dir = Directory::new();
        let uuid = NodeUuid::generate();
        dir.add_server(local("t", uuid));
        let topic = Topic::new("t").unwrap();
        assert!(dir.has_local_server(&topic, SocketKind::Pub));
        assert!(!dir.has_local_server(&topic, SocketKind::Rep));
    }
}
