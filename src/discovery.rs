//! mDNS-based control plane: turns local endpoint creation into network
//! announcements, and network announcements into directory mutations and
//! node notifications (§4.5).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::service::{Service, MDNS_DOMAIN};
use crate::types::{NodeUuid, SocketKind, Topic};

const QUERY_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("malformed mdns name {0:?}")]
    MalformedMdnsName(String),
    #[error("mdns responder error: {0}")]
    Responder(#[from] mdns_sd::Error),
}

/// Notification the node's wiring policy reacts to (§4.6). Carries enough
/// information to drive the add/remove rule without the node re-reading
/// the directory under its own lock.
pub enum DiscoveryEvent {
    Added(Service),
    Removed(Topic),
}

/// Splits an mDNS instance name on `_`, dropping the trailing `.` of each
/// token; the first token is `topic`, the second `node_uuid` (§4.5).
pub(crate) fn parse_mdns_name(name: &str) -> Result<(Topic, NodeUuid), DiscoveryError> {
    let malformed = || DiscoveryError::MalformedMdnsName(name.to_string());
    let tokens: Vec<&str> = name.split('_').filter(|t| !t.is_empty()).collect();
    let topic_token = tokens.first().ok_or_else(malformed)?;
    let uuid_token = tokens.get(1).ok_or_else(malformed)?;
    let topic = Topic::new(topic_token.trim_end_matches('.')).map_err(|_| malformed())?;
    let node_uuid: NodeUuid = uuid_token
        .trim_end_matches('.')
        .parse()
        .map_err(|_| malformed())?;
    Ok((topic, node_uuid))
}

/// The mDNS layer may serialize the integer `1` as the literal string
/// `"true"`; normalize it back before decoding `socket_type` (§4.4, §9).
fn normalize_socket_type(raw: &str) -> Option<u8> {
    match raw {
        "true" | "True" | "TRUE" => Some(1),
        "false" | "False" | "FALSE" => Some(0),
        other => other.parse().ok(),
    }
}

fn service_from_info(info: &ServiceInfo) -> Result<Service, DiscoveryError> {
    let malformed = || DiscoveryError::MalformedMdnsName(info.get_fullname().to_string());
    let props = info.get_properties();
    let topic_str = props
        .get_property_val_str("topic")
        .ok_or_else(malformed)?;
    let socket_type_str = props
        .get_property_val_str("socket_type")
        .ok_or_else(malformed)?;
    let node_uuid_str = props
        .get_property_val_str("node_uuid")
        .ok_or_else(malformed)?;

    let topic = Topic::new(topic_str).map_err(|_| malformed())?;
    let code = normalize_socket_type(socket_type_str).ok_or_else(malformed)?;
    let kind = SocketKind::from_code(code).ok_or_else(malformed)?;
    let node_uuid: NodeUuid = node_uuid_str.parse().map_err(|_| malformed())?;

    let address = info
        .get_addresses()
        .iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4.to_string()),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(malformed)?;

    Ok(Service::new_remote(topic, address, info.get_port(), kind, node_uuid))
}

/// Owns the mDNS responder/browser handle for one node.
pub struct Discovery {
    daemon: ServiceDaemon,
    node_uuid: NodeUuid,
}

impl Discovery {
    /// Starts the responder, begins browsing `_colugo._tcp.local.`, and
    /// bridges the (blocking) browse receiver onto an async channel. The
    /// bridge thread is the one sanctioned exception to "single OS thread"
    /// in §4.1/§5.
    pub(crate) fn start(
        handle: &tokio::runtime::Handle,
        node_uuid: NodeUuid,
        directory: Arc<Mutex<Directory>>,
    ) -> Result<(Discovery, mpsc::UnboundedReceiver<DiscoveryEvent>), DiscoveryError> {
        let daemon = ServiceDaemon::new()?;
        let receiver = daemon.browse(MDNS_DOMAIN)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let bridge_directory = directory;
        handle.spawn_blocking(move || {
            Self::browse_loop(receiver, bridge_directory, event_tx);
        });

        Ok((Discovery { daemon, node_uuid }, event_rx))
    }

    fn browse_loop(
        receiver: mdns_sd::Receiver<ServiceEvent>,
        directory: Arc<Mutex<Directory>>,
        event_tx: mpsc::UnboundedSender<DiscoveryEvent>,
    ) {
        let mut pending_since: HashMap<String, Instant> = HashMap::new();

        while let Ok(event) = receiver.recv() {
            match event {
                ServiceEvent::ServiceFound(_ty, fullname) => {
                    pending_since.insert(fullname, Instant::now());
                }
                ServiceEvent::ServiceResolved(info) => {
                    pending_since.remove(info.get_fullname());
                    match service_from_info(&info) {
                        Ok(service) => {
                            let topic = service.topic.clone();
                            let mut dir = directory.lock().unwrap();
                            // Local self-announcements arrive here too;
                            // skip them, they are already present.
                            let added = !dir.contains_server(&service) && dir.add_server(service.clone());
                            drop(dir);
                            if added {
                                debug!(%topic, "discovered server");
                                let _ = event_tx.send(DiscoveryEvent::Added(service));
                            }
                        }
                        Err(error) => warn!(%error, "dropping malformed service record"),
                    }
                }
                ServiceEvent::ServiceRemoved(_ty, fullname) => {
                    pending_since.remove(&fullname);
                    match parse_mdns_name(&fullname) {
                        Ok((topic, removed_uuid)) => {
                            let mut dir = directory.lock().unwrap();
                            dir.remove_server(&topic, removed_uuid);
                            drop(dir);
                            let _ = event_tx.send(DiscoveryEvent::Removed(topic));
                        }
                        Err(error) => warn!(%error, "dropping unparsable service removal"),
                    }
                }
                _ => {}
            }

            pending_since.retain(|fullname, since| {
                let alive = since.elapsed() < QUERY_TIMEOUT;
                if !alive {
                    warn!(%fullname, "mdns service info query timed out");
                }
                alive
            });
        }
    }

    /// Announces an already-constructed local server Service on the
    /// network (§4.5). The caller (`Node`) owns inserting it into the
    /// directory — `socket_handle` would be lost going through this path,
    /// which is exactly why local additions never travel through the
    /// browser callback.
    pub(crate) fn announce(&self, service: &Service) -> Result<(), DiscoveryError> {
        let instance_name = format!("_{}._{}", service.topic, self.node_uuid);
        let hostname = format!("{}.local.", self.node_uuid);
        let socket_type = service.kind.as_code().to_string();
        let node_uuid_str = self.node_uuid.as_str();
        let properties: Vec<(&str, &str)> = vec![
            ("topic", service.topic.as_str()),
            ("socket_type", socket_type.as_str()),
            ("node_uuid", node_uuid_str.as_str()),
        ];
        let info = ServiceInfo::new(
            MDNS_DOMAIN,
            &instance_name,
            &hostname,
            service.address.as_str(),
            service.port,
            properties.as_slice(),
        )?;
        self.daemon.register(info)?;
        Ok(())
    }

    pub(crate) fn unregister_server(&self, service: &Service) -> Result<(), DiscoveryError> {
        // unregister() returns a Receiver for the operation status. We must
        // .recv() on it to wait for completion — dropping the receiver
        // immediately causes mdns-sd to log "failed to send response:
        // sending on a closed channel" errors.
        let receiver = self.daemon.unregister(&service.mdns_name())?;
        if let Err(error) = receiver.recv() {
            debug!(%error, "did not receive unregister confirmation");
        }
        Ok(())
    }

    /// Detaches browser listeners before any withdrawal happens, so our
    /// own retractions cannot loop back as spurious remove events (§4.5,
    /// §9 "self-echo during shutdown").
    pub(crate) fn stop_listening(&self) -> Result<(), DiscoveryError> {
        self.daemon.stop_browse(MDNS_DOMAIN)?;
        Ok(())
    }

    pub(crate) fn unregister_all(&self, servers: &[Service]) {
        for service in servers.iter().filter(|s| s.is_local()) {
            if let Err(error) = self.unregister_server(service) {
                warn!(service = %service, %error, "failed to withdraw announcement");
            }
        }
    }

    pub(crate) fn shutdown(&self) {
        match self.daemon.shutdown() {
            Ok(receiver) => {
                if let Err(error) = receiver.recv() {
                    debug!(%error, "did not receive shutdown confirmation");
                }
            }
            Err(error) => warn!(%error, "mdns responder shutdown failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mdns_name_splits_topic_and_uuid() {
        let uuid = NodeUuid::generate();
        let name = format!("_chat._{uuid}._colugo._tcp.local.");
        let (topic, parsed_uuid) = parse_mdns_name(&name).unwrap();
        assert_eq!(topic.as_str(), "chat");
        assert_eq!(parsed_uuid, uuid);
    }

    #[test]
    fn parse_mdns_name_rejects_short_names() {
        assert!(parse_mdns_name("_colugo._tcp.local.").is_err());
    }

    #[test]
    fn normalize_socket_type_handles_boolean_glitch() {
        assert_eq!(normalize_socket_type("true"), Some(1));
        assert_eq!(normalize_socket_type("1"), Some(1));
        assert_eq!(normalize_socket_type("4"), Some(4));
        assert_eq!(normalize_socket_type("nonsense"), None);
    }
}
