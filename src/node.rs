//! The node: owns the loop, the discovery, and the endpoint collection;
//! auto-wires clients to matching servers (§4.6, §4.7 "Node state").

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::discovery::{Discovery, DiscoveryError, DiscoveryEvent};
use crate::endpoint::{ClientConnector, Publisher, ReplyFn, ReplyServer, RequestClient, Subscriber};
use crate::service::Service;
use crate::socket::SocketError;
use crate::timer::{self, Timer};
use crate::types::{NodeUuid, SocketKind, Topic};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid topic: {0}")]
    Topic(#[from] crate::types::TopicError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("node already has a local {kind} endpoint on topic {topic:?}")]
    DuplicateLocalEndpoint { topic: String, kind: SocketKind },
    #[error("node must be in {expected} to do this; it is in {actual}")]
    InvalidState { expected: &'static str, actual: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Init,
    Running,
    Stopping,
    Stopped,
}

impl NodeState {
    fn name(self) -> &'static str {
        match self {
            NodeState::Init => "init",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Stopped => "stopped",
        }
    }
}

struct WiredClient {
    topic: Topic,
    connector: Arc<dyn ClientConnector>,
}

/// A process's participation handle; owns one event loop (§1 GLOSSARY).
pub struct Node {
    name: String,
    uuid: NodeUuid,
    runtime: tokio::runtime::Runtime,
    directory: Arc<Mutex<Directory>>,
    discovery: Arc<Discovery>,
    discovery_events: Mutex<Option<mpsc::UnboundedReceiver<DiscoveryEvent>>>,
    clients: Mutex<Vec<WiredClient>>,
    state: Mutex<NodeState>,
    shutdown: Notify,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Result<Self, NodeError> {
        let name = name.into();
        let uuid = NodeUuid::generate();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SocketError::from)?;
        let directory = Arc::new(Mutex::new(Directory::new()));
        let (discovery, events) = Discovery::start(runtime.handle(), uuid, directory.clone())?;

        info!(%name, %uuid, "node created");
        Ok(Node {
            name,
            uuid,
            runtime,
            directory,
            discovery: Arc::new(discovery),
            discovery_events: Mutex::new(Some(events)),
            clients: Mutex::new(Vec::new()),
            state: Mutex::new(NodeState::Init),
            shutdown: Notify::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> NodeUuid {
        self.uuid
    }

    fn require_addable_state(&self) -> Result<(), NodeError> {
        let state = *self.state.lock().unwrap();
        match state {
            NodeState::Init | NodeState::Running => Ok(()),
            other => Err(NodeError::InvalidState {
                expected: "init or running",
                actual: other.name(),
            }),
        }
    }

    fn register_local_server(&self, service: Service) -> Result<(), NodeError> {
        let mut dir = self.directory.lock().unwrap();
        if dir.has_local_server(&service.topic, service.kind) {
            return Err(NodeError::DuplicateLocalEndpoint {
                topic: service.topic.to_string(),
                kind: service.kind,
            });
        }
        dir.add_server(service.clone());
        drop(dir);
        self.discovery.announce(&service)?;
        Ok(())
    }

    pub fn add_publisher(&self, topic: &str) -> Result<Arc<Publisher>, NodeError> {
        self.require_addable_state()?;
        let topic = Topic::new(topic)?;
        let (publisher, address, port) = Publisher::bind(topic.clone())?;
        let publisher = Arc::new(publisher);
        let service = Service::new_local(
            topic,
            address,
            port,
            SocketKind::Pub,
            self.uuid,
            publisher.clone() as Arc<dyn std::any::Any + Send + Sync>,
        );
        self.register_local_server(service)?;
        Ok(publisher)
    }

    pub fn add_reply_server(
        &self,
        topic: &str,
        on_request: impl Fn(Vec<u8>, ReplyFn) + Send + 'static,
    ) -> Result<Arc<ReplyServer>, NodeError> {
        self.require_addable_state()?;
        let topic = Topic::new(topic)?;
        let handle = self.runtime.handle().clone();
        let (reply_server, address, port) = ReplyServer::bind(&handle, topic.clone(), on_request)?;
        let reply_server = Arc::new(reply_server);
        let service = Service::new_local(
            topic,
            address,
            port,
            SocketKind::Rep,
            self.uuid,
            reply_server.clone() as Arc<dyn std::any::Any + Send + Sync>,
        );
        self.register_local_server(service)?;
        Ok(reply_server)
    }

    pub fn add_subscriber(
        &self,
        topic: &str,
        on_message: impl Fn(Vec<u8>) + Send + 'static,
        on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> Result<Arc<Subscriber>, NodeError> {
        self.require_addable_state()?;
        let topic = Topic::new(topic)?;
        let handle = self.runtime.handle().clone();
        let subscriber = Arc::new(Subscriber::new(&handle, topic.clone(), on_message, on_connect)?);
        self.register_local_client(
            topic,
            SocketKind::Sub,
            subscriber.clone() as Arc<dyn std::any::Any + Send + Sync>,
            subscriber.clone() as Arc<dyn ClientConnector>,
        );
        Ok(subscriber)
    }

    pub fn add_request_client(
        &self,
        topic: &str,
        on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> Result<Arc<RequestClient>, NodeError> {
        self.require_addable_state()?;
        let topic = Topic::new(topic)?;
        let handle = self.runtime.handle().clone();
        let client = Arc::new(RequestClient::new(&handle, topic.clone(), on_connect)?);
        self.register_local_client(
            topic,
            SocketKind::Req,
            client.clone() as Arc<dyn std::any::Any + Send + Sync>,
            client.clone() as Arc<dyn ClientConnector>,
        );
        Ok(client)
    }

    fn register_local_client(
        &self,
        topic: Topic,
        kind: SocketKind,
        socket_handle: Arc<dyn std::any::Any + Send + Sync>,
        connector: Arc<dyn ClientConnector>,
    ) {
        let service = Service::new_local(
            topic.clone(),
            String::new(),
            0,
            kind,
            self.uuid,
            socket_handle,
        );
        self.directory.lock().unwrap().add_client(service);

        // Wire against servers discovery already knows about before this
        // client existed (§8 scenario 6, in reverse: server before client).
        let matching: Vec<Service> = self
            .directory
            .lock()
            .unwrap()
            .servers()
            .iter()
            .filter(|s| s.topic == topic)
            .cloned()
            .collect();
        for server in &matching {
            if let Err(error) = connector.connect(&server.address, server.port) {
                warn!(%topic, %error, "initial wiring connect failed");
            }
        }

        self.clients.lock().unwrap().push(WiredClient { topic, connector });
    }

    pub fn add_repeater(&self, delay_ms: u64, callback: impl FnMut() + Send + 'static) -> Timer {
        Timer::start(&self.runtime.handle().clone(), delay_ms, callback)
    }

    pub fn add_delayed_callback(&self, delay_ms: u64, callback: impl FnOnce() + Send + 'static) {
        timer::schedule_after(&self.runtime.handle().clone(), delay_ms, callback);
    }

    /// Applies the wiring rule for one discovery event (§4.6).
    fn handle_discovery_event(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Added(service) => {
                let clients = self.clients.lock().unwrap();
                for client in clients.iter().filter(|c| c.topic == service.topic) {
                    if let Err(error) = client.connector.connect(&service.address, service.port) {
                        warn!(topic = %service.topic, %error, "wiring connect failed");
                    } else {
                        debug!(topic = %service.topic, address = %service.address, port = service.port, "wired client to server");
                    }
                }
            }
            DiscoveryEvent::Removed(topic) => {
                let clients = self.clients.lock().unwrap();
                if clients.iter().any(|c| c.topic == topic) {
                    warn!(%topic, "server withdrawn; local clients are not auto-disconnected (accepted simplification)");
                }
            }
        }
    }

    /// Blocks until `stop()` is called or a termination signal arrives.
    pub fn start(&self) -> Result<(), NodeError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != NodeState::Init {
                return Err(NodeError::InvalidState {
                    expected: "init",
                    actual: state.name(),
                });
            }
            *state = NodeState::Running;
        }

        let mut events = self
            .discovery_events
            .lock()
            .unwrap()
            .take()
            .expect("start() called more than once");

        self.runtime.block_on(async {
            let mut sigterm = install_sigterm();
            loop {
                tokio::select! {
                    Some(event) = events.recv() => {
                        self.handle_discovery_event(event);
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("received interrupt; stopping");
                        break;
                    }
                    _ = wait_for(&mut sigterm) => {
                        info!("received terminate signal; stopping");
                        break;
                    }
                    _ = self.shutdown.notified() => {
                        info!("stop() called; stopping");
                        break;
                    }
                    else => break,
                }
            }
        });

        self.shutdown_sequence();
        Ok(())
    }

    /// Enqueues a stop onto the loop; safe to call from any thread,
    /// including from within a signal handler installed by the host
    /// application (§4.1 "a signal handler must be installable that
    /// causes stop to run on the loop, not in signal context").
    pub fn stop(&self) {
        *self.state.lock().unwrap() = NodeState::Stopping;
        self.shutdown.notify_one();
    }

    fn shutdown_sequence(&self) {
        *self.state.lock().unwrap() = NodeState::Stopping;
        // (a) stop browser listeners first so our own retractions below
        // cannot loop back as spurious remove events (§4.6, §9).
        if let Err(error) = self.discovery.stop_listening() {
            warn!(%error, "failed to stop mdns browser listeners");
        }
        // (b) unregister all local server announcements.
        let servers: Vec<Service> = self.directory.lock().unwrap().servers().to_vec();
        self.discovery.unregister_all(&servers);
        // (c) close the responder.
        self.discovery.shutdown();
        // (d) the loop itself stops as `start()`'s block_on future returns.
        *self.state.lock().unwrap() = NodeState::Stopped;
    }
}

#[cfg(unix)]
fn install_sigterm() -> tokio::signal::unix::Signal {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler")
}

#[cfg(unix)]
async fn wait_for(signal: &mut tokio::signal::unix::Signal) {
    signal.recv().await;
}

#[cfg(not(unix))]
fn install_sigterm() -> std::future::Pending<()> {
    std::future::pending()
}

#[cfg(not(unix))]
async fn wait_for(signal: &mut std::future::Pending<()>) {
    std::pin::Pin::new(signal).await;
}
