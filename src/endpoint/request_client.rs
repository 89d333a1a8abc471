use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use super::ClientConnector;
use crate::socket::{Message, SocketError, TransportSocket};
use crate::types::{SocketKind, Topic};

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2000;

/// `REQ`, client. Holds at most one in-flight callback; a new `send`
/// supersedes any prior one (relaxed mode, §4.2/§4.7).
pub struct RequestClient {
    topic: Topic,
    socket: Arc<TransportSocket>,
    handle: tokio::runtime::Handle,
    on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl RequestClient {
    pub(crate) fn new(
        handle: &tokio::runtime::Handle,
        topic: Topic,
        on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> Result<Self, SocketError> {
        let socket = Arc::new(TransportSocket::new(SocketKind::Req)?);
        Ok(RequestClient {
            topic,
            socket,
            handle: handle.clone(),
            on_connect,
            in_flight: Mutex::new(None),
        })
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Transmits `message` and arms a reply/timeout race. When a reply
    /// arrives, `on_reply` runs and the in-flight state is cleared. When
    /// `timeout_ms` elapses first, `on_timeout` (if any) runs and the
    /// underlying socket is recycled.
    pub fn send(
        &self,
        message: impl Into<Message>,
        on_reply: impl Fn(Vec<u8>) + Send + 'static,
        timeout_ms: u64,
        on_timeout: Option<impl Fn() + Send + 'static>,
    ) -> Result<(), SocketError> {
        if let Some(previous) = self.in_flight.lock().unwrap().take() {
            previous.abort();
        }
        self.socket.send(message)?;

        let socket = self.socket.clone();
        let timeout = Duration::from_millis(timeout_ms);
        let topic = self.topic.clone();
        let task = self.handle.spawn(async move {
            match tokio::time::timeout(timeout, socket.recv_next()).await {
                Ok(Ok(payload)) => on_reply(payload),
                Ok(Err(error)) => {
                    warn!(%topic, %error, "request client receive failed");
                }
                Err(_elapsed) => {
                    if let Some(on_timeout) = on_timeout {
                        on_timeout();
                    }
                    if let Err(error) = socket.recycle() {
                        warn!(%topic, %error, "failed to recycle request socket after timeout");
                    }
                }
            }
        });
        *self.in_flight.lock().unwrap() = Some(task);
        Ok(())
    }
}

impl ClientConnector for RequestClient {
    fn connect(&self, address: &str, port: u16) -> Result<(), SocketError> {
        self.socket.connect(address, port)?;
        if let Some(on_connect) = &self.on_connect {
            on_connect();
        }
        Ok(())
    }
}
