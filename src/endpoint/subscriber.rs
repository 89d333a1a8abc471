use std::sync::Arc;

use tracing::warn;

use super::ClientConnector;
use crate::socket::{SocketError, TransportSocket};
use crate::types::{SocketKind, Topic};

/// `SUB`, client. After `connect` it receives every frame published on the
/// topic; the accept-all filter ("") is set once at construction.
pub struct Subscriber {
    topic: Topic,
    socket: Arc<TransportSocket>,
    on_connect: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Subscriber {
    pub(crate) fn new(
        handle: &tokio::runtime::Handle,
        topic: Topic,
        on_message: impl Fn(Vec<u8>) + Send + 'static,
        on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> Result<Self, SocketError> {
        let socket = Arc::new(TransportSocket::new(SocketKind::Sub)?);
        let loop_socket = socket.clone();
        let loop_topic = topic.clone();
        handle.spawn(async move {
            loop {
                match loop_socket.recv_next().await {
                    Ok(payload) => on_message(payload),
                    Err(SocketError::Closed) => break,
                    Err(error) => {
                        warn!(topic = %loop_topic, %error, "subscriber receive failed");
                        break;
                    }
                }
            }
        });
        Ok(Subscriber {
            topic,
            socket,
            on_connect,
        })
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub(crate) fn socket_clone(&self) -> Arc<TransportSocket> {
        self.socket.clone()
    }
}

impl ClientConnector for Subscriber {
    fn connect(&self, address: &str, port: u16) -> Result<(), SocketError> {
        self.socket.connect(address, port)?;
        if let Some(on_connect) = &self.on_connect {
            on_connect();
        }
        Ok(())
    }
}
