use std::sync::Arc;

use crate::service::SocketHandle;
use crate::socket::{Message, SocketError, TransportSocket};
use crate::types::{SocketKind, Topic};

/// `PUB`, server. Bind-only; `send` pushes to all connected subscribers.
/// Topic-filtering is left to the transport's built-in subscriber filter.
pub struct Publisher {
    topic: Topic,
    socket: Arc<TransportSocket>,
}

impl Publisher {
    pub(crate) fn bind(topic: Topic) -> Result<(Self, String, u16), SocketError> {
        let socket = Arc::new(TransportSocket::new(SocketKind::Pub)?);
        let (address, port) = socket.bind()?;
        Ok((Publisher { topic, socket }, address, port))
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn send(&self, message: impl Into<Message>) -> Result<(), SocketError> {
        self.socket.send(message)
    }

    pub(crate) fn socket_handle(&self) -> SocketHandle {
        self.socket.clone()
    }
}
