use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::warn;

use crate::service::SocketHandle;
use crate::socket::{Message, SocketError, TransportSocket};
use crate::types::{SocketKind, Topic};

/// Passed to the application's request handler exactly once per request;
/// calling it replies and re-arms the server for the next request (§4.3,
/// §4.7).
pub struct ReplyFn {
    socket: Arc<TransportSocket>,
    done: Mutex<Option<oneshot::Sender<()>>>,
}

impl ReplyFn {
    fn new(socket: Arc<TransportSocket>, done: oneshot::Sender<()>) -> Self {
        ReplyFn {
            socket,
            done: Mutex::new(Some(done)),
        }
    }

    /// Sends the reply. The application MUST call this exactly once; a
    /// second call is logged and ignored rather than sent (`SendWhilePending`,
    /// §7).
    pub fn reply(&self, message: impl Into<Message>) -> Result<(), SocketError> {
        let Some(done) = self.done.lock().unwrap().take() else {
            warn!("reply_fn called more than once for the same request; ignoring");
            return Ok(());
        };
        let result = self.socket.send(message);
        let _ = done.send(());
        result
    }
}

/// `REP`, server. Binds, then handles one request at a time: the transport
/// forbids two receives in a row without an intervening reply.
pub struct ReplyServer {
    topic: Topic,
    socket: Arc<TransportSocket>,
}

impl ReplyServer {
    pub(crate) fn bind(
        handle: &tokio::runtime::Handle,
        topic: Topic,
        on_request: impl Fn(Vec<u8>, ReplyFn) + Send + 'static,
    ) -> Result<(Self, String, u16), SocketError> {
        let socket = Arc::new(TransportSocket::new(SocketKind::Rep)?);
        let (address, port) = socket.bind()?;

        let loop_socket = socket.clone();
        let loop_topic = topic.clone();
        handle.spawn(async move {
            loop {
                let payload = match loop_socket.recv_next().await {
                    Ok(payload) => payload,
                    Err(SocketError::Closed) => break,
                    Err(error) => {
                        warn!(topic = %loop_topic, %error, "reply server receive failed");
                        break;
                    }
                };
                let (done_tx, done_rx) = oneshot::channel();
                let reply_fn = ReplyFn::new(loop_socket.clone(), done_tx);
                on_request(payload, reply_fn);
                // Do not recv again until the application has replied.
                let _ = done_rx.await;
            }
        });

        Ok((ReplyServer { topic, socket }, address, port))
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub(crate) fn socket_handle(&self) -> SocketHandle {
        self.socket.clone()
    }
}
