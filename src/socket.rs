//! Transport Socket: adapts one brokerless-messaging socket (PUB/SUB/REQ/REP)
//! to the event loop, exposing send/receive and the request/reply
//! reliability policy (§4.2).

use std::net::UdpSocket;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use thiserror::Error;
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};

use crate::types::SocketKind;

/// The process-wide transport context (§5: "the transport context is
/// process-wide; setting options on it affects subsequent socket
/// creation").
static CONTEXT: Lazy<zmq::Context> = Lazy::new(zmq::Context::new);

pub(crate) const MIN_PORT: u16 = 10001;
pub(crate) const MAX_PORT: u16 = 20000;
const MAX_BIND_ATTEMPTS: u32 = 100;
const REQ_SNDTIMEO_MS: i32 = 1000;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("no free port in [{MIN_PORT}, {MAX_PORT}] after {MAX_BIND_ATTEMPTS} attempts")]
    BindExhausted,
    #[error("socket is closed")]
    Closed,
    #[error("underlying transport error: {0}")]
    Transport(#[from] zmq::Error),
    #[error("local socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Either a UTF-8 string or an opaque byte payload (§4.2 `send`).
pub enum Message {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message::Text(value)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Message::Bytes(value)
    }
}

struct RawFdGuard(RawFd);

impl AsRawFd for RawFdGuard {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Picks a local IPv4 by opening a UDP socket to an unreachable external
/// address and reading the chosen source address back; falls back to
/// `127.0.0.1` on any failure (§4.2 `bind`).
fn local_ip() -> String {
    (|| -> std::io::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("10.255.255.255:1")?;
        Ok(socket.local_addr()?.ip().to_string())
    })()
    .unwrap_or_else(|_| "127.0.0.1".to_string())
}

struct Inner {
    socket: Option<zmq::Socket>,
    last_endpoint: Option<String>,
}

/// One brokerless-messaging socket of a fixed kind, adapted to the loop.
pub struct TransportSocket {
    kind: SocketKind,
    inner: Mutex<Inner>,
}

impl TransportSocket {
    pub fn new(kind: SocketKind) -> Result<Self, SocketError> {
        let socket = Self::create_socket(kind)?;
        Ok(TransportSocket {
            kind,
            inner: Mutex::new(Inner {
                socket: Some(socket),
                last_endpoint: None,
            }),
        })
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    fn create_socket(kind: SocketKind) -> Result<zmq::Socket, SocketError> {
        let socket = CONTEXT.socket(kind.as_zmq())?;
        if kind == SocketKind::Req {
            socket.set_req_correlate(true)?;
            socket.set_req_relaxed(true)?;
            socket.set_sndtimeo(REQ_SNDTIMEO_MS)?;
            socket.set_linger(0)?;
        }
        if kind == SocketKind::Sub {
            // Accept-all filter, set once at construction (§4.3 Subscriber).
            socket.set_subscribe(b"")?;
        }
        Ok(socket)
    }

    /// Binds to a random free port in [10001, 20000], up to 100 attempts.
    pub fn bind(&self) -> Result<(String, u16), SocketError> {
        let ip = local_ip();
        let mut guard = self.inner.lock().unwrap();
        let socket = guard.socket.as_ref().ok_or(SocketError::Closed)?;
        let mut rng = rand::rng();
        for _ in 0..MAX_BIND_ATTEMPTS {
            let port = rand::Rng::random_range(&mut rng, MIN_PORT..=MAX_PORT);
            let endpoint = format!("tcp://{ip}:{port}");
            match socket.bind(&endpoint) {
                Ok(()) => {
                    guard.last_endpoint = Some(endpoint);
                    debug!(%ip, port, kind = %self.kind, "bound transport socket");
                    return Ok((ip, port));
                }
                Err(zmq::Error::EADDRINUSE) => continue,
                Err(e) => return Err(SocketError::from(e)),
            }
        }
        Err(SocketError::BindExhausted)
    }

    /// Connects to `address:port`. May be called more than once on a
    /// `SUB`/`REQ` socket to multiplex connections; not idempotence-checked.
    pub fn connect(&self, address: &str, port: u16) -> Result<(), SocketError> {
        let endpoint = format!("tcp://{address}:{port}");
        let mut guard = self.inner.lock().unwrap();
        let socket = guard.socket.as_ref().ok_or(SocketError::Closed)?;
        socket.connect(&endpoint)?;
        guard.last_endpoint = Some(endpoint);
        Ok(())
    }

    /// Disconnects the most recently bound/connected endpoint, if any.
    pub fn disconnect(&self) -> Result<(), SocketError> {
        let mut guard = self.inner.lock().unwrap();
        let Some(socket) = guard.socket.as_ref() else {
            return Ok(());
        };
        if let Some(endpoint) = guard.last_endpoint.take() {
            let _ = socket.disconnect(&endpoint);
        }
        Ok(())
    }

    pub fn unbind(&self) -> Result<(), SocketError> {
        let mut guard = self.inner.lock().unwrap();
        let Some(socket) = guard.socket.as_ref() else {
            return Ok(());
        };
        if let Some(endpoint) = guard.last_endpoint.take() {
            let _ = socket.unbind(&endpoint);
        }
        Ok(())
    }

    /// Terminal; double-close is safe. Disconnects if connected, then
    /// releases the socket.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap();
        if let Some(socket) = guard.socket.as_ref() {
            if let Some(endpoint) = guard.last_endpoint.take() {
                let _ = socket.disconnect(&endpoint);
                let _ = socket.unbind(&endpoint);
            }
        }
        guard.socket = None;
    }

    /// Closes the socket and creates a fresh one of the same kind with the
    /// same options; the peer list is **not** re-established (§4.2
    /// "Socket recycling").
    pub fn recycle(&self) -> Result<(), SocketError> {
        self.close();
        let fresh = Self::create_socket(self.kind)?;
        let mut guard = self.inner.lock().unwrap();
        guard.socket = Some(fresh);
        guard.last_endpoint = None;
        Ok(())
    }

    /// Completes synchronously against the outbound queue; never blocks on
    /// the network, except `REQ` sockets which honor `SNDTIMEO`.
    pub fn send(&self, message: impl Into<Message>) -> Result<(), SocketError> {
        let guard = self.inner.lock().unwrap();
        let socket = guard.socket.as_ref().ok_or(SocketError::Closed)?;
        let flags = if self.kind == SocketKind::Req { 0 } else { zmq::DONTWAIT };
        let result = match message.into() {
            Message::Text(text) => socket.send(text.as_str(), flags),
            Message::Bytes(bytes) => socket.send(bytes.as_slice(), flags),
        };
        result.map_err(SocketError::from)
    }

    fn current_fd(&self) -> Result<RawFd, SocketError> {
        let guard = self.inner.lock().unwrap();
        let socket = guard.socket.as_ref().ok_or(SocketError::Closed)?;
        Ok(socket.get_fd()?)
    }

    /// Receives the next frame. This is the async primitive endpoints build
    /// their arming policy on top of (§4.2 `receive`).
    pub async fn recv_next(&self) -> Result<Vec<u8>, SocketError> {
        loop {
            let fd = self.current_fd()?;
            let async_fd = AsyncFd::new(RawFdGuard(fd))?;
            let mut guard = async_fd.readable().await?;

            loop {
                let outcome = {
                    let inner = self.inner.lock().unwrap();
                    let socket = inner.socket.as_ref().ok_or(SocketError::Closed)?;
                    match socket.get_events() {
                        Ok(events) if events.contains(zmq::POLLIN) => {
                            match socket.recv_bytes(zmq::DONTWAIT) {
                                Ok(bytes) => Some(Ok(bytes)),
                                Err(zmq::Error::EAGAIN) => None,
                                Err(e) => Some(Err(SocketError::from(e))),
                            }
                        }
                        Ok(_) => None,
                        Err(e) => Some(Err(SocketError::from(e))),
                    }
                };
                match outcome {
                    Some(result) => {
                        guard.clear_ready();
                        return result;
                    }
                    None => break,
                }
            }
            guard.clear_ready();
        }
    }
}

impl Drop for TransportSocket {
    fn drop(&mut self) {
        let closed = self.inner.lock().unwrap().socket.is_none();
        if !closed {
            warn!(kind = %self.kind, "transport socket dropped without close()");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_yields_port_in_range() {
        let socket = TransportSocket::new(SocketKind::Pub).unwrap();
        let (ip, port) = socket.bind().unwrap();
        assert!(!ip.is_empty());
        assert!((MIN_PORT..=MAX_PORT).contains(&port));
    }

    #[test]
    fn double_close_is_safe() {
        let socket = TransportSocket::new(SocketKind::Pub).unwrap();
        socket.close();
        socket.close();
    }

    #[test]
    fn req_socket_carries_reliability_options() {
        // Construction must not fail when setting REQ_CORRELATE/RELAXED.
        assert!(TransportSocket::new(SocketKind::Req).is_ok());
    }

    #[tokio::test]
    async fn pub_sub_round_trip_over_loopback() {
        let publisher = TransportSocket::new(SocketKind::Pub).unwrap();
        let (ip, port) = publisher.bind().unwrap();

        let subscriber = TransportSocket::new(SocketKind::Sub).unwrap();
        subscriber.connect(&ip, port).unwrap();

        // Give the SUB's connection a moment to establish before the PUB
        // sends; PUB/SUB drops messages sent before the subscriber joins.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        publisher.send("asdf").unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), subscriber.recv_next())
            .await
            .expect("recv timed out")
            .unwrap();
        assert_eq!(received, b"asdf");
    }
}
