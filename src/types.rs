//! Domain newtypes shared across the crate: topics, node identifiers and
//! the four endpoint kinds.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// A validation failure for a [`Topic`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic must not be empty")]
    Empty,
    #[error("topic {0:?} contains a character outside [A-Za-z0-9./]")]
    InvalidCharacter(String),
}

/// A human-readable address for one or more endpoints across the network.
///
/// Restricted to `[A-Za-z0-9./]+`; `_` is reserved by the mDNS name
/// encoding (§6 topic grammar).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    pub fn new(value: impl Into<String>) -> Result<Self, TopicError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TopicError::Empty);
        }
        let valid = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '/');
        if !valid {
            return Err(TopicError::InvalidCharacter(value));
        }
        Ok(Topic(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Process-unique identifier of the owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeUuid(Uuid);

impl NodeUuid {
    pub fn generate() -> Self {
        NodeUuid(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for NodeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for NodeUuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NodeUuid(Uuid::parse_str(s)?))
    }
}

/// The four endpoint kinds. Servers bind; clients connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Pub,
    Sub,
    Req,
    Rep,
}

impl SocketKind {
    /// Whether this kind binds (server) or connects (client).
    pub fn is_server(self) -> bool {
        matches!(self, SocketKind::Pub | SocketKind::Rep)
    }

    /// The mDNS `socket_type` integer code (§4.4).
    pub fn as_code(self) -> u8 {
        match self {
            SocketKind::Pub => 1,
            SocketKind::Sub => 2,
            SocketKind::Req => 3,
            SocketKind::Rep => 4,
        }
    }

    /// Inverse of [`SocketKind::as_code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SocketKind::Pub),
            2 => Some(SocketKind::Sub),
            3 => Some(SocketKind::Req),
            4 => Some(SocketKind::Rep),
            _ => None,
        }
    }

    pub(crate) fn as_zmq(self) -> zmq::SocketType {
        match self {
            SocketKind::Pub => zmq::PUB,
            SocketKind::Sub => zmq::SUB,
            SocketKind::Req => zmq::REQ,
            SocketKind::Rep => zmq::REP,
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SocketKind::Pub => "PUB",
            SocketKind::Sub => "SUB",
            SocketKind::Req => "REQ",
            SocketKind::Rep => "REP",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_accepts_grammar() {
        assert!(Topic::new("a.b/c123").is_ok());
    }

    #[test]
    fn topic_rejects_empty() {
        assert_eq!(Topic::new("").unwrap_err(), TopicError::Empty);
    }

    #[test]
    fn topic_rejects_underscore() {
        assert!(matches!(
            Topic::new("a_b").unwrap_err(),
            TopicError::InvalidCharacter(_)
        ));
    }

    #[test]
    fn node_uuid_roundtrips_through_string() {
        let uuid = NodeUuid::generate();
        let parsed: NodeUuid = uuid.as_str().parse().unwrap();
        assert_eq!(uuid, parsed);
    }

    #[test]
    fn node_uuid_generate_is_unique() {
        assert_ne!(NodeUuid::generate(), NodeUuid::generate());
    }

    #[test]
    fn socket_kind_code_roundtrips() {
        for kind in [SocketKind::Pub, SocketKind::Sub, SocketKind::Req, SocketKind::Rep] {
            assert_eq!(SocketKind::from_code(kind.as_code()), Some(kind));
        }
    }

    #[test]
    fn socket_kind_server_classification() {
        assert!(SocketKind::Pub.is_server());
        assert!(SocketKind::Rep.is_server());
        assert!(!SocketKind::Sub.is_server());
        assert!(!SocketKind::Req.is_server());
    }
}
