use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::VISITOR;
use crate::error::ProtocolError;

/// Presence a node advertises to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
    /// Reported as offline to others, otherwise fully functional.
    Invisible,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Invisible => "invisible",
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }

    /// The status other peers get to see.
    pub fn public(&self) -> Self {
        match self {
            Self::Invisible => Self::Offline,
            other => *other,
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "invisible" => Ok(Self::Invisible),
            other => Err(ProtocolError::InvalidStatus(other.to_string())),
        }
    }
}

/// Delivery lifecycle of a message held in a local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created locally, not yet durably delivered anywhere.
    Pending,
    /// Created locally and accepted by at least one peer or the tracker.
    Sent,
    /// Originated elsewhere and merged in.
    #[default]
    Received,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Received => "received",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "received" => Ok(Self::Received),
            other => Err(ProtocolError::InvalidStatus(other.to_string())),
        }
    }
}

/// A node as known to the tracker. Identity is `(ip, port)`; the username
/// is a mutable attribute of that address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub ip: IpAddr,
    pub port: u16,
    pub username: String,
    pub status: PresenceStatus,
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
}

impl Peer {
    pub fn new(addr: SocketAddr, username: &str, status: PresenceStatus) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
            username: normalize_username(username),
            status,
            last_seen: Utc::now(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn is_online(&self) -> bool {
        self.status == PresenceStatus::Online
    }
}

/// Empty usernames become the generic visitor label.
pub fn normalize_username(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        VISITOR.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Usernames travel as one whitespace-delimited token on the tracker line.
pub fn is_single_token(name: &str) -> bool {
    !name.trim().chars().any(char::is_whitespace)
}

pub fn is_visitor_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty() || trimmed == VISITOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("Online".parse::<PresenceStatus>().unwrap(), PresenceStatus::Online);
        assert_eq!(PresenceStatus::Invisible.to_string(), "invisible");
        assert!("away".parse::<PresenceStatus>().is_err());
    }

    #[test]
    fn test_invisible_is_public_offline() {
        assert_eq!(PresenceStatus::Invisible.public(), PresenceStatus::Offline);
        assert_eq!(PresenceStatus::Online.public(), PresenceStatus::Online);
    }

    #[test]
    fn test_peer_normalizes_username() {
        let peer = Peer::new("127.0.0.1:9001".parse().unwrap(), "  ", PresenceStatus::Online);
        assert_eq!(peer.username, VISITOR);
        assert_eq!(peer.addr().port(), 9001);
    }

    #[test]
    fn test_single_token_names() {
        assert!(is_single_token(" alice "));
        assert!(is_single_token(""));
        assert!(!is_single_token("bob smith"));
        assert!(!is_single_token("bob\tsmith"));
    }

    #[test]
    fn test_message_status_defaults_to_received() {
        assert_eq!(MessageStatus::default(), MessageStatus::Received);
    }
}
