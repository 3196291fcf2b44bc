//! Line-oriented wire protocols.
//!
//! Node ↔ tracker traffic is a keyword followed by arguments or a JSON
//! payload. Node ↔ node traffic is one JSON object per line, tagged by `type`.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, Message};
use crate::error::ProtocolError;
use crate::types::{is_single_token, normalize_username, MessageStatus, PresenceStatus};

// ---------------------------------------------------------------------------
// Node -> tracker
// ---------------------------------------------------------------------------

/// Channel snapshot pushed to the tracker, tagged with who pushed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSync {
    #[serde(flatten)]
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
}

impl ChannelSync {
    pub fn new(channel: Channel, submitter: &str) -> Self {
        Self {
            channel,
            submitter: Some(submitter.to_string()),
        }
    }

    /// Who the tracker should treat as the author of this push.
    pub fn effective_submitter(&self) -> Option<&str> {
        self.submitter.as_deref().or(self.channel.host.as_deref())
    }
}

/// Operator view of one tracked channel, answered to `debug`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelDebug {
    pub name: String,
    pub host: Option<String>,
    pub members: Vec<String>,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerRequest {
    SendInfo {
        ip: IpAddr,
        port: u16,
        username: String,
        status: PresenceStatus,
        get_peers: bool,
    },
    GetList,
    Ping,
    CheckStatus(String),
    SyncChannel(ChannelSync),
    GetChannel(String),
    ListChannels,
    Debug,
}

impl TrackerRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (line, ""),
        };

        match keyword {
            "send_info" => {
                let mut args = rest.split_whitespace();
                let ip = args.next().ok_or(ProtocolError::MissingArgument("ip"))?;
                let ip: IpAddr = ip
                    .parse()
                    .map_err(|_| ProtocolError::InvalidAddress(ip.to_string()))?;
                let port = args.next().ok_or(ProtocolError::MissingArgument("port"))?;
                let port: u16 = port
                    .parse()
                    .map_err(|_| ProtocolError::InvalidPort(port.to_string()))?;
                let username = args
                    .next()
                    .ok_or(ProtocolError::MissingArgument("username"))?;
                let status = args
                    .next()
                    .ok_or(ProtocolError::MissingArgument("status"))?
                    .parse()?;
                let get_peers = args.next() == Some("get_peers");
                Ok(Self::SendInfo {
                    ip,
                    port,
                    username: normalize_username(username),
                    status,
                    get_peers,
                })
            }
            "get_list" => Ok(Self::GetList),
            "ping" => Ok(Self::Ping),
            "check_status" => {
                if rest.is_empty() {
                    return Err(ProtocolError::MissingArgument("username"));
                }
                Ok(Self::CheckStatus(rest.to_string()))
            }
            "sync_channel" => {
                if rest.is_empty() {
                    return Err(ProtocolError::MissingArgument("snapshot"));
                }
                Ok(Self::SyncChannel(serde_json::from_str(rest)?))
            }
            "get_channel" => {
                if rest.is_empty() {
                    return Err(ProtocolError::MissingArgument("channel"));
                }
                Ok(Self::GetChannel(rest.to_string()))
            }
            "list_channels" => Ok(Self::ListChannels),
            "debug" => Ok(Self::Debug),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    pub fn to_line(&self) -> Result<String, ProtocolError> {
        if let Self::SendInfo { username: user, .. } | Self::CheckStatus(user) = self {
            if !is_single_token(user) {
                return Err(ProtocolError::InvalidUsername(user.clone()));
            }
        }
        Ok(match self {
            Self::SendInfo {
                ip,
                port,
                username,
                status,
                get_peers,
            } => {
                let mut line = format!(
                    "send_info {ip} {port} {} {status}",
                    normalize_username(username)
                );
                if *get_peers {
                    line.push_str(" get_peers");
                }
                line
            }
            Self::GetList => "get_list".into(),
            Self::Ping => "ping".into(),
            Self::CheckStatus(user) => format!("check_status {user}"),
            Self::SyncChannel(sync) => format!("sync_channel {}", serde_json::to_string(sync)?),
            Self::GetChannel(name) => format!("get_channel {name}"),
            Self::ListChannels => "list_channels".into(),
            Self::Debug => "debug".into(),
        })
    }
}

/// Any tracker response line. JSON bodies are kept raw; the caller knows
/// which request it made and decodes accordingly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerReply {
    Ok(Option<String>),
    Pong,
    Status(PresenceStatus),
    Json(String),
    Error(String),
}

impl TrackerReply {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        if line == "pong" {
            return Ok(Self::Pong);
        }
        if line == "OK" {
            return Ok(Self::Ok(None));
        }
        if let Some(body) = line.strip_prefix("OK ") {
            return Ok(Self::Ok(Some(body.trim().to_string())));
        }
        if let Some(status) = line.strip_prefix("STATUS:") {
            return Ok(Self::Status(status.parse()?));
        }
        if let Some(reason) = line.strip_prefix("ERROR:") {
            return Ok(Self::Error(reason.trim().to_string()));
        }
        Ok(Self::Json(line.to_string()))
    }

    pub fn to_line(&self) -> String {
        match self {
            Self::Ok(None) => "OK".into(),
            Self::Ok(Some(body)) => format!("OK {body}"),
            Self::Pong => "pong".into(),
            Self::Status(status) => format!("STATUS: {status}"),
            Self::Json(body) => body.clone(),
            Self::Error(reason) => format!("ERROR: {reason}"),
        }
    }

    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::Error(reason.to_string())
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Self::Json(serde_json::to_string(value)?))
    }
}

// ---------------------------------------------------------------------------
// Node -> node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    Message {
        channel: String,
        content: String,
        sender: String,
        timestamp: DateTime<Utc>,
    },
    JoinChannel {
        channel: String,
        username: String,
        #[serde(default)]
        as_visitor: bool,
    },
    LeaveChannel {
        channel: String,
        username: String,
    },
    RequestHistory {
        channel: String,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<SocketAddr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    ChannelHistory {
        channel: String,
        #[serde(default)]
        messages: Vec<Message>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        members: Option<BTreeSet<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visitors: Option<BTreeSet<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl NodeEvent {
    pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        Ok(serde_json::from_str(line)?)
    }

    pub fn to_line(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn channel(&self) -> &str {
        match self {
            Self::Message { channel, .. }
            | Self::JoinChannel { channel, .. }
            | Self::LeaveChannel { channel, .. }
            | Self::RequestHistory { channel, .. }
            | Self::ChannelHistory { channel, .. } => channel,
        }
    }

    pub fn message(msg: &Message) -> Self {
        Self::Message {
            channel: msg.channel.clone(),
            content: msg.content.clone(),
            sender: msg.sender.clone(),
            timestamp: msg.timestamp,
        }
    }

    /// A history reply carrying the full channel and its metadata.
    pub fn history_reply(channel: &Channel, request_id: Option<String>) -> Self {
        Self::ChannelHistory {
            channel: channel.name.clone(),
            messages: channel.messages.clone(),
            host: channel.host.clone(),
            members: Some(channel.members.clone()),
            visitors: Some(channel.visitors.clone()),
            request_id,
        }
    }

    /// The carried chat message, as it arrives on the receiving side.
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Message {
                channel,
                content,
                sender,
                timestamp,
            } => Some(Message {
                sender,
                content,
                channel,
                timestamp,
                status: MessageStatus::Received,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_info() {
        let req = TrackerRequest::parse("send_info 10.0.0.2 9001 alice online get_peers").unwrap();
        assert_eq!(
            req,
            TrackerRequest::SendInfo {
                ip: "10.0.0.2".parse().unwrap(),
                port: 9001,
                username: "alice".into(),
                status: PresenceStatus::Online,
                get_peers: true,
            }
        );
        assert_eq!(
            req.to_line().unwrap(),
            "send_info 10.0.0.2 9001 alice online get_peers"
        );
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(matches!(
            TrackerRequest::parse("send_info nope 9001 alice online"),
            Err(ProtocolError::InvalidAddress(_))
        ));
        assert!(matches!(
            TrackerRequest::parse("send_info 127.0.0.1 99999 alice online"),
            Err(ProtocolError::InvalidPort(_))
        ));
        assert!(matches!(
            TrackerRequest::parse("send_info 127.0.0.1 1 alice away"),
            Err(ProtocolError::InvalidStatus(_))
        ));
        assert!(matches!(
            TrackerRequest::parse("frobnicate"),
            Err(ProtocolError::UnknownCommand(_))
        ));
        assert!(matches!(
            TrackerRequest::parse("sync_channel {not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(TrackerRequest::parse("   "), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn test_multi_word_username_not_encoded() {
        let req = TrackerRequest::SendInfo {
            ip: "127.0.0.1".parse().unwrap(),
            port: 9001,
            username: "bob smith".into(),
            status: PresenceStatus::Online,
            get_peers: false,
        };
        assert!(matches!(req.to_line(), Err(ProtocolError::InvalidUsername(_))));
        assert!(matches!(
            TrackerRequest::CheckStatus("bob smith".into()).to_line(),
            Err(ProtocolError::InvalidUsername(_))
        ));
    }

    #[test]
    fn test_sync_channel_submitter_fallback() {
        let line = r#"sync_channel {"name":"general","host":"alice","members":["alice"],"messages":[]}"#;
        let TrackerRequest::SyncChannel(sync) = TrackerRequest::parse(line).unwrap() else {
            panic!("expected sync_channel");
        };
        assert_eq!(sync.submitter, None);
        assert_eq!(sync.effective_submitter(), Some("alice"));

        let sync = ChannelSync::new(Channel::new("general", "alice"), "bob");
        let line = TrackerRequest::SyncChannel(sync.clone()).to_line().unwrap();
        assert!(line.contains(r#""submitter":"bob""#));
        assert_eq!(
            TrackerRequest::parse(&line).unwrap(),
            TrackerRequest::SyncChannel(sync)
        );
    }

    #[test]
    fn test_reply_parse() {
        assert_eq!(TrackerReply::parse("OK").unwrap(), TrackerReply::Ok(None));
        assert_eq!(
            TrackerReply::parse("OK []").unwrap(),
            TrackerReply::Ok(Some("[]".into()))
        );
        assert_eq!(TrackerReply::parse("pong").unwrap(), TrackerReply::Pong);
        assert_eq!(
            TrackerReply::parse("STATUS: offline").unwrap(),
            TrackerReply::Status(PresenceStatus::Offline)
        );
        assert_eq!(
            TrackerReply::parse("ERROR: Unknown user").unwrap(),
            TrackerReply::Error("Unknown user".into())
        );
        assert_eq!(
            TrackerReply::parse(r#"{"name":"x"}"#).unwrap(),
            TrackerReply::Json(r#"{"name":"x"}"#.into())
        );
    }

    #[test]
    fn test_node_event_wire_shape() {
        let event = NodeEvent::JoinChannel {
            channel: "general".into(),
            username: "bob".into(),
            as_visitor: false,
        };
        let line = event.to_line().unwrap();
        assert!(line.contains(r#""type":"join_channel""#));

        let parsed =
            NodeEvent::from_line(r#"{"type":"join_channel","channel":"general","username":"bob"}"#)
                .unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.channel(), "general");
    }

    #[test]
    fn test_message_event_into_received() {
        let msg = Message::compose("general", "alice", "hi");
        let event = NodeEvent::from_line(&NodeEvent::message(&msg).to_line().unwrap()).unwrap();
        let received = event.into_message().unwrap();
        assert_eq!(received.key(), msg.key());
        assert_eq!(received.status, MessageStatus::Received);
    }

    #[test]
    fn test_history_reply_carries_metadata() {
        let mut ch = Channel::new("general", "alice");
        ch.add_visitor("carol");
        ch.merge_message(Message::compose("general", "alice", "hi"));
        let NodeEvent::ChannelHistory {
            messages,
            host,
            members,
            visitors,
            request_id,
            ..
        } = NodeEvent::history_reply(&ch, Some("r1".into()))
        else {
            panic!("expected channel_history");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(host.as_deref(), Some("alice"));
        assert!(members.unwrap().contains("alice"));
        assert!(visitors.unwrap().contains("carol"));
        assert_eq!(request_id.as_deref(), Some("r1"));
    }
}
