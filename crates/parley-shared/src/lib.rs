//! # parley-shared
//!
//! Types shared by the tracker and the nodes: the channel/message model with
//! its merge rules, peer presence, and the two line-oriented wire protocols
//! (node ↔ tracker and node ↔ node).

pub mod channel;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use channel::{Channel, ChannelSummary, Message, MessageKey};
pub use error::ProtocolError;
pub use protocol::{ChannelSync, NodeEvent, TrackerReply, TrackerRequest};
pub use types::{MessageStatus, Peer, PresenceStatus};
