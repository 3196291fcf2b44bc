//! TCP plumbing shared by nodes and the tracker: newline framing, the typed
//! tracker client, one-shot peer delivery and the inbound event listener.

pub mod error;
pub mod framing;
pub mod listener;
pub mod sender;
pub mod tracker_client;

pub use error::NetError;
pub use framing::{connect, request_line, send_line, LineStream};
pub use listener::{spawn_listener, InboundHandler};
pub use sender::PeerSender;
pub use tracker_client::TrackerClient;
