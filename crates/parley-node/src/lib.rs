//! # parley-node
//!
//! A chat node: local replicas of the channels it takes part in, an inbound
//! listener for peer events, a reconciliation engine that catches up with
//! hosts and the tracker, and a control loop driven by text commands.

pub mod command;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod inbound;
pub mod node;
pub mod reconcile;
pub mod session;

pub use command::{Command, CommandResult, CommandStatus};
pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{spawn_node, NodeHandle};
pub use reconcile::{ReconcileEngine, ReconcileReport};
