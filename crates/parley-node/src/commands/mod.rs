//! Command handlers, grouped by domain.
//!
//! Every handler takes the control loop's [`Node`](crate::node::Node) and
//! returns a [`CommandResult`](crate::command::CommandResult) or a
//! [`NodeError`](crate::error::NodeError) that is reported back as an error
//! result. None of them stop the loop.

pub mod channels;
pub mod messaging;
pub mod network;
pub mod session;
