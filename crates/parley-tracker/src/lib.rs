//! # parley-tracker
//!
//! The peer directory service: a registry of node addresses and presence, a
//! backup store for channel data, and a periodic liveness sweep.

pub mod channels;
pub mod config;
pub mod error;
pub mod probe;
pub mod registry;
pub mod server;
pub mod sweep;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

pub use channels::{ChannelDirectory, SyncOutcome};
pub use config::TrackerConfig;
pub use error::TrackerError;
pub use registry::PeerRegistry;
pub use server::TrackerState;

use crate::sweep::SweepSettings;

/// A running tracker. Dropping the handle leaves the tasks running; call
/// [`TrackerHandle::shutdown`] to stop them.
pub struct TrackerHandle {
    pub local_addr: SocketAddr,
    pub state: TrackerState,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackerHandle {
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Bind the listener and start the accept loop and the sweeper.
pub async fn start(
    config: &TrackerConfig,
    channels: ChannelDirectory,
) -> Result<TrackerHandle, TrackerError> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    let local_addr = listener.local_addr()?;
    let state = TrackerState::new(channels, config.probe_timeout);

    let sweeper = sweep::spawn_sweeper(
        state.registry.clone(),
        config.sweep_interval,
        SweepSettings {
            liveness_timeout: config.liveness_timeout,
            evict_after: config.evict_after,
            probe_timeout: config.probe_timeout,
        },
    );
    let server = tokio::spawn(server::serve(listener, state.clone()));

    info!(addr = %local_addr, "tracker listening");
    Ok(TrackerHandle {
        local_addr,
        state,
        tasks: vec![server, sweeper],
    })
}
