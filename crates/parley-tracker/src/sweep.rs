//! Periodic liveness sweep over the peer registry.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::probe::is_reachable;
use crate::registry::PeerRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub reachable: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    pub liveness_timeout: Duration,
    pub evict_after: Duration,
    pub probe_timeout: Duration,
}

/// Probe stale peers concurrently, then evict long-gone ones. The registry
/// lock is not held while probes are in flight.
pub async fn sweep_once(
    registry: &PeerRegistry,
    settings: SweepSettings,
    now: DateTime<Utc>,
) -> SweepReport {
    let stale = registry.stale(now, settings.liveness_timeout).await;

    let probes = stale.iter().map(|addr| async move {
        (*addr, is_reachable(*addr, settings.probe_timeout).await)
    });
    let results = join_all(probes).await;

    let mut report = SweepReport {
        probed: results.len(),
        ..SweepReport::default()
    };
    for (addr, reachable) in results {
        if reachable {
            report.reachable += 1;
        }
        registry.record_probe(addr, reachable, Utc::now()).await;
    }

    report.evicted = registry.evict(now, settings.evict_after).await.len();
    report
}

pub fn spawn_sweeper(
    registry: PeerRegistry,
    interval: Duration,
    settings: SweepSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = sweep_once(&registry, settings, Utc::now()).await;
            if report.probed > 0 || report.evicted > 0 {
                info!(
                    probed = report.probed,
                    reachable = report.reachable,
                    evicted = report.evicted,
                    "liveness sweep"
                );
            } else {
                debug!("liveness sweep: nothing stale");
            }
        }
    })
}
