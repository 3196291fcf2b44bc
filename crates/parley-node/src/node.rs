//! The node control loop.
//!
//! Commands from the front-end, the heartbeat and the reconciliation timer are
//! all handled by one task, one at a time. Inbound peer traffic is served by
//! the listener's own tasks and only meets the loop through the shared
//! [`NodeContext`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use parley_net::{spawn_listener, PeerSender, TrackerClient};
use parley_shared::{MessageStatus, Peer};
use parley_store::LocalStore;

use crate::command::{Command, CommandResult};
use crate::commands;
use crate::config::NodeConfig;
use crate::context::NodeContext;
use crate::error::NodeError;
use crate::inbound::NodeInbound;
use crate::reconcile::ReconcileEngine;

const COMMAND_QUEUE: usize = 64;

type Request = (String, oneshot::Sender<CommandResult>);

/// Front-end access to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<Request>,
    store: Arc<LocalStore>,
    listen_addr: SocketAddr,
    advertise_addr: SocketAddr,
}

impl NodeHandle {
    /// Submit one command line and wait for its result.
    pub async fn execute(&self, line: &str) -> CommandResult {
        let (tx, rx) = oneshot::channel();
        if self.commands.send((line.to_string(), tx)).await.is_err() {
            return NodeError::Stopped.into();
        }
        rx.await.unwrap_or_else(|_| NodeError::Stopped.into())
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn advertise_addr(&self) -> SocketAddr {
        self.advertise_addr
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// State owned by the control loop.
pub struct Node {
    pub(crate) ctx: NodeContext,
    pub(crate) engine: ReconcileEngine,
    advertise: SocketAddr,
}

impl Node {
    /// Announce this node's address, current name and presence.
    pub(crate) async fn register(&self, get_peers: bool) -> Result<Option<Vec<Peer>>, NodeError> {
        let peers = self
            .ctx
            .tracker
            .register(
                self.advertise,
                &self.ctx.session.username(),
                self.ctx.session.status(),
                get_peers,
            )
            .await?;
        if let Some(peers) = &peers {
            self.ctx.remember_peers(peers.clone());
        }
        Ok(peers)
    }

    /// Move `user`'s offline queue into the channels as `pending`. The queue
    /// is cleared only after every message is stored.
    pub(crate) fn drain_offline_queue(&self, user: &str) -> Result<usize, NodeError> {
        let store = &self.ctx.store;
        let queued = store.offline_queue(user)?;
        if queued.is_empty() {
            return Ok(0);
        }

        let mut merged = 0;
        for message in queued {
            let name = message.channel.clone();
            store.ensure_shell(&name, None)?;
            let added = store
                .update(&name, |c| {
                    c.merge_message(message.with_status(MessageStatus::Pending))
                })?
                .unwrap_or(false);
            if added {
                merged += 1;
            }
        }
        store.take_offline_queue(user)?;
        info!(user, merged, "offline queue drained");
        Ok(merged)
    }

    async fn dispatch(&self, command: Command) -> Result<CommandResult, NodeError> {
        match command {
            Command::Login(name) => commands::session::login(self, &name).await,
            Command::Logout => commands::session::logout(self).await,
            Command::SetStatus(status) => commands::session::set_status(self, status).await,
            Command::List => commands::network::list(self).await,
            Command::CheckStatus(user) => commands::network::check_status(self, &user).await,
            Command::Help => Ok(commands::network::help()),
            Command::Debug => commands::network::debug(self).await,
            Command::Exit => commands::network::exit(self).await,
            Command::ListAll => commands::channels::list_all(self).await,
            Command::Channels => Ok(commands::channels::channels(self)),
            Command::Join(name) => commands::channels::join(self, &name).await,
            Command::Leave(name) => commands::channels::leave(self, &name).await,
            Command::Create(name) => commands::channels::create(self, &name).await,
            Command::History(name) => commands::channels::history(self, &name).await,
            Command::Send { channel, text } => {
                commands::messaging::send(self, &channel, &text).await
            }
            Command::Sync => commands::messaging::sync(self).await,
        }
    }

    /// Run one command line. The flag tells the loop to stop.
    async fn handle_line(&self, line: &str) -> (CommandResult, bool) {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => return (e.into(), false),
        };
        let stop = command == Command::Exit;
        debug!(?command, "command");
        let result = self.dispatch(command).await.unwrap_or_else(CommandResult::from);
        (result, stop)
    }
}

/// Open the store, bind the listener, register with the tracker and start
/// the control loop.
pub async fn spawn_node(config: NodeConfig) -> Result<(NodeHandle, JoinHandle<()>), NodeError> {
    let store = Arc::new(LocalStore::open(&config.db_path())?);
    let ctx = NodeContext::new(
        Arc::clone(&store),
        TrackerClient::new(config.tracker_addr, config.net_timeout),
        PeerSender::new(config.net_timeout),
        config.history_wait,
    );

    let inbound = Arc::new(NodeInbound::new(ctx.clone()));
    let (listen_addr, listener) = spawn_listener(config.listen_addr, inbound).await?;
    let advertise = SocketAddr::new(config.advertise_ip, listen_addr.port());
    ctx.set_advertise(advertise);

    let node = Node {
        engine: ReconcileEngine::new(ctx.clone()),
        ctx,
        advertise,
    };

    let tracker_reachable = match node.register(false).await {
        Ok(_) => true,
        Err(e) => {
            warn!(tracker = %config.tracker_addr, error = %e, "tracker unreachable at startup");
            false
        }
    };

    if let Some(name) = config.username.as_deref() {
        let (result, _) = node.handle_line(&format!("login:{name}")).await;
        info!(user = name, ok = result.is_ok(), "{}", result.message);
    }

    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let task = tokio::spawn(run(
        node,
        rx,
        listener,
        tracker_reachable,
        config.heartbeat_interval,
        config.reconcile_interval,
    ));

    info!(listen = %listen_addr, advertise = %advertise, "node started");
    Ok((
        NodeHandle {
            commands: tx,
            store,
            listen_addr,
            advertise_addr: advertise,
        },
        task,
    ))
}

async fn run(
    node: Node,
    mut commands: mpsc::Receiver<Request>,
    listener: JoinHandle<()>,
    mut tracker_reachable: bool,
    heartbeat_every: Duration,
    reconcile_every: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reconcile = tokio::time::interval(reconcile_every);
    reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Both fire immediately; startup already registered.
    heartbeat.tick().await;
    reconcile.tick().await;

    loop {
        tokio::select! {
            next = commands.recv() => {
                let Some((line, reply)) = next else {
                    break;
                };
                let (result, stop) = node.handle_line(&line).await;
                let _ = reply.send(result);
                if stop {
                    break;
                }
            }

            _ = heartbeat.tick() => {
                // Offline users are not announced, only the tracker is watched.
                let reachable = if node.ctx.session.is_offline() {
                    node.ctx.tracker.is_reachable().await
                } else {
                    match node.register(false).await {
                        Ok(_) => true,
                        Err(e) => {
                            debug!(error = %e, "heartbeat failed");
                            false
                        }
                    }
                };
                match (tracker_reachable, reachable) {
                    (false, true) => {
                        info!("tracker reachable again, reconciling");
                        node.engine.run_all().await;
                    }
                    (true, false) => warn!("tracker unreachable"),
                    _ => {}
                }
                tracker_reachable = reachable;
            }

            _ = reconcile.tick() => {
                if node.ctx.session.is_authenticated() && !node.ctx.session.is_offline() {
                    node.engine.run_all().await;
                }
            }
        }
    }

    listener.abort();
    info!("node stopped");
}
