//! Cluster membership, coordinator election and message routing.
//!
//! The [`Cluster`] owns everything nodes share:
//! - the registry of live nodes (`NodeId` to handle)
//! - the coordinator slot, holding the [`CoordinatorRole`] and its queue
//! - the [`SharedResource`] guarded by the protocol
//!
//! Registry and coordinator slot sit behind a single `RwLock`. Nodes never
//! touch them directly; they go through the accessors here, which resolve
//! the coordinator at call time.
//!
//! # Fault injection
//!
//! [`Cluster::depose_coordinator`] simulates a coordinator crash: the node is
//! stopped and removed, its queue discarded, and a survivor picked uniformly
//! at random takes over with an empty queue. Periodic growth, coordinator
//! kills and clock synchronization run as tickers started by
//! [`Cluster::start`]; tests usually call the operations directly instead.

pub mod events;
pub mod identity;
pub mod resource;
pub mod ticker;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rand::seq::IteratorRandom;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{berkeley_adjustments, ClockAdjustment, NodeClock};
use crate::config::ClusterConfig;
use crate::error::{MutexError, Result};
use crate::node::Node;
use crate::protocol::{
    CoordinatorRole, CoordinatorState, Message, NodeId, ReleaseOutcome, RequestOutcome,
};

pub use events::ClusterEvent;
pub use identity::{IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use resource::{ResourceStats, SharedResource};

const EVENT_CAPACITY: usize = 1024;

/// Registry entry for a live node
struct NodeHandle {
    node: Arc<Node>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ClusterState {
    nodes: HashMap<NodeId, NodeHandle>,
    coordinator: Option<CoordinatorRole>,
}

/// Outcome of a coordinator failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deposition {
    pub deposed: NodeId,
    pub successor: Option<NodeId>,
    /// Requesters that were waiting in the discarded queue
    pub discarded: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberSnapshot {
    pub node_id: NodeId,
    pub is_coordinator: bool,
    pub clock_offset_ms: i64,
}

/// Point-in-time view of the cluster
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub coordinator: Option<NodeId>,
    pub coordinator_state: Option<CoordinatorState>,
    pub queue: Vec<NodeId>,
    pub members: Vec<MemberSnapshot>,
    pub resource: ResourceStats,
}

pub struct Cluster {
    config: ClusterConfig,
    state: RwLock<ClusterState>,
    resource: SharedResource,
    ids: Box<dyn IdGenerator>,
    events: broadcast::Sender<ClusterEvent>,
    shutdown: CancellationToken,
    tickers: Mutex<Vec<JoinHandle<()>>>,
}

impl Cluster {
    /// Create an empty cluster drawing random identities.
    pub fn new(config: ClusterConfig) -> Result<Arc<Self>> {
        let ids = RandomIdGenerator::new(config.max_node_id);
        Self::with_id_generator(config, Box::new(ids))
    }

    pub fn with_id_generator(
        config: ClusterConfig,
        ids: Box<dyn IdGenerator>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Arc::new(Self {
            config,
            state: RwLock::new(ClusterState::default()),
            resource: SharedResource::new(),
            ids,
            events,
            shutdown: CancellationToken::new(),
            tickers: Mutex::new(Vec::new()),
        }))
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn resource(&self) -> &SharedResource {
        &self.resource
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ClusterEvent) {
        let _ = self.events.send(event);
    }

    /// Create the initial nodes and start the growth, coordinator-kill and
    /// clock-sync tickers.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        for _ in 0..self.config.initial_nodes {
            self.create_node().await?;
        }

        let mut tickers = Vec::with_capacity(3);

        let cluster = Arc::clone(self);
        tickers.push(ticker::spawn_periodic(
            "growth",
            Duration::from_millis(self.config.growth_interval_ms),
            self.shutdown.clone(),
            move || {
                let cluster = cluster.clone();
                async move {
                    if let Err(e) = cluster.create_node().await {
                        tracing::warn!(error = %e, "Failed to grow cluster");
                    }
                }
            },
        ));

        let cluster = Arc::clone(self);
        tickers.push(ticker::spawn_periodic(
            "coordinator-kill",
            Duration::from_millis(self.config.kill_interval_ms),
            self.shutdown.clone(),
            move || {
                let cluster = cluster.clone();
                async move {
                    cluster.depose_coordinator().await;
                }
            },
        ));

        let cluster = Arc::clone(self);
        tickers.push(ticker::spawn_periodic(
            "clock-sync",
            Duration::from_millis(self.config.clock.sync_interval_ms),
            self.shutdown.clone(),
            move || {
                let cluster = cluster.clone();
                async move {
                    cluster.sync_clocks().await;
                }
            },
        ));

        self.register_tickers(tickers);
        Ok(())
    }

    fn register_tickers(&self, handles: Vec<JoinHandle<()>>) {
        match self.tickers.lock() {
            Ok(mut tickers) => tickers.extend(handles),
            Err(poisoned) => poisoned.into_inner().extend(handles),
        }
    }

    /// Register a node under a fresh identity and start its event loop.
    ///
    /// The first node of an empty cluster (including one emptied by a
    /// coordinator failure) becomes coordinator.
    pub async fn create_node(self: &Arc<Self>) -> Result<NodeId> {
        if self.shutdown.is_cancelled() {
            return Err(MutexError::ShuttingDown);
        }
        let mut state = self.state.write().await;
        // shutdown may have drained the registry while we waited for the lock
        if self.shutdown.is_cancelled() {
            return Err(MutexError::ShuttingDown);
        }

        let existing: HashSet<NodeId> = state.nodes.keys().copied().collect();
        let node_id = self.ids.next_id(&existing)?;

        let clock = NodeClock::with_random_skew(self.config.clock.max_initial_skew_ms);
        let (node, inbox) = Node::new(node_id, Arc::clone(self), clock);
        let node = Arc::new(node);
        let stop = self.shutdown.child_token();

        let task = tokio::spawn({
            let node = node.clone();
            let stop = stop.clone();
            async move {
                node.run(inbox, stop).await;
            }
        });

        state.nodes.insert(node_id, NodeHandle { node, stop, task });
        tracing::info!(node_id, members = state.nodes.len(), "Node created");
        self.emit(ClusterEvent::NodeCreated { node_id });

        if state.coordinator.is_none() {
            state.coordinator = Some(CoordinatorRole::new(node_id));
            tracing::info!(node_id, "Node is the coordinator");
            self.emit(ClusterEvent::CoordinatorAssigned { node_id });
        }

        Ok(node_id)
    }

    /// Kill the current coordinator and elect a random survivor.
    ///
    /// Returns `None` when there is no coordinator. The old queue is
    /// discarded; its waiters have to request again.
    pub async fn depose_coordinator(&self) -> Option<Deposition> {
        let mut state = self.state.write().await;

        let Some(role) = state.coordinator.take() else {
            tracing::debug!("No coordinator to depose");
            return None;
        };
        let deposed = role.node_id();
        let discarded = role.depose();

        if let Some(handle) = state.nodes.remove(&deposed) {
            handle.stop.cancel();
        }
        tracing::info!(node_id = deposed, lost_waiters = ?discarded, "Coordinator killed");

        let successor = state
            .nodes
            .keys()
            .copied()
            .choose(&mut rand::thread_rng());
        if let Some(node_id) = successor {
            state.coordinator = Some(CoordinatorRole::new(node_id));
            tracing::info!(node_id, "Node is the new coordinator");
        } else {
            tracing::info!("Cluster is empty, no coordinator until a node joins");
        }
        drop(state);

        self.emit(ClusterEvent::CoordinatorDeposed {
            node_id: deposed,
            successor,
            discarded: discarded.clone(),
        });
        if let Some(node_id) = successor {
            self.emit(ClusterEvent::CoordinatorAssigned { node_id });
        }

        Some(Deposition {
            deposed,
            successor,
            discarded,
        })
    }

    /// Deliver a message to a specific node's inbox.
    pub async fn send_to(&self, target: NodeId, msg: Message) -> Result<()> {
        let node = {
            let state = self.state.read().await;
            state.nodes.get(&target).map(|h| h.node.clone())
        };
        let node = node.ok_or(MutexError::NodeNotFound(target))?;
        node.message_sender()
            .send(msg)
            .map_err(|_| MutexError::NodeNotFound(target))
    }

    /// Deliver a message to whoever is coordinator right now.
    ///
    /// Returns the coordinator it was delivered to.
    pub async fn send_to_coordinator(&self, msg: Message) -> Result<NodeId> {
        let (coordinator, node) = {
            let state = self.state.read().await;
            let coordinator = state
                .coordinator
                .as_ref()
                .map(|role| role.node_id())
                .ok_or(MutexError::NoCoordinator)?;
            (
                coordinator,
                state.nodes.get(&coordinator).map(|h| h.node.clone()),
            )
        };
        let node = node.ok_or(MutexError::NodeNotFound(coordinator))?;
        node.message_sender()
            .send(msg)
            .map_err(|_| MutexError::NodeNotFound(coordinator))?;
        Ok(coordinator)
    }

    /// Run a REQUEST through the queue, provided `coordinator` still holds
    /// the role.
    pub async fn enqueue_request(
        &self,
        coordinator: NodeId,
        requester: NodeId,
    ) -> Result<RequestOutcome> {
        let mut state = self.state.write().await;
        let role = Self::role_held_by(&mut state, coordinator)?;
        let outcome = role.on_request(requester);
        tracing::trace!(coordinator, node_id = requester, state = %role.state(), "Queue after REQUEST");

        match outcome {
            RequestOutcome::Grant(_) => self.emit(ClusterEvent::RequestEnqueued {
                coordinator,
                node_id: requester,
                position: 1,
            }),
            RequestOutcome::Queued { position } => self.emit(ClusterEvent::RequestEnqueued {
                coordinator,
                node_id: requester,
                position,
            }),
            RequestOutcome::Duplicate => {}
        }
        Ok(outcome)
    }

    /// Run a RELEASE through the queue, provided `coordinator` still holds
    /// the role.
    pub async fn release_request(
        &self,
        coordinator: NodeId,
        releaser: NodeId,
    ) -> Result<ReleaseOutcome> {
        let mut state = self.state.write().await;
        let role = Self::role_held_by(&mut state, coordinator)?;
        let outcome = role.on_release(releaser);
        tracing::trace!(coordinator, node_id = releaser, state = %role.state(), "Queue after RELEASE");
        Ok(outcome)
    }

    fn role_held_by(state: &mut ClusterState, node_id: NodeId) -> Result<&mut CoordinatorRole> {
        state
            .coordinator
            .as_mut()
            .filter(|role| role.node_id() == node_id)
            .ok_or(MutexError::NotCoordinator(node_id))
    }

    /// One Berkeley round with the coordinator as time master.
    ///
    /// Skipped (empty result) without a coordinator or with a single member.
    pub async fn sync_clocks(&self) -> Vec<ClockAdjustment> {
        let state = self.state.read().await;
        let Some(master) = state.coordinator.as_ref().map(|role| role.node_id()) else {
            return Vec::new();
        };
        if state.nodes.len() < 2 {
            return Vec::new();
        }
        let Some(master_node) = state.nodes.get(&master) else {
            return Vec::new();
        };

        // every clock is read against the same reference instant
        let reference = Utc::now();
        let master_time = master_node.node.clock().read_at(reference);
        let readings: Vec<_> = state
            .nodes
            .iter()
            .map(|(id, h)| (*id, h.node.clock().read_at(reference)))
            .collect();

        let adjustments = berkeley_adjustments((master, master_time), &readings);
        for adj in &adjustments {
            if let Some(handle) = state.nodes.get(&adj.node_id) {
                handle.node.clock().adjust(adj.delta_ms);
            }
        }
        drop(state);

        tracing::info!(master, members = adjustments.len(), "Clock synchronization round");
        for adj in &adjustments {
            tracing::debug!(node_id = adj.node_id, delta_ms = adj.delta_ms, "Clock adjusted");
            self.emit(ClusterEvent::ClockAdjusted {
                node_id: adj.node_id,
                delta_ms: adj.delta_ms,
            });
        }
        adjustments
    }

    pub async fn coordinator_id(&self) -> Option<NodeId> {
        self.state
            .read()
            .await
            .coordinator
            .as_ref()
            .map(|role| role.node_id())
    }

    /// Pending requesters of the current coordinator, head first
    pub async fn queue_snapshot(&self) -> Vec<NodeId> {
        self.state
            .read()
            .await
            .coordinator
            .as_ref()
            .map(|role| role.queue().to_vec())
            .unwrap_or_default()
    }

    /// Live node identities, ascending
    pub async fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.state.read().await.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn node(&self, node_id: NodeId) -> Option<Arc<Node>> {
        self.state
            .read()
            .await
            .nodes
            .get(&node_id)
            .map(|h| h.node.clone())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.nodes.is_empty()
    }

    pub async fn snapshot(&self) -> ClusterSnapshot {
        let state = self.state.read().await;
        let coordinator = state.coordinator.as_ref().map(|role| role.node_id());

        let mut members: Vec<MemberSnapshot> = state
            .nodes
            .iter()
            .map(|(id, h)| MemberSnapshot {
                node_id: *id,
                is_coordinator: coordinator == Some(*id),
                clock_offset_ms: h.node.clock().offset_ms(),
            })
            .collect();
        members.sort_by_key(|m| m.node_id);

        ClusterSnapshot {
            coordinator,
            coordinator_state: state.coordinator.as_ref().map(|role| role.state()),
            queue: state
                .coordinator
                .as_ref()
                .map(|role| role.queue().to_vec())
                .unwrap_or_default(),
            members,
            resource: self.resource.stats(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop every ticker and node, then wait for their tasks.
    ///
    /// A node inside its critical section finishes it before stopping.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let tickers: Vec<JoinHandle<()>> = match self.tickers.lock() {
            Ok(mut tickers) => tickers.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };

        let nodes: Vec<NodeHandle> = {
            let mut state = self.state.write().await;
            state.coordinator = None;
            state.nodes.drain().map(|(_, handle)| handle).collect()
        };

        for handle in tickers {
            let _ = handle.await;
        }
        for handle in nodes {
            handle.stop.cancel();
            if let Err(e) = handle.task.await {
                tracing::warn!(node_id = handle.node.id, error = %e, "Node task ended abnormally");
            }
        }
        tracing::info!("Cluster shut down");
    }
}
