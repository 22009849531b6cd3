use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::NodeClock;
use crate::cluster::{Cluster, ClusterEvent};
use crate::error::{MutexError, Result};
use crate::protocol::timer::random_interval;
use crate::protocol::{Message, MessageKind, NodeId, ReleaseOutcome, RequestOutcome};

/// A participant in the mutual-exclusion protocol.
///
/// A node keeps no record of its own pending request: being queued at the
/// coordinator is the only trace. Coordinator duties run on whichever node
/// the cluster currently lists as coordinator.
pub struct Node {
    pub id: NodeId,
    cluster: Arc<Cluster>,
    clock: NodeClock,
    inbox_tx: mpsc::UnboundedSender<Message>,
}

impl Node {
    pub fn new(
        id: NodeId,
        cluster: Arc<Cluster>,
        clock: NodeClock,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let node = Self {
            id,
            cluster,
            clock,
            inbox_tx,
        };

        (node, inbox_rx)
    }

    /// Sender half of this node's inbox
    pub fn message_sender(&self) -> mpsc::UnboundedSender<Message> {
        self.inbox_tx.clone()
    }

    pub fn clock(&self) -> &NodeClock {
        &self.clock
    }

    /// Event loop: one event at a time from the stop token, the inbox or the
    /// resource-request timer.
    ///
    /// A GRANT is served to completion inside the loop, so messages and timer
    /// fires that arrive meanwhile wait their turn.
    pub async fn run(&self, mut inbox: mpsc::UnboundedReceiver<Message>, stop: CancellationToken) {
        let config = self.cluster.config();
        let next_request = || {
            Instant::now()
                + random_interval(config.request_interval_min_ms, config.request_interval_max_ms)
        };

        let timer = tokio::time::sleep_until(next_request());
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    tracing::debug!(node_id = self.id, "Node stopped");
                    break;
                }

                Some(msg) = inbox.recv() => {
                    self.handle_message(msg).await;
                }

                _ = &mut timer => {
                    if let Err(e) = self.request_resource().await {
                        tracing::info!(node_id = self.id, error = %e, "Resource request dropped");
                    }
                    timer.as_mut().reset(next_request());
                }
            }
        }
    }

    /// Ask the current coordinator for the resource.
    ///
    /// Fails with `NoCoordinator` while the role is vacant; the caller is
    /// expected to retry on its next timer fire.
    pub async fn request_resource(&self) -> Result<()> {
        let msg = Message::request(self.id, self.clock.now());
        let coordinator = self.cluster.send_to_coordinator(msg).await?;

        tracing::info!(node_id = self.id, coordinator, "Requested resource");
        self.cluster.emit(ClusterEvent::Requested {
            node_id: self.id,
            coordinator,
        });
        Ok(())
    }

    pub async fn handle_message(&self, msg: Message) {
        tracing::trace!(node_id = self.id, kind = %msg.kind(), from = msg.sender_id(), "Message received");

        match msg.kind() {
            MessageKind::Request => self.on_request(msg.sender_id()).await,
            MessageKind::Grant => {
                tracing::info!(
                    node_id = self.id,
                    coordinator = msg.sender_id(),
                    "Received permission to access the resource"
                );
                self.access_resource().await;
            }
            MessageKind::Release => self.on_release(msg.sender_id()).await,
        }
    }

    async fn on_request(&self, requester: NodeId) {
        match self.cluster.enqueue_request(self.id, requester).await {
            Ok(RequestOutcome::Grant(node_id)) => {
                tracing::debug!(coordinator = self.id, node_id, "Queue was empty");
                self.grant(node_id).await;
            }
            Ok(RequestOutcome::Queued { position }) => {
                tracing::debug!(coordinator = self.id, node_id = requester, position, "Request queued");
            }
            Ok(RequestOutcome::Duplicate) => {
                tracing::warn!(coordinator = self.id, node_id = requester, "Duplicate request ignored");
            }
            Err(e) => {
                tracing::warn!(node_id = self.id, from = requester, error = %e, "Ignoring REQUEST");
            }
        }
    }

    async fn on_release(&self, releaser: NodeId) {
        match self.cluster.release_request(self.id, releaser).await {
            Ok(ReleaseOutcome::Grant(next)) => self.grant(next).await,
            Ok(ReleaseOutcome::Idle) => {
                tracing::debug!(coordinator = self.id, node_id = releaser, "Queue drained");
            }
            Ok(ReleaseOutcome::Stale { head }) => {
                tracing::warn!(
                    coordinator = self.id,
                    node_id = releaser,
                    head = ?head,
                    "Release from a node this coordinator never granted, ignored"
                );
                self.cluster.emit(ClusterEvent::ReleaseIgnored {
                    coordinator: self.id,
                    node_id: releaser,
                });
            }
            Err(e) => {
                tracing::warn!(node_id = self.id, from = releaser, error = %e, "Ignoring RELEASE");
            }
        }
    }

    /// Send GRANT to the queue head. A head that has left the cluster is
    /// retired as if it had released, and the next waiter is tried.
    async fn grant(&self, mut target: NodeId) {
        loop {
            let msg = Message::grant(self.id, self.clock.now());
            match self.cluster.send_to(target, msg).await {
                Ok(()) => {
                    tracing::info!(coordinator = self.id, node_id = target, "Granting access");
                    self.cluster.emit(ClusterEvent::Granted {
                        coordinator: self.id,
                        node_id: target,
                    });
                    return;
                }
                Err(e) => {
                    tracing::warn!(coordinator = self.id, node_id = target, error = %e, "GRANT not delivered");
                    self.cluster.emit(ClusterEvent::RoutingFailed {
                        from: self.id,
                        to: target,
                        kind: MessageKind::Grant,
                    });
                }
            }

            match self.cluster.release_request(self.id, target).await {
                Ok(ReleaseOutcome::Grant(next)) => target = next,
                _ => return,
            }
        }
    }

    /// Critical section: hold the shared resource for a bounded time, then
    /// report RELEASE to the coordinator in office at that moment.
    pub async fn access_resource(&self) {
        let config = self.cluster.config();
        let hold = random_interval(config.hold_min_ms, config.hold_max_ms);

        {
            let _guard = self.cluster.resource().acquire(self.id).await;
            tracing::info!(node_id = self.id, hold_ms = hold.as_millis() as u64, "Accessing the resource");
            self.cluster.emit(ClusterEvent::Entered { node_id: self.id });

            tokio::time::sleep(hold).await;

            self.cluster.emit(ClusterEvent::Exited { node_id: self.id });
        }
        tracing::info!(node_id = self.id, "Releasing the resource");

        let msg = Message::release(self.id, self.clock.now());
        match self.cluster.send_to_coordinator(msg).await {
            Ok(coordinator) => {
                self.cluster.emit(ClusterEvent::Released {
                    node_id: self.id,
                    coordinator,
                });
            }
            Err(MutexError::NoCoordinator) => {
                tracing::warn!(node_id = self.id, "No coordinator to notify of release");
            }
            Err(e) => {
                tracing::warn!(node_id = self.id, error = %e, "RELEASE not delivered");
                if let MutexError::NodeNotFound(to) = &e {
                    self.cluster.emit(ClusterEvent::RoutingFailed {
                        from: self.id,
                        to: *to,
                        kind: MessageKind::Release,
                    });
                }
            }
        }
    }
}
