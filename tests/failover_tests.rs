//! Coordinator failure and re-election.
//!
//! These tests kill the coordinator while requests are in flight and check
//! that the survivor starts from an empty queue, stale releases are dropped
//! and the resource is never held twice.


use chrono::Utc;
use mutex_lite::cluster::ClusterEvent;
use mutex_lite::protocol::{Message, MessageKind};
use test_harness::{
    assert_sections_never_overlap, cluster_with, quiet_config, record_events, request,
    wait_for_event, wait_for_queue, WAIT,
};

/// Coordinator dies with N2 inside and N3 waiting: the queue is lost, the
/// survivor starts empty, N2's late RELEASE is ignored and N3 gets through
/// after asking again.
#[tokio::test]
async fn test_coordinator_failure_discards_queue() {
    let cluster = cluster_with(quiet_config(400), 3).await;
    let mut rx = cluster.subscribe();

    request(&cluster, 2).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::Entered { node_id: 2 })
    })
    .await
    .expect("node 2 should enter");

    request(&cluster, 3).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            ClusterEvent::RequestEnqueued {
                node_id: 3,
                position: 2,
                ..
            }
        )
    })
    .await
    .expect("node 3 should queue behind node 2");

    let deposition = cluster
        .depose_coordinator()
        .await
        .expect("coordinator should be deposed");
    assert_eq!(deposition.deposed, 1);
    assert_eq!(deposition.discarded, vec![2, 3]);
    let successor = deposition.successor.expect("a survivor should take over");
    assert!(successor == 2 || successor == 3);

    assert_eq!(cluster.coordinator_id().await, Some(successor));
    assert!(cluster.queue_snapshot().await.is_empty());
    assert_eq!(cluster.node_ids().await, vec![2, 3]);

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::ReleaseIgnored { node_id: 2, .. })
    })
    .await
    .expect("the new coordinator should ignore node 2's release");
    assert!(cluster.queue_snapshot().await.is_empty());

    request(&cluster, 3).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::Granted { node_id: 3, .. })
    })
    .await
    .expect("node 3 should be granted after requesting again");

    assert!(wait_for_queue(&cluster, &[], WAIT).await);
    assert_eq!(cluster.resource().stats().max_concurrent_holders, 1);

    cluster.shutdown().await;
}

/// Deposing an empty cluster is a no-op.
#[tokio::test]
async fn test_depose_without_coordinator_returns_none() {
    let cluster = cluster_with(quiet_config(50), 0).await;

    assert!(cluster.depose_coordinator().await.is_none());
    assert!(cluster.is_empty().await);

    cluster.shutdown().await;
}

/// With one survivor there is only one possible successor.
#[tokio::test]
async fn test_last_survivor_becomes_coordinator() {
    let cluster = cluster_with(quiet_config(50), 2).await;
    let mut rx = cluster.subscribe();

    let deposition = cluster.depose_coordinator().await.unwrap();
    assert_eq!(deposition.deposed, 1);
    assert_eq!(deposition.successor, Some(2));

    let event = wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::CoordinatorAssigned { .. })
    })
    .await
    .expect("assignment should be announced");
    assert_eq!(event, ClusterEvent::CoordinatorAssigned { node_id: 2 });

    cluster.shutdown().await;
}

/// A deposed node is gone for good: it is never re-elected and never
/// routed to again.
#[tokio::test]
async fn test_deposed_node_is_never_reelected() {
    let cluster = cluster_with(quiet_config(50), 3).await;
    let mut removed = Vec::new();

    for _ in 0..5 {
        let deposition = cluster.depose_coordinator().await.unwrap();
        removed.push(deposition.deposed);
        cluster.create_node().await.unwrap();

        let coordinator = cluster.coordinator_id().await.unwrap();
        assert!(!removed.contains(&coordinator));
        let members = cluster.node_ids().await;
        assert!(removed.iter().all(|id| !members.contains(id)));
        assert!(members.contains(&coordinator));
    }

    assert_eq!(cluster.len().await, 3);
    cluster.shutdown().await;
}

/// The new coordinator may grant someone else before the old holder's
/// RELEASE arrives. That RELEASE must not pop the new head, and the new
/// grantee still waits for the resource.
#[tokio::test]
async fn test_stale_release_does_not_pop_new_head() {
    let cluster = cluster_with(quiet_config(400), 4).await;
    let (stop, recorder) = record_events(&cluster);
    let mut rx = cluster.subscribe();

    request(&cluster, 2).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::Entered { node_id: 2 })
    })
    .await
    .expect("node 2 should enter");

    let deposition = cluster.depose_coordinator().await.unwrap();
    assert_eq!(deposition.discarded, vec![2]);

    let requester = if deposition.successor == Some(3) { 4 } else { 3 };
    request(&cluster, requester).await;

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::ReleaseIgnored { node_id: 2, .. })
    })
    .await
    .expect("node 2's release should be stale");

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::Exited { node_id } if *node_id == requester)
    })
    .await
    .expect("the new grantee should get its turn");
    assert!(wait_for_queue(&cluster, &[], WAIT).await);

    let _ = stop.send(());
    let events = recorder.await.unwrap();
    assert_sections_never_overlap(&events);

    let stats = cluster.resource().stats();
    assert_eq!(stats.max_concurrent_holders, 1);
    assert_eq!(stats.completed_sections, 2);

    cluster.shutdown().await;
}

/// A queued requester that has left the cluster cannot be granted. The
/// coordinator retires it and moves on to the next waiter.
#[tokio::test]
async fn test_departed_head_is_retired_and_next_waiter_granted() {
    let cluster = cluster_with(quiet_config(300), 3).await;
    let mut rx = cluster.subscribe();

    request(&cluster, 2).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::Entered { node_id: 2 })
    })
    .await
    .expect("node 2 should enter");

    cluster
        .send_to(1, Message::request(999, Utc::now()))
        .await
        .unwrap();
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            ClusterEvent::RequestEnqueued {
                node_id: 999,
                position: 2,
                ..
            }
        )
    })
    .await
    .expect("unknown requester should be queued");

    request(&cluster, 3).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            ClusterEvent::RequestEnqueued {
                node_id: 3,
                position: 3,
                ..
            }
        )
    })
    .await
    .expect("node 3 should queue third");
    assert_eq!(cluster.queue_snapshot().await, vec![2, 999, 3]);

    let failure = wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::RoutingFailed { .. })
    })
    .await
    .expect("GRANT to node 999 should fail");
    assert_eq!(
        failure,
        ClusterEvent::RoutingFailed {
            from: 1,
            to: 999,
            kind: MessageKind::Grant
        }
    );

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, ClusterEvent::Granted { node_id: 3, .. })
    })
    .await
    .expect("node 3 should be granted after 999 is retired");

    assert!(wait_for_queue(&cluster, &[], WAIT).await);
    assert_eq!(cluster.node_ids().await, vec![1, 2, 3]);
    assert_eq!(cluster.resource().stats().completed_sections, 2);

    cluster.shutdown().await;
}
