//! Simulated per-node clocks and Berkeley-style skew estimation.
//!
//! Node clocks only stamp messages; nothing in the mutual-exclusion protocol
//! orders by them. A synchronization round uses the coordinator as time
//! master, averages every member's difference to it and nudges all clocks
//! (master included) towards that average.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::protocol::timer::random_skew_ms;
use crate::protocol::NodeId;

/// Wall clock with a node-local offset in milliseconds.
#[derive(Debug, Default)]
pub struct NodeClock {
    offset_ms: AtomicI64,
}

impl NodeClock {
    pub fn new(offset_ms: i64) -> Self {
        Self {
            offset_ms: AtomicI64::new(offset_ms),
        }
    }

    pub fn with_random_skew(max_skew_ms: i64) -> Self {
        Self::new(random_skew_ms(max_skew_ms))
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.read_at(Utc::now())
    }

    /// What this clock shows when the true time is `reference`.
    pub fn read_at(&self, reference: DateTime<Utc>) -> DateTime<Utc> {
        reference + TimeDelta::milliseconds(self.offset_ms())
    }

    pub fn adjust(&self, delta_ms: i64) {
        self.offset_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockAdjustment {
    pub node_id: NodeId,
    pub delta_ms: i64,
}

/// One Berkeley round.
///
/// `master` and `members` carry the time each clock showed at the same
/// instant. The master's own difference counts as zero in the average.
/// Returns one adjustment per participant, master first.
pub fn berkeley_adjustments(
    master: (NodeId, DateTime<Utc>),
    members: &[(NodeId, DateTime<Utc>)],
) -> Vec<ClockAdjustment> {
    let (master_id, master_time) = master;
    let diffs: Vec<(NodeId, i64)> = members
        .iter()
        .filter(|(id, _)| *id != master_id)
        .map(|(id, time)| (*id, (*time - master_time).num_milliseconds()))
        .collect();

    let participants = diffs.len() as i64 + 1;
    let mean = diffs.iter().map(|(_, d)| d).sum::<i64>() / participants;

    std::iter::once(ClockAdjustment {
        node_id: master_id,
        delta_ms: mean,
    })
    .chain(diffs.into_iter().map(|(node_id, diff)| ClockAdjustment {
        node_id,
        delta_ms: mean - diff,
    }))
    .collect()
}
