//! Advisory, in-memory version arbitration per aggregate.
//!
//! When a command leaves its expected revision unset, the repository asks the
//! [`VersionArbiter`] to reserve the version the save would produce. Exactly
//! one concurrent writer wins a given version; every loser is handed a
//! distinct number strictly above its proposal, which makes the repository's
//! version check fail and surfaces a concurrency conflict.
//!
//! Arbitration is advisory: it only serializes writers inside this process.
//! The repository's version check (and the store's revision check) remain the
//! authority.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use evented_core::AggregateId;

#[derive(Debug, Default)]
struct Slot {
    /// Highest version handed to a winning writer.
    granted: u64,
    /// Highest number handed to anyone (winners and losers).
    issued: u64,
}

/// Per-aggregate version reservations.
///
/// Create one per runtime and share it by `Arc`. Each aggregate id gets its
/// own lock; reservations for unrelated aggregates never contend.
#[derive(Debug, Default)]
pub struct VersionArbiter {
    slots: DashMap<AggregateId, Arc<Mutex<Slot>>>,
}

impl VersionArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `proposed` for `aggregate_id`.
    ///
    /// Returns `proposed` when no writer holds that version or a later one.
    /// Otherwise returns a number no other caller has received for this
    /// aggregate, always greater than `proposed`.
    pub fn reserve(&self, aggregate_id: AggregateId, proposed: u64) -> u64 {
        // Clone the slot out so the map shard lock is released before we block.
        let slot = self.slots.entry(aggregate_id).or_default().clone();
        let mut slot = slot.lock();

        if proposed > slot.granted {
            slot.granted = proposed;
            slot.issued = slot.issued.max(proposed);
            debug!(aggregate_id = %aggregate_id, version = proposed, "version reserved");
            proposed
        } else {
            slot.issued += 1;
            debug!(
                aggregate_id = %aggregate_id,
                proposed,
                granted = slot.granted,
                assigned = slot.issued,
                "version already taken"
            );
            slot.issued
        }
    }

    /// Give back a reservation whose save never reached the store.
    ///
    /// Only rolls back when `version` is still the latest grant; a later
    /// winner keeps its reservation.
    pub fn release(&self, aggregate_id: AggregateId, version: u64) {
        let Some(slot) = self.slots.get(&aggregate_id).map(|s| s.clone()) else {
            return;
        };
        let mut slot = slot.lock();

        if version > 0 && slot.granted == version {
            slot.granted = version - 1;
            debug!(aggregate_id = %aggregate_id, version, "version released");
        }
    }

    /// Highest version granted so far for `aggregate_id`.
    pub fn reserved(&self, aggregate_id: AggregateId) -> Option<u64> {
        let slot = self.slots.get(&aggregate_id)?.clone();
        let granted = slot.lock().granted;
        Some(granted)
    }
}
