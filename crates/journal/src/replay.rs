//! Snapshot reconstruction
//!
//! Replays a journal in operation-ID order against a base snapshot to yield
//! a new snapshot. Replay is deterministic: the same base and entries always
//! produce the same resource sequence.
//!
//! The working sequence is a slot vector: base resources occupy the first
//! slots, new resources are appended behind them, and removals clear a slot
//! without shifting, so base indices recorded in entries stay valid for the
//! whole replay.
//!
//! Ordering rules:
//! - In-place replacement preserves the dependency order the base
//!   established.
//! - Appends happen in operation-ID order, which respects dependencies
//!   because the engine only begins an operation after its dependencies
//!   have ended.
//! - A persisted refresh is a delete + append; a non-persisted refresh
//!   updates its slot in place.

use crate::entry::{EntryKind, JournalEntry};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tidemark_core::{Operation, ResourceState, Snapshot, SnapshotManifest};

/// Errors raised during replay.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    /// A Write entry appeared after a mutation entry.
    #[error("rebase (operation {operation_id}) after mutation entries were recorded")]
    RebaseAfterMutation {
        /// Operation ID of the offending Write entry.
        operation_id: u64,
    },

    /// A Write entry carried no snapshot.
    #[error("rebase (operation {operation_id}) carried no snapshot")]
    RebaseWithoutSnapshot {
        /// Operation ID of the offending Write entry.
        operation_id: u64,
    },

    /// `delete_old` or `pending_replacement` pointed outside the base.
    #[error("entry for operation {operation_id} references base index {index}, base has {len}")]
    SlotOutOfRange {
        /// Operation ID of the offending entry.
        operation_id: u64,
        /// The out-of-range index.
        index: usize,
        /// Number of base slots.
        len: usize,
    },
}

/// Counters describing what a replay did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    /// Total entries replayed.
    pub entries_replayed: usize,
    /// Slots replaced in place.
    pub resources_replaced: usize,
    /// New resources appended.
    pub resources_appended: usize,
    /// Slots removed.
    pub resources_removed: usize,
    /// Operations surfaced as pending in the output snapshot.
    pub pending_operations: usize,
}

/// Replay `entries` against `base` and return the resulting snapshot.
///
/// Begin entries without a matching End surface as pending operations, as
/// do recorded failures; neither mutates the resource sequence.
pub fn rebuild_snapshot(
    base: &Snapshot,
    entries: &[JournalEntry],
) -> Result<(Snapshot, ReplayStats), ReplayError> {
    let mut stats = ReplayStats::default();

    // Slot vector: base resources first, appends behind. Removals clear a
    // slot without shifting so recorded base indices stay valid.
    let mut slots: Vec<Option<Arc<ResourceState>>> =
        base.resources.iter().cloned().map(Some).collect();
    let mut base_len = base.resources.len();

    // Resources introduced by earlier operations in this journal.
    let mut slot_by_op: HashMap<u64, usize> = HashMap::new();

    // In-flight operations, keyed by operation ID so Ends can retire them.
    let mut pending: Vec<(u64, Operation)> = Vec::new();

    let mut saw_mutation = false;

    for entry in entries {
        stats.entries_replayed += 1;

        match entry.kind {
            EntryKind::Write => {
                if saw_mutation {
                    return Err(ReplayError::RebaseAfterMutation {
                        operation_id: entry.operation_id,
                    });
                }
                let new_base =
                    entry
                        .new_snapshot
                        .as_ref()
                        .ok_or(ReplayError::RebaseWithoutSnapshot {
                            operation_id: entry.operation_id,
                        })?;
                slots = new_base.resources.iter().cloned().map(Some).collect();
                base_len = new_base.resources.len();
                slot_by_op.clear();
            }

            EntryKind::Begin => {
                saw_mutation = true;
                if let Some(operation) = &entry.operation {
                    pending.push((entry.operation_id, operation.clone()));
                }
            }

            EntryKind::Success | EntryKind::RefreshSuccess => {
                saw_mutation = true;
                let target = resolve_target(entry, base_len, &slots, &slot_by_op)?;

                if entry.is_refresh {
                    // Persisted refresh: delete + append.
                    if let Some(index) = target {
                        slots[index] = None;
                        stats.resources_removed += 1;
                    }
                    if let Some(state) = &entry.state {
                        slots.push(Some(state.clone()));
                        slot_by_op.insert(entry.operation_id, slots.len() - 1);
                        stats.resources_appended += 1;
                    }
                } else {
                    match (target, &entry.state) {
                        (Some(index), Some(state)) => {
                            slots[index] = Some(state.clone());
                            slot_by_op.insert(entry.operation_id, index);
                            stats.resources_replaced += 1;
                        }
                        (Some(index), None) => {
                            slots[index] = None;
                            stats.resources_removed += 1;
                        }
                        (None, Some(state)) => {
                            slots.push(Some(state.clone()));
                            slot_by_op.insert(entry.operation_id, slots.len() - 1);
                            stats.resources_appended += 1;
                        }
                        (None, None) => {}
                    }
                }

                if let Some(index) = entry.pending_replacement {
                    mark_pending_replacement(entry, index, base_len, &mut slots)?;
                }

                pending.retain(|(id, _)| *id != entry.operation_id);
            }

            EntryKind::Failure => {
                // The operation was attempted; the Begin's descriptor stays
                // pending and the resource sequence is untouched.
                saw_mutation = true;
            }

            EntryKind::Outputs => {
                saw_mutation = true;
                let target = resolve_target(entry, base_len, &slots, &slot_by_op)?;
                if let (Some(index), Some(state)) = (target, &entry.state) {
                    slots[index] = Some(state.clone());
                    slot_by_op.insert(entry.operation_id, index);
                    stats.resources_replaced += 1;
                }
            }
        }
    }

    let resources: Vec<Arc<ResourceState>> = slots.into_iter().flatten().collect();
    let pending_operations: Vec<Operation> =
        pending.into_iter().map(|(_, operation)| operation).collect();
    stats.pending_operations = pending_operations.len();

    Ok((
        Snapshot {
            manifest: Some(SnapshotManifest::new()),
            resources,
            pending_operations,
        },
        stats,
    ))
}

/// Resolve the slot an entry's deletion target points at.
///
/// `delete_old` indexes the base; `delete_new` names an earlier operation.
/// A `delete_new` whose operation never materialized a resource (e.g. a
/// failed create) resolves to no target, and an already-cleared base slot
/// counts as "not found".
fn resolve_target(
    entry: &JournalEntry,
    base_len: usize,
    slots: &[Option<Arc<ResourceState>>],
    slot_by_op: &HashMap<u64, usize>,
) -> Result<Option<usize>, ReplayError> {
    if let Some(index) = entry.delete_old {
        if index >= base_len {
            return Err(ReplayError::SlotOutOfRange {
                operation_id: entry.operation_id,
                index,
                len: base_len,
            });
        }
        return Ok(slots[index].is_some().then_some(index));
    }
    if let Some(op_id) = entry.delete_new {
        return Ok(slot_by_op
            .get(&op_id)
            .copied()
            .filter(|index| slots[*index].is_some()));
    }
    Ok(None)
}

fn mark_pending_replacement(
    entry: &JournalEntry,
    index: usize,
    base_len: usize,
    slots: &mut [Option<Arc<ResourceState>>],
) -> Result<(), ReplayError> {
    if index >= base_len {
        return Err(ReplayError::SlotOutOfRange {
            operation_id: entry.operation_id,
            index,
            len: base_len,
        });
    }
    if let Some(state) = &mut slots[index] {
        let mut updated = (**state).clone();
        updated.pending_replacement = true;
        *state = Arc::new(updated);
    }
    Ok(())
}
