//! The journaled snapshot manager
//!
//! Maps each engine step onto a Begin/End entry pair, tracks ownership of
//! newly introduced resource states, decides write elision, and annotates
//! entries with deletion and pending-replacement targets.
//!
//! ## Deletion targeting
//!
//! A state scheduled for removal is located by allocation identity, never
//! by value: first against the base snapshot (`delete_old` = base index),
//! then against the table of states introduced earlier in this plan
//! (`delete_new` = that operation's ID). Matching neither is not an error;
//! a same-step whose old state vanished simply records no target.
//!
//! ## Concurrency
//!
//! Plan workers call `begin_mutation` and `End` concurrently. Operation IDs
//! come from one atomic counter, which defines journal order independently
//! of wall-clock completion order. The new-resource table is a concurrent
//! map keyed by allocation address; the table holds its own `Arc` clone of
//! each state so an address can never be reused while the manager lives.

use crate::elide::must_write;
use crate::error::Result;
use crate::traits::{Mutation, NoopMutation, SnapshotManager};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tidemark_core::{Operation, OperationKind, ResourceState, Snapshot, Step, StepOp};
use tidemark_journal::{Journal, JournalEntry, SnapshotPersister};

/// A resource state introduced by an earlier operation in this plan.
struct NewResource {
    operation_id: u64,
    // Pins the allocation so the address key stays unique for the
    // manager's lifetime.
    _state: Arc<ResourceState>,
}

fn identity_key(state: &Arc<ResourceState>) -> usize {
    Arc::as_ptr(state) as usize
}

struct Inner {
    journal: Journal,

    /// Next operation ID to hand out. IDs start at 1 so 0 can mean "no
    /// target" on the wire.
    next_operation_id: AtomicU64,

    /// States introduced by End entries, keyed by allocation address.
    new_resources: DashMap<usize, NewResource>,
}

impl Inner {
    /// Allocate the next operation ID.
    ///
    /// # Panics
    ///
    /// Panics if the counter reaches `u64::MAX` (overflow).
    fn next_operation_id(&self) -> u64 {
        self.next_operation_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .expect("operation ID overflow: u64::MAX reached")
    }

    /// Annotate `entry` with the deletion target for `to_delete`.
    fn mark_deletion_target(&self, entry: &mut JournalEntry, to_delete: &Arc<ResourceState>) {
        if let Some(index) = self.journal.base_index_of(to_delete) {
            entry.delete_old = Some(index);
        } else if let Some(found) = self.new_resources.get(&identity_key(to_delete)) {
            entry.delete_new = Some(found.operation_id);
        }
        // Matching neither is fine: the old state is not part of the
        // persisted view.
    }

    fn record_new_state(&self, operation_id: u64, state: &Arc<ResourceState>) {
        self.new_resources.insert(
            identity_key(state),
            NewResource {
                operation_id,
                _state: state.clone(),
            },
        );
    }
}

/// A snapshot manager backed by a single journal.
pub struct JournalSnapshotManager {
    inner: Arc<Inner>,
}

impl JournalSnapshotManager {
    /// Create a manager over `base`, checkpointing into `persister`.
    pub fn new(base: Snapshot, persister: Box<dyn SnapshotPersister>) -> Self {
        Self::with_journal(Journal::new(base, persister))
    }

    /// Create a manager over an existing journal (e.g. one with a durable
    /// entry log attached).
    pub fn with_journal(journal: Journal) -> Self {
        JournalSnapshotManager {
            inner: Arc::new(Inner {
                journal,
                next_operation_id: AtomicU64::new(1),
                new_resources: DashMap::new(),
            }),
        }
    }

    /// The entries recorded so far, in append order.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.inner.journal.entries()
    }

    /// True when elided entries are waiting for a flush.
    pub fn has_elided_writes(&self) -> bool {
        self.inner.journal.has_elided_writes()
    }
}

impl SnapshotManager for JournalSnapshotManager {
    fn begin_mutation(&self, step: &dyn Step) -> Result<Box<dyn Mutation>> {
        let op = step.op();
        if op == StepOp::Replace {
            // The paired create-replacement and delete-replaced steps carry
            // the journaled semantics; the envelope records nothing.
            return Ok(Box::new(NoopMutation));
        }

        let operation_id = self.inner.next_operation_id();
        let mut entry = JournalEntry::begin(operation_id);

        match op {
            StepOp::Same => {
                entry.elide_write = true;
            }
            StepOp::Create | StepOp::CreateReplacement => {
                if let Some(new) = step.new_state() {
                    entry.operation = Some(Operation::new(new.clone(), OperationKind::Creating));
                }
                if let Some(old) = step.old_state() {
                    self.inner.mark_deletion_target(&mut entry, old);
                }
            }
            StepOp::Update => {
                if let Some(new) = step.new_state() {
                    entry.operation = Some(Operation::new(new.clone(), OperationKind::Updating));
                }
            }
            StepOp::Delete | StepOp::DeleteReplaced | StepOp::ReadDiscard
            | StepOp::DiscardReplaced => {
                if let Some(old) = step.old_state() {
                    entry.operation = Some(Operation::new(old.clone(), OperationKind::Deleting));
                }
            }
            StepOp::Read | StepOp::ReadReplacement => {
                if let Some(new) = step.new_state() {
                    entry.operation = Some(Operation::new(new.clone(), OperationKind::Reading));
                }
            }
            StepOp::Refresh => {
                if let Some(res) = step.res() {
                    entry.operation =
                        Some(Operation::new(res.clone(), OperationKind::Refreshing));
                }
            }
            StepOp::RemovePendingReplace => {}
            StepOp::Import | StepOp::ImportReplacement => {
                if let Some(new) = step.new_state() {
                    entry.operation = Some(Operation::new(new.clone(), OperationKind::Importing));
                }
                if let Some(original) = step.original() {
                    self.inner.mark_deletion_target(&mut entry, original);
                }
            }
            StepOp::Replace => unreachable!("handled above"),
        }

        tracing::debug!(operation_id, op = ?op, urn = %step.urn(), "begin mutation");
        self.inner.journal.begin_operation(entry)?;

        Ok(Box::new(JournalMutation {
            inner: self.inner.clone(),
            operation_id,
        }))
    }

    fn register_resource_outputs(&self, step: &dyn Step) -> Result<()> {
        let new = step
            .new_state()
            .expect("outputs registration requires a new state");

        let operation_id = self.inner.next_operation_id();
        let mut entry = JournalEntry::outputs(operation_id).with_state(new.clone());
        if let Some(old) = step.old_state() {
            self.inner.mark_deletion_target(&mut entry, old);
            if old.outputs == new.outputs {
                entry.elide_write = true;
            }
        }

        self.inner.record_new_state(operation_id, new);
        self.inner.journal.end_operation(entry)?;
        Ok(())
    }

    fn write(&self, base: &Snapshot) -> Result<()> {
        let operation_id = self.inner.next_operation_id();
        self.inner.journal.write(base, operation_id)?;
        Ok(())
    }

    fn rebuilt_base_state(&self) -> Result<Snapshot> {
        let (snapshot, _) = self.inner.journal.rebuilt()?;
        Ok(snapshot)
    }

    fn close(&self) -> Result<Snapshot> {
        Ok(self.inner.journal.close()?)
    }
}

/// Handle for one begun operation.
///
/// Carries the manager's shared interior and the operation ID, not an
/// owning back-reference; the manager outlives all of its mutations by
/// construction.
struct JournalMutation {
    inner: Arc<Inner>,
    operation_id: u64,
}

impl JournalMutation {
    fn end_same(&self, step: &dyn Step, successful: bool) -> JournalEntry {
        if successful {
            let new = step.new_state().expect("same step requires a new state");
            let mut entry =
                JournalEntry::success(self.operation_id).with_state(new.clone());
            if let Some(old) = step.old_state() {
                if !must_write(old, new) && !step.is_skipped_create() {
                    entry.elide_write = true;
                }
                self.inner.mark_deletion_target(&mut entry, old);
            }
            entry
        } else {
            let mut entry = JournalEntry::failure(self.operation_id);
            if let Some(old) = step.old_state() {
                self.inner.mark_deletion_target(&mut entry, old);
            }
            entry
        }
    }

    fn end_create(&self, step: &dyn Step, successful: bool) -> JournalEntry {
        if successful {
            let new = step.new_state().expect("create step requires a new state");
            let mut entry =
                JournalEntry::success(self.operation_id).with_state(new.clone());
            if let Some(old) = step.old_state() {
                if old.pending_replacement {
                    self.inner.mark_deletion_target(&mut entry, old);
                }
            }
            entry
        } else {
            // The failure still records the new state: it represents the
            // partially-created resource the next plan must reconcile.
            let mut entry = JournalEntry::failure(self.operation_id);
            entry.state = step.new_state().cloned();
            entry
        }
    }

    fn end_update(&self, step: &dyn Step, successful: bool) -> JournalEntry {
        let new = step.new_state().expect("update step requires a new state");
        let mut entry = if successful {
            JournalEntry::success(self.operation_id)
        } else {
            JournalEntry::failure(self.operation_id)
        };
        entry.state = Some(new.clone());
        if let Some(old) = step.old_state() {
            self.inner.mark_deletion_target(&mut entry, old);
        }
        entry
    }

    fn end_delete(&self, step: &dyn Step, successful: bool) -> JournalEntry {
        if successful {
            let old = step.old_state().expect("delete step requires an old state");
            assert!(
                !old.protect || step.op().is_replacement_deletion(),
                "refusing to delete protected resource {}",
                old.urn
            );
            let mut entry = JournalEntry::success(self.operation_id);
            if old.pending_replacement {
                // The resource stays in the snapshot, marked for a
                // replacement that has been deferred.
                entry.pending_replacement = self.inner.journal.base_index_of(old);
            } else {
                self.inner.mark_deletion_target(&mut entry, old);
            }
            entry
        } else {
            JournalEntry::failure(self.operation_id)
        }
    }

    fn end_read(&self, step: &dyn Step, successful: bool) -> JournalEntry {
        if successful {
            let new = step.new_state().expect("read step requires a new state");
            let mut entry =
                JournalEntry::success(self.operation_id).with_state(new.clone());
            if let Some(old) = step.old_state() {
                self.inner.mark_deletion_target(&mut entry, old);
            }
            entry
        } else {
            JournalEntry::failure(self.operation_id)
        }
    }

    fn end_refresh(&self, step: &dyn Step, successful: bool) -> JournalEntry {
        if !successful {
            // Unsuccessful refreshes fail regardless of persistence.
            return JournalEntry::failure(self.operation_id);
        }
        if step.persisted() {
            // Persisted refresh: the old slot is deleted and the new state
            // appended, so replay re-orders the resource to the end.
            let mut entry = JournalEntry::success(self.operation_id);
            entry.is_refresh = true;
            entry.state = step.new_state().cloned();
            if let Some(old) = step.old_state() {
                self.inner.mark_deletion_target(&mut entry, old);
            }
            entry
        } else {
            let new = step.new_state().expect("refresh step requires a new state");
            let mut entry =
                JournalEntry::refresh_success(self.operation_id).with_state(new.clone());
            if let Some(old) = step.old_state() {
                self.inner.mark_deletion_target(&mut entry, old);
            }
            entry
        }
    }

    fn end_remove_pending_replace(&self, step: &dyn Step) -> JournalEntry {
        // Never fails: the step only clears snapshot bookkeeping.
        let mut entry = JournalEntry::success(self.operation_id);
        if let Some(old) = step.old_state() {
            self.inner.mark_deletion_target(&mut entry, old);
        }
        entry
    }

    fn end_import(&self, step: &dyn Step, successful: bool) -> JournalEntry {
        let new = step.new_state().expect("import step requires a new state");
        let mut entry = if successful {
            JournalEntry::success(self.operation_id)
        } else {
            JournalEntry::failure(self.operation_id)
        };
        entry.state = Some(new.clone());
        if successful {
            if let Some(original) = step.original() {
                self.inner.mark_deletion_target(&mut entry, original);
            }
        }
        entry
    }
}

impl Mutation for JournalMutation {
    fn end(&self, step: &dyn Step, successful: bool) -> Result<()> {
        let entry = match step.op() {
            StepOp::Same => self.end_same(step, successful),
            StepOp::Create | StepOp::CreateReplacement => self.end_create(step, successful),
            StepOp::Update => self.end_update(step, successful),
            StepOp::Delete | StepOp::DeleteReplaced | StepOp::ReadDiscard
            | StepOp::DiscardReplaced => self.end_delete(step, successful),
            StepOp::Read | StepOp::ReadReplacement => self.end_read(step, successful),
            StepOp::Refresh => self.end_refresh(step, successful),
            StepOp::RemovePendingReplace => self.end_remove_pending_replace(step),
            StepOp::Import | StepOp::ImportReplacement => self.end_import(step, successful),
            StepOp::Replace => {
                unreachable!("replace steps receive a no-op mutation handle")
            }
        };

        if let Some(state) = &entry.state {
            self.inner.record_new_state(self.operation_id, state);
        }

        tracing::debug!(
            operation_id = self.operation_id,
            kind = ?entry.kind,
            successful,
            "end mutation"
        );
        self.inner.journal.end_operation(entry)?;
        Ok(())
    }
}
