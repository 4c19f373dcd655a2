//! Journal entries
//!
//! A journal is an append-only log of typed entries keyed by monotonic
//! operation IDs. Each entry carries enough information for replay to locate
//! the resource slot it affects: either a base-snapshot index (`delete_old`)
//! or the operation ID of a resource introduced earlier in the same journal
//! (`delete_new`). Exactly one of the two (or neither) is set per entry.
//!
//! Operation IDs start at 1, so the wire encoding can use 0 as the
//! `delete_new` sentinel for "no target".

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tidemark_core::{Operation, ResourceState, Snapshot};

/// Raised when a wire byte does not name a known entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown journal entry kind: {0}")]
pub struct UnknownEntryKind(pub u8);

/// The closed set of journal entry kinds.
///
/// `Begin` opens an operation; `Success`, `Failure`, and `RefreshSuccess`
/// close one; `Outputs` is self-contained (it never has a paired Begin);
/// `Write` rebases the journal onto a new base snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// An operation is about to mutate a resource.
    Begin = 0,
    /// The operation completed successfully.
    Success = 1,
    /// The operation failed; the mutation may have partially happened.
    Failure = 2,
    /// A non-persisted refresh completed; the slot updates in place.
    RefreshSuccess = 3,
    /// Outputs of an already-recorded resource changed.
    Outputs = 4,
    /// The base snapshot is replaced.
    Write = 5,
}

impl EntryKind {
    /// True for the kinds that close an operation.
    pub fn is_end(self) -> bool {
        matches!(
            self,
            EntryKind::Success | EntryKind::Failure | EntryKind::RefreshSuccess | EntryKind::Outputs
        )
    }
}

impl TryFrom<u8> for EntryKind {
    type Error = UnknownEntryKind;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EntryKind::Begin),
            1 => Ok(EntryKind::Success),
            2 => Ok(EntryKind::Failure),
            3 => Ok(EntryKind::RefreshSuccess),
            4 => Ok(EntryKind::Outputs),
            5 => Ok(EntryKind::Write),
            other => Err(UnknownEntryKind(other)),
        }
    }
}

/// One record in the journal.
///
/// The resource state, if any, is the *new* state being introduced; it is
/// shared with the manager's identity table, so the allocation must not be
/// replaced once the entry is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// What this entry records.
    pub kind: EntryKind,

    /// Monotonic operation ID. Begin/End pairs share one ID.
    pub operation_id: u64,

    /// The new resource state introduced by this entry.
    pub state: Option<Arc<ResourceState>>,

    /// In-flight operation descriptor, carried on Begin entries so crashed
    /// operations surface as pending on the next load.
    pub operation: Option<Operation>,

    /// Base-snapshot index of the resource this entry removes or replaces.
    pub delete_old: Option<usize>,

    /// Operation ID of a previously journaled resource this entry removes
    /// or replaces.
    pub delete_new: Option<u64>,

    /// Base-snapshot index of a resource to mark pending-replacement
    /// without removing it.
    pub pending_replacement: Option<usize>,

    /// Advisory: this entry alone need not trigger a persistence write.
    pub elide_write: bool,

    /// A persisted refresh: replay removes the old slot and appends the new
    /// state instead of updating in place.
    pub is_refresh: bool,

    /// The replacement base snapshot, carried by Write entries only.
    pub new_snapshot: Option<Snapshot>,
}

impl JournalEntry {
    /// An entry of the given kind with no payload and no targets.
    pub fn new(kind: EntryKind, operation_id: u64) -> Self {
        JournalEntry {
            kind,
            operation_id,
            state: None,
            operation: None,
            delete_old: None,
            delete_new: None,
            pending_replacement: None,
            elide_write: false,
            is_refresh: false,
            new_snapshot: None,
        }
    }

    /// A Begin entry.
    pub fn begin(operation_id: u64) -> Self {
        Self::new(EntryKind::Begin, operation_id)
    }

    /// A Success entry.
    pub fn success(operation_id: u64) -> Self {
        Self::new(EntryKind::Success, operation_id)
    }

    /// A Failure entry.
    pub fn failure(operation_id: u64) -> Self {
        Self::new(EntryKind::Failure, operation_id)
    }

    /// A RefreshSuccess entry.
    pub fn refresh_success(operation_id: u64) -> Self {
        Self::new(EntryKind::RefreshSuccess, operation_id)
    }

    /// An Outputs entry.
    pub fn outputs(operation_id: u64) -> Self {
        Self::new(EntryKind::Outputs, operation_id)
    }

    /// A Write (rebase) entry carrying the new base.
    pub fn rebase(operation_id: u64, new_base: Snapshot) -> Self {
        let mut entry = Self::new(EntryKind::Write, operation_id);
        entry.new_snapshot = Some(new_base);
        entry
    }

    /// Attach the new resource state.
    pub fn with_state(mut self, state: Arc<ResourceState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Attach an in-flight operation descriptor.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Mark the entry elidable.
    pub fn with_elide_write(mut self, elide: bool) -> Self {
        self.elide_write = elide;
        self
    }

    /// True when this entry closes an operation.
    pub fn is_end(&self) -> bool {
        self.kind.is_end()
    }

    /// True when a deletion target is set.
    pub fn has_deletion_target(&self) -> bool {
        self.delete_old.is_some() || self.delete_new.is_some()
    }
}
