//! The append-only journal
//!
//! The journal records a totally ordered stream of entries and owns the
//! snapshot persister. Every non-elided append rebuilds the current snapshot
//! from the base plus the recorded entries and hands it to the persister, so
//! the persister always observes checkpoints in entry order. Elided entries
//! only mark the journal dirty; `close` flushes the final state.
//!
//! Rebasing (`write`) is only legal before the first mutation entry; calling
//! it later is a programmer error and panics.

use crate::entry::{EntryKind, JournalEntry};
use crate::log::{JournalLogWriter, LogError};
use crate::persist::{PersistError, SnapshotPersister};
use crate::replay::{rebuild_snapshot, ReplayError, ReplayStats};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tidemark_core::{ResourceState, Snapshot};

/// Errors raised by journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The persister rejected a checkpoint.
    #[error("persister error: {0}")]
    Persist(#[from] PersistError),

    /// The recorded entries could not be replayed into a snapshot.
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// The durable entry log rejected an append.
    #[error("entry log error: {0}")]
    Log(#[from] LogError),

    /// The journal was already closed.
    #[error("journal is closed")]
    Closed,
}

struct Inner {
    base: Snapshot,
    entries: Vec<JournalEntry>,
    mutated: bool,
    has_elided: bool,
    closed: bool,
    log: Option<JournalLogWriter>,
}

/// An append-only log of journal entries over an immutable base snapshot.
///
/// All methods take `&self`; the interior is a single mutex so entries reach
/// the persister in FIFO append order even under concurrent callers.
pub struct Journal {
    inner: Mutex<Inner>,
    persister: Box<dyn SnapshotPersister>,
}

impl Journal {
    /// Create a journal over `base`, checkpointing into `persister`.
    pub fn new(base: Snapshot, persister: Box<dyn SnapshotPersister>) -> Self {
        Self::build(base, persister, None)
    }

    /// Create a journal that additionally appends every entry to a durable
    /// log file.
    pub fn with_log(
        base: Snapshot,
        persister: Box<dyn SnapshotPersister>,
        log: JournalLogWriter,
    ) -> Self {
        Self::build(base, persister, Some(log))
    }

    fn build(
        base: Snapshot,
        persister: Box<dyn SnapshotPersister>,
        log: Option<JournalLogWriter>,
    ) -> Self {
        Journal {
            inner: Mutex::new(Inner {
                base,
                entries: Vec::new(),
                mutated: false,
                has_elided: false,
                closed: false,
                log,
            }),
            persister,
        }
    }

    /// Install a replacement base snapshot.
    ///
    /// # Panics
    ///
    /// Panics if any mutation entry has already been recorded; rebasing a
    /// journal mid-plan is a programmer error.
    pub fn write(&self, base: &Snapshot, operation_id: u64) -> Result<(), JournalError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(JournalError::Closed);
        }
        assert!(
            !inner.mutated,
            "journal rebase after mutation entries were recorded"
        );
        let entry = JournalEntry::rebase(operation_id, base.clone());
        inner.base = base.clone();
        self.append_locked(&mut inner, entry)
    }

    /// Append a Begin entry. Must precede its matching End.
    pub fn begin_operation(&self, entry: JournalEntry) -> Result<(), JournalError> {
        debug_assert_eq!(entry.kind, EntryKind::Begin);
        let mut inner = self.inner.lock();
        inner.mutated = true;
        self.append_locked(&mut inner, entry)
    }

    /// Append an End entry (Success, Failure, RefreshSuccess, or Outputs)
    /// for a previously begun operation.
    pub fn end_operation(&self, entry: JournalEntry) -> Result<(), JournalError> {
        debug_assert!(entry.is_end(), "end_operation requires an End kind");
        let mut inner = self.inner.lock();
        inner.mutated = true;
        self.append_locked(&mut inner, entry)
    }

    fn append_locked(&self, inner: &mut Inner, entry: JournalEntry) -> Result<(), JournalError> {
        if inner.closed {
            return Err(JournalError::Closed);
        }
        if let Some(log) = &mut inner.log {
            log.append(&entry)?;
        }
        tracing::debug!(
            operation_id = entry.operation_id,
            kind = ?entry.kind,
            elide = entry.elide_write,
            "journal append"
        );

        let elide = entry.elide_write;
        inner.entries.push(entry);

        if elide {
            inner.has_elided = true;
        } else {
            let (snapshot, _) = rebuild_snapshot(&inner.base, &inner.entries)?;
            self.persister.save(&snapshot)?;
            inner.has_elided = false;
        }
        Ok(())
    }

    /// Replay the recorded entries against the base and return the result.
    pub fn rebuilt(&self) -> Result<(Snapshot, ReplayStats), JournalError> {
        let inner = self.inner.lock();
        Ok(rebuild_snapshot(&inner.base, &inner.entries)?)
    }

    /// Flush any elided writes, produce the final snapshot, and close.
    ///
    /// Later appends fail with [`JournalError::Closed`]. Persister errors
    /// propagate but do not cancel the entries already recorded.
    pub fn close(&self) -> Result<Snapshot, JournalError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(JournalError::Closed);
        }
        inner.closed = true;

        let (snapshot, _) = rebuild_snapshot(&inner.base, &inner.entries)?;
        if inner.has_elided {
            self.persister.save(&snapshot)?;
            inner.has_elided = false;
        }
        if let Some(log) = &mut inner.log {
            log.flush()?;
        }
        Ok(snapshot)
    }

    /// Index of `state` in the base snapshot, by allocation identity.
    pub fn base_index_of(&self, state: &Arc<ResourceState>) -> Option<usize> {
        self.inner.lock().base.index_of(state)
    }

    /// The current base snapshot.
    pub fn base(&self) -> Snapshot {
        self.inner.lock().base.clone()
    }

    /// The entries recorded so far, in append order.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.inner.lock().entries.clone()
    }

    /// Number of entries recorded so far.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when no entries have been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// True when elided entries are waiting for a flush.
    pub fn has_elided_writes(&self) -> bool {
        self.inner.lock().has_elided
    }
}
