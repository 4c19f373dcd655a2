//! # Tidemark
//!
//! The journaled snapshot core of an infrastructure-as-code deployment
//! engine: it records the engine's *intent* to mutate before any external
//! side effect occurs, records the *outcome* of each mutation as it
//! completes, and reconstructs a persistable resource graph from those
//! records in the presence of concurrent, out-of-order completions, partial
//! failures, and crashes.
//!
//! # Quick Start
//!
//! ```no_run
//! use tidemark::{
//!     FileSnapshotPersister, JournalSnapshotManager, Mutation, Snapshot, SnapshotManager,
//! };
//!
//! # fn demo(step: &dyn tidemark::Step) -> tidemark::Result<()> {
//! let base = Snapshot::from_resources(vec![]);
//! let persister = FileSnapshotPersister::new("./stack.tmk");
//! let manager = JournalSnapshotManager::new(base, Box::new(persister));
//!
//! // Before the side effect:
//! let mutation = manager.begin_mutation(step)?;
//! // ... perform the provider call ...
//! mutation.end(step, true)?;
//!
//! let final_snapshot = manager.close()?;
//! # let _ = final_snapshot;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! | Layer | Crate | Purpose |
//! |-------|-------|---------|
//! | Core types | `tidemark-core` | URNs, resource states, snapshots, steps |
//! | Journal | `tidemark-journal` | entries, wire format, persisters, replay |
//! | Managers | `tidemark-manager` | state machine, combined + routing fan-out |
//!
//! This crate re-exports the public surface; the member crates are
//! implementation detail.

pub use tidemark_core::{
    CustomTimeouts, Operation, OperationKind, PropertyMap, ResourceState, Snapshot,
    SnapshotIntegrityError, SnapshotManifest, Step, StepOp, Urn, UrnParseError, SNAPSHOT_VERSION,
};

pub use tidemark_journal::{
    rebuild_snapshot, recover_pending_operations, EntryKind, FileSnapshotPersister, Journal,
    JournalEntry, JournalError, JournalLogReader, JournalLogWriter, LogError, LogReadSummary,
    MemoryPersister, PersistError, ReplayError, ReplayStats, SnapshotPersister, SyncPolicy,
    WireError,
};

pub use tidemark_manager::{
    must_write, CombinedSnapshotManager, JournalSnapshotManager, ManagerError, Mutation,
    NoopMutation, Result, RoutingSnapshotManager, SnapshotManager,
};
