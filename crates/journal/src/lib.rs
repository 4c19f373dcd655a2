//! Journal layer for Tidemark
//!
//! This crate handles everything that records or replays the plan's history:
//!
//! - Journal entries: typed records keyed by monotonic operation IDs
//! - Wire format: framed, CRC32-checksummed entries with varint envelopes
//! - Journal: the append-only log that owns the snapshot persister
//! - Persisters: in-memory, and crash-safe MessagePack snapshot files
//! - Entry log: durable on-disk entry stream with configurable sync policy
//! - Replay: deterministic reconstruction of a snapshot from base + entries

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod journal;
pub mod log;
pub mod persist;
pub mod replay;
pub mod wire;

pub use entry::{EntryKind, JournalEntry, UnknownEntryKind};
pub use journal::{Journal, JournalError};
pub use log::{
    recover_pending_operations, JournalLogReader, JournalLogWriter, LogError, LogReadSummary,
    SyncPolicy, LOG_FORMAT_VERSION, LOG_MAGIC,
};
pub use persist::{FileSnapshotPersister, MemoryPersister, PersistError, SnapshotPersister};
pub use replay::{rebuild_snapshot, ReplayError, ReplayStats};
pub use wire::{WireError, MAX_ENTRY_SIZE, WIRE_FORMAT_VERSION};
