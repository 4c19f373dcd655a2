//! Durable entry log
//!
//! Appends framed journal entries to a log file so a crashed plan can be
//! examined on the next load: Begins without matching Ends surface as
//! pending operations.
//!
//! File layout:
//!
//! ```text
//! +--------------------+
//! | Magic (4 bytes)    |
//! | Version (u8)       |
//! | Reserved (3 bytes) |
//! +--------------------+
//! | Framed entries...  |  see the wire module
//! +--------------------+
//! ```
//!
//! Reads tolerate a torn tail: a truncated or corrupt final frame ends the
//! read without error (the process died mid-append), while a corrupt
//! interior frame is surfaced as corruption.

use crate::entry::{EntryKind, JournalEntry};
use crate::wire::WireError;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tidemark_core::Operation;

/// Magic bytes at the start of every log file.
pub const LOG_MAGIC: [u8; 4] = *b"TMJL";

/// Current log file format version.
pub const LOG_FORMAT_VERSION: u8 = 1;

/// Header size: magic(4) + version(1) + reserved(3).
pub const LOG_HEADER_SIZE: usize = 8;

/// Errors raised by the entry log.
#[derive(Debug, Error)]
pub enum LogError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame failed to encode or decode.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The file does not start with the log magic.
    #[error("not a journal log: bad magic {found:02X?}")]
    BadMagic {
        /// The four bytes found instead.
        found: [u8; 4],
    },

    /// The file was written by a newer format version.
    #[error("unsupported log format version {found} (supported: {LOG_FORMAT_VERSION})")]
    UnsupportedVersion {
        /// Version byte found in the header.
        found: u8,
    },

    /// The file is shorter than a header.
    #[error("journal log header truncated: {actual} bytes")]
    HeaderTooShort {
        /// File length.
        actual: usize,
    },
}

/// When appended entries are fsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// fsync after every entry. Slowest, zero loss window.
    EveryEntry,

    /// fsync every N entries or every T milliseconds, whichever first.
    Batched {
        /// Maximum milliseconds between fsyncs.
        interval_ms: u64,
        /// Maximum entries between fsyncs.
        batch_size: usize,
    },

    /// Never fsync; the OS decides. Loss window is unbounded.
    Never,
}

impl SyncPolicy {
    /// Batched with defaults suitable for interactive deployments.
    pub fn batched_default() -> Self {
        SyncPolicy::Batched {
            interval_ms: 100,
            batch_size: 64,
        }
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self::batched_default()
    }
}

/// Appends framed entries to a log file.
pub struct JournalLogWriter {
    file: File,
    policy: SyncPolicy,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl JournalLogWriter {
    /// Create (truncating) a log file at `path` and write its header.
    pub fn create(path: &Path, policy: SyncPolicy) -> Result<Self, LogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;

        let mut header = [0u8; LOG_HEADER_SIZE];
        header[0..4].copy_from_slice(&LOG_MAGIC);
        header[4] = LOG_FORMAT_VERSION;
        file.write_all(&header)?;
        file.sync_all()?;

        Ok(JournalLogWriter {
            file,
            policy,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        })
    }

    /// Append one entry, syncing per the configured policy.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), LogError> {
        let bytes = entry.encode()?;
        self.file.write_all(&bytes)?;
        self.writes_since_sync += 1;
        self.maybe_sync()
    }

    fn maybe_sync(&mut self) -> Result<(), LogError> {
        let should_sync = match self.policy {
            SyncPolicy::EveryEntry => true,
            SyncPolicy::Batched {
                interval_ms,
                batch_size,
            } => {
                self.writes_since_sync >= batch_size
                    || self.last_sync.elapsed().as_millis() as u64 >= interval_ms
            }
            SyncPolicy::Never => false,
        };
        if should_sync {
            self.file.sync_all()?;
            self.writes_since_sync = 0;
            self.last_sync = Instant::now();
        }
        Ok(())
    }

    /// Force an fsync regardless of policy.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.file.sync_all()?;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }
}

/// What a log read found besides the entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogReadSummary {
    /// Entries decoded.
    pub entries_read: usize,
    /// True when the final frame was truncated or corrupt and was dropped.
    pub truncated_tail: bool,
    /// Bytes consumed, header included.
    pub bytes_read: u64,
}

/// Reads framed entries back from a log file.
pub struct JournalLogReader;

impl JournalLogReader {
    /// Read every intact entry from the log at `path`.
    pub fn read_all(path: &Path) -> Result<(Vec<JournalEntry>, LogReadSummary), LogError> {
        let data = fs::read(path)?;
        if data.len() < LOG_HEADER_SIZE {
            return Err(LogError::HeaderTooShort { actual: data.len() });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[0..4]);
        if magic != LOG_MAGIC {
            return Err(LogError::BadMagic { found: magic });
        }
        if data[4] != LOG_FORMAT_VERSION {
            return Err(LogError::UnsupportedVersion { found: data[4] });
        }

        let mut entries = Vec::new();
        let mut summary = LogReadSummary::default();
        let mut pos = LOG_HEADER_SIZE;

        while pos < data.len() {
            match JournalEntry::decode(&data[pos..], pos as u64) {
                Ok((entry, consumed)) => {
                    entries.push(entry);
                    pos += consumed;
                }
                Err(WireError::Truncated { .. }) => {
                    // Process died mid-append
                    tracing::warn!(offset = pos, "journal log ends in a torn frame");
                    summary.truncated_tail = true;
                    break;
                }
                Err(err @ WireError::ChecksumMismatch { .. })
                    if frame_reaches_eof(&data, pos) =>
                {
                    tracing::warn!(offset = pos, %err, "dropping corrupt tail frame");
                    summary.truncated_tail = true;
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        summary.entries_read = entries.len();
        summary.bytes_read = pos as u64;
        Ok((entries, summary))
    }
}

/// True when the frame starting at `pos` is the last one in the file, in
/// which case corruption is treated as a torn tail rather than damage.
fn frame_reaches_eof(data: &[u8], pos: usize) -> bool {
    let Some(len_bytes) = data.get(pos..pos + 4) else {
        return true;
    };
    let mut len = [0u8; 4];
    len.copy_from_slice(len_bytes);
    let total = 4 + u32::from_le_bytes(len) as usize;
    pos.saturating_add(total) >= data.len()
}

/// Operations that were begun but never ended, in begin order.
///
/// A recorded Failure keeps its operation pending: the mutation was
/// attempted and the next plan must reconcile it.
pub fn recover_pending_operations(entries: &[JournalEntry]) -> Vec<Operation> {
    let mut begun: Vec<(u64, Operation)> = Vec::new();
    for entry in entries {
        match entry.kind {
            EntryKind::Begin => {
                if let Some(operation) = &entry.operation {
                    begun.push((entry.operation_id, operation.clone()));
                }
            }
            EntryKind::Success | EntryKind::RefreshSuccess => {
                begun.retain(|(id, _)| *id != entry.operation_id);
            }
            EntryKind::Failure | EntryKind::Outputs | EntryKind::Write => {}
        }
    }
    begun.into_iter().map(|(_, operation)| operation).collect()
}
