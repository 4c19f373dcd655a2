//! Wire format for journal entries (version 1)
//!
//! Every entry is framed as:
//!
//! ```text
//! +----------------+
//! | Length (u32)   |  Total bytes after this field (body + crc)
//! +----------------+
//! | Body           |  See below
//! +----------------+
//! | CRC32 (u32)    |  Checksum of the body
//! +----------------+
//! ```
//!
//! Body layout:
//!
//! ```text
//! kind: u8                      entry kind from the closed set
//! version: u8                   wire format version (1)
//! operation_id: uvarint         LEB128
//! delete_old: ivarint           zigzag LEB128; -1 = no target
//! delete_new: uvarint           0 = no target (operation IDs start at 1)
//! pending_replacement: ivarint  zigzag LEB128; -1 = no target
//! flags: u8                     bit0 elide_write, bit1 is_refresh,
//!                               bit2 has_state, bit3 has_operation,
//!                               bit4 has_snapshot
//! [state]                       uvarint length + MessagePack bytes
//! [operation]                   uvarint length + MessagePack bytes
//! [new_snapshot]                uvarint length + MessagePack bytes
//! ```

use crate::entry::{EntryKind, JournalEntry, UnknownEntryKind};
use crc32fast::Hasher;
use std::sync::Arc;
use thiserror::Error;
use tidemark_core::{Operation, ResourceState, Snapshot};

/// Current wire format version.
pub const WIRE_FORMAT_VERSION: u8 = 1;

/// Maximum framed entry size (64 MB). Write entries carry whole snapshots.
pub const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// Minimum body size: kind(1) + version(1) + five single-byte varints + flags(1).
pub const MIN_BODY_SIZE: usize = 7;

const FLAG_ELIDE_WRITE: u8 = 1 << 0;
const FLAG_IS_REFRESH: u8 = 1 << 1;
const FLAG_HAS_STATE: u8 = 1 << 2;
const FLAG_HAS_OPERATION: u8 = 1 << 3;
const FLAG_HAS_SNAPSHOT: u8 = 1 << 4;

/// Errors raised by the wire codec.
#[derive(Debug, Error)]
pub enum WireError {
    /// Buffer ended before the frame did.
    #[error("journal entry truncated: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum bytes needed.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Frame length exceeds the maximum allowed size.
    #[error("journal entry too large: {size} bytes (max: {max})")]
    TooLarge {
        /// Declared frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// CRC32 mismatch: the frame is corrupt.
    #[error(
        "CRC32 checksum mismatch at offset {offset}: expected 0x{expected:08X}, got 0x{actual:08X}"
    )]
    ChecksumMismatch {
        /// File offset of the frame, for diagnostics.
        offset: u64,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the body.
        actual: u32,
    },

    /// The kind byte is outside the closed set.
    #[error(transparent)]
    UnknownKind(#[from] UnknownEntryKind),

    /// The frame was written by a newer format version.
    #[error("unsupported wire format version {found} (supported: {WIRE_FORMAT_VERSION})")]
    UnsupportedVersion {
        /// Version byte found in the frame.
        found: u8,
    },

    /// A varint ran past the buffer or overflowed 64 bits.
    #[error("malformed varint at offset {offset}")]
    MalformedVarint {
        /// File offset where decoding failed.
        offset: u64,
    },

    /// A payload section failed to serialize or deserialize.
    #[error("payload codec error at offset {offset}: {message}")]
    Payload {
        /// File offset of the frame.
        offset: u64,
        /// Underlying codec message.
        message: String,
    },
}

// ============================================================================
// Varints
// ============================================================================

/// Append an unsigned LEB128 varint.
pub fn write_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Append a signed varint, zigzag-encoded.
pub fn write_ivarint(buf: &mut Vec<u8>, value: i64) {
    write_uvarint(buf, zigzag_encode(value));
}

/// Read an unsigned LEB128 varint, advancing `pos`.
pub fn read_uvarint(data: &[u8], pos: &mut usize, offset: u64) -> Result<u64, WireError> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or(WireError::MalformedVarint { offset })?;
        *pos += 1;
        if shift == 63 && byte > 1 {
            return Err(WireError::MalformedVarint { offset });
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(WireError::MalformedVarint { offset });
        }
    }
}

/// Read a signed zigzag varint, advancing `pos`.
pub fn read_ivarint(data: &[u8], pos: &mut usize, offset: u64) -> Result<i64, WireError> {
    read_uvarint(data, pos, offset).map(zigzag_decode)
}

fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn write_section(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_uvarint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn read_section<'a>(data: &'a [u8], pos: &mut usize, offset: u64) -> Result<&'a [u8], WireError> {
    let len = read_uvarint(data, pos, offset)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or(WireError::Truncated {
            expected: pos.saturating_add(len),
            actual: data.len(),
        })?;
    let section = &data[*pos..end];
    *pos = end;
    Ok(section)
}

// ============================================================================
// Entry framing
// ============================================================================

impl JournalEntry {
    /// Serialize the entry as a framed, checksummed record.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut body = Vec::with_capacity(32);
        body.push(self.kind as u8);
        body.push(WIRE_FORMAT_VERSION);
        write_uvarint(&mut body, self.operation_id);
        write_ivarint(&mut body, self.delete_old.map_or(-1, |i| i as i64));
        write_uvarint(&mut body, self.delete_new.unwrap_or(0));
        write_ivarint(&mut body, self.pending_replacement.map_or(-1, |i| i as i64));

        let mut flags = 0u8;
        if self.elide_write {
            flags |= FLAG_ELIDE_WRITE;
        }
        if self.is_refresh {
            flags |= FLAG_IS_REFRESH;
        }
        if self.state.is_some() {
            flags |= FLAG_HAS_STATE;
        }
        if self.operation.is_some() {
            flags |= FLAG_HAS_OPERATION;
        }
        if self.new_snapshot.is_some() {
            flags |= FLAG_HAS_SNAPSHOT;
        }
        body.push(flags);

        if let Some(state) = &self.state {
            let bytes = rmp_serde::to_vec(state.as_ref()).map_err(|e| WireError::Payload {
                offset: 0,
                message: e.to_string(),
            })?;
            write_section(&mut body, &bytes);
        }
        if let Some(operation) = &self.operation {
            let bytes = rmp_serde::to_vec(operation).map_err(|e| WireError::Payload {
                offset: 0,
                message: e.to_string(),
            })?;
            write_section(&mut body, &bytes);
        }
        if let Some(snapshot) = &self.new_snapshot {
            let bytes = rmp_serde::to_vec(snapshot).map_err(|e| WireError::Payload {
                offset: 0,
                message: e.to_string(),
            })?;
            write_section(&mut body, &bytes);
        }

        let mut hasher = Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let total_len = body.len() + 4;
        if total_len > MAX_ENTRY_SIZE {
            return Err(WireError::TooLarge {
                size: total_len,
                max: MAX_ENTRY_SIZE,
            });
        }

        let mut buf = Vec::with_capacity(4 + total_len);
        buf.extend_from_slice(&(total_len as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decode one framed entry from `data`, returning it and the number of
    /// bytes consumed. `offset` is the frame's position in its file, used
    /// only for error reporting.
    pub fn decode(data: &[u8], offset: u64) -> Result<(Self, usize), WireError> {
        if data.len() < 4 {
            return Err(WireError::Truncated {
                expected: 4,
                actual: data.len(),
            });
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&data[0..4]);
        let total_len = u32::from_le_bytes(len_bytes) as usize;

        if total_len < MIN_BODY_SIZE + 4 {
            return Err(WireError::Truncated {
                expected: MIN_BODY_SIZE + 4,
                actual: total_len,
            });
        }
        if total_len > MAX_ENTRY_SIZE {
            return Err(WireError::TooLarge {
                size: total_len,
                max: MAX_ENTRY_SIZE,
            });
        }

        let total_bytes = 4 + total_len;
        if data.len() < total_bytes {
            return Err(WireError::Truncated {
                expected: total_bytes,
                actual: data.len(),
            });
        }

        let body_end = total_bytes - 4;
        let body = &data[4..body_end];

        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&data[body_end..total_bytes]);
        let expected_crc = u32::from_le_bytes(crc_bytes);

        let mut hasher = Hasher::new();
        hasher.update(body);
        let actual_crc = hasher.finalize();
        if expected_crc != actual_crc {
            return Err(WireError::ChecksumMismatch {
                offset,
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let kind = EntryKind::try_from(body[0])?;
        let version = body[1];
        if version != WIRE_FORMAT_VERSION {
            return Err(WireError::UnsupportedVersion { found: version });
        }

        let mut pos = 2;
        let operation_id = read_uvarint(body, &mut pos, offset)?;
        let delete_old = match read_ivarint(body, &mut pos, offset)? {
            -1 => None,
            i => Some(i as usize),
        };
        let delete_new = match read_uvarint(body, &mut pos, offset)? {
            0 => None,
            id => Some(id),
        };
        let pending_replacement = match read_ivarint(body, &mut pos, offset)? {
            -1 => None,
            i => Some(i as usize),
        };

        let flags = *body.get(pos).ok_or(WireError::Truncated {
            expected: pos + 1,
            actual: body.len(),
        })?;
        pos += 1;

        let state = if flags & FLAG_HAS_STATE != 0 {
            let bytes = read_section(body, &mut pos, offset)?;
            let state: ResourceState =
                rmp_serde::from_slice(bytes).map_err(|e| WireError::Payload {
                    offset,
                    message: e.to_string(),
                })?;
            Some(Arc::new(state))
        } else {
            None
        };
        let operation = if flags & FLAG_HAS_OPERATION != 0 {
            let bytes = read_section(body, &mut pos, offset)?;
            let operation: Operation =
                rmp_serde::from_slice(bytes).map_err(|e| WireError::Payload {
                    offset,
                    message: e.to_string(),
                })?;
            Some(operation)
        } else {
            None
        };
        let new_snapshot = if flags & FLAG_HAS_SNAPSHOT != 0 {
            let bytes = read_section(body, &mut pos, offset)?;
            let snapshot: Snapshot =
                rmp_serde::from_slice(bytes).map_err(|e| WireError::Payload {
                    offset,
                    message: e.to_string(),
                })?;
            Some(snapshot)
        } else {
            None
        };

        Ok((
            JournalEntry {
                kind,
                operation_id,
                state,
                operation,
                delete_old,
                delete_new,
                pending_replacement,
                elide_write: flags & FLAG_ELIDE_WRITE != 0,
                is_refresh: flags & FLAG_IS_REFRESH != 0,
                new_snapshot,
            },
            total_bytes,
        ))
    }
}
