//! Entry framing
//!
//! Each entry is stored as one frame:
//!
//! ```text
//! +-------------+-------------+----------------------+
//! | len: u32 LE | crc: u32 LE | payload (MessagePack) |
//! +-------------+-------------+----------------------+
//! ```
//!
//! `crc` is the CRC32 of the payload. Decoding stops with an error at the
//! first frame that is truncated or fails its checksum.

use crate::entry::LogEntry;
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

const HEADER_LEN: usize = 8;

/// Framing or serialization failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogError {
    /// Entry could not be serialized
    #[error("encode failed: {0}")]
    Encode(String),

    /// Payload passed its checksum but could not be deserialized
    #[error("decode failed at offset {offset}: {reason}")]
    Decode {
        /// Byte offset of the frame
        offset: usize,
        /// Deserializer message
        reason: String,
    },

    /// Payload bytes do not match the stored checksum
    #[error("checksum mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Byte offset of the frame
        offset: usize,
        /// Checksum stored in the header
        expected: u32,
        /// Checksum of the payload as read
        actual: u32,
    },

    /// Segment ends in the middle of a frame
    #[error("truncated frame at offset {offset}")]
    Truncated {
        /// Byte offset of the frame
        offset: usize,
    },
}

/// Append the frame of `entry` to `out`
pub fn encode_entry(entry: &LogEntry, out: &mut Vec<u8>) -> Result<(), LogError> {
    let payload = rmp_serde::to_vec(entry).map_err(|e| LogError::Encode(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| LogError::Encode(format!("payload of {} bytes", payload.len())))?;
    let mut header = [0u8; HEADER_LEN];
    LittleEndian::write_u32(&mut header[..4], len);
    LittleEndian::write_u32(&mut header[4..], crc32fast::hash(&payload));
    out.reserve(HEADER_LEN + payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&payload);
    Ok(())
}

/// Decode the frame starting at `offset`
///
/// Returns the entry and the offset of the next frame.
pub fn decode_entry(buf: &[u8], offset: usize) -> Result<(LogEntry, usize), LogError> {
    let header_end = offset + HEADER_LEN;
    if buf.len() < header_end {
        return Err(LogError::Truncated { offset });
    }
    let len = LittleEndian::read_u32(&buf[offset..offset + 4]) as usize;
    let expected = LittleEndian::read_u32(&buf[offset + 4..header_end]);
    let end = header_end + len;
    if buf.len() < end {
        return Err(LogError::Truncated { offset });
    }
    let payload = &buf[header_end..end];
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(LogError::ChecksumMismatch {
            offset,
            expected,
            actual,
        });
    }
    let entry = rmp_serde::from_slice(payload).map_err(|e| LogError::Decode {
        offset,
        reason: e.to_string(),
    })?;
    Ok((entry, end))
}

/// Decode every frame of a segment
pub fn decode_segment(buf: &[u8]) -> Result<Vec<LogEntry>, LogError> {
    let mut entries = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let (entry, next) = decode_entry(buf, offset)?;
        entries.push(entry);
        offset = next;
    }
    Ok(entries)
}
