//! Journal record framing.
//!
//! ```text
//! | magic "EJNL" (4) | version (2) | kind (1) | length (4) | CBOR payload | crc32 (4) |
//! ```
//!
//! Integers are little-endian; the CRC covers everything before it.

use crate::error::{CoreError, CoreResult};
use crate::mapper::{MapperError, MapperResult, ParentLink};
use crate::types::EntityId;
use entimap_codec::{from_cbor, to_cbor, Row};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"EJNL";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Kind byte of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Row inserted.
    Insert = 1,
    /// Row replaced.
    Update = 2,
    /// Row removed.
    Delete = 3,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Insert),
            2 => Some(Self::Update),
            3 => Some(Self::Delete),
            _ => None,
        }
    }

    /// Converts the kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single row mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// Row inserted under an assigned id.
    Insert {
        /// Entity class.
        class: String,
        /// Assigned id.
        id: EntityId,
        /// Owner of a child row.
        parent: Option<ParentLink>,
        /// Stored fields.
        row: Row,
    },
    /// Row replaced.
    Update {
        /// Entity class.
        class: String,
        /// Row id.
        id: EntityId,
        /// New fields.
        row: Row,
    },
    /// Row removed.
    Delete {
        /// Entity class.
        class: String,
        /// Row id.
        id: EntityId,
    },
}

impl JournalRecord {
    /// Returns the record kind.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Insert { .. } => RecordKind::Insert,
            Self::Update { .. } => RecordKind::Update,
            Self::Delete { .. } => RecordKind::Delete,
        }
    }

    /// Encodes the record with its envelope.
    pub fn encode(&self) -> MapperResult<Vec<u8>> {
        let payload = to_cbor(self)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| MapperError::rejected(self.class(), "journal record too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&JOURNAL_MAGIC);
        data.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        data.push(self.kind().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Validates a header and returns the record kind and payload length.
    pub(crate) fn decode_header(offset: u64, header: &[u8]) -> CoreResult<(RecordKind, usize)> {
        if header.len() < HEADER_SIZE || header[0..4] != JOURNAL_MAGIC {
            return Err(CoreError::journal_corruption(offset, "bad magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != JOURNAL_VERSION {
            return Err(CoreError::journal_corruption(
                offset,
                format!("unsupported version {version}"),
            ));
        }
        let kind = RecordKind::from_byte(header[6]).ok_or_else(|| {
            CoreError::journal_corruption(offset, format!("unknown record kind {}", header[6]))
        })?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
        Ok((kind, len as usize))
    }

    /// Decodes a complete frame (header, payload and CRC).
    pub(crate) fn decode_frame(offset: u64, frame: &[u8]) -> CoreResult<Self> {
        let (kind, len) = Self::decode_header(offset, frame)?;
        if frame.len() != HEADER_SIZE + len + CRC_SIZE {
            return Err(CoreError::journal_corruption(offset, "frame length mismatch"));
        }

        let body_end = HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            frame[body_end],
            frame[body_end + 1],
            frame[body_end + 2],
            frame[body_end + 3],
        ]);
        let computed = compute_crc32(&frame[..body_end]);
        if stored != computed {
            return Err(CoreError::journal_corruption(
                offset,
                format!("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"),
            ));
        }

        let record: Self = from_cbor(&frame[HEADER_SIZE..body_end])?;
        if record.kind() != kind {
            return Err(CoreError::journal_corruption(
                offset,
                "record kind does not match its payload",
            ));
        }
        Ok(record)
    }

    fn class(&self) -> &str {
        match self {
            Self::Insert { class, .. } | Self::Update { class, .. } | Self::Delete { class, .. } => {
                class
            }
        }
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 == 0 {
                    crc >> 1
                } else {
                    (crc >> 1) ^ 0xEDB8_8320
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert() -> JournalRecord {
        JournalRecord::Insert {
            class: "LocalOffice".into(),
            id: EntityId::new(3),
            parent: Some(ParentLink::new("Company", EntityId::new(1), "local_offices")),
            row: [("description", "branch1")].into_iter().collect(),
        }
    }

    #[test]
    fn frame_layout() {
        let frame = insert().encode().unwrap();
        assert_eq!(&frame[0..4], b"EJNL");
        assert_eq!(frame[6], RecordKind::Insert.as_byte());
        let len = u32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]) as usize;
        assert_eq!(frame.len(), HEADER_SIZE + len + CRC_SIZE);
        assert_eq!(JournalRecord::decode_frame(0, &frame).unwrap(), insert());
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut frame = insert().encode().unwrap();
        frame[HEADER_SIZE + 2] ^= 0xFF;
        let err = JournalRecord::decode_frame(42, &frame).unwrap_err();
        assert!(matches!(
            err,
            CoreError::JournalCorruption { offset: 42, .. }
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut frame = insert().encode().unwrap();
        frame[0] = b'X';
        assert!(JournalRecord::decode_header(0, &frame).is_err());
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
