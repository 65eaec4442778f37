//! xdb format constants and structures.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 256;

/// Number of rows and columns in the vector index (one per octet value).
pub const VECTOR_INDEX_ROWS: usize = 256;
pub const VECTOR_INDEX_COLS: usize = 256;

/// Size of one vector index slot: `first_ptr (u32) | last_ptr (u32)`.
pub const VECTOR_SLOT_SIZE: usize = 8;

/// Total vector index size in bytes (512 KiB).
pub const VECTOR_INDEX_SIZE: usize = VECTOR_INDEX_ROWS * VECTOR_INDEX_COLS * VECTOR_SLOT_SIZE;

/// Offset of the vector index, directly after the header.
pub const VECTOR_INDEX_OFFSET: u64 = HEADER_SIZE as u64;

/// Size of one segment index record in bytes.
pub const SEGMENT_SIZE: usize = 14;

/// Lowest offset the segment index may start at.
pub const MIN_SEGMENT_OFFSET: u64 = (HEADER_SIZE + VECTOR_INDEX_SIZE) as u64;

/// File header (256 bytes, little-endian).
///
/// ```text
/// 0        2              4            8                 12              16      256
/// +--------+--------------+------------+-----------------+---------------+-------+
/// | version| index policy | created at | start index ptr | end index ptr | zeros |
/// +--------+--------------+------------+-----------------+---------------+-------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version, never zero.
    pub version: u16,
    /// Index policy tag written by the builder.
    pub index_policy: u16,
    /// Creation time in seconds since the Unix epoch.
    pub created_at: u32,
    /// Offset of the first segment record.
    pub start_index_ptr: u32,
    /// Offset of the last segment record (inclusive).
    pub end_index_ptr: u32,
}

impl Header {
    /// Decode the header fields from the first bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::BadHeader(format!(
                "expected {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        Ok(Self {
            version: le_u16(buf, 0),
            index_policy: le_u16(buf, 2),
            created_at: le_u32(buf, 4),
            start_index_ptr: le_u32(buf, 8),
            end_index_ptr: le_u32(buf, 12),
        })
    }

    /// Encode into a zero-padded 256-byte block.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_le_bytes());
        buf[2..4].copy_from_slice(&self.index_policy.to_le_bytes());
        buf[4..8].copy_from_slice(&self.created_at.to_le_bytes());
        buf[8..12].copy_from_slice(&self.start_index_ptr.to_le_bytes());
        buf[12..16].copy_from_slice(&self.end_index_ptr.to_le_bytes());
        buf
    }

    /// Validate the version and segment index pointers.
    ///
    /// `file_len` is checked against the end of the segment index when known.
    pub fn validate(&self, file_len: Option<u64>) -> Result<()> {
        if self.version == 0 {
            return Err(Error::BadHeader("version is zero".to_string()));
        }

        let start = u64::from(self.start_index_ptr);
        let end = u64::from(self.end_index_ptr);

        if start < MIN_SEGMENT_OFFSET {
            return Err(Error::BadHeader(format!(
                "segment index starts at {}, inside the vector index",
                start
            )));
        }
        if start > end {
            return Err(Error::BadHeader(format!(
                "segment index start {} is past its end {}",
                start, end
            )));
        }
        if (end - start) % SEGMENT_SIZE as u64 != 0 {
            return Err(Error::BadHeader(format!(
                "segment index span {} is not a multiple of {}",
                end - start,
                SEGMENT_SIZE
            )));
        }
        if let Some(len) = file_len {
            if end + SEGMENT_SIZE as u64 > len {
                return Err(Error::BadHeader(format!(
                    "segment index ends at {}, past end of file {}",
                    end + SEGMENT_SIZE as u64,
                    len
                )));
            }
        }

        Ok(())
    }

    /// Number of segment records in the file, zero for a reversed range.
    pub fn segment_count(&self) -> u64 {
        let start = u64::from(self.start_index_ptr);
        let end = u64::from(self.end_index_ptr);
        if end < start {
            return 0;
        }
        (end - start) / SEGMENT_SIZE as u64 + 1
    }

    /// Creation time as a `SystemTime`.
    pub fn created(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(u64::from(self.created_at))
    }
}

/// Offset of the vector slot covering `ip`, keyed by its top two octets.
pub fn vector_slot_offset(ip: u32) -> u64 {
    let b0 = (ip >> 24) as usize;
    let b1 = ((ip >> 16) & 0xFF) as usize;
    VECTOR_INDEX_OFFSET + ((b0 * VECTOR_INDEX_COLS + b1) * VECTOR_SLOT_SIZE) as u64
}

/// One vector index slot: the inclusive range of segment records that may
/// contain an address with the slot's `/16` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorSlot {
    pub first_ptr: u32,
    pub last_ptr: u32,
}

impl VectorSlot {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            first_ptr: le_u32(buf, 0),
            last_ptr: le_u32(buf, 4),
        }
    }

    /// A `(0, 0)` slot covers nothing.
    pub fn is_empty(&self) -> bool {
        self.first_ptr == 0 && self.last_ptr == 0
    }
}

/// Segment index record (14 bytes).
///
/// ```text
/// +----------+--------+------------+------------+
/// | start ip | end ip | region len | region ptr |
/// |   u32    |  u32   |    u16     |    u32     |
/// +----------+--------+------------+------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start_ip: u32,
    pub end_ip: u32,
    pub region_len: u16,
    pub region_ptr: u32,
}

impl Segment {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            start_ip: le_u32(buf, 0),
            end_ip: le_u32(buf, 4),
            region_len: le_u16(buf, 8),
            region_ptr: le_u32(buf, 10),
        }
    }

    pub fn contains(&self, ip: u32) -> bool {
        self.start_ip <= ip && ip <= self.end_ip
    }
}

#[inline]
pub(crate) fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[inline]
pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(start: u32, end: u32) -> Header {
        Header {
            version: 2,
            index_policy: 1,
            created_at: 1_700_000_000,
            start_index_ptr: start,
            end_index_ptr: end,
        }
    }

    #[test]
    fn test_layout_constants() {
        assert_eq!(VECTOR_INDEX_SIZE, 524_288);
        assert_eq!(MIN_SEGMENT_OFFSET, 524_544);
    }

    #[test]
    fn test_header_encode_decode() {
        let h = header(600_000, 600_000 + 14 * 3);
        let bytes = h.encode();
        assert_eq!(&bytes[0..2], &[2, 0]);
        assert!(bytes[16..].iter().all(|b| *b == 0));
        assert_eq!(Header::decode(&bytes).unwrap(), h);
        assert_eq!(h.segment_count(), 4);
    }

    #[test]
    fn test_segment_count_reversed_range() {
        let start = MIN_SEGMENT_OFFSET as u32 + 100;
        assert_eq!(header(start, start).segment_count(), 1);
        assert_eq!(header(start + 14, start).segment_count(), 0);
        assert_eq!(header(u32::MAX, 0).segment_count(), 0);
    }

    #[test]
    fn test_header_decode_short_buffer() {
        assert!(matches!(
            Header::decode(&[1u8; 16]),
            Err(Error::BadHeader(_))
        ));
    }

    #[test]
    fn test_header_validation() {
        let start = MIN_SEGMENT_OFFSET as u32 + 100;
        assert!(header(start, start).validate(None).is_ok());
        assert!(header(start, start + 28).validate(Some(u64::from(start) + 42)).is_ok());

        let mut zero_version = header(start, start);
        zero_version.version = 0;
        assert!(matches!(zero_version.validate(None), Err(Error::BadHeader(_))));

        // Reversed, misaligned, overlapping the vector index, truncated file
        assert!(header(start + 14, start).validate(None).is_err());
        assert!(header(start, start + 13).validate(None).is_err());
        assert!(header(256, 256 + 14).validate(None).is_err());
        assert!(header(start, start + 14).validate(Some(u64::from(start) + 27)).is_err());
    }

    #[test]
    fn test_vector_slot_offset() {
        assert_eq!(vector_slot_offset(0x00000000), 256);
        assert_eq!(vector_slot_offset(0x0000FFFF), 256);
        assert_eq!(vector_slot_offset(0x00010000), 256 + 8);
        assert_eq!(vector_slot_offset(0x01000000), 256 + 256 * 8);
        assert_eq!(
            vector_slot_offset(u32::MAX),
            256 + (VECTOR_INDEX_SIZE - VECTOR_SLOT_SIZE) as u64
        );
    }

    #[test]
    fn test_segment_decode() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x01000000u32.to_le_bytes());
        buf.extend_from_slice(&0x010000FFu32.to_le_bytes());
        buf.extend_from_slice(&27u16.to_le_bytes());
        buf.extend_from_slice(&524_544u32.to_le_bytes());
        assert_eq!(buf.len(), SEGMENT_SIZE);

        let seg = Segment::decode(&buf);
        assert_eq!(seg.start_ip, 0x01000000);
        assert_eq!(seg.end_ip, 0x010000FF);
        assert_eq!(seg.region_len, 27);
        assert_eq!(seg.region_ptr, 524_544);
        assert!(seg.contains(0x01000000));
        assert!(seg.contains(0x010000FF));
        assert!(!seg.contains(0x01000100));
    }

    #[test]
    fn test_vector_slot_empty() {
        assert!(VectorSlot::decode(&[0; 8]).is_empty());
        let slot = VectorSlot::decode(&[1, 0, 0, 0, 1, 0, 0, 0]);
        assert!(!slot.is_empty());
        assert_eq!(slot.first_ptr, 1);
    }
}
