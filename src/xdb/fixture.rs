//! In-memory xdb writer for tests and benchmarks.
//!
//! Produces the same layout the production builder does: header, vector
//! index, deduplicated region pool, then the segment index. Segments are
//! split on `/16` boundaries so every vector slot addresses a contiguous
//! run of records sharing its prefix. Uses only `std` so integration
//! tests and benches can include it with `#[path]`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;

const HEADER_SIZE: usize = 256;
const VECTOR_INDEX_SIZE: usize = 256 * 256 * 8;
const SEGMENT_SIZE: usize = 14;

pub const FIXTURE_VERSION: u16 = 2;
pub const FIXTURE_INDEX_POLICY: u16 = 1;
pub const FIXTURE_CREATED_AT: u32 = 1_700_000_000;

/// Builder for xdb files.
#[derive(Default)]
pub struct XdbBuilder {
    ranges: Vec<(u32, u32, String)>,
    created_at: Option<u32>,
}

impl XdbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inclusive range given as dotted quads.
    pub fn segment(self, start: &str, end: &str, region: &str) -> Self {
        let start: Ipv4Addr = start.parse().expect("fixture start ip");
        let end: Ipv4Addr = end.parse().expect("fixture end ip");
        self.range(u32::from(start), u32::from(end), region)
    }

    /// Add an inclusive numeric range.
    pub fn range(mut self, start: u32, end: u32, region: &str) -> Self {
        assert!(start <= end, "fixture range reversed");
        self.ranges.push((start, end, region.to_string()));
        self
    }

    pub fn created_at(mut self, secs: u32) -> Self {
        self.created_at = Some(secs);
        self
    }

    /// Serialize into xdb bytes.
    pub fn build(&self) -> Vec<u8> {
        assert!(!self.ranges.is_empty(), "fixture needs at least one segment");

        let mut ranges = self.ranges.clone();
        ranges.sort_by_key(|(start, _, _)| *start);
        for pair in ranges.windows(2) {
            assert!(pair[0].1 < pair[1].0, "fixture ranges overlap");
        }

        let mut pieces = Vec::new();
        for (start, end, region) in &ranges {
            let mut s = *start;
            loop {
                let block_end = s | 0xFFFF;
                let e = block_end.min(*end);
                pieces.push((s, e, region.as_str()));
                if e == *end {
                    break;
                }
                s = e + 1;
            }
        }

        let mut data = vec![0u8; HEADER_SIZE + VECTOR_INDEX_SIZE];

        let mut pool: HashMap<&str, (u32, u16)> = HashMap::new();
        for (_, _, region) in &pieces {
            if !pool.contains_key(region) {
                let ptr = data.len() as u32;
                data.extend_from_slice(region.as_bytes());
                pool.insert(*region, (ptr, region.len() as u16));
            }
        }

        let start_index_ptr = data.len() as u32;
        let mut slots: HashMap<u32, (u32, u32)> = HashMap::new();
        for (s, e, region) in &pieces {
            let ptr = data.len() as u32;
            let (region_ptr, region_len) = pool[region];
            data.extend_from_slice(&s.to_le_bytes());
            data.extend_from_slice(&e.to_le_bytes());
            data.extend_from_slice(&region_len.to_le_bytes());
            data.extend_from_slice(&region_ptr.to_le_bytes());

            let slot = slots.entry(s >> 16).or_insert((ptr, ptr));
            slot.1 = ptr;
        }
        let end_index_ptr = data.len() as u32 - SEGMENT_SIZE as u32;

        for (key, (first, last)) in slots {
            let at = HEADER_SIZE + key as usize * 8;
            data[at..at + 4].copy_from_slice(&first.to_le_bytes());
            data[at + 4..at + 8].copy_from_slice(&last.to_le_bytes());
        }

        data[0..2].copy_from_slice(&FIXTURE_VERSION.to_le_bytes());
        data[2..4].copy_from_slice(&FIXTURE_INDEX_POLICY.to_le_bytes());
        data[4..8].copy_from_slice(&self.created_at.unwrap_or(FIXTURE_CREATED_AT).to_le_bytes());
        data[8..12].copy_from_slice(&start_index_ptr.to_le_bytes());
        data[12..16].copy_from_slice(&end_index_ptr.to_le_bytes());

        data
    }
}

/// Region strings used by the standard two-range fixture.
pub const SHENZHEN: &str = "中国|0|广东|深圳|电信";
pub const MOUNTAIN_VIEW: &str = "美国|0|加利福尼亚|山景城|Google";

/// `1.0.0.0/24` in Shenzhen and `8.8.8.0/24` in Mountain View.
pub fn standard() -> Vec<u8> {
    XdbBuilder::new()
        .segment("1.0.0.0", "1.0.0.255", SHENZHEN)
        .segment("8.8.8.0", "8.8.8.255", MOUNTAIN_VIEW)
        .build()
}

/// Offset of the `index`th segment record in `data`.
pub fn segment_record_offset(data: &[u8], index: usize) -> usize {
    let start = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
    start + index * SEGMENT_SIZE
}
