//! Physical and Journal Addresses
//!
//! This module defines the two address types used throughout the journal:
//!
//! - **PAddr**: a physical position `(segment, offset)` inside the storage pool
//! - **JSeq**: a total-order position `(segment_seq, paddr)` across segments
//!
//! ## Why Two Address Types?
//!
//! Segment ids are *physical* identities that get recycled: segment 3 may host
//! journal data today and be reused for something else tomorrow. The segment
//! sequence is a monotonically increasing counter stamped each time a segment
//! becomes the active journal segment, so `(segment_seq, paddr)` orders records
//! totally even across wrap-around of the physical pool.
//!
//! ## Null Sentinels
//!
//! `SEGMENT_SEQ_NULL` is `u64::MAX` on purpose: the replay skip rule compares
//! provider-reported sequences against the segment being replayed, and the
//! sentinel must sort above every real sequence.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical segment identity within the pool.
pub type SegmentId = u32;

/// Monotonically increasing journal segment sequence number.
pub type SegmentSeq = u64;

/// Sentinel segment id meaning "no segment".
pub const NULL_SEG_ID: SegmentId = SegmentId::MAX;

/// Sentinel sequence; sorts above every real sequence.
pub const SEGMENT_SEQ_NULL: SegmentSeq = SegmentSeq::MAX;

/// A physical address: a byte position within a segment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PAddr {
    /// Physical segment id.
    pub segment: SegmentId,

    /// Byte offset within the segment.
    pub offset: u64,
}

impl PAddr {
    /// The "no address" sentinel.
    pub const NULL: PAddr = PAddr {
        segment: NULL_SEG_ID,
        offset: u64::MAX,
    };

    pub fn new(segment: SegmentId, offset: u64) -> Self {
        Self { segment, offset }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Returns this address advanced by `bytes` within the same segment.
    pub fn add_offset(self, bytes: u64) -> Self {
        debug_assert!(!self.is_null(), "add_offset on null paddr");
        Self {
            segment: self.segment,
            offset: self.offset + bytes,
        }
    }
}

impl fmt::Display for PAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "paddr(NULL)")
        } else {
            write!(f, "paddr({}:{})", self.segment, self.offset)
        }
    }
}

/// A journal sequence position: `(segment_seq, paddr)`.
///
/// Ordering is derived field-by-field, which matches the replay order:
/// first by segment sequence, then by physical position within the segment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct JSeq {
    /// Sequence of the segment holding (or preceding) this position.
    pub segment_seq: SegmentSeq,

    /// Physical position of the record, or a point inside one.
    pub offset: PAddr,
}

impl JSeq {
    /// The "no position" sentinel.
    pub const NULL: JSeq = JSeq {
        segment_seq: SEGMENT_SEQ_NULL,
        offset: PAddr::NULL,
    };

    pub fn new(segment_seq: SegmentSeq, offset: PAddr) -> Self {
        Self {
            segment_seq,
            offset,
        }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for JSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "jseq(NULL)")
        } else {
            write!(f, "jseq(seq={}, {})", self.segment_seq, self.offset)
        }
    }
}
