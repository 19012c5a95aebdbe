//! Journal Record Format
//!
//! This module implements the binary on-disk format for journal segments and
//! the records appended to them.
//!
//! ## Segment Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Segment header (encoded, zero-padded to block_size)         │
//! │ - Magic bytes: "XSEG" (4 bytes)                             │
//! │ - Version (2 bytes)                                         │
//! │ - Segment sequence (8 bytes)                                │
//! │ - Physical segment id (4 bytes)                             │
//! │ - Journal tail: seq + paddr (20 bytes)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Record 0                                                    │
//! │ ├─ metadata region (mdlength bytes, block-aligned):         │
//! │ │    record header │ extent info × E │ delta info × D │ pad │
//! │ └─ data region (dlength bytes, block-aligned):              │
//! │      extent payload 0 ‖ extent payload 1 ‖ …                │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Record 1                                                    │
//! │ …                                                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The record header, and each extent
//! descriptor, use a bounded (fixed-size) encoding; delta descriptors use a
//! variable encoding with a varint-prefixed payload. Only the segment header
//! carries a magic and format version; records are framed purely by the
//! lengths their headers declare.
//!
//! ## Decode Is Two-Phase
//!
//! There is deliberately no single-shot record decode here. The scanner must
//! first read one block and decode just the header to learn `mdlength`, then
//! optionally fetch the rest of the metadata region; the descriptor decoders
//! (`decode_extent_infos`, `decode_delta_infos`) operate on the assembled
//! metadata region afterwards.
//!
//! ## Validation as Torn-Tail Detection
//!
//! Records carry no magic, so `RecordHeader::decode` validates framing
//! instead: `mdlength` must be a nonzero multiple of the block size and the
//! declared descriptor counts must fit inside it. A zeroed or partially
//! written block at the tail of a crashed segment fails these checks, which
//! is how the scanner recognizes the end of a segment's valid data.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::addr::{JSeq, PAddr, SegmentId, SegmentSeq};
use crate::varint::{decode_varint_u64, encode_varint_u64, varint_len_u64};

/// Magic bytes at the start of every journal segment: "XSEG"
pub const SEGMENT_MAGIC: [u8; 4] = *b"XSEG";

/// Format version stamped in each segment header.
pub const SEGMENT_VERSION: u16 = 1;

/// Round `value` up to the next multiple of `alignment`.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Header written at offset 0 of every journal segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Sequence stamped when this segment became the active journal segment.
    pub segment_seq: SegmentSeq,

    /// Redundant physical identity, kept for corruption diagnostics.
    pub physical_segment_id: SegmentId,

    /// The position below which the owner asserts no live data remains;
    /// replay starts here.
    pub journal_tail: JSeq,
}

impl SegmentHeader {
    /// Encoded size: magic + version + seq + id + tail.
    pub const ENCODED_SIZE: usize = 4 + 2 + 8 + 4 + 20;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&SEGMENT_MAGIC);
        buf.put_u16_le(SEGMENT_VERSION);
        buf.put_u64_le(self.segment_seq);
        buf.put_u32_le(self.physical_segment_id);
        buf.put_u64_le(self.journal_tail.segment_seq);
        buf.put_u32_le(self.journal_tail.offset.segment);
        buf.put_u64_le(self.journal_tail.offset.offset);
    }

    /// Decode a segment header; `None` if the buffer is too short or the
    /// magic/version do not match (an unformatted or torn segment).
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::ENCODED_SIZE {
            return None;
        }
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != SEGMENT_MAGIC {
            return None;
        }
        if buf.get_u16_le() != SEGMENT_VERSION {
            return None;
        }
        let segment_seq = buf.get_u64_le();
        let physical_segment_id = buf.get_u32_le();
        let tail_seq = buf.get_u64_le();
        let tail_segment = buf.get_u32_le();
        let tail_offset = buf.get_u64_le();
        Some(Self {
            segment_seq,
            physical_segment_id,
            journal_tail: JSeq::new(tail_seq, PAddr::new(tail_segment, tail_offset)),
        })
    }
}

impl fmt::Display for SegmentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segment_header(seq={}, segment={}, journal_tail={})",
            self.segment_seq, self.physical_segment_id, self.journal_tail
        )
    }
}

/// Header at the beginning of each record's metadata region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Total metadata length: header + descriptors + zero padding, a
    /// multiple of the block size.
    pub mdlength: u32,

    /// Total payload length; block-aligned by construction.
    pub dlength: u32,

    /// Reserved; written as zero and never verified.
    pub checksum: u64,

    /// Number of delta descriptors following the extent descriptors.
    pub deltas: u32,

    /// Number of extent descriptors following this header.
    pub extents: u32,
}

impl RecordHeader {
    pub const ENCODED_SIZE: usize = 4 + 4 + 8 + 4 + 4;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.mdlength);
        buf.put_u32_le(self.dlength);
        buf.put_u64_le(self.checksum);
        buf.put_u32_le(self.deltas);
        buf.put_u32_le(self.extents);
    }

    /// Decode and validate a record header.
    ///
    /// `None` means the bytes cannot be a committed record header: too few
    /// bytes, `mdlength` zero or unaligned, `dlength` unaligned, or declared
    /// descriptor counts that cannot fit in `mdlength`. The scanner treats
    /// `None` on the first block of a candidate record as the torn tail of
    /// the segment.
    pub fn decode(buf: &mut impl Buf, block_size: u32) -> Option<Self> {
        if buf.remaining() < Self::ENCODED_SIZE {
            return None;
        }
        let mdlength = buf.get_u32_le();
        let dlength = buf.get_u32_le();
        let checksum = buf.get_u64_le();
        let deltas = buf.get_u32_le();
        let extents = buf.get_u32_le();

        if mdlength == 0 || mdlength % block_size != 0 {
            return None;
        }
        if dlength % block_size != 0 {
            return None;
        }
        // The bounded parts plus each delta's minimum size must fit.
        let min_metadata = Self::ENCODED_SIZE as u64
            + extents as u64 * ExtentInfo::ENCODED_SIZE as u64
            + deltas as u64 * DeltaInfo::MIN_ENCODED_SIZE as u64;
        if min_metadata > mdlength as u64 {
            return None;
        }

        Some(Self {
            mdlength,
            dlength,
            checksum,
            deltas,
            extents,
        })
    }
}

/// Descriptor of a new physical payload carried in a record's data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentInfo {
    /// Logical address the extent belongs to.
    pub laddr: u64,

    /// Payload length in bytes; block-aligned.
    pub len: u32,
}

impl ExtentInfo {
    pub const ENCODED_SIZE: usize = 8 + 4;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.laddr);
        buf.put_u32_le(self.len);
    }

    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::ENCODED_SIZE {
            return None;
        }
        Some(Self {
            laddr: buf.get_u64_le(),
            len: buf.get_u32_le(),
        })
    }
}

/// A logical mutation against an existing extent.
///
/// `paddr` is the physical address of the target extent, or `PAddr::NULL`
/// for deltas that do not bind to one. The payload is opaque to the journal
/// and decoded per `kind` by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaInfo {
    /// Target extent, possibly `PAddr::NULL`.
    pub paddr: PAddr,

    /// Logical address the mutation applies to.
    pub laddr: u64,

    /// Caller-defined payload discriminator.
    pub kind: u8,

    /// Opaque per-kind payload.
    pub payload: Bytes,
}

impl DeltaInfo {
    /// Bounded prefix plus a one-byte varint for an empty payload.
    pub const MIN_ENCODED_SIZE: usize = 4 + 8 + 8 + 1 + 1;

    pub fn encoded_len(&self) -> usize {
        4 + 8 + 8 + 1 + varint_len_u64(self.payload.len() as u64) + self.payload.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.paddr.segment);
        buf.put_u64_le(self.paddr.offset);
        buf.put_u64_le(self.laddr);
        buf.put_u8(self.kind);
        encode_varint_u64(buf, self.payload.len() as u64);
        buf.put_slice(&self.payload);
    }

    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::MIN_ENCODED_SIZE - 1 {
            return None;
        }
        let segment = buf.get_u32_le();
        let offset = buf.get_u64_le();
        let laddr = buf.get_u64_le();
        let kind = buf.get_u8();
        let len = decode_varint_u64(buf)?;
        if buf.remaining() < len as usize {
            return None;
        }
        let payload = buf.copy_to_bytes(len as usize);
        Some(Self {
            paddr: PAddr::new(segment, offset),
            laddr,
            kind,
            payload,
        })
    }
}

/// A new extent: its descriptor plus the payload bytes destined for the
/// record's data region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    pub info: ExtentInfo,
    pub payload: Bytes,
}

impl Extent {
    pub fn new(laddr: u64, payload: Bytes) -> Self {
        Self {
            info: ExtentInfo {
                laddr,
                len: payload.len() as u32,
            },
            payload,
        }
    }
}

/// One atomic journal entry: extent writes plus logical deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub extents: Vec<Extent>,
    pub deltas: Vec<DeltaInfo>,
}

impl Record {
    pub fn new(extents: Vec<Extent>, deltas: Vec<DeltaInfo>) -> Self {
        Self { extents, deltas }
    }
}

/// Encoded size of a record, split into its two on-disk regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSize {
    pub mdlength: u32,
    pub dlength: u32,
}

impl RecordSize {
    pub fn total(&self) -> u64 {
        self.mdlength as u64 + self.dlength as u64
    }
}

/// Compute the encoded size of `record`.
///
/// The metadata length covers the record header, the bounded extent
/// descriptors, and the variable delta descriptors, rounded up to the block
/// size. The data length is the sum of the extent payloads, which the caller
/// supplies block-aligned.
pub fn encoded_length(record: &Record, block_size: u32) -> RecordSize {
    let mut metadata = RecordHeader::ENCODED_SIZE as u64
        + record.extents.len() as u64 * ExtentInfo::ENCODED_SIZE as u64;
    for delta in &record.deltas {
        metadata += delta.encoded_len() as u64;
    }
    let mut data = 0u64;
    for extent in &record.extents {
        data += extent.payload.len() as u64;
    }
    RecordSize {
        mdlength: align_up(metadata, block_size as u64) as u32,
        dlength: data as u32,
    }
}

/// Encode `record` into a single contiguous buffer of exactly
/// `rsize.mdlength + rsize.dlength` bytes: header, extent descriptors, delta
/// descriptors, zero padding to `mdlength`, then the extent payloads in
/// descriptor order.
///
/// Panics if an extent payload is not block-aligned or does not match its
/// descriptor length; those are caller bugs, not recoverable conditions.
pub fn encode_record(record: &Record, rsize: RecordSize, block_size: u32) -> Bytes {
    for extent in &record.extents {
        assert_eq!(
            extent.payload.len(),
            extent.info.len as usize,
            "extent payload does not match descriptor length"
        );
        assert_eq!(
            extent.payload.len() % block_size as usize,
            0,
            "extent payload is not block-aligned"
        );
    }

    let header = RecordHeader {
        mdlength: rsize.mdlength,
        dlength: rsize.dlength,
        checksum: 0,
        deltas: record.deltas.len() as u32,
        extents: record.extents.len() as u32,
    };

    let mut buf = BytesMut::with_capacity(rsize.total() as usize);
    header.encode(&mut buf);
    for extent in &record.extents {
        extent.info.encode(&mut buf);
    }
    for delta in &record.deltas {
        delta.encode(&mut buf);
    }
    assert!(buf.len() <= rsize.mdlength as usize);
    buf.resize(rsize.mdlength as usize, 0);
    for extent in &record.extents {
        buf.put_slice(&extent.payload);
    }
    assert_eq!(buf.len() as u64, rsize.total());
    buf.freeze()
}

/// Decode exactly `header.extents` extent descriptors out of an assembled
/// metadata region. `None` on any descriptor decode failure.
pub fn decode_extent_infos(header: &RecordHeader, metadata: &[u8]) -> Option<Vec<ExtentInfo>> {
    let mut buf = metadata.get(RecordHeader::ENCODED_SIZE..)?;
    let mut infos = Vec::with_capacity(header.extents as usize);
    for _ in 0..header.extents {
        infos.push(ExtentInfo::decode(&mut buf)?);
    }
    Some(infos)
}

/// Decode exactly `header.deltas` delta descriptors out of an assembled
/// metadata region. `None` on any descriptor decode failure.
pub fn decode_delta_infos(header: &RecordHeader, metadata: &[u8]) -> Option<Vec<DeltaInfo>> {
    let start =
        RecordHeader::ENCODED_SIZE + header.extents as usize * ExtentInfo::ENCODED_SIZE;
    let mut buf = metadata.get(start..)?;
    let mut deltas = Vec::with_capacity(header.deltas as usize);
    for _ in 0..header.deltas {
        deltas.push(DeltaInfo::decode(&mut buf)?);
    }
    Some(deltas)
}
