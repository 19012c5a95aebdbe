//! Segment Manager Interface
//!
//! The journal does not own storage. Raw block I/O on the fixed-size segment
//! pool belongs to an external *segment manager*; these traits define the
//! minimum surface the journal consumes from it.
//!
//! The manager performs no buffering: the journal drives alignment and
//! issues one write per record (and one per segment header). Geometry
//! accessors are synchronous; only `read`, `open`, `write`, and `close`
//! touch media and suspend.
//!
//! Two implementations ship with this crate: [`MemorySegmentManager`] for
//! tests and embedders that keep the pool in RAM, and [`FileSegmentManager`]
//! backed by one preallocated file per segment.
//!
//! [`MemorySegmentManager`]: crate::memory::MemorySegmentManager
//! [`FileSegmentManager`]: crate::file::FileSegmentManager

use async_trait::async_trait;
use bytes::Bytes;
use extentstore_core::{PAddr, Result, SegmentId};

/// Raw block I/O on the segment pool.
#[async_trait]
pub trait SegmentManager: Send + Sync {
    /// I/O alignment granularity; record offsets and metadata lengths are
    /// multiples of this.
    fn block_size(&self) -> u32;

    /// Size of every segment in the pool, in bytes.
    fn segment_size(&self) -> u64;

    /// Number of segments in the pool.
    fn num_segments(&self) -> u64;

    /// Read `len` bytes at `addr`. Fails with [`Error::Io`] on any
    /// underlying error; reads of never-written ranges inside a segment
    /// return whatever the media holds (zeroes, for a fresh pool).
    ///
    /// [`Error::Io`]: extentstore_core::Error::Io
    async fn read(&self, addr: PAddr, len: u32) -> Result<Bytes>;

    /// Open a segment for appending. Fails with [`Error::SegmentNotFound`]
    /// if `segment` is outside the pool.
    ///
    /// [`Error::SegmentNotFound`]: extentstore_core::Error::SegmentNotFound
    async fn open(&self, segment: SegmentId) -> Result<Box<dyn Segment>>;
}

/// An open segment. Exclusively owned by whoever opened it; the journal
/// holds the active segment's handle for the duration of its write phase.
#[async_trait]
pub trait Segment: Send + std::fmt::Debug {
    fn segment_id(&self) -> SegmentId;

    /// Current append position.
    fn write_ptr(&self) -> u64;

    /// Total writable bytes in this segment.
    fn write_capacity(&self) -> u64;

    /// Append `data` at `offset`. Writes must land exactly at the current
    /// write pointer; segments are append-only.
    async fn write(&mut self, offset: u64, data: Bytes) -> Result<()>;

    /// Close the segment for writing; the data becomes read-only.
    async fn close(&mut self) -> Result<()>;
}
