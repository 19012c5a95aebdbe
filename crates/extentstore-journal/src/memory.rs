//! In-Memory Segment Pool and Provider
//!
//! A `Vec`-backed segment manager and a minimal provider, used by the test
//! suite and by embedders that want journal semantics without touching disk.
//! The manager supports out-of-band mutation (`poke`, `zero_range`) and read
//! fault injection so crash and corruption scenarios can be staged.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use extentstore_core::{
    Error, JSeq, PAddr, Result, SegmentId, SegmentSeq, SEGMENT_SEQ_NULL,
};

use crate::provider::SegmentProvider;
use crate::segment::{Segment, SegmentManager};

#[derive(Debug)]
struct SegmentState {
    data: Vec<u8>,
    written_to: u64,
    open: bool,
    fail_reads: bool,
}

#[derive(Debug)]
struct PoolInner {
    segments: Vec<SegmentState>,
}

/// Segment pool held entirely in memory. Fresh segments read as zeroes.
pub struct MemorySegmentManager {
    block_size: u32,
    segment_size: u64,
    inner: Arc<Mutex<PoolInner>>,
}

impl MemorySegmentManager {
    pub fn new(block_size: u32, segment_size: u64, num_segments: u64) -> Self {
        let segments = (0..num_segments)
            .map(|_| SegmentState {
                data: vec![0u8; segment_size as usize],
                written_to: 0,
                open: false,
                fail_reads: false,
            })
            .collect();
        Self {
            block_size,
            segment_size,
            inner: Arc::new(Mutex::new(PoolInner { segments })),
        }
    }

    /// Overwrite one byte, bypassing the append discipline. Test hook for
    /// staging corruption.
    pub fn poke(&self, segment: SegmentId, offset: u64, value: u8) {
        let mut inner = self.inner.lock().unwrap();
        inner.segments[segment as usize].data[offset as usize] = value;
    }

    /// Zero a byte range, bypassing the append discipline. Test hook for
    /// staging torn writes.
    pub fn zero_range(&self, segment: SegmentId, offset: u64, len: u64) {
        let mut inner = self.inner.lock().unwrap();
        let data = &mut inner.segments[segment as usize].data;
        data[offset as usize..(offset + len) as usize].fill(0);
    }

    /// Make every read of `segment` fail. Test hook.
    pub fn set_read_error(&self, segment: SegmentId, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.segments[segment as usize].fail_reads = fail;
    }
}

#[async_trait]
impl SegmentManager for MemorySegmentManager {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn segment_size(&self) -> u64 {
        self.segment_size
    }

    fn num_segments(&self) -> u64 {
        self.inner.lock().unwrap().segments.len() as u64
    }

    async fn read(&self, addr: PAddr, len: u32) -> Result<Bytes> {
        let inner = self.inner.lock().unwrap();
        let state = inner
            .segments
            .get(addr.segment as usize)
            .ok_or_else(|| io_error("read outside segment pool"))?;
        if state.fail_reads {
            return Err(io_error("injected read failure"));
        }
        let end = addr.offset + len as u64;
        if end > self.segment_size {
            return Err(io_error("read past segment end"));
        }
        Ok(Bytes::copy_from_slice(
            &state.data[addr.offset as usize..end as usize],
        ))
    }

    async fn open(&self, segment: SegmentId) -> Result<Box<dyn Segment>> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .segments
            .get_mut(segment as usize)
            .ok_or(Error::SegmentNotFound(segment))?;
        state.open = true;
        // Opening starts a fresh write lifecycle, recycled segments included.
        state.written_to = 0;
        Ok(Box::new(MemorySegment {
            id: segment,
            segment_size: self.segment_size,
            inner: Arc::clone(&self.inner),
        }))
    }
}

#[derive(Debug)]
struct MemorySegment {
    id: SegmentId,
    segment_size: u64,
    inner: Arc<Mutex<PoolInner>>,
}

#[async_trait]
impl Segment for MemorySegment {
    fn segment_id(&self) -> SegmentId {
        self.id
    }

    fn write_ptr(&self) -> u64 {
        self.inner.lock().unwrap().segments[self.id as usize].written_to
    }

    fn write_capacity(&self) -> u64 {
        self.segment_size
    }

    async fn write(&mut self, offset: u64, data: Bytes) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = &mut inner.segments[self.id as usize];
        if !state.open {
            return Err(io_error("write to closed segment"));
        }
        if offset != state.written_to {
            return Err(io_error("non-append write"));
        }
        let end = offset + data.len() as u64;
        if end > self.segment_size {
            return Err(io_error("write past segment end"));
        }
        state.data[offset as usize..end as usize].copy_from_slice(&data);
        state.written_to = end;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.segments[self.id as usize].open = false;
        Ok(())
    }
}

fn io_error(msg: &str) -> Error {
    Error::Io(io::Error::other(msg.to_string()))
}

struct ProviderInner {
    num_segments: u64,
    next_segment: SegmentId,
    seqs: HashMap<SegmentId, SegmentSeq>,
    closed: Vec<SegmentId>,
    journal_segment: Option<(SegmentId, SegmentSeq)>,
    tail_target: JSeq,
    committed_tail: JSeq,
}

/// Minimal provider: allocates segments in ascending id order and tracks
/// the state the journal reports back.
pub struct MemorySegmentProvider {
    inner: Mutex<ProviderInner>,
}

impl MemorySegmentProvider {
    pub fn new(num_segments: u64) -> Self {
        Self {
            inner: Mutex::new(ProviderInner {
                num_segments,
                next_segment: 0,
                seqs: HashMap::new(),
                closed: Vec::new(),
                journal_segment: None,
                tail_target: JSeq::NULL,
                committed_tail: JSeq::NULL,
            }),
        }
    }

    /// Set the tail advertised in the next segment header.
    pub fn set_journal_tail_target(&self, tail: JSeq) {
        self.inner.lock().unwrap().tail_target = tail;
    }

    /// Force the tracked sequence of a segment. Test hook for staging
    /// rewritten-extent scenarios.
    pub fn set_seq(&self, segment: SegmentId, seq: SegmentSeq) {
        self.inner.lock().unwrap().seqs.insert(segment, seq);
    }

    /// The most recent durably committed tail.
    pub fn committed_tail(&self) -> JSeq {
        self.inner.lock().unwrap().committed_tail
    }

    /// Segments reported closed, in order.
    pub fn closed_segments(&self) -> Vec<SegmentId> {
        self.inner.lock().unwrap().closed.clone()
    }

    /// The segment currently hosting the journal, if any.
    pub fn journal_segment(&self) -> Option<(SegmentId, SegmentSeq)> {
        self.inner.lock().unwrap().journal_segment
    }
}

impl SegmentProvider for MemorySegmentProvider {
    fn get_segment(&self) -> Result<SegmentId> {
        let mut inner = self.inner.lock().unwrap();
        if inner.next_segment as u64 >= inner.num_segments {
            return Err(io_error("segment pool exhausted"));
        }
        let id = inner.next_segment;
        inner.next_segment += 1;
        Ok(id)
    }

    fn close_segment(&self, segment: SegmentId) {
        self.inner.lock().unwrap().closed.push(segment);
    }

    fn set_journal_segment(&self, segment: SegmentId, seq: SegmentSeq) {
        let mut inner = self.inner.lock().unwrap();
        inner.journal_segment = Some((segment, seq));
        inner.seqs.insert(segment, seq);
    }

    fn init_mark_segment_closed(&self, segment: SegmentId, seq: SegmentSeq) {
        let mut inner = self.inner.lock().unwrap();
        inner.seqs.insert(segment, seq);
        inner.closed.push(segment);
        // Keep allocation clear of recovered journal segments.
        if segment >= inner.next_segment {
            inner.next_segment = segment + 1;
        }
    }

    fn get_seq(&self, segment: SegmentId) -> SegmentSeq {
        self.inner
            .lock()
            .unwrap()
            .seqs
            .get(&segment)
            .copied()
            .unwrap_or(SEGMENT_SEQ_NULL)
    }

    fn get_journal_tail_target(&self) -> JSeq {
        self.inner.lock().unwrap().tail_target
    }

    fn update_journal_tail_committed(&self, tail: JSeq) {
        self.inner.lock().unwrap().committed_tail = tail;
    }
}
