//! Journal Instance and Write Path
//!
//! A [`Journal`] is created with shared references to a segment manager and
//! a segment provider, then used in one of two modes: `open_for_write`
//! (fresh write path, rolls a new active segment) or `replay` (read path,
//! see the replay module).
//!
//! The write path is single-producer: `submit` takes `&mut self` and must
//! not be invoked concurrently with itself. Records are appended at the
//! `written_to` cursor of the active segment; when a record would exceed the
//! segment's capacity the journal rolls to a fresh segment first and the
//! record lands there.
//!
//! Any I/O error during a roll is fatal to the journal instance: the
//! active segment handle is gone and `submit` cannot be retried.

use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, info};

use extentstore_core::record::{align_up, encode_record, encoded_length};
use extentstore_core::{JSeq, PAddr, Record, Result, SegmentHeader, SegmentSeq};

use crate::provider::SegmentProvider;
use crate::segment::{Segment, SegmentManager};

/// Segment-structured write-ahead journal over an externally managed pool.
pub struct Journal {
    pub(crate) segment_manager: Arc<dyn SegmentManager>,
    pub(crate) segment_provider: Arc<dyn SegmentProvider>,

    pub(crate) block_size: u32,

    /// Largest encodable record: segment size minus the (block-aligned)
    /// segment header. Exceeding it is a caller bug.
    pub(crate) max_record_length: u64,

    pub(crate) current_segment: Option<Box<dyn Segment>>,
    pub(crate) written_to: u64,
    pub(crate) next_segment_seq: SegmentSeq,
}

impl Journal {
    pub fn new(
        segment_manager: Arc<dyn SegmentManager>,
        segment_provider: Arc<dyn SegmentProvider>,
    ) -> Self {
        let block_size = segment_manager.block_size();
        let max_record_length = segment_manager.segment_size()
            - align_up(SegmentHeader::ENCODED_SIZE as u64, block_size as u64);
        Self {
            segment_manager,
            segment_provider,
            block_size,
            max_record_length,
            current_segment: None,
            written_to: 0,
            next_segment_seq: 0,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Append cursor within the active segment.
    pub fn written_to(&self) -> u64 {
        self.written_to
    }

    /// Roll a fresh active segment and return the position the first record
    /// will occupy: `(segment_seq, (segment_id, block_size))`, immediately
    /// after the header block.
    pub async fn open_for_write(&mut self) -> Result<JSeq> {
        let seq = self.roll_segment().await?;
        let segment = self
            .current_segment
            .as_ref()
            .expect("roll_segment leaves an active segment");
        let start = PAddr::new(segment.segment_id(), self.block_size as u64);
        info!(segment = segment.segment_id(), seq, "journal open for write");
        Ok(JSeq::new(seq, start))
    }

    /// Append one record, rolling to a new segment first if it does not fit
    /// in the active one. Returns the record's physical address.
    ///
    /// Panics if the record cannot fit in any segment, or if the journal was
    /// never opened for write. Both are caller bugs.
    pub async fn submit(&mut self, record: Record) -> Result<PAddr> {
        let rsize = encoded_length(&record, self.block_size);
        let length = rsize.total();
        assert!(
            length <= self.max_record_length,
            "record of {} bytes exceeds segment capacity {}",
            length,
            self.max_record_length
        );
        assert!(
            self.current_segment.is_some(),
            "submit before open_for_write"
        );

        if self.needs_roll(length) {
            self.roll_segment().await?;
        }

        let target = self.written_to;
        self.written_to += length;

        let buf = encode_record(&record, rsize, self.block_size);
        debug!(
            mdlength = rsize.mdlength,
            dlength = rsize.dlength,
            target,
            "writing journal record"
        );
        let segment = self
            .current_segment
            .as_mut()
            .expect("active segment present");
        segment.write(target, buf).await?;
        Ok(PAddr::new(segment.segment_id(), target))
    }

    fn needs_roll(&self, length: u64) -> bool {
        let segment = self
            .current_segment
            .as_ref()
            .expect("active segment present");
        self.written_to + length > segment.write_capacity()
    }

    /// Close the active segment (if any), allocate and open a fresh one,
    /// stamp it with the next sequence, and tell the provider about the
    /// transition.
    pub(crate) async fn roll_segment(&mut self) -> Result<SegmentSeq> {
        let old_segment_id = match self.current_segment.take() {
            Some(mut segment) => {
                segment.close().await?;
                Some(segment.segment_id())
            }
            None => None,
        };

        let new_segment_id = self.segment_provider.get_segment()?;
        let mut segment = self.segment_manager.open(new_segment_id).await?;
        debug_assert_eq!(segment.write_ptr(), 0);
        self.written_to = 0;

        let seq = self.next_segment_seq;
        self.next_segment_seq += 1;

        let journal_tail = self.segment_provider.get_journal_tail_target();
        let header = SegmentHeader {
            segment_seq: seq,
            physical_segment_id: new_segment_id,
            journal_tail,
        };
        debug!(
            segment = new_segment_id,
            seq,
            tail = %journal_tail,
            "initializing journal segment"
        );

        let mut buf = BytesMut::with_capacity(self.block_size as usize);
        header.encode(&mut buf);
        buf.resize(self.block_size as usize, 0);
        segment.write(0, buf.freeze()).await?;
        self.written_to = self.block_size as u64;

        self.segment_provider.update_journal_tail_committed(journal_tail);
        if let Some(old) = old_segment_id {
            self.segment_provider.close_segment(old);
        }
        self.segment_provider
            .set_journal_segment(new_segment_id, seq);

        self.current_segment = Some(segment);
        Ok(seq)
    }
}
