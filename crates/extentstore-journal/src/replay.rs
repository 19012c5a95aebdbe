//! Replay Coordinator
//!
//! Recovery is two-phase. Discovery (`find_replay_segments`) reads every
//! segment's header block, keeps the ones that decode, sorts them by
//! sequence, re-populates the provider's registry, and resolves where replay
//! starts: either the journal tail recorded in the newest header, or the
//! beginning of the oldest segment. Replay then walks each segment in
//! sequence order, delivering deltas to the caller's handler.
//!
//! ## The Skip Rule
//!
//! The journal may validly contain deltas for extents in since-released
//! segments. Those cases are detected by the target segment currently
//! carrying a sequence *newer* than the segment being replayed: the extent
//! must already have been rewritten, so its current state supersedes the
//! delta and the delta is dropped. The comparison exploits
//! `SEGMENT_SEQ_NULL` sorting above every real sequence.

use tracing::{debug, info};

use extentstore_core::{
    DeltaInfo, Error, ExtentInfo, JSeq, PAddr, Result, SegmentHeader, SegmentId,
};

use crate::journal::Journal;

/// Replay callback: `(position, base, delta)` where `position` orders the
/// record across the whole journal and `base` is the address of the
/// record's first extent payload.
pub type ReplayHandler<'a> = dyn FnMut(JSeq, PAddr, &DeltaInfo) -> Result<()> + 'a;

impl Journal {
    /// Enumerate the pool, recover segment ordering, and return the replay
    /// positions in ascending sequence order. The first entry's offset is
    /// the exact replay start; later entries start just past their headers.
    ///
    /// Also advances the journal's own sequence counter past the newest
    /// on-disk segment and re-populates the provider, so a subsequent
    /// `open_for_write` continues the sequence space.
    pub async fn find_replay_segments(&mut self) -> Result<Vec<JSeq>> {
        let block_size = self.block_size as u64;
        let mut segments: Vec<(SegmentId, SegmentHeader)> = Vec::new();

        for id in 0..self.segment_manager.num_segments() {
            let id = id as SegmentId;
            let addr = PAddr::new(id, 0);
            let block = match self.segment_manager.read(addr, self.block_size).await {
                Ok(block) => block,
                Err(err) => {
                    debug!(segment = id, %err, "segment unreadable, skipping");
                    continue;
                }
            };
            debug!(
                segment = id,
                crc = crc32fast::hash(&block),
                "read candidate segment header block"
            );
            match SegmentHeader::decode(&mut &block[..]) {
                Some(header) => {
                    debug!(segment = id, %header, "found journal segment");
                    segments.push((id, header));
                }
                None => {
                    debug!(segment = id, "unable to decode segment header, skipping");
                }
            }
        }

        if segments.is_empty() {
            return Err(Error::NoJournalSegments);
        }
        segments.sort_by_key(|(_, header)| header.segment_seq);

        self.next_segment_seq = segments.last().unwrap().1.segment_seq + 1;
        for (id, header) in &segments {
            self.segment_provider
                .init_mark_segment_closed(*id, header.segment_seq);
        }

        let journal_tail = segments.last().unwrap().1.journal_tail;
        self.segment_provider.update_journal_tail_committed(journal_tail);
        debug!(tail = %journal_tail, "recovered journal tail");

        let mut replay_from = journal_tail.offset;
        let from = if !replay_from.is_null() {
            let from = segments
                .iter()
                .position(|(id, _)| *id == replay_from.segment)
                .unwrap_or_else(|| {
                    panic!("journal tail {journal_tail} references a segment with no header")
                });
            assert_eq!(
                segments[from].1.segment_seq, journal_tail.segment_seq,
                "journal tail {} does not match {}",
                journal_tail, segments[from].1
            );
            from
        } else {
            replay_from = PAddr::new(segments[0].0, block_size);
            0
        };

        let mut ret: Vec<JSeq> = segments[from..]
            .iter()
            .map(|(id, header)| {
                JSeq::new(header.segment_seq, PAddr::new(*id, block_size))
            })
            .collect();
        ret[0].offset = replay_from;
        for seq in &ret {
            debug!(from = %seq, "will replay");
        }
        Ok(ret)
    }

    /// Replay the journal in sequence order, delivering each surviving delta
    /// to `handler`. Restartable and idempotent: replaying twice without
    /// intervening writes yields identical handler invocations.
    pub async fn replay(&mut self, handler: &mut ReplayHandler<'_>) -> Result<()> {
        let segments = self.find_replay_segments().await?;
        debug!(count = segments.len(), "replaying journal segments");
        for seq in segments {
            self.replay_segment(seq, handler).await?;
        }
        info!("journal replay complete");
        Ok(())
    }

    async fn replay_segment(&self, seq: JSeq, handler: &mut ReplayHandler<'_>) -> Result<()> {
        debug!(segment = %seq, "replaying segment");
        let provider = &self.segment_provider;
        let mut scan_handler = |record_start: PAddr, base: PAddr, delta: &DeltaInfo| {
            // A target segment carrying a newer sequence than the one being
            // replayed has been rewritten since this record was journaled;
            // the delta is stale. SEGMENT_SEQ_NULL sorts above every real
            // sequence, so deltas into untracked segments are skipped too.
            if !delta.paddr.is_null() && provider.get_seq(delta.paddr.segment) > seq.segment_seq
            {
                debug!(record = %record_start, target = %delta.paddr, "skipping stale delta");
                return Ok(());
            }
            handler(JSeq::new(seq.segment_seq, record_start), base, delta)
        };
        self.scan_segment(
            seq.offset,
            self.segment_manager.segment_size(),
            Some(&mut scan_handler),
            None,
        )
        .await?;
        Ok(())
    }

    /// Enumerate extent payloads without replaying deltas. An `offset` of 0
    /// is rewritten to the first record position (past the segment header);
    /// otherwise the walk starts exactly at `addr`.
    pub async fn scan_extents(
        &self,
        addr: PAddr,
        bytes_to_read: u64,
    ) -> Result<(PAddr, Vec<(PAddr, ExtentInfo)>)> {
        let mut addr = addr;
        if addr.offset == 0 {
            addr.offset = self.block_size as u64;
        }

        let mut extents = Vec::new();
        let mut handler = |payload_addr: PAddr, info: &ExtentInfo| {
            extents.push((payload_addr, *info));
            Ok(())
        };
        let next = self
            .scan_segment(addr, bytes_to_read, None, Some(&mut handler))
            .await?;
        Ok((next, extents))
    }
}
