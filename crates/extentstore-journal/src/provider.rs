//! Segment Provider Interface
//!
//! The *segment provider* is the collaborator that decides which physical
//! segment hosts the journal next and tracks per-segment state (sequence
//! numbers, closed/open, the journal tail). It is shared with other
//! subsystems (the allocator and transaction layers consult the same
//! registry) and is responsible for its own synchronization, which is why
//! every method takes `&self`.
//!
//! Provider calls are bookkeeping, not I/O: none of them suspend. The
//! journal's only suspension points are segment-manager operations.

use extentstore_core::{JSeq, Result, SegmentId, SegmentSeq};

/// Registry of segment state consumed by the journal.
pub trait SegmentProvider: Send + Sync {
    /// Allocate the next physical segment to become the active journal
    /// segment.
    fn get_segment(&self) -> Result<SegmentId>;

    /// A previously active segment is now read-only.
    fn close_segment(&self, segment: SegmentId);

    /// Record which physical segment currently hosts `seq`.
    fn set_journal_segment(&self, segment: SegmentId, seq: SegmentSeq);

    /// Re-populate provider state from an on-disk segment header during
    /// replay discovery.
    fn init_mark_segment_closed(&self, segment: SegmentId, seq: SegmentSeq);

    /// The sequence currently occupying `segment`, or [`SEGMENT_SEQ_NULL`]
    /// for segments the provider does not track. The sentinel sorts above
    /// every real sequence, which the replay skip rule relies on.
    ///
    /// [`SEGMENT_SEQ_NULL`]: extentstore_core::SEGMENT_SEQ_NULL
    fn get_seq(&self, segment: SegmentId) -> SegmentSeq;

    /// The tail the journal should advertise in the next segment header.
    fn get_journal_tail_target(&self) -> JSeq;

    /// A tail value is now durably recorded in a segment header.
    fn update_journal_tail_committed(&self, tail: JSeq);
}
