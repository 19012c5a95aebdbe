//! End-to-end write/replay scenarios against the in-memory segment pool.

use std::sync::Arc;

use bytes::Bytes;

use extentstore_core::record::encoded_length;
use extentstore_core::{
    DeltaInfo, Error, Extent, JSeq, PAddr, Record, RecordHeader, SegmentHeader,
};
use extentstore_journal::{Journal, MemorySegmentManager, MemorySegmentProvider, SegmentManager};

const BLOCK: u32 = 4096;
const SEGMENT: u64 = 65536;
const POOL: u64 = 8;

fn setup() -> (Arc<MemorySegmentManager>, Arc<MemorySegmentProvider>, Journal) {
    let manager = Arc::new(MemorySegmentManager::new(BLOCK, SEGMENT, POOL));
    let provider = Arc::new(MemorySegmentProvider::new(POOL));
    let journal = Journal::new(manager.clone(), provider.clone());
    (manager, provider, journal)
}

/// A record that occupies exactly one metadata block: one delta, no extents.
fn delta_record(tag: u8, target: PAddr) -> Record {
    Record::new(
        vec![],
        vec![DeltaInfo {
            paddr: target,
            laddr: tag as u64,
            kind: 1,
            payload: Bytes::from(vec![tag; 32]),
        }],
    )
}

/// A record that occupies two blocks: one block-sized extent plus one delta.
fn mixed_record(tag: u8) -> Record {
    Record::new(
        vec![Extent::new(
            tag as u64 * 0x1000,
            Bytes::from(vec![tag; BLOCK as usize]),
        )],
        vec![DeltaInfo {
            paddr: PAddr::NULL,
            laddr: tag as u64,
            kind: 2,
            payload: Bytes::from(vec![tag; 8]),
        }],
    )
}

/// Replay with a fresh journal and provider (restart semantics), collecting
/// every delivered delta.
async fn collect_replay(
    manager: Arc<MemorySegmentManager>,
    provider: Arc<MemorySegmentProvider>,
) -> extentstore_core::Result<Vec<(JSeq, PAddr, DeltaInfo)>> {
    let mut journal = Journal::new(manager, provider);
    let mut collected = Vec::new();
    journal
        .replay(&mut |seq, base, delta| {
            collected.push((seq, base, delta.clone()));
            Ok(())
        })
        .await?;
    Ok(collected)
}

// ---------------------------------------------------------------
// S1: single record round-trip
// ---------------------------------------------------------------

#[tokio::test]
async fn single_record_roundtrip() {
    let (manager, _provider, mut journal) = setup();

    let start = journal.open_for_write().await.unwrap();
    assert_eq!(start, JSeq::new(0, PAddr::new(0, BLOCK as u64)));

    let record = delta_record(9, PAddr::NULL);
    let addr = journal.submit(record.clone()).await.unwrap();
    assert_eq!(addr, PAddr::new(0, 4096));

    // The on-disk record header sits right after the segment header block.
    let block = manager.read(addr, BLOCK).await.unwrap();
    let header = RecordHeader::decode(&mut &block[..], BLOCK).unwrap();
    assert_eq!(header.mdlength, 4096);
    assert_eq!(header.dlength, 0);
    assert_eq!(header.checksum, 0);
    assert_eq!(header.deltas, 1);
    assert_eq!(header.extents, 0);

    let replayed = collect_replay(manager, Arc::new(MemorySegmentProvider::new(POOL)))
        .await
        .unwrap();
    assert_eq!(replayed.len(), 1);
    let (seq, base, delta) = &replayed[0];
    assert_eq!(*seq, JSeq::new(0, PAddr::new(0, 4096)));
    assert_eq!(*base, PAddr::new(0, 8192));
    assert_eq!(*delta, record.deltas[0]);
}

#[tokio::test]
async fn segment_header_written_on_open() {
    let (manager, provider, mut journal) = setup();
    provider.set_journal_tail_target(JSeq::new(0, PAddr::new(0, 4096)));

    journal.open_for_write().await.unwrap();

    let block = manager.read(PAddr::new(0, 0), BLOCK).await.unwrap();
    let header = SegmentHeader::decode(&mut &block[..]).unwrap();
    assert_eq!(header.segment_seq, 0);
    assert_eq!(header.physical_segment_id, 0);
    assert_eq!(header.journal_tail, JSeq::new(0, PAddr::new(0, 4096)));

    // The header's tail value is the committed one.
    assert_eq!(provider.committed_tail(), header.journal_tail);
    assert_eq!(provider.journal_segment(), Some((0, 0)));
}

// ---------------------------------------------------------------
// S2: roll at capacity preserves submission order
// ---------------------------------------------------------------

#[tokio::test]
async fn roll_preserves_submission_order() {
    let (manager, provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();

    // Seven two-block records fill segment 0 up to 61440; the eighth
    // submit triggers a roll and lands in segment 1.
    for tag in 0..9u8 {
        journal.submit(mixed_record(tag)).await.unwrap();
    }

    assert_eq!(provider.journal_segment(), Some((1, 1)));
    assert_eq!(provider.closed_segments(), vec![0]);

    let replayed = collect_replay(manager, Arc::new(MemorySegmentProvider::new(POOL)))
        .await
        .unwrap();
    assert_eq!(replayed.len(), 9);
    for (i, (seq, _base, delta)) in replayed.iter().enumerate() {
        assert_eq!(delta.laddr, i as u64, "submission order violated");
        let expected_seq = if i < 7 { 0 } else { 1 };
        assert_eq!(seq.segment_seq, expected_seq);
    }

    // Property: replay positions are strictly increasing.
    for pair in replayed.windows(2) {
        assert!(pair[0].0 < pair[1].0);
    }
}

#[tokio::test]
async fn monotone_cursor() {
    let (_manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();
    assert_eq!(journal.written_to(), BLOCK as u64);

    let record = delta_record(1, PAddr::NULL);
    let expected = encoded_length(&record, BLOCK).total();
    journal.submit(record).await.unwrap();
    assert_eq!(journal.written_to(), BLOCK as u64 + expected);

    let record = mixed_record(2);
    let expected2 = encoded_length(&record, BLOCK).total();
    journal.submit(record).await.unwrap();
    assert_eq!(journal.written_to(), BLOCK as u64 + expected + expected2);
}

#[tokio::test]
#[should_panic(expected = "exceeds segment capacity")]
async fn oversized_record_panics() {
    let (_manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();

    // Payload alone equals the segment's record capacity, so metadata
    // pushes the record over.
    let record = Record::new(
        vec![Extent::new(0, Bytes::from(vec![0u8; (SEGMENT - BLOCK as u64) as usize]))],
        vec![],
    );
    let _ = journal.submit(record).await;
}

// ---------------------------------------------------------------
// S3: deltas into rewritten segments are skipped
// ---------------------------------------------------------------

#[tokio::test]
async fn skip_delta_targeting_newer_segment() {
    let (manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();

    journal.submit(delta_record(1, PAddr::new(5, 0))).await.unwrap();
    journal.submit(delta_record(2, PAddr::NULL)).await.unwrap();
    journal.submit(delta_record(3, PAddr::new(6, 0))).await.unwrap();

    let replay_provider = Arc::new(MemorySegmentProvider::new(POOL));
    // Segment 5 has been rewritten under a newer sequence than the segment
    // being replayed (0); segment 6 still carries an older-or-equal one.
    replay_provider.set_seq(5, 99);
    replay_provider.set_seq(6, 0);

    let replayed = collect_replay(manager, replay_provider).await.unwrap();
    let tags: Vec<u64> = replayed.iter().map(|(_, _, d)| d.laddr).collect();
    assert_eq!(tags, vec![2, 3]);
}

#[tokio::test]
async fn skip_delta_targeting_untracked_segment() {
    let (manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();

    // Segment 7 is not tracked by the provider at replay time, so its
    // sequence reads as the null sentinel, which sorts above everything.
    journal.submit(delta_record(1, PAddr::new(7, 0))).await.unwrap();
    journal.submit(delta_record(2, PAddr::NULL)).await.unwrap();

    let replayed = collect_replay(manager, Arc::new(MemorySegmentProvider::new(POOL)))
        .await
        .unwrap();
    let tags: Vec<u64> = replayed.iter().map(|(_, _, d)| d.laddr).collect();
    assert_eq!(tags, vec![2]);
}

// ---------------------------------------------------------------
// S4: torn tail
// ---------------------------------------------------------------

#[tokio::test]
async fn torn_tail_stops_scan_cleanly() {
    let (manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();

    for tag in 1..=3u8 {
        journal.submit(delta_record(tag, PAddr::NULL)).await.unwrap();
    }

    // Corrupt record 3's header (at offset 12288) so its mdlength reads as
    // zero, as if the write never completed.
    manager.poke(0, 12289, 0);

    let replayed = collect_replay(manager, Arc::new(MemorySegmentProvider::new(POOL)))
        .await
        .unwrap();
    let tags: Vec<u64> = replayed.iter().map(|(_, _, d)| d.laddr).collect();
    assert_eq!(tags, vec![1, 2]);
}

#[tokio::test]
async fn replay_is_idempotent() {
    let (manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();
    for tag in 1..=4u8 {
        journal.submit(delta_record(tag, PAddr::NULL)).await.unwrap();
    }

    let first = collect_replay(manager.clone(), Arc::new(MemorySegmentProvider::new(POOL)))
        .await
        .unwrap();
    let second = collect_replay(manager, Arc::new(MemorySegmentProvider::new(POOL)))
        .await
        .unwrap();
    assert_eq!(first, second);
}

// ---------------------------------------------------------------
// S5: empty pool
// ---------------------------------------------------------------

#[tokio::test]
async fn empty_pool_fails_discovery() {
    let manager = Arc::new(MemorySegmentManager::new(BLOCK, SEGMENT, POOL));
    let provider = Arc::new(MemorySegmentProvider::new(POOL));
    let mut journal = Journal::new(manager, provider);

    let err = journal.replay(&mut |_, _, _| Ok(())).await.unwrap_err();
    assert!(matches!(err, Error::NoJournalSegments));
}

#[tokio::test]
async fn discovery_skips_unreadable_segments() {
    let (manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();

    // Fill segment 0 exactly, then push one record into segment 1.
    for tag in 1..=15u8 {
        journal.submit(delta_record(tag, PAddr::NULL)).await.unwrap();
    }
    journal.submit(delta_record(16, PAddr::NULL)).await.unwrap();

    manager.set_read_error(0, true);

    let replayed = collect_replay(manager, Arc::new(MemorySegmentProvider::new(POOL)))
        .await
        .unwrap();
    let tags: Vec<u64> = replayed.iter().map(|(_, _, d)| d.laddr).collect();
    assert_eq!(tags, vec![16]);
}

// ---------------------------------------------------------------
// S6: journal tail at mid-segment
// ---------------------------------------------------------------

#[tokio::test]
async fn replay_starts_at_recorded_tail() {
    let (manager, provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();

    // Fill segment 0 exactly with fifteen one-block records.
    for tag in 100..115u8 {
        journal.submit(delta_record(tag, PAddr::NULL)).await.unwrap();
    }
    // These three roll into segment 1 at offsets 4096, 8192, 12288.
    for tag in [200u8, 201, 202] {
        journal.submit(delta_record(tag, PAddr::NULL)).await.unwrap();
    }

    // Everything before (1, 12288) is declared dead.
    let tail = JSeq::new(1, PAddr::new(1, 12288));
    provider.set_journal_tail_target(tail);

    // Fill the rest of segment 1, then roll into segment 2 so its header
    // carries the tail.
    for tag in 203..215u8 {
        journal.submit(delta_record(tag, PAddr::NULL)).await.unwrap();
    }
    journal.submit(delta_record(220, PAddr::NULL)).await.unwrap();

    let block = manager.read(PAddr::new(2, 0), BLOCK).await.unwrap();
    let header = SegmentHeader::decode(&mut &block[..]).unwrap();
    assert_eq!(header.segment_seq, 2);
    assert_eq!(header.journal_tail, tail);

    // Discovery resolves the tail into the replay list.
    let replay_provider = Arc::new(MemorySegmentProvider::new(POOL));
    let mut replay_journal = Journal::new(manager.clone(), replay_provider.clone());
    let segments = replay_journal.find_replay_segments().await.unwrap();
    assert_eq!(
        segments,
        vec![
            JSeq::new(1, PAddr::new(1, 12288)),
            JSeq::new(2, PAddr::new(2, 4096)),
        ]
    );
    assert_eq!(replay_provider.committed_tail(), tail);

    // Records below the tail are not delivered.
    let replayed = collect_replay(manager, Arc::new(MemorySegmentProvider::new(POOL)))
        .await
        .unwrap();
    let tags: Vec<u64> = replayed.iter().map(|(_, _, d)| d.laddr).collect();
    let mut expected: Vec<u64> = vec![202];
    expected.extend(203..215u64);
    expected.push(220);
    assert_eq!(tags, expected);
    assert_eq!(replayed[0].0, JSeq::new(1, PAddr::new(1, 12288)));
}

// ---------------------------------------------------------------
// Sequence continuation after recovery
// ---------------------------------------------------------------

#[tokio::test]
async fn sequence_space_continues_after_replay() {
    let (manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();
    for tag in 0..9u8 {
        journal.submit(mixed_record(tag)).await.unwrap();
    }

    // Restart: replay, then resume writing.
    let provider = Arc::new(MemorySegmentProvider::new(POOL));
    let mut journal = Journal::new(manager.clone(), provider.clone());
    journal.replay(&mut |_, _, _| Ok(())).await.unwrap();

    let start = journal.open_for_write().await.unwrap();
    assert_eq!(start.segment_seq, 2);
    // The recovered pool still holds segments 0 and 1; writing resumes on
    // a fresh segment.
    assert_eq!(start.offset.segment, 2);
    assert_eq!(provider.journal_segment(), Some((2, 2)));

    let block = manager.read(PAddr::new(2, 0), BLOCK).await.unwrap();
    let header = SegmentHeader::decode(&mut &block[..]).unwrap();
    assert_eq!(header.segment_seq, 2);
}

#[tokio::test]
async fn discovery_orders_segments_by_sequence() {
    let (manager, _provider, mut journal) = setup();
    journal.open_for_write().await.unwrap();
    for tag in 0..20u8 {
        journal.submit(mixed_record(tag)).await.unwrap();
    }

    let mut journal = Journal::new(manager, Arc::new(MemorySegmentProvider::new(POOL)));
    let segments = journal.find_replay_segments().await.unwrap();
    assert!(segments.len() >= 3);
    for pair in segments.windows(2) {
        assert!(pair[0].segment_seq < pair[1].segment_seq);
    }
}
