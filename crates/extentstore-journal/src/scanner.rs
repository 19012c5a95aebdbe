//! Segment Scanner
//!
//! Walks a segment record-by-record, following the lengths each record
//! header declares, and dispatches per-record callbacks for deltas and
//! extents. The two handlers are independent; a caller supplies whichever
//! it needs.
//!
//! ## Torn-Write Tolerance
//!
//! A header that fails to decode on the *first* block of a candidate record
//! ends the walk cleanly: an unfinished record at the tail of a crashed
//! segment is indistinguishable from garbage, and stopping there is the
//! correct recovery. A header that decodes but declares a metadata region
//! extending past the segment is different: the header committed
//! to an impossible size, which is a framing error surfaced to the caller.

use bytes::{Bytes, BytesMut};
use tracing::{debug, error};

use extentstore_core::record::{decode_delta_infos, decode_extent_infos};
use extentstore_core::{DeltaInfo, Error, ExtentInfo, PAddr, RecordHeader, Result};

use crate::journal::Journal;

/// Per-record delta callback: `(record_start, base, delta)` where `base` is
/// the address of the record's first extent payload.
pub type DeltaHandler<'a> = dyn FnMut(PAddr, PAddr, &DeltaInfo) -> Result<()> + 'a;

/// Per-extent callback: `(payload_addr, info)`.
pub type ExtentHandler<'a> = dyn FnMut(PAddr, &ExtentInfo) -> Result<()> + 'a;

impl Journal {
    /// Walk forward from `start` for at most `budget` bytes, invoking the
    /// supplied handlers for each record parsed. Returns the address of the
    /// first unparsed byte, or [`PAddr::NULL`] if the segment ended (torn
    /// tail or physical end).
    pub async fn scan_segment(
        &self,
        start: PAddr,
        budget: u64,
        mut on_delta: Option<&mut DeltaHandler<'_>>,
        mut on_extent: Option<&mut ExtentHandler<'_>>,
    ) -> Result<PAddr> {
        debug!(start = %start, budget, "scanning segment");
        let mut current = start;
        loop {
            let Some((header, metadata)) = self.read_record_metadata(current).await? else {
                debug!(at = %current, "end of segment");
                return Ok(PAddr::NULL);
            };

            debug!(
                record = %current,
                mdlength = header.mdlength,
                dlength = header.dlength,
                "scanned record"
            );

            let record_start = current;
            current = current.add_offset(header.mdlength as u64 + header.dlength as u64);

            if let Some(handler) = on_delta.as_deref_mut() {
                let Some(deltas) = decode_delta_infos(&header, &metadata) else {
                    error!(record = %record_start, "unable to decode deltas for record");
                    return Err(Error::framing(record_start, "undecodable delta descriptors"));
                };
                let base = record_start.add_offset(header.mdlength as u64);
                for delta in &deltas {
                    handler(record_start, base, delta)?;
                }
            }

            if let Some(handler) = on_extent.as_deref_mut() {
                let Some(infos) = decode_extent_infos(&header, &metadata) else {
                    error!(record = %record_start, "unable to decode extent infos for record");
                    return Err(Error::framing(record_start, "undecodable extent descriptors"));
                };
                let mut data_offset = 0u64;
                for info in &infos {
                    let addr = record_start.add_offset(header.mdlength as u64 + data_offset);
                    data_offset += info.len as u64;
                    handler(addr, info)?;
                }
            }

            if current.offset >= start.offset + budget {
                return Ok(current);
            }
        }
    }

    /// Read one record's metadata region starting at `start`.
    ///
    /// Reads the first block and decodes the header from it; if the header
    /// declares more metadata, reads the remainder. `Ok(None)` means no
    /// record starts here, either the segment's physical end or a torn tail.
    pub(crate) async fn read_record_metadata(
        &self,
        start: PAddr,
    ) -> Result<Option<(RecordHeader, Bytes)>> {
        let block_size = self.block_size as u64;
        let segment_size = self.segment_manager.segment_size();
        if start.offset + block_size > segment_size {
            return Ok(None);
        }

        let first = self.segment_manager.read(start, self.block_size).await?;
        let Some(header) = RecordHeader::decode(&mut &first[..], self.block_size) else {
            return Ok(None);
        };

        if header.mdlength as u64 > block_size {
            if start.offset + header.mdlength as u64 > segment_size {
                return Err(Error::framing(
                    start,
                    format!("mdlength {} extends past segment end", header.mdlength),
                ));
            }
            let tail = self
                .segment_manager
                .read(
                    start.add_offset(block_size),
                    header.mdlength - self.block_size,
                )
                .await?;
            let mut metadata = BytesMut::with_capacity(header.mdlength as usize);
            metadata.extend_from_slice(&first);
            metadata.extend_from_slice(&tail);
            Ok(Some((header, metadata.freeze())))
        } else {
            Ok(Some((header, first)))
        }
    }
}
