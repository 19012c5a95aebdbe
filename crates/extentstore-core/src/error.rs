//! Error Types
//!
//! All journal operations return `Result<T>`, aliased to `Result<T, Error>`.
//! Every variant here is on the *recoverable* channel: the caller decides
//! whether to retry or abandon. Fatal corruption and caller bugs (a record
//! larger than a segment, a journal tail that contradicts the segment it
//! points at) are not representable as errors; they panic.
//!
//! One deliberate non-error: a record header that fails to decode on the
//! first block of a candidate record is treated as the torn tail of a
//! crashed segment and ends the scan cleanly.

use thiserror::Error;

use crate::addr::{PAddr, SegmentId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("segment not found: {0}")]
    SegmentNotFound(SegmentId),

    #[error("invalid record framing at {addr}: {reason}")]
    BadFraming { addr: PAddr, reason: String },

    #[error("no decodable journal segments in pool")]
    NoJournalSegments,
}

impl Error {
    pub fn framing(addr: PAddr, reason: impl Into<String>) -> Self {
        Error::BadFraming {
            addr,
            reason: reason.into(),
        }
    }
}
