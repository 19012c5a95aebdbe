pub mod addr;
pub mod error;
pub mod record;
pub mod varint;

pub use addr::{JSeq, PAddr, SegmentId, SegmentSeq, NULL_SEG_ID, SEGMENT_SEQ_NULL};
pub use error::{Error, Result};
pub use record::{
    DeltaInfo, Extent, ExtentInfo, Record, RecordHeader, RecordSize, SegmentHeader,
};
