//! Extentstore Journal
//!
//! This crate implements the segment-structured write-ahead journal for the
//! extentstore copy-on-write object store: the component that durably
//! records changes onto a pool of fixed-size append-only segments, and
//! replays them in order after a restart.
//!
//! ## What Does the Journal Record?
//!
//! Two kinds of change travel in each record:
//!
//! 1. **Extent writes**: new physical payload, carried in the record's data
//!    region and indexed by extent descriptors in the metadata region
//! 2. **Deltas**: logical mutations against existing extents, carried
//!    entirely in the metadata region with opaque per-kind payloads
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐
//! │  Caller          │  builds Records (extents + deltas)
//! └────────┬─────────┘
//!          │ submit / replay handlers
//!          ▼
//! ┌──────────────────┐     ┌───────────────────┐
//! │  Journal         │────▶│ SegmentProvider   │  which segment is next,
//! │  - writer        │     │ (shared registry) │  per-segment sequences,
//! │  - scanner       │     └───────────────────┘  journal tail
//! │  - replay        │
//! └────────┬─────────┘
//!          │ read / write / open / close
//!          ▼
//! ┌──────────────────┐
//! │ SegmentManager   │  raw block I/O on the fixed-size segment pool
//! └──────────────────┘
//! ```
//!
//! ## Segment Lifecycle
//!
//! 1. Provider allocates a physical segment
//! 2. Journal opens it and writes a header (sequence, identity, tail)
//! 3. Records are appended until the next one would not fit
//! 4. The segment is closed, the provider is told, and the journal rolls
//! 5. Once its sequence falls below the journal tail, the provider may
//!    recycle the segment
//!
//! ## Recovery
//!
//! `replay` scans every segment's header block, orders the decodable ones
//! by sequence, and walks them record-by-record from the recorded journal
//! tail onward. A torn record at the tail of a crashed segment ends that
//! segment's walk cleanly; deltas whose target extent now lives in a newer
//! segment are skipped because the extent has already been rewritten.
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use extentstore_core::{DeltaInfo, Extent, PAddr, Record};
//! use extentstore_journal::{Journal, MemorySegmentManager, MemorySegmentProvider};
//!
//! let manager = Arc::new(MemorySegmentManager::new(4096, 1 << 20, 16));
//! let provider = Arc::new(MemorySegmentProvider::new(16));
//!
//! // Write path
//! let mut journal = Journal::new(manager.clone(), provider.clone());
//! journal.open_for_write().await?;
//! let addr = journal
//!     .submit(Record::new(
//!         vec![Extent::new(0x4000, Bytes::from(vec![0u8; 4096]))],
//!         vec![],
//!     ))
//!     .await?;
//!
//! // After a restart: replay in sequence order
//! let mut journal = Journal::new(manager, Arc::new(MemorySegmentProvider::new(16)));
//! journal
//!     .replay(&mut |seq, base, delta| {
//!         // reconstruct in-memory state from each delta
//!         Ok(())
//!     })
//!     .await?;
//! ```
//!
//! ## Concurrency Model
//!
//! The journal is single-producer: `submit` takes `&mut self` and is never
//! concurrent with itself, and replay does not run while writing. The only
//! suspension points are segment-manager I/O calls; everything between them
//! is atomic with respect to other journal operations on the instance.
//! Collaborators are shared `Arc` references and synchronize themselves.

pub mod file;
pub mod journal;
pub mod memory;
pub mod provider;
pub mod replay;
pub mod scanner;
pub mod segment;

pub use file::{FileManagerConfig, FileSegmentManager};
pub use journal::Journal;
pub use memory::{MemorySegmentManager, MemorySegmentProvider};
pub use provider::SegmentProvider;
pub use replay::ReplayHandler;
pub use scanner::{DeltaHandler, ExtentHandler};
pub use segment::{Segment, SegmentManager};
