//! File-Backed Segment Pool
//!
//! One preallocated file per segment under a configured directory. This is
//! the simplest durable backing for the journal: segment files are created
//! and sized up front, writes are append-only within a segment, and closing
//! a segment syncs it to disk.
//!
//! Geometry lives in [`FileManagerConfig`] so embedders can load it from
//! their own configuration files.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

use extentstore_core::{Error, PAddr, Result, SegmentId};

use crate::segment::{Segment, SegmentManager};

/// Configuration for a file-backed segment pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileManagerConfig {
    /// Directory holding one file per segment.
    pub directory: PathBuf,

    /// Number of segments in the pool (default: 16)
    #[serde(default = "default_num_segments")]
    pub num_segments: u64,

    /// Size of every segment in bytes (default: 64MB)
    #[serde(default = "default_segment_size")]
    pub segment_size: u64,

    /// I/O alignment granularity in bytes (default: 4KB)
    #[serde(default = "default_block_size")]
    pub block_size: u32,
}

impl Default for FileManagerConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./data/segments"),
            num_segments: default_num_segments(),
            segment_size: default_segment_size(),
            block_size: default_block_size(),
        }
    }
}

fn default_num_segments() -> u64 {
    16
}

fn default_segment_size() -> u64 {
    64 * 1024 * 1024 // 64MB
}

fn default_block_size() -> u32 {
    4096
}

/// Segment pool backed by preallocated files.
pub struct FileSegmentManager {
    config: FileManagerConfig,
}

impl FileSegmentManager {
    /// Open (or create) the pool: the directory and every segment file are
    /// created and sized if absent.
    pub async fn open(config: FileManagerConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.directory).await?;
        for id in 0..config.num_segments {
            let path = segment_path(&config.directory, id as SegmentId);
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&path)
                .await?;
            if file.metadata().await?.len() < config.segment_size {
                file.set_len(config.segment_size).await?;
            }
        }
        info!(
            directory = %config.directory.display(),
            segments = config.num_segments,
            segment_size = config.segment_size,
            "file segment pool opened"
        );
        Ok(Self { config })
    }
}

fn segment_path(directory: &std::path::Path, segment: SegmentId) -> PathBuf {
    directory.join(format!("segment-{:06}.seg", segment))
}

#[async_trait]
impl SegmentManager for FileSegmentManager {
    fn block_size(&self) -> u32 {
        self.config.block_size
    }

    fn segment_size(&self) -> u64 {
        self.config.segment_size
    }

    fn num_segments(&self) -> u64 {
        self.config.num_segments
    }

    async fn read(&self, addr: PAddr, len: u32) -> Result<Bytes> {
        if addr.offset + len as u64 > self.config.segment_size {
            return Err(Error::Io(std::io::Error::other("read past segment end")));
        }
        let path = segment_path(&self.config.directory, addr.segment);
        let mut file = File::open(&path).await?;
        file.seek(std::io::SeekFrom::Start(addr.offset)).await?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn open(&self, segment: SegmentId) -> Result<Box<dyn Segment>> {
        if segment as u64 >= self.config.num_segments {
            return Err(Error::SegmentNotFound(segment));
        }
        let path = segment_path(&self.config.directory, segment);
        let file = OpenOptions::new().write(true).open(&path).await?;
        debug!(segment, path = %path.display(), "opened segment file");
        Ok(Box::new(FileSegment {
            id: segment,
            segment_size: self.config.segment_size,
            written_to: 0,
            file,
        }))
    }
}

#[derive(Debug)]
struct FileSegment {
    id: SegmentId,
    segment_size: u64,
    written_to: u64,
    file: File,
}

#[async_trait]
impl Segment for FileSegment {
    fn segment_id(&self) -> SegmentId {
        self.id
    }

    fn write_ptr(&self) -> u64 {
        self.written_to
    }

    fn write_capacity(&self) -> u64 {
        self.segment_size
    }

    async fn write(&mut self, offset: u64, data: Bytes) -> Result<()> {
        if offset != self.written_to {
            return Err(Error::Io(std::io::Error::other("non-append write")));
        }
        let end = offset + data.len() as u64;
        if end > self.segment_size {
            return Err(Error::Io(std::io::Error::other("write past segment end")));
        }
        self.file.seek(std::io::SeekFrom::Start(offset)).await?;
        self.file.write_all(&data).await?;
        self.written_to = end;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.file.sync_all().await?;
        Ok(())
    }
}
