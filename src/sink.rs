use crate::config::FileSinkConfig;
use crate::error::Error;
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Copy of a journal's storage handed to sinks for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Number of times the buffer had wrapped when the snapshot was taken.
    pub generation: u64,
    /// Cursor at snapshot time.
    pub position: u64,
    pub bytes: Vec<u8>,
}

impl Snapshot {
    pub const HEADER_LEN: usize = 16;

    /// File layout: generation (u64 LE), position (u64 LE), storage bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.bytes.len());
        out.extend_from_slice(&self.generation.to_le_bytes());
        out.extend_from_slice(&self.position.to_le_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::HEADER_LEN {
            return Err(Error::TruncatedSnapshot {
                len: data.len(),
                expected: Self::HEADER_LEN,
            });
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&data[..8]);
        let generation = u64::from_le_bytes(word);
        word.copy_from_slice(&data[8..16]);
        let position = u64::from_le_bytes(word);
        Ok(Self {
            generation,
            position,
            bytes: data[Self::HEADER_LEN..].to_vec(),
        })
    }
}

#[async_trait]
pub trait JournalSink: Send + Sync {
    fn id(&self) -> &str;
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error>;
}

/// Replaces a file's contents with the latest snapshot.
pub struct FileSink {
    id: String,
    path: PathBuf,
    // Serialises concurrent flushes to the same file.
    lock: tokio::sync::Mutex<()>,
}

impl FileSink {
    pub fn new(cfg: FileSinkConfig) -> Self {
        Self {
            id: cfg.id,
            path: PathBuf::from(cfg.path),
            lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl JournalSink for FileSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut file = File::create(&self.path).await?;
        file.write_all(&snapshot.encode()).await?;
        file.sync_data().await?;
        debug!(
            "sink '{}' wrote generation {} ({} bytes) to {}",
            self.id,
            snapshot.generation,
            snapshot.bytes.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Keeps every snapshot in memory.
pub struct MemorySink {
    id: String,
    snapshots: Mutex<Vec<Snapshot>>,
}

impl MemorySink {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshots(&self) -> Result<Vec<Snapshot>, Error> {
        let snapshots = self.snapshots.lock().map_err(|_| Error::Unexpected)?;
        Ok(snapshots.clone())
    }
}

#[async_trait]
impl JournalSink for MemorySink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let mut snapshots = self.snapshots.lock().map_err(|_| Error::Unexpected)?;
        snapshots.push(snapshot.clone());
        Ok(())
    }
}
