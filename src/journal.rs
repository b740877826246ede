use crate::config::{FlattenedConfig, FlushMode};
use crate::error::Error;
use crate::ring_buffer::RingBuffer;
use crate::sink::{FileSink, JournalSink, Snapshot};
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes in a record frame before the payload: kind (1), length (4), timestamp (8).
pub const RECORD_HEADER_LEN: usize = 13;

/// Owns a [`RingBuffer`] and exports its contents to sinks.
///
/// Records are framed as `kind: u8`, `len: i32`, `timestamp_ms: i64`, then the
/// payload, all little-endian. The journal does not know which bytes are still
/// valid after a wrap; readers of a snapshot use `generation` and `position` for that.
pub struct Journal {
    buffer: RingBuffer,
    flush: FlushMode,
    sinks: Vec<Arc<dyn JournalSink>>,
    generation: Arc<AtomicU64>,
    records: u64,
    bytes: u64,
}

impl Journal {
    pub fn new(
        capacity: usize,
        flush: FlushMode,
        sinks: Vec<Arc<dyn JournalSink>>,
    ) -> Result<Self, Error> {
        let mut buffer = RingBuffer::new(capacity)?;
        let generation = Arc::new(AtomicU64::new(0));
        let counter = generation.clone();
        buffer.on_wrap(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        Ok(Self {
            buffer,
            flush,
            sinks,
            generation,
            records: 0,
            bytes: 0,
        })
    }

    pub fn from_config(cfg: FlattenedConfig) -> Result<Self, Error> {
        let sinks = cfg
            .file_sinks
            .into_iter()
            .map(|s| Arc::new(FileSink::new(s)) as Arc<dyn JournalSink>)
            .collect();
        Self::new(cfg.capacity, cfg.flush, sinks)
    }

    pub fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    /// Returns (records, bytes, generation).
    pub fn stats(&self) -> (u64, u64, u64) {
        (self.records, self.bytes, self.generation())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Append a record stamped with the current time. Returns `true` if the buffer wrapped.
    pub fn append(&mut self, kind: u8, payload: &[u8]) -> Result<bool, Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::Unexpected)?;
        self.append_at(kind, now.as_millis() as i64, payload)
    }

    pub fn append_at(
        &mut self,
        kind: u8,
        timestamp_ms: i64,
        payload: &[u8],
    ) -> Result<bool, Error> {
        let frame_len = RECORD_HEADER_LEN + payload.len();
        let capacity = self.buffer.size();
        // A longer frame would overwrite its own header.
        let len = i32::try_from(payload.len())
            .ok()
            .filter(|_| frame_len <= capacity)
            .ok_or(Error::RecordTooLarge { len: frame_len, capacity })?;

        let mut wrapped = self.buffer.write_byte(kind);
        wrapped |= self.buffer.write_i32(len);
        wrapped |= self.buffer.write_i64(timestamp_ms);
        wrapped |= self.buffer.write_bytes(payload, 0, payload.len())?;

        self.records += 1;
        self.bytes += frame_len as u64;
        if wrapped {
            debug!(
                "record {} wrapped the journal (generation {})",
                self.records,
                self.generation()
            );
        }
        Ok(wrapped)
    }

    /// Append a record and flush the sinks if the flush mode asks for it.
    pub async fn record(&mut self, kind: u8, payload: &[u8]) -> Result<bool, Error> {
        let wrapped = self.append(kind, payload)?;
        if wrapped && self.flush == FlushMode::OnWrap {
            self.flush().await?;
        }
        Ok(wrapped)
    }

    /// Append every `\n`-terminated line of `reader` as a record of `kind`.
    ///
    /// Lines are raw bytes without the trailing newline. Lines too long for the
    /// buffer are logged and skipped. Returns the number of records appended; any
    /// other error stops reading, and records appended so far stay in the buffer.
    pub async fn ingest<R>(&mut self, kind: u8, mut reader: R) -> Result<u64, Error>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut appended = 0;
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                return Ok(appended);
            }
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            match self.record(kind, &line).await {
                Ok(_) => appended += 1,
                Err(Error::RecordTooLarge { len, capacity }) => {
                    warn!(
                        "Skipping line of {} bytes: record of {} bytes exceeds {} byte buffer",
                        line.len(),
                        len,
                        capacity
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation(),
            position: self.buffer.position() as u64,
            bytes: self.buffer.as_array().to_vec(),
        }
    }

    /// Send a snapshot to every sink. All sinks are attempted; the first failure is returned.
    pub async fn flush(&self) -> Result<(), Error> {
        if self.sinks.is_empty() {
            return Ok(());
        }
        let snapshot = self.snapshot();
        let results = join_all(self.sinks.iter().map(|s| s.write_snapshot(&snapshot))).await;

        let mut first_err = None;
        for (sink, res) in self.sinks.iter().zip(results) {
            if let Err(e) = res {
                error!("Sink '{}' failed to write snapshot: {}", sink.id(), e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                debug!(
                    "flushed generation {} to {} sinks",
                    snapshot.generation,
                    self.sinks.len()
                );
                Ok(())
            }
        }
    }

    /// Flush regardless of mode and report totals.
    pub async fn close(self) -> Result<(u64, u64, u64), Error> {
        self.flush().await?;
        let (records, bytes, generation) = self.stats();
        info!(
            "Journal closed: {} records, {} bytes, generation {}",
            records, bytes, generation
        );
        Ok((records, bytes, generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileSinkConfig;
    use crate::sink::MemorySink;

    fn journal(capacity: usize, flush: FlushMode) -> (Journal, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new("mem"));
        let j = Journal::new(capacity, flush, vec![sink.clone() as Arc<dyn JournalSink>]).unwrap();
        (j, sink)
    }

    #[test]
    fn test_record_frame_layout() {
        let (mut j, _) = journal(64, FlushMode::OnExit);
        assert!(!j.append_at(7, 0x0102030405060708, b"hi").unwrap());

        let bytes = j.buffer().as_array();
        assert_eq!(bytes[0], 7);
        assert_eq!(&bytes[1..5], &2i32.to_le_bytes());
        assert_eq!(&bytes[5..13], &0x0102030405060708i64.to_le_bytes());
        assert_eq!(&bytes[13..15], b"hi");
        assert_eq!(j.buffer().position(), 15);
        assert_eq!(j.stats(), (1, 15, 0));
    }

    #[test]
    fn test_generation_counts_wraps() {
        let (mut j, _) = journal(20, FlushMode::OnExit);
        // 15-byte frames: wraps on the 2nd (30 bytes) and 3rd (45 bytes) records.
        let flags: Vec<bool> = (0..3)
            .map(|_| j.append_at(1, 0, b"ab").unwrap())
            .collect();
        assert_eq!(flags, vec![false, true, true]);
        assert_eq!(j.generation(), 2);
        assert_eq!(j.buffer().position(), 5);
    }

    #[test]
    fn test_record_too_large() {
        let (mut j, _) = journal(16, FlushMode::OnExit);
        assert!(j.append_at(1, 0, b"abc").is_ok());
        assert_eq!(
            j.append_at(1, 0, b"abcd"),
            Err(Error::RecordTooLarge { len: 17, capacity: 16 })
        );
        assert_eq!(j.buffer().position(), 0);
        assert_eq!(j.stats(), (1, 16, 1));
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(matches!(
            Journal::new(0, FlushMode::OnWrap, Vec::new()),
            Err(Error::InvalidCapacity(0))
        ));
    }

    #[tokio::test]
    async fn test_ingest_skips_oversized_lines() {
        let (mut j, sink) = journal(32, FlushMode::OnExit);
        let mut input = b"hello\n".to_vec();
        input.extend(std::iter::repeat(b'x').take(40));
        input.extend_from_slice(b"\nworld\n");

        assert_eq!(j.ingest(1, &input[..]).await.unwrap(), 2);
        assert_eq!(j.stats(), (2, 36, 1));
        j.close().await.unwrap();

        let snaps = sink.snapshots().unwrap();
        assert_eq!(snaps.len(), 1);
        // "hello" filled 0..18, "world" wrapped from 18 round to 4.
        assert_eq!(&snaps[0].bytes[13..18], b"hello");
        assert_eq!(&snaps[0].bytes[31..32], b"w");
        assert_eq!(&snaps[0].bytes[..4], b"orld");
        assert_eq!(snaps[0].position, 4);
    }

    #[tokio::test]
    async fn test_ingest_accepts_binary_lines() {
        let (mut j, sink) = journal(64, FlushMode::OnExit);
        // Last line has no trailing newline.
        assert_eq!(j.ingest(2, &b"ok\n\xff\xfe\n\x00"[..]).await.unwrap(), 3);
        j.close().await.unwrap();

        let bytes = &sink.snapshots().unwrap()[0].bytes;
        assert_eq!(&bytes[13..15], b"ok");
        assert_eq!(bytes[15], 2);
        assert_eq!(&bytes[16..20], &2i32.to_le_bytes());
        assert_eq!(&bytes[28..30], &[0xff, 0xfe]);
        assert_eq!(&bytes[31..35], &1i32.to_le_bytes());
        assert_eq!(bytes[43], 0x00);
    }

    #[tokio::test]
    async fn test_flush_on_wrap() {
        let (mut j, sink) = journal(20, FlushMode::OnWrap);
        assert!(!j.record(1, b"ab").await.unwrap());
        assert!(sink.snapshots().unwrap().is_empty());

        assert!(j.record(1, b"ab").await.unwrap());
        let snaps = sink.snapshots().unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].generation, 1);
        assert_eq!(snaps[0].position, 10);
        assert_eq!(snaps[0].bytes, j.buffer().as_array());
    }

    #[tokio::test]
    async fn test_flush_on_exit_only_at_close() {
        let (mut j, sink) = journal(20, FlushMode::OnExit);
        for _ in 0..4 {
            j.record(2, b"ab").await.unwrap();
        }
        assert!(sink.snapshots().unwrap().is_empty());

        let (records, bytes, generation) = j.close().await.unwrap();
        assert_eq!((records, bytes, generation), (4, 60, 3));
        let snaps = sink.snapshots().unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].generation, 3);
    }

    #[tokio::test]
    async fn test_flush_reports_failing_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mem = Arc::new(MemorySink::new("mem"));
        let broken = Arc::new(FileSink::new(FileSinkConfig {
            id: "broken".to_string(),
            path: dir.path().join("no/such/dir").to_string_lossy().into_owned(),
            enabled: true,
        }));
        let mut j = Journal::new(
            32,
            FlushMode::OnExit,
            vec![broken as Arc<dyn JournalSink>, mem.clone() as Arc<dyn JournalSink>],
        )
        .unwrap();
        j.append_at(1, 0, b"x").unwrap();

        assert!(matches!(j.flush().await, Err(Error::OsError(_))));
        // The healthy sink still received its snapshot.
        assert_eq!(mem.snapshots().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_from_config_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.ring");
        let cfg = FlattenedConfig {
            capacity: 32,
            flush: FlushMode::OnWrap,
            file_sinks: vec![FileSinkConfig {
                id: "primary".to_string(),
                path: path.to_string_lossy().into_owned(),
                enabled: true,
            }],
        };
        let mut j = Journal::from_config(cfg).unwrap();
        j.record(3, b"payload").await.unwrap();
        j.close().await.unwrap();

        let snap = Snapshot::decode(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(snap.generation, 0);
        assert_eq!(snap.position, 20);
        assert_eq!(snap.bytes.len(), 32);
        assert_eq!(&snap.bytes[13..20], b"payload");
    }
}
