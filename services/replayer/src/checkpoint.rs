//! Non-blocking book-state checkpointing
//!
//! The manager watches the applied-through watermark and the wall clock;
//! when either trigger fires it clones the book (a structural copy, the
//! only cost paid on the hot path) and hands it to a dedicated writer
//! thread over an unbounded channel. Serialization and I/O never add
//! latency to event application. A failed write is logged and retried at
//! the next trigger, never escalated into the live pipeline.
//!
//! Record layout: `[magic u32][version u32][symbol u32][valid_through u64]
//! [created_at u64][payload_len u64][crc32 u32][payload]`, payload is a
//! bincode-encoded `BookState`. Files are written to a temp name and
//! renamed into place so a torn write can never shadow an older good record.

use crate::book::BookState;
use crate::config::CheckpointConfig;
use crate::errors::ReplayError;
use anyhow::{Context, Result, anyhow};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crossbeam::channel::{Receiver, Sender, unbounded};
use services_common::{Symbol, Ts};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Magic number for checkpoint files
const CHECKPOINT_MAGIC: u32 = 0x424B_4350; // "BKCP"

/// Version of the checkpoint format
const CHECKPOINT_VERSION: u32 = 1;

/// An immutable, point-in-time copy of book state plus the sequence number
/// through which it is valid
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    /// Instrument the state belongs to
    pub symbol: Symbol,
    /// Sequence number the state is valid through
    pub valid_through: u64,
    /// Wall-clock creation time
    pub created_at: Ts,
    /// The copied book state
    pub state: BookState,
}

/// Durable store for checkpoint records, one file per checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating checkpoint dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Write one record; returns the path of the durable file
    pub fn write(&self, record: &CheckpointRecord) -> Result<PathBuf> {
        let payload = bincode::serialize(&record.state).context("serializing book state")?;
        let crc = crc32fast::hash(&payload);

        let final_path = self.record_path(record.symbol, record.valid_through);
        let tmp_path = final_path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)
                .with_context(|| format!("creating {}", tmp_path.display()))?;
            let mut writer = BufWriter::new(file);
            writer.write_u32::<LittleEndian>(CHECKPOINT_MAGIC)?;
            writer.write_u32::<LittleEndian>(CHECKPOINT_VERSION)?;
            writer.write_u32::<LittleEndian>(record.symbol.as_u32())?;
            writer.write_u64::<LittleEndian>(record.valid_through)?;
            writer.write_u64::<LittleEndian>(record.created_at.as_nanos())?;
            writer.write_u64::<LittleEndian>(payload.len() as u64)?;
            writer.write_u32::<LittleEndian>(crc)?;
            writer.write_all(&payload)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("installing {}", final_path.display()))?;
        debug!(
            path = %final_path.display(),
            valid_through = record.valid_through,
            "checkpoint written"
        );
        Ok(final_path)
    }

    /// Load the most recent record for `symbol` whose integrity check
    /// passes; corrupt files are skipped with a warning
    pub fn load_latest(&self, symbol: Symbol) -> Result<Option<CheckpointRecord>> {
        let mut candidates: Vec<(u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("listing {}", self.dir.display()))?
        {
            let path = entry?.path();
            if let Some(valid_through) = Self::parse_name(symbol, &path) {
                candidates.push((valid_through, path));
            }
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, path) in candidates {
            match Self::read_record(&path) {
                Ok(record) => return Ok(Some(record)),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable checkpoint");
                }
            }
        }
        Ok(None)
    }

    fn record_path(&self, symbol: Symbol, valid_through: u64) -> PathBuf {
        self.dir
            .join(format!("{:08}-{:020}.ckpt", symbol.as_u32(), valid_through))
    }

    fn parse_name(symbol: Symbol, path: &Path) -> Option<u64> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(".ckpt")?;
        let (sym, seq) = stem.split_once('-')?;
        if sym.parse::<u32>().ok()? != symbol.as_u32() {
            return None;
        }
        seq.parse::<u64>().ok()
    }

    fn read_record(path: &Path) -> Result<CheckpointRecord> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != CHECKPOINT_MAGIC {
            return Err(anyhow!(ReplayError::CorruptCheckpoint(format!(
                "bad magic {magic:#x}"
            ))));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != CHECKPOINT_VERSION {
            return Err(anyhow!(ReplayError::CorruptCheckpoint(format!(
                "unsupported version {version}"
            ))));
        }
        let symbol = Symbol::new(reader.read_u32::<LittleEndian>()?);
        let valid_through = reader.read_u64::<LittleEndian>()?;
        let created_at = Ts::from_nanos(reader.read_u64::<LittleEndian>()?);
        let payload_len = reader.read_u64::<LittleEndian>()? as usize;
        let crc = reader.read_u32::<LittleEndian>()?;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != crc {
            return Err(anyhow!(ReplayError::CorruptCheckpoint(
                "payload checksum mismatch".to_string()
            )));
        }
        let state: BookState =
            bincode::deserialize(&payload).context("decoding book state payload")?;
        Ok(CheckpointRecord {
            symbol,
            valid_through,
            created_at,
            state,
        })
    }
}

/// Coordinates checkpoint triggers and the background writer
#[derive(Debug)]
pub struct CheckpointManager {
    cfg: CheckpointConfig,
    symbol: Symbol,
    tx: Option<Sender<CheckpointRecord>>,
    worker: Option<JoinHandle<()>>,
    /// Sequence the last enqueued checkpoint covered
    last_enqueued: u64,
    last_trigger: Instant,
    /// Sequence of the last durably written checkpoint
    written: Arc<AtomicU64>,
    /// Writes that failed and will be retried at the next trigger
    failures: Arc<AtomicU64>,
}

impl CheckpointManager {
    /// Create a manager and spawn its writer thread
    pub fn new(symbol: Symbol, cfg: CheckpointConfig) -> Result<Self> {
        let store = CheckpointStore::new(&cfg.dir)?;
        let (tx, rx) = unbounded::<CheckpointRecord>();
        let written = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));
        let worker = std::thread::Builder::new()
            .name(format!("ckpt-{}", symbol.as_u32()))
            .spawn({
                let written = Arc::clone(&written);
                let failures = Arc::clone(&failures);
                move || Self::run_writer(&store, &rx, &written, &failures)
            })
            .context("spawning checkpoint writer thread")?;
        info!(%symbol, dir = %cfg.dir.display(), "checkpoint manager started");
        Ok(Self {
            cfg,
            symbol,
            tx: Some(tx),
            worker: Some(worker),
            last_enqueued: 0,
            last_trigger: Instant::now(),
            written,
            failures,
        })
    }

    /// Called after every committed batch; enqueues a checkpoint when the
    /// event-count or wall-clock trigger fires. Never blocks.
    pub fn on_applied(&mut self, book: &BookState, now: Instant) {
        let applied = book.applied_through();
        if applied <= self.last_enqueued {
            return;
        }
        let events_due = applied - self.last_enqueued >= self.cfg.event_interval;
        let time_due = now.duration_since(self.last_trigger) >= self.cfg.time_interval;
        if events_due || time_due {
            self.enqueue(book);
            self.last_trigger = now;
        }
    }

    /// Unconditionally enqueue a checkpoint of the current state
    pub fn force(&mut self, book: &BookState) {
        if book.applied_through() > self.last_enqueued {
            self.enqueue(book);
            self.last_trigger = Instant::now();
        }
    }

    /// Sequence of the last durably written checkpoint
    #[must_use]
    pub fn last_written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Number of failed checkpoint writes so far
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Write a final checkpoint and wait for the writer to drain
    pub fn close(mut self, book: &BookState) {
        self.force(book);
        if let Some(tx) = self.tx.take() {
            drop(tx);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(symbol = %self.symbol, "checkpoint writer panicked during shutdown");
            }
        }
    }

    fn enqueue(&mut self, book: &BookState) {
        let record = CheckpointRecord {
            symbol: self.symbol,
            valid_through: book.applied_through(),
            created_at: Ts::now(),
            state: book.clone(),
        };
        self.last_enqueued = record.valid_through;
        if let Some(tx) = &self.tx {
            if tx.send(record).is_err() {
                warn!(symbol = %self.symbol, "checkpoint writer is gone; checkpoint dropped");
            }
        }
    }

    fn run_writer(
        store: &CheckpointStore,
        rx: &Receiver<CheckpointRecord>,
        written: &AtomicU64,
        failures: &AtomicU64,
    ) {
        while let Ok(record) = rx.recv() {
            match store.write(&record) {
                Ok(_) => {
                    written.store(record.valid_through, Ordering::Release);
                }
                Err(err) => {
                    failures.fetch_add(1, Ordering::AcqRel);
                    warn!(
                        valid_through = record.valid_through,
                        "checkpoint write failed; will retry at next trigger: {err:#}"
                    );
                }
            }
        }
    }
}

impl Drop for CheckpointManager {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            drop(tx);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
