//! Memory-mapped append-only journal, adapted from the teacher's
//! `orderbook/sequencer/file_journal.rs`.
//!
//! # On-disk entry format (little-endian)
//!
//! ```text
//! [4 bytes: entry_length][8 bytes: sequence][8 bytes: timestamp_ms]
//! [N bytes: JSON payload][4 bytes: CRC32]
//! ```
//!
//! `entry_length` counts everything after itself (8 + 8 + N + 4).
//! The CRC32 covers `sequence ‖ timestamp_ms ‖ payload`, not `entry_length`.
//! Segments are named `segment-{start_sequence:020}.journal` and live under
//! the configured journal directory; a segment rotates to a new file once
//! `write_pos + next_entry_len` would exceed its capacity.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use memmap2::MmapMut;

use crate::store::{ChangeSet, StoreError};
use crate::types::Symbol;

const HEADER_SIZE: usize = 4 + 8 + 8;
const CRC_SIZE: usize = 4;
const OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;

/// Default segment size: 64 MiB of change-set entries before rotating.
pub const DEFAULT_SEGMENT_BYTES: usize = 64 * 1024 * 1024;

struct SegmentWriter {
    mmap: MmapMut,
    write_pos: usize,
    capacity: usize,
    path: PathBuf,
}

impl SegmentWriter {
    fn create(path: &Path, capacity: usize) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        file.set_len(capacity as u64).map_err(|e| io_err(path, e))?;

        // SAFETY: this process exclusively owns the newly created segment
        // file for its lifetime; nothing else truncates or remaps it.
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| io_err(path, e))? };

        Ok(Self {
            mmap,
            write_pos: 0,
            capacity,
            path: path.to_path_buf(),
        })
    }

    fn open_existing(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        let capacity = file.metadata().map_err(|e| io_err(path, e))?.len() as usize;

        // SAFETY: same as `create` — exclusive ownership for this process.
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| io_err(path, e))? };
        let write_pos = scan_write_position(&mmap, capacity);

        Ok(Self {
            mmap,
            write_pos,
            capacity,
            path: path.to_path_buf(),
        })
    }

    fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.write_pos)
    }

    fn write_entry(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        let end = self.write_pos + bytes.len();
        if end > self.capacity {
            return Err(StoreError::Transient {
                symbol: Symbol::from("*"),
                message: format!(
                    "entry of {} bytes does not fit in {} remaining",
                    bytes.len(),
                    self.remaining()
                ),
            });
        }
        self.mmap[self.write_pos..end].copy_from_slice(bytes);
        self.write_pos = end;
        self.mmap
            .flush_range(self.write_pos - bytes.len(), bytes.len())
            .map_err(|e| io_err(&self.path, e))
    }
}

/// Scans forward from byte 0, validating each entry's declared length fits,
/// until a zeroed (unwritten) or malformed header is found.
fn scan_write_position(mmap: &MmapMut, capacity: usize) -> usize {
    let mut pos = 0usize;
    while pos + 4 <= capacity {
        let len_bytes: [u8; 4] = mmap[pos..pos + 4].try_into().expect("4 bytes");
        let entry_len = u32::from_le_bytes(len_bytes) as usize;
        if entry_len == 0 {
            break;
        }
        let end = pos + 4 + entry_len;
        if end > capacity {
            break;
        }
        pos = end;
    }
    pos
}

fn io_err(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Transient {
        symbol: Symbol::from("*"),
        message: format!("{}: {err}", path.display()),
    }
}

/// Append-only, memory-mapped journal of [`ChangeSet`]s for one symbol.
/// Rotates to a new segment file once the active one would overflow.
pub struct FileJournal {
    dir: PathBuf,
    segment_bytes: usize,
    active: Mutex<SegmentWriter>,
}

impl FileJournal {
    /// Open (or create) a journal rooted at `dir` for `symbol`, using
    /// segments of `segment_bytes` each.
    pub fn open(dir: &Path, symbol: &Symbol, segment_bytes: usize) -> Result<Self, StoreError> {
        let symbol_dir = dir.join(sanitize(symbol));
        fs::create_dir_all(&symbol_dir).map_err(|e| io_err(&symbol_dir, e))?;

        let active = match latest_segment_path(&symbol_dir)? {
            Some(path) => SegmentWriter::open_existing(&path)?,
            None => {
                let path = segment_path(&symbol_dir, 0);
                SegmentWriter::create(&path, segment_bytes)?
            }
        };

        Ok(Self {
            dir: symbol_dir,
            segment_bytes,
            active: Mutex::new(active),
        })
    }

    /// Append `change_set`, rotating to a fresh segment if the current one
    /// is full.
    pub fn append(&self, change_set: &ChangeSet) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(change_set).map_err(|e| StoreError::Transient {
            symbol: change_set.symbol.clone(),
            message: format!("serializing change-set: {e}"),
        })?;

        let mut body = Vec::with_capacity(HEADER_SIZE - 4 + payload.len());
        body.extend_from_slice(&change_set.sequence.to_le_bytes());
        body.extend_from_slice(&change_set.timestamp.to_le_bytes());
        body.extend_from_slice(&payload);
        let crc = crc32fast::hash(&body);

        let mut entry = Vec::with_capacity(4 + body.len() + CRC_SIZE);
        entry.extend_from_slice(&((body.len() + CRC_SIZE) as u32).to_le_bytes());
        entry.extend_from_slice(&body);
        entry.extend_from_slice(&crc.to_le_bytes());

        let mut active = self.active.lock().expect("journal mutex poisoned");
        if entry.len() > active.remaining() {
            let path = segment_path(&self.dir, change_set.sequence);
            *active = SegmentWriter::create(&path, self.segment_bytes.max(entry.len()))?;
        }
        active.write_entry(&entry)
    }

    /// Read and validate every entry across all segments, starting from
    /// (and including) `from_sequence`.
    pub fn read_from(&self, from_sequence: u64) -> Result<Vec<ChangeSet>, StoreError> {
        let mut out = Vec::new();
        for path in segment_paths(&self.dir)? {
            let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
            let mut pos = 0usize;
            while pos + 4 <= bytes.len() {
                let entry_len =
                    u32::from_le_bytes(bytes[pos..pos + 4].try_into().expect("4 bytes")) as usize;
                if entry_len == 0 {
                    break;
                }
                let body_start = pos + 4;
                let body_end = body_start + entry_len;
                if body_end > bytes.len() {
                    break;
                }
                let body = &bytes[body_start..body_end - CRC_SIZE];
                let stored_crc =
                    u32::from_le_bytes(bytes[body_end - CRC_SIZE..body_end].try_into().unwrap());
                let actual_crc = crc32fast::hash(body);
                let sequence = u64::from_le_bytes(body[0..8].try_into().unwrap());

                if actual_crc != stored_crc {
                    return Err(StoreError::Corrupt {
                        symbol: Symbol::from(self.dir.file_name().unwrap().to_string_lossy()),
                        message: format!(
                            "CRC mismatch at sequence {sequence}: expected {stored_crc}, got {actual_crc}"
                        ),
                    });
                }

                if sequence >= from_sequence {
                    let payload = &body[16..];
                    let change_set: ChangeSet =
                        serde_json::from_slice(payload).map_err(|e| StoreError::Corrupt {
                            symbol: Symbol::from(self.dir.file_name().unwrap().to_string_lossy()),
                            message: format!("deserializing entry {sequence}: {e}"),
                        })?;
                    out.push(change_set);
                }
                pos = body_end;
            }
        }
        out.sort_by_key(|cs| cs.sequence);
        Ok(out)
    }

    /// The highest sequence number committed, or 0 if the journal is empty.
    pub fn last_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.read_from(0)?.last().map(|cs| cs.sequence).unwrap_or(0))
    }

    /// Verify every entry's CRC32 across all segments without materializing
    /// the decoded change-sets.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        self.read_from(0).map(|_| ())
    }
}

fn sanitize(symbol: &Symbol) -> String {
    symbol.as_str().replace('/', "-")
}

fn segment_path(dir: &Path, start_sequence: u64) -> PathBuf {
    dir.join(format!("segment-{start_sequence:020}.journal"))
}

fn segment_paths(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()) == Some("journal")
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn latest_segment_path(dir: &Path) -> Result<Option<PathBuf>, StoreError> {
    Ok(segment_paths(dir)?.into_iter().next_back())
}

/// [`crate::store::DurableStore`] backed by one [`FileJournal`] per symbol,
/// mirroring committed state into an in-memory cache for fast reads.
pub struct JournalBackedStore {
    dir: PathBuf,
    segment_bytes: usize,
    journals: dashmap::DashMap<Symbol, std::sync::Arc<FileJournal>>,
    cache: crate::store::InMemoryStore,
}

impl JournalBackedStore {
    /// A store rooted at `dir`, creating per-symbol journals on first use.
    pub fn new(dir: impl Into<PathBuf>, segment_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            segment_bytes,
            journals: dashmap::DashMap::new(),
            cache: crate::store::InMemoryStore::new(),
        }
    }

    /// Returns the journal for `symbol`, opening (or creating) it on first
    /// use. The first open in this process also hydrates `cache` from every
    /// entry already on disk, so `cache` stays a correct fast path across a
    /// restart rather than silently starting cold.
    fn journal_for(&self, symbol: &Symbol) -> Result<std::sync::Arc<FileJournal>, StoreError> {
        if let Some(existing) = self.journals.get(symbol) {
            return Ok(existing.value().clone());
        }
        let journal = std::sync::Arc::new(FileJournal::open(&self.dir, symbol, self.segment_bytes)?);
        for change_set in journal.read_from(0)? {
            self.cache.apply(&change_set)?;
        }
        self.journals.insert(symbol.clone(), journal.clone());
        Ok(journal)
    }
}

impl crate::store::DurableStore for JournalBackedStore {
    fn apply(&self, change_set: &ChangeSet) -> Result<(), StoreError> {
        let journal = self.journal_for(&change_set.symbol)?;
        journal.append(change_set)?;
        self.cache.apply(change_set)
    }

    fn last_sequence(&self, symbol: &Symbol) -> u64 {
        if self.journal_for(symbol).is_err() {
            return 0;
        }
        self.cache.last_sequence(symbol)
    }

    fn replay(&self, symbol: &Symbol, from_sequence: u64) -> Result<Vec<ChangeSet>, StoreError> {
        let journal = self.journal_for(symbol)?;
        journal.read_from(from_sequence)
    }
}
