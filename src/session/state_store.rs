// src/session/state_store.rs

//! Persistent session record.
//!
//! The record is a fixed 116-byte little-endian block:
//!
//! | offset | size | field                 |
//! |--------|------|-----------------------|
//! | 0      | 4    | magic `0x544D4F4E`    |
//! | 4      | 2    | version (1)           |
//! | 6      | 1    | running               |
//! | 7      | 1    | normal_exit           |
//! | 8      | 2    | continuation_count    |
//! | 10     | 2    | reserved (0)          |
//! | 12     | 4    | interval_sec          |
//! | 16     | 4    | sample_count          |
//! | 20     | 4    | total_samples         |
//! | 24     | 8    | session_start_time    |
//! | 32     | 8    | last_update_time      |
//! | 40     | 8    | continuation_start    |
//! | 48     | 64   | base filename, NUL padded |
//! | 112    | 4    | CRC-32 of the record with this field zeroed |

use crate::common::crc::crc32;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const STATE_MAGIC: u32 = 0x544D_4F4E;
pub const STATE_VERSION: u16 = 1;
pub const RECORD_SIZE: usize = 116;
/// Longest base filename the record can hold (one byte is kept for the terminator).
pub const MAX_FILENAME_LEN: usize = 63;

const FILENAME_OFFSET: usize = 48;
const FILENAME_FIELD: usize = 64;
const CHECKSUM_OFFSET: usize = 112;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("No session state record")]
    NotFound,

    #[error("Session state record truncated: read {read} of {expected} bytes")]
    Corrupt { read: usize, expected: usize },

    #[error("Session state record has wrong magic {0:#010x}")]
    InvalidMagic(u32),

    #[error("Session state checksum mismatch: stored {stored:#010x}, calculated {calculated:#010x}")]
    ChecksumMismatch { stored: u32, calculated: u32 },

    #[error("Failed to write session state: {0}")]
    WriteError(#[source] io::Error),

    #[error("Session state I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("No active session recorded")]
    NoActiveSession,

    #[error("Base filename {0:?} does not fit in the state record")]
    FilenameTooLong(String),

    #[error("Session {0:?} has used every continuation number")]
    ContinuationsExhausted(String),
}

impl StateError {
    /// True if a record exists but cannot be trusted.
    pub fn is_unusable_record(&self) -> bool {
        matches!(
            self,
            StateError::Corrupt { .. } | StateError::InvalidMagic(_) | StateError::ChecksumMismatch { .. }
        )
    }
}

/// What survives a power cut about the current logging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentState {
    pub magic: u32,
    pub version: u16,
    /// A session was started and not stopped in an orderly way.
    pub running: bool,
    /// The last session ended through `stop`.
    pub normal_exit: bool,
    /// Number of times the session has been resumed after a restart.
    pub continuation_count: u16,
    pub interval_sec: u32,
    /// Samples written to the current continuation file.
    pub sample_count: u32,
    /// Samples written across all files of the session.
    pub total_samples: u32,
    pub session_start_time: i64,
    pub last_update_time: i64,
    pub continuation_start_time: i64,
    pub base_filename: String,
    /// Filled in by [`StateStore::save`].
    pub checksum: u32,
}

impl PersistentState {
    /// Record for a freshly started session.
    pub fn new_session(base_filename: &str, interval_sec: u32, start_time: i64) -> Result<Self, StateError> {
        if base_filename.len() > MAX_FILENAME_LEN || base_filename.contains('\0') {
            return Err(StateError::FilenameTooLong(base_filename.to_string()));
        }
        Ok(PersistentState {
            magic: STATE_MAGIC,
            version: STATE_VERSION,
            running: true,
            normal_exit: false,
            continuation_count: 0,
            interval_sec,
            sample_count: 0,
            total_samples: 0,
            session_start_time: start_time,
            last_update_time: start_time,
            continuation_start_time: start_time,
            base_filename: base_filename.to_string(),
            checksum: 0,
        })
    }

    /// Serialises the record, writing `checksum` as stored.
    pub fn encode(&self) -> Result<[u8; RECORD_SIZE], StateError> {
        let name = self.base_filename.as_bytes();
        if name.len() > MAX_FILENAME_LEN || name.contains(&0) {
            return Err(StateError::FilenameTooLong(self.base_filename.clone()));
        }

        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = self.running as u8;
        buf[7] = self.normal_exit as u8;
        buf[8..10].copy_from_slice(&self.continuation_count.to_le_bytes());
        // 10..12 reserved
        buf[12..16].copy_from_slice(&self.interval_sec.to_le_bytes());
        buf[16..20].copy_from_slice(&self.sample_count.to_le_bytes());
        buf[20..24].copy_from_slice(&self.total_samples.to_le_bytes());
        buf[24..32].copy_from_slice(&self.session_start_time.to_le_bytes());
        buf[32..40].copy_from_slice(&self.last_update_time.to_le_bytes());
        buf[40..48].copy_from_slice(&self.continuation_start_time.to_le_bytes());
        buf[FILENAME_OFFSET..FILENAME_OFFSET + name.len()].copy_from_slice(name);
        buf[CHECKSUM_OFFSET..].copy_from_slice(&self.checksum.to_le_bytes());
        Ok(buf)
    }

    /// Parses a record after checking length, magic and checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        if bytes.len() != RECORD_SIZE {
            return Err(StateError::Corrupt { read: bytes.len(), expected: RECORD_SIZE });
        }
        let magic = u32::from_le_bytes(le_array(&bytes[0..4]));
        if magic != STATE_MAGIC {
            return Err(StateError::InvalidMagic(magic));
        }
        let stored = u32::from_le_bytes(le_array(&bytes[CHECKSUM_OFFSET..]));
        let calculated = record_checksum(bytes);
        if stored != calculated {
            return Err(StateError::ChecksumMismatch { stored, calculated });
        }

        let name_field = &bytes[FILENAME_OFFSET..FILENAME_OFFSET + FILENAME_FIELD];
        let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(FILENAME_FIELD);
        let base_filename = std::str::from_utf8(&name_field[..name_len])
            .map_err(|_| StateError::Corrupt { read: bytes.len(), expected: RECORD_SIZE })?
            .to_string();

        Ok(PersistentState {
            magic,
            version: u16::from_le_bytes(le_array(&bytes[4..6])),
            running: bytes[6] != 0,
            normal_exit: bytes[7] != 0,
            continuation_count: u16::from_le_bytes(le_array(&bytes[8..10])),
            interval_sec: u32::from_le_bytes(le_array(&bytes[12..16])),
            sample_count: u32::from_le_bytes(le_array(&bytes[16..20])),
            total_samples: u32::from_le_bytes(le_array(&bytes[20..24])),
            session_start_time: i64::from_le_bytes(le_array(&bytes[24..32])),
            last_update_time: i64::from_le_bytes(le_array(&bytes[32..40])),
            continuation_start_time: i64::from_le_bytes(le_array(&bytes[40..48])),
            base_filename,
            checksum: stored,
        })
    }

    /// Samples written before the current continuation started.
    pub fn samples_before_continuation(&self) -> u32 {
        self.total_samples.saturating_sub(self.sample_count)
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// CRC-32 over the full record with the checksum field taken as zero.
fn record_checksum(bytes: &[u8]) -> u32 {
    let mut copy = [0u8; RECORD_SIZE];
    copy.copy_from_slice(&bytes[..RECORD_SIZE]);
    copy[CHECKSUM_OFFSET..].fill(0);
    crc32(&copy)
}

/// Owns the state record file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Opens the store, creating its directory if needed.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StateError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        debug!("Session state store at {:?}", path);
        Ok(StateStore { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Persists `state` durably, updating its checksum field.
    ///
    /// The record goes to a temporary file which is synced and then renamed
    /// over the old one, so a completed save is never observed half-written.
    pub fn save(&self, state: &mut PersistentState) -> Result<(), StateError> {
        state.checksum = 0;
        let mut bytes = state.encode()?;
        let checksum = record_checksum(&bytes);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());

        let tmp = self.temp_path();
        let mut file = File::create(&tmp).map_err(StateError::WriteError)?;
        file.write_all(&bytes).map_err(StateError::WriteError)?;
        file.sync_all().map_err(StateError::WriteError)?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(StateError::WriteError)?;
        self.sync_dir();

        state.checksum = checksum;
        Ok(())
    }

    // Directory fsync makes the rename itself durable. Not every platform
    // allows opening a directory, so failures are only logged.
    fn sync_dir(&self) {
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            debug!("Directory sync for {:?} skipped: {}", dir, e);
        }
    }

    pub fn load(&self) -> Result<PersistentState, StateError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StateError::NotFound),
            Err(e) => return Err(StateError::Io(e)),
        };
        PersistentState::decode(&bytes)
    }

    /// Removes the record. Removing a record that does not exist is not an error.
    pub fn clear(&self) -> Result<(), StateError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Session state cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::Io(e)),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Records the start of a new session.
    pub fn mark_started(
        &self,
        base_filename: &str,
        interval_sec: u32,
        start_time: i64,
    ) -> Result<PersistentState, StateError> {
        let mut state = PersistentState::new_session(base_filename, interval_sec, start_time)?;
        self.save(&mut state)?;
        info!("Session state saved: {} every {} s", base_filename, interval_sec);
        Ok(state)
    }

    /// Records an orderly stop. Without a trusted record there is nothing to
    /// stop and nothing is written.
    pub fn mark_stopped(&self) -> Result<(), StateError> {
        let mut state = match self.load() {
            Ok(state) => state,
            Err(e) if e.is_unusable_record() || matches!(e, StateError::NotFound) => {
                debug!("No session record to mark stopped: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        state.running = false;
        state.normal_exit = true;
        self.save(&mut state)
    }

    /// Checkpoints progress of the active session.
    ///
    /// `sample_count` is the count within the current continuation; the
    /// session-wide total is rebuilt from the count the continuation started at.
    pub fn update(&self, sample_count: u32, now: i64) -> Result<PersistentState, StateError> {
        let mut state = self.load()?;
        if !state.running {
            return Err(StateError::NoActiveSession);
        }
        let base = state.samples_before_continuation();
        state.sample_count = sample_count;
        state.total_samples = base.saturating_add(sample_count);
        state.last_update_time = now;
        self.save(&mut state)?;
        debug!(
            "Checkpoint: {} samples in file, {} in session",
            state.sample_count, state.total_samples
        );
        Ok(state)
    }

    /// True iff a trustworthy record says a session was interrupted.
    pub fn needs_recovery(&self) -> bool {
        match self.load() {
            Ok(state) => state.running && !state.normal_exit,
            Err(StateError::NotFound) => false,
            Err(e) => {
                warn!("Ignoring session state record: {}", e);
                false
            }
        }
    }

    /// Turns `state` into the record for the next continuation file and persists it.
    ///
    /// `now` becomes both the continuation start and the last update time, so
    /// it must be the best known time rather than a raw reading from a reset clock.
    pub fn prepare_continuation(&self, state: &mut PersistentState, now: i64) -> Result<(), StateError> {
        state.continuation_count = state
            .continuation_count
            .checked_add(1)
            .ok_or_else(|| StateError::ContinuationsExhausted(state.base_filename.clone()))?;
        state.sample_count = 0;
        state.continuation_start_time = now;
        state.last_update_time = now;
        state.running = true;
        state.normal_exit = false;
        self.save(state)?;
        info!(
            "Prepared continuation {} of {}",
            state.continuation_count, state.base_filename
        );
        Ok(())
    }
}
