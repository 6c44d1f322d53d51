// src/session/mod.rs

//! Crash-recoverable CSV logging sessions.
//!
//! A session writes one CSV file per power cycle. The first file is named
//! after the start time; every resume after an unclean restart appends a
//! continuation counter (`..._session_001.csv`, `..._session_002.csv`). A small
//! checksummed state record ties the files together.

pub mod clock;
pub mod csv_log;
pub mod files;
pub mod filename;
pub mod monitor;
pub mod runner;
pub mod state_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, SystemClock, Timestamp, TimestampGuard};
pub use csv_log::{last_record, CsvLog, CsvRecord, CSV_HEADER, EMERGENCY_MARKER};
pub use files::{list_data_files, session_files, DataFile};
pub use filename::{continuation_filename, continuation_index, session_filename};
pub use monitor::{BootOutcome, Monitor, MonitorStatus, Phase, TickOutcome};
pub use runner::SamplingTask;
pub use state_store::{PersistentState, StateError, StateStore};

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A logging session is already running")]
    AlreadyRunning,

    #[error("No logging session is running")]
    NotRunning,

    #[error("Sampling interval must be at least 1 second, got {0}")]
    InvalidInterval(u32),

    #[error("Session file error: {0}")]
    Log(#[from] io::Error),

    #[error("Session state error: {0}")]
    State(#[from] StateError),

    #[error("Failed to spawn sampler thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Sampler thread panicked")]
    TaskPanicked,
}
