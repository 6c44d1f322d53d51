// src/session/monitor.rs

use super::clock::{Clock, TimestampGuard};
use super::csv_log::{last_record, CsvLog, CsvRecord, EMERGENCY_MARKER};
use super::files::session_files;
use super::filename::{continuation_filename, session_filename};
use super::state_store::{PersistentState, StateStore};
use super::SessionError;
use crate::config::{ConfigError, MonitorConfig};
use crate::sensor::{Co2Reading, S8Sensor};
use crate::transport::Exchange;
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// What [`Monitor::boot`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// The state store could not be opened; recovery was skipped.
    StoreUnavailable,
    /// No interrupted session on record.
    CleanStart,
    /// An interrupted session exists but the sensor did not answer. The record
    /// is left in place so a later boot can still resume it.
    SensorUnavailable { base_filename: String, continuation_count: u16 },
    /// The continuation could not be persisted or its file opened; the record was cleared.
    ResumeAborted,
    /// Logging continues in a new continuation file.
    Resumed { path: PathBuf, continuation_count: u16 },
}

/// Result of one sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A record was appended. `checkpointed` tells whether the state record was updated too.
    Recorded { record: CsvRecord, sample_count: u32, checkpointed: bool },
    /// The sensor gave no usable reading; nothing was written.
    Skipped,
}

/// Snapshot for status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStatus {
    pub phase: Phase,
    pub file: Option<PathBuf>,
    pub interval_sec: u32,
    pub sample_count: u32,
    pub continuation_count: u16,
    /// Session time covered so far, across continuations: the elapsed value
    /// the next record will carry. Zero when idle.
    pub session_duration_sec: u64,
    pub last_reading: Option<Co2Reading>,
}

struct ActiveSession {
    log: CsvLog,
    base_filename: String,
    interval_sec: u32,
    sample_count: u32,
    elapsed_offset: u64,
    continuation_count: u16,
    guard: TimestampGuard,
}

/// Owns the sensor, the clock, the state record and the current session file.
pub struct Monitor<T: Exchange, C: Clock> {
    config: MonitorConfig,
    sensor: S8Sensor<T>,
    clock: C,
    store: Option<StateStore>,
    phase: Phase,
    session: Option<ActiveSession>,
    last_reading: Option<Co2Reading>,
}

impl<T: Exchange, C: Clock> Monitor<T, C> {
    pub fn new(config: MonitorConfig, transport: T, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let sensor = S8Sensor::new(transport)
            .with_slave(config.slave())
            .with_alarm_threshold(config.alarm_threshold_ppm);
        Ok(Monitor {
            config,
            sensor,
            clock,
            store: None,
            phase: Phase::Idle,
            session: None,
            last_reading: None,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Direct access to the sensor for administrative commands.
    pub fn sensor_mut(&mut self) -> &mut S8Sensor<T> {
        &mut self.sensor
    }

    pub fn interval_sec(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.interval_sec)
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            phase: self.phase,
            file: self.session.as_ref().map(|s| s.log.path().to_path_buf()),
            interval_sec: self.session.as_ref().map_or(self.config.interval_sec, |s| s.interval_sec),
            sample_count: self.session.as_ref().map_or(0, |s| s.sample_count),
            continuation_count: self.session.as_ref().map_or(0, |s| s.continuation_count),
            session_duration_sec: self.session.as_ref().map_or(0, ActiveSession::next_elapsed),
            last_reading: self.last_reading,
        }
    }

    fn store(&mut self) -> Option<&StateStore> {
        if self.store.is_none() {
            match StateStore::open(self.config.state_path()) {
                Ok(store) => self.store = Some(store),
                Err(e) => warn!("Session state store unavailable: {}", e),
            }
        }
        self.store.as_ref()
    }

    /// Startup sequence: resume an interrupted session if there is one.
    pub fn boot(&mut self) -> BootOutcome {
        let store = match self.store() {
            Some(store) => store.clone(),
            None => return BootOutcome::StoreUnavailable,
        };

        if !store.needs_recovery() {
            debug!("No interrupted session to recover");
            return BootOutcome::CleanStart;
        }
        let mut state = match store.load() {
            Ok(state) => state,
            Err(e) => {
                warn!("Session state vanished during recovery: {}", e);
                return BootOutcome::CleanStart;
            }
        };
        info!(
            "Interrupted session found: {} (continuation {}, {} samples)",
            state.base_filename, state.continuation_count, state.total_samples
        );

        // One reading; a dead sensor must not consume the record.
        if let Err(e) = self.sensor.read_co2() {
            warn!("Sensor not responding, leaving session for a later boot: {}", e);
            return BootOutcome::SensorUnavailable {
                base_filename: state.base_filename,
                continuation_count: state.continuation_count,
            };
        }

        let last_logged = self.last_logged_record(&state);
        let resume_time = self.resume_time(&state, last_logged.as_ref());
        if let Err(e) = store.prepare_continuation(&mut state, resume_time) {
            error!("Failed to persist continuation, abandoning recovery: {}", e);
            clear_quietly(&store);
            return BootOutcome::ResumeAborted;
        }

        let file_name = continuation_filename(&state.base_filename, state.continuation_count);
        let path = self.config.log_dir.join(file_name);
        let log = match CsvLog::open(&path) {
            Ok(log) => log,
            Err(e) => {
                error!("Failed to open continuation file {:?}: {}", path, e);
                clear_quietly(&store);
                return BootOutcome::ResumeAborted;
            }
        };

        // The record already says "running"; marking it started again would
        // reset the continuation counter.
        self.session = Some(self.resumed_session(log, &state, last_logged));
        self.phase = Phase::Running;
        info!("Resumed logging to {:?}", path);
        BootOutcome::Resumed { path, continuation_count: state.continuation_count }
    }

    /// Newest data row of the interrupted session. The crashed continuation
    /// may have no rows yet, so earlier files are searched too.
    fn last_logged_record(&self, state: &PersistentState) -> Option<CsvRecord> {
        let files = match session_files(&self.config.log_dir, &state.base_filename) {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list session files while resuming: {}", e);
                return None;
            }
        };
        files.iter().rev().find_map(|path| match last_record(path) {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to read {:?} while resuming: {}", path, e);
                None
            }
        })
    }

    /// Time the continuation starts at. A reset clock is replaced by the latest
    /// time known to be good: the record's own times or one interval after the
    /// last logged row.
    fn resume_time(&self, state: &PersistentState, last_logged: Option<&CsvRecord>) -> i64 {
        let now = self.clock.now();
        let threshold = self.config.clock_plausible_after;
        if now >= threshold {
            return now;
        }
        let after_last_row = last_logged.map_or(i64::MIN, |r| r.timestamp + i64::from(state.interval_sec.max(1)));
        let best = [
            state.session_start_time,
            state.last_update_time,
            state.continuation_start_time,
            after_last_row,
        ]
        .into_iter()
        .fold(threshold, i64::max);
        warn!("Clock reading {} implausible at resume, continuing from {}", now, best);
        best
    }

    fn resumed_session(&self, log: CsvLog, state: &PersistentState, last_logged: Option<CsvRecord>) -> ActiveSession {
        let threshold = self.config.clock_plausible_after;
        let interval_sec = state.interval_sec.max(1);
        let by_samples = u64::from(state.total_samples) * u64::from(interval_sec);
        let by_clock = if state.session_start_time >= threshold
            && state.continuation_start_time >= state.session_start_time
        {
            (state.continuation_start_time - state.session_start_time) as u64
        } else {
            0
        };
        // Rows written after the last checkpoint are not in total_samples.
        let by_log = last_logged.map_or(0, |r| r.elapsed_seconds + u64::from(interval_sec));

        ActiveSession {
            log,
            base_filename: state.base_filename.clone(),
            interval_sec,
            sample_count: 0,
            elapsed_offset: by_samples.max(by_clock).max(by_log),
            continuation_count: state.continuation_count,
            guard: TimestampGuard::new(threshold, interval_sec, state.continuation_start_time, 0),
        }
    }

    /// Starts a new session. `interval_sec` defaults to the configured interval.
    pub fn start(&mut self, interval_sec: Option<u32>) -> Result<PathBuf, SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::AlreadyRunning);
        }
        let interval_sec = interval_sec.unwrap_or(self.config.interval_sec);
        if interval_sec == 0 {
            return Err(SessionError::InvalidInterval(interval_sec));
        }
        self.phase = Phase::Starting;

        let now = self.clock.now();
        let base = session_filename(now);
        let path = self.config.log_dir.join(&base);

        if let Some(store) = self.store().cloned() {
            // Logging without a durable record still beats not logging.
            if let Err(e) = store.mark_started(&base, interval_sec, now) {
                warn!("Failed to save session state, continuing without recovery: {}", e);
            }
        }

        let log = match CsvLog::open(&path) {
            Ok(log) => log,
            Err(e) => {
                error!("Failed to create session file {:?}: {}", path, e);
                if let Some(store) = self.store.as_ref() {
                    if let Err(e) = store.mark_stopped() {
                        warn!("Failed to mark aborted session stopped: {}", e);
                    }
                }
                self.phase = Phase::Idle;
                return Err(SessionError::Log(e));
            }
        };

        self.session = Some(ActiveSession {
            log,
            base_filename: base,
            interval_sec,
            sample_count: 0,
            elapsed_offset: 0,
            continuation_count: 0,
            guard: TimestampGuard::new(self.config.clock_plausible_after, interval_sec, now, 0),
        });
        self.phase = Phase::Running;
        info!("Logging started: {:?}, every {} s", path, interval_sec);
        Ok(path)
    }

    /// Takes one sample and appends it to the session file.
    ///
    /// A failed or out-of-range sensor read skips the tick. A failed append is
    /// returned as an error and does not count as a sample.
    pub fn tick(&mut self) -> Result<TickOutcome, SessionError> {
        if self.phase != Phase::Running {
            return Err(SessionError::NotRunning);
        }
        let ppm = match self.sensor.read_co2() {
            Ok(ppm) => ppm,
            Err(e) => {
                warn!("CO2 read failed, skipping sample: {}", e);
                return Ok(TickOutcome::Skipped);
            }
        };
        let clock_reading = self.clock.now();
        let reading = Co2Reading::new(ppm, self.sensor.alarm_threshold_ppm(), clock_reading);
        self.last_reading = Some(reading);
        if !reading.valid {
            warn!("CO2 reading {} ppm out of range, skipping sample", ppm);
            return Ok(TickOutcome::Skipped);
        }
        if reading.alarm {
            warn!("CO2 at {} ppm, at or above alarm threshold", ppm);
        }

        let checkpoint_every = self.config.checkpoint_every;
        let session = self.session.as_mut().ok_or(SessionError::NotRunning)?;
        let timestamp = session.guard.resolve(clock_reading, session.sample_count);
        if timestamp.is_extrapolated() {
            warn!("Clock reading {} implausible, using {}", clock_reading, timestamp.value());
        }
        let record = CsvRecord {
            timestamp: timestamp.value(),
            elapsed_seconds: session.next_elapsed(),
            co2_ppm: ppm,
        };
        session.log.append(&record)?;
        session.sample_count += 1;
        let sample_count = session.sample_count;

        let mut checkpointed = false;
        if sample_count % checkpoint_every == 0 {
            if let Some(store) = self.store.as_ref() {
                match store.update(sample_count, record.timestamp) {
                    Ok(_) => checkpointed = true,
                    Err(e) => warn!("Checkpoint at sample {} failed: {}", sample_count, e),
                }
            }
        }

        Ok(TickOutcome::Recorded { record, sample_count, checkpointed })
    }

    /// Orderly stop: closes the file and marks the record stopped.
    /// Returns the number of samples in the closed file.
    pub fn stop(&mut self) -> Result<u32, SessionError> {
        if self.phase != Phase::Running {
            return Err(SessionError::NotRunning);
        }
        self.phase = Phase::Stopping;
        let session = self.session.take().ok_or(SessionError::NotRunning)?;
        let samples = session.sample_count;
        let path = session.log.path().to_path_buf();

        let closed = session.log.close();
        let marked = match self.store.as_ref() {
            Some(store) => store.mark_stopped(),
            None => Ok(()),
        };
        self.phase = Phase::Idle;

        closed?;
        marked?;
        info!("Logging stopped: {:?}, {} samples", path, samples);
        Ok(samples)
    }

    /// Power-loss path: appends the emergency marker and closes the file, but
    /// leaves the state record saying "running" so the next boot resumes.
    ///
    /// Does nothing if no session is running.
    pub fn emergency_shutdown(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Running {
            return Ok(());
        }
        self.phase = Phase::Stopping;
        let result = match self.session.take() {
            Some(mut session) => {
                let marked = session.log.append_marker(EMERGENCY_MARKER);
                let closed = session.log.close();
                marked.and(closed)
            }
            None => Ok(()),
        };
        self.phase = Phase::Idle;
        warn!("Emergency shutdown complete");
        result.map_err(SessionError::Log)
    }

    /// Path of the current session file, if any.
    pub fn current_file(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.log.path())
    }

    /// Every file of the running session, base file first. Empty when idle.
    pub fn session_files(&self) -> io::Result<Vec<PathBuf>> {
        match self.session.as_ref() {
            Some(session) => session_files(&self.config.log_dir, &session.base_filename),
            None => Ok(Vec::new()),
        }
    }
}

impl ActiveSession {
    fn next_elapsed(&self) -> u64 {
        self.elapsed_offset + u64::from(self.sample_count) * u64::from(self.interval_sec)
    }
}

fn clear_quietly(store: &StateStore) {
    if let Err(e) = store.clear() {
        error!("Failed to clear session state: {}", e);
    }
}
