// src/session/runner.rs

use super::clock::Clock;
use super::monitor::{Monitor, TickOutcome};
use super::SessionError;
use crate::transport::Exchange;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The periodic sampler: one thread ticking a [`Monitor`] at its interval.
///
/// The thread owns the monitor while it runs and hands it back when joined.
/// It also ends by itself if the monitor is not (or no longer) running.
pub struct SamplingTask<T, C>
where
    T: Exchange + Send + 'static,
    C: Clock + Send + 'static,
{
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Monitor<T, C>>,
}

impl<T, C> SamplingTask<T, C>
where
    T: Exchange + Send + 'static,
    C: Clock + Send + 'static,
{
    pub fn spawn(mut monitor: Monitor<T, C>) -> Result<Self, SessionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let poll = Duration::from_millis(monitor.config().stop_poll_ms.max(1));

        let handle = thread::Builder::new()
            .name("co2-sampler".into())
            .spawn(move || {
                let interval = Duration::from_secs(u64::from(monitor.interval_sec().unwrap_or(1)));
                info!("Sampler running every {:?}", interval);
                while monitor.is_running() && !stop_flag.load(Ordering::Acquire) {
                    let next = Instant::now() + interval;
                    match monitor.tick() {
                        Ok(TickOutcome::Recorded { sample_count, checkpointed, .. }) => {
                            debug!("Sample {} written{}", sample_count, if checkpointed { ", checkpointed" } else { "" });
                        }
                        Ok(TickOutcome::Skipped) => {}
                        Err(e) => error!("Sample not written: {}", e),
                    }
                    sleep_until(next, poll, &stop_flag);
                }
                debug!("Sampler exiting");
                monitor
            })
            .map_err(SessionError::Spawn)?;

        Ok(SamplingTask { stop, handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Asks the sampler to stop and waits for it, returning the monitor untouched.
    pub fn join(self) -> Result<Monitor<T, C>, SessionError> {
        self.stop.store(true, Ordering::Release);
        self.handle.join().map_err(|_| SessionError::TaskPanicked)
    }

    /// Stops sampling and ends the session in an orderly way.
    /// Returns the monitor and the number of samples in the closed file.
    pub fn stop(self) -> Result<(Monitor<T, C>, u32), SessionError> {
        let mut monitor = self.join()?;
        let samples = monitor.stop()?;
        Ok((monitor, samples))
    }

    /// Stops sampling and runs the power-loss path.
    pub fn emergency_shutdown(self) -> Result<Monitor<T, C>, SessionError> {
        let mut monitor = self.join()?;
        monitor.emergency_shutdown()?;
        Ok(monitor)
    }
}

/// Sleeps until `deadline` in slices of `poll`, returning early once `stop` is set.
/// Returns true if it was interrupted.
pub fn sleep_until(deadline: Instant, poll: Duration, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Acquire) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(poll.min(deadline - now));
    }
}
