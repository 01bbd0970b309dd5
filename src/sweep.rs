//! Fixed-interval background sweep
//!
//! Drives batch work (pruning stale buffer entries, flushing to storage) on
//! its own thread. A long-running sweep is skipped, never queued: ticks that
//! arrive while a sweep is in flight are dropped. Stop is idempotent and
//! joins the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SweepScheduler {
    interval: Duration,
    in_flight: Arc<AtomicBool>,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SweepScheduler {
    pub fn new(interval: Duration) -> Self {
        SweepScheduler {
            interval,
            in_flight: Arc::new(AtomicBool::new(false)),
            shutdown: None,
            handle: None,
        }
    }

    /// Spawn the worker; calling again while running is a no-op
    pub fn start<F>(&mut self, job: F)
    where
        F: Fn() + Send + 'static,
    {
        if self.handle.is_some() {
            warn!("sweep scheduler already running");
            return;
        }
        let (tx, rx) = channel();
        let interval = self.interval;
        let in_flight = Arc::clone(&self.in_flight);

        let handle = std::thread::Builder::new()
            .name("sweep".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "sweep worker started");
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            run_guarded(&in_flight, &job);
                        }
                        // Shutdown signal or sender dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("sweep worker stopped");
            })
            .expect("failed to spawn sweep thread");

        self.shutdown = Some(tx);
        self.handle = Some(handle);
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signal shutdown and join the worker; safe to call repeatedly
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // Ignore send failure; the worker exits on disconnect too
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the job unless a previous run is still in flight
fn run_guarded<F: Fn()>(in_flight: &AtomicBool, job: &F) {
    if in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        debug!("sweep still in flight, skipping tick");
        return;
    }
    job();
    in_flight.store(false, Ordering::Release);
}
