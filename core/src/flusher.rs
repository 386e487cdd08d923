use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::FlusherConfig;
use crate::store::{FavoriteStore, TickOutcome};
use crate::Result;

/// Background thread driving a store's debounced work.
///
/// Dropping the handle stops the thread after one last flush, so nothing
/// scheduled before shutdown is lost.
pub struct FlusherHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<TickOutcome>>,
}

impl FlusherHandle {
    /// Stop the thread and wait for its final flush.
    pub fn stop(mut self) -> TickOutcome {
        self.shutdown().unwrap_or_default()
    }

    fn shutdown(&mut self) -> Option<TickOutcome> {
        self.stop.store(true, Ordering::SeqCst);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                warn!("Favorites flusher panicked");
                None
            }
        }
    }
}

impl Drop for FlusherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// [`spawn_flusher`] at the configured interval.
pub fn spawn_configured(store: Arc<FavoriteStore>, config: &FlusherConfig) -> Result<FlusherHandle> {
    spawn_flusher(store, config.interval())
}

/// Tick `store` every `interval` until the handle is stopped or dropped.
pub fn spawn_flusher(store: Arc<FavoriteStore>, interval: Duration) -> Result<FlusherHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread = thread::Builder::new()
        .name("favlink-flusher".to_string())
        .spawn({
            let stop = Arc::clone(&stop);
            move || {
                debug!(interval_ms = interval.as_millis() as u64, "Favorites flusher started");
                while !stop.load(Ordering::SeqCst) {
                    store.tick();
                    thread::sleep(interval);
                }
                let outcome = final_flush(&store);
                debug!(saved = outcome.saved, "Favorites flusher stopped");
                outcome
            }
        })?;

    Ok(FlusherHandle {
        stop,
        thread: Some(thread),
    })
}

/// Flush once more on a failed save. Nothing ticks after this, so a second
/// failure leaves the state unsaved.
fn final_flush(store: &FavoriteStore) -> TickOutcome {
    let outcome = store.flush();
    if !outcome.save_failed {
        return outcome;
    }
    warn!("Final favorites save failed, retrying once");
    let retry = store.flush();
    if retry.save_failed {
        error!(records = store.len(), "Favorites could not be saved before shutdown");
    }
    TickOutcome {
        synced: outcome.synced || retry.synced,
        ..retry
    }
}
