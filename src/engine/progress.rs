//! Progress reporting hooks.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Notified once per completed block.
///
/// The engine calls this from worker threads but never concurrently: calls
/// happen under the run's merge lock, so `fraction` is non-decreasing across
/// calls and reaches `1.0` on the last block.
pub trait ProgressObserver: Sync {
    fn block_completed(&self, fraction: f64);
}

impl<F> ProgressObserver for F
where
    F: Fn(f64) + Sync,
{
    fn block_completed(&self, fraction: f64) {
        self(fraction)
    }
}

/// Logs progress through `tracing` each time another 10 % is reached.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_decile: AtomicUsize,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressObserver for LogProgress {
    fn block_completed(&self, fraction: f64) {
        let decile = (fraction.clamp(0.0, 1.0) * 10.0).floor() as usize;
        if decile > self.last_decile.load(Ordering::Relaxed) {
            self.last_decile.store(decile, Ordering::Relaxed);
            info!(percent = decile * 10, "fit progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closures_are_observers() {
        let seen = Mutex::new(Vec::new());
        let observer = |f: f64| seen.lock().unwrap().push(f);
        observer.block_completed(0.5);
        observer.block_completed(1.0);
        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn log_progress_tracks_last_decile() {
        let p = LogProgress::new();
        p.block_completed(0.05);
        assert_eq!(p.last_decile.load(Ordering::Relaxed), 0);
        p.block_completed(0.34);
        assert_eq!(p.last_decile.load(Ordering::Relaxed), 3);
        p.block_completed(1.0);
        assert_eq!(p.last_decile.load(Ordering::Relaxed), 10);
    }
}
