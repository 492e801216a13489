//! Test helpers

use crate::Watchdog;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Arming {
    history: Vec<u64>,
    armed: Option<u64>,
    last_timeout: Option<Duration>,
}

/// Watchdog that never fires on its own.
///
/// Tests read back what was armed and deliver expiries by hand.
#[derive(Clone, Default)]
pub struct RecordingWatchdog {
    inner: Arc<Mutex<Arming>>,
}

impl RecordingWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every generation armed so far, in order
    pub fn armed_generations(&self) -> Vec<u64> {
        self.lock().history.clone()
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }

    pub fn last_armed(&self) -> Option<u64> {
        self.lock().history.last().copied()
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.lock().last_timeout
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Arming> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Watchdog for RecordingWatchdog {
    fn arm(&mut self, generation: u64, timeout: Duration) {
        let mut inner = self.lock();
        inner.history.push(generation);
        inner.armed = Some(generation);
        inner.last_timeout = Some(timeout);
    }

    fn disarm(&mut self) {
        self.lock().armed = None;
    }
}
