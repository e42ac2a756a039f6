//! Cooperative cancellation for an otherwise fully blocking process.
//!
//! SIGINT flips a shared flag; every sleep in the daemon goes through
//! [`Interrupt::sleep`], which polls the flag in short slices so a Ctrl-C is
//! honored promptly instead of only between polling cycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const POLL_SLICE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT (and SIGTERM on unix) into this flag.
    pub fn install_signal_handler(&self) -> Result<(), String> {
        let flag = Arc::clone(&self.flag);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .map_err(|e| format!("installing signal handler failed: {}", e))
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Block for `duration`, waking early if the flag is raised.
    ///
    /// Returns `true` when the full duration elapsed and `false` when the
    /// sleep was cut short by an interrupt.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.interrupted() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(POLL_SLICE));
        }
    }
}
