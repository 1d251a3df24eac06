//! Process-wide scan state
//!
//! ```text
//! Idle ──try_begin──► Running ──complete──► Completed(t)
//!   ▲                    │                      │
//!   └──────abort─────────┘   ◄───try_begin──────┘ (back to Running)
//! ```
//!
//! Shared by every connection; all transitions go through one mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Running,
    /// Last scan finished at this time
    Completed(SystemTime),
}

#[derive(Debug, Clone, Default)]
pub struct SharedScanState {
    inner: Arc<Mutex<ScanState>>,
}

impl SharedScanState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScanState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> ScanState {
        *self.lock()
    }

    /// Move to `Running`. Returns false (and changes nothing) when a scan is
    /// already running.
    pub fn try_begin(&self) -> bool {
        let mut state = self.lock();
        if *state == ScanState::Running {
            return false;
        }
        *state = ScanState::Running;
        true
    }

    /// The running scan finished
    pub fn complete(&self) {
        let mut state = self.lock();
        if *state == ScanState::Running {
            *state = ScanState::Completed(SystemTime::now());
        }
    }

    /// The running scan failed or never started
    pub fn abort(&self) {
        let mut state = self.lock();
        if *state == ScanState::Running {
            *state = ScanState::Idle;
        }
    }
}
