//! Serializes submissions: one in-flight session at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Admission control for new sessions. A submission is admitted only when
/// the trimmed input is non-empty and no other submission holds the lock.
#[derive(Debug, Clone, Default)]
pub struct SubmissionGate {
    locked: Arc<AtomicBool>,
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the permit on admission. The lock is held for exactly the
    /// permit's lifetime, so every exit path of the holder releases it.
    pub fn try_admit(&self, text: &str) -> Option<SubmissionPermit> {
        if text.trim().is_empty() {
            return None;
        }
        if self
            .locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        Some(SubmissionPermit {
            locked: Arc::clone(&self.locked),
        })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

/// Held while a session is in flight; dropping it reopens the gate.
#[derive(Debug)]
pub struct SubmissionPermit {
    locked: Arc<AtomicBool>,
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::SeqCst);
    }
}
