//! Live parameter handoff from the control side to the worker thread.

use lumaveil_core::settings::CorrectionData;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// One queued correction change for a monitor mode.
#[derive(Debug, Clone)]
pub struct PendingCorrection {
    pub monitor_index: usize,
    pub hdr: bool,
    pub data: CorrectionData,
}

/// Mutex-backed queue with an atomic fast path so the worker skips the lock
/// entirely on the common no-update frame.
#[derive(Default)]
pub struct UpdateQueue {
    pending: Mutex<Vec<PendingCorrection>>,
    has_pending: AtomicBool,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a correction change. Any older queued update for the same
    /// monitor and mode is dropped; the newest submission wins.
    pub fn push(&self, update: PendingCorrection) {
        let mut pending = self.pending.lock();
        pending.retain(|p| p.monitor_index != update.monitor_index || p.hdr != update.hdr);
        pending.push(update);
        self.has_pending.store(true, Ordering::Release);
    }

    /// Take everything queued, oldest first. Returns empty without locking
    /// when nothing was pushed since the last drain.
    pub fn drain(&self) -> Vec<PendingCorrection> {
        if !self.has_pending.load(Ordering::Acquire) {
            return Vec::new();
        }
        let mut pending = self.pending.lock();
        self.has_pending.store(false, Ordering::Release);
        std::mem::take(&mut *pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumaveil_core::settings::CorrectionSettings;

    fn update(monitor_index: usize, hdr: bool, grayscale: bool) -> PendingCorrection {
        let mut settings = CorrectionSettings::default();
        settings.grayscale.enabled = grayscale;
        PendingCorrection {
            monitor_index,
            hdr,
            data: settings.resolve(hdr),
        }
    }

    #[test]
    fn drain_without_pushes_is_empty() {
        let queue = UpdateQueue::new();
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn rapid_updates_for_one_mode_keep_only_the_latest() {
        let queue = UpdateQueue::new();
        queue.push(update(0, true, false));
        queue.push(update(0, true, true));

        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].data.grayscale.enabled);
    }

    #[test]
    fn distinct_monitor_mode_pairs_all_survive() {
        let queue = UpdateQueue::new();
        queue.push(update(0, false, false));
        queue.push(update(0, true, false));
        queue.push(update(1, false, false));

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn drain_resets_the_fast_path() {
        let queue = UpdateQueue::new();
        queue.push(update(2, false, true));
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
        queue.push(update(2, false, false));
        assert_eq!(queue.drain().len(), 1);
    }
}
