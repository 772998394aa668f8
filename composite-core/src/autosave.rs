//! One-shot delayed save after the composite value changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::SaveTrigger;

/// Delay between a value change and the save it triggers.
pub const DEFAULT_AUTO_SAVE_DELAY: Duration = Duration::from_millis(500);

/// Fires the injected save at most once until [`reset`](Self::reset).
pub struct AutoSave {
    saver: Arc<dyn SaveTrigger>,
    delay: Duration,
    fired: AtomicBool,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutoSave {
    pub fn new(saver: Arc<dyn SaveTrigger>, delay: Duration) -> Self {
        Self {
            saver,
            delay,
            fired: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    /// Schedule the save unless one already fired. Returns whether it was scheduled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("Auto-save already fired, skipping");
            return false;
        }

        let saver = self.saver.clone();
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match saver.save().await {
                Ok(()) => info!("Auto-save completed"),
                Err(e) => warn!(error = %e, "Auto-save failed"),
            }
        });

        debug!(delay_ms = delay.as_millis() as u64, "Auto-save scheduled");
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        // Only the newest save may still be waiting.
        if let Some(previous) = previous {
            previous.abort();
        }
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Re-arm the one-time flag.
    pub fn reset(&self) {
        self.fired.store(false, Ordering::SeqCst);
    }

    /// Abort a save that is still waiting out its delay.
    pub fn cancel_pending(&self) {
        if let Some(handle) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_memory::RecordingSaveTrigger;

    fn auto_save() -> (AutoSave, Arc<RecordingSaveTrigger>) {
        let saver = Arc::new(RecordingSaveTrigger::new());
        (AutoSave::new(saver.clone(), DEFAULT_AUTO_SAVE_DELAY), saver)
    }

    #[tokio::test(start_paused = true)]
    async fn saves_once_after_delay() {
        let (auto_save, saver) = auto_save();
        assert!(auto_save.schedule());
        assert!(!auto_save.schedule());

        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY / 2).await;
        assert_eq!(saver.save_count(), 0);

        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY).await;
        assert_eq!(saver.save_count(), 1);
        assert!(auto_save.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_rearms() {
        let (auto_save, saver) = auto_save();
        auto_save.schedule();
        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY * 2).await;

        auto_save.reset();
        assert!(!auto_save.has_fired());
        assert!(auto_save.schedule());
        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY * 2).await;
        assert_eq!(saver.save_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_not_retried() {
        let (auto_save, saver) = auto_save();
        saver.set_failing(true);
        auto_save.schedule();
        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY * 4).await;
        assert_eq!(saver.save_count(), 1);
        assert!(!auto_save.schedule());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_prevents_save() {
        let (auto_save, saver) = auto_save();
        auto_save.schedule();
        auto_save.cancel_pending();
        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY * 2).await;
        assert_eq!(saver.save_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduled_save_replaces_the_waiting_one() {
        let (auto_save, saver) = auto_save();
        auto_save.schedule();
        auto_save.reset();
        auto_save.schedule();
        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY * 2).await;
        assert_eq!(saver.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_reschedule_prevents_every_save() {
        let (auto_save, saver) = auto_save();
        auto_save.schedule();
        auto_save.reset();
        auto_save.schedule();
        auto_save.cancel_pending();
        tokio::time::sleep(DEFAULT_AUTO_SAVE_DELAY * 2).await;
        assert_eq!(saver.save_count(), 0);
    }
}
