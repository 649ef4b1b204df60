use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::error::{ExtractError, Result};

/// Cancellation flag plus optional deadline, checked before every request and
/// between polls. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns an error if the token was cancelled or its deadline passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ExtractError::Timeout {
                    message: "extraction deadline exceeded".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early when cancelled. Never sleeps past the deadline.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        const SLICE: Duration = Duration::from_millis(50);
        let wake_at = Instant::now().checked_add(duration);
        loop {
            self.check()?;
            let now = Instant::now();
            if wake_at.map_or(false, |wake_at| now >= wake_at) {
                return Ok(());
            }
            let mut step = wake_at.map_or(SLICE, |wake_at| (wake_at - now).min(SLICE));
            if let Some(deadline) = self.deadline {
                step = step.min(deadline.saturating_duration_since(now));
            }
            std::thread::sleep(step);
        }
    }
}
