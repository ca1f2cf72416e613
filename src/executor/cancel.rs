//! Run-wide cancellation
//!
//! One [`CancelSignal`] is created per process. Ctrl+C interrupts it and the
//! optional `--timeout` expires it; both cancel the same token, but the
//! signal remembers which one fired so the run can report an interrupt
//! (clean exit) differently from a timeout (error).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RepobinError;

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    timed_out: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to every suspending operation.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel on user request.
    pub fn interrupt(&self) {
        if !self.token.is_cancelled() {
            info!("interrupt received, finishing in-flight work");
        }
        self.token.cancel();
    }

    /// Cancel because the time budget ran out.
    pub fn expire(&self) {
        if !self.token.is_cancelled() {
            self.timed_out.store(true, Ordering::SeqCst);
            warn!("time limit reached, finishing in-flight work");
        }
        self.token.cancel();
    }

    /// Error describing why the run stopped.
    pub fn error(&self) -> RepobinError {
        if self.timed_out.load(Ordering::SeqCst) {
            RepobinError::Timeout
        } else {
            RepobinError::Cancelled
        }
    }

    /// Expire after `limit` unless cancelled first.
    pub fn arm_timeout(&self, limit: Duration) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(limit) => signal.expire(),
                _ = signal.token.cancelled() => {}
            }
        })
    }

    /// Interrupt on Ctrl+C.
    pub fn listen_for_interrupt(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => signal.interrupt(),
                    Err(err) => warn!("failed to listen for Ctrl+C: {err}"),
                },
                _ = signal.token.cancelled() => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_is_cancellation() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
        signal.interrupt();
        assert!(signal.token().is_cancelled());
        assert!(signal.error().is_cancellation());
    }

    #[test]
    fn test_expire_is_timeout() {
        let signal = CancelSignal::new();
        signal.expire();
        assert!(matches!(signal.error(), RepobinError::Timeout));
    }

    #[test]
    fn test_first_cause_wins() {
        let signal = CancelSignal::new();
        signal.interrupt();
        signal.expire();
        assert!(matches!(signal.error(), RepobinError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_timeout_expires() {
        let signal = CancelSignal::new();
        let handle = signal.arm_timeout(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio_test::assert_ok!(handle.await);
        assert!(matches!(signal.error(), RepobinError::Timeout));
    }

    #[tokio::test]
    async fn test_arm_timeout_stops_when_cancelled() {
        let signal = CancelSignal::new();
        let handle = signal.arm_timeout(Duration::from_secs(3600));
        signal.interrupt();
        tokio_test::assert_ok!(handle.await);
        assert!(matches!(signal.error(), RepobinError::Cancelled));
    }
}
