use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared stop signal for one run: an explicit flag plus an optional deadline.
///
/// Clones observe the same flag, so a caller can hand one clone to the
/// pipeline and cancel from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Same flag, with the deadline tightened to at most `timeout` from now.
    pub fn limited_to(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(
                self.deadline
                    .map(|deadline| deadline.min(candidate))
                    .unwrap_or(candidate),
            ),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::CancellationToken;

    #[test]
    fn clones_share_the_cancel_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn elapsed_deadline_counts_as_cancelled() {
        let token = CancellationToken::with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());

        let generous = CancellationToken::with_timeout(Duration::from_secs(3600));
        assert!(!generous.is_cancelled());
        assert!(!CancellationToken::new().is_cancelled());
    }

    #[test]
    fn limited_tokens_keep_the_shared_flag_and_earliest_deadline() {
        let token = CancellationToken::with_timeout(Duration::ZERO);
        assert!(token.limited_to(Duration::from_secs(3600)).is_cancelled());

        let open = CancellationToken::new();
        let limited = open.limited_to(Duration::from_secs(3600));
        assert!(!limited.is_cancelled());
        open.cancel();
        assert!(limited.is_cancelled());
    }
}
