use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// "Submission in flight" flag of one checkout session.
///
/// [`SubmissionLatch::try_acquire`] hands out at most one [`SubmissionGuard`]
/// at a time. The latch is released when the guard is dropped, on every exit
/// path including a panic in the task holding it.
#[derive(Debug, Clone, Default)]
pub struct SubmissionLatch {
    in_flight: Arc<AtomicBool>,
}

impl SubmissionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<SubmissionGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmissionGuard {
                in_flight: Arc::clone(&self.in_flight),
            })
    }

    pub fn is_held(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct SubmissionGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_guard_at_a_time() {
        let latch = SubmissionLatch::new();
        let guard = latch.try_acquire().expect("first acquire");
        assert!(latch.is_held());
        assert!(latch.try_acquire().is_none());

        drop(guard);
        assert!(!latch.is_held());
        assert!(latch.try_acquire().is_some());
    }

    #[tokio::test]
    async fn panicking_holder_releases_the_latch() {
        let latch = SubmissionLatch::new();
        let guard = latch.try_acquire().unwrap();

        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("order call blew up");
        });
        assert!(task.await.unwrap_err().is_panic());

        assert!(!latch.is_held());
    }

    #[test]
    fn clones_share_the_flag() {
        let latch = SubmissionLatch::new();
        let other = latch.clone();
        let _guard = latch.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }
}
