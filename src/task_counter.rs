use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Counting barrier over in-flight work.
///
/// Every tracked unit holds a [`TaskToken`]. The count goes up when the token
/// is created and down when it is dropped, so the decrement runs on every exit
/// path of the work, unwinding included. [`TaskCounter::wait_idle`] resolves
/// once no tokens remain.
#[derive(Debug, Default)]
pub struct TaskCounter {
    live: AtomicUsize,
    idle: Notify,
}

impl TaskCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one unit of work. The returned token must live as long as the
    /// work does.
    pub fn track(self: &Arc<Self>) -> TaskToken {
        self.live.fetch_add(1, Ordering::AcqRel);
        TaskToken {
            counter: Arc::clone(self),
        }
    }

    /// Number of tokens currently alive.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Wait until the live count reaches zero.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // register interest before checking so a concurrent drop can't be missed
            notified.as_mut().enable();
            if self.live() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Proof that a unit of work is in flight.
#[derive(Debug)]
pub struct TaskToken {
    counter: Arc<TaskCounter>,
}

impl Drop for TaskToken {
    fn drop(&mut self) {
        if self.counter.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.counter.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_when_nothing_tracked() {
        let counter = Arc::new(TaskCounter::new());
        assert_eq!(counter.live(), 0);
        tokio::time::timeout(Duration::from_millis(50), counter.wait_idle())
            .await
            .expect("empty counter should be idle");
    }

    #[tokio::test]
    async fn waits_for_every_token() {
        let counter = Arc::new(TaskCounter::new());
        let first = counter.track();
        let second = counter.track();
        assert_eq!(counter.live(), 2);

        let waiter = {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move { counter.wait_idle().await })
        };

        drop(first);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert_eq!(counter.live(), 0);
    }

    fn always() -> bool {
        true
    }

    #[tokio::test]
    async fn token_released_when_task_panics() {
        let counter = Arc::new(TaskCounter::new());
        let token = counter.track();
        let res = tokio::spawn(async move {
            let _token = token;
            if always() {
                panic!("boom");
            }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(counter.live(), 0);
        counter.wait_idle().await;
    }
}
