// THEORY:
// A `Debouncer` is a single pending-job slot. Every trigger aborts whatever is
// waiting in the slot and schedules the new job after a fixed delay, so a burst
// of events results in exactly one execution: the last one.
//
// The same mechanism serves two purposes in a session: the threshold control
// (only the final value of a slider drag is applied) and the click/double-click
// window (a release settles only if no double click cancels it first).
//
// Jobs are ordinary futures on the tokio runtime. They normally just post a
// message back to the owning actor, which keeps all state changes on one task.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancels the pending job, then runs `job` once `delay` has passed.
    /// Must be called from within a tokio runtime.
    pub fn trigger<F>(&mut self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        }));
    }

    /// Aborts the pending job. Returns whether one was still waiting.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn only_the_last_job_of_a_burst_runs() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        for value in 1..=5 {
            let tx = tx.clone();
            debouncer.trigger(async move {
                let _ = tx.send(value).await;
            });
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        drop(tx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.recv().await, Some(5));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_triggers_each_run() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            debouncer.trigger(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_pending_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let job_counter = Arc::clone(&counter);
        debouncer.trigger(async move {
            job_counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.is_pending());
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
