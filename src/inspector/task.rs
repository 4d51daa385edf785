use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Cancellation {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// Closure executed once on a helper thread after a delay, unless cancelled before.
///
/// Dropping the handle cancels the task. The helper thread finishes right after cancellation
/// so no thread outlives its task longer than needed.
pub struct DelayedTask {
    cancellation: Arc<Cancellation>,
}

impl DelayedTask {
    /// Schedule `f` to run after `delay`.
    pub fn schedule<F>(delay: Duration, f: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let cancellation = Arc::new(Cancellation::default());
        let waiter = cancellation.clone();

        thread::Builder::new()
            .name("inspector-push".to_string())
            .spawn(move || {
                let cancelled = waiter
                    .cancelled
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let (cancelled, _) = waiter
                    .cond
                    .wait_timeout_while(cancelled, delay, |cancelled| !*cancelled)
                    .unwrap_or_else(PoisonError::into_inner);
                if *cancelled {
                    return;
                }
                drop(cancelled);
                f();
            })?;

        Ok(Self { cancellation })
    }

    /// Cancel the task. No-op if task already executed.
    pub fn cancel(&self) {
        let mut cancelled = self
            .cancellation
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.cancellation.cond.notify_all();
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod test {
    use crate::inspector::task::DelayedTask;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_task_fires_after_delay() {
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        let _task = DelayedTask::schedule(Duration::from_millis(50), move || {
            tx.send(Instant::now()).unwrap();
        })
        .unwrap();

        let fired_at = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired_at.duration_since(start) >= Duration::from_millis(50));
    }

    #[test]
    fn test_cancelled_task_never_fires() {
        let (tx, rx) = mpsc::channel::<()>();
        let task = DelayedTask::schedule(Duration::from_millis(50), move || {
            tx.send(()).unwrap();
        })
        .unwrap();
        task.cancel();

        // sender is dropped together with the never executed closure
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_drop_cancels() {
        let (tx, rx) = mpsc::channel::<()>();
        drop(
            DelayedTask::schedule(Duration::from_millis(50), move || {
                tx.send(()).unwrap();
            })
            .unwrap(),
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }
}
