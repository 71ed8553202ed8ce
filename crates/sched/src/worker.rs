//! Background execution for CPU-heavy work (mesh simplification).
//!
//! Jobs run on rayon's pool, but every job first takes one process-wide gate,
//! so at most one gated job executes at any moment. Some simplifier
//! implementations are not reentrant. Results come back over a channel and
//! are picked up by the tree owner with a non-blocking poll.

use crossbeam_channel::{self as channel, Receiver, TryRecvError};
use std::sync::{Mutex, PoisonError};

static EXECUTION_GATE: Mutex<()> = Mutex::new(());

/// Run `f` while holding the global execution gate.
pub fn run_gated<T>(f: impl FnOnce() -> T) -> T {
    let _guard = EXECUTION_GATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    f()
}

/// True when a gated job currently holds the gate.
pub fn gate_busy() -> bool {
    EXECUTION_GATE.try_lock().is_err()
}

/// Result of polling a background job.
#[derive(Debug, PartialEq, Eq)]
pub enum JobPoll<T> {
    Ready(T),
    Pending,
    /// The worker went away without producing a result (it panicked).
    Lost,
}

/// A gated job running off the tree-owner thread.
#[derive(Debug)]
pub struct BackgroundJob<T> {
    receiver: Option<Receiver<T>>,
}

impl<T: Send + 'static> BackgroundJob<T> {
    /// Spawn `f` on the rayon pool behind the global gate.
    pub fn spawn(f: impl FnOnce() -> T + Send + 'static) -> Self {
        let (sender, receiver) = channel::bounded(1);
        rayon::spawn(move || {
            let result = run_gated(f);
            // Receiver dropped = job abandoned by its task.
            let _ = sender.send(result);
        });
        Self {
            receiver: Some(receiver),
        }
    }

    /// Non-blocking check for the result. After `Ready` or `Lost` the job is
    /// spent and further polls report `Lost`.
    pub fn poll(&mut self) -> JobPoll<T> {
        let Some(receiver) = self.receiver.as_ref() else {
            return JobPoll::Lost;
        };
        match receiver.try_recv() {
            Ok(result) => {
                self.receiver = None;
                JobPoll::Ready(result)
            }
            Err(TryRecvError::Empty) => JobPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                JobPoll::Lost
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.receiver.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn wait<T: Send + 'static>(job: &mut BackgroundJob<T>) -> JobPoll<T> {
        loop {
            match job.poll() {
                JobPoll::Pending => std::thread::sleep(Duration::from_millis(1)),
                other => return other,
            }
        }
    }

    #[test]
    fn job_delivers_result() {
        let mut job = BackgroundJob::spawn(|| 6 * 7);
        assert_eq!(wait(&mut job), JobPoll::Ready(42));
        assert!(job.is_finished());
        assert_eq!(job.poll(), JobPoll::Lost);
    }

    #[test]
    fn gate_serializes_jobs() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut jobs: Vec<_> = (0..6)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                BackgroundJob::spawn(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for job in &mut jobs {
            assert_eq!(wait(job), JobPoll::Ready(()));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_gated_inline() {
        assert_eq!(run_gated(|| "done"), "done");
    }
}
