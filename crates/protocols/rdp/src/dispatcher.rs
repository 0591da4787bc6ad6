//! Marshalling onto the thread that owns the native windows and COM objects.
//!
//! [`UiDispatcher`] is the sending half: cheap to clone, `Send`, usable from
//! any thread or task. [`DispatchQueue`] stays on the owning thread and runs
//! the queued jobs against the state that lives there.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::SessionError;

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Envelope<S> {
    Job(Job<S>),
    Shutdown,
}

/// Wakes the owning thread after a post (e.g. a posted thread message).
pub type Waker = Arc<dyn Fn() + Send + Sync>;

pub struct UiDispatcher<S> {
    tx: std_mpsc::Sender<Envelope<S>>,
    owner: Arc<OnceLock<ThreadId>>,
    waker: Option<Waker>,
}

impl<S> Clone for UiDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            owner: Arc::clone(&self.owner),
            waker: self.waker.clone(),
        }
    }
}

pub struct DispatchQueue<S> {
    rx: std_mpsc::Receiver<Envelope<S>>,
    owner: Arc<OnceLock<ThreadId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// Nothing left to run right now.
    Idle,
    /// Shutdown was requested or every dispatcher is gone.
    Closed,
}

pub fn channel<S>() -> (UiDispatcher<S>, DispatchQueue<S>) {
    let (tx, rx) = std_mpsc::channel();
    let owner = Arc::new(OnceLock::new());
    (
        UiDispatcher {
            tx,
            owner: Arc::clone(&owner),
            waker: None,
        },
        DispatchQueue { rx, owner },
    )
}

impl<S: 'static> UiDispatcher<S> {
    pub fn with_waker(mut self, waker: Waker) -> Self {
        self.waker = Some(waker);
        self
    }

    /// Queues `job` for the owning thread. Returns `false` when that thread is
    /// gone; never panics, so it is safe to call from COM callbacks.
    pub fn post(&self, job: impl FnOnce(&mut S) + Send + 'static) -> bool {
        let queued = self.tx.send(Envelope::Job(Box::new(job))).is_ok();
        if queued {
            self.wake();
        }
        queued
    }

    /// Runs `job` on the owning thread and waits for its result.
    ///
    /// Must not be awaited on the owning thread itself.
    pub async fn call<R>(
        &self,
        job: impl FnOnce(&mut S) -> R + Send + 'static,
    ) -> Result<R, SessionError>
    where
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = self.post(move |state| {
            let _ = reply_tx.send(job(state));
        });
        if !queued {
            return Err(SessionError::UiThreadGone);
        }
        // A job that panics drops its reply sender.
        reply_rx.await.map_err(|_| SessionError::UiThreadGone)
    }

    /// Asks the owning thread's loop to return.
    pub fn shutdown(&self) {
        if self.tx.send(Envelope::Shutdown).is_ok() {
            self.wake();
        }
    }

    pub fn is_owning_thread(&self) -> bool {
        self.owner.get() == Some(&std::thread::current().id())
    }

    fn wake(&self) {
        if let Some(waker) = &self.waker {
            waker();
        }
    }
}

impl<S> DispatchQueue<S> {
    /// Runs every job queued so far without blocking.
    pub fn drain(&self, state: &mut S) -> QueueStatus {
        self.claim();
        loop {
            match self.rx.try_recv() {
                Ok(Envelope::Job(job)) => run_job(job, state),
                Ok(Envelope::Shutdown) => return QueueStatus::Closed,
                Err(std_mpsc::TryRecvError::Empty) => return QueueStatus::Idle,
                Err(std_mpsc::TryRecvError::Disconnected) => return QueueStatus::Closed,
            }
        }
    }

    /// Waits up to `timeout` for the next job, then drains the rest.
    pub fn run_once(&self, state: &mut S, timeout: Duration) -> QueueStatus {
        self.claim();
        match self.rx.recv_timeout(timeout) {
            Ok(Envelope::Job(job)) => {
                run_job(job, state);
                self.drain(state)
            }
            Ok(Envelope::Shutdown) => QueueStatus::Closed,
            Err(std_mpsc::RecvTimeoutError::Timeout) => QueueStatus::Idle,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => QueueStatus::Closed,
        }
    }

    /// Blocks the calling thread, running jobs until shutdown.
    pub fn run(&self, state: &mut S) {
        self.claim();
        while let Ok(envelope) = self.rx.recv() {
            match envelope {
                Envelope::Job(job) => run_job(job, state),
                Envelope::Shutdown => break,
            }
        }
        tracing::debug!("ui dispatch queue stopped");
    }

    fn claim(&self) {
        let _ = self.owner.set(std::thread::current().id());
    }
}

fn run_job<S>(job: Job<S>, state: &mut S) {
    if catch_unwind(AssertUnwindSafe(|| job(state))).is_err() {
        tracing::error!("panic in ui job contained; continuing message loop");
    }
}
