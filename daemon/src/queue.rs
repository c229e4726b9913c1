/// Single-flight FIFO execution of actions.
///
/// Every action the daemon runs goes through one [`ActionQueue`]. A single
/// drain task pops entries in arrival order and runs them one at a time on the
/// [`ActionExecutor`], pausing for the pacing interval between consecutive
/// entries. Callers never wait on [`ActionQueue::enqueue`]; they get a
/// [`Completion`] they may await or drop.
///
/// ```text
///   Idle ──enqueue──▶ Draining ──last entry done──▶ Idle
///                       │  ▲
///                       └──┘ next entry (after pacing)
/// ```
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};

use crate::action::Action;
use crate::executor::{ActionExecutor, ExecutionError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    /// The queue was cleared (or shut down) before the action reported back.
    #[error("action cancelled: queue cleared")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] ExecutionError),
}

type Outcome = Result<(), QueueError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing pending and nothing executing.
    Idle,
    /// An entry is executing, or entries are waiting out the pacing interval.
    Draining,
}

/// Resolves when the enqueued action finishes, fails, or is cancelled.
#[must_use = "dropping a Completion does not cancel the action"]
pub struct Completion {
    rx: oneshot::Receiver<Outcome>,
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(QueueError::Cancelled)))
    }
}

struct QueueEntry {
    action: Arc<Action>,
    done: oneshot::Sender<Outcome>,
}

struct InFlight {
    action_id: String,
    /// Taken by `clear`, which answers the caller early.
    done: Option<oneshot::Sender<Outcome>>,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<QueueEntry>,
    in_flight: Option<InFlight>,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Arc<Notify>,
    pacing_ms: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Moves the oldest pending entry into flight.
    fn begin_next(&self) -> Option<Arc<Action>> {
        let mut inner = self.lock();
        let entry = inner.pending.pop_front()?;
        inner.in_flight = Some(InFlight {
            action_id: entry.action.id.clone(),
            done: Some(entry.done),
        });
        Some(entry.action)
    }

    /// Reports the in-flight outcome and returns whether more entries wait.
    fn finish(&self, outcome: Outcome) -> bool {
        let mut inner = self.lock();
        if let Some(done) = inner.in_flight.take().and_then(|f| f.done) {
            let _ = done.send(outcome);
        }
        !inner.pending.is_empty()
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Wake the drain task so it notices the queue is gone.
        self.wake.notify_one();
    }
}

/// Cloneable handle to a queue and its drain task. The task exits once every
/// handle is dropped; entries still pending then resolve as cancelled.
#[derive(Clone)]
pub struct ActionQueue {
    shared: Arc<Shared>,
}

impl ActionQueue {
    /// Creates the queue and spawns its drain task on the current tokio runtime.
    pub fn new(executor: Arc<dyn ActionExecutor>, pacing: Duration) -> Self {
        let wake = Arc::new(Notify::new());
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::default()),
            wake: Arc::clone(&wake),
            pacing_ms: AtomicU64::new(duration_ms(pacing)),
        });
        tokio::spawn(drain(Arc::downgrade(&shared), wake, executor));
        Self { shared }
    }

    /// Appends `action` to the queue. Never blocks.
    pub fn enqueue(&self, action: impl Into<Arc<Action>>) -> Completion {
        let action = action.into();
        let (done, rx) = oneshot::channel();
        tracing::debug!(action_id = %action.id, kind = action.kind.label(), "Action enqueued");
        self.shared.lock().pending.push_back(QueueEntry { action, done });
        self.shared.wake.notify_one();
        Completion { rx }
    }

    /// Drops every pending entry and answers every outstanding completion,
    /// including the in-flight one, with [`QueueError::Cancelled`]. The
    /// in-flight side effect itself runs to completion, and the next entry
    /// still waits for it. Returns how many completions were cancelled.
    pub fn clear(&self) -> usize {
        let mut inner = self.shared.lock();
        let mut cancelled = 0;
        for entry in inner.pending.drain(..) {
            let _ = entry.done.send(Err(QueueError::Cancelled));
            cancelled += 1;
        }
        if let Some(flight) = inner.in_flight.as_mut() {
            if let Some(done) = flight.done.take() {
                tracing::debug!(action_id = %flight.action_id, "In-flight action detached by clear");
                let _ = done.send(Err(QueueError::Cancelled));
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::info!(cancelled, "Action queue cleared");
        }
        cancelled
    }

    pub fn state(&self) -> QueueState {
        let inner = self.shared.lock();
        if inner.in_flight.is_some() || !inner.pending.is_empty() {
            QueueState::Draining
        } else {
            QueueState::Idle
        }
    }

    /// Number of entries waiting (not counting the one in flight).
    pub fn len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Changes the pause between consecutive actions; applies from the next gap.
    pub fn set_pacing(&self, pacing: Duration) {
        self.shared.pacing_ms.store(duration_ms(pacing), Ordering::Relaxed);
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

async fn drain(shared: Weak<Shared>, wake: Arc<Notify>, executor: Arc<dyn ActionExecutor>) {
    loop {
        let next = match shared.upgrade() {
            Some(s) => s.begin_next(),
            None => break,
        };
        let Some(action) = next else {
            wake.notified().await;
            continue;
        };

        tracing::info!(action_id = %action.id, kind = action.kind.label(), "Executing action");
        let outcome = executor.execute(&action).await.map_err(QueueError::from);
        if let Err(e) = &outcome {
            tracing::warn!(action_id = %action.id, error = %e, "Action failed");
        }

        let (more, pacing) = match shared.upgrade() {
            Some(s) => (s.finish(outcome), s.pacing_ms.load(Ordering::Relaxed)),
            None => break,
        };
        if more && pacing > 0 {
            tokio::time::sleep(Duration::from_millis(pacing)).await;
        }
    }
    tracing::debug!("Action queue drain task stopped");
}
