//! Serialized intent → async work → reduce engine shared by every controller.
//!
//! A [`Store`] owns exactly one state value. Intents and the outcomes of the
//! async work they start are funnelled through one FIFO queue and folded by a
//! single worker task, so reducers never run concurrently and every observer
//! sees the same totally ordered sequence of states. Async work runs in its
//! own task and re-enters the queue when it completes; it never holds the
//! queue while suspended.
//!
//! Side effects are unicast: each emission goes to exactly one attached
//! [`EffectSubscription`], taking turns when several are attached, and is
//! dropped when none is.

use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{sync::mpsc, task::AbortHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, warn};

/// Pure state machine driven by a [`Store`].
///
/// Every method runs on the store's worker with the current state and must
/// not perform I/O itself; I/O is described as work on the returned
/// [`Transition`] and its result comes back through [`Reducer::on_outcome`].
pub trait Reducer: Sized + Send + 'static {
    type State: Clone + Send + Sync + 'static;
    type Intent: Send + 'static;
    type Outcome: Send + 'static;
    type Effect: Send + 'static;

    fn on_intent(&self, state: &Self::State, intent: Self::Intent) -> Transition<Self>;

    fn on_outcome(&self, state: &Self::State, outcome: Self::Outcome) -> Transition<Self>;

    /// Called when a unit of work panicked instead of producing an outcome.
    fn on_work_panic(&self, state: &Self::State, reason: &str) -> Transition<Self>;
}

/// Result of folding one message: an optional next state, side effects to
/// emit after it, and async work to start.
pub struct Transition<R: Reducer> {
    state: Option<R::State>,
    effects: Vec<R::Effect>,
    work: Vec<BoxFuture<'static, R::Outcome>>,
}

impl<R: Reducer> Transition<R> {
    pub fn unchanged() -> Self {
        Self {
            state: None,
            effects: Vec::new(),
            work: Vec::new(),
        }
    }

    pub fn to(state: R::State) -> Self {
        Self {
            state: Some(state),
            effects: Vec::new(),
            work: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: R::Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_work<F>(mut self, work: F) -> Self
    where
        F: Future<Output = R::Outcome> + Send + 'static,
    {
        self.work.push(work.boxed());
        self
    }

    pub fn next_state(&self) -> Option<&R::State> {
        self.state.as_ref()
    }

    pub fn effects(&self) -> &[R::Effect] {
        &self.effects
    }

    pub fn work_count(&self) -> usize {
        self.work.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("state container has been torn down")]
pub struct StoreClosed;

enum Envelope<R: Reducer> {
    Intent(R::Intent),
    Outcome(R::Outcome),
    WorkPanicked(String),
}

struct Inner<S> {
    state: S,
    observers: Vec<mpsc::UnboundedSender<S>>,
    closed: bool,
}

struct Shared<R: Reducer> {
    inner: Mutex<Inner<R::State>>,
    /// `None` once torn down.
    effects: Mutex<Option<Vec<mpsc::UnboundedSender<R::Effect>>>>,
    inflight: Mutex<Vec<AbortHandle>>,
    worker: Mutex<Option<AbortHandle>>,
}

impl<R: Reducer> Shared<R> {
    fn snapshot(&self) -> Option<R::State> {
        let inner = self.inner.lock();
        (!inner.closed).then(|| inner.state.clone())
    }

    /// Publishes the next state and its effects atomically. Returns `false`
    /// once the store is torn down, in which case nothing is published.
    fn commit(&self, next: Option<R::State>, effects: Vec<R::Effect>) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        if let Some(next) = next {
            inner
                .observers
                .retain(|observer| observer.send(next.clone()).is_ok());
            inner.state = next;
        }
        if !effects.is_empty() {
            let mut receivers = self.effects.lock();
            if let Some(receivers) = receivers.as_mut() {
                for effect in effects {
                    if !deliver_once(receivers, effect) {
                        debug!("side effect dropped: no receiver attached");
                    }
                }
            }
        }
        true
    }

    fn track(&self, handle: AbortHandle) {
        let mut inflight = self.inflight.lock();
        inflight.retain(|task| !task.is_finished());
        inflight.push(handle);
    }

    fn close(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return false;
            }
            inner.closed = true;
            inner.observers.clear();
        }
        self.effects.lock().take();
        for task in self.inflight.lock().drain(..) {
            task.abort();
        }
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        true
    }
}

/// Generic state container.
///
/// Dropping the store tears it down exactly like [`Store::shutdown`].
pub struct Store<R: Reducer> {
    name: &'static str,
    queue: mpsc::UnboundedSender<Envelope<R>>,
    shared: Arc<Shared<R>>,
}

impl<R: Reducer> Store<R> {
    /// Starts the worker for `reducer`. Must be called from within a Tokio
    /// runtime.
    pub fn new(name: &'static str, initial: R::State, reducer: R) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: initial,
                observers: Vec::new(),
                closed: false,
            }),
            effects: Mutex::new(Some(Vec::new())),
            inflight: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
        });

        let worker = tokio::spawn(run_worker(
            name,
            reducer,
            Arc::clone(&shared),
            rx,
            queue.downgrade(),
        ));
        *shared.worker.lock() = Some(worker.abort_handle());

        Self {
            name,
            queue,
            shared,
        }
    }

    /// Enqueues an intent behind every intent already dispatched.
    pub fn dispatch(&self, intent: R::Intent) -> Result<(), StoreClosed> {
        if self.is_closed() {
            debug!(store = self.name, "dropping intent for torn down store");
            return Err(StoreClosed);
        }
        self.queue
            .send(Envelope::Intent(intent))
            .map_err(|_| StoreClosed)
    }

    /// Current state; the value a new subscriber would receive first.
    pub fn state(&self) -> R::State {
        self.shared.inner.lock().state.clone()
    }

    /// Observes the current state followed by every state produced after it.
    /// Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> StateSubscription<R::State> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.shared.inner.lock();
        let _ = tx.send(inner.state.clone());
        if !inner.closed {
            inner.observers.push(tx);
        }
        StateSubscription { rx }
    }

    /// One-shot effects emitted after this call. Each emission reaches one
    /// attached receiver only; effects emitted while none is attached are
    /// lost.
    pub fn side_effects(&self) -> EffectSubscription<R::Effect> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(receivers) = self.shared.effects.lock().as_mut() {
            receivers.push(tx);
        }
        EffectSubscription { rx }
    }

    /// Cancels in-flight work and stops the worker. Late outcomes and
    /// already queued intents are discarded; the last state stays readable.
    pub fn shutdown(&self) {
        if self.shared.close() {
            debug!(store = self.name, "state container torn down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }
}

impl<R: Reducer> Drop for Store<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Ordered feed of states from one [`Store`].
pub struct StateSubscription<S> {
    rx: mpsc::UnboundedReceiver<S>,
}

impl<S: Send + 'static> StateSubscription<S> {
    /// Next state, or `None` once the store is torn down and the feed drained.
    pub async fn next(&mut self) -> Option<S> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<S> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<S> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Receiving end of a [`Store`]'s side effects. Dropping it detaches it.
pub struct EffectSubscription<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E: Send + 'static> EffectSubscription<E> {
    /// Next effect delivered to this receiver, or `None` once the store is
    /// torn down and everything delivered has been drained.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

/// Hands `effect` to the first live receiver and rotates it to the back.
/// Detached receivers are pruned on the way. Returns `false` when nobody
/// took it.
fn deliver_once<E>(receivers: &mut Vec<mpsc::UnboundedSender<E>>, mut effect: E) -> bool {
    while !receivers.is_empty() {
        let receiver = receivers.remove(0);
        match receiver.send(effect) {
            Ok(()) => {
                receivers.push(receiver);
                return true;
            }
            Err(mpsc::error::SendError(returned)) => effect = returned,
        }
    }
    false
}

async fn run_worker<R: Reducer>(
    name: &'static str,
    reducer: R,
    shared: Arc<Shared<R>>,
    mut rx: mpsc::UnboundedReceiver<Envelope<R>>,
    queue: mpsc::WeakUnboundedSender<Envelope<R>>,
) {
    while let Some(envelope) = rx.recv().await {
        let Some(current) = shared.snapshot() else {
            break;
        };

        let folded = std::panic::catch_unwind(AssertUnwindSafe(|| match envelope {
            Envelope::Intent(intent) => reducer.on_intent(&current, intent),
            Envelope::Outcome(outcome) => reducer.on_outcome(&current, outcome),
            Envelope::WorkPanicked(reason) => reducer.on_work_panic(&current, &reason),
        }));
        let transition = match folded {
            Ok(transition) => transition,
            Err(panic) => {
                error!(
                    store = name,
                    reason = %panic_reason(panic.as_ref()),
                    "reducer panicked; keeping previous state"
                );
                continue;
            }
        };

        let Transition {
            state,
            effects,
            work,
        } = transition;
        if !shared.commit(state, effects) {
            break;
        }

        for job in work {
            let queue = queue.clone();
            let handle = tokio::spawn(async move {
                let envelope = match AssertUnwindSafe(job).catch_unwind().await {
                    Ok(outcome) => Envelope::Outcome(outcome),
                    Err(panic) => {
                        let reason = panic_reason(panic.as_ref());
                        error!(store = name, reason = %reason, "async work panicked");
                        Envelope::WorkPanicked(reason)
                    }
                };
                match queue.upgrade() {
                    Some(queue) => {
                        if queue.send(envelope).is_err() {
                            debug!(store = name, "discarding outcome for stopped worker");
                        }
                    }
                    None => debug!(store = name, "discarding outcome for dropped store"),
                }
            });
            shared.track(handle.abort_handle());
        }
    }

    if shared.close() {
        warn!(store = name, "state container worker stopped unexpectedly");
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
