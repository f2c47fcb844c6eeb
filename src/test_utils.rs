//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::FlowError;
use crate::flow::{Subscriber, Subscription, SubscriptionHolder};

/// A signal observed by [`Recorder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Signal<T, E> {
    Subscribed,
    Next(T),
    Error(E),
    Complete,
}

/// Subscriber that records every signal in arrival order
pub(crate) struct Recorder<T, E = String> {
    signals: Mutex<Vec<Signal<T, E>>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl<T, E> Recorder<T, E> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            signals: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
        })
    }

    pub(crate) fn signals(&self) -> Vec<Signal<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.signals.lock().unwrap().clone()
    }

    pub(crate) fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.subscription.lock().unwrap().clone()
    }

    fn push(&self, signal: Signal<T, E>) {
        self.signals.lock().unwrap().push(signal);
    }
}

impl<T: Send, E: Send> Subscriber for Recorder<T, E> {
    type Item = T;
    type Error = E;

    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock().unwrap() = Some(subscription);
        self.push(Signal::Subscribed);
    }

    fn on_next(&self, item: T) {
        self.push(Signal::Next(item));
    }

    fn on_error(&self, error: E) {
        self.push(Signal::Error(error));
    }

    fn on_complete(&self) {
        self.push(Signal::Complete);
    }
}

/// Upstream subscription that counts what it is asked for
#[derive(Debug, Default)]
pub(crate) struct CountingSubscription {
    pub(crate) requested: AtomicU64,
    pub(crate) cancelled: AtomicBool,
}

impl Subscription for CountingSubscription {
    fn request(&self, n: u64) -> Result<(), FlowError> {
        self.requested.fetch_add(n, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct HolderState {
    upstream: Option<Arc<dyn Subscription>>,
    pending: u64,
    cancelled: bool,
}

/// Minimal holder honoring the replay-on-bind contract
#[derive(Default)]
pub(crate) struct ReplayHolder {
    state: Mutex<HolderState>,
}

impl ReplayHolder {
    pub(crate) fn is_bound(&self) -> bool {
        self.state.lock().unwrap().upstream.is_some()
    }
}

impl std::fmt::Debug for ReplayHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayHolder").finish_non_exhaustive()
    }
}

impl SubscriptionHolder for ReplayHolder {
    fn bind(&self, upstream: Arc<dyn Subscription>) {
        let mut state = self.state.lock().unwrap();
        if state.cancelled || state.upstream.is_some() {
            upstream.cancel();
            return;
        }
        let pending = std::mem::take(&mut state.pending);
        state.upstream = Some(upstream.clone());
        drop(state);
        if pending > 0 {
            let _ = upstream.request(pending);
        }
    }

    fn request_more(&self, n: u64) {
        let mut state = self.state.lock().unwrap();
        match state.upstream.clone() {
            Some(upstream) => {
                drop(state);
                let _ = upstream.request(n);
            }
            None => state.pending = state.pending.saturating_add(n),
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.cancelled = true;
        if let Some(upstream) = state.upstream.take() {
            drop(state);
            upstream.cancel();
        }
    }
}
