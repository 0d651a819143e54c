//! Request identity, cancellation and staleness tracking.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RequestId(u64);

impl RequestId {
    #[inline]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A shared flag telling an in-flight call that its result is no longer wanted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An issued request waiting to be dispatched.
#[derive(Debug, Clone)]
pub struct Ticket<T> {
    pub id: RequestId,
    pub cancel: CancelToken,
    pub body: T,
}

/// Monotonic request counter for one logical operation.
///
/// Only the most recently issued request is current; issuing a new one
/// cancels the previous in-flight request.
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: u64,
    in_flight: Option<CancelToken>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue<T>(&mut self, body: T) -> Ticket<T> {
        if let Some(prev) = self.in_flight.take() {
            prev.cancel();
        }
        self.latest += 1;
        let cancel = CancelToken::new();
        self.in_flight = Some(cancel.clone());
        Ticket {
            id: RequestId(self.latest),
            cancel,
            body,
        }
    }

    #[inline]
    pub fn is_current(&self, id: RequestId) -> bool {
        id.0 == self.latest
    }

    #[inline]
    pub fn latest(&self) -> Option<RequestId> {
        (self.latest > 0).then_some(RequestId(self.latest))
    }

    /// Marks `id` as finished. Returns `false` if a newer request exists.
    pub fn settle(&mut self, id: RequestId) -> bool {
        if !self.is_current(id) {
            return false;
        }
        self.in_flight = None;
        true
    }

    /// Cancels whatever is in flight without issuing a replacement.
    pub fn cancel_all(&mut self) {
        if let Some(prev) = self.in_flight.take() {
            prev.cancel();
        }
        self.latest += 1;
    }
}
