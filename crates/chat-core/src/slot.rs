//! Single-outstanding-request holder with same-call or deferred delivery.
//!
//! A slot tracks the key of the latest request and at most one in-flight
//! resolution. Beginning a new request always cancels the previous one, and
//! completions carry a [`SlotTicket`] so a late delivery from a superseded
//! request is recognised and dropped by [`SideEffectSlot::accept`].

use std::{fmt, future::Future, marker::PhantomData, pin::Pin};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Boxed future used for resolutions that complete after `begin` returns.
pub type PendingResolution<V> = Pin<Box<dyn Future<Output = V> + Send + 'static>>;

/// Answer from a collaborator asked to resolve a key.
pub enum Resolution<V> {
    /// Answered while still inside the initiating call, e.g. a cache hit.
    Immediate(V),
    /// Answered later by a background worker.
    Pending(PendingResolution<V>),
}

impl<V: Send + 'static> Resolution<V> {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = V> + Send + 'static,
    {
        Self::Pending(Box::pin(future))
    }

    pub fn map<U, F>(self, f: F) -> Resolution<U>
    where
        U: Send + 'static,
        F: FnOnce(V) -> U + Send + 'static,
    {
        match self {
            Self::Immediate(value) => Resolution::Immediate(f(value)),
            Self::Pending(future) => Resolution::pending(async move { f(future.await) }),
        }
    }
}

impl<V> fmt::Debug for Resolution<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(_) => f.write_str("Resolution::Immediate(..)"),
            Self::Pending(_) => f.write_str("Resolution::Pending(..)"),
        }
    }
}

/// Identity of one request issued by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotTicket(u64);

/// What `begin` produced for the caller.
#[derive(Debug)]
pub enum Begin<V> {
    /// Fold this value into the state transform that is currently running.
    Immediate(V),
    /// The value will arrive through the delivery callback with this ticket.
    Pending(SlotTicket),
}

struct InFlight {
    ticket: SlotTicket,
    cancel: CancellationToken,
}

pub struct SideEffectSlot<K, V> {
    name: &'static str,
    key: Option<K>,
    issued: u64,
    in_flight: Option<InFlight>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> SideEffectSlot<K, V> {
    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
            debug!(
                slot = self.name,
                ticket = in_flight.ticket.0,
                "cancelled in-flight slot resolution"
            );
        }
    }
}

impl<K, V> SideEffectSlot<K, V>
where
    K: fmt::Debug,
    V: Send + 'static,
{
    /// Create an empty slot; `name` only labels log lines.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            key: None,
            issued: 0,
            in_flight: None,
            _value: PhantomData,
        }
    }

    /// Key of the latest request, whether or not it already resolved.
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Cancel any outstanding request, then resolve `key`.
    ///
    /// `deliver` runs on a background task only when the resolution is
    /// pending and was not cancelled in the meantime. Callers must still
    /// pass the ticket through [`accept`](Self::accept) once the value is
    /// back on the coordination task.
    pub fn begin<R, D>(&mut self, key: K, resolve: R, deliver: D) -> Begin<V>
    where
        R: FnOnce(&K) -> Resolution<V>,
        D: FnOnce(SlotTicket, V) + Send + 'static,
    {
        self.cancel_in_flight();
        self.issued = self.issued.wrapping_add(1);
        let ticket = SlotTicket(self.issued);
        debug!(slot = self.name, ?key, ticket = ticket.0, "slot resolution started");

        let resolution = resolve(&key);
        self.key = Some(key);
        match resolution {
            Resolution::Immediate(value) => {
                trace!(slot = self.name, ticket = ticket.0, "resolved within initiating call");
                Begin::Immediate(value)
            }
            Resolution::Pending(future) => {
                let cancel = CancellationToken::new();
                let cancelled = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = cancelled.cancelled() => {}
                        value = future => deliver(ticket, value),
                    }
                });
                self.in_flight = Some(InFlight { ticket, cancel });
                Begin::Pending(ticket)
            }
        }
    }

    /// Claim a delivered completion; `false` means it was superseded.
    pub fn accept(&mut self, ticket: SlotTicket) -> bool {
        match &self.in_flight {
            Some(in_flight) if in_flight.ticket == ticket => {
                self.in_flight = None;
                true
            }
            _ => {
                trace!(slot = self.name, ticket = ticket.0, "discarding stale slot completion");
                false
            }
        }
    }

    /// Cancel any outstanding request and forget the key.
    pub fn cancel(&mut self) {
        self.cancel_in_flight();
        self.key = None;
    }
}

impl<K, V> Drop for SideEffectSlot<K, V> {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}

impl<K: fmt::Debug, V> fmt::Debug for SideEffectSlot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideEffectSlot")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("pending", &self.in_flight.is_some())
            .finish()
    }
}
