//! Per-key bookkeeping owned by the dispatcher.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::Result;
use crate::recency::Handle;

/// Reply delivered to a synchronous lookup.
pub(crate) type Reply<E> = Result<Option<Arc<E>>>;

/// A caller parked on a pending line.
#[derive(Debug)]
pub(crate) struct Waiter<E> {
    pub id: u64,
    pub tx: oneshot::Sender<Reply<E>>,
}

/// State of a line's payload.
///
/// A pending line has waiters and no payload; a resolved line has a payload
/// and no waiters.
#[derive(Debug)]
pub(crate) enum Slot<E> {
    Pending { waiters: Vec<Waiter<E>> },
    Resolved(Arc<E>),
}

/// A cached key.
#[derive(Debug)]
pub(crate) struct Line<E> {
    pub slot: Slot<E>,
    pub handle: Handle,
    pub last_used: Instant,
}

impl<E> Line<E> {
    pub fn pending(handle: Handle) -> Self {
        Self {
            slot: Slot::Pending {
                waiters: Vec::with_capacity(4),
            },
            handle,
            last_used: Instant::now(),
        }
    }

    pub fn resolved(handle: Handle, value: Arc<E>) -> Self {
        Self {
            slot: Slot::Resolved(value),
            handle,
            last_used: Instant::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.slot, Slot::Pending { .. })
    }

    pub fn value(&self) -> Option<&Arc<E>> {
        match &self.slot {
            Slot::Resolved(value) => Some(value),
            Slot::Pending { .. } => None,
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Install a payload, returning the waiters that were parked on the line.
    pub fn resolve(&mut self, value: Arc<E>) -> Vec<Waiter<E>> {
        match std::mem::replace(&mut self.slot, Slot::Resolved(value)) {
            Slot::Pending { waiters } => waiters,
            Slot::Resolved(_) => Vec::new(),
        }
    }

    /// Register a waiter. Returns the waiter back if the line is resolved.
    pub fn park(&mut self, waiter: Waiter<E>) -> std::result::Result<(), Waiter<E>> {
        match &mut self.slot {
            Slot::Pending { waiters } => {
                waiters.push(waiter);
                Ok(())
            }
            Slot::Resolved(_) => Err(waiter),
        }
    }

    /// Drop a waiter by id. Other waiters keep their order.
    pub fn unpark(&mut self, id: u64) -> bool {
        match &mut self.slot {
            Slot::Pending { waiters } => {
                let before = waiters.len();
                waiters.retain(|w| w.id != id);
                waiters.len() != before
            }
            Slot::Resolved(_) => false,
        }
    }
}

/// Send the same reply to every waiter, in registration order.
///
/// Waiters whose caller has gone away are skipped.
pub(crate) fn notify_all<E>(waiters: Vec<Waiter<E>>, reply: Reply<E>) {
    for waiter in waiters {
        let _ = waiter.tx.send(reply.clone());
    }
}
