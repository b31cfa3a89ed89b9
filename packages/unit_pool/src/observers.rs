use std::sync::atomic::{AtomicU64, Ordering};

/// Subscription IDs are unique per process, so a token can never match an observer
/// registered on a different pool.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(0);

/// The pool transitions that observers can subscribe to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum PoolEvent {
    /// Any unit was taken from the pool.
    Taken,

    /// Any unit was returned to the pool.
    Returned,
}

/// Identifies one observer registered on a pool.
///
/// Pass it to the pool's `unsubscribe()` to stop receiving notifications. Dropping the token
/// does not unsubscribe.
#[derive(Debug, Eq, Hash, PartialEq)]
#[must_use = "the subscription token is the only way to unsubscribe the observer"]
pub struct Subscription {
    id: u64,
    event: PoolEvent,
}

impl Subscription {
    /// The transition this subscription observes.
    #[must_use]
    pub fn event(&self) -> PoolEvent {
        self.event
    }
}

/// Observers of one pool event, in registration order.
///
/// `C` is a shared callback pointer (`Rc` or `Arc` of a closure) so that dispatch can work
/// from a snapshot without holding the list borrowed.
#[derive(Debug)]
pub(crate) struct ObserverList<C> {
    event: PoolEvent,
    entries: Vec<(u64, C)>,
}

impl<C: Clone> ObserverList<C> {
    pub(crate) fn new(event: PoolEvent) -> Self {
        Self {
            event,
            entries: Vec::new(),
        }
    }

    pub(crate) fn subscribe(&mut self, callback: C) -> Subscription {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        self.entries.push((id, callback));

        Subscription {
            id,
            event: self.event,
        }
    }

    /// Returns `false` if the subscription is not registered in this list.
    pub(crate) fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        if subscription.event != self.event {
            return false;
        }

        let Some(position) = self
            .entries
            .iter()
            .position(|(id, _)| *id == subscription.id)
        else {
            return false;
        };

        self.entries.remove(position);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// The callbacks to invoke for one notification.
    pub(crate) fn snapshot(&self) -> Vec<C> {
        self.entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }
}
