//! Non-blocking sample fan-out
//!
//! ```text
//! broadcast(sample)
//!     ├──► try_send ──► [observer 1] (bounded)
//!     ├──► try_send ──► [observer 2] (bounded, full: dropped for 2 only)
//!     └──► try_send ──► [observer N] (closed: pruned)
//! ```
//!
//! The producer never waits on an observer. Each observer sees samples in
//! production order, minus the ones dropped while its buffer was full.

use tokio::sync::mpsc;

/// Observer handle within one set
pub type ObserverId = u64;

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

struct Observer<T> {
    id: ObserverId,
    sender: mpsc::Sender<T>,
}

/// Ordered set of bounded observer channels
///
/// Observers whose receiver went away are pruned from delivery but stay
/// counted as attached until [`detach`](Self::detach)ed, so client
/// accounting done by the owner stays exact.
pub struct ObserverSet<T> {
    observers: Vec<Observer<T>>,
    pruned: Vec<ObserverId>,
    next_id: ObserverId,
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
            pruned: Vec::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> ObserverSet<T> {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer with a buffer of `capacity` items
    pub fn attach(&mut self, capacity: usize) -> (ObserverId, mpsc::Receiver<T>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = self.next_id;
        self.next_id += 1;
        self.observers.push(Observer { id, sender });
        (id, receiver)
    }

    /// Remove an observer, closing its channel
    ///
    /// Returns false when the observer was not attached.
    pub fn detach(&mut self, id: ObserverId) -> bool {
        if let Some(pos) = self.observers.iter().position(|o| o.id == id) {
            self.observers.remove(pos);
            return true;
        }
        if let Some(pos) = self.pruned.iter().position(|p| *p == id) {
            self.pruned.remove(pos);
            return true;
        }
        false
    }

    /// Remove the most recently attached observer
    pub fn detach_latest(&mut self) -> Option<ObserverId> {
        let latest = self
            .observers
            .iter()
            .map(|o| o.id)
            .chain(self.pruned.iter().copied())
            .max()?;
        self.detach(latest);
        Some(latest)
    }

    /// Offer an item to every observer without waiting
    pub fn broadcast(&self, item: &T) -> Delivery {
        let mut delivery = Delivery::default();

        for observer in &self.observers {
            match observer.sender.try_send(item.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => delivery.dropped += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => delivery.closed += 1,
            }
        }

        delivery
    }

    /// Stop delivering to observers whose receiver is gone
    pub fn prune_closed(&mut self) -> usize {
        let before = self.observers.len();
        let mut pruned = Vec::new();

        self.observers.retain(|o| {
            if o.sender.is_closed() {
                pruned.push(o.id);
                false
            } else {
                true
            }
        });

        self.pruned.extend(pruned);
        before - self.observers.len()
    }

    /// Detach every observer, closing all channels
    pub fn close_all(&mut self) {
        self.observers.clear();
        self.pruned.clear();
    }

    /// Attached observers, including pruned ones not yet detached
    pub fn len(&self) -> usize {
        self.observers.len() + self.pruned.len()
    }

    /// Whether no observer is attached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is still attached
    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers.iter().any(|o| o.id == id) || self.pruned.contains(&id)
    }
}
