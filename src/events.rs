use std::sync::{Arc, Weak};

/// A small typed event bus, one per event kind, replacing the dynamic `dispatchEvent` bus of
/// the original design (see SPEC_FULL §6.1 and §9).
///
/// Subscribers are held as [`Weak`] references: once a [`SubscriptionHandle`] is dropped, the
/// subscription is gone, so `Profile`/`ProfileController` don't need a paired
/// `add_event_listener`/`remove_event_listener` call (the source's listener-leakage bug, see
/// §9, is structurally impossible here).
pub struct Publisher<E> {
    subscribers: Vec<Weak<dyn Fn(&E) + Send + Sync>>,
}

impl<E> Default for Publisher<E> {
    fn default() -> Self {
        Publisher {
            subscribers: Vec::new(),
        }
    }
}

/// Keeps a subscription alive. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    _callback: Arc<dyn std::any::Any + Send + Sync>,
}

impl<E> Publisher<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` and returns a handle that keeps the subscription alive.
    #[must_use = "dropping the returned handle immediately unsubscribes"]
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let as_fn: Arc<dyn Fn(&E) + Send + Sync> = callback.clone();
        self.subscribers.push(Arc::downgrade(&as_fn));
        SubscriptionHandle {
            _callback: callback,
        }
    }

    /// Publishes an event to every live subscriber, dropping any that have gone stale.
    pub fn publish(&mut self, event: &E) {
        self.subscribers.retain(|weak| weak.strong_count() > 0);
        for weak in &self.subscribers {
            if let Some(callback) = weak.upgrade() {
                callback(event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_reaches_live_subscribers() {
        let mut publisher = Publisher::<u32>::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let handle = publisher.subscribe(move |e| {
            seen2.fetch_add(*e as usize, Ordering::SeqCst);
        });
        publisher.publish(&5);
        publisher.publish(&7);
        assert_eq!(seen.load(Ordering::SeqCst), 12);
        drop(handle);
        publisher.publish(&100);
        assert_eq!(seen.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn dropped_handle_unsubscribes() {
        let mut publisher = Publisher::<u32>::new();
        let handle = publisher.subscribe(|_| {});
        assert_eq!(publisher.subscriber_count(), 1);
        drop(handle);
        publisher.publish(&0);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
