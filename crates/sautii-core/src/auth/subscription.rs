use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::Session;

type Callback = Arc<dyn Fn(&Session) + Send + Sync>;

struct Entry {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
    /// Revision of the last snapshot handed to listeners
    delivered: u64,
}

/// Callback listeners for session transitions.
///
/// Callbacks run with no lock held, so a listener may call back into the
/// session store. Snapshots older than one already delivered are dropped,
/// so listeners never observe the session going backwards.
#[derive(Default)]
pub(crate) struct Listeners {
    registry: Arc<Mutex<Registry>>,
}

impl Listeners {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        lock_registry(&self.registry)
    }

    pub(crate) fn add(&self, callback: Callback) -> Subscription {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        let active = Arc::new(AtomicBool::new(true));
        registry.entries.push(Entry {
            id,
            active: Arc::clone(&active),
            callback,
        });
        Subscription {
            id,
            active,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub(crate) fn notify(&self, revision: u64, session: &Session) {
        let targets: Vec<(Arc<AtomicBool>, Callback)> = {
            let mut registry = self.lock();
            if revision <= registry.delivered {
                return;
            }
            registry.delivered = revision;
            registry
                .entries
                .iter()
                .map(|e| (Arc::clone(&e.active), Arc::clone(&e.callback)))
                .collect()
        };

        for (active, callback) in targets {
            // A listener triggered a newer transition, which superseded this one
            if self.lock().delivered != revision {
                return;
            }
            if active.load(Ordering::SeqCst) {
                callback(session);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

fn lock_registry(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Entries are only pushed or retained; a poisoned lock still holds a consistent list.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle returned by `SessionStore::subscribe`.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Stop notifications to this listener. Calling it again does nothing.
    ///
    /// Notifications dispatched after this returns skip the listener. One
    /// already being dispatched on another thread may still deliver.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            lock_registry(&registry).entries.retain(|e| e.id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RequestId;
    use std::sync::atomic::AtomicUsize;

    fn counter(listeners: &Listeners) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let sub = listeners.add(Arc::new(move |_: &Session| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        (count, sub)
    }

    #[test]
    fn test_notify_and_unsubscribe() {
        let listeners = Listeners::default();
        let (count, sub) = counter(&listeners);

        listeners.notify(1, &Session::unauthenticated());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(listeners.len(), 0);

        listeners.notify(2, &Session::unauthenticated());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Idempotent
        sub.unsubscribe();
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn test_stale_revisions_are_dropped() {
        let listeners = Listeners::default();
        let (count, _sub) = counter(&listeners);

        listeners.notify(5, &Session::unauthenticated());
        listeners.notify(4, &Session::unauthenticated());
        listeners.notify(5, &Session::unauthenticated());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_transition_is_not_followed_by_older_one() {
        let listeners = Arc::new(Listeners::default());
        let nested = Arc::clone(&listeners);
        let _first = listeners.add(Arc::new(move |session: &Session| {
            if session.is_authenticating() {
                nested.notify(2, &Session::unauthenticated());
            }
        }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _second = listeners.add(Arc::new(move |session: &Session| {
            sink.lock().unwrap().push(session.state().label());
        }));

        listeners.notify(1, &Session::authenticating(RequestId(1)));
        assert_eq!(*seen.lock().unwrap(), vec!["unauthenticated"]);
    }

    #[test]
    fn test_unsubscribe_during_notification_skips_listener() {
        let listeners = Listeners::default();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let handle = Arc::clone(&slot);
        let _remover = listeners.add(Arc::new(move |_: &Session| {
            if let Some(sub) = handle.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        }));
        let (count, target) = counter(&listeners);
        *slot.lock().unwrap() = Some(target);

        listeners.notify(1, &Session::unauthenticated());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let listeners = Listeners::default();
        let (_count, sub) = counter(&listeners);
        drop(listeners);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }

    #[test]
    fn test_listener_can_subscribe_during_notification() {
        let listeners = Arc::new(Listeners::default());
        let inner = Arc::clone(&listeners);
        let added = Arc::new(Mutex::new(Vec::new()));
        let added_in_cb = Arc::clone(&added);
        let _sub = listeners.add(Arc::new(move |_: &Session| {
            let sub = inner.add(Arc::new(|_: &Session| {}));
            added_in_cb.lock().unwrap().push(sub);
        }));

        listeners.notify(1, &Session::unauthenticated());
        assert_eq!(listeners.len(), 2);
    }
}
