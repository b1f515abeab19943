//! Push-based observable values.
//!
//! A `Subject` holds a current value and a list of subscribers. Publishing a
//! value notifies every subscriber synchronously, in registration order,
//! before `next` returns. New subscribers get the current value replayed.
//!
//! The lock is only held to read or swap state; callbacks always run with it
//! released, so a callback may read, subscribe to, or publish on any subject.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Shared<T> {
    value: T,
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
    /// Upstream subscriptions feeding a derived subject.
    upstream: Vec<Subscription>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to an active subscription. Dropping it unsubscribes.
///
/// The handle keeps the subject it listens to alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Read side of an observable value.
pub struct Observable<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn with_value(value: T) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                value,
                next_id: 0,
                subscribers: Vec::new(),
                upstream: Vec::new(),
            })),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        lock(&self.shared).value.clone()
    }

    /// Subscribe and immediately receive the current value.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(f);
        let (subscription, current) = self.register(Arc::clone(&callback));
        callback(&current);
        subscription
    }

    /// Subscribe to future values only.
    pub fn listen<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(Arc::new(f)).0
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared).subscribers.len()
    }

    /// Derived observable that recomputes `f` on every upstream value.
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.derive(f)
    }

    /// Like `map`, but only emits when the projected value changes.
    pub fn select<U, F>(&self, f: F) -> Observable<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.derive_distinct(f)
    }

    fn derive<U, F>(&self, f: F) -> Observable<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.derive_with(f, |_, _| true)
    }

    fn derive_distinct<U, F>(&self, f: F) -> Observable<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.derive_with(f, |old, next| old != next)
    }

    fn derive_with<U, F, C>(&self, f: F, changed: C) -> Observable<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
        C: Fn(&U, &U) -> bool + Send + Sync + 'static,
    {
        let derived = Observable::with_value(f(&self.get()));
        let weak: Weak<Mutex<Shared<U>>> = Arc::downgrade(&derived.shared);
        let source = Arc::downgrade(&self.shared);
        // The delivered value is ignored: with concurrent writers deliveries can
        // arrive out of order, so the projection is taken from the latest value.
        let upstream = self.listen(move |_| {
            let (Some(shared), Some(source)) = (weak.upgrade(), source.upgrade()) else {
                return;
            };
            project(&shared, &source, &f, &changed);
        });
        lock(&derived.shared).upstream.push(upstream);
        derived
    }

    fn register(&self, callback: Callback<T>) -> (Subscription, T) {
        let (id, current) = {
            let mut inner = lock(&self.shared);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, callback));
            (id, inner.value.clone())
        };
        let shared = Arc::clone(&self.shared);
        let subscription = Subscription {
            cancel: Some(Box::new(move || {
                // Detach under the lock, drop outside it: the removed callback
                // may own subscriptions whose drop locks other subjects.
                let removed = {
                    let mut inner = lock(&shared);
                    inner
                        .subscribers
                        .iter()
                        .position(|(sid, _)| *sid == id)
                        .map(|pos| inner.subscribers.remove(pos))
                };
                drop(removed);
            })),
        };
        (subscription, current)
    }
}

fn publish<T: Clone>(shared: &Arc<Mutex<Shared<T>>>, value: T) {
    let callbacks = {
        let mut inner = lock(shared);
        inner.value = value.clone();
        snapshot_callbacks(&inner)
    };
    for callback in callbacks {
        callback(&value);
    }
}

fn snapshot_callbacks<T>(inner: &Shared<T>) -> Vec<Callback<T>> {
    inner.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect()
}

// Holds the derived lock across the source read, so the last recompute always
// sees the last source value.
fn project<T, U>(
    derived: &Mutex<Shared<U>>,
    source: &Mutex<Shared<T>>,
    f: impl Fn(&T) -> U,
    changed: impl Fn(&U, &U) -> bool,
) where
    T: Clone,
    U: Clone,
{
    let (value, callbacks) = {
        let mut inner = lock(derived);
        let latest = lock(source).value.clone();
        let next = f(&latest);
        if !changed(&inner.value, &next) {
            return;
        }
        inner.value = next.clone();
        (next, snapshot_callbacks(&inner))
    };
    for callback in callbacks {
        callback(&value);
    }
}

/// Writable observable value.
pub struct Subject<T> {
    observable: Observable<T>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            observable: self.observable.clone(),
        }
    }
}

impl<T> Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            observable: Observable::with_value(value),
        }
    }

    /// Replace the value and notify every subscriber before returning.
    pub fn next(&self, value: T) {
        publish(&self.observable.shared, value);
    }

    /// Mutate the value in place under the subject's lock. When `f` returns
    /// true, subscribers are notified once the lock is released. Returns the
    /// value `f` left behind.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(&mut T) -> bool,
    {
        let (value, callbacks) = {
            let mut inner = lock(&self.observable.shared);
            let notify = f(&mut inner.value);
            let callbacks = if notify {
                snapshot_callbacks(&inner)
            } else {
                Vec::new()
            };
            (inner.value.clone(), callbacks)
        };
        for callback in callbacks {
            callback(&value);
        }
        value
    }

    pub fn get(&self) -> T {
        self.observable.get()
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.observable.subscribe(f)
    }

    /// Read-only view sharing this subject's state.
    pub fn observable(&self) -> Observable<T> {
        self.observable.clone()
    }
}
