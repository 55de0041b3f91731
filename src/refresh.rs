//! Debounced "components updated" notification.
//!
//! A single-flight timer: each qualifying registration resets the pending
//! timer instead of stacking another one, so a burst of registrations fires
//! once, a quiescence window after the last of them.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// What a subscriber wants after being notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Keep,
    Cancel,
}

pub type SubscriberId = u64;

type Subscriber = Box<dyn FnMut() -> Subscription>;

struct Inner {
    debounce: Duration,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    /// Unsubscribed while a notification was being delivered.
    cancelled: HashSet<SubscriberId>,
    next_id: SubscriberId,
    pending: Option<JoinHandle<()>>,
    fired: u64,
}

#[derive(Clone)]
pub struct RefreshNotifier {
    inner: Rc<RefCell<Inner>>,
}

impl Default for RefreshNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl RefreshNotifier {
    pub fn new(debounce: Duration) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                debounce,
                subscribers: Vec::new(),
                cancelled: HashSet::new(),
                next_id: 1,
                pending: None,
                fired: 0,
            })),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.inner.borrow().debounce
    }

    /// Subscribers are notified in subscription order.
    pub fn subscribe(&self, subscriber: impl FnMut() -> Subscription + 'static) -> SubscriberId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        if inner.subscribers.len() == before {
            inner.cancelled.insert(id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub fn pending(&self) -> bool {
        self.inner.borrow().pending.is_some()
    }

    /// Number of notifications delivered so far.
    pub fn fired(&self) -> u64 {
        self.inner.borrow().fired
    }

    /// Starts or resets the debounce timer. Must run inside a `LocalSet`.
    pub fn schedule(&self) {
        let debounce = {
            let mut inner = self.inner.borrow_mut();
            if let Some(previous) = inner.pending.take() {
                previous.abort();
                debug!("pending refresh reset");
            }
            inner.debounce
        };

        let weak: Weak<RefCell<Inner>> = Rc::downgrade(&self.inner);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(debounce).await;
            if let Some(inner) = weak.upgrade() {
                let notifier = RefreshNotifier { inner };
                notifier.inner.borrow_mut().pending = None;
                notifier.notify_now();
            }
        });
        self.inner.borrow_mut().pending = Some(handle);
    }

    /// Cancels a pending notification without delivering it.
    pub fn cancel_pending(&self) {
        if let Some(previous) = self.inner.borrow_mut().pending.take() {
            previous.abort();
        }
    }

    /// Delivers a notification immediately.
    pub fn notify_now(&self) {
        // Subscribers may subscribe or unsubscribe while being notified
        let mut current = std::mem::take(&mut self.inner.borrow_mut().subscribers);
        info!(subscribers = current.len(), "components updated");

        let mut kept = Vec::with_capacity(current.len());
        for (id, mut subscriber) in current.drain(..) {
            if self.inner.borrow().cancelled.contains(&id) {
                continue;
            }
            if subscriber() == Subscription::Keep {
                kept.push((id, subscriber));
            }
        }

        let mut inner = self.inner.borrow_mut();
        kept.retain(|(id, _)| !inner.cancelled.contains(id));
        kept.append(&mut inner.subscribers);
        inner.subscribers = kept;
        inner.cancelled.clear();
        inner.fired += 1;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::task::LocalSet;
    use tokio::time::advance;

    fn counter(notifier: &RefreshNotifier) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        notifier.subscribe(move || {
            seen.set(seen.get() + 1);
            Subscription::Keep
        });
        count
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_burst_collapses_into_one_notification() {
        LocalSet::new()
            .run_until(async {
                let notifier = RefreshNotifier::new(Duration::from_millis(100));
                let count = counter(&notifier);

                for _ in 0..5 {
                    notifier.schedule();
                    advance(Duration::from_millis(60)).await;
                    settle().await;
                }
                assert_eq!(count.get(), 0);
                assert!(notifier.pending());

                // Timed from the last schedule, not the first
                advance(Duration::from_millis(50)).await;
                settle().await;
                assert_eq!(count.get(), 1);
                assert!(!notifier.pending());
                assert_eq!(notifier.fired(), 1);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_cancelled_subscriber_is_dropped() {
        let notifier = RefreshNotifier::default();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        notifier.subscribe(move || {
            seen.set(seen.get() + 1);
            Subscription::Cancel
        });
        let kept = counter(&notifier);

        notifier.notify_now();
        notifier.notify_now();
        assert_eq!(calls.get(), 1);
        assert_eq!(kept.get(), 2);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unsubscribe_during_delivery() {
        let notifier = RefreshNotifier::default();
        let later = Rc::new(Cell::new(0));

        let handle = notifier.clone();
        let target = Rc::new(Cell::new(0));
        let target_id = target.clone();
        notifier.subscribe(move || {
            handle.unsubscribe(target_id.get());
            Subscription::Keep
        });
        let seen = later.clone();
        let id = notifier.subscribe(move || {
            seen.set(seen.get() + 1);
            Subscription::Keep
        });
        target.set(id);

        notifier.notify_now();
        assert_eq!(later.get(), 0);
        assert_eq!(notifier.subscriber_count(), 1);
    }
}
