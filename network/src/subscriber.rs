//! # Typed Broadcast Subscriber
//!
//! [`Subscriber`] is the fan-out primitive under the message hub: many
//! waiters park on one kind of value, and each [`relay`](Subscriber::relay)
//! wakes every waiter currently enqueued, exactly once each. Waiters that
//! arrive during or after a relay only see later relays.
//!
//! Delivery is a `Result<T, NetworkError>`: a decoded message on the `Ok`
//! side, a terminal or decode code on the `Err` side. A stopped subscriber
//! completes new waiters immediately with [`NetworkError::ServiceStopped`].
//!
//! The waiter list is swapped out under the lock and drained after the lock
//! is released, so a slow receiver never holds up a concurrent subscribe.
//!
//! [`StopDispatcher`] is the sibling primitive for stop signals: it fires at
//! most once, remembers its code, and completes late subscribers with the
//! recorded code on arrival.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::NetworkError;

/// The value a waiter receives: a decoded message or a terminal code.
pub type Delivery<T> = Result<T, NetworkError>;

/// A receiver handle for one pending delivery.
pub type DeliveryReceiver<T> = oneshot::Receiver<Delivery<T>>;

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

struct Inner<T> {
    stopped: bool,
    waiters: Vec<oneshot::Sender<Delivery<T>>>,
}

/// A one-shot-per-delivery broadcast channel for a single message kind.
pub struct Subscriber<T> {
    /// Short label for tracing; the hub names each slot after its kind.
    label: &'static str,
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Subscriber<T> {
    /// Creates a running subscriber.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            inner: Mutex::new(Inner {
                stopped: false,
                waiters: Vec::new(),
            }),
        }
    }

    /// Enqueues a waiter for the next relay.
    ///
    /// If the subscriber is stopped, the returned receiver is already
    /// resolved with [`NetworkError::ServiceStopped`].
    pub fn subscribe(&self) -> DeliveryReceiver<T> {
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.lock();
        if inner.stopped {
            drop(inner);
            let _ = tx.send(Err(NetworkError::ServiceStopped));
        } else {
            inner.waiters.push(tx);
        }
        rx
    }

    /// Awaits the next relay on this subscriber.
    ///
    /// A dropped subscriber resolves to `ServiceStopped`, same as a stopped
    /// one — callers cannot tell the difference and should not try.
    pub async fn recv(&self) -> Delivery<T> {
        self.subscribe()
            .await
            .unwrap_or(Err(NetworkError::ServiceStopped))
    }

    /// Delivers `delivery` to every currently enqueued waiter and returns
    /// how many were woken.
    ///
    /// Waiters enqueued while the drain is in progress are untouched; they
    /// see the next relay. Receivers that have been dropped are skipped.
    pub fn relay(&self, delivery: Delivery<T>) -> usize {
        let waiters = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.waiters)
        };

        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(delivery.clone());
        }

        if count > 0 {
            trace!(subscriber = self.label, waiters = count, "relayed");
        }
        count
    }

    /// Transitions to running. Idempotent when already running; after a
    /// `stop` this re-arms the subscriber for fresh subscriptions.
    pub fn start(&self) {
        self.inner.lock().stopped = false;
    }

    /// Transitions to stopped, draining any remaining waiters with
    /// [`NetworkError::ServiceStopped`].
    pub fn stop(&self) {
        let waiters = {
            let mut inner = self.inner.lock();
            inner.stopped = true;
            std::mem::take(&mut inner.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(Err(NetworkError::ServiceStopped));
        }
    }

    /// True once `stop` has been called (and `start` has not re-armed it).
    pub fn stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Number of waiters currently enqueued.
    pub fn waiting(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

// ---------------------------------------------------------------------------
// StopDispatcher
// ---------------------------------------------------------------------------

enum StopState {
    /// Not fired yet; pending subscriptions accumulate here.
    Armed(Vec<oneshot::Sender<NetworkError>>),
    /// Fired with this code; later subscribers complete immediately.
    Fired(NetworkError),
}

/// A fire-once stop signal with any number of subscribers.
///
/// Channels and the network façade hand these out through their
/// `subscribe_stop` seams. Subscribing is synchronous — once `subscribe`
/// returns, the waiter is guaranteed to observe a later `fire`.
pub struct StopDispatcher {
    state: Mutex<StopState>,
}

impl StopDispatcher {
    /// Creates an armed dispatcher.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StopState::Armed(Vec::new())),
        }
    }

    /// Registers a stop waiter. If the signal already fired, the receiver
    /// is resolved immediately with the recorded code.
    pub fn subscribe(&self) -> oneshot::Receiver<NetworkError> {
        let (tx, rx) = oneshot::channel();

        let mut state = self.state.lock();
        match &mut *state {
            StopState::Armed(waiters) => waiters.push(tx),
            StopState::Fired(code) => {
                let code = code.clone();
                drop(state);
                let _ = tx.send(code);
            }
        }
        rx
    }

    /// Fires the signal with `code`. Only the first call delivers; repeat
    /// calls are ignored so racing stop paths cannot double-notify.
    pub fn fire(&self, code: NetworkError) {
        let waiters = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, StopState::Fired(code.clone())) {
                StopState::Armed(waiters) => waiters,
                fired @ StopState::Fired(_) => {
                    // Keep the original code; this call lost the race.
                    *state = fired;
                    return;
                }
            }
        };

        for waiter in waiters {
            let _ = waiter.send(code.clone());
        }
    }

    /// True once the signal has fired.
    pub fn fired(&self) -> bool {
        matches!(&*self.state.lock(), StopState::Fired(_))
    }
}

impl Default for StopDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relay_wakes_current_waiters_exactly_once() {
        let subscriber = Subscriber::<u64>::new("test");
        let first = subscriber.subscribe();
        let second = subscriber.subscribe();
        assert_eq!(subscriber.waiting(), 2);

        assert_eq!(subscriber.relay(Ok(42)), 2);
        assert_eq!(first.await.unwrap(), Ok(42));
        assert_eq!(second.await.unwrap(), Ok(42));

        // The list was drained: a second relay has nobody to wake.
        assert_eq!(subscriber.relay(Ok(43)), 0);
    }

    #[tokio::test]
    async fn waiter_enqueued_after_relay_sees_only_later_relays() {
        let subscriber = Subscriber::<u64>::new("test");
        subscriber.relay(Ok(1));

        let late = subscriber.subscribe();
        subscriber.relay(Ok(2));
        assert_eq!(late.await.unwrap(), Ok(2));
    }

    #[tokio::test]
    async fn stop_drains_with_service_stopped() {
        let subscriber = Subscriber::<u64>::new("test");
        let waiter = subscriber.subscribe();

        subscriber.stop();
        assert_eq!(waiter.await.unwrap(), Err(NetworkError::ServiceStopped));

        // New subscriptions complete immediately while stopped.
        assert_eq!(
            subscriber.subscribe().await.unwrap(),
            Err(NetworkError::ServiceStopped)
        );
        assert_eq!(subscriber.waiting(), 0);
    }

    #[tokio::test]
    async fn start_rearms_after_stop() {
        let subscriber = Subscriber::<u64>::new("test");
        subscriber.stop();
        subscriber.start();
        assert!(!subscriber.stopped());

        let waiter = subscriber.subscribe();
        subscriber.relay(Ok(7));
        assert_eq!(waiter.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn dropped_subscriber_wakes_its_receivers() {
        let subscriber = Subscriber::<u64>::new("test");
        let rx = subscriber.subscribe();
        drop(subscriber);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_poison_relay() {
        let subscriber = Subscriber::<u64>::new("test");
        let keep = subscriber.subscribe();
        let dropped = subscriber.subscribe();
        drop(dropped);

        subscriber.relay(Ok(5));
        assert_eq!(keep.await.unwrap(), Ok(5));
    }

    #[tokio::test]
    async fn stop_dispatcher_fires_once() {
        let dispatcher = StopDispatcher::new();
        let early = dispatcher.subscribe();

        dispatcher.fire(NetworkError::ServiceStopped);
        dispatcher.fire(NetworkError::AcceptFailed); // loses the race, ignored

        assert_eq!(early.await.unwrap(), NetworkError::ServiceStopped);
        assert!(dispatcher.fired());

        // Late subscribers get the original code, not the ignored one.
        let late = dispatcher.subscribe();
        assert_eq!(late.await.unwrap(), NetworkError::ServiceStopped);
    }
}
