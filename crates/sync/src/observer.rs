//! Callback registration for engine notifications.
//!
//! Consumers register plain callbacks and keep the returned [`Subscription`];
//! dropping it unregisters the callback. Emission happens on the task that
//! owns the emitting state machine, so callbacks must be cheap and must not
//! block. Forward to a channel with [`EventBus::forward`] for heavier work.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
	next_id: AtomicU64,
	callbacks: Mutex<Vec<(u64, Callback<E>)>>,
}

/// Fan-out of one event type to registered callbacks.
pub struct EventBus<E> {
	registry: Arc<Registry<E>>,
}

impl<E> Clone for EventBus<E> {
	fn clone(&self) -> Self {
		Self {
			registry: Arc::clone(&self.registry),
		}
	}
}

impl<E> Default for EventBus<E> {
	fn default() -> Self {
		Self {
			registry: Arc::new(Registry {
				next_id: AtomicU64::new(0),
				callbacks: Mutex::new(Vec::new()),
			}),
		}
	}
}

impl<E: 'static> std::fmt::Debug for EventBus<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBus").field("subscribers", &self.len()).finish()
	}
}

impl<E: 'static> EventBus<E> {
	/// Creates a bus with no subscribers.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `callback` until the returned subscription is dropped.
	#[must_use = "dropping the subscription unregisters the callback"]
	pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
		let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
		self.registry.callbacks.lock().push((id, Arc::new(callback)));

		let registry = Arc::downgrade(&self.registry);
		Subscription {
			unsubscribe: Some(Box::new(move || {
				if let Some(registry) = registry.upgrade() {
					registry.callbacks.lock().retain(|(cb_id, _)| *cb_id != id);
				}
			})),
		}
	}

	/// Invokes every registered callback with `event`.
	///
	/// The registry lock is released before callbacks run, so a callback may
	/// subscribe or unsubscribe without deadlocking.
	pub fn emit(&self, event: &E) {
		let callbacks: Vec<Callback<E>> = self.registry.callbacks.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
		for cb in callbacks {
			cb(event);
		}
	}

	/// Number of live subscriptions.
	pub fn len(&self) -> usize {
		self.registry.callbacks.lock().len()
	}

	/// Whether nobody is subscribed.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<E: Clone + Send + 'static> EventBus<E> {
	/// Forwards every event into an unbounded channel.
	///
	/// Events emitted after the receiver is dropped are discarded.
	pub fn forward(&self) -> (Subscription, mpsc::UnboundedReceiver<E>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let sub = self.subscribe(move |event: &E| {
			let _ = tx.send(event.clone());
		});
		(sub, rx)
	}
}

/// Registration guard returned by [`EventBus::subscribe`].
pub struct Subscription {
	unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
	/// Keeps the callback registered for the lifetime of the bus.
	pub fn detach(mut self) {
		self.unsubscribe = None;
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription").field("active", &self.unsubscribe.is_some()).finish()
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(unsubscribe) = self.unsubscribe.take() {
			unsubscribe();
		}
	}
}
