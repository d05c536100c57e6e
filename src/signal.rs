//! Payload-free, process-wide session-expired broadcast.

// std
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
// self
use crate::_prelude::*;

/// Callback invoked when the session ends.
pub type SessionListener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`SessionSignal::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Capability used to announce that the user must sign in again.
pub trait SessionSignal
where
	Self: Send + Sync,
{
	/// Notifies every current subscriber.
	fn publish(&self);

	/// Registers `listener` until it is unsubscribed.
	fn subscribe(&self, listener: SessionListener) -> SubscriptionId;

	/// Drops a listener. Returns `false` for unknown ids.
	fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// In-process [`SessionSignal`]; clones share subscribers.
#[derive(Clone, Default)]
pub struct SessionBroadcast(Arc<BroadcastInner>);
impl SessionBroadcast {
	/// Number of times the signal has been published.
	pub fn published(&self) -> usize {
		self.0.published.load(Ordering::Acquire)
	}

	/// Number of registered listeners.
	pub fn subscriber_count(&self) -> usize {
		self.0.listeners.read().len()
	}
}
impl SessionSignal for SessionBroadcast {
	fn publish(&self) {
		self.0.published.fetch_add(1, Ordering::AcqRel);

		// Listeners run outside the lock so they may (un)subscribe re-entrantly.
		let listeners = self
			.0
			.listeners
			.read()
			.iter()
			.map(|(_, listener)| listener.clone())
			.collect::<Vec<_>>();

		for listener in listeners {
			listener();
		}
	}

	fn subscribe(&self, listener: SessionListener) -> SubscriptionId {
		let id = SubscriptionId(self.0.next_id.fetch_add(1, Ordering::Relaxed));

		self.0.listeners.write().push((id, listener));

		id
	}

	fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut listeners = self.0.listeners.write();
		let before = listeners.len();

		listeners.retain(|(existing, _)| *existing != id);

		listeners.len() != before
	}
}
impl Debug for SessionBroadcast {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBroadcast")
			.field("subscribers", &self.subscriber_count())
			.field("published", &self.published())
			.finish()
	}
}

#[derive(Default)]
struct BroadcastInner {
	next_id: AtomicU64,
	published: AtomicUsize,
	listeners: RwLock<Vec<(SubscriptionId, SessionListener)>>,
}
