use std::sync::Arc;

use arc_swap::ArcSwap;

/// A read-mostly value that is replaced wholesale rather than mutated in
/// place. Readers call [`Snapshot::load`] once per request and hold the
/// returned `Arc` for the lifetime of that request; writers build a new `T`
/// and call [`Snapshot::store`] to atomically retire the old one.
///
/// This is the concurrency primitive behind `FilterConfig`: handlers must
/// never re-read the snapshot mid-request, since two reads could observe two
/// different generations.
pub struct Snapshot<T> {
	inner: ArcSwap<T>,
}

impl<T> Snapshot<T> {
	pub fn new(value: T) -> Self {
		Self {
			inner: ArcSwap::from_pointee(value),
		}
	}

	/// Pin the current generation for the duration of a request.
	pub fn load(&self) -> Arc<T> {
		self.inner.load_full()
	}

	/// Atomically replace the snapshot. Outstanding readers keep their
	/// already-pinned `Arc` until they drop it.
	pub fn store(&self, value: T) {
		self.inner.store(Arc::new(value));
	}
}

impl<T: Default> Default for Snapshot<T> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn readers_pin_their_generation() {
		let snap = Snapshot::new(1u32);
		let first = snap.load();
		snap.store(2);
		assert_eq!(*first, 1);
		assert_eq!(*snap.load(), 2);
	}
}
