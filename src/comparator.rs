//! Reduction of fallible comparators to the `is_less` predicate the engine works with.

use core::cmp::Ordering;
use log::debug;
use std::sync::{
	Mutex, PoisonError,
	atomic::{AtomicBool, Ordering::Relaxed},
};

/// Fallible comparator remembering its first error.
///
/// Once an error has been recorded, [`is_less`](Self::is_less) stops calling the comparator and
/// answers `false`, and the [halt flag](Self::halted) tells the engine to stop splitting and
/// merging.
pub(crate) struct Fallible<F, E> {
	compare: F,
	halted: AtomicBool,
	error: Mutex<Option<E>>,
}

impl<F, E> Fallible<F, E> {
	pub fn new(compare: F) -> Self {
		Self {
			compare,
			halted: AtomicBool::new(false),
			error: Mutex::new(None),
		}
	}

	#[inline]
	pub fn is_less<T>(&self, a: &T, b: &T) -> bool
	where
		F: Fn(&T, &T) -> Result<Ordering, E>,
	{
		if self.halted.load(Relaxed) {
			return false;
		}
		match (self.compare)(a, b) {
			Ok(ordering) => ordering == Ordering::Less,
			Err(error) => {
				self.record(error);
				false
			}
		}
	}

	#[cold]
	fn record(&self, error: E) {
		let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
		if slot.is_none() {
			debug!("comparator failed, halting sort");
			*slot = Some(error);
		}
		self.halted.store(true, Relaxed);
	}

	/// Flag raised by the first comparator error.
	#[inline]
	pub fn halted(&self) -> &AtomicBool {
		&self.halted
	}

	/// First error the comparator returned, if any.
	pub fn into_error(self) -> Option<E> {
		self.error
			.into_inner()
			.unwrap_or_else(PoisonError::into_inner)
	}
}
