//! State shared by all tasks of a single parallel sort.

use crate::{config::SortConfig, pool::WorkerPool};
use std::sync::atomic::{
	AtomicBool, AtomicUsize,
	Ordering::{AcqRel, Relaxed},
};

/// Bounds the number of forked tasks alive at the same time.
#[derive(Debug)]
pub(crate) struct Budget {
	live: AtomicUsize,
	max: usize,
}

impl Budget {
	pub fn new(max: usize) -> Self {
		Self {
			live: AtomicUsize::new(0),
			max,
		}
	}

	/// Takes a permit for one more forked task, unless `max` tasks are alive already.
	pub fn try_acquire(&self) -> Option<Permit<'_>> {
		let mut live = self.live.load(Relaxed);
		loop {
			if live >= self.max {
				return None;
			}
			match self
				.live
				.compare_exchange_weak(live, live + 1, AcqRel, Relaxed)
			{
				Ok(_) => return Some(Permit(self)),
				Err(current) => live = current,
			}
		}
	}

	#[cfg(test)]
	pub fn live(&self) -> usize {
		self.live.load(Relaxed)
	}
}

/// Returns its slot to the [`Budget`] when dropped, also when unwinding.
#[must_use]
pub(crate) struct Permit<'a>(&'a Budget);

impl Drop for Permit<'_> {
	fn drop(&mut self) {
		self.0.live.fetch_sub(1, AcqRel);
	}
}

pub(crate) struct Context<'a, P> {
	pool: &'a P,
	budget: Budget,
	sequential_threshold: usize,
	merge_threshold: usize,
	halted: &'a AtomicBool,
}

impl<'a, P: WorkerPool> Context<'a, P> {
	pub fn new(config: &'a SortConfig<P>, halted: &'a AtomicBool) -> Self {
		// The calling task holds no permit, hence one less than the bound.
		let forks = config.max_parallelism() - 1;
		Self {
			pool: config.pool(),
			budget: Budget::new(forks),
			sequential_threshold: config.sequential_threshold(),
			merge_threshold: config.merge_threshold(),
			halted,
		}
	}

	#[inline]
	pub fn sequential_threshold(&self) -> usize {
		self.sequential_threshold
	}

	#[inline]
	pub fn merge_threshold(&self) -> usize {
		self.merge_threshold
	}

	/// Whether a comparator failure asked all tasks to wind down.
	#[inline]
	pub fn is_halted(&self) -> bool {
		self.halted.load(Relaxed)
	}

	/// Forks `oper_b` to the pool if the budget permits, otherwise runs both inline.
	///
	/// Either way both closures run even if one of them panics.
	pub fn join<A, B, RA, RB>(&self, oper_a: A, oper_b: B) -> (RA, RB)
	where
		A: FnOnce() -> RA + Send,
		B: FnOnce() -> RB + Send,
		RA: Send,
		RB: Send,
	{
		match self.budget.try_acquire() {
			Some(_permit) => self.pool.join(oper_a, oper_b),
			None => crate::pool::join_inline(oper_a, oper_b),
		}
	}
}
