//! Worker pools the sort engine submits its tasks to.
//!
//! The engine never creates or destroys threads. It only forks pairs of tasks with
//! [`WorkerPool::join`] inside [`WorkerPool::install`], and sizes its task budget with
//! [`WorkerPool::parallelism`].

use std::{
	panic::{self, AssertUnwindSafe},
	sync::Arc,
};

/// Pool of workers executing forked sort and merge tasks.
pub trait WorkerPool: Sync {
	/// Number of tasks the pool can execute concurrently.
	///
	/// A pool reporting zero is considered unusable and the engine sorts on the calling thread.
	fn parallelism(&self) -> usize;
	/// Executes both closures, potentially in parallel, and returns once both have completed.
	///
	/// Both closures must run even if one of them panics, the panic is propagated afterwards.
	fn join<A, B, RA, RB>(&self, oper_a: A, oper_b: B) -> (RA, RB)
	where
		A: FnOnce() -> RA + Send,
		B: FnOnce() -> RB + Send,
		RA: Send,
		RB: Send;
	/// Executes `op` within the pool and returns its result.
	fn install<OP, R>(&self, op: OP) -> R
	where
		OP: FnOnce() -> R + Send,
		R: Send;
}

/// The global [`rayon`] thread pool.
///
/// Its size defaults to the number of hardware threads and can be overridden by the
/// `RAYON_NUM_THREADS` environment variable or [`rayon::ThreadPoolBuilder::build_global`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalPool;

impl WorkerPool for GlobalPool {
	#[inline]
	fn parallelism(&self) -> usize {
		rayon::current_num_threads()
	}
	#[inline]
	fn join<A, B, RA, RB>(&self, oper_a: A, oper_b: B) -> (RA, RB)
	where
		A: FnOnce() -> RA + Send,
		B: FnOnce() -> RB + Send,
		RA: Send,
		RB: Send,
	{
		rayon::join(oper_a, oper_b)
	}
	#[inline]
	fn install<OP, R>(&self, op: OP) -> R
	where
		OP: FnOnce() -> R + Send,
		R: Send,
	{
		op()
	}
}

impl WorkerPool for rayon::ThreadPool {
	#[inline]
	fn parallelism(&self) -> usize {
		self.current_num_threads()
	}
	#[inline]
	fn join<A, B, RA, RB>(&self, oper_a: A, oper_b: B) -> (RA, RB)
	where
		A: FnOnce() -> RA + Send,
		B: FnOnce() -> RB + Send,
		RA: Send,
		RB: Send,
	{
		// Runs directly when already on one of this pool's workers.
		self.install(|| rayon::join(oper_a, oper_b))
	}
	#[inline]
	fn install<OP, R>(&self, op: OP) -> R
	where
		OP: FnOnce() -> R + Send,
		R: Send,
	{
		rayon::ThreadPool::install(self, op)
	}
}

/// Pool without workers of its own, everything runs on the calling thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlinePool;

impl WorkerPool for InlinePool {
	#[inline]
	fn parallelism(&self) -> usize {
		1
	}
	#[inline]
	fn join<A, B, RA, RB>(&self, oper_a: A, oper_b: B) -> (RA, RB)
	where
		A: FnOnce() -> RA + Send,
		B: FnOnce() -> RB + Send,
		RA: Send,
		RB: Send,
	{
		join_inline(oper_a, oper_b)
	}
	#[inline]
	fn install<OP, R>(&self, op: OP) -> R
	where
		OP: FnOnce() -> R + Send,
		R: Send,
	{
		op()
	}
}

impl<P: WorkerPool> WorkerPool for &P {
	#[inline]
	fn parallelism(&self) -> usize {
		(**self).parallelism()
	}
	#[inline]
	fn join<A, B, RA, RB>(&self, oper_a: A, oper_b: B) -> (RA, RB)
	where
		A: FnOnce() -> RA + Send,
		B: FnOnce() -> RB + Send,
		RA: Send,
		RB: Send,
	{
		(**self).join(oper_a, oper_b)
	}
	#[inline]
	fn install<OP, R>(&self, op: OP) -> R
	where
		OP: FnOnce() -> R + Send,
		R: Send,
	{
		(**self).install(op)
	}
}

impl<P: WorkerPool + Send> WorkerPool for Arc<P> {
	#[inline]
	fn parallelism(&self) -> usize {
		(**self).parallelism()
	}
	#[inline]
	fn join<A, B, RA, RB>(&self, oper_a: A, oper_b: B) -> (RA, RB)
	where
		A: FnOnce() -> RA + Send,
		B: FnOnce() -> RB + Send,
		RA: Send,
		RB: Send,
	{
		(**self).join(oper_a, oper_b)
	}
	#[inline]
	fn install<OP, R>(&self, op: OP) -> R
	where
		OP: FnOnce() -> R + Send,
		R: Send,
	{
		(**self).install(op)
	}
}

/// Runs `oper_a` and then `oper_b` on the calling thread.
///
/// Like [`rayon::join`], `oper_b` still runs if `oper_a` panics and the panic is resumed once
/// `oper_b` has returned. Callers rely on this to keep every element of a partially merged array
/// accounted for.
pub(crate) fn join_inline<A, B, RA, RB>(oper_a: A, oper_b: B) -> (RA, RB)
where
	A: FnOnce() -> RA,
	B: FnOnce() -> RB,
{
	let ra = panic::catch_unwind(AssertUnwindSafe(oper_a));
	let rb = oper_b();
	match ra {
		Ok(ra) => (ra, rb),
		Err(payload) => panic::resume_unwind(payload),
	}
}
