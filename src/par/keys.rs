//! Parallel key extraction for sorting by cached keys.

use crate::{config::SortConfig, par::context::Context, pool::WorkerPool};
use ndarray::{ArrayView1, Axis};
use std::sync::atomic::AtomicBool;

fn recurse<A, K, F, P>(
	v: ArrayView1<'_, A>,
	offset: usize,
	f: &F,
	cx: &Context<'_, P>,
) -> Vec<(K, usize)>
where
	A: Sync,
	K: Send,
	F: Fn(&A) -> K + Sync,
	P: WorkerPool,
{
	let len = v.len();
	if len <= cx.sequential_threshold() {
		return v
			.iter()
			.enumerate()
			.map(|(i, x)| (f(x), offset + i))
			.collect();
	}
	let mid = len - len / 2;
	let (left, right) = v.split_at(Axis(0), mid);
	let (mut left, right) = cx.join(
		move || recurse(left, offset, f, cx),
		move || recurse(right, offset + mid, f, cx),
	);
	left.extend(right);
	left
}

/// Computes `(f(v[i]), i)` for every index `i` of `v`, in index order.
///
/// Splits the work like sorting does, so keys are computed on the configured pool within the
/// same bound of concurrently live tasks.
pub(crate) fn par_cached_keys<A, K, F, P>(
	v: ArrayView1<'_, A>,
	f: &F,
	config: &SortConfig<P>,
) -> Vec<(K, usize)>
where
	A: Sync,
	K: Send,
	F: Fn(&A) -> K + Sync,
	P: WorkerPool,
{
	let halted = AtomicBool::new(false);
	let cx = Context::new(config, &halted);
	let cx = &cx;
	let keys = move || recurse(v, 0, f, cx);
	if config.is_pool_usable() {
		config.pool().install(keys)
	} else {
		keys()
	}
}
