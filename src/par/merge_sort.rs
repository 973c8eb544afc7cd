//! Derivative work of [`rayon::slice::mergesort`] licensed under `MIT OR Apache-2.0`.
//!
//! [`rayon::slice::mergesort`]: https://docs.rs/rayon/latest/src/rayon/slice/mergesort.rs.html

use crate::{
	comparator::Fallible,
	config::SortConfig,
	error::Error,
	merge_sort::{scratch, sort_sequential},
	par::context::Context,
	pool::WorkerPool,
};
use core::{
	cmp::Ordering,
	mem::{ManuallyDrop, size_of},
	ptr,
};
use log::debug;
use ndarray::{ArrayView1, ArrayViewMut1, Axis};
use std::sync::atomic::AtomicBool;

/// Splits two sorted slices so that they can be merged in parallel.
///
/// Returns two indices `(a, b)` so that slices `left[..a]` and `right[..b]` come before
/// `left[a..]` and `right[b..]`. The pivot is the middle element of the longer slice, its
/// counterpart in the shorter one is found by binary search.
fn split_for_merge<T, F>(
	left: ArrayView1<'_, T>,
	right: ArrayView1<'_, T>,
	is_less: &F,
) -> (usize, usize)
where
	F: Fn(&T, &T) -> bool,
{
	let left_len = left.len();
	let right_len = right.len();

	if left_len >= right_len {
		let left_mid = left_len / 2;

		// Find the first element in `right` that is greater than or equal to `left[left_mid]`.
		let mut a = 0;
		let mut b = right_len;
		while a < b {
			let m = a + (b - a) / 2;
			if is_less(&right[m], &left[left_mid]) {
				a = m + 1;
			} else {
				b = m;
			}
		}

		(left_mid, a)
	} else {
		let right_mid = right_len / 2;

		// Find the first element in `left` that is greater than `right[right_mid]`.
		let mut a = 0;
		let mut b = left_len;
		while a < b {
			let m = a + (b - a) / 2;
			if is_less(&right[right_mid], &left[m]) {
				b = m;
			} else {
				a = m + 1;
			}
		}

		(a, right_mid)
	}
}

/// Moves sorted `left` and `right` into `dest` so that `dest` ends up sorted.
///
/// On ties the element of `left` comes first. Merges whose inputs together reach the merge
/// threshold are split by [`split_for_merge`] and both halves merged via [`Context::join`].
///
/// # Safety
///
/// `dest` must have room for exactly `left.len() + right.len()` elements and must not overlap
/// `left` or `right`. The elements of `left` and `right` are moved bitwise, the caller must treat
/// them as moved-from afterwards.
///
/// Even if `is_less` panics at any point during the merge process, this function will fully copy
/// all elements from `left` and `right` into `dest` (not necessarily in sorted order).
unsafe fn par_merge<'a, T, F, P>(
	left: ArrayViewMut1<'a, T>,
	right: ArrayViewMut1<'a, T>,
	dest: ArrayViewMut1<'a, T>,
	is_less: &F,
	cx: &Context<'_, P>,
) where
	T: Send,
	F: Fn(&T, &T) -> bool + Sync,
	P: WorkerPool,
{
	let left_len = left.len();
	let right_len = right.len();
	debug_assert_eq!(left_len + right_len, dest.len());

	// Intermediate state of the merge process, which serves two purposes:
	// 1. Protects integrity of `dest` from panics in `is_less`.
	// 2. Copies the remaining elements as soon as one of the two sides is exhausted.
	let mut s = State {
		left,
		left_start: 0,
		right,
		right_start: 0,
		dest,
		dest_start: 0,
	};

	if left_len == 0 || right_len == 0 || left_len + right_len < cx.merge_threshold() {
		while s.left_start < left_len && s.right_start < right_len {
			// Consume the lesser side.
			// If equal, prefer the left run to maintain stability.
			// SAFETY: Both starts are in bounds and `dest_start < dest.len()`.
			unsafe {
				let src = if is_less(s.right.uget(s.right_start), s.left.uget(s.left_start)) {
					s.right_start += 1;
					s.right.uget(s.right_start - 1) as *const T
				} else {
					s.left_start += 1;
					s.left.uget(s.left_start - 1) as *const T
				};
				ptr::copy_nonoverlapping(src, s.dest.uget_mut(s.dest_start), 1);
			}
			s.dest_start += 1;
		}
		// Finally, `s` gets dropped, thus copying the remaining elements all at once.
	} else {
		// Function `split_for_merge` might panic. If that happens, `s` will get dropped and copy
		// the whole `left` and `right` into `dest`.
		let (left_mid, right_mid) = split_for_merge(s.left.view(), s.right.view(), is_less);

		// From here on both recursive calls take over the guarantee of `s`. `Context::join`
		// ensures both of them run even if one panics.
		let (left, right, dest) = s.into_parts();
		let (left_l, left_r) = left.split_at(Axis(0), left_mid);
		let (right_l, right_r) = right.split_at(Axis(0), right_mid);
		let (dest_l, dest_r) = dest.split_at(Axis(0), left_mid + right_mid);
		cx.join(
			// SAFETY: Each pair of inputs exactly fills its disjoint part of `dest`.
			move || unsafe { par_merge(left_l, right_l, dest_l, is_less, cx) },
			move || unsafe { par_merge(left_r, right_r, dest_r, is_less, cx) },
		);
	}

	// When dropped, copies `left[left_start..]` and `right[right_start..]` into
	// `dest[dest_start..]`, in that order.
	struct State<'a, T> {
		left: ArrayViewMut1<'a, T>,
		left_start: usize,
		right: ArrayViewMut1<'a, T>,
		right_start: usize,
		dest: ArrayViewMut1<'a, T>,
		dest_start: usize,
	}

	impl<'a, T> State<'a, T> {
		/// Disarms the guard, returning its untouched views.
		fn into_parts(self) -> (ArrayViewMut1<'a, T>, ArrayViewMut1<'a, T>, ArrayViewMut1<'a, T>) {
			debug_assert!(self.left_start == 0 && self.right_start == 0 && self.dest_start == 0);
			let this = ManuallyDrop::new(self);
			// SAFETY: `this` is never dropped, so every view is moved out exactly once.
			unsafe {
				(
					ptr::read(&this.left),
					ptr::read(&this.right),
					ptr::read(&this.dest),
				)
			}
		}
	}

	impl<T> Drop for State<'_, T> {
		fn drop(&mut self) {
			let left_len = self.left.len() - self.left_start;
			let right_len = self.right.len() - self.right_start;
			// SAFETY: The remaining elements of both inputs exactly fill the rest of `dest`.
			unsafe {
				for i in 0..left_len {
					ptr::copy_nonoverlapping(
						self.left.uget(self.left_start + i),
						self.dest.uget_mut(self.dest_start + i),
						1,
					);
				}
				for i in 0..right_len {
					ptr::copy_nonoverlapping(
						self.right.uget(self.right_start + i),
						self.dest.uget_mut(self.dest_start + left_len + i),
						1,
					);
				}
			}
		}
	}
}

/// Merges the sorted halves `v[..mid]` and `v[mid..]` through a scratch buffer of `v.len()`.
fn merge_halves<T, F, P>(
	mut v: ArrayViewMut1<'_, T>,
	mid: usize,
	is_less: &F,
	cx: &Context<'_, P>,
) -> Result<(), Error>
where
	T: Send,
	F: Fn(&T, &T) -> bool + Sync,
	P: WorkerPool,
{
	let len = v.len();

	// The halves are in order already, nothing to merge.
	if !is_less(&v[mid], &v[mid - 1]) {
		return Ok(());
	}

	let mut buf = scratch::<T>(len)?;
	let buf = buf.as_mut_ptr();
	// SAFETY: `buf` has room for `len` elements. After moving `v` into it, `par_merge` moves
	// every element back into `v` exactly once, even on panic. The vector keeps length zero and
	// never drops the shallow copies.
	unsafe {
		for (i, x) in v.iter().enumerate() {
			ptr::copy_nonoverlapping(x, buf.add(i), 1);
		}
		let buf = ArrayViewMut1::from_shape_ptr(len, buf);
		let (left, right) = buf.split_at(Axis(0), mid);
		par_merge(left, right, v.view_mut(), is_less, cx);
	}
	Ok(())
}

/// Sorts `v` by splitting it in halves, sorting both via [`Context::join`] and merging them.
fn recurse<T, F, P>(mut v: ArrayViewMut1<'_, T>, is_less: &F, cx: &Context<'_, P>) -> Result<(), Error>
where
	T: Send,
	F: Fn(&T, &T) -> bool + Sync,
	P: WorkerPool,
{
	if cx.is_halted() {
		return Ok(());
	}

	let len = v.len();
	if len <= cx.sequential_threshold() {
		return sort_sequential(v, is_less);
	}

	// The left half takes the odd element.
	let mid = len - len / 2;
	let (left, right) = v.view_mut().split_at(Axis(0), mid);
	let (left, right) = cx.join(
		move || recurse(left, is_less, cx),
		move || recurse(right, is_less, cx),
	);
	left?;
	right?;

	if cx.is_halted() {
		return Ok(());
	}
	merge_halves(v, mid, is_less, cx)
}

/// Checks whether `v` is sorted, splitting the check the same way as [`recurse`] splits sorting.
///
/// Takes a mutable view only to be [`Send`] without requiring `T: Sync`, nothing is written.
fn is_sorted<T, F, P>(v: ArrayViewMut1<'_, T>, is_less: &F, cx: &Context<'_, P>) -> bool
where
	T: Send,
	F: Fn(&T, &T) -> bool + Sync,
	P: WorkerPool,
{
	let len = v.len();
	if len <= cx.sequential_threshold() {
		return (1..len).all(|i| !is_less(&v[i], &v[i - 1]));
	}
	let mid = len - len / 2;
	if is_less(&v[mid], &v[mid - 1]) {
		return false;
	}
	let (left, right) = v.split_at(Axis(0), mid);
	let (left, right) = cx.join(
		move || is_sorted(left, is_less, cx),
		move || is_sorted(right, is_less, cx),
	);
	left && right
}

/// Sorts `v` stably in parallel with the `is_less` predicate.
///
/// Partitions longer than the sequential threshold are split in halves which are sorted as pairs
/// of tasks joined on the configured pool, then merged in parallel. The number of concurrently
/// live tasks is bounded by the configured parallelism, excess tasks run inline.
///
/// Sorting stops early once `halted` is raised, leaving `v` in unspecified order. Every element
/// of `v` is retained in any case, also if `is_less` panics.
pub(crate) fn par_merge_sort<T, F, P>(
	mut v: ArrayViewMut1<'_, T>,
	is_less: &F,
	config: &SortConfig<P>,
	halted: &AtomicBool,
) -> Result<(), Error>
where
	T: Send,
	F: Fn(&T, &T) -> bool + Sync,
	P: WorkerPool,
{
	// Sorting has no meaningful behavior on zero-sized types.
	if size_of::<T>() == 0 || v.len() < 2 {
		return Ok(());
	}

	let len = v.len();
	let cx = Context::new(config, halted);
	let cx = &cx;
	let sort = move || -> Result<(), Error> {
		recurse(v.view_mut(), is_less, cx)?;
		if config.verify() && !cx.is_halted() && !is_sorted(v, is_less, cx) {
			debug!("sorted array of {len} elements is out of order");
			return Err(Error::InvalidComparator);
		}
		Ok(())
	};
	if config.is_pool_usable() {
		config.pool().install(sort)
	} else {
		sort()
	}
}

/// Sorts `v` stably in parallel with a fallible comparator.
///
/// The first error returned by `compare` halts the sort and is returned as
/// [`Error::Comparator`], taking precedence over engine errors.
pub(crate) fn try_par_merge_sort<T, E, F, P>(
	v: ArrayViewMut1<'_, T>,
	compare: F,
	config: &SortConfig<P>,
) -> Result<(), Error<E>>
where
	T: Send,
	E: Send,
	F: Fn(&T, &T) -> Result<Ordering, E> + Sync,
	P: WorkerPool,
{
	let fallible = Fallible::new(compare);
	let result = par_merge_sort(
		v,
		&|a: &T, b: &T| fallible.is_less(a, b),
		config,
		fallible.halted(),
	);
	match fallible.into_error() {
		Some(error) => Err(Error::Comparator(error)),
		None => result.map_err(Error::widen),
	}
}

#[cfg(test)]
mod test {
	use super::{par_merge_sort, split_for_merge, try_par_merge_sort};
	use crate::{
		config::SortConfig,
		error::Error,
		pool::{InlinePool, WorkerPool},
	};
	use core::cmp::Ordering;
	use ndarray::{Array1, Array2, ArrayView1, s};
	use quickcheck_macros::quickcheck;
	use rand::{Rng, SeedableRng, rngs::StdRng};
	use std::{
		panic::{self, AssertUnwindSafe},
		sync::{
			Arc,
			atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
		},
	};

	#[derive(Debug, Clone, Copy)]
	struct Item {
		index: usize,
		value: u32,
	}

	impl Eq for Item {}

	impl PartialEq for Item {
		fn eq(&self, other: &Self) -> bool {
			self.value == other.value
		}
	}

	impl Ord for Item {
		fn cmp(&self, other: &Self) -> Ordering {
			self.value.cmp(&other.value)
		}
	}

	impl PartialOrd for Item {
		fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
			Some(self.cmp(other))
		}
	}

	impl From<(usize, u32)> for Item {
		fn from((index, value): (usize, u32)) -> Self {
			Self { index, value }
		}
	}

	/// Forces deep recursion and parallel merges on small inputs.
	fn fine_grained() -> SortConfig {
		SortConfig::new()
			.with_sequential_threshold(4)
			.with_merge_threshold(8)
	}

	fn sort<T: Ord + Send, P: WorkerPool>(v: &mut Array1<T>, config: &SortConfig<P>) {
		let halted = AtomicBool::new(false);
		par_merge_sort(v.view_mut(), &T::lt, config, &halted).unwrap();
	}

	#[test]
	fn split() {
		fn check(left: &[u32], right: &[u32]) {
			let left = ArrayView1::from(left);
			let right = ArrayView1::from(right);
			let (l, r) = split_for_merge(left, right, &|&a, &b| a < b);
			assert!(
				left.slice(s![..l])
					.iter()
					.all(|&x| right.slice(s![r..]).iter().all(|&y| x <= y))
			);
			assert!(
				right
					.slice(s![..r])
					.iter()
					.all(|&x| left.slice(s![l..]).iter().all(|&y| x < y))
			);
		}

		check(&[1, 2, 2, 2, 2, 3], &[1, 2, 2, 2, 2, 3]);
		check(&[1, 2, 2, 2, 2, 3], &[]);
		check(&[], &[1, 2, 2, 2, 2, 3]);

		let rng = &mut StdRng::seed_from_u64(0x5EED);

		for _ in 0..100 {
			let limit: u32 = rng.random_range(1..21);
			let left_len: usize = rng.random_range(0..20);
			let right_len: usize = rng.random_range(0..20);

			let mut left = (0..left_len)
				.map(|_| rng.random_range(0..limit))
				.collect::<Vec<_>>();
			let mut right = (0..right_len)
				.map(|_| rng.random_range(0..limit))
				.collect::<Vec<_>>();

			left.sort();
			right.sort();
			check(&left, &right);
		}
	}

	#[cfg_attr(miri, ignore)]
	#[quickcheck]
	fn stably_sorted(xs: Vec<u32>) {
		let xs = xs
			.into_iter()
			.map(|x| x % 16)
			.enumerate()
			.map(Item::from)
			.collect::<Vec<Item>>();
		let mut sorted = xs.clone();
		sorted.sort();
		let mut array = Array1::from_vec(xs);
		sort(&mut array, &fine_grained());
		for (a, s) in array.iter().zip(&sorted) {
			assert_eq!(a.index, s.index);
			assert_eq!(a.value, s.value);
		}
	}

	#[cfg_attr(miri, ignore)]
	#[quickcheck]
	fn sorted_inline(xs: Vec<i64>) {
		let mut sorted = xs.clone();
		sorted.sort();
		let mut array = Array1::from_vec(xs);
		sort(&mut array, &fine_grained().with_pool(InlinePool));
		assert_eq!(array, Array1::from_vec(sorted));
	}

	#[test]
	fn threshold_edges() {
		let threshold = 64;
		let config = SortConfig::new().with_sequential_threshold(threshold);
		for len in [threshold - 1, threshold, threshold + 1, 2 * threshold + 1] {
			let mut array = Array1::from_iter((0..len as u64).map(|x| x * 7919 % 127));
			let mut sorted = array.to_vec();
			sorted.sort();
			sort(&mut array, &config);
			assert_eq!(array, Array1::from_vec(sorted), "length {len}");
		}
	}

	#[test]
	fn owned_elements() {
		let rng = &mut StdRng::seed_from_u64(7);
		let xs = (0..3000)
			.map(|_| rng.random_range(0..500u32).to_string())
			.collect::<Vec<_>>();
		let mut sorted = xs.clone();
		sorted.sort();
		let mut array = Array1::from_vec(xs);
		sort(&mut array, &fine_grained());
		assert_eq!(array, Array1::from_vec(sorted));
	}

	#[test]
	fn non_contiguous_column() {
		let mut matrix = Array2::from_shape_fn((5000, 3), |(i, j)| (i * 7919 + j) % 1009);
		let halted = AtomicBool::new(false);
		par_merge_sort(matrix.column_mut(1), &usize::lt, &fine_grained(), &halted).unwrap();
		let column = matrix.column(1);
		assert!(column.windows(2).into_iter().all(|w| w[0] <= w[1]));
		// Other columns are untouched.
		assert_eq!(matrix[[1, 0]], 7919 % 1009);
		assert_eq!(matrix[[1, 2]], (7919 + 2) % 1009);
	}

	#[test]
	fn inconsistent_comparator() {
		let mut array = Array1::from_iter(0..10_000u32);
		let halted = AtomicBool::new(false);
		let result = par_merge_sort(array.view_mut(), &|_: &u32, _: &u32| true, &fine_grained(), &halted);
		assert_eq!(result, Err(Error::InvalidComparator));

		let mut sorted = array.to_vec();
		sorted.sort();
		assert_eq!(sorted, (0..10_000).collect::<Vec<_>>());

		let mut array = Array1::from_iter(0..10_000u32);
		let config = fine_grained().with_verify(false);
		let result = par_merge_sort(array.view_mut(), &|_: &u32, _: &u32| true, &config, &halted);
		assert_eq!(result, Ok(()));
	}

	#[test]
	fn comparator_error() {
		let input = (0..20_000i32)
			.map(|x| (x * 7919) % 20_011 - 10_000)
			.collect::<Vec<_>>();
		let mut expected = input.clone();
		expected.sort();

		for inline in [false, true] {
			let calls = AtomicUsize::new(0);
			let calls_at_failure = AtomicUsize::new(0);
			let failures = AtomicUsize::new(0);
			let compare = |a: &i32, b: &i32| {
				let call = calls.fetch_add(1, SeqCst) + 1;
				if *a == -10_000 || *b == -10_000 {
					if failures.fetch_add(1, SeqCst) == 0 {
						calls_at_failure.store(call, SeqCst);
					}
					Err("unordered")
				} else {
					Ok(a.cmp(b))
				}
			};
			let mut array = Array1::from_vec(input.clone());
			let result = if inline {
				try_par_merge_sort(array.view_mut(), compare, &fine_grained().with_pool(InlinePool))
			} else {
				try_par_merge_sort(array.view_mut(), compare, &fine_grained())
			};
			assert_eq!(result, Err(Error::Comparator("unordered")));
			assert!(failures.load(SeqCst) >= 1);
			if inline {
				// No comparison happens once the first one failed.
				assert_eq!(failures.load(SeqCst), 1);
				assert_eq!(calls.load(SeqCst), calls_at_failure.load(SeqCst));
			}

			// Still a permutation of the input.
			let mut sorted = array.to_vec();
			sorted.sort();
			assert_eq!(sorted, expected);
		}
	}

	#[test]
	fn tiny_merge_threshold() {
		for merge_threshold in 0..=3 {
			let config = SortConfig::new()
				.with_sequential_threshold(2)
				.with_merge_threshold(merge_threshold)
				.with_pool(InlinePool);
			let mut array = Array1::from_vec(vec![1, 3, 2, 4]);
			sort(&mut array, &config);
			assert_eq!(array, Array1::from_vec(vec![1, 2, 3, 4]));
		}
	}

	#[cfg_attr(miri, ignore)]
	#[quickcheck]
	fn stably_sorted_with_tiny_thresholds(xs: Vec<u32>, merge_threshold: u8, sequential_threshold: u8) {
		let config = SortConfig::new()
			.with_sequential_threshold(usize::from(sequential_threshold % 4) + 1)
			.with_merge_threshold(usize::from(merge_threshold % 4))
			.with_max_parallelism(4);
		let xs = xs
			.into_iter()
			.map(|x| x % 8)
			.enumerate()
			.map(Item::from)
			.collect::<Vec<Item>>();
		let mut sorted = xs.clone();
		sorted.sort();
		let mut array = Array1::from_vec(xs);
		sort(&mut array, &config);
		for (a, s) in array.iter().zip(&sorted) {
			assert_eq!(a.index, s.index);
			assert_eq!(a.value, s.value);
		}
	}

	#[test]
	fn comparator_panic() {
		let mut array = Array1::from_iter((0..20_000u32).map(|x| (x * 7919 % 20_011).to_string()));
		let poison = array[1234].clone();
		let result = panic::catch_unwind(AssertUnwindSafe(|| {
			let halted = AtomicBool::new(false);
			par_merge_sort(
				array.view_mut(),
				&|a: &String, b: &String| {
					if *a == poison || *b == poison {
						panic!("comparator panicked");
					}
					a < b
				},
				&fine_grained(),
				&halted,
			)
		}));
		assert!(result.is_err());

		// Every element was retained exactly once.
		let mut sorted = array.to_vec();
		sorted.sort();
		let mut expected = (0..20_000u32)
			.map(|x| (x * 7919 % 20_011).to_string())
			.collect::<Vec<_>>();
		expected.sort();
		assert_eq!(sorted, expected);
	}

	#[test]
	fn custom_pool() {
		let pool = Arc::new(
			rayon::ThreadPoolBuilder::new()
				.num_threads(3)
				.build()
				.unwrap(),
		);
		let rng = &mut StdRng::seed_from_u64(42);
		let mut array = Array1::from_iter((0..100_000).map(|_| rng.random::<i32>()));
		let mut sorted = array.to_vec();
		sorted.sort();
		sort(&mut array, &fine_grained().with_pool(pool.clone()));
		assert_eq!(array, Array1::from_vec(sorted));
	}

	#[test]
	fn halted_before_start() {
		let mut array = Array1::from_iter((0..1000u32).rev());
		let halted = AtomicBool::new(true);
		par_merge_sort(array.view_mut(), &u32::lt, &fine_grained(), &halted).unwrap();
		assert_eq!(array, Array1::from_iter((0..1000u32).rev()));
	}
}
