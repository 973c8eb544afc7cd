//! Derivative work of [`rayon::slice::mergesort`] licensed under `MIT OR Apache-2.0`.
//!
//! Sequential stable sort of partitions at or below the sequential threshold.
//!
//! [`rayon::slice::mergesort`]: https://docs.rs/rayon/latest/src/rayon/slice/mergesort.rs.html

use crate::error::Error;
use core::{mem::ManuallyDrop, ptr};
use log::debug;
use ndarray::{ArrayViewMut1, s};

/// Slices of up to this length get sorted using insertion sort in order to avoid the cost of
/// buffer allocation.
const MAX_INSERTION: usize = 20;

/// Very short runs are extended using insertion sort to span at least this many elements.
const MIN_RUN: usize = 10;

/// Reserves uninitialized scratch memory for `len` elements.
///
/// The returned vector keeps its length at zero, so shallow copies stored in its spare capacity
/// are never dropped, even if a comparison panics.
pub(crate) fn scratch<T>(len: usize) -> Result<Vec<T>, Error> {
	let mut buf = Vec::new();
	buf.try_reserve_exact(len).map_err(|_| {
		debug!("cannot reserve scratch memory for {len} elements");
		Error::ResourceExhausted { len }
	})?;
	Ok(buf)
}

/// Reverses the order of elements in `v`, in place.
pub(crate) fn reverse<T>(mut v: ArrayViewMut1<'_, T>) {
	let len = v.len();
	for i in 0..len / 2 {
		v.swap(i, len - 1 - i);
	}
}

/// Sorts `v` sequentially and stably.
///
/// Short partitions use insertion sort, longer ones a run-adaptive merge sort with scratch memory
/// of half the length of `v`.
pub(crate) fn sort_sequential<T, F>(mut v: ArrayViewMut1<'_, T>, is_less: &F) -> Result<(), Error>
where
	F: Fn(&T, &T) -> bool,
{
	let len = v.len();
	if len <= MAX_INSERTION {
		insertion_sort(v, is_less);
		return Ok(());
	}
	let mut buf = scratch::<T>(len / 2)?;
	// SAFETY: `buf` can hold half of `v`, which covers the shorter run of every merge.
	let res = unsafe { merge_sort(v.view_mut(), buf.as_mut_ptr(), is_less) };
	if res == MergesortResult::Descending {
		reverse(v);
	}
	Ok(())
}

/// Sorts `v` using insertion sort, which is *O*(*n*^2) worst-case.
pub(crate) fn insertion_sort<T, F>(mut v: ArrayViewMut1<'_, T>, is_less: &F)
where
	F: Fn(&T, &T) -> bool,
{
	let len = v.len();
	if len >= 2 {
		for i in (0..len - 1).rev() {
			insert_head(v.slice_mut(s![i..]), is_less);
		}
	}
}

/// Inserts `v[0]` into pre-sorted sequence `v[1..]` so that whole `v[..]` becomes sorted.
///
/// This is the integral subroutine of insertion sort.
fn insert_head<T, F>(mut v: ArrayViewMut1<'_, T>, is_less: &F)
where
	F: Fn(&T, &T) -> bool,
{
	if v.len() < 2 || !is_less(&v[1], &v[0]) {
		return;
	}
	// SAFETY: All indices are below `v.len()`. `tmp` is written back exactly once by `hole`,
	// even if `is_less` panics, so `v` holds every element it initially held exactly once.
	unsafe {
		let tmp = ManuallyDrop::new(ptr::read(v.uget(0)));
		let mut hole = InsertionHole {
			src: &*tmp,
			dest: v.uget_mut(1),
		};
		ptr::copy_nonoverlapping(v.uget(1), v.uget_mut(0), 1);

		for i in 2..v.len() {
			if !is_less(v.uget(i), &*tmp) {
				break;
			}
			ptr::copy_nonoverlapping(v.uget(i), v.uget_mut(i - 1), 1);
			hole.dest = v.uget_mut(i);
		}
		// `hole` gets dropped and thus copies `tmp` into the remaining hole in `v`.
	}

	// When dropped, copies from `src` into `dest`.
	struct InsertionHole<T> {
		src: *const T,
		dest: *mut T,
	}

	impl<T> Drop for InsertionHole<T> {
		fn drop(&mut self) {
			// SAFETY: Both pointers are valid and distinct, see `insert_head`.
			unsafe { ptr::copy_nonoverlapping(self.src, self.dest, 1) };
		}
	}
}

/// Merges non-decreasing runs `v[..mid]` and `v[mid..]` using `buf` as temporary storage, and
/// stores the result into `v[..]`.
///
/// # Safety
///
/// The two runs must be non-empty and `mid` must be in bounds. Buffer `buf` must be long enough
/// to hold a copy of the shorter run. Also, `T` must not be a zero-sized type.
unsafe fn merge<T, F>(v: ArrayViewMut1<'_, T>, mid: usize, buf: *mut T, is_less: &F)
where
	F: Fn(&T, &T) -> bool,
{
	let len = v.len();

	// The shorter run is moved into `buf`, then both runs are traced from the end where the
	// shorter one starts and the lesser (or greater) element is written into the gap in `v`.
	// Whatever remains of `buf` is copied back by `hole` when dropped, which also restores `v` if
	// `is_less` panics.
	let mut hole;

	if mid <= len - mid {
		// SAFETY: `buf` can hold `v[..mid]`.
		unsafe {
			for i in 0..mid {
				ptr::copy_nonoverlapping(v.uget(i), buf.add(i), 1);
			}
		}
		hole = MergeHole {
			buf,
			start: 0,
			end: mid,
			v,
			dest: 0,
		};

		let mut right = mid;
		while hole.start < hole.end && right < len {
			// If equal, prefer the left run to maintain stability.
			// SAFETY: `hole.start < hole.end` and `right < len`, and `hole.dest < right`.
			unsafe {
				let src = if is_less(hole.v.uget(right), &*hole.buf.add(hole.start)) {
					right += 1;
					hole.v.uget(right - 1) as *const T
				} else {
					hole.start += 1;
					hole.buf.add(hole.start - 1) as *const T
				};
				ptr::copy_nonoverlapping(src, hole.v.uget_mut(hole.dest), 1);
				hole.dest += 1;
			}
		}
	} else {
		// SAFETY: `buf` can hold `v[mid..]`.
		unsafe {
			for i in 0..len - mid {
				ptr::copy_nonoverlapping(v.uget(mid + i), buf.add(i), 1);
			}
		}
		hole = MergeHole {
			buf,
			start: 0,
			end: len - mid,
			v,
			dest: mid,
		};

		let mut out = len;
		while 0 < hole.dest && 0 < hole.end {
			// If equal, prefer the right run to maintain stability.
			// SAFETY: Both runs are non-empty and `out > hole.dest`.
			unsafe {
				let src = if is_less(&*hole.buf.add(hole.end - 1), hole.v.uget(hole.dest - 1)) {
					hole.dest -= 1;
					hole.v.uget(hole.dest) as *const T
				} else {
					hole.end -= 1;
					hole.buf.add(hole.end) as *const T
				};
				out -= 1;
				ptr::copy_nonoverlapping(src, hole.v.uget_mut(out), 1);
			}
		}
	}
	// Finally, `hole` gets dropped. If the shorter run was not fully consumed, whatever remains of
	// it will now be copied into the hole in `v`.

	// When dropped, copies `buf[start..end]` into `v[dest..]`.
	struct MergeHole<'a, T> {
		buf: *mut T,
		start: usize,
		end: usize,
		v: ArrayViewMut1<'a, T>,
		dest: usize,
	}

	impl<T> Drop for MergeHole<'_, T> {
		fn drop(&mut self) {
			// SAFETY: `buf[start..end]` holds the unconsumed part of the shorter run and exactly
			// that many slots starting at `dest` are vacant in `v`.
			unsafe {
				for i in 0..self.end - self.start {
					ptr::copy_nonoverlapping(
						self.buf.add(self.start + i),
						self.v.uget_mut(self.dest + i),
						1,
					);
				}
			}
		}
	}
}

/// The result of merge sort.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergesortResult {
	/// The slice has already been sorted.
	NonDescending,
	/// The slice has been descending and therefore it was left intact.
	Descending,
	/// The slice was sorted.
	Sorted,
}

/// A sorted run that starts at index `start` and is of length `len`.
#[derive(Clone, Copy)]
struct Run {
	start: usize,
	len: usize,
}

/// Examines the stack of runs and identifies the next pair of runs to merge. More specifically,
/// if `Some(r)` is returned, that means `runs[r]` and `runs[r + 1]` must be merged next. If the
/// algorithm should continue building a new run instead, `None` is returned.
///
/// The invariants are enforced on the top four runs of the stack, enforcing them on just the top
/// three is not sufficient for them to hold for *all* runs in the stack. If the top run starts at
/// index 0, a merge is always demanded until the stack is fully collapsed.
#[inline]
fn collapse(runs: &[Run]) -> Option<usize> {
	let n = runs.len();

	if n >= 2
		&& (runs[n - 1].start == 0
			|| runs[n - 2].len <= runs[n - 1].len
			|| (n >= 3 && runs[n - 3].len <= runs[n - 2].len + runs[n - 1].len)
			|| (n >= 4 && runs[n - 4].len <= runs[n - 3].len + runs[n - 2].len))
	{
		if n >= 3 && runs[n - 3].len < runs[n - 1].len {
			Some(n - 3)
		} else {
			Some(n - 2)
		}
	} else {
		None
	}
}

/// Sorts `v` using merge sort, unless it is already in descending order.
///
/// This function doesn't modify `v` if it is already non-descending or strictly descending.
/// Otherwise, it sorts `v` into non-descending order.
///
/// Natural runs are identified by traversing `v` backwards, strictly descending runs are reversed
/// and short runs are extended by insertion. Each run is pushed onto a stack and adjacent runs are
/// merged until these two invariants are satisfied:
///
/// 1. for every `i` in `1..runs.len()`: `runs[i - 1].len > runs[i].len`
/// 2. for every `i` in `2..runs.len()`: `runs[i - 2].len > runs[i - 1].len + runs[i].len`
///
/// The invariants ensure that the total running time is *O*(*n* \* log(*n*)) worst-case.
///
/// # Safety
///
/// The argument `buf` is used as a temporary buffer and must be at least half as long as `v`.
unsafe fn merge_sort<T, F>(mut v: ArrayViewMut1<'_, T>, buf: *mut T, is_less: &F) -> MergesortResult
where
	F: Fn(&T, &T) -> bool,
{
	let len = v.len();

	let mut runs = Vec::new();
	let mut end = len;
	while end > 0 {
		// Find the next natural run, and reverse it if it's strictly descending.
		let mut start = end - 1;

		if start > 0 {
			start -= 1;

			let w = v.view();
			if is_less(&w[start + 1], &w[start]) {
				while start > 0 && is_less(&w[start], &w[start - 1]) {
					start -= 1;
				}

				// If this descending run covers the whole slice, return immediately.
				if start == 0 && end == len {
					return MergesortResult::Descending;
				}
				reverse(v.slice_mut(s![start..end]));
			} else {
				while start > 0 && !is_less(&w[start], &w[start - 1]) {
					start -= 1;
				}

				// If this non-descending run covers the whole slice, return immediately.
				if end - start == len {
					return MergesortResult::NonDescending;
				}
			}
		}

		// Insert some more elements into the run if it's too short.
		while start > 0 && end - start < MIN_RUN {
			start -= 1;
			insert_head(v.slice_mut(s![start..end]), is_less);
		}

		runs.push(Run {
			start,
			len: end - start,
		});
		end = start;

		// Merge some pairs of adjacent runs to satisfy the invariants.
		while let Some(r) = collapse(&runs) {
			let left = runs[r + 1];
			let right = runs[r];
			// SAFETY: Both runs are non-empty and the shorter one is at most half of `v`.
			unsafe {
				merge(
					v.slice_mut(s![left.start..right.start + right.len]),
					left.len,
					buf,
					is_less,
				);
			}
			runs[r] = Run {
				start: left.start,
				len: left.len + right.len,
			};
			runs.remove(r + 1);
		}
	}

	// Finally, exactly one run must remain in the stack.
	debug_assert!(runs.len() == 1 && runs[0].start == 0 && runs[0].len == len);

	MergesortResult::Sorted
}

#[cfg(test)]
mod test {
	use super::{MergesortResult, insertion_sort, merge_sort, reverse, scratch, sort_sequential};
	use crate::error::Error;
	use core::cmp::Ordering;
	use ndarray::{Array1, arr1};
	use quickcheck_macros::quickcheck;

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

	#[quickcheck]
	fn insertion_sorted(xs: Vec<u32>) {
		let mut array = Array1::from_vec(xs);
		insertion_sort(array.view_mut(), &u32::lt);
		for i in 1..array.len() {
			assert!(array[i - 1] <= array[i]);
		}
	}

	#[quickcheck]
	fn stably_sorted(xs: Vec<(u8, u32)>) {
		// Few distinct values produce many ties and runs.
		let xs = xs
			.into_iter()
			.map(|(lo, hi)| lo as u32 % 8 + hi % 3 * 8)
			.enumerate()
			.map(Item::from)
			.collect::<Vec<Item>>();
		let mut sorted = xs.clone();
		sorted.sort();
		let mut array = Array1::from_vec(xs);
		sort_sequential(array.view_mut(), &Item::lt).unwrap();
		for (a, s) in array.iter().zip(&sorted) {
			assert_eq!(a.index, s.index);
			assert_eq!(a.value, s.value);
		}
	}

	#[test]
	fn natural_runs() {
		let mut buf = scratch::<u32>(50).unwrap();

		let mut ascending = Array1::from_iter(0..100u32);
		let res = unsafe { merge_sort(ascending.view_mut(), buf.as_mut_ptr(), &u32::lt) };
		assert_eq!(res, MergesortResult::NonDescending);

		let mut descending = Array1::from_iter((0..100u32).rev());
		let res = unsafe { merge_sort(descending.view_mut(), buf.as_mut_ptr(), &u32::lt) };
		assert_eq!(res, MergesortResult::Descending);
		assert_eq!(descending[0], 99);

		let mut zigzag = Array1::from_iter((0..100u32).map(|x| x % 7));
		let res = unsafe { merge_sort(zigzag.view_mut(), buf.as_mut_ptr(), &u32::lt) };
		assert_eq!(res, MergesortResult::Sorted);
		assert!(zigzag.windows(2).into_iter().all(|w| w[0] <= w[1]));
	}

	#[test]
	fn descending_is_reversed() {
		let mut v = Array1::from_iter((0..64i64).rev());
		sort_sequential(v.view_mut(), &i64::lt).unwrap();
		assert_eq!(v, Array1::from_iter(0..64i64));
	}

	#[test]
	fn exhausted() {
		assert_eq!(
			scratch::<u64>(usize::MAX).unwrap_err(),
			Error::ResourceExhausted { len: usize::MAX }
		);
		assert!(scratch::<u64>(16).unwrap().capacity() >= 16);
	}

	#[test]
	fn reversed() {
		let mut v = arr1(&[1, 2, 3, 4, 5]);
		reverse(v.view_mut());
		assert_eq!(v, arr1(&[5, 4, 3, 2, 1]));
		let mut v = arr1(&[1, 2, 3, 4]);
		reverse(v.view_mut());
		assert_eq!(v, arr1(&[4, 3, 2, 1]));
	}

	#[test]
	fn non_contiguous() {
		let mut v = Array1::from_iter((0..200u32).map(|x| x * 7919 % 211));
		let mut column = v.slice_mut(ndarray::s![..;2]);
		sort_sequential(column.view_mut(), &u32::lt).unwrap();
		assert!(column.windows(2).into_iter().all(|w| w[0] <= w[1]));
	}
}
