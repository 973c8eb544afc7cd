//! Stable parallel merge sort for (non-contiguous) 1-dimensional views into *n*-dimensional
//! arrays of [`ndarray`], with explicit worker pools and tunable thresholds.
//!
//! # Example
//!
//! ```
//! use ndarray_par_sort::{ParSort1Ext, ndarray::aview_mut1};
//!
//! let mut data = vec![50, 20, 40, 10, 30];
//!
//! aview_mut1(&mut data).par_sort()?;
//! assert_eq!(data, [10, 20, 30, 40, 50]);
//! # Ok::<(), ndarray_par_sort::Error>(())
//! ```
//!
//! Non-contiguous (sub)views are sorted in place as well:
//!
//! ```
//! use ndarray_par_sort::{ParSort1Ext, ndarray::arr2};
//!
//! let mut v = arr2(&[[-5, 4, 1],
//!                    [ 8, 3, 2],
//!                    [38, 9, 0]]);
//!
//! v.column_mut(2).par_sort()?;
//! assert_eq!(v, arr2(&[[-5, 4, 0],
//!                      [ 8, 3, 1],
//!                      [38, 9, 2]]));
//! # Ok::<(), ndarray_par_sort::Error>(())
//! ```
//!
//! # Current Implementation
//!
//! Partitions longer than the [sequential threshold](SortConfig::with_sequential_threshold) are
//! split at their midpoint and both halves are sorted as a pair of tasks forked on a
//! [`WorkerPool`]. Once both halves are sorted, they are moved into a scratch buffer and merged
//! back. Large merges are themselves split by a pivot (the middle element of the longer half and
//! its binary-searched counterpart in the shorter one) and merged in parallel. Partitions at or
//! below the threshold are sorted sequentially by insertion sort or by a run-adaptive merge sort
//! inspired by [timsort](https://en.wikipedia.org/wiki/Timsort).
//!
//! The number of concurrently live tasks is bounded by
//! [`max_parallelism`](SortConfig::with_max_parallelism), excess tasks run inline on the forking
//! worker. Every step prefers the left element on ties, hence the sort is stable.
//!
//! | Resource | Complexity       |
//! |----------|------------------|
//! | Time     | *O*(*n* log *n*) |
//! | Span     | *O*(log³ *n*)    |
//! | Space    | *O*(*n*)         |
//!
//! # Errors
//!
//! Sorting fails with [`Error::ResourceExhausted`] if scratch memory cannot be reserved, with
//! [`Error::InvalidComparator`] if the comparator was observed to violate a total order, and with
//! [`Error::Comparator`] passing through the error of a fallible comparator. Panics of the
//! comparator propagate to the caller. In any of these cases the order of the elements is
//! unspecified but no element is lost or duplicated.
//!
//! # Logging
//!
//! Successful sorts are silent. Failures and fallbacks are reported via the [`log`] facade at
//! `debug` and `warn` level.

#![deny(
	missing_docs,
	rustdoc::broken_intra_doc_links,
	rustdoc::missing_crate_level_docs
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod comparator;
mod config;
mod error;
mod merge_sort;
mod par;
mod pool;

pub use crate::{
	config::{DEFAULT_MERGE_THRESHOLD, DEFAULT_SEQUENTIAL_THRESHOLD, SortConfig},
	error::Error,
	pool::{GlobalPool, InlinePool, WorkerPool},
};
pub use ndarray;
pub use rayon;

use crate::par::{
	keys::par_cached_keys,
	merge_sort::{par_merge_sort, try_par_merge_sort},
};
use core::cmp::Ordering::{self, Less};
use ndarray::{Array1, ArrayBase, Data, DataMut, Ix1};
use std::sync::atomic::AtomicBool;

/// Extension trait for 1-dimensional [`ArrayBase<S, Ix1>`](`ArrayBase`) array or (sub)view with
/// arbitrary memory layout (e.g., non-contiguous) providing stable parallel sorting.
///
/// All methods sort in place and are stable (i.e., do not reorder equal elements) and
/// *O*(*n* log *n*) worst-case. Arrays of fewer than two elements return immediately without
/// submitting any task.
pub trait ParSort1Ext<A, S>
where
	S: Data<Elem = A>,
{
	/// Sorts the array in parallel with the [default configuration](SortConfig::new).
	///
	/// # Examples
	///
	/// ```
	/// use ndarray_par_sort::{ParSort1Ext, ndarray::arr1};
	///
	/// let mut v = arr1(&[-5, 4, 1, -3, 2]);
	///
	/// v.par_sort()?;
	/// assert!(v == arr1(&[-5, -3, 1, 2, 4]));
	/// # Ok::<(), ndarray_par_sort::Error>(())
	/// ```
	fn par_sort(&mut self) -> Result<(), Error>
	where
		A: Ord + Send,
		S: DataMut;
	/// Sorts the array in parallel with a comparator function.
	///
	/// The comparator function must define a total ordering for the elements in the array. If
	/// the ordering is not total, [`Error::InvalidComparator`] may be returned and the order of
	/// the elements is unspecified. An order is a total order if it is (for all `a`, `b` and `c`):
	///
	/// * total and antisymmetric: exactly one of `a < b`, `a == b` or `a > b` is true, and
	/// * transitive, `a < b` and `b < c` implies `a < c`. The same must hold for both `==` and `>`.
	///
	/// For example, while [`f64`] doesn't implement [`Ord`] because `NaN != NaN`, we can use
	/// `total_cmp` as our sort function.
	///
	/// ```
	/// use ndarray_par_sort::{ParSort1Ext, ndarray::arr1};
	///
	/// let mut floats = arr1(&[5f64, 4.0, 1.0, 3.0, 2.0]);
	/// floats.par_sort_by(f64::total_cmp)?;
	/// assert_eq!(floats, arr1(&[1.0, 2.0, 3.0, 4.0, 5.0]));
	///
	/// // reverse sorting
	/// floats.par_sort_by(|a, b| b.total_cmp(a))?;
	/// assert_eq!(floats, arr1(&[5.0, 4.0, 3.0, 2.0, 1.0]));
	/// # Ok::<(), ndarray_par_sort::Error>(())
	/// ```
	fn par_sort_by<F>(&mut self, compare: F) -> Result<(), Error>
	where
		A: Send,
		F: Fn(&A, &A) -> Ordering + Sync,
		S: DataMut;
	/// Sorts the array in parallel with a key extraction function.
	///
	/// The key function is called twice per comparison. For expensive key functions,
	/// [`par_sort_by_cached_key`](ParSort1Ext::par_sort_by_cached_key) is likely to be faster.
	///
	/// ```
	/// use ndarray_par_sort::{ParSort1Ext, ndarray::arr1};
	///
	/// let mut v = arr1(&[-5i32, 4, 1, -3, 2]);
	///
	/// v.par_sort_by_key(|k| k.abs())?;
	/// assert!(v == arr1(&[1, 2, -3, 4, -5]));
	/// # Ok::<(), ndarray_par_sort::Error>(())
	/// ```
	fn par_sort_by_key<K, F>(&mut self, f: F) -> Result<(), Error>
	where
		A: Send,
		K: Ord,
		F: Fn(&A) -> K + Sync,
		S: DataMut;
	/// Sorts the array in parallel with a key extraction function, calling it only once per
	/// element.
	///
	/// Keys are computed in parallel, then `(key, index)` pairs are sorted and the resulting
	/// permutation is applied to the array in place. The sort is stable since indices are unique.
	/// Both run on the global [`rayon`] pool, see
	/// [`par_sort_by_cached_key_with`](ParSort1Ext::par_sort_by_cached_key_with) for other pools.
	///
	/// ```
	/// use ndarray_par_sort::{ParSort1Ext, ndarray::arr1};
	///
	/// let mut v = arr1(&[-5i32, 4, 32, -3, 2]);
	///
	/// v.par_sort_by_cached_key(|k| k.to_string())?;
	/// assert!(v == arr1(&[-3, -5, 2, 32, 4]));
	/// # Ok::<(), ndarray_par_sort::Error>(())
	/// ```
	fn par_sort_by_cached_key<K, F>(&mut self, f: F) -> Result<(), Error>
	where
		A: Send + Sync,
		F: Fn(&A) -> K + Sync,
		K: Ord + Send,
		S: DataMut;
	/// Sorts the array in parallel with a key extraction function, calling it only once per
	/// element, and explicit configuration.
	///
	/// Keys are computed on the configured pool within the same parallelism bound as sorting.
	///
	/// ```
	/// use ndarray_par_sort::{InlinePool, ParSort1Ext, SortConfig, ndarray::arr1};
	///
	/// let config = SortConfig::new()
	/// 	.with_sequential_threshold(2)
	/// 	.with_pool(InlinePool);
	///
	/// let mut v = arr1(&["ccc", "a", "bb", "dddd"]);
	/// v.par_sort_by_cached_key_with(|s| s.len(), &config)?;
	/// assert_eq!(v, arr1(&["a", "bb", "ccc", "dddd"]));
	/// # Ok::<(), ndarray_par_sort::Error>(())
	/// ```
	fn par_sort_by_cached_key_with<K, F, P>(
		&mut self,
		f: F,
		config: &SortConfig<P>,
	) -> Result<(), Error>
	where
		A: Send + Sync,
		F: Fn(&A) -> K + Sync,
		K: Ord + Send,
		P: WorkerPool,
		S: DataMut;
	/// Sorts the array in parallel with a comparator function and explicit configuration.
	///
	/// ```
	/// use ndarray_par_sort::{ParSort1Ext, SortConfig, ndarray::Array1};
	///
	/// let pool = ndarray_par_sort::rayon::ThreadPoolBuilder::new()
	/// 	.num_threads(2)
	/// 	.build()
	/// 	.unwrap();
	/// let config = SortConfig::new()
	/// 	.with_sequential_threshold(1_000)
	/// 	.with_pool(&pool);
	///
	/// let mut v = Array1::from_iter((0..100_000).rev());
	/// v.par_sort_with(|a, b| a.cmp(b), &config)?;
	/// assert_eq!(v, Array1::from_iter(0..100_000));
	/// # Ok::<(), ndarray_par_sort::Error>(())
	/// ```
	fn par_sort_with<F, P>(&mut self, compare: F, config: &SortConfig<P>) -> Result<(), Error>
	where
		A: Send,
		F: Fn(&A, &A) -> Ordering + Sync,
		P: WorkerPool,
		S: DataMut;
	/// Sorts the array in parallel with a fallible comparator function and explicit
	/// configuration.
	///
	/// The first error returned by `compare` stops the sort and is returned as
	/// [`Error::Comparator`]. The order of the elements is unspecified afterwards.
	///
	/// ```
	/// use ndarray_par_sort::{Error, ParSort1Ext, SortConfig, ndarray::arr1};
	///
	/// let compare = |a: &f64, b: &f64| a.partial_cmp(b).ok_or("NaN");
	///
	/// let mut v = arr1(&[3.0, 1.0, 2.0]);
	/// v.try_par_sort_with(compare, &SortConfig::new())?;
	/// assert_eq!(v, arr1(&[1.0, 2.0, 3.0]));
	///
	/// let mut v = arr1(&[3.0, f64::NAN, 2.0]);
	/// assert_eq!(v.try_par_sort_with(compare, &SortConfig::new()), Err(Error::Comparator("NaN")));
	/// # Ok::<(), Error<&str>>(())
	/// ```
	fn try_par_sort_with<E, F, P>(
		&mut self,
		compare: F,
		config: &SortConfig<P>,
	) -> Result<(), Error<E>>
	where
		A: Send,
		E: Send,
		F: Fn(&A, &A) -> Result<Ordering, E> + Sync,
		P: WorkerPool,
		S: DataMut;
}

impl<A, S> ParSort1Ext<A, S> for ArrayBase<S, Ix1>
where
	S: Data<Elem = A>,
{
	#[inline]
	fn par_sort(&mut self) -> Result<(), Error>
	where
		A: Ord + Send,
		S: DataMut,
	{
		let halted = AtomicBool::new(false);
		par_merge_sort(self.view_mut(), &A::lt, &SortConfig::new(), &halted)
	}
	#[inline]
	fn par_sort_by<F>(&mut self, compare: F) -> Result<(), Error>
	where
		A: Send,
		F: Fn(&A, &A) -> Ordering + Sync,
		S: DataMut,
	{
		self.par_sort_with(compare, &SortConfig::new())
	}
	#[inline]
	fn par_sort_by_key<K, F>(&mut self, f: F) -> Result<(), Error>
	where
		A: Send,
		K: Ord,
		F: Fn(&A) -> K + Sync,
		S: DataMut,
	{
		let halted = AtomicBool::new(false);
		let is_less = |a: &A, b: &A| f(a).lt(&f(b));
		par_merge_sort(self.view_mut(), &is_less, &SortConfig::new(), &halted)
	}
	#[inline]
	fn par_sort_by_cached_key<K, F>(&mut self, f: F) -> Result<(), Error>
	where
		A: Send + Sync,
		F: Fn(&A) -> K + Sync,
		K: Ord + Send,
		S: DataMut,
	{
		self.par_sort_by_cached_key_with(f, &SortConfig::new())
	}
	fn par_sort_by_cached_key_with<K, F, P>(
		&mut self,
		f: F,
		config: &SortConfig<P>,
	) -> Result<(), Error>
	where
		A: Send + Sync,
		F: Fn(&A) -> K + Sync,
		K: Ord + Send,
		P: WorkerPool,
		S: DataMut,
	{
		let len = self.len();
		if len < 2 {
			return Ok(());
		}

		let mut indices = Array1::from_vec(par_cached_keys(self.view(), &f, config));
		let halted = AtomicBool::new(false);
		let is_less = |a: &(K, usize), b: &(K, usize)| a < b;
		par_merge_sort(indices.view_mut(), &is_less, config, &halted)?;

		for i in 0..len {
			let mut index = indices[i].1;
			while index < i {
				index = indices[index].1;
			}
			indices[i].1 = index;
			self.swap(i, index);
		}
		Ok(())
	}
	#[inline]
	fn par_sort_with<F, P>(&mut self, compare: F, config: &SortConfig<P>) -> Result<(), Error>
	where
		A: Send,
		F: Fn(&A, &A) -> Ordering + Sync,
		P: WorkerPool,
		S: DataMut,
	{
		let halted = AtomicBool::new(false);
		let is_less = |a: &A, b: &A| compare(a, b) == Less;
		par_merge_sort(self.view_mut(), &is_less, config, &halted)
	}
	#[inline]
	fn try_par_sort_with<E, F, P>(
		&mut self,
		compare: F,
		config: &SortConfig<P>,
	) -> Result<(), Error<E>>
	where
		A: Send,
		E: Send,
		F: Fn(&A, &A) -> Result<Ordering, E> + Sync,
		P: WorkerPool,
		S: DataMut,
	{
		try_par_merge_sort(self.view_mut(), compare, config)
	}
}
