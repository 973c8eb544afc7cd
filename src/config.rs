//! Tuning knobs and the worker pool of a parallel sort.

use crate::pool::{GlobalPool, WorkerPool};
use log::warn;

/// Default partition length at or below which partitions are sorted sequentially.
pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 10_000;
/// Default combined length below which two sorted partitions are merged sequentially.
///
/// Merging is faster than merge sorting, so merging needs a bit coarser granularity in order to
/// hide the overhead of task scheduling.
pub const DEFAULT_MERGE_THRESHOLD: usize = 5_000;

/// Configuration of a parallel sort.
///
/// # Examples
///
/// ```
/// use ndarray_par_sort::{InlinePool, ParSort1Ext, SortConfig, ndarray::arr1};
///
/// let config = SortConfig::new()
/// 	.with_sequential_threshold(2)
/// 	.with_max_parallelism(4)
/// 	.with_pool(InlinePool);
///
/// let mut v = arr1(&[5, 4, 1, 3, 2]);
/// v.par_sort_with(|a, b| a.cmp(b), &config)?;
/// assert_eq!(v, arr1(&[1, 2, 3, 4, 5]));
/// # Ok::<(), ndarray_par_sort::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig<P = GlobalPool> {
	sequential_threshold: usize,
	merge_threshold: usize,
	max_parallelism: Option<usize>,
	verify: bool,
	pool: P,
}

impl SortConfig {
	/// Default configuration sorting on the global [`rayon`] pool.
	#[must_use]
	pub fn new() -> Self {
		Self {
			sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
			merge_threshold: DEFAULT_MERGE_THRESHOLD,
			max_parallelism: None,
			verify: true,
			pool: GlobalPool,
		}
	}
}

impl Default for SortConfig {
	fn default() -> Self {
		Self::new()
	}
}

impl<P: WorkerPool> SortConfig<P> {
	/// Sets the partition length at or below which partitions are sorted sequentially.
	///
	/// Zero is treated as one.
	#[must_use]
	pub fn with_sequential_threshold(mut self, sequential_threshold: usize) -> Self {
		self.sequential_threshold = sequential_threshold;
		self
	}
	/// Sets the combined length of two partitions below which they are merged sequentially.
	///
	/// Values below three are treated as three, a pair of single elements cannot be split any
	/// further.
	#[must_use]
	pub fn with_merge_threshold(mut self, merge_threshold: usize) -> Self {
		self.merge_threshold = merge_threshold;
		self
	}
	/// Bounds the number of concurrently live sort and merge tasks, including the calling one.
	///
	/// Defaults to the [parallelism](WorkerPool::parallelism) of the pool. Zero is treated as one,
	/// which sorts entirely on the calling worker.
	#[must_use]
	pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
		self.max_parallelism = Some(max_parallelism);
		self
	}
	/// Whether to check the result for comparator inconsistencies, enabled by default.
	///
	/// The check costs *O*(*n*) comparisons, run in parallel.
	#[must_use]
	pub fn with_verify(mut self, verify: bool) -> Self {
		self.verify = verify;
		self
	}
	/// Replaces the worker pool, keeping all other settings.
	#[must_use]
	pub fn with_pool<Q: WorkerPool>(self, pool: Q) -> SortConfig<Q> {
		SortConfig {
			sequential_threshold: self.sequential_threshold,
			merge_threshold: self.merge_threshold,
			max_parallelism: self.max_parallelism,
			verify: self.verify,
			pool,
		}
	}

	/// Partition length at or below which partitions are sorted sequentially, at least one.
	#[inline]
	pub fn sequential_threshold(&self) -> usize {
		self.sequential_threshold.max(1)
	}
	/// Combined length of two partitions below which they are merged sequentially, at least three.
	#[inline]
	pub fn merge_threshold(&self) -> usize {
		self.merge_threshold.max(3)
	}
	/// Whether the result is checked for comparator inconsistencies.
	#[inline]
	pub fn verify(&self) -> bool {
		self.verify
	}
	/// Worker pool tasks are submitted to.
	#[inline]
	pub fn pool(&self) -> &P {
		&self.pool
	}
	/// Whether the pool has any workers to submit tasks to.
	#[inline]
	pub fn is_pool_usable(&self) -> bool {
		self.pool.parallelism() > 0
	}
	/// Effective bound of concurrently live tasks, at least one.
	///
	/// This is one whenever the pool [is unusable](Self::is_pool_usable).
	pub fn max_parallelism(&self) -> usize {
		let available = self.pool.parallelism();
		if available == 0 {
			warn!("worker pool reports no workers, sorting on the calling thread");
			return 1;
		}
		self.max_parallelism.unwrap_or(available).max(1)
	}
}
