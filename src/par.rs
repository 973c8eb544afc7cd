//! Parallel sorting on a [`WorkerPool`](crate::WorkerPool).

pub(crate) mod context;
pub(crate) mod keys;
pub(crate) mod merge_sort;
