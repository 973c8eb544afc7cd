//! Errors reported by the sort engine.

use core::convert::Infallible;
use thiserror::Error;

/// Failure of a parallel sort.
///
/// `E` is the error type of a fallible comparator and defaults to [`Infallible`] for comparators
/// that cannot fail.
///
/// After any error, the contents of the sorted array are unspecified but remain a permutation of
/// the input.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E = Infallible> {
	/// The comparator was observed to violate a total order (best-effort detection).
	#[error("comparator does not induce a consistent total order")]
	InvalidComparator,
	/// Scratch memory for `len` elements could not be reserved.
	#[error("cannot reserve scratch memory for {len} elements")]
	ResourceExhausted {
		/// Number of elements the failed reservation asked for.
		len: usize,
	},
	/// The comparator itself failed, its error is passed through unchanged.
	#[error("comparator failed: {0}")]
	Comparator(E),
}

impl Error {
	/// Lifts an engine error into the error type of a fallible comparator.
	pub(crate) fn widen<E>(self) -> Error<E> {
		match self {
			Error::InvalidComparator => Error::InvalidComparator,
			Error::ResourceExhausted { len } => Error::ResourceExhausted { len },
			Error::Comparator(never) => match never {},
		}
	}
}
