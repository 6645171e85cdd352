use thiserror::Error;

use crate::value::Key;

/// Errors raised synchronously by writes, batches and derived operators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	#[error("write rejected: listenable is read-only")]
	ReadOnlyViolation,

	#[error("write outside of a batch while strict mode is enabled")]
	StrictModeViolation,

	#[error("duplicate key `{0}`")]
	DuplicateKey(String),

	#[error("index {index} is out of bounds for length {len}")]
	IndexOutOfBounds { index: usize, len: usize },

	#[error("key `{key}` cannot address a {kind}")]
	InvalidKey { key: Key, kind: &'static str },

	#[error("expected a {expected}, found a {found}")]
	KindMismatch {
		expected: &'static str,
		found: &'static str,
	},

	#[error("a {0} cannot be made listenable")]
	NotAContainer(&'static str),

	#[error("reactions did not settle after {0} iterations")]
	ReactionLoop(usize),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
