//! Error types for tree operations.
//!
//! Missing and duplicate keys are ordinary outcomes rather than faults: the
//! plain operations ([`add`](crate::ConcurrentTree::add),
//! [`delete`](crate::ConcurrentTree::delete)) report them as `false`, while
//! the `try_` variants return a [`TreeError`] carrying the offending key.
//! [`verify`](crate::ConcurrentTree::verify) uses the remaining variants to
//! report a broken structural invariant.

use std::fmt;

/// Represents errors that can occur when operating on a
/// [`ConcurrentTree`](crate::ConcurrentTree).
///
/// # Examples
///
/// ```rust
/// use handtree::{ConcurrentTree, TreeError};
///
/// let tree = ConcurrentTree::new();
/// assert_eq!(tree.try_add(1, "one"), Ok(()));
/// assert_eq!(tree.try_add(1, "uno"), Err(TreeError::DuplicateKey(1)));
/// assert_eq!(
///     format!("{}", TreeError::<u32>::KeyNotFound(9)),
///     "key not found: 9"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError<K> {
    /// The key is already present; the tree was left unchanged.
    DuplicateKey(K),
    /// The key is not present; the tree was left unchanged.
    KeyNotFound(K),
    /// An in-order walk found a key that is not strictly greater than its
    /// predecessor.
    OrderViolation {
        /// The first out-of-order key.
        key: K,
    },
    /// The live-node counter disagrees with the number of reachable nodes.
    CountMismatch {
        /// The value of the counter.
        recorded: usize,
        /// The number of nodes a full walk reached.
        reachable: usize,
    },
}

impl<K: fmt::Debug> fmt::Display for TreeError<K> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey(key) => write!(formatter, "duplicate key: {key:?}"),
            Self::KeyNotFound(key) => write!(formatter, "key not found: {key:?}"),
            Self::OrderViolation { key } => {
                write!(formatter, "ordering invariant violated at key {key:?}")
            }
            Self::CountMismatch {
                recorded,
                reachable,
            } => write!(
                formatter,
                "node count mismatch: recorded {recorded}, reachable {reachable}"
            ),
        }
    }
}

impl<K: fmt::Debug> std::error::Error for TreeError<K> {}
