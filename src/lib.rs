//! # handtree
//!
//! A thread-safe, unbalanced binary search tree with fine-grained locking.
//!
//! ## Overview
//!
//! [`ConcurrentTree`] maps ordered keys to values and can be shared between
//! threads behind a plain reference or an `Arc`. Instead of one global lock,
//! every node carries its own mutex and operations walk the tree
//! hand-over-hand: the next node is locked before the current one is
//! released. Threads working in unrelated subtrees therefore do not block
//! each other.
//!
//! - **Single-key operations**: `add`, `lookup`, `delete` and their variants
//! - **Traversals**: depth-first, breadth-first and in-order visitors
//! - **Diagnostics**: `verify` checks the ordering invariant and node count
//!
//! The tree is never rebalanced. Sorted input produces a chain, which costs
//! lookup speed but keeps every structural change local to a parent and its
//! children, so the locking stays simple. Deletion, traversal and teardown
//! are iterative and remain safe on such degenerate trees.
//!
//! ## Feature Flags
//!
//! - `serde`: `Serialize`/`Deserialize` as an ordered map
//! - `rayon`: parallel bulk insertion via `ParallelExtend`
//! - `full`: Enable all features
//!
//! ## Example
//!
//! ```rust
//! use handtree::prelude::*;
//!
//! let tree = ConcurrentTree::new();
//! tree.add(50, "fifty");
//! tree.add(30, "thirty");
//! tree.add(70, "seventy");
//!
//! assert_eq!(tree.lookup(&30), Some("thirty"));
//! assert_eq!(tree.try_add(30, "again"), Err(TreeError::DuplicateKey(30)));
//! assert!(tree.delete(&50));
//! assert_eq!(tree.keys(), vec![30, 70]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use handtree::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::TreeError;
    pub use crate::tree::ConcurrentTree;
}

mod error;
mod node;
mod traversal;
mod tree;

pub use error::TreeError;
pub use tree::ConcurrentTree;
