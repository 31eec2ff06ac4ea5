//! Whole-tree traversals.
//!
//! Traversals never lock more than one node at a time. Each node is locked
//! while its entry is handed to the visitor and its child links are cloned,
//! then released before the next node is visited. Under concurrent mutation
//! the result is therefore best-effort: it may mix states from before and
//! after a concurrent `add` or `delete`. On a quiescent tree every traversal
//! is exact.
//!
//! Visitors run while the visited node is locked and must not call back
//! into the same tree.
//!
//! All walks keep an explicit stack or queue instead of recursing, so deep
//! (degenerate) trees cannot overflow the call stack.

use std::collections::VecDeque;

use smallvec::SmallVec;

use crate::node::{Node, SharedNode};
use crate::tree::ConcurrentTree;

/// Inline capacity of traversal stacks, enough for a reasonably shaped tree
/// of a few billion entries.
const STACK_INLINE: usize = 32;

impl<K, V> ConcurrentTree<K, V> {
    /// Visits every entry in pre-order (node, left subtree, right subtree).
    ///
    /// The visitor receives the key, the value and the depth of the node,
    /// where the root has depth 0.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree: ConcurrentTree<_, _> = [(2, 'b'), (1, 'a'), (3, 'c')].into_iter().collect();
    /// let mut visited = Vec::new();
    /// tree.depth_first(|key, _, depth| visited.push((*key, depth)));
    /// assert_eq!(visited, vec![(2, 0), (1, 1), (3, 1)]);
    /// ```
    pub fn depth_first<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V, usize),
    {
        let mut pending: SmallVec<[(SharedNode<K, V>, usize); STACK_INLINE]> = self
            .root_snapshot()
            .map(|root| (root, 0))
            .into_iter()
            .collect();

        while let Some((shared, depth)) = pending.pop() {
            let node = shared.lock();
            visit(&node.key, &node.value, depth);
            pending.extend(node.right.clone().map(|right| (right, depth + 1)));
            pending.extend(node.left.clone().map(|left| (left, depth + 1)));
        }
    }

    /// Visits every entry level by level, left to right within a level.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree: ConcurrentTree<_, _> = [4, 2, 6, 1, 3].into_iter().map(|key| (key, ())).collect();
    /// let mut visited = Vec::new();
    /// tree.breadth_first(|key, ()| visited.push(*key));
    /// assert_eq!(visited, vec![4, 2, 6, 1, 3]);
    /// ```
    pub fn breadth_first<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V),
    {
        let mut queue: VecDeque<SharedNode<K, V>> = self.root_snapshot().into_iter().collect();

        while let Some(shared) = queue.pop_front() {
            let node = shared.lock();
            visit(&node.key, &node.value);
            queue.extend(node.left.clone());
            queue.extend(node.right.clone());
        }
    }

    /// Visits every entry in ascending key order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree: ConcurrentTree<_, _> = [(2, 'b'), (3, 'c'), (1, 'a')].into_iter().collect();
    /// let mut visited = String::new();
    /// tree.in_order(|_, value| visited.push(*value));
    /// assert_eq!(visited, "abc");
    /// ```
    pub fn in_order<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V),
    {
        let mut spine: SmallVec<[SharedNode<K, V>; STACK_INLINE]> = SmallVec::new();
        let mut cursor = self.root_snapshot();

        loop {
            while let Some(shared) = cursor {
                cursor = shared.lock().left.clone();
                spine.push(shared);
            }
            let Some(shared) = spine.pop() else {
                break;
            };
            let node = Node::lock(&shared);
            visit(&node.key, &node.value);
            cursor = node.right.clone();
        }
    }

    /// Returns the number of nodes on the longest root-to-leaf path.
    ///
    /// An empty tree has height 0; a tree built from sorted input has a
    /// height equal to its length.
    pub fn height(&self) -> usize {
        let mut height = 0;
        self.depth_first(|_, _, depth| height = height.max(depth + 1));
        height
    }
}

impl<K: Clone, V: Clone> ConcurrentTree<K, V> {
    /// Returns a snapshot of all entries in ascending key order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree: ConcurrentTree<_, _> = [(2, "b"), (1, "a")].into_iter().collect();
    /// assert_eq!(tree.entries(), vec![(1, "a"), (2, "b")]);
    /// ```
    pub fn entries(&self) -> Vec<(K, V)> {
        let mut entries = Vec::with_capacity(self.len());
        self.in_order(|key, value| entries.push((key.clone(), value.clone())));
        entries
    }
}

impl<K: Clone, V> ConcurrentTree<K, V> {
    /// Returns a snapshot of all keys in ascending order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        self.in_order(|key, _| keys.push(key.clone()));
        keys
    }
}
