//! Individually lockable tree nodes.
//!
//! Every node lives behind its own [`parking_lot::Mutex`] inside an [`Arc`].
//! The parent's link (or the tree's root slot) is the only long-lived strong
//! reference to a node; walkers clone the `Arc` only while holding the
//! parent's lock, which is what makes hand-over-hand locking sound: a node
//! that has been unlinked can no longer be reached by anybody.
//!
//! Locks are taken with [`Node::lock`], which returns an owned guard that keeps
//! the node alive on its own. That lets a walker acquire a child's guard and
//! then drop the parent's guard without borrowing one from the other.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use smallvec::SmallVec;

/// Inline capacity of the teardown stack before it spills to the heap.
const TEARDOWN_INLINE: usize = 32;

/// A node shared between its parent link and any in-flight walker.
pub(crate) type SharedNode<K, V> = Arc<Mutex<Node<K, V>>>;

/// An owning edge to a child, or the tree's root slot.
pub(crate) type Link<K, V> = Option<SharedNode<K, V>>;

/// An owned lock on a single node.
///
/// Dropping the guard unlocks the node, so release happens on every exit
/// path, including early returns and unwinding.
pub(crate) type NodeGuard<K, V> = ArcMutexGuard<RawMutex, Node<K, V>>;

/// Which child link of a node a key belongs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Side {
    /// Maps the result of `key.cmp(&node.key)` to the direction of descent.
    ///
    /// Returns `None` when the key matches the node itself.
    pub(crate) const fn toward(ordering: Ordering) -> Option<Self> {
        match ordering {
            Ordering::Less => Some(Self::Left),
            Ordering::Greater => Some(Self::Right),
            Ordering::Equal => None,
        }
    }
}

/// One key/value slot of the tree together with its child links.
///
/// Fields may only be read or written while the node's mutex is held.
pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) left: Link<K, V>,
    pub(crate) right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    /// Allocates an unlocked node with no children.
    pub(crate) fn create(key: K, value: V) -> SharedNode<K, V> {
        Arc::new(Mutex::new(Self {
            key,
            value,
            left: None,
            right: None,
        }))
    }

    /// Blocks until the node's lock is acquired.
    #[inline]
    pub(crate) fn lock(shared: &SharedNode<K, V>) -> NodeGuard<K, V> {
        shared.lock_arc()
    }

    #[inline]
    pub(crate) const fn child(&self, side: Side) -> Option<&SharedNode<K, V>> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    #[inline]
    pub(crate) const fn child_mut(&mut self, side: Side) -> &mut Link<K, V> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub(crate) const fn has_two_children(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }
}

impl<K, V> Drop for Node<K, V> {
    /// Releases the owned subtree with an explicit stack.
    ///
    /// Unbalanced trees can degenerate into a chain as long as the number of
    /// entries, so the default recursive drop could exhaust the call stack.
    fn drop(&mut self) {
        let mut pending: SmallVec<[SharedNode<K, V>; TEARDOWN_INLINE]> =
            self.left.take().into_iter().chain(self.right.take()).collect();

        while let Some(shared) = pending.pop() {
            // A node still referenced by a traversal snapshot is released by
            // whoever drops the last `Arc`.
            if let Ok(mutex) = Arc::try_unwrap(shared) {
                let mut node = mutex.into_inner();
                pending.extend(node.left.take());
                pending.extend(node.right.take());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Ordering::Less, Some(Side::Left))]
    #[case(Ordering::Greater, Some(Side::Right))]
    #[case(Ordering::Equal, None)]
    fn test_side_toward(#[case] ordering: Ordering, #[case] expected: Option<Side>) {
        assert_eq!(Side::toward(ordering), expected);
    }

    #[rstest]
    fn test_create_has_no_children() {
        let shared = Node::create(7, "seven");
        let node = Node::lock(&shared);
        assert_eq!(node.key, 7);
        assert_eq!(node.value, "seven");
        assert!(node.left.is_none());
        assert!(node.right.is_none());
        assert!(!node.has_two_children());
    }

    #[rstest]
    fn test_guard_releases_on_drop() {
        let shared = Node::create(1, ());
        let guard = Node::lock(&shared);
        assert!(shared.try_lock().is_none());
        drop(guard);
        assert!(shared.try_lock().is_some());
    }

    #[rstest]
    fn test_guard_keeps_node_alive() {
        let shared = Node::create(1, String::from("kept"));
        let guard = Node::lock(&shared);
        drop(shared);
        assert_eq!(guard.value, "kept");
    }

    #[rstest]
    fn test_child_mut_links_by_side() {
        let shared = Node::create(10, ());
        let mut node = Node::lock(&shared);
        *node.child_mut(Side::Left) = Some(Node::create(5, ()));
        *node.child_mut(Side::Right) = Some(Node::create(15, ()));

        assert!(node.has_two_children());
        let left = node.child(Side::Left).map(|child| child.lock().key);
        let right = node.child(Side::Right).map(|child| child.lock().key);
        assert_eq!(left, Some(5));
        assert_eq!(right, Some(15));
    }

    #[rstest]
    fn test_drop_of_long_chain_does_not_recurse() {
        let head = Node::create(0_u32, ());
        let mut tail = Arc::clone(&head);
        for key in 1..200_000 {
            let next = Node::create(key, ());
            Node::lock(&tail).right = Some(Arc::clone(&next));
            tail = next;
        }
        drop(tail);
        drop(head);
    }

    #[rstest]
    fn test_drop_leaves_shared_child_alive() {
        let parent = Node::create(2, String::new());
        let child = Node::create(1, String::from("child"));
        Node::lock(&parent).left = Some(Arc::clone(&child));

        drop(parent);
        assert_eq!(Arc::strong_count(&child), 1);
        assert_eq!(child.lock().value, "child");
    }
}
