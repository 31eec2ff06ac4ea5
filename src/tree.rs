//! The tree handle and its single-key operations.
//!
//! [`ConcurrentTree`] is an unbalanced binary search tree that can be shared
//! between threads (`&ConcurrentTree` is all any operation needs). There is
//! no global lock: every node carries its own mutex and operations walk the
//! tree hand-over-hand, locking a child before releasing its parent.
//!
//! # Locking Protocol
//!
//! - Lock order is always root slot, root, ..., leaf. No operation ever
//!   waits for a lock above one it already holds, so walks cannot deadlock.
//! - The root slot is a tree-level mutex around the root link. It guards the
//!   empty-to-non-empty transition and any replacement of the root node, and
//!   is released as soon as the root node itself is locked.
//! - `delete` keeps the parent and the target locked together, because
//!   splicing rewrites the parent's link.
//! - Removing a node with two children keeps the target locked while it
//!   descends to the in-order successor, then moves the successor's entry
//!   into the target. The target keeps its place in the tree but changes
//!   identity: node identity is not stable across such a deletion.
//!
//! # Examples
//!
//! ```rust
//! use handtree::ConcurrentTree;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let tree = Arc::new(ConcurrentTree::new());
//!
//! let handles: Vec<_> = (0..4_u32)
//!     .map(|worker| {
//!         let tree = Arc::clone(&tree);
//!         thread::spawn(move || {
//!             for key in (worker * 100)..(worker * 100 + 100) {
//!                 assert!(tree.add(key, key * 2));
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(tree.len(), 400);
//! assert_eq!(tree.lookup(&250), Some(500));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::error::TreeError;
use crate::node::{Link, Node, NodeGuard, SharedNode, Side};

/// The node a key belongs at, found by [`ConcurrentTree::find_closest`].
enum Closest<'a, K, V> {
    /// The tree is empty; the root slot is still locked.
    Empty(MutexGuard<'a, Link<K, V>>),
    /// The node holding the key, or the would-be parent of a node holding it.
    Node(NodeGuard<K, V>),
}

/// The owner of the link that points at the node being deleted.
enum Parent<'a, K, V> {
    Root(MutexGuard<'a, Link<K, V>>),
    Node(NodeGuard<K, V>, Side),
}

impl<K, V> Parent<'_, K, V> {
    fn link_mut(&mut self) -> &mut Link<K, V> {
        match self {
            Self::Root(slot) => &mut **slot,
            Self::Node(guard, side) => guard.child_mut(*side),
        }
    }
}

// =============================================================================
// ConcurrentTree Definition
// =============================================================================

/// A thread-safe, unbalanced binary search tree with per-node locking.
///
/// Keys are unique. Operations on disjoint parts of the tree proceed in
/// parallel; operations whose paths overlap are serialized by the node locks
/// they share.
///
/// # Time Complexity
///
/// | Operation   | Complexity |
/// |-------------|------------|
/// | `new`       | O(1)       |
/// | `add`       | O(height)  |
/// | `lookup`    | O(height)  |
/// | `delete`    | O(height)  |
/// | `len`       | O(1)       |
///
/// The tree is never rebalanced, so the height is O(N) for sorted input.
///
/// # Examples
///
/// ```rust
/// use handtree::ConcurrentTree;
///
/// let tree = ConcurrentTree::new();
/// assert!(tree.add(2, "two"));
/// assert!(tree.add(1, "one"));
/// assert!(!tree.add(2, "deux"));
///
/// assert_eq!(tree.lookup(&2), Some("two"));
/// assert!(tree.delete(&2));
/// assert_eq!(tree.lookup(&2), None);
/// assert_eq!(tree.len(), 1);
/// ```
pub struct ConcurrentTree<K, V> {
    /// Link to the root node, behind the tree-level lock.
    root: Mutex<Link<K, V>>,
    /// Number of reachable nodes.
    count: AtomicUsize,
}

impl<K, V> ConcurrentTree<K, V> {
    /// Creates an empty tree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree: ConcurrentTree<u32, String> = ConcurrentTree::new();
    /// assert!(tree.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Mutex::new(None),
            count: AtomicUsize::new(0),
        }
    }

    /// Creates an empty tree. Alias of [`ConcurrentTree::new`].
    #[must_use]
    pub fn initialize() -> Self {
        Self::new()
    }

    /// Returns the number of entries.
    ///
    /// While other threads are mutating the tree this is a moment-in-time
    /// reading; it is exact whenever the tree is quiescent.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns `true` if the tree contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones the root link so a traversal can start without holding the
    /// root slot.
    pub(crate) fn root_snapshot(&self) -> Link<K, V> {
        self.root.lock().clone()
    }
}

impl<K: Ord, V> ConcurrentTree<K, V> {
    /// Walks hand-over-hand to the node `key` belongs at and returns it locked.
    fn find_closest(&self, key: &K) -> Closest<'_, K, V> {
        let slot = self.root.lock();
        let mut current = match slot.as_ref() {
            Some(root) => Node::lock(root),
            None => return Closest::Empty(slot),
        };
        drop(slot);

        loop {
            let next = match Side::toward(key.cmp(&current.key))
                .and_then(|side| current.child(side))
            {
                Some(child) => Node::lock(child),
                None => return Closest::Node(current),
            };
            current = next;
        }
    }

    /// Inserts `key` with `value` unless the key is already present.
    ///
    /// Returns `true` if a node was created. An existing entry is never
    /// overwritten.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree = ConcurrentTree::new();
    /// assert!(tree.add(1, "one"));
    /// assert!(!tree.add(1, "uno"));
    /// assert_eq!(tree.lookup(&1), Some("one"));
    /// ```
    pub fn add(&self, key: K, value: V) -> bool {
        self.try_add(key, value).is_ok()
    }

    /// Inserts `key` with `value`, reporting a duplicate as an error.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateKey`] with the rejected key if the tree
    /// already holds it.
    pub fn try_add(&self, key: K, value: V) -> Result<(), TreeError<K>> {
        match self.find_closest(&key) {
            Closest::Empty(mut slot) => {
                *slot = Some(Node::create(key, value));
                self.count.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("installed root node");
                Ok(())
            }
            Closest::Node(mut leaf) => {
                let Some(side) = Side::toward(key.cmp(&leaf.key)) else {
                    return Err(TreeError::DuplicateKey(key));
                };
                let link = leaf.child_mut(side);
                assert!(link.is_none(), "closest node has a child on {side:?}");
                *link = Some(Node::create(key, value));
                self.count.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(?side, "attached node");
                Ok(())
            }
        }
    }

    /// Applies `read` to the value stored under `key`, if any.
    ///
    /// `read` runs while the node is locked. It must not call back into the
    /// same tree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree = ConcurrentTree::new();
    /// tree.add(1, String::from("one"));
    /// assert_eq!(tree.lookup_with(&1, String::len), Some(3));
    /// assert_eq!(tree.lookup_with(&2, String::len), None);
    /// ```
    pub fn lookup_with<R, F>(&self, key: &K, read: F) -> Option<R>
    where
        F: FnOnce(&V) -> R,
    {
        let slot = self.root.lock();
        let mut current = Node::lock(slot.as_ref()?);
        drop(slot);

        loop {
            let next = match Side::toward(key.cmp(&current.key)) {
                None => return Some(read(&current.value)),
                Some(side) => Node::lock(current.child(side)?),
            };
            current = next;
        }
    }

    /// Returns `true` if the tree contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.lookup_with(key, |_| ()).is_some()
    }

    /// Removes `key` from the tree.
    ///
    /// Returns `true` if an entry was removed. Deleting an absent key is a
    /// no-op.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree: ConcurrentTree<_, _> = [(2, "b"), (1, "a"), (3, "c")].into_iter().collect();
    /// assert!(tree.delete(&2));
    /// assert!(!tree.delete(&2));
    /// assert_eq!(tree.keys(), vec![1, 3]);
    /// ```
    pub fn delete(&self, key: &K) -> bool {
        self.detach(key).is_some()
    }

    /// Removes `key` from the tree, reporting an absent key as an error.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::KeyNotFound`] if the tree does not hold `key`.
    pub fn try_delete(&self, key: &K) -> Result<(), TreeError<K>>
    where
        K: Clone,
    {
        if self.delete(key) {
            Ok(())
        } else {
            Err(TreeError::KeyNotFound(key.clone()))
        }
    }

    /// Unlinks the entry for `key` and returns the locked node that carries
    /// it out of the tree.
    ///
    /// For a node with two children the returned node is the former in-order
    /// successor, which now holds the removed key and value.
    fn detach(&self, key: &K) -> Option<NodeGuard<K, V>> {
        let slot = self.root.lock();
        let mut current = Node::lock(slot.as_ref()?);
        let mut parent = Parent::Root(slot);

        loop {
            let Some(side) = Side::toward(key.cmp(&current.key)) else {
                break;
            };
            let next = Node::lock(current.child(side)?);
            parent = Parent::Node(std::mem::replace(&mut current, next), side);
        }

        let detached = if current.has_two_children() {
            let Some(right) = current.right.clone() else {
                unreachable!("node with two children has no right child");
            };
            drop(parent);
            Self::detach_successor(current, &right)
        } else {
            let orphan = current.left.take().or_else(|| current.right.take());
            tracing::trace!(spliced_child = orphan.is_some(), "unlinked node");
            *parent.link_mut() = orphan;
            current
        };

        self.count.fetch_sub(1, Ordering::Relaxed);
        Some(detached)
    }

    /// Replaces the entry of `target` with its in-order successor's entry and
    /// unlinks the successor node.
    ///
    /// `target` stays locked throughout. The successor is the leftmost node
    /// of the right subtree, reached hand-over-hand from `right`.
    fn detach_successor(
        mut target: NodeGuard<K, V>,
        right: &SharedNode<K, V>,
    ) -> NodeGuard<K, V> {
        let mut successor_parent: Option<NodeGuard<K, V>> = None;
        let mut successor = Node::lock(right);

        loop {
            let next = match successor.left.as_ref() {
                Some(left) => Node::lock(left),
                None => break,
            };
            successor_parent = Some(std::mem::replace(&mut successor, next));
        }

        let orphan = successor.right.take();
        match successor_parent.as_mut() {
            Some(parent) => parent.left = orphan,
            None => target.right = orphan,
        }
        drop(successor_parent);

        std::mem::swap(&mut target.key, &mut successor.key);
        std::mem::swap(&mut target.value, &mut successor.value);
        tracing::trace!("moved in-order successor into removed slot");
        successor
    }
}

impl<K: Ord, V: Clone> ConcurrentTree<K, V> {
    /// Returns a clone of the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree = ConcurrentTree::new();
    /// tree.add(7, "seven");
    /// assert_eq!(tree.lookup(&7), Some("seven"));
    /// assert_eq!(tree.lookup(&8), None);
    /// ```
    pub fn lookup(&self, key: &K) -> Option<V> {
        self.lookup_with(key, V::clone)
    }

    /// Removes `key` and returns the value it was associated with.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use handtree::ConcurrentTree;
    ///
    /// let tree = ConcurrentTree::new();
    /// tree.add(7, "seven");
    /// assert_eq!(tree.remove(&7), Some("seven"));
    /// assert_eq!(tree.remove(&7), None);
    /// ```
    pub fn remove(&self, key: &K) -> Option<V> {
        self.detach(key).map(|node| node.value.clone())
    }
}

impl<K: Ord + Clone, V> ConcurrentTree<K, V> {
    /// Checks the ordering invariant and the node counter with a full
    /// in-order walk.
    ///
    /// Returns the number of reachable nodes. The result is only meaningful
    /// while no other thread mutates the tree.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::OrderViolation`] for the first key that is not
    /// strictly greater than its predecessor, or
    /// [`TreeError::CountMismatch`] if the counter disagrees with the walk.
    pub fn verify(&self) -> Result<usize, TreeError<K>> {
        let mut previous: Option<K> = None;
        let mut violation: Option<K> = None;
        let mut reachable = 0;

        self.in_order(|key, _| {
            reachable += 1;
            if violation.is_some() {
                return;
            }
            if previous.as_ref().is_some_and(|previous| previous >= key) {
                violation = Some(key.clone());
            }
            previous = Some(key.clone());
        });

        if let Some(key) = violation {
            return Err(TreeError::OrderViolation { key });
        }
        let recorded = self.len();
        if recorded != reachable {
            return Err(TreeError::CountMismatch {
                recorded,
                reachable,
            });
        }
        Ok(reachable)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl<K, V> Default for ConcurrentTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for ConcurrentTree<K, V> {
    /// Builds a tree in iteration order; the first value for a repeated key
    /// wins.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}

impl<K: Ord, V> Extend<(K, V)> for ConcurrentTree<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.add(key, value);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ConcurrentTree<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = formatter.debug_map();
        self.in_order(|key, value| {
            map.entry(key, value);
        });
        map.finish()
    }
}

static_assertions::assert_impl_all!(ConcurrentTree<u32, i32>: Send, Sync);
static_assertions::assert_impl_all!(ConcurrentTree<String, Vec<u8>>: Send, Sync);
static_assertions::assert_not_impl_any!(ConcurrentTree<std::rc::Rc<u32>, i32>: Send, Sync);

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K, V> serde::Serialize for ConcurrentTree<K, V>
where
    K: serde::Serialize + Clone,
    V: serde::Serialize + Clone,
{
    /// Serializes a snapshot of the entries as a map in ascending key order.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let entries = self.entries();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in &entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct ConcurrentTreeVisitor<K, V> {
    key_marker: std::marker::PhantomData<K>,
    value_marker: std::marker::PhantomData<V>,
}

#[cfg(feature = "serde")]
impl<K, V> ConcurrentTreeVisitor<K, V> {
    const fn new() -> Self {
        Self {
            key_marker: std::marker::PhantomData,
            value_marker: std::marker::PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::de::Visitor<'de> for ConcurrentTreeVisitor<K, V>
where
    K: serde::Deserialize<'de> + Ord,
    V: serde::Deserialize<'de>,
{
    type Value = ConcurrentTree<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let tree = ConcurrentTree::new();
        while let Some((key, value)) = access.next_entry()? {
            tree.add(key, value);
        }
        Ok(tree)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V> serde::Deserialize<'de> for ConcurrentTree<K, V>
where
    K: serde::Deserialize<'de> + Ord,
    V: serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(ConcurrentTreeVisitor::new())
    }
}

// =============================================================================
// Rayon Support
// =============================================================================

#[cfg(feature = "rayon")]
impl<K, V> rayon::iter::ParallelExtend<(K, V)> for ConcurrentTree<K, V>
where
    K: Ord + Send,
    V: Send,
{
    /// Inserts from every rayon worker at once; each insert only locks the
    /// nodes on its own path.
    fn par_extend<I>(&mut self, par_iter: I)
    where
        I: rayon::iter::IntoParallelIterator<Item = (K, V)>,
    {
        use rayon::iter::ParallelIterator;
        let tree: &Self = self;
        par_iter.into_par_iter().for_each(|(key, value)| {
            tree.add(key, value);
        });
    }
}

#[cfg(feature = "rayon")]
impl<K, V> rayon::iter::FromParallelIterator<(K, V)> for ConcurrentTree<K, V>
where
    K: Ord + Send,
    V: Send,
{
    fn from_par_iter<I>(par_iter: I) -> Self
    where
        I: rayon::iter::IntoParallelIterator<Item = (K, V)>,
    {
        use rayon::iter::ParallelExtend;
        let mut tree = Self::new();
        tree.par_extend(par_iter);
        tree
    }
}

// =============================================================================
// Tests
// =============================================================================
