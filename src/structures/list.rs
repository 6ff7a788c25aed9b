use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

type Link<T> = Option<Arc<Mutex<Node<T>>>>;

/// A singly linked list with a lock on every node.
///
/// Traversals use hand-over-hand locking: the lock on the next node is taken before the
/// lock on the current node is released, and locks are only ever taken from the front
/// towards the back. A node can only be unlinked by a thread holding both its own lock and
/// its predecessor's, so a traversal never steps onto a node that is being removed.
///
/// The list starts with a sentinel node that never holds a value. Every real node therefore
/// has a predecessor, and inserting at or removing from the front needs no special case.
/// [`push_front`](ConcurrentList::push_front) only locks the sentinel.
pub struct ConcurrentList<T> {
    head: Arc<Mutex<Node<T>>>,
}

struct Node<T> {
    value: Option<T>,
    next: Link<T>,
}

impl<T> ConcurrentList<T> {
    /// Create a new, empty list.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentList;
    ///
    /// let list: ConcurrentList<u32> = ConcurrentList::new();
    /// assert!(list.is_empty());
    /// ```
    pub fn new() -> Self {
        ConcurrentList {
            head: Arc::new(Mutex::new(Node {
                value: None,
                next: None,
            })),
        }
    }

    /// Insert a value at the front of the list.
    pub fn push_front(&self, value: T) {
        let node = Arc::new(Mutex::new(Node {
            value: Some(value),
            next: None,
        }));
        let mut head = self.head.lock();
        // The new node is unpublished, so its lock is free and taking it after the
        // sentinel's keeps the front-to-back order.
        node.lock().next = head.next.take();
        head.next = Some(node);
    }

    /// Apply `f` to every value, front to back. `f` may modify the values in place.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentList;
    ///
    /// let list = ConcurrentList::new();
    /// list.push_front(1);
    /// list.push_front(2);
    /// list.for_each(|val| *val *= 10);
    ///
    /// let mut seen = Vec::new();
    /// list.for_each(|val| seen.push(*val));
    /// assert_eq!(seen, vec![20, 10]);
    /// ```
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&mut T),
    {
        let mut current = self.head.lock_arc();
        while let Some(next) = current.next.clone() {
            // Locks `next` before the old guard is dropped.
            current = next.lock_arc();
            if let Some(value) = current.value.as_mut() {
                f(value);
            }
        }
    }

    /// Return a copy of the first value, front to back, that satisfies `predicate`.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentList;
    ///
    /// let list = ConcurrentList::new();
    /// for i in 1..4 {
    ///     list.push_front(i);
    /// }
    /// assert_eq!(list.find_first_if(|val| val % 2 == 1), Some(3));
    /// assert_eq!(list.find_first_if(|val| *val > 3), None);
    /// ```
    pub fn find_first_if<F>(&self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
        T: Clone,
    {
        let mut current = self.head.lock_arc();
        while let Some(next) = current.next.clone() {
            current = next.lock_arc();
            if let Some(value) = current.value.as_ref() {
                if predicate(value) {
                    return Some(value.clone());
                }
            }
        }
        None
    }

    /// Remove every value that satisfies `predicate`.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentList;
    ///
    /// let list = ConcurrentList::new();
    /// for i in 0..10 {
    ///     list.push_front(i);
    /// }
    /// list.remove_if(|val| val % 2 == 0);
    /// assert_eq!(list.find_first_if(|val| val % 2 == 0), None);
    /// assert_eq!(list.find_first_if(|_| true), Some(9));
    /// ```
    pub fn remove_if<F>(&self, mut predicate: F)
    where
        F: FnMut(&T) -> bool,
    {
        let mut prev = self.head.lock_arc();
        while let Some(current) = prev.next.clone() {
            let mut current_guard = current.lock_arc();
            let matched = current_guard
                .value
                .as_ref()
                .map_or(false, |value| predicate(value));

            if matched {
                prev.next = current_guard.next.take();
                // Unlock before the last reference, and with it the node, goes away.
                drop(current_guard);
            } else {
                prev = current_guard;
            }
        }
    }

    /// Whether the list currently holds no values.
    pub fn is_empty(&self) -> bool {
        self.head.lock().next.is_none()
    }
}

impl<T> Default for ConcurrentList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ConcurrentList<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConcurrentList")
            .field("empty", &self.is_empty())
            .finish()
    }
}

impl<T> Drop for ConcurrentList<T> {
    fn drop(&mut self) {
        // Unlink node by node, dropping the chain recursively could overflow the stack.
        let mut next = self.head.lock().next.take();
        while let Some(node) = next {
            next = match Arc::try_unwrap(node) {
                Ok(mutex) => mutex.into_inner().next,
                Err(_) => None,
            };
        }
    }
}
