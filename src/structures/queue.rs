use std::fmt;
use std::mem;
use std::ptr;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// A two-lock FIFO queue.
///
/// This queue is the blocking queue described in [Simple, Fast, and Practical
/// Non-blocking and Blocking Concurrent Queue Algorithms](https://dl.acm.org/citation.cfm?id=248106).
/// It is a singly linked list that always ends in a dummy node: `head == tail` exactly when
/// the queue is empty. The head and tail pointers have a lock each, so a push only ever
/// contends with other pushes, and a pop only with other pops.
///
/// Whenever both locks are needed the tail lock is taken first.
///
/// Pushes are delivered in the order they were made. Two racing pops have no guaranteed
/// winner.
pub struct ConcurrentQueue<T> {
    head: Mutex<*mut Node<T>>,
    tail: Mutex<*mut Node<T>>,
    not_empty: Condvar,
}

unsafe impl<T: Send> Send for ConcurrentQueue<T> {}
unsafe impl<T: Send> Sync for ConcurrentQueue<T> {}

struct Node<T> {
    value: Option<T>,
    next: *mut Node<T>,
}

impl<T> Node<T> {
    fn new_dummy_node() -> *mut Self {
        Box::into_raw(Box::new(Node {
            value: None,
            next: ptr::null_mut(),
        }))
    }
}

impl<T> ConcurrentQueue<T> {
    /// Create a new, empty queue.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentQueue;
    ///
    /// let queue: ConcurrentQueue<String> = ConcurrentQueue::new();
    /// assert!(queue.empty());
    /// ```
    pub fn new() -> Self {
        let dummy_node = Node::new_dummy_node();
        ConcurrentQueue {
            head: Mutex::new(dummy_node),
            tail: Mutex::new(dummy_node),
            not_empty: Condvar::new(),
        }
    }

    /// Add a new element to the back of the queue, waking any blocked consumer.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentQueue;
    ///
    /// let queue = ConcurrentQueue::new();
    /// queue.push("hello".to_owned());
    /// assert_eq!(queue.try_pop(), Some("hello".to_owned()));
    /// ```
    pub fn push(&self, val: T) {
        let new_dummy = Node::new_dummy_node();
        let mut tail = self.tail.lock();
        // The old dummy takes the value and the new node becomes the dummy. Pops never
        // touch the dummy, so the tail lock alone covers it.
        unsafe {
            (**tail).value = Some(val);
            (**tail).next = new_dummy;
        }
        *tail = new_dummy;
        self.not_empty.notify_all();
    }

    /// Take the element at the front of the queue, or `None` if the queue is empty.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentQueue;
    ///
    /// let queue = ConcurrentQueue::new();
    /// assert_eq!(queue.try_pop(), None);
    /// queue.push(1);
    /// queue.push(2);
    /// assert_eq!(queue.try_pop(), Some(1));
    /// assert_eq!(queue.try_pop(), Some(2));
    /// ```
    pub fn try_pop(&self) -> Option<T> {
        let tail = self.tail.lock();
        let head = self.head.lock();
        if *head == *tail {
            return None;
        }
        drop(tail);

        Some(Self::take_front(head))
    }

    /// Move the front element into `result`, returning `false` if the queue is empty.
    ///
    /// `result` is left untouched when nothing was popped.
    pub fn try_pop_into(&self, result: &mut T) -> bool {
        match self.try_pop() {
            Some(val) => {
                *result = val;
                true
            }
            None => false,
        }
    }

    /// Take the element at the front of the queue, blocking until there is one.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::ConcurrentQueue;
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// let queue = Arc::new(ConcurrentQueue::new());
    /// let producer = {
    ///     let queue = queue.clone();
    ///     thread::spawn(move || queue.push(42))
    /// };
    /// assert_eq!(queue.wait_and_pop(), 42);
    /// producer.join().unwrap();
    /// ```
    pub fn wait_and_pop(&self) -> T {
        let mut tail = self.tail.lock();
        self.not_empty
            .wait_while(&mut tail, |tail| *self.head.lock() == *tail);
        self.pop_non_empty(tail)
    }

    /// Move the front element into `result`, blocking until there is one.
    pub fn wait_and_pop_into(&self, result: &mut T) {
        *result = self.wait_and_pop();
    }

    /// Take the element at the front of the queue, waiting at most `timeout` for one to
    /// arrive. Returns `None` if the queue stayed empty.
    pub fn wait_and_pop_for(&self, timeout: Duration) -> Option<T> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_and_pop_until(deadline),
            None => Some(self.wait_and_pop()),
        }
    }

    /// Take the element at the front of the queue, waiting until `deadline` for one to
    /// arrive. Returns `None` if the queue stayed empty.
    pub fn wait_and_pop_until(&self, deadline: Instant) -> Option<T> {
        let mut tail = self.tail.lock();
        self.not_empty
            .wait_while_until(&mut tail, |tail| *self.head.lock() == *tail, deadline);

        // The wait may have timed out just as a push landed, so look once more.
        let head = self.head.lock();
        if *head == *tail {
            return None;
        }
        drop(tail);

        Some(Self::take_front(head))
    }

    /// Whether the queue currently holds no elements.
    pub fn empty(&self) -> bool {
        let tail = self.tail.lock();
        let head = self.head.lock();
        *head == *tail
    }

    /// Same as [`empty`](ConcurrentQueue::empty).
    pub fn is_empty(&self) -> bool {
        self.empty()
    }

    fn pop_non_empty(&self, tail: MutexGuard<*mut Node<T>>) -> T {
        let head = self.head.lock();
        drop(tail);
        Self::take_front(head)
    }

    /// Unlink the front node and take its value. The caller must have seen `head != tail`
    /// while holding both locks; only the head lock may still be held.
    fn take_front(mut head: MutexGuard<*mut Node<T>>) -> T {
        let old_head = *head;
        unsafe {
            *head = (*old_head).next;
        }
        drop(head);

        // The node is unlinked and ours alone from here on.
        let mut node = unsafe { Box::from_raw(old_head) };
        match node.value.take() {
            Some(val) => val,
            None => unreachable!("non-dummy queue node without a value"),
        }
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ConcurrentQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConcurrentQueue")
            .field("empty", &self.empty())
            .finish()
    }
}

impl<T> Drop for ConcurrentQueue<T> {
    fn drop(&mut self) {
        let mut current = mem::replace(self.head.get_mut(), ptr::null_mut());
        while !current.is_null() {
            unsafe {
                let node = Box::from_raw(current);
                current = node.next;
            }
        }
    }
}
