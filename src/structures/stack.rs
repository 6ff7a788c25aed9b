use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::memory::HPBRManager;

/// Retired nodes a thread may hold before it scans the hazard list.
const MAX_RETIRED: usize = 64;
/// Pop only ever needs to protect the node it is about to unlink.
const HAZARDS_PER_THREAD: usize = 1;
const HEAD_HAZARD: usize = 0;

/// A lock-free Treiber stack.
///
/// The stack is a singly linked list whose head is swapped with compare-and-swap. Pushes
/// never dereference shared nodes. Pops do, so the node a pop is about to read is
/// published in a hazard pointer first, and unlinked nodes are retired to an
/// [`HPBRManager`] instead of being freed on the spot. A node can therefore never be
/// freed, or reallocated at the same address, while a racing pop still holds it.
///
/// LIFO order is exact for a single thread. Across threads the only promise is that every
/// popped value was pushed, and is popped at most once.
pub struct LockFreeStack<T: Send> {
    head: AtomicPtr<Node<T>>,
    manager: HPBRManager<Node<T>>,
}

struct Node<T> {
    data: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn new_as_pointer(val: T) -> *mut Self {
        Box::into_raw(Box::new(Node {
            data: Some(val),
            next: AtomicPtr::default(),
        }))
    }
}

impl<T: Send> LockFreeStack<T> {
    /// Create a new, empty stack.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::LockFreeStack;
    ///
    /// let stack: LockFreeStack<u32> = LockFreeStack::new();
    /// assert!(stack.is_empty());
    /// ```
    pub fn new() -> Self {
        LockFreeStack {
            head: AtomicPtr::default(),
            manager: HPBRManager::new(MAX_RETIRED, HAZARDS_PER_THREAD),
        }
    }

    /// Push a value onto the top of the stack.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::LockFreeStack;
    ///
    /// let stack = LockFreeStack::new();
    /// stack.push("hello".to_owned());
    /// assert_eq!(stack.pop(), Some("hello".to_owned()));
    /// ```
    pub fn push(&self, val: T) {
        let node = Node::new_as_pointer(val);
        let mut old_head = self.head.load(Ordering::Acquire);
        loop {
            // The node is still private to us, nobody else can observe this store.
            unsafe {
                (*node).next.store(old_head, Ordering::Relaxed);
            }
            match self
                .head
                .compare_exchange_weak(old_head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => old_head = current,
            }
        }
    }

    /// Take the value from the top of the stack, or `None` if the stack is empty.
    /// # Examples
    /// ```
    /// use concurrent_containers::structures::LockFreeStack;
    ///
    /// let stack = LockFreeStack::new();
    /// stack.push(1);
    /// stack.push(2);
    /// assert_eq!(stack.pop(), Some(2));
    /// assert_eq!(stack.pop(), Some(1));
    /// assert_eq!(stack.pop(), None);
    /// ```
    pub fn pop(&self) -> Option<T> {
        loop {
            let old_head = self.head.load(Ordering::Acquire);
            if old_head.is_null() {
                // A hazard left from a failed attempt would pin a retired node.
                self.manager.unprotect(HEAD_HAZARD);
                return None;
            }

            self.manager.protect(old_head, HEAD_HAZARD);
            // Only once head is re-read do we know old_head was not retired before the
            // hazard became visible.
            if !ptr::eq(old_head, self.head.load(Ordering::SeqCst)) {
                continue;
            }

            let new_head = unsafe { (*old_head).next.load(Ordering::Acquire) };
            if self
                .head
                .compare_exchange(old_head, new_head, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                // Racing pops only ever read `next`, so the winner may move the data out.
                let data = unsafe { ptr::replace(ptr::addr_of_mut!((*old_head).data), None) };
                self.manager.retire(old_head, HEAD_HAZARD);
                return data;
            }
        }
    }

    /// Whether the stack currently holds no values.
    ///
    /// Under concurrent pushes and pops this is only a snapshot.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T: Send> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> fmt::Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LockFreeStack")
            .field("head", &self.head)
            .field("manager", &self.manager)
            .finish()
    }
}

impl<T: Send> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            unsafe {
                let node = Box::from_raw(current);
                current = node.next.load(Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LockFreeStack, Node, HEAD_HAZARD, MAX_RETIRED};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use im::Vector;
    use rand::{thread_rng, Rng};

    use crate::testing::{LinearizabilityResult, LinearizabilityTester, ThreadLog};

    #[derive(Debug)]
    struct Foo {
        data: u8,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Foo {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_pop_single_threaded() {
        let stack: LockFreeStack<u8> = LockFreeStack::new();

        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_drop_releases_remaining_values() {
        let drops = Arc::new(AtomicUsize::new(0));
        let stack = LockFreeStack::new();
        for data in 0..5 {
            stack.push(Foo {
                data,
                drops: drops.clone(),
            });
        }

        let popped = stack.pop().unwrap();
        assert_eq!(popped.data, 4);
        drop(popped);
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(stack);
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_pop_on_empty_clears_stale_hazard() {
        let drops = Arc::new(AtomicUsize::new(0));
        let stack: LockFreeStack<Foo> = LockFreeStack::new();
        let node = Node::new_as_pointer(Foo {
            data: 0,
            drops: drops.clone(),
        });

        // As if an earlier attempt protected `node` and then lost it to another pop.
        stack.manager.protect(node, HEAD_HAZARD);
        assert!(stack.pop().is_none());

        stack.manager.retire(node, HEAD_HAZARD);
        for data in 1..=MAX_RETIRED as u8 {
            let filler = Node::new_as_pointer(Foo {
                data,
                drops: drops.clone(),
            });
            stack.manager.retire(filler, HEAD_HAZARD);
        }
        // The scan this triggered saw no hazard on `node`.
        assert_eq!(drops.load(Ordering::SeqCst), MAX_RETIRED + 1);
    }

    #[test]
    fn test_push_pop_race_small() {
        let stack: Arc<LockFreeStack<u32>> = Arc::new(LockFreeStack::new());
        let popped = Arc::new(Mutex::new(Vec::new()));
        let mut waitvec: Vec<thread::JoinHandle<()>> = Vec::new();

        for i in 0..10 {
            let stack_copy = stack.clone();
            waitvec.push(thread::spawn(move || stack_copy.push(i)));
            let stack_copy = stack.clone();
            let popped_copy = popped.clone();
            waitvec.push(thread::spawn(move || {
                if let Some(val) = stack_copy.pop() {
                    popped_copy.lock().unwrap().push(val);
                }
            }));
        }

        for handle in waitvec {
            handle.join().unwrap();
        }

        let popped = popped.lock().unwrap();
        let unique: HashSet<u32> = popped.iter().cloned().collect();
        assert_eq!(unique.len(), popped.len());
        assert!(unique.iter().all(|val| *val < 10));

        let mut remaining = 0;
        while let Some(val) = stack.pop() {
            assert!(!unique.contains(&val));
            remaining += 1;
        }
        assert_eq!(popped.len() + remaining, 10);
    }

    #[test]
    fn test_stress_no_duplicates_or_corruption() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 5_000;

        let stack: Arc<LockFreeStack<Box<usize>>> = Arc::new(LockFreeStack::new());
        let mut pushers = Vec::new();
        let mut poppers = Vec::new();

        for id in 0..THREADS {
            let stack_copy = stack.clone();
            pushers.push(thread::spawn(move || {
                for n in 0..PER_THREAD {
                    // Boxed values turn a use-after-free into a corrupted read.
                    stack_copy.push(Box::new(id * PER_THREAD + n));
                }
            }));
        }
        for _ in 0..THREADS {
            let stack_copy = stack.clone();
            poppers.push(thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..PER_THREAD {
                    if let Some(val) = stack_copy.pop() {
                        seen.push(*val);
                    }
                    if thread_rng().gen_bool(0.1) {
                        thread::yield_now();
                    }
                }
                seen
            }));
        }

        for handle in pushers {
            handle.join().unwrap();
        }
        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in poppers {
            for val in handle.join().unwrap() {
                assert!(val < THREADS * PER_THREAD);
                assert!(seen.insert(val), "value {} popped twice", val);
                total += 1;
            }
        }
        while let Some(val) = stack.pop() {
            assert!(seen.insert(*val), "value {} popped twice", val);
            total += 1;
        }
        assert_eq!(total, THREADS * PER_THREAD);
    }

    #[test]
    fn test_per_producer_lifo_single_consumer() {
        let stack: Arc<LockFreeStack<(usize, usize)>> = Arc::new(LockFreeStack::new());
        let handles: Vec<_> = (0..4)
            .map(|id| {
                let stack_copy = stack.clone();
                thread::spawn(move || {
                    for n in 0..1000 {
                        stack_copy.push((id, n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // With pushes finished, each producer's values come back newest first.
        let mut last = [usize::MAX; 4];
        while let Some((id, n)) = stack.pop() {
            assert!(n < last[id]);
            last[id] = n;
        }
        assert_eq!(last, [0; 4]);
    }

    #[test]
    fn test_linearizable() {
        let stack: LockFreeStack<usize> = LockFreeStack::new();
        let sequential: Vector<usize> = Vector::new();

        let linearizer: LinearizabilityTester<LockFreeStack<usize>, Vector<usize>, usize> =
            LinearizabilityTester::new(4, 100, stack, sequential);

        fn sequential_pop(stack: &Vector<usize>, _: Option<usize>) -> (Vector<usize>, Option<usize>) {
            let mut next = stack.clone();
            let res = next.pop_back();
            (next, res)
        }

        fn sequential_push(stack: &Vector<usize>, val: Option<usize>) -> (Vector<usize>, Option<usize>) {
            let mut next = stack.clone();
            if let Some(val) = val {
                next.push_back(val);
            }
            (next, None)
        }

        fn worker(id: usize, log: &mut ThreadLog<LockFreeStack<usize>, Vector<usize>, usize>) {
            for n in 0..log.iterations() {
                if thread_rng().gen_range(0..100) < 50 {
                    let val = id * 1000 + n;
                    log.log_val(LockFreeStack::push, val, format!("push: {}", val), sequential_push);
                } else {
                    log.log(LockFreeStack::pop, "pop".to_owned(), sequential_pop);
                }
            }
        }

        let result = linearizer.run(worker).unwrap();
        assert_eq!(result, LinearizabilityResult::Success);
    }
}
