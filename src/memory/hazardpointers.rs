use std::cell::UnsafeCell;
use std::collections::HashSet;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use log::{debug, trace};
use thread_local::ThreadLocal;

/// Hazard pointer based reclamation for lock-free structures.
///
/// Every thread that touches the manager gets `num_hp_per_thread` hazard slots. A
/// thread publishes a record in one of its slots before dereferencing it, and the record
/// will not be freed while any slot still holds it. Records unlinked from a structure are
/// handed to [`retire`](HPBRManager::retire), which queues them on a thread-local list;
/// once that list grows past `max_retired` a scan frees every record that is no longer
/// published anywhere.
///
/// Hazard slots are kept in a global list that only ever grows. Slots belonging to a
/// thread that has exited are picked up again by the next thread that reuses its
/// thread-local entry.
pub struct HPBRManager<T: Send> {
    thread_info: ThreadLocal<UnsafeCell<ThreadLocalInfo<T>>>,
    head: AtomicPtr<HazardPointer<T>>,
    max_retired: usize,
    num_hp_per_thread: usize,
}

impl<T: Send> fmt::Debug for HPBRManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HPBRManager")
            .field("head", &self.head)
            .field("max_retired", &self.max_retired)
            .field("num_hp_per_thread", &self.num_hp_per_thread)
            .finish()
    }
}

impl<T: Send> HPBRManager<T> {
    /// Create a manager that scans once a thread has retired more than `max_retired`
    /// records, giving each thread `num_hp_per_thread` hazard slots.
    pub fn new(max_retired: usize, num_hp_per_thread: usize) -> Self {
        HPBRManager {
            thread_info: ThreadLocal::new(),
            head: AtomicPtr::default(),
            max_retired,
            num_hp_per_thread,
        }
    }

    fn allocate_hp(&self) -> *mut HazardPointer<T> {
        let new_hp_ptr = Box::into_raw(Box::new(HazardPointer::new()));

        // Hazard records are never unlinked, so a plain CAS push is ABA free.
        let mut old_head = self.head.load(Ordering::Acquire);
        loop {
            unsafe {
                (*new_hp_ptr).next.store(old_head, Ordering::Relaxed);
            }
            match self.head.compare_exchange_weak(
                old_head,
                new_hp_ptr,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => old_head = current,
            }
        }

        new_hp_ptr
    }

    /// Publish `record` in the calling thread's hazard slot `hazard_num`.
    ///
    /// The caller must re-read the location it loaded `record` from after this call and
    /// only dereference `record` if it is still there.
    pub fn protect(&self, record: *mut T, hazard_num: usize) {
        self.hazard_pointer(hazard_num).protect(record);
    }

    /// Clear the calling thread's hazard slot `hazard_num`.
    pub fn unprotect(&self, hazard_num: usize) {
        self.hazard_pointer(hazard_num).unprotect();
    }

    /// Hand over an unlinked record for deferred reclamation.
    ///
    /// `record` must have been allocated with `Box` and must no longer be reachable from
    /// the owning structure. The calling thread's slot `hazard_num` is cleared first.
    pub fn retire(&self, record: *mut T, hazard_num: usize) {
        self.unprotect(hazard_num);
        let should_scan = unsafe {
            let thread_info = self.get_mut_thread_info();
            thread_info.retired_list.push(record);
            thread_info.retired_list.len() > self.max_retired
        };

        if should_scan {
            self.scan();
        }
    }

    /// Free every record in this thread's retired list that no hazard slot protects.
    fn scan(&self) {
        let mut hazard_set: HashSet<*mut T> = HashSet::new();
        let mut current = self.head.load(Ordering::Acquire);
        while !current.is_null() {
            unsafe {
                let hazard_pointer = &*current;
                let protected = hazard_pointer.protected.load(Ordering::SeqCst);
                if !protected.is_null() {
                    hazard_set.insert(protected);
                }
                current = hazard_pointer.next.load(Ordering::Acquire);
            }
        }

        let (freed, kept) = unsafe {
            let thread_info = self.get_mut_thread_info();
            let before = thread_info.retired_list.len();
            thread_info.retired_list.retain(|&record| {
                if hazard_set.contains(&record) {
                    true
                } else {
                    Self::free(record);
                    false
                }
            });
            (before - thread_info.retired_list.len(), thread_info.retired_list.len())
        };

        trace!("hazard pointer scan freed {} records, {} still protected", freed, kept);
    }

    fn free(garbage: *mut T) {
        unsafe {
            drop(Box::from_raw(garbage));
        }
    }

    fn hazard_pointer(&self, hazard_num: usize) -> &HazardPointer<T> {
        assert!(
            hazard_num < self.num_hp_per_thread,
            "hazard slot {} out of range, this manager has {} per thread",
            hazard_num,
            self.num_hp_per_thread
        );
        unsafe {
            let thread_info = self.get_mut_thread_info();
            &*thread_info.local_hazards[hazard_num]
        }
    }

    /// Get the calling thread's info, allocating its hazard slots on first access.
    ///
    /// The returned reference must not outlive the current manager call: only the owning
    /// thread ever touches its entry, but two live `&mut` from the same thread would alias.
    #[allow(clippy::mut_from_ref)]
    unsafe fn get_mut_thread_info(&self) -> &mut ThreadLocalInfo<T> {
        let thread_info_ptr = self
            .thread_info
            .get_or(|| {
                debug!(
                    "allocating {} hazard pointers for {:?}",
                    self.num_hp_per_thread,
                    std::thread::current().id()
                );
                let starting_hp = (0..self.num_hp_per_thread)
                    .map(|_| self.allocate_hp())
                    .collect();
                UnsafeCell::new(ThreadLocalInfo::new(starting_hp))
            })
            .get();

        &mut *thread_info_ptr
    }
}

impl<T: Send> Drop for HPBRManager<T> {
    fn drop(&mut self) {
        // No thread can hold a hazard once we have exclusive access.
        for cell in self.thread_info.iter_mut() {
            for record in cell.get_mut().retired_list.drain(..) {
                Self::free(record);
            }
        }

        let mut current = *self.head.get_mut();
        while !current.is_null() {
            unsafe {
                let hazard_pointer = Box::from_raw(current);
                current = hazard_pointer.next.load(Ordering::Relaxed);
            }
        }
    }
}

struct HazardPointer<T> {
    protected: AtomicPtr<T>,
    next: AtomicPtr<HazardPointer<T>>,
}

impl<T> HazardPointer<T> {
    fn new() -> Self {
        HazardPointer {
            protected: AtomicPtr::default(),
            next: AtomicPtr::default(),
        }
    }

    fn protect(&self, record: *mut T) {
        self.protected.store(record, Ordering::SeqCst);
    }

    fn unprotect(&self) {
        self.protected.store(ptr::null_mut(), Ordering::Release);
    }
}

struct ThreadLocalInfo<T> {
    local_hazards: Vec<*mut HazardPointer<T>>,
    retired_list: Vec<*mut T>,
}

unsafe impl<T: Send> Send for ThreadLocalInfo<T> {}

impl<T> ThreadLocalInfo<T> {
    fn new(starting_hazards: Vec<*mut HazardPointer<T>>) -> Self {
        ThreadLocalInfo {
            local_hazards: starting_hazards,
            retired_list: Vec::new(),
        }
    }
}
