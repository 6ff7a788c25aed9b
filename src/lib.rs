//! Thread-safe containers for sharing mutable collections between threads.
//!
//! This crate provides four independent structures, each safe to use from many threads
//! through a shared reference:
//!
//! * [`ConcurrentHashtable`](structures::ConcurrentHashtable), a fixed-bucket hashtable
//!   with a reader/writer lock per bucket.
//! * [`ConcurrentList`](structures::ConcurrentList), a singly linked list traversed with
//!   hand-over-hand locking.
//! * [`ConcurrentQueue`](structures::ConcurrentQueue), a FIFO queue with separate head and
//!   tail locks and blocking pops.
//! * [`LockFreeStack`](structures::LockFreeStack), a Treiber stack whose nodes are
//!   reclaimed through hazard pointers.
//!
//! The hazard pointer manager backing the stack lives in [`memory`], and [`testing`] holds
//! the linearizability tester the stack and queue are checked with.

pub mod memory;
pub mod structures;
pub mod testing;
