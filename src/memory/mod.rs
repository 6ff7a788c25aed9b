//! Memory management for the lock-free structures.
//!
//! The manager in this module makes sure no record is freed while another thread can still
//! reach it through a stale pointer, which also rules out the
//! [ABA problem](https://en.wikipedia.org/wiki/ABA_problem) on pointers it guards.

pub use self::hazardpointers::HPBRManager;

mod hazardpointers;
