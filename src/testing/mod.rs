//! Utilities for testing linearizability of concurrent data structures based on the strategy
//! defined by Lowe in [Testing for Linearizability](http://www.cs.ox.ac.uk/people/gavin.lowe/LinearizabiltyTesting/paper.pdf).
//! This should be done by using the LinearizabilityTester struct and the ThreadLog.
//!
//! # Example
//! This is an example of how to use the LinearizabilityTester on a stack. The tester needs
//! a sequential reference data structure along with operations defined on it to match those on
//! the concurrent object.
//! ```
//! use concurrent_containers::structures::LockFreeStack;
//! use concurrent_containers::testing::{LinearizabilityResult, LinearizabilityTester, ThreadLog};
//! use im::Vector;
//!
//! fn sequential_pop(stack: &Vector<usize>, _: Option<usize>) -> (Vector<usize>, Option<usize>) {
//!     let mut next = stack.clone();
//!     let res = next.pop_back();
//!     (next, res)
//! }
//!
//! fn sequential_push(stack: &Vector<usize>, val: Option<usize>) -> (Vector<usize>, Option<usize>) {
//!     let mut next = stack.clone();
//!     next.push_back(val.unwrap());
//!     (next, None)
//! }
//!
//! fn worker(id: usize, log: &mut ThreadLog<LockFreeStack<usize>, Vector<usize>, usize>) {
//!     for n in 0..log.iterations() {
//!         if n % 3 == 0 {
//!             log.log(LockFreeStack::pop, "pop".to_owned(), sequential_pop);
//!         } else {
//!             let val = id * 1000 + n;
//!             log.log_val(LockFreeStack::push, val, format!("push: {}", val), sequential_push);
//!         }
//!     }
//! }
//!
//! let linearizer = LinearizabilityTester::new(4, 50, LockFreeStack::new(), Vector::new());
//! assert_eq!(linearizer.run(worker).unwrap(), LinearizabilityResult::Success);
//! ```

use thiserror::Error;

pub use self::linearizability_tester::{LinearizabilityResult, LinearizabilityTester, ThreadLog};
pub use self::time_stamped::SequentialOp;

pub mod linearizability_tester;
mod time_stamped;

/// Failures of the tester itself, as opposed to a non-linearizable history.
#[derive(Debug, Error)]
pub enum TesterError {
    #[error("could not build the worker thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
