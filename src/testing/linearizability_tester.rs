use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use rayon::prelude::*;

use super::time_stamped::{Event, SequentialOp, TimeStamped};
use super::TesterError;

#[derive(Debug, PartialEq, Eq)]
pub enum LinearizabilityResult {
    Success,
    /// No sequential order explains the history. Holds the operation messages in
    /// invocation order.
    Failure { history: Vec<String> },
}

/// Runs a worker on several threads against one concurrent object and checks the recorded
/// history against a sequential model.
///
/// `C` is the concurrent object, `Seq` the sequential model and `Ret` the type of the
/// values passed to and returned from operations.
pub struct LinearizabilityTester<C, Seq, Ret> {
    num_threads: usize,
    iterations: usize,
    concurrent: C,
    sequential: Seq,
    clock: AtomicU64,
    _ret: std::marker::PhantomData<fn() -> Ret>,
}

/// The per-thread recorder handed to a worker.
pub struct ThreadLog<'a, C, Seq, Ret> {
    id: usize,
    iterations: usize,
    concurrent: &'a C,
    clock: &'a AtomicU64,
    events: Vec<TimeStamped<Seq, Ret>>,
}

impl<'a, C, Seq, Ret: Clone> ThreadLog<'a, C, Seq, Ret> {
    fn new(id: usize, iterations: usize, concurrent: &'a C, clock: &'a AtomicU64) -> Self {
        Self {
            id,
            iterations,
            concurrent,
            clock,
            events: Vec::with_capacity(iterations * 2),
        }
    }

    /// The number of operations the worker is expected to perform.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// Run an operation that takes no argument and produces an optional result.
    pub fn log(
        &mut self,
        op: fn(&C) -> Option<Ret>,
        message: String,
        seq_method: SequentialOp<Seq, Ret>,
    ) {
        let stamp = self.tick();
        self.events
            .push(TimeStamped::new_invoke(stamp, self.id, message, seq_method, None));
        let result = op(self.concurrent);
        let stamp = self.tick();
        self.events
            .push(TimeStamped::new_return(stamp, self.id, result));
    }

    /// Run an operation that consumes `val` and produces no result.
    pub fn log_val(
        &mut self,
        op: fn(&C, Ret),
        val: Ret,
        message: String,
        seq_method: SequentialOp<Seq, Ret>,
    ) {
        let stamp = self.tick();
        self.events.push(TimeStamped::new_invoke(
            stamp,
            self.id,
            message,
            seq_method,
            Some(val.clone()),
        ));
        op(self.concurrent, val);
        let stamp = self.tick();
        self.events.push(TimeStamped::new_return(stamp, self.id, None));
    }
}

/// A completed operation, paired from its invoke and return events.
struct Operation<Seq, Ret> {
    message: String,
    op: SequentialOp<Seq, Ret>,
    arg: Option<Ret>,
    result: Option<Ret>,
    invoked: u64,
    returned: u64,
}

impl<C, Seq, Ret> LinearizabilityTester<C, Seq, Ret>
where
    C: Sync,
    Seq: Clone + Hash + Eq + Sync,
    Ret: Clone + PartialEq + Send,
{
    pub fn new(num_threads: usize, iterations: usize, concurrent: C, sequential: Seq) -> Self {
        Self {
            num_threads,
            iterations,
            concurrent,
            sequential,
            clock: AtomicU64::new(0),
            _ret: std::marker::PhantomData,
        }
    }

    /// Run `worker` once per thread and check the combined history.
    pub fn run(
        &self,
        worker: fn(usize, &mut ThreadLog<C, Seq, Ret>),
    ) -> Result<LinearizabilityResult, TesterError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()?;

        let histories: Vec<Vec<TimeStamped<Seq, Ret>>> = pool.install(|| {
            (0..self.num_threads)
                .into_par_iter()
                .map(|id| {
                    let mut log = ThreadLog::new(id, self.iterations, &self.concurrent, &self.clock);
                    worker(id, &mut log);
                    log.events
                })
                .collect()
        });

        let threads: Vec<Vec<Operation<Seq, Ret>>> =
            histories.into_iter().map(Self::pair_events).collect();
        debug!(
            "checking {} operations from {} threads",
            threads.iter().map(Vec::len).sum::<usize>(),
            threads.len()
        );

        if self.search(&threads) {
            Ok(LinearizabilityResult::Success)
        } else {
            let mut ops: Vec<&Operation<Seq, Ret>> = threads.iter().flatten().collect();
            ops.sort_by_key(|op| op.invoked);
            Ok(LinearizabilityResult::Failure {
                history: ops.into_iter().map(|op| op.message.clone()).collect(),
            })
        }
    }

    fn pair_events(events: Vec<TimeStamped<Seq, Ret>>) -> Vec<Operation<Seq, Ret>> {
        let mut ops = Vec::with_capacity(events.len() / 2);
        let mut pending = None;
        for stamped in events {
            match stamped.event {
                Event::Invoke(invoke) => pending = Some((stamped.stamp, invoke)),
                Event::Return(ret) => {
                    if let Some((invoked, invoke)) = pending.take() {
                        debug_assert_eq!(invoke.id, ret.id);
                        ops.push(Operation {
                            message: invoke.message,
                            op: invoke.op,
                            arg: invoke.arg,
                            result: ret.result,
                            invoked,
                            returned: stamped.stamp,
                        });
                    }
                }
            }
        }
        ops
    }

    /// Depth-first search for a sequential order consistent with real time.
    ///
    /// A thread's operations linearize in program order, so a search state is the
    /// per-thread progress plus the model state. An operation may go next only if it was
    /// invoked before every other pending operation returned.
    fn search(&self, threads: &[Vec<Operation<Seq, Ret>>]) -> bool {
        let total: usize = threads.iter().map(Vec::len).sum();
        let mut seen: HashSet<(Vec<usize>, Seq)> = HashSet::new();
        let mut stack = vec![(vec![0usize; threads.len()], self.sequential.clone(), 0usize)];

        while let Some((progress, state, done)) = stack.pop() {
            if done == total {
                return true;
            }

            let min_return = threads
                .iter()
                .zip(&progress)
                .filter_map(|(ops, &p)| ops.get(p))
                .map(|op| op.returned)
                .min()
                .unwrap_or(u64::MAX);

            for (thread, ops) in threads.iter().enumerate() {
                let op = match ops.get(progress[thread]) {
                    Some(op) if op.invoked < min_return => op,
                    _ => continue,
                };
                let (next_state, result) = (op.op)(&state, op.arg.clone());
                if result != op.result {
                    continue;
                }
                let mut next_progress = progress.clone();
                next_progress[thread] += 1;
                if seen.insert((next_progress.clone(), next_state.clone())) {
                    stack.push((next_progress, next_state, done + 1));
                }
            }
        }

        false
    }
}
