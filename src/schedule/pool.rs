//! The per-phase worker pool and the driver loop shared by all phases.
use crate::error::AssemblyError;
use crate::schedule::{JobDispenser, Phase};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Thread settings for assembly phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// Number of worker threads started for each phase. Must be at least 1.
    pub num_threads: usize,
    /// Worker threads are named `{thread_name_prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            thread_name_prefix: "parasm-worker".to_string(),
        }
    }
}

impl ThreadConfig {
    pub fn with_num_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), AssemblyError> {
        if self.num_threads == 0 {
            return Err(AssemblyError::invalid_config("the number of threads must be at least 1"));
        }
        Ok(())
    }
}

/// A fixed-size set of worker threads that live for the duration of one phase.
///
/// Dropping the pool shuts down its threads.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(config: &ThreadConfig) -> Result<Self, AssemblyError> {
        config.validate()?;
        let prefix = config.thread_name_prefix.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `worker` exactly once on every thread of the pool and blocks until all of them
    /// have returned. The argument passed to `worker` is the index of the thread.
    pub fn run<R, F>(&self, worker: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync,
    {
        self.pool.broadcast(|ctx| worker(ctx.index()))
    }
}

#[derive(Debug)]
struct Failure {
    element: usize,
    source: eyre::Report,
}

/// Handle given to each worker of a phase.
///
/// Workers claim units through [`claim`](Self::claim) and report kernel failures through
/// [`fail`](Self::fail). The first reported failure wins and cancels the dispenser, so that
/// every other worker stops at its next claim.
#[derive(Debug)]
pub struct WorkerContext<'a> {
    worker_index: usize,
    claimed: Cell<usize>,
    dispenser: &'a JobDispenser,
    failure: &'a Mutex<Option<Failure>>,
}

impl<'a> WorkerContext<'a> {
    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    pub fn claim(&self) -> Option<usize> {
        let index = self.dispenser.claim()?;
        self.claimed.set(self.claimed.get() + 1);
        Some(index)
    }

    /// The number of units claimed by this worker so far.
    pub fn num_claimed(&self) -> usize {
        self.claimed.get()
    }

    pub fn fail(&self, element: usize, source: eyre::Report) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(Failure { element, source });
            }
        }
        self.dispenser.cancel();
    }
}

/// Starts a fresh pool, runs `worker` on every thread against a shared dispenser over
/// `0 .. total` and joins the pool.
///
/// Returns the per-worker results in thread order, or the first failure reported by a worker.
pub fn run_phase<R, F>(
    phase: Phase,
    config: &ThreadConfig,
    total: usize,
    worker: F,
) -> Result<Vec<R>, AssemblyError>
where
    R: Send,
    F: Fn(&WorkerContext) -> R + Sync,
{
    let pool = WorkerPool::new(config)?;
    let dispenser = JobDispenser::new(total);
    let failure = Mutex::new(None);
    debug!("{phase}: {total} units on {} threads", pool.num_threads());

    let results = pool.run(|worker_index| {
        let context = WorkerContext {
            worker_index,
            claimed: Cell::new(0),
            dispenser: &dispenser,
            failure: &failure,
        };
        let result = worker(&context);
        trace!(
            "{phase}: worker {} processed {} units",
            context.worker_index(),
            context.num_claimed()
        );
        result
    });

    if let Some(Failure { element, source }) = failure.into_inner() {
        warn!(
            "{phase} aborted after {} of {total} units: element {element} failed: {source}",
            dispenser.num_claimed()
        );
        return Err(AssemblyError::Kernel {
            phase,
            element,
            source: source.into(),
        });
    }

    debug!("{phase}: done");
    Ok(results)
}
