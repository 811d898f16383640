//! # Task Management System
//!
//! This module provides the worker pool that turns block data into mesh geometry off
//! the render thread.
//!
//! ## Architecture Overview
//!
//! - [`ChunkBuilder`]: owns the worker threads and the shared job queue
//! - [`ChunkBuilderTask`]: a unit of work producing an output, or nothing if cancelled
//! - [`ChunkJob`]: a scheduled task with its cancellation flag and result consumer
//! - [`BuildContext`]: scratch state owned by each thread, see [`with_build_context`]
//!
//! Workers block on a condition variable until a job is queued or the builder shuts
//! down. Results are handed to the consumer given at scheduling time; the render
//! thread usually passes a closure that sends into a channel it drains every frame.
//!
//! ## Job Lifecycle
//! 1. A task is wrapped into a job and queued via [`ChunkBuilder::schedule_task`]
//! 2. A worker (or the render thread through [`ChunkBuilder::steal_blocking_task`])
//!    takes the job from the front of the queue
//! 3. The task runs with the thread's [`BuildContext`]; panics and errors are caught
//!    and reported to the consumer as [`ChunkJobResult::Failed`]
//! 4. Cancelled jobs are skipped, and tasks that bail out report nothing
//!
//! ## Performance Considerations
//! - The queue lock is only held to push or pop a job, never while a task runs
//! - Scheduling budgets leave at most one queued job per idle worker, keeping the queue
//!   short so newer requests are not stuck behind stale ones

pub mod job;
pub mod task;

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Condvar, Mutex, MutexGuard, PoisonError,
};
use std::thread::{self, JoinHandle, ThreadId};

use anyhow::Context;

pub use job::{ChunkJob, ChunkJobConsumer, ChunkJobResult};
pub use task::{with_build_context, BuildContext, CancellationToken, ChunkBuilderTask};

use job::ChunkJobTyped;

/// Upper bound on the number of worker threads.
pub const MAX_THREAD_COUNT: usize = 10;

struct BuilderShared {
    queue: Mutex<VecDeque<Arc<dyn ChunkJob>>>,
    job_available: Condvar,
    running: AtomicBool,
    busy_threads: AtomicUsize,
}

impl BuilderShared {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Arc<dyn ChunkJob>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a job is available. Returns `None` once the builder stops.
    fn wait_for_next_job(&self) -> Option<Arc<dyn ChunkJob>> {
        let mut queue = self.lock_queue();

        loop {
            if !self.running.load(Ordering::Acquire) {
                return None;
            }

            if let Some(job) = queue.pop_front() {
                return Some(job);
            }

            queue = self
                .job_available
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// A fixed pool of worker threads executing [`ChunkBuilderTask`]s.
///
/// The builder itself is owned by the render thread: only that thread may steal
/// blocking work or shut the pool down.
pub struct ChunkBuilder {
    shared: Arc<BuilderShared>,
    threads: Vec<JoinHandle<()>>,
    owner: ThreadId,
}

impl ChunkBuilder {
    /// Starts the worker threads.
    ///
    /// # Arguments
    /// * `requested_threads` - Number of workers to start; `0` selects
    ///   [`ChunkBuilder::optimal_thread_count`]
    ///
    /// # Errors
    /// Fails if a worker thread cannot be spawned.
    pub fn new(requested_threads: usize) -> anyhow::Result<Self> {
        let thread_count = Self::thread_count(requested_threads);
        let shared = Arc::new(BuilderShared {
            queue: Mutex::new(VecDeque::new()),
            job_available: Condvar::new(),
            running: AtomicBool::new(true),
            busy_threads: AtomicUsize::new(0),
        });

        let mut builder = ChunkBuilder {
            shared,
            threads: Vec::with_capacity(thread_count),
            owner: thread::current().id(),
        };

        for index in 0..thread_count {
            let shared = builder.shared.clone();
            let worker = thread::Builder::new()
                .name(format!("Chunk Render Task Executor #{}", index))
                .spawn(move || worker_loop(&shared))
                .with_context(|| format!("failed to spawn chunk builder thread #{}", index))?;

            builder.threads.push(worker);
        }

        log::info!("Started {} worker threads", builder.threads.len());

        Ok(builder)
    }

    /// Queues a task for execution.
    ///
    /// # Arguments
    /// * `task` - The work to run
    /// * `asynchronous` - `false` marks a job some thread will wait on, which lets
    ///   [`ChunkBuilder::steal_blocking_task`] pick it up
    /// * `consumer` - Receives the result on whichever thread ran the job
    ///
    /// # Returns
    /// A handle that can be used to cancel the job.
    ///
    /// # Panics
    /// Panics if the builder has been shut down.
    pub fn schedule_task<T, F>(&self, task: T, asynchronous: bool, consumer: F) -> Arc<dyn ChunkJob>
    where
        T: ChunkBuilderTask,
        F: FnOnce(ChunkJobResult<T::Output>) + Send + 'static,
    {
        assert!(self.is_running(), "Executor is stopped");

        let job: Arc<dyn ChunkJob> = Arc::new(ChunkJobTyped::new(task, asynchronous, Box::new(consumer)));

        self.shared.lock_queue().push_back(job.clone());
        self.shared.job_available.notify_one();

        job
    }

    /// Runs one queued blocking job on the calling thread, using that thread's own
    /// build context. Returns `false` if there was nothing to steal.
    ///
    /// # Panics
    /// Panics if called from any thread other than the one that created the builder.
    pub fn steal_blocking_task(&self) -> bool {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "Blocking tasks may only be stolen by the thread owning the builder"
        );

        let job = {
            let mut queue = self.shared.lock_queue();
            queue
                .iter()
                .position(|job| !job.is_asynchronous())
                .and_then(|index| queue.remove(index))
        };

        match job {
            Some(job) => {
                with_build_context(|context| {
                    job.execute(context);
                    context.cleanup();
                });
                true
            }
            None => false,
        }
    }

    /// Stops all workers, waits for them to exit and cancels every job still queued.
    ///
    /// # Panics
    /// Panics if the builder is not running.
    pub fn shutdown(&mut self) {
        assert!(self.is_running(), "Worker threads are not running");

        {
            let _queue = self.shared.lock_queue();
            self.shared.running.store(false, Ordering::Release);
        }
        self.shared.job_available.notify_all();

        for worker in self.threads.drain(..) {
            if worker.join().is_err() {
                log::error!("Chunk builder thread exited with a panic");
            }
        }

        let remaining: Vec<_> = self.shared.lock_queue().drain(..).collect();
        for job in &remaining {
            job.cancel();
        }

        log::info!(
            "Stopped worker threads, cancelled {} queued jobs",
            remaining.len()
        );
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn is_build_queue_empty(&self) -> bool {
        self.shared.lock_queue().is_empty()
    }

    /// Number of jobs waiting for a worker.
    pub fn scheduled_job_count(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Number of workers currently executing a job.
    pub fn busy_thread_count(&self) -> usize {
        self.shared.busy_threads.load(Ordering::Acquire)
    }

    pub fn total_thread_count(&self) -> usize {
        self.threads.len()
    }

    /// How many more jobs may be queued this frame: one per worker not already
    /// accounted for by a queued job.
    pub fn scheduling_budget(&self) -> usize {
        self.total_thread_count()
            .saturating_sub(self.scheduled_job_count())
    }

    /// Thread count favouring most cores on small machines while leaving some
    /// headroom for the render thread on large ones.
    pub fn optimal_thread_count() -> usize {
        let cores = Self::max_thread_count();
        (cores / 3).max(cores.saturating_sub(6)).clamp(1, MAX_THREAD_COUNT)
    }

    fn max_thread_count() -> usize {
        thread::available_parallelism()
            .map(|cores| cores.get())
            .unwrap_or(1)
    }

    fn thread_count(requested: usize) -> usize {
        if requested == 0 {
            Self::optimal_thread_count()
        } else {
            requested.min(Self::max_thread_count()).max(1)
        }
    }
}

impl Drop for ChunkBuilder {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}

fn worker_loop(shared: &BuilderShared) {
    while let Some(job) = shared.wait_for_next_job() {
        shared.busy_threads.fetch_add(1, Ordering::AcqRel);

        with_build_context(|context| {
            job.execute(context);
            context.cleanup();
        });

        shared.busy_threads.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    /// Blocks until the shared gate opens.
    struct Gated {
        gate: Arc<(Mutex<bool>, Condvar)>,
        started: mpsc::Sender<()>,
        value: u32,
    }

    impl ChunkBuilderTask for Gated {
        type Output = u32;

        fn execute(
            &self,
            _context: &mut BuildContext,
            _cancellation: &CancellationToken,
        ) -> anyhow::Result<Option<u32>> {
            let _ = self.started.send(());

            let (open, signal) = &*self.gate;
            let mut open = open.lock().unwrap();
            while !*open {
                open = signal.wait(open).unwrap();
            }

            Ok(Some(self.value))
        }
    }

    struct Failing;

    impl ChunkBuilderTask for Failing {
        type Output = ();

        fn execute(
            &self,
            _context: &mut BuildContext,
            _cancellation: &CancellationToken,
        ) -> anyhow::Result<Option<()>> {
            anyhow::bail!("no block data")
        }
    }

    struct Immediate(u32);

    impl ChunkBuilderTask for Immediate {
        type Output = u32;

        fn execute(
            &self,
            _context: &mut BuildContext,
            _cancellation: &CancellationToken,
        ) -> anyhow::Result<Option<u32>> {
            Ok(Some(self.0))
        }
    }

    #[test]
    fn workers_run_jobs_concurrently_up_to_thread_count() {
        let builder = ChunkBuilder::new(2).unwrap();
        let threads = builder.total_thread_count();
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let (started_tx, started_rx) = mpsc::channel();
        let (results_tx, results_rx) = mpsc::channel();

        for value in 0..5 {
            let results = results_tx.clone();
            builder.schedule_task(
                Gated {
                    gate: gate.clone(),
                    started: started_tx.clone(),
                    value,
                },
                true,
                move |result| {
                    let _ = results.send(result.into_result().unwrap());
                },
            );
        }

        for _ in 0..threads {
            started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        assert_eq!(builder.busy_thread_count(), threads);
        assert_eq!(builder.scheduled_job_count(), 5 - threads);
        assert_eq!(builder.scheduling_budget(), threads.saturating_sub(5 - threads));

        {
            let (open, signal) = &*gate;
            *open.lock().unwrap() = true;
            signal.notify_all();
        }

        let mut values: Vec<u32> = (0..5)
            .map(|_| results_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        values.sort_unstable();

        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert!(builder.is_build_queue_empty());
    }

    #[test]
    fn failures_are_reported_to_the_consumer() {
        let builder = ChunkBuilder::new(1).unwrap();
        let (tx, rx) = mpsc::channel();

        builder.schedule_task(Failing, true, move |result| {
            let _ = tx.send(result.is_success());
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).ok(), Some(false));
    }

    #[test]
    fn steal_runs_blocking_job_on_the_calling_thread() {
        let mut builder = ChunkBuilder::new(1).unwrap();
        builder.shutdown();

        // Restart with a queue nobody drains so the steal is deterministic.
        let shared = builder.shared.clone();
        shared.running.store(true, Ordering::Release);

        let (tx, rx) = mpsc::channel();
        builder.schedule_task(Immediate(1), true, |_| {});
        builder.schedule_task(Immediate(2), false, move |result| {
            let _ = tx.send((thread::current().id(), result.into_result().unwrap()));
        });

        assert!(builder.steal_blocking_task());
        assert_eq!(rx.try_recv().ok(), Some((thread::current().id(), 2)));
        assert_eq!(builder.scheduled_job_count(), 1);
        assert!(!builder.steal_blocking_task());
    }

    #[test]
    fn shutdown_cancels_queued_jobs() {
        let mut builder = ChunkBuilder::new(1).unwrap();
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let (started_tx, started_rx) = mpsc::channel();

        builder.schedule_task(
            Gated {
                gate: gate.clone(),
                started: started_tx.clone(),
                value: 0,
            },
            true,
            |_| {},
        );
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let queued = builder.schedule_task(Immediate(1), true, |_| {});

        {
            let (open, signal) = &*gate;
            *open.lock().unwrap() = true;
            signal.notify_all();
        }
        builder.shutdown();

        assert!(!builder.is_running());
        assert!(queued.is_cancelled() || queued.is_started());
        assert!(builder.is_build_queue_empty());
    }

    #[test]
    #[should_panic(expected = "Worker threads are not running")]
    fn shutting_down_twice_panics() {
        let mut builder = ChunkBuilder::new(1).unwrap();
        builder.shutdown();
        builder.shutdown();
    }

    #[test]
    #[should_panic(expected = "Executor is stopped")]
    fn scheduling_on_a_stopped_builder_panics() {
        let mut builder = ChunkBuilder::new(1).unwrap();
        builder.shutdown();
        builder.schedule_task(Immediate(0), true, |_| {});
    }

    #[test]
    fn optimal_thread_count_is_clamped() {
        let count = ChunkBuilder::optimal_thread_count();
        assert!((1..=MAX_THREAD_COUNT).contains(&count));
    }
}
