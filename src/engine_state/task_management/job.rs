//! Jobs wrap a task together with its cancellation state and result consumer.
//!
//! A job moves through `QUEUED -> STARTED -> {SUCCEEDED, FAILED}`. It may be cancelled
//! while queued, in which case it never starts, or while running, in which case the
//! task is expected to notice and return `Ok(None)`. Neither path reaches the consumer.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, PoisonError,
};

use anyhow::anyhow;

use super::task::{BuildContext, CancellationToken, ChunkBuilderTask};

/// Outcome delivered to a job's consumer.
#[derive(Debug)]
pub enum ChunkJobResult<T> {
    Succeeded(T),
    Failed(anyhow::Error),
}

impl<T> ChunkJobResult<T> {
    pub fn into_result(self) -> anyhow::Result<T> {
        match self {
            ChunkJobResult::Succeeded(output) => Ok(output),
            ChunkJobResult::Failed(error) => Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChunkJobResult::Succeeded(_))
    }
}

/// Type-erased view of a queued job, shared between the builder's queue and whoever
/// scheduled it.
pub trait ChunkJob: Send + Sync {
    /// Runs the job on the calling thread. Does nothing if the job was cancelled.
    fn execute(&self, context: &mut BuildContext);

    fn cancel(&self);

    fn is_cancelled(&self) -> bool;

    fn is_started(&self) -> bool;

    /// Asynchronous jobs may only be picked up by worker threads; blocking ones may
    /// also be stolen by the thread waiting on them.
    fn is_asynchronous(&self) -> bool;
}

pub type ChunkJobConsumer<T> = Box<dyn FnOnce(ChunkJobResult<T>) + Send>;

pub(crate) struct ChunkJobTyped<T: ChunkBuilderTask> {
    task: T,
    consumer: Mutex<Option<ChunkJobConsumer<T::Output>>>,
    cancellation: CancellationToken,
    started: AtomicBool,
    asynchronous: bool,
}

impl<T: ChunkBuilderTask> ChunkJobTyped<T> {
    pub(crate) fn new(task: T, asynchronous: bool, consumer: ChunkJobConsumer<T::Output>) -> Self {
        Self {
            task,
            consumer: Mutex::new(Some(consumer)),
            cancellation: CancellationToken::new(),
            started: AtomicBool::new(false),
            asynchronous,
        }
    }

    fn deliver(&self, result: ChunkJobResult<T::Output>) {
        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(consumer) = consumer {
            consumer(result);
        }
    }

    /// Drops the consumer without calling it, so anything it captured (such as the
    /// sending half of a channel) is released once the job produces no result.
    fn discard(&self) {
        drop(
            self.consumer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}

impl<T: ChunkBuilderTask> ChunkJob for ChunkJobTyped<T> {
    fn execute(&self, context: &mut BuildContext) {
        if self.cancellation.is_cancelled() {
            self.discard();
            return;
        }

        self.started.store(true, Ordering::Release);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.task.execute(context, &self.cancellation)
        }))
        .unwrap_or_else(|payload| Err(anyhow!("Build task panicked: {}", panic_message(&payload))));

        let result = match outcome {
            Ok(Some(output)) => ChunkJobResult::Succeeded(output),
            Ok(None) => {
                self.discard();
                return;
            }
            Err(error) => {
                log::error!("Chunk build failed: {:#}", error);
                ChunkJobResult::Failed(error)
            }
        };

        self.deliver(result);
    }

    fn cancel(&self) {
        self.cancellation.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    struct Echo(Option<u32>);

    impl ChunkBuilderTask for Echo {
        type Output = u32;

        fn execute(
            &self,
            _context: &mut BuildContext,
            _cancellation: &CancellationToken,
        ) -> anyhow::Result<Option<u32>> {
            Ok(self.0)
        }
    }

    struct Explode;

    impl ChunkBuilderTask for Explode {
        type Output = ();

        fn execute(
            &self,
            _context: &mut BuildContext,
            _cancellation: &CancellationToken,
        ) -> anyhow::Result<Option<()>> {
            panic!("boom");
        }
    }

    fn job<T: ChunkBuilderTask>(task: T) -> (ChunkJobTyped<T>, mpsc::Receiver<ChunkJobResult<T::Output>>) {
        let (sender, receiver) = mpsc::channel();
        let job = ChunkJobTyped::new(
            task,
            true,
            Box::new(move |result| {
                let _ = sender.send(result);
            }),
        );
        (job, receiver)
    }

    #[test]
    fn successful_job_reaches_consumer() {
        let (job, results) = job(Echo(Some(7)));
        job.execute(&mut BuildContext::new());

        assert!(job.is_started());
        assert_eq!(results.try_recv().ok().and_then(|r| r.into_result().ok()), Some(7));
    }

    #[test]
    fn cancelled_before_start_never_runs() {
        let (job, results) = job(Echo(Some(7)));
        job.cancel();
        job.execute(&mut BuildContext::new());

        assert!(!job.is_started());
        assert!(matches!(results.try_recv(), Err(mpsc::TryRecvError::Disconnected)));
    }

    #[test]
    fn cooperative_cancellation_produces_no_result() {
        let (job, results) = job(Echo(None));
        job.execute(&mut BuildContext::new());

        assert!(job.is_started());
        assert!(matches!(results.try_recv(), Err(mpsc::TryRecvError::Disconnected)));
    }

    #[test]
    fn panics_are_reported_as_failures() {
        let (job, results) = job(Explode);
        job.execute(&mut BuildContext::new());

        match results.try_recv() {
            Ok(ChunkJobResult::Failed(error)) => assert!(error.to_string().contains("boom")),
            other => panic!("unexpected result: {:?}", other.map(|r| r.is_success())),
        }
    }
}
