//! Build tasks and the per-thread state they run with.
//!
//! A [`ChunkBuilderTask`] is a unit of work executed by the [`ChunkBuilder`](super::ChunkBuilder).
//! Tasks receive a mutable [`BuildContext`] owned by the executing thread, so scratch
//! buffers are reused between builds without any cross-thread locking.

use std::cell::RefCell;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::engine_state::rendering::meshing::ChunkBuildBuffers;

/// A unit of work that can be executed on a worker thread.
///
/// # Returns
/// * `Ok(Some(output))` when the task completed
/// * `Ok(None)` when the task noticed its cancellation and gave up; this is not an error
/// * `Err(error)` when the task failed
pub trait ChunkBuilderTask: Send + Sync + 'static {
    type Output: Send + 'static;

    fn execute(
        &self,
        context: &mut BuildContext,
        cancellation: &CancellationToken,
    ) -> anyhow::Result<Option<Self::Output>>;
}

/// Shared flag a task polls at safe points to stop early.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Scratch state reused across builds on a single thread.
pub struct BuildContext {
    pub buffers: ChunkBuildBuffers,
}

impl BuildContext {
    pub fn new() -> Self {
        Self {
            buffers: ChunkBuildBuffers::new(),
        }
    }

    /// Resets the scratch buffers after a build, keeping their allocations.
    pub fn cleanup(&mut self) {
        self.buffers.clear();
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static BUILD_CONTEXT: RefCell<BuildContext> = RefCell::new(BuildContext::new());
}

/// Runs `f` with the calling thread's build context.
///
/// # Panics
/// Panics if called re-entrantly from inside `f`.
#[inline]
pub fn with_build_context<F, R>(f: F) -> R
where
    F: FnOnce(&mut BuildContext) -> R,
{
    BUILD_CONTEXT.with(|context| {
        let mut context = context.borrow_mut();
        f(&mut context)
    })
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::engine_state::rendering::{ChunkMeshFace, RenderPass, Vertex};

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());

        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn build_context_is_per_thread() {
        with_build_context(|context| {
            let vertex = Vertex::new(Point3::new(0, 0, 0), 0, 0, 0);
            context
                .buffers
                .get(RenderPass::SOLID)
                .add_quad(ChunkMeshFace::UP, [vertex; 4]);
        });

        let clean_elsewhere = std::thread::spawn(|| with_build_context(|context| context.buffers.is_clear()))
            .join()
            .unwrap();

        assert!(clean_elsewhere);
        with_build_context(|context| {
            assert!(!context.buffers.is_clear());
            context.cleanup();
            assert!(context.buffers.is_clear());
        });
    }
}
