//! Out-of-band task queue
//!
//! Administrative callbacks are posted here and executed on the consumer thread between
//! two runs of stream dispatch, so they never need to synchronize with the data path.

use crossbeam::queue::SegQueue;

/// A task to be run on a consumer thread
pub type PostTask = Box<dyn FnOnce() + Send + 'static>;

/// Lock-free multi-producer queue of [`PostTask`]s
#[derive(Default)]
pub struct SideChannel {
    tasks: SegQueue<PostTask>,
}

impl SideChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task for the post-handling stage
    pub fn push(&self, task: PostTask) {
        self.tasks.push(task);
    }

    /// Take the oldest queued task, if any
    pub fn try_pop(&self) -> Option<PostTask> {
        self.tasks.pop()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl std::fmt::Debug for SideChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideChannel")
            .field("pending", &self.len())
            .finish()
    }
}
