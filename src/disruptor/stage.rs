//! Consumer stages
//!
//! A stage is one consumer loop: wait for entries, run any pending side-channel work,
//! dispatch, then advance its own `consumed_to`. It runs either on a dedicated
//! [`ManagedThread`] or as one long task on an [`Executor`].
//!
//! Side-channel tasks run on the post-handling stage (the last one) only. Before running
//! them it asks every other stage to pause and waits for each to acknowledge, so a task
//! never overlaps stream dispatch anywhere in the pipeline.

use crate::disruptor::{
    ClaimStrategy, Consumer, ConsumerBarrier, ConsumerStrategy, ManagedThread, Payload, Result,
    RingBuffer, Sequence, SideChannel, StageIndex, ThreadBuilder, WaitStrategy,
};
use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Runs blocking closures off the caller's thread
///
/// Lets a stage live on an existing runtime instead of a thread of its own. The closure
/// only returns when the stage is stopped, so it must not be run on an async worker.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

impl Executor for tokio::runtime::Handle {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        // Detached; stage exit is tracked through the stage's own latch.
        drop(self.spawn_blocking(task));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Pending,
    Running,
    Exited,
    Cancelled,
}

/// State of one stage that other threads observe
///
/// Shared with the producer barrier (gating), the downstream stage (progress source) and
/// the post-handling stage (pause handshake).
pub struct StageState {
    name: String,
    consumed_to: Sequence,
    running: AtomicBool,
    pause_requested: AtomicBool,
    paused: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    exited: Condvar,
}

impl StageState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            consumed_to: Sequence::default(),
            running: AtomicBool::new(true),
            pause_requested: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::Pending),
            exited: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last sequence this stage has finished with
    #[inline]
    pub fn consumed_to(&self) -> i64 {
        self.consumed_to.get()
    }

    #[inline]
    pub fn sequence(&self) -> &Sequence {
        &self.consumed_to
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn running_flag(&self) -> &AtomicBool {
        &self.running
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Acknowledged pause: the stage is parked outside dispatch
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn has_exited(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Exited | Lifecycle::Cancelled)
    }

    /// Returns false when the stage was cancelled before it got to run
    pub(crate) fn mark_started(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Pending {
            *lifecycle = Lifecycle::Running;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_exited(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Cancelled {
            *lifecycle = Lifecycle::Exited;
        }
        self.exited.notify_all();
    }

    /// Wait until the loop has returned; cancels it if it never started
    pub(crate) fn wait_for_exit(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Pending {
            *lifecycle = Lifecycle::Cancelled;
            return;
        }
        while *lifecycle == Lifecycle::Running {
            self.exited.wait(&mut lifecycle);
        }
    }

    fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
    }

    fn release_pause(&self) {
        self.pause_requested.store(false, Ordering::SeqCst);
    }

    fn pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    /// Park until the pause request is withdrawn or `handler` is gone
    ///
    /// `paused` is cleared before the request is re-read; a handler that raised the
    /// request in between is therefore always seen and honoured.
    fn park_while_requested(&self, handler: &StageState) {
        while self.pause_requested() {
            self.paused.store(true, Ordering::SeqCst);
            while self.pause_requested() && !handler.has_exited() {
                thread::yield_now();
            }
            self.paused.store(false, Ordering::SeqCst);
            if handler.has_exited() {
                break;
            }
        }
    }
}

impl std::fmt::Debug for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageState")
            .field("name", &self.name)
            .field("consumed_to", &self.consumed_to)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// What a stage does about side-channel tasks
pub enum PostRole {
    /// Runs the tasks once every stage in `others` has paused or exited
    Handler { others: Vec<Arc<StageState>> },
    /// Parks while `handler` runs tasks
    Yielder { handler: Arc<StageState> },
}

/// Everything one stage loop needs, moved onto its thread
pub struct StageLoop<P, S, K: ?Sized, C, W> {
    pub state: Arc<StageState>,
    pub barrier: ConsumerBarrier<P, C, W>,
    pub strategy: S,
    pub consumer: Arc<K>,
    pub index: StageIndex,
    pub side_channel: Arc<SideChannel>,
    pub role: PostRole,
    /// A later stage waits on this one's `consumed_to`
    pub has_downstream: bool,
}

impl<P, S, K, C, W> StageLoop<P, S, K, C, W>
where
    P: Payload,
    S: ConsumerStrategy<P>,
    K: Consumer<P> + ?Sized,
    C: ClaimStrategy,
    W: WaitStrategy,
{
    fn run(mut self) {
        if !self.state.mark_started() {
            return;
        }
        let state = Arc::clone(&self.state);
        let _exit = ExitGuard(&state);

        tracing::debug!(stage = %state.name(), strategy = S::name(), "consumer stage started");

        let mut next = state.consumed_to() + 1;
        while state.is_running() {
            let available = self
                .barrier
                .wait_for(next, state.running_flag(), &self.side_channel);

            self.handle_post();

            if available >= next {
                next = self.consume(next, available);
            }
        }

        // Entries published before the stop are still delivered.
        let available = self.barrier.progress().get();
        if available >= next {
            next = self.consume(next, available);
        }

        tracing::debug!(stage = %state.name(), consumed_to = next - 1, "consumer stage exited");
    }

    fn consume(&mut self, next: i64, available: i64) -> i64 {
        let consumer = &*self.consumer;
        let index = self.index;
        self.strategy
            .consume(&self.barrier, next, available, |payload| index.dispatch(consumer, payload));

        self.state.consumed_to.set(available);
        if self.has_downstream {
            self.barrier.interrupt();
        }
        available + 1
    }

    fn handle_post(&self) {
        match &self.role {
            PostRole::Handler { others } => {
                if self.side_channel.is_empty() {
                    return;
                }
                for other in others {
                    other.request_pause();
                }
                for other in others {
                    while !(other.is_paused() || other.has_exited()) {
                        thread::yield_now();
                    }
                }
                while let Some(task) = self.side_channel.try_pop() {
                    task();
                }
                for other in others {
                    other.release_pause();
                }
            }
            PostRole::Yielder { handler } => self.state.park_while_requested(handler),
        }
    }
}

/// Marks the stage exited even if a callback panics
struct ExitGuard<'a>(&'a StageState);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.mark_exited();
    }
}

/// Where a stage loop runs
#[derive(Clone)]
pub enum Launch {
    Thread { core: Option<usize> },
    Executor(Arc<dyn Executor>),
}

/// Handle to a running stage
pub struct ConsumerStage<P, C, W> {
    state: Arc<StageState>,
    ring: Arc<RingBuffer<P, C, W>>,
    thread: Option<ManagedThread>,
    _payload: PhantomData<fn() -> P>,
}

impl<P, C, W> ConsumerStage<P, C, W>
where
    P: Payload,
    C: ClaimStrategy,
    W: WaitStrategy,
{
    /// Start `stage_loop` according to `launch`
    ///
    /// # Errors
    /// Fails if the core is not available or the thread cannot be spawned.
    pub fn launch<S, K>(stage_loop: StageLoop<P, S, K, C, W>, launch: Launch) -> Result<Self>
    where
        S: ConsumerStrategy<P>,
        K: Consumer<P> + ?Sized,
    {
        let state = Arc::clone(&stage_loop.state);
        let ring = Arc::clone(stage_loop.barrier.ring());
        tracing::info!(
            stage = %state.name(),
            index = ?stage_loop.index,
            strategy = S::name(),
            "consumer stage created"
        );

        let thread = match launch {
            Launch::Thread { core } => {
                let mut builder = ThreadBuilder::new(state.name());
                if let Some(core) = core {
                    builder = builder.pin_at_core(core)?;
                }
                Some(builder.spawn(move || stage_loop.run())?)
            }
            Launch::Executor(executor) => {
                executor.execute(Box::new(move || stage_loop.run()));
                None
            }
        };

        Ok(Self {
            state,
            ring,
            thread,
            _payload: PhantomData,
        })
    }

    pub fn state(&self) -> &Arc<StageState> {
        &self.state
    }

    /// Stop the loop and wait for it to return; idempotent
    pub fn stop(&mut self) {
        self.state.request_stop();
        self.ring.wait_strategy().data_available();

        match self.thread.take() {
            Some(thread) => {
                if thread.join().is_err() {
                    tracing::error!(stage = %self.state.name(), "consumer stage panicked");
                }
            }
            None => self.state.wait_for_exit(),
        }
    }
}

impl<P, C, W> Drop for ConsumerStage<P, C, W> {
    fn drop(&mut self) {
        self.state.request_stop();
        if let Some(thread) = self.thread.take() {
            drop(thread);
        } else {
            self.state.wait_for_exit();
        }
    }
}
