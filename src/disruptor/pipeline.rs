//! One- and two-stage consumer pipelines
//!
//! Stage 1 waits on the ring cursor; stage 2 (when present) waits on stage 1's
//! `consumed_to`, so it only sees entries stage 1 is done with. Producers are gated on
//! the last stage. Stage threads are named `<disruptor>.c1` and `<disruptor>.c2`.

use crate::disruptor::{
    ClaimStrategy, Consumer, ConsumerStage, ConsumerStrategy, Launch, Payload, PostRole, Result,
    RingBuffer, SideChannel, StageIndex, StageLoop, StageState, WaitStrategy,
};
use std::sync::Arc;

/// Number of stages in the consumer pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerStages {
    #[default]
    One,
    Two,
}

impl ConsumerStages {
    pub fn count(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// The running stages of one disruptor, in pipeline order
pub struct NStageConsumer<P, C, W> {
    stages: Vec<ConsumerStage<P, C, W>>,
    /// The last stage; producers may not lap it
    gating: Arc<StageState>,
}

impl<P, C, W> NStageConsumer<P, C, W>
where
    P: Payload,
    C: ClaimStrategy,
    W: WaitStrategy,
{
    /// Start every stage
    ///
    /// `launches` supplies one launch target per stage; a stage without an entry gets an
    /// unpinned thread. If a later stage fails to start, the ones already running are
    /// stopped before the error is returned.
    ///
    /// # Errors
    /// Thread spawn or core pinning failures.
    pub fn start<S, K>(
        ring: &Arc<RingBuffer<P, C, W>>,
        consumer: Arc<K>,
        stage_count: ConsumerStages,
        side_channel: Arc<SideChannel>,
        launches: &[Launch],
    ) -> Result<Self>
    where
        S: ConsumerStrategy<P>,
        K: Consumer<P> + ?Sized,
    {
        let launch_for = |i: usize| {
            launches
                .get(i)
                .cloned()
                .unwrap_or(Launch::Thread { core: None })
        };

        let c1 = Arc::new(StageState::new(format!("{}.{}", ring.name(), StageIndex::First.suffix())));

        let pipeline = match stage_count {
            ConsumerStages::One => {
                let gating = Arc::clone(&c1);
                let only = ConsumerStage::launch(
                    StageLoop {
                        state: c1,
                        barrier: ring.create_consumer_barrier(None),
                        strategy: S::default(),
                        consumer,
                        index: StageIndex::First,
                        side_channel,
                        role: PostRole::Handler { others: Vec::new() },
                        has_downstream: false,
                    },
                    launch_for(0),
                )?;
                Self {
                    stages: vec![only],
                    gating,
                }
            }
            ConsumerStages::Two => {
                let c2 = Arc::new(StageState::new(format!(
                    "{}.{}",
                    ring.name(),
                    StageIndex::Second.suffix()
                )));
                let gating = Arc::clone(&c2);

                let first = ConsumerStage::launch(
                    StageLoop {
                        state: Arc::clone(&c1),
                        barrier: ring.create_consumer_barrier(None),
                        strategy: S::default(),
                        consumer: Arc::clone(&consumer),
                        index: StageIndex::First,
                        side_channel: Arc::clone(&side_channel),
                        role: PostRole::Yielder {
                            handler: Arc::clone(&c2),
                        },
                        has_downstream: true,
                    },
                    launch_for(0),
                )?;

                // On failure `first` is dropped here, which stops it.
                let second = ConsumerStage::launch(
                    StageLoop {
                        state: c2,
                        barrier: ring.create_consumer_barrier(Some(Arc::clone(&c1))),
                        strategy: S::default(),
                        consumer,
                        index: StageIndex::Second,
                        side_channel,
                        role: PostRole::Handler { others: vec![c1] },
                        has_downstream: false,
                    },
                    launch_for(1),
                )?;
                Self {
                    stages: vec![first, second],
                    gating,
                }
            }
        };

        tracing::info!(
            disruptor = %ring.name(),
            stages = stage_count.count(),
            consumer_strategy = S::name(),
            "consumer pipeline started"
        );

        Ok(pipeline)
    }

    /// Stage states in pipeline order
    pub fn stage_states(&self) -> Vec<Arc<StageState>> {
        self.stages.iter().map(|stage| Arc::clone(stage.state())).collect()
    }

    /// State of the last stage, which producers are gated on
    pub fn gating_stage(&self) -> &Arc<StageState> {
        &self.gating
    }

    /// Number of running stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false: a pipeline has at least one stage
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stop every stage, upstream first so downstream stages see its final progress
    pub fn stop(&mut self) {
        for stage in &mut self.stages {
            stage.stop();
        }
    }
}
