//! Disruptor façade
//!
//! [`Disruptor`] hides the claim and wait strategy choice behind one type: the builder
//! reads the configuration, picks one of the six claim/wait combinations and hides it
//! behind a [`DisruptorCore`] trait object. Producers are wired in at build time; after
//! that the façade offers direct publishing plus `post`, `stop` and `stats`.

use crate::disruptor::{
    thread_management::validate_core_id, BlockWaitStrategy, BusySpinWaitStrategy, ClaimStrategy,
    Consumer, ConsumerStages, ConsumerStrategy, DisruptorConfig, Executor, InputPayload, Launch,
    MultiProducerClaim, NStageConsumer, Payload, PostTask, Producer, ProducerBarrier, Result,
    RingBuffer, SideChannel, SingleProducerClaim, StageState, WaitStrategy, WaitStrategyKind,
    YieldWaitStrategy,
};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The type-erased disruptor behind the façade
pub trait DisruptorCore<P: Payload>: Send + Sync {
    /// Claim a slot, let `write` fill it, publish it; returns the sequence
    ///
    /// `write` is called exactly once and returns whether the slot holds a valid message.
    fn publish_slot(&self, write: &mut dyn FnMut(&mut P) -> bool) -> i64;

    fn post(&self, task: PostTask);

    fn stop(&self);

    fn cursor(&self) -> i64;

    /// `consumed_to` of every stage, in pipeline order
    fn consumed_to(&self) -> Vec<i64>;

    fn received(&self) -> u64;

    fn capacity(&self) -> usize;
}

struct DisruptorImpl<P, C, W> {
    ring: Arc<RingBuffer<P, C, W>>,
    producer_barrier: ProducerBarrier<P, C, W>,
    pipeline: Mutex<NStageConsumer<P, C, W>>,
    stage_states: Vec<Arc<StageState>>,
    side_channel: Arc<SideChannel>,
    received: AtomicU64,
    stopped: AtomicBool,
}

struct StartParams<'a, K: ?Sized> {
    name: &'a str,
    max_msg_size: usize,
    capacity: usize,
    consumer: Arc<K>,
    stages: ConsumerStages,
    launches: Vec<Launch>,
}

impl<P, C, W> DisruptorImpl<P, C, W>
where
    P: Payload,
    C: ClaimStrategy,
    W: WaitStrategy,
{
    fn start<S, K>(params: StartParams<'_, K>, claim_strategy: C, wait_strategy: W) -> Result<Arc<Self>>
    where
        S: ConsumerStrategy<P>,
        K: Consumer<P> + ?Sized,
    {
        let ring = Arc::new(RingBuffer::new(
            params.name,
            params.max_msg_size,
            params.capacity,
            claim_strategy,
            wait_strategy,
        )?);
        let side_channel = Arc::new(SideChannel::new());

        let pipeline = NStageConsumer::start::<S, K>(
            &ring,
            params.consumer,
            params.stages,
            Arc::clone(&side_channel),
            &params.launches,
        )?;
        let stage_states = pipeline.stage_states();
        let producer_barrier = ring
            .create_producer_barrier(Arc::clone(pipeline.gating_stage()), stage_states.clone());

        Ok(Arc::new(Self {
            ring,
            producer_barrier,
            pipeline: Mutex::new(pipeline),
            stage_states,
            side_channel,
            received: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }))
    }
}

impl<P, C, W> DisruptorCore<P> for DisruptorImpl<P, C, W>
where
    P: Payload,
    C: ClaimStrategy,
    W: WaitStrategy,
{
    fn publish_slot(&self, write: &mut dyn FnMut(&mut P) -> bool) -> i64 {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.producer_barrier.publish_with(write)
    }

    fn post(&self, task: PostTask) {
        self.side_channel.push(task);
        self.ring.wait_strategy().data_available();
    }

    fn stop(&self) {
        let mut pipeline = self.pipeline.lock();
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::info!(disruptor = %self.ring.name(), "stopping disruptor");
            pipeline.stop();
        }
    }

    fn cursor(&self) -> i64 {
        self.ring.get_cursor()
    }

    fn consumed_to(&self) -> Vec<i64> {
        self.stage_states.iter().map(|s| s.consumed_to()).collect()
    }

    fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// A running disruptor: one ring, its consumer stages and the registered producers
///
/// # Type Parameters
/// * `P` - The payload stored in each slot
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use tickring::disruptor::{
///     BytePayload, CallbackProducer, Disruptor, DisruptorConfig, FixedBuffer, Producer,
///     Sequential, WaitStrategyKind,
/// };
///
/// let producer = Arc::new(CallbackProducer::<[u8]>::new());
/// let mut disruptor = Disruptor::<FixedBuffer>::builder(
///     "quotes",
///     DisruptorConfig::with_wait_strategy(WaitStrategyKind::Yield),
/// )
/// .producer(producer.clone())
/// .build::<Sequential, _>(Arc::new(|msg: &FixedBuffer| {
///     assert_eq!(msg.data(), b"tick");
/// }))
/// .unwrap();
///
/// producer.push(b"tick", 0, 1);
/// disruptor.stop();
/// ```
pub struct Disruptor<P: Payload> {
    name: String,
    wait_strategy: WaitStrategyKind,
    core: Arc<dyn DisruptorCore<P>>,
}

impl<P: Payload> Disruptor<P> {
    /// Start building a disruptor
    ///
    /// # Arguments
    /// * `name` - Disruptor name, used for stage thread names and log fields
    /// * `config` - Ring and wait strategy settings
    pub fn builder(name: impl Into<String>, config: DisruptorConfig) -> DisruptorBuilder<P> {
        DisruptorBuilder::new(name, config)
    }

    /// Name given to the builder
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured wait strategy
    pub fn wait_strategy(&self) -> WaitStrategyKind {
        self.wait_strategy
    }

    /// Claim the next slot and fill it in place
    ///
    /// This is the path for values that should be moved rather than copied, such as
    /// [`ObjectPayload::set_object`](crate::disruptor::ObjectPayload::set_object) or
    /// [`BroadcastBuffer::set_shared`](crate::disruptor::BroadcastBuffer::set_shared).
    /// `write` returns whether the slot holds a valid message; invalid slots are
    /// published but skipped by every stage.
    ///
    /// # Returns
    /// The sequence the slot was published at
    pub fn publish_with<F>(&self, write: F) -> i64
    where
        F: FnOnce(&mut P) -> bool,
    {
        let mut write = Some(write);
        self.core.publish_slot(&mut |entry| match write.take() {
            Some(write) => write(entry),
            None => false,
        })
    }

    /// Run `task` once on the post-handling consumer thread, while no stage dispatches
    ///
    /// Tasks posted after [`stop`](Self::stop) are never run.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.post(Box::new(task));
    }

    /// Stop every stage and wait for them to exit; idempotent
    ///
    /// Entries already published are still dispatched before the stages return.
    pub fn stop(&mut self) {
        self.core.stop();
    }

    /// Write the one-line statistics report
    ///
    /// # Errors
    /// Propagates write errors from `out`.
    pub fn stats<O: io::Write + ?Sized>(&self, out: &mut O) -> io::Result<()> {
        writeln!(out, "msgs recv = {}", self.core.received())
    }

    /// Messages published so far
    pub fn received(&self) -> u64 {
        self.core.received()
    }

    /// Last published sequence
    pub fn cursor(&self) -> i64 {
        self.core.cursor()
    }

    /// `consumed_to` of stage `stage` (0-based), if it exists
    pub fn consumed_to(&self, stage: usize) -> Option<i64> {
        self.core.consumed_to().get(stage).copied()
    }

    /// Number of ring slots
    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }
}

impl<P: InputPayload> Disruptor<P> {
    /// Publish directly, as a registered producer would
    ///
    /// # Arguments
    /// * `input` - Message to copy into the next slot
    /// * `receive_time` - Receive timestamp carried with the message
    /// * `id` - Message id carried with the message
    ///
    /// # Returns
    /// The number of bytes of `input` consumed
    pub fn publish(&self, input: &P::Input, receive_time: u64, id: i64) -> usize {
        publish_input(&*self.core, input, receive_time, id)
    }
}

fn publish_input<P: InputPayload>(
    core: &dyn DisruptorCore<P>,
    input: &P::Input,
    receive_time: u64,
    id: i64,
) -> usize {
    core.publish_slot(&mut |entry| entry.set_value(input, receive_time, id));
    P::consumed_len(input)
}

impl<P: Payload> Drop for Disruptor<P> {
    fn drop(&mut self) {
        self.core.stop();
    }
}

impl<P: Payload> std::fmt::Debug for Disruptor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disruptor")
            .field("name", &self.name)
            .field("wait_strategy", &self.wait_strategy)
            .field("capacity", &self.core.capacity())
            .field("cursor", &self.core.cursor())
            .finish()
    }
}

type Registration<P> = Box<dyn FnOnce(&Arc<dyn DisruptorCore<P>>)>;

/// Builder for [`Disruptor`]
pub struct DisruptorBuilder<P: Payload> {
    name: String,
    config: DisruptorConfig,
    stages: ConsumerStages,
    /// Hooks the data callback into each registered producer once the core exists
    producers: Vec<Registration<P>>,
    multi_producer: bool,
    executor: Option<Arc<dyn Executor>>,
}

impl<P: Payload> DisruptorBuilder<P> {
    fn new(name: impl Into<String>, config: DisruptorConfig) -> Self {
        Self {
            name: name.into(),
            config,
            stages: ConsumerStages::One,
            producers: Vec::new(),
            multi_producer: false,
            executor: None,
        }
    }

    /// One or two consumer stages (default one)
    pub fn stages(mut self, stages: ConsumerStages) -> Self {
        self.stages = stages;
        self
    }

    /// Use the multi-producer claim even with a single registered producer
    ///
    /// Needed when [`Disruptor::publish`] is called from several threads.
    pub fn multi_producer(mut self, multi: bool) -> Self {
        self.multi_producer = multi;
        self
    }

    /// Run the stages on `executor` instead of dedicated threads
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Validate the configuration, start the consumer stages and register with every
    /// producer
    ///
    /// # Type Parameters
    /// * `S` - How each stage dispatches to the consumer
    /// * `K` - The consumer
    ///
    /// # Errors
    /// Configuration errors (missing or unknown wait strategy, bad ring exponent,
    /// unavailable core) are reported before any thread is started.
    pub fn build<S, K>(self, consumer: Arc<K>) -> Result<Disruptor<P>>
    where
        S: ConsumerStrategy<P>,
        K: Consumer<P> + ?Sized,
    {
        let wait_strategy = self.config.wait_strategy_kind(&self.name)?;
        let capacity = self.config.capacity()?;
        for &core in &self.config.consumer_cores {
            validate_core_id(core)?;
        }
        if self.executor.is_some() && !self.config.consumer_cores.is_empty() {
            tracing::warn!(
                disruptor = %self.name,
                cores = ?self.config.consumer_cores,
                "stages run on an executor, consumer cores ignored"
            );
        } else if self.config.consumer_cores.len() > self.stages.count() {
            tracing::warn!(
                disruptor = %self.name,
                cores = ?self.config.consumer_cores,
                stages = self.stages.count(),
                "more consumer cores configured than stages, extra cores ignored"
            );
        }

        let launches: Vec<Launch> = (0..self.stages.count())
            .map(|i| match &self.executor {
                Some(executor) => Launch::Executor(Arc::clone(executor)),
                None => Launch::Thread {
                    core: self.config.consumer_cores.get(i).copied(),
                },
            })
            .collect();

        let params = StartParams {
            name: &self.name,
            max_msg_size: self.config.max_msg_size as usize,
            capacity,
            consumer,
            stages: self.stages,
            launches,
        };

        let multi = self.multi_producer || self.producers.len() > 1;
        let core: Arc<dyn DisruptorCore<P>> = match (multi, wait_strategy) {
            (false, WaitStrategyKind::BusySpin) => DisruptorImpl::start::<S, K>(
                params,
                SingleProducerClaim::new(),
                BusySpinWaitStrategy::new(),
            )?,
            (false, WaitStrategyKind::Yield) => DisruptorImpl::start::<S, K>(
                params,
                SingleProducerClaim::new(),
                YieldWaitStrategy::new(),
            )?,
            (false, WaitStrategyKind::Block) => DisruptorImpl::start::<S, K>(
                params,
                SingleProducerClaim::new(),
                BlockWaitStrategy::new(),
            )?,
            (true, WaitStrategyKind::BusySpin) => DisruptorImpl::start::<S, K>(
                params,
                MultiProducerClaim::new(),
                BusySpinWaitStrategy::new(),
            )?,
            (true, WaitStrategyKind::Yield) => DisruptorImpl::start::<S, K>(
                params,
                MultiProducerClaim::new(),
                YieldWaitStrategy::new(),
            )?,
            (true, WaitStrategyKind::Block) => DisruptorImpl::start::<S, K>(
                params,
                MultiProducerClaim::new(),
                BlockWaitStrategy::new(),
            )?,
        };

        let producer_count = self.producers.len();
        for register in self.producers {
            register(&core);
        }

        tracing::info!(
            disruptor = %self.name,
            wait_strategy = %wait_strategy,
            producers = producer_count,
            multi_producer = multi,
            "disruptor started"
        );

        Ok(Disruptor {
            name: self.name,
            wait_strategy,
            core,
        })
    }
}

impl<P: InputPayload> DisruptorBuilder<P> {
    /// Register a producer; with more than one the ring uses the multi-producer claim
    pub fn producer(mut self, producer: Arc<dyn Producer<P::Input>>) -> Self {
        self.producers.push(Box::new(move |core: &Arc<dyn DisruptorCore<P>>| {
            let core = Arc::clone(core);
            producer.register_data_callback(Arc::new(move |input: &P::Input, rcvt: u64, id: i64| {
                publish_input(&*core, input, rcvt, id)
            }));
        }));
        self
    }

    /// Register several producers at once
    pub fn producers<I>(self, producers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Producer<P::Input>>>,
    {
        producers.into_iter().fold(self, Self::producer)
    }
}
