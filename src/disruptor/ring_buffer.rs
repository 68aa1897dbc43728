//! Ring Buffer Implementation
//!
//! The ring is a pre-allocated arena of payload slots indexed by `sequence & mask`, plus
//! the published cursor and one instance each of a claim and a wait strategy. Nothing
//! on the ring blocks: waiting is delegated to the wait strategy, claiming to the claim
//! strategy, and slot ownership moves between threads purely through sequence numbers.

use crate::disruptor::{
    is_power_of_two, ClaimStrategy, ConsumerBarrier, DisruptorError, Payload, ProducerBarrier,
    Result, Sequence, StageState, WaitStrategy,
};
use std::cell::UnsafeCell;
use std::sync::Arc;

/// The core ring buffer for storing payloads
///
/// # Type Parameters
/// * `P` - The payload stored in each slot
/// * `C` - The claim strategy (single or multi producer)
/// * `W` - The wait strategy used by consumers
pub struct RingBuffer<P, C, W> {
    /// Highest published sequence
    cursor: Sequence,
    /// Mask for fast modulo operations (capacity - 1)
    index_mask: i64,
    name: String,
    slots: Box<[UnsafeCell<P>]>,
    claim_strategy: C,
    wait_strategy: W,
}

impl<P, C, W> RingBuffer<P, C, W>
where
    P: Payload,
    C: ClaimStrategy,
    W: WaitStrategy,
{
    /// Create a new ring buffer with every slot pre-constructed
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if capacity is not a power of 2
    pub fn new(
        name: impl Into<String>,
        max_msg_size: usize,
        capacity: usize,
        claim_strategy: C,
        wait_strategy: W,
    ) -> Result<Self> {
        if !is_power_of_two(capacity) {
            return Err(DisruptorError::InvalidBufferSize(capacity));
        }

        let slots: Box<[UnsafeCell<P>]> = (0..capacity)
            .map(|_| UnsafeCell::new(P::with_capacity(max_msg_size)))
            .collect();

        let name = name.into();
        tracing::info!(
            disruptor = %name,
            max_msg_size,
            ring_size = capacity,
            claim_strategy = claim_strategy.name(),
            wait_strategy = wait_strategy.name(),
            "ring buffer created"
        );

        Ok(Self {
            cursor: Sequence::default(),
            index_mask: (capacity - 1) as i64,
            name,
            slots,
            claim_strategy,
            wait_strategy,
        })
    }

    /// Disruptor name, used in log fields and stage names
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots, always a power of 2
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Last published sequence (acquire)
    #[inline]
    pub fn get_cursor(&self) -> i64 {
        self.cursor.get()
    }

    /// The cursor itself, for use as a progress source
    #[inline]
    pub fn cursor(&self) -> &Sequence {
        &self.cursor
    }

    /// Make `sequence` visible to consumers (release)
    ///
    /// Only call once the slot at `sequence & mask` is fully written.
    #[inline]
    pub fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
    }

    /// How producers claim sequences on this ring
    pub fn claim_strategy(&self) -> &C {
        &self.claim_strategy
    }

    /// How consumers wait for published sequences
    pub fn wait_strategy(&self) -> &W {
        &self.wait_strategy
    }

    #[inline]
    fn index(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    /// Shared access to the slot for `sequence`
    ///
    /// # Safety
    /// The caller must own `sequence` through the sequence protocol: no producer may be
    /// writing that slot for the lifetime of the returned reference.
    #[cfg(test)]
    pub(crate) unsafe fn slot(&self, sequence: i64) -> &P {
        &*self.slots[self.index(sequence)].get()
    }

    /// Exclusive access to the slot for `sequence`
    ///
    /// # Safety
    /// The caller must be the only thread touching that slot: a producer between claim and
    /// publish, or the single stage currently holding the sequence.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slot_mut(&self, sequence: i64) -> &mut P {
        &mut *self.slots[self.index(sequence)].get()
    }

    /// Create the producer-side view, gated on the last stage of the pipeline
    pub fn create_producer_barrier(
        self: &Arc<Self>,
        gating_stage: Arc<StageState>,
        all_stages: Vec<Arc<StageState>>,
    ) -> ProducerBarrier<P, C, W> {
        ProducerBarrier::new(Arc::clone(self), gating_stage, all_stages)
    }

    /// Create a consumer-side view
    ///
    /// With `upstream` set, waits track that stage's `consumed_to` instead of the cursor.
    pub fn create_consumer_barrier(
        self: &Arc<Self>,
        upstream: Option<Arc<StageState>>,
    ) -> ConsumerBarrier<P, C, W> {
        ConsumerBarrier::new(Arc::clone(self), upstream)
    }
}

impl<P, C, W> std::fmt::Debug for RingBuffer<P, C, W>
where
    C: ClaimStrategy,
    W: WaitStrategy,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("name", &self.name)
            .field("capacity", &self.slots.len())
            .field("cursor", &self.cursor)
            .field("claim_strategy", &self.claim_strategy.name())
            .field("wait_strategy", &self.wait_strategy.name())
            .finish()
    }
}

// SAFETY: slots are only reached through `slot`/`slot_mut`, whose callers hold the
// sequence being accessed; the cursor's release/acquire pairing and every stage's
// `consumed_to` order all cross-thread hand-offs of a slot.
unsafe impl<P: Send + Sync, C: Send + Sync, W: Send + Sync> Sync for RingBuffer<P, C, W> {}
unsafe impl<P: Send, C: Send, W: Send> Send for RingBuffer<P, C, W> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{BusySpinWaitStrategy, FixedBuffer, InputPayload, SingleProducerClaim};

    type TestRing = RingBuffer<FixedBuffer, SingleProducerClaim, BusySpinWaitStrategy>;

    fn ring(capacity: usize) -> Result<TestRing> {
        RingBuffer::new(
            "test",
            64,
            capacity,
            SingleProducerClaim::new(),
            BusySpinWaitStrategy::new(),
        )
    }

    #[test]
    fn test_ring_buffer_creation() {
        let ring = ring(8).unwrap();
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.get_cursor(), -1);
        assert_eq!(ring.name(), "test");
    }

    #[test]
    fn test_invalid_capacity_is_rejected() {
        assert!(matches!(
            ring(12),
            Err(DisruptorError::InvalidBufferSize(12))
        ));
        assert!(matches!(ring(0), Err(DisruptorError::InvalidBufferSize(0))));
    }

    #[test]
    fn test_sequences_wrap_onto_same_slot() {
        let ring = ring(4).unwrap();
        unsafe {
            ring.slot_mut(1).set_value(b"first", 0, 1);
            assert_eq!(crate::disruptor::BytePayload::data(ring.slot(5)), b"first");
            ring.slot_mut(9).set_value(b"third", 0, 3);
            assert_eq!(crate::disruptor::BytePayload::data(ring.slot(1)), b"third");
        }
    }

    #[test]
    fn test_publish_moves_cursor() {
        let ring = ring(4).unwrap();
        ring.publish(0);
        assert_eq!(ring.get_cursor(), 0);
        ring.publish(1);
        assert_eq!(ring.cursor().get(), 1);
    }
}
