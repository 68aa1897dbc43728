//! Producer and consumer barriers
//!
//! Thin views over one ring. A [`ProducerBarrier`] can only claim, write and publish;
//! a [`ConsumerBarrier`] can only wait and read. Each barrier carries the progress
//! source it coordinates with: producers are gated on the last stage of the pipeline,
//! consumers wait either on the cursor or on their upstream stage.

use crate::disruptor::{
    ClaimStrategy, Payload, RingBuffer, Sequence, SideChannel, StageState, WaitStrategy,
};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

const NEVER_BLOCKED: i64 = i64::MIN;

/// Producer-side view of a ring
pub struct ProducerBarrier<P, C, W> {
    ring: Arc<RingBuffer<P, C, W>>,
    /// Stage whose `consumed_to` bounds how far producers may run ahead
    gating_stage: Arc<StageState>,
    all_stages: Vec<Arc<StageState>>,
    /// Last sequence whose claim had to wait for the gating stage
    last_blocked: AtomicI64,
}

impl<P, C, W> ProducerBarrier<P, C, W>
where
    P: Payload,
    C: ClaimStrategy,
    W: WaitStrategy,
{
    pub(crate) fn new(
        ring: Arc<RingBuffer<P, C, W>>,
        gating_stage: Arc<StageState>,
        all_stages: Vec<Arc<StageState>>,
    ) -> Self {
        Self {
            ring,
            gating_stage,
            all_stages,
            last_blocked: AtomicI64::new(NEVER_BLOCKED),
        }
    }

    /// Claim a slot, let `write` fill it, then publish it
    ///
    /// `write` returns whether the slot holds a valid message; invalid slots are still
    /// published (the cursor advances) but every consumer skips them.
    ///
    /// # Returns
    /// The sequence the entry was published at
    pub fn publish_with<F>(&self, write: F) -> i64
    where
        F: FnOnce(&mut P) -> bool,
    {
        let sequence = self.claim();

        // SAFETY: `claim` handed this producer exclusive ownership of `sequence`, and the
        // gating wait guarantees every stage is done with the previous lap of the slot.
        let entry = unsafe { self.ring.slot_mut(sequence) };
        entry.set_sequence_value(sequence);
        let is_valid = write(entry);
        entry.set_is_valid(is_valid);

        self.publish(sequence);
        sequence
    }

    /// Claim the next sequence, waiting while it would lap the slowest stage
    fn claim(&self) -> i64 {
        let sequence = self.ring.claim_strategy().claim_next();
        let wrap_point = sequence - self.ring.capacity() as i64;

        let mut first_wait = true;
        while wrap_point > self.gating_stage.consumed_to() {
            // Nobody is left to read the slot, so there is nothing to protect.
            if self.all_stages.iter().all(|stage| stage.has_exited()) {
                break;
            }
            if first_wait {
                first_wait = false;
                if self.starts_ring_full_episode(sequence) {
                    tracing::warn!(
                        disruptor = %self.ring.name(),
                        sequence,
                        consumed_to = self.gating_stage.consumed_to(),
                        "ring full detected, producer waiting for consumers"
                    );
                }
            }
            thread::yield_now();
        }

        sequence
    }

    /// Record a blocked claim; true when it opens a new ring-full episode
    ///
    /// An episode lasts as long as every lap of claims has to wait at least once. It ends
    /// when `capacity` consecutive claims go through without waiting.
    fn starts_ring_full_episode(&self, sequence: i64) -> bool {
        let previous = self.last_blocked.swap(sequence, Ordering::Relaxed);
        previous == NEVER_BLOCKED || sequence - previous > self.ring.capacity() as i64
    }

    fn publish(&self, sequence: i64) {
        if self.ring.claim_strategy().is_multi_producer() {
            // Preceding producers must publish first; the cursor only moves contiguously.
            while self.ring.get_cursor() != sequence - 1 {
                thread::yield_now();
            }
        }

        self.ring.publish(sequence);
        self.ring.claim_strategy().release(sequence);
        self.ring.wait_strategy().data_available();
    }

    /// The ring this barrier publishes into
    pub fn ring(&self) -> &Arc<RingBuffer<P, C, W>> {
        &self.ring
    }
}

/// Consumer-side view of a ring
pub struct ConsumerBarrier<P, C, W> {
    ring: Arc<RingBuffer<P, C, W>>,
    upstream: Option<Arc<StageState>>,
}

impl<P, C, W> ConsumerBarrier<P, C, W>
where
    P: Payload,
    C: ClaimStrategy,
    W: WaitStrategy,
{
    pub(crate) fn new(ring: Arc<RingBuffer<P, C, W>>, upstream: Option<Arc<StageState>>) -> Self {
        Self { ring, upstream }
    }

    /// The sequence this consumer waits on: the cursor, or the upstream stage's progress
    #[inline]
    pub fn progress(&self) -> &Sequence {
        match &self.upstream {
            Some(stage) => stage.sequence(),
            None => self.ring.cursor(),
        }
    }

    /// Wait for `sequence` through the ring's wait strategy
    #[inline]
    pub fn wait_for(&self, sequence: i64, running: &AtomicBool, side_channel: &SideChannel) -> i64 {
        self.ring
            .wait_strategy()
            .wait_for(sequence, self.progress(), running, side_channel)
    }

    /// Exclusive access to the entry for `sequence`
    ///
    /// # Safety
    /// `sequence` must be at or below the last value returned by `wait_for` and not yet
    /// released through this stage's `consumed_to`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn entry_mut(&self, sequence: i64) -> &mut P {
        self.ring.slot_mut(sequence)
    }

    /// Wake any consumer blocked in the wait strategy
    pub fn interrupt(&self) {
        self.ring.wait_strategy().data_available();
    }

    pub fn ring(&self) -> &Arc<RingBuffer<P, C, W>> {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BytePayload, FixedBuffer, InputPayload, MultiProducerClaim, SingleProducerClaim,
        YieldWaitStrategy,
    };

    fn single_ring(capacity: usize) -> Arc<RingBuffer<FixedBuffer, SingleProducerClaim, YieldWaitStrategy>> {
        Arc::new(
            RingBuffer::new(
                "barrier-test",
                16,
                capacity,
                SingleProducerClaim::new(),
                YieldWaitStrategy::new(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_publish_advances_cursor_and_stamps_sequence() {
        let ring = single_ring(4);
        let gate = Arc::new(StageState::new("gate"));
        let producer = ring.create_producer_barrier(Arc::clone(&gate), vec![Arc::clone(&gate)]);
        let consumer = ring.create_consumer_barrier(None);

        let seq = producer.publish_with(|entry| entry.set_value(b"abc", 5, 1));
        assert_eq!(seq, 0);
        assert_eq!(ring.get_cursor(), 0);

        let running = AtomicBool::new(true);
        let side = SideChannel::new();
        assert_eq!(consumer.wait_for(0, &running, &side), 0);

        let entry = unsafe { consumer.entry_mut(0) };
        assert_eq!(entry.data(), b"abc");
        assert_eq!(entry.sequence_value(), 0);
        assert!(entry.is_valid());
    }

    #[test]
    fn test_invalid_entry_still_advances_cursor() {
        let ring = single_ring(4);
        let gate = Arc::new(StageState::new("gate"));
        let producer = ring.create_producer_barrier(Arc::clone(&gate), vec![Arc::clone(&gate)]);

        let seq = producer.publish_with(|entry| entry.set_value(&[0u8; 17], 0, 0));
        assert_eq!(ring.get_cursor(), seq);
        assert!(!unsafe { ring.slot(seq) }.is_valid());
    }

    #[test]
    fn test_producer_waits_for_slowest_stage() {
        let ring = single_ring(2);
        let gate = Arc::new(StageState::new("gate"));
        gate.mark_started();
        let producer = Arc::new(ring.create_producer_barrier(Arc::clone(&gate), vec![Arc::clone(&gate)]));

        producer.publish_with(|entry| entry.set_value(b"0", 0, 0));
        producer.publish_with(|entry| entry.set_value(b"1", 0, 1));

        let blocked = {
            let producer = Arc::clone(&producer);
            thread::spawn(move || producer.publish_with(|entry| entry.set_value(b"2", 0, 2)))
        };

        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(ring.get_cursor(), 1, "third publish must wait for the ring to drain");

        gate.sequence().set(0);
        assert_eq!(blocked.join().unwrap(), 2);
        assert_eq!(ring.get_cursor(), 2);
    }

    #[test]
    fn test_ring_full_episode_spans_consecutive_laps() {
        let ring = single_ring(4);
        let gate = Arc::new(StageState::new("gate"));
        let producer = ring.create_producer_barrier(Arc::clone(&gate), vec![gate]);

        assert!(producer.starts_ring_full_episode(4));
        // A slow consumer freeing one lap at a time blocks the producer once per lap.
        assert!(!producer.starts_ring_full_episode(5));
        assert!(!producer.starts_ring_full_episode(9));
        assert!(!producer.starts_ring_full_episode(13));
        // Claims 14..=17, a full lap, went through without waiting.
        assert!(producer.starts_ring_full_episode(18));
    }

    #[test]
    fn test_producer_stops_waiting_once_every_stage_exited() {
        let ring = single_ring(1);
        let gate = Arc::new(StageState::new("gate"));
        gate.mark_started();
        let producer = ring.create_producer_barrier(Arc::clone(&gate), vec![Arc::clone(&gate)]);

        producer.publish_with(|entry| entry.set_value(b"0", 0, 0));
        gate.mark_exited();
        assert_eq!(producer.publish_with(|entry| entry.set_value(b"1", 0, 1)), 1);
    }

    #[test]
    fn test_multi_producer_publishes_in_claim_order() {
        let ring = Arc::new(
            RingBuffer::<FixedBuffer, _, _>::new(
                "multi",
                16,
                1024,
                MultiProducerClaim::new(),
                YieldWaitStrategy::new(),
            )
            .unwrap(),
        );
        let gate = Arc::new(StageState::new("gate"));
        let producer = Arc::new(ring.create_producer_barrier(Arc::clone(&gate), vec![Arc::clone(&gate)]));

        let handles: Vec<_> = (0..4)
            .map(|p| {
                let producer = Arc::clone(&producer);
                thread::spawn(move || {
                    for i in 0..100 {
                        producer.publish_with(|entry| entry.set_value(&[p as u8], 0, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ring.get_cursor(), 399);
        for seq in 0..400 {
            assert_eq!(unsafe { ring.slot(seq) }.sequence_value(), seq);
        }
    }
}
