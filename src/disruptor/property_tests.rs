//! Property-based tests for disruptor components
//!
//! These tests use proptest to verify properties that should hold for all inputs

use crate::disruptor::{
    BytePayload, ClaimStrategy, DisruptorConfig, FixedBuffer, GrowableBuffer, InputPayload,
    MergeablePayload, MultiProducerClaim, Payload, RingBuffer, Sequence, SingleProducerClaim,
    StageState, YieldWaitStrategy, MAX_RING_SIZE_EXPONENT,
};
use proptest::prelude::*;
use std::sync::Arc;

/// Property tests for Sequence
mod sequence_properties {
    use super::*;

    proptest! {
        #[test]
        fn sequence_get_set_consistency(value in any::<i64>()) {
            let seq = Sequence::new(0);
            seq.set(value);
            prop_assert_eq!(seq.get(), value);
        }

        #[test]
        fn sequence_increments_are_contiguous(initial in -1i64..1_000_000, count in 1usize..200) {
            let seq = Sequence::new(initial);
            for offset in 1..=count as i64 {
                prop_assert_eq!(seq.increment_and_get(), initial + offset);
            }
            prop_assert_eq!(seq.get(), initial + count as i64);
        }
    }
}

/// Property tests for the claim strategies
mod claim_properties {
    use super::*;

    proptest! {
        #[test]
        fn claims_are_contiguous_from_zero(count in 1usize..200) {
            let single = SingleProducerClaim::new();
            let multi = MultiProducerClaim::new();

            for expected in 0..count as i64 {
                let s = single.claim_next();
                single.release(s);
                prop_assert_eq!(s, expected);
                prop_assert_eq!(multi.claim_next(), expected);
            }
        }
    }
}

/// Property tests for the ring and its payloads
mod ring_properties {
    use super::*;

    proptest! {
        #[test]
        fn published_messages_are_read_back_within_one_lap(
            exponent in 1u32..6,
            messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..48), 1..64),
        ) {
            let capacity = 1usize << exponent;
            let ring = Arc::new(
                RingBuffer::<FixedBuffer, _, _>::new(
                    "prop",
                    32,
                    capacity,
                    SingleProducerClaim::new(),
                    YieldWaitStrategy::new(),
                )
                .unwrap(),
            );
            let gate = Arc::new(StageState::new("gate"));
            let producer = ring.create_producer_barrier(Arc::clone(&gate), vec![Arc::clone(&gate)]);

            for (id, message) in messages.iter().enumerate() {
                let seq = producer.publish_with(|entry| entry.set_value(message, 0, id as i64));
                prop_assert_eq!(seq, id as i64);

                // SAFETY: single-threaded test; nothing else touches the ring.
                let entry = unsafe { ring.slot(seq) };
                prop_assert_eq!(entry.is_valid(), message.len() <= 32);
                if entry.is_valid() {
                    prop_assert_eq!(entry.data(), &message[..]);
                    prop_assert_eq!(entry.id(), id as i64);
                }
                prop_assert_eq!(entry.sequence_value(), seq);

                // Consumer catches up immediately so the producer never wraps onto it.
                gate.sequence().set(seq);
            }
            prop_assert_eq!(ring.get_cursor(), messages.len() as i64 - 1);
        }

        #[test]
        fn growable_append_concatenates(parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..10)) {
            let mut head = GrowableBuffer::with_capacity(4096);
            head.set_value(&parts[0], 0, 0);
            let mut expected = parts[0].clone();

            for part in &parts[1..] {
                let mut other = GrowableBuffer::with_capacity(4096);
                other.set_value(part, 0, 1);
                head.append(&other);
                expected.extend_from_slice(part);
            }

            prop_assert_eq!(head.data(), &expected[..]);
            prop_assert!(head.capacity() >= head.len());
            prop_assert_eq!(head.id(), 0);
        }

        #[test]
        fn ring_exponent_bound(exponent in 0u32..40) {
            let config = DisruptorConfig { ring_size_exponent: exponent, ..DisruptorConfig::default() };
            match config.capacity() {
                Ok(capacity) => {
                    prop_assert!(exponent <= MAX_RING_SIZE_EXPONENT);
                    prop_assert_eq!(capacity, 1usize << exponent);
                }
                Err(_) => prop_assert!(exponent > MAX_RING_SIZE_EXPONENT),
            }
        }
    }
}
