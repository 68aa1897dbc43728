//! Claim strategies
//!
//! A claim strategy hands out the next sequence a producer may write to. Claiming never
//! fails: backpressure is applied afterwards by the producer barrier, which waits for the
//! slowest consumer stage before letting the producer touch the slot.

use crate::disruptor::Sequence;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

/// Strategy for allocating sequence numbers to producers
pub trait ClaimStrategy: Send + Sync + std::fmt::Debug + 'static {
    /// Claim the next sequence for exclusive writing
    fn claim_next(&self) -> i64;

    /// Called once the claimed sequence has been published
    fn release(&self, _sequence: i64) {}

    /// Whether producers must publish in claim order (several producers share the cursor)
    fn is_multi_producer(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Claim strategy for a single producer thread
///
/// The counter is advanced with a relaxed load and store, no read-modify-write and no
/// fence. Only one producer may be inside claim..publish at a time. Debug builds also
/// track the claim in flight and panic when a second producer claims before the first
/// has published; release builds carry no guard at all.
#[derive(Debug, Default)]
pub struct SingleProducerClaim {
    sequence: Sequence,
    #[cfg(debug_assertions)]
    claimed: AtomicBool,
}

impl SingleProducerClaim {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClaimStrategy for SingleProducerClaim {
    #[inline]
    fn claim_next(&self) -> i64 {
        #[cfg(debug_assertions)]
        {
            let already_claimed = self.claimed.swap(true, Ordering::Relaxed);
            assert!(
                !already_claimed,
                "concurrent producers on a single-producer ring; configure more than one producer instead"
            );
        }

        let next = self.sequence.get_relaxed() + 1;
        self.sequence.set_relaxed(next);
        next
    }

    #[inline]
    fn release(&self, _sequence: i64) {
        #[cfg(debug_assertions)]
        self.claimed.store(false, Ordering::Relaxed);
    }

    fn is_multi_producer(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "SINGLE_THREADED"
    }
}

/// Claim strategy for several producer threads
///
/// A single `fetch_add` per claim gives every producer a disjoint, strictly increasing
/// sequence with no retry loop.
#[derive(Debug, Default)]
pub struct MultiProducerClaim {
    sequence: Sequence,
}

impl MultiProducerClaim {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClaimStrategy for MultiProducerClaim {
    #[inline]
    fn claim_next(&self) -> i64 {
        self.sequence.increment_and_get()
    }

    fn is_multi_producer(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "MULTI_THREADED"
    }
}
