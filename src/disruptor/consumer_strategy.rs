//! Consumer callbacks and dispatch strategies
//!
//! A [`Consumer`] is the user's sink: one callback per pipeline stage. A
//! [`ConsumerStrategy`] decides how the run of entries a stage just acquired is handed to
//! that sink: one call per entry ([`Sequential`]) or one call for the whole run with the
//! entries merged into the first ([`Batch`]).

use crate::disruptor::{ClaimStrategy, ConsumerBarrier, MergeablePayload, Payload, WaitStrategy};

/// User callbacks invoked on the consumer threads
///
/// Both stages of a two-stage pipeline share one consumer, so callbacks take `&self`;
/// stage 1 only ever calls `data_callback1` and stage 2 only `data_callback2`.
pub trait Consumer<P>: Send + Sync + 'static {
    /// Called by the first (or only) stage for each dispatched entry
    fn data_callback1(&self, payload: &P);

    /// Called by the second stage once stage 1 is done with the entry
    fn data_callback2(&self, _payload: &P) {}
}

impl<P, F> Consumer<P> for F
where
    F: Fn(&P) + Send + Sync + 'static,
{
    fn data_callback1(&self, payload: &P) {
        self(payload)
    }
}

/// Which of the consumer's callbacks a stage drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageIndex {
    First,
    Second,
}

impl StageIndex {
    #[inline]
    pub fn dispatch<P, K: Consumer<P> + ?Sized>(self, consumer: &K, payload: &P) {
        match self {
            Self::First => consumer.data_callback1(payload),
            Self::Second => consumer.data_callback2(payload),
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::First => "c1",
            Self::Second => "c2",
        }
    }
}

/// How a stage hands a run of available entries to its consumer
pub trait ConsumerStrategy<P: Payload>: Default + Send + 'static {
    fn name() -> &'static str;

    /// Dispatch the entries `next..=available`
    ///
    /// Invalid entries are skipped. The caller owns every sequence in the range.
    fn consume<C, W, F>(
        &mut self,
        barrier: &ConsumerBarrier<P, C, W>,
        next: i64,
        available: i64,
        dispatch: F,
    ) where
        C: ClaimStrategy,
        W: WaitStrategy,
        F: FnMut(&P);
}

/// One dispatch per valid entry, in sequence order
///
/// `has_more_data` is true on every entry but the last of the run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sequential;

impl<P: Payload> ConsumerStrategy<P> for Sequential {
    fn name() -> &'static str {
        "Sequential"
    }

    fn consume<C, W, F>(
        &mut self,
        barrier: &ConsumerBarrier<P, C, W>,
        next: i64,
        available: i64,
        mut dispatch: F,
    ) where
        C: ClaimStrategy,
        W: WaitStrategy,
        F: FnMut(&P),
    {
        for sequence in next..=available {
            // SAFETY: the stage loop only passes sequences it acquired and still holds.
            let entry = unsafe { barrier.entry_mut(sequence) };
            if !entry.is_valid() {
                continue;
            }
            entry.set_has_more_data(sequence < available);
            dispatch(entry);
        }
    }
}

/// One dispatch per run, with every valid entry appended onto the first
///
/// Message boundaries inside the run are lost, so only payloads that can be merged
/// qualify. Merged-in entries are marked invalid so a downstream stage sees the merged
/// head once and skips the rest.
#[derive(Debug, Default, Clone, Copy)]
pub struct Batch;

impl<P: MergeablePayload> ConsumerStrategy<P> for Batch {
    fn name() -> &'static str {
        "Batch"
    }

    fn consume<C, W, F>(
        &mut self,
        barrier: &ConsumerBarrier<P, C, W>,
        next: i64,
        available: i64,
        mut dispatch: F,
    ) where
        C: ClaimStrategy,
        W: WaitStrategy,
        F: FnMut(&P),
    {
        let mut head: Option<&mut P> = None;
        for sequence in next..=available {
            // SAFETY: as in `Sequential`; distinct sequences in one run map to distinct
            // slots because a run never exceeds the ring capacity.
            let entry = unsafe { barrier.entry_mut(sequence) };
            if !entry.is_valid() {
                continue;
            }
            match &mut head {
                Some(first) => {
                    first.append(entry);
                    entry.set_is_valid(false);
                }
                None => head = Some(entry),
            }
        }

        if let Some(first) = head {
            first.set_has_more_data(false);
            dispatch(first);
        }
    }
}
