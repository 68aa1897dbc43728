//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer waits for a target sequence. The progress
//! source is either the ring's published cursor (first stage) or the upstream stage's
//! `consumed_to` (later stages); the same loop serves both.
//!
//! Every strategy returns as soon as one of these holds:
//! - the progress source reached the target sequence,
//! - the running flag was cleared (cooperative cancellation),
//! - the side channel has a pending task.

use crate::disruptor::{Sequence, SideChannel};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Strategy for waiting until a sequence becomes available
pub trait WaitStrategy: Send + Sync + std::fmt::Debug + 'static {
    /// Wait until `progress >= sequence`, `running` is false, or `side_channel` is non-empty
    ///
    /// # Returns
    /// The last observed value of `progress`, which may be below `sequence` when the wait
    /// ended for one of the other two reasons.
    fn wait_for(
        &self,
        sequence: i64,
        progress: &Sequence,
        running: &AtomicBool,
        side_channel: &SideChannel,
    ) -> i64;

    /// Producer-side signal after every publish; also used to interrupt waiters
    fn data_available(&self);

    fn name(&self) -> &'static str;
}

#[inline]
fn keep_waiting(
    available: i64,
    sequence: i64,
    running: &AtomicBool,
    side_channel: &SideChannel,
) -> bool {
    available < sequence && running.load(Ordering::Acquire) && side_channel.is_empty()
}

/// Busy-spin wait strategy
///
/// Lowest latency; needs a dedicated physical core per consumer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        progress: &Sequence,
        running: &AtomicBool,
        side_channel: &SideChannel,
    ) -> i64 {
        let mut available = progress.get();
        while keep_waiting(available, sequence, running, side_channel) {
            std::hint::spin_loop();
            available = progress.get();
        }
        available
    }

    fn data_available(&self) {}

    fn name(&self) -> &'static str {
        "BUSY_SPIN"
    }
}

/// Yielding wait strategy
///
/// Gives up the rest of the time slice each iteration; for when logical consumers
/// outnumber physical cores.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldWaitStrategy;

impl YieldWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for YieldWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        progress: &Sequence,
        running: &AtomicBool,
        side_channel: &SideChannel,
    ) -> i64 {
        let mut available = progress.get();
        while keep_waiting(available, sequence, running, side_channel) {
            thread::yield_now();
            available = progress.get();
        }
        available
    }

    fn data_available(&self) {}

    fn name(&self) -> &'static str {
        "YIELD"
    }
}

/// Upper bound on a single condition-variable sleep
///
/// Several stages share one strategy instance and the flag is cleared by whichever wakes
/// first, so a sibling can miss a signal; the bound turns that into a short delay.
const BLOCK_TIMEOUT: Duration = Duration::from_millis(1);

/// Blocking wait strategy using a mutex and condition variable
///
/// Highest latency, lowest CPU. The only strategy that needs `data_available` after
/// every publish. The lock is held only while the flag is tested or updated.
#[derive(Debug, Default)]
pub struct BlockWaitStrategy {
    data_available: Mutex<bool>,
    condvar: Condvar,
}

impl BlockWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        progress: &Sequence,
        running: &AtomicBool,
        side_channel: &SideChannel,
    ) -> i64 {
        let mut available = progress.get();
        while keep_waiting(available, sequence, running, side_channel) {
            {
                let mut flag = self.data_available.lock();
                if !*flag {
                    self.condvar.wait_for(&mut flag, BLOCK_TIMEOUT);
                }
                *flag = false;
            }
            available = progress.get();
        }
        available
    }

    fn data_available(&self) {
        *self.data_available.lock() = true;
        self.condvar.notify_all();
    }

    fn name(&self) -> &'static str {
        "BLOCK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn returns_immediately_when_available<W: WaitStrategy>(strategy: W) {
        let progress = Sequence::new(10);
        let running = AtomicBool::new(true);
        let side = SideChannel::new();
        assert_eq!(strategy.wait_for(5, &progress, &running, &side), 10);
    }

    #[test]
    fn test_available_sequence_returns_immediately() {
        returns_immediately_when_available(BusySpinWaitStrategy::new());
        returns_immediately_when_available(YieldWaitStrategy::new());
        returns_immediately_when_available(BlockWaitStrategy::new());
    }

    fn returns_when_stopped<W: WaitStrategy>(strategy: W) {
        let progress = Sequence::default();
        let running = AtomicBool::new(false);
        let side = SideChannel::new();
        assert_eq!(strategy.wait_for(0, &progress, &running, &side), -1);
    }

    #[test]
    fn test_cleared_running_flag_ends_wait() {
        returns_when_stopped(BusySpinWaitStrategy::new());
        returns_when_stopped(YieldWaitStrategy::new());
        returns_when_stopped(BlockWaitStrategy::new());
    }

    fn returns_on_side_channel_task<W: WaitStrategy>(strategy: W) {
        let progress = Sequence::default();
        let running = AtomicBool::new(true);
        let side = SideChannel::new();
        side.push(Box::new(|| {}));
        assert_eq!(strategy.wait_for(0, &progress, &running, &side), -1);
    }

    #[test]
    fn test_pending_side_channel_task_ends_wait() {
        returns_on_side_channel_task(BusySpinWaitStrategy::new());
        returns_on_side_channel_task(YieldWaitStrategy::new());
        returns_on_side_channel_task(BlockWaitStrategy::new());
    }

    #[test]
    fn test_block_strategy_wakes_on_publish() {
        let strategy = Arc::new(BlockWaitStrategy::new());
        let progress = Arc::new(Sequence::default());
        let running = Arc::new(AtomicBool::new(true));
        let side = Arc::new(SideChannel::new());

        let waiter = {
            let (strategy, progress, running, side) = (
                Arc::clone(&strategy),
                Arc::clone(&progress),
                Arc::clone(&running),
                Arc::clone(&side),
            );
            thread::spawn(move || strategy.wait_for(3, &progress, &running, &side))
        };

        thread::sleep(Duration::from_millis(10));
        progress.set(3);
        strategy.data_available();

        assert_eq!(waiter.join().unwrap(), 3);
    }

    #[test]
    fn test_block_strategy_interrupt_on_stop() {
        let strategy = Arc::new(BlockWaitStrategy::new());
        let progress = Arc::new(Sequence::default());
        let running = Arc::new(AtomicBool::new(true));
        let side = Arc::new(SideChannel::new());

        let waiter = {
            let (strategy, progress, running, side) = (
                Arc::clone(&strategy),
                Arc::clone(&progress),
                Arc::clone(&running),
                Arc::clone(&side),
            );
            thread::spawn(move || strategy.wait_for(0, &progress, &running, &side))
        };

        let start = Instant::now();
        running.store(false, Ordering::Release);
        strategy.data_available();

        assert_eq!(waiter.join().unwrap(), -1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(BusySpinWaitStrategy::new().name(), "BUSY_SPIN");
        assert_eq!(YieldWaitStrategy::new().name(), "YIELD");
        assert_eq!(BlockWaitStrategy::new().name(), "BLOCK");
    }
}
