//! TickRing Disruptor Implementation
//!
//! This module wires together the pieces of the ring: payload slots, claim strategies,
//! wait strategies, producer/consumer barriers, consumer strategies and the multi-stage
//! pipeline, behind the [`Disruptor`] facade.

pub mod barrier;
pub mod claim_strategy;
pub mod config;
pub mod consumer_strategy;
#[allow(clippy::module_inception)]
pub mod disruptor;
pub mod payload;
pub mod pipeline;
pub mod producer;
pub mod ring_buffer;
pub mod sequence;
pub mod side_channel;
pub mod stage;
pub mod thread_management;
pub mod wait_strategy;

#[cfg(test)]
mod property_tests;

pub use barrier::{ConsumerBarrier, ProducerBarrier};
pub use claim_strategy::{ClaimStrategy, MultiProducerClaim, SingleProducerClaim};
pub use config::{DisruptorConfig, WaitStrategyKind};
pub use consumer_strategy::{Batch, Consumer, ConsumerStrategy, Sequential, StageIndex};
pub use disruptor::{Disruptor, DisruptorBuilder};
pub use payload::{
    BroadcastBuffer, BytePayload, FixedBuffer, GrowableBuffer, InputPayload, MergeablePayload,
    ObjectPayload, Payload, PayloadHeader,
};
pub use pipeline::{ConsumerStages, NStageConsumer};
pub use producer::{CallbackProducer, DataCallback, Producer};
pub use ring_buffer::RingBuffer;
pub use sequence::Sequence;
pub use side_channel::{PostTask, SideChannel};
pub use stage::{ConsumerStage, Executor, Launch, PostRole, StageLoop, StageState};
pub use thread_management::{ManagedThread, ThreadBuilder};
pub use wait_strategy::{BlockWaitStrategy, BusySpinWaitStrategy, WaitStrategy, YieldWaitStrategy};

/// The initial cursor value for sequences: nothing published or consumed yet
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Largest accepted `ring_size_exponent` (a ring of 2^30 slots)
pub const MAX_RING_SIZE_EXPONENT: u32 = 30;

/// Errors that can occur while building a Disruptor
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    #[error("Buffer size must be a power of 2, got: {0}")]
    InvalidBufferSize(usize),

    #[error("ring_size_exponent must be at most {max}, got: {0}", max = MAX_RING_SIZE_EXPONENT)]
    InvalidRingSizeExponent(u32),

    #[error("{path}.wait_strategy is not set")]
    MissingWaitStrategy { path: String },

    #[error("{path}.wait_strategy has unknown value '{value}' (expected busy_spin, yield or block)")]
    UnknownWaitStrategy { path: String, value: String },

    #[error("invalid configuration at {path}: {reason}")]
    InvalidConfig { path: String, reason: String },

    #[error("CPU core {core} is not available. Available cores: {available:?}")]
    InvalidCoreId { core: usize, available: Vec<usize> },

    #[error("failed to spawn consumer thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DisruptorError>;

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_power_of_two() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(2));
        assert!(is_power_of_two(4));
        assert!(is_power_of_two(1024));

        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(!is_power_of_two(1023));
    }

    #[test]
    fn test_error_messages_name_the_config_path() {
        let err = DisruptorError::UnknownWaitStrategy {
            path: "feeds.cme".to_string(),
            value: "bogus".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("feeds.cme.wait_strategy"));
        assert!(text.contains("bogus"));
    }
}
