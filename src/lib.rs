//! `TickRing` - Disruptor-style ring buffer for market-data pipelines
//!
//! Hands messages from one or more producer threads (typically network readers) to a
//! one- or two-stage consumer pipeline through a pre-allocated ring of payload slots,
//! without locks on the data path.
//!
//! ## Features
//!
//! - **Pre-allocated slots**: bounded, growable, object and shared-buffer payloads
//! - **Single and multi producer** claim strategies, chosen from the producer count
//! - **Busy-spin, yield and block** wait strategies, chosen from configuration
//! - **Sequential and batch** dispatch, one or two consumer stages
//! - **Side channel**: administrative tasks run on the consumer thread between dispatches
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tickring::disruptor::{
//!     BytePayload, CallbackProducer, Consumer, ConsumerStages, Disruptor, DisruptorConfig,
//!     FixedBuffer, Payload, Sequential,
//! };
//!
//! struct Printer;
//!
//! impl Consumer<FixedBuffer> for Printer {
//!     fn data_callback1(&self, msg: &FixedBuffer) {
//!         println!("decode {} bytes, id {}", msg.len(), msg.id());
//!     }
//!
//!     fn data_callback2(&self, msg: &FixedBuffer) {
//!         println!("publish id {}", msg.id());
//!     }
//! }
//!
//! let tree = serde_json::json!({
//!     "feeds": { "cme": { "ring_size_exponent": 8, "wait_strategy": "yield" } }
//! });
//! let config = DisruptorConfig::from_tree(&tree, "feeds.cme").unwrap();
//!
//! let reader = Arc::new(CallbackProducer::<[u8]>::new());
//! let mut disruptor = Disruptor::<FixedBuffer>::builder("cme", config)
//!     .stages(ConsumerStages::Two)
//!     .producer(reader.clone())
//!     .build::<Sequential, _>(Arc::new(Printer))
//!     .unwrap();
//!
//! reader.push(b"8=FIX.4.2", 0, 1);
//! disruptor.post(|| println!("runs on cme.c2 between dispatches"));
//! disruptor.stop();
//! ```
//!
//! ## Architecture
//!
//! - **`RingBuffer`**: slots, published cursor, claim and wait strategy
//! - **`Sequence`**: padded atomic counter; the cursor and every stage's `consumed_to`
//! - **`ClaimStrategy`**: hands out sequences to producers
//! - **`WaitStrategy`**: how consumers wait for a sequence
//! - **`ProducerBarrier` / `ConsumerBarrier`**: the producer and consumer views of a ring
//! - **`ConsumerStrategy`**: sequential or batch dispatch to the `Consumer`
//! - **`NStageConsumer`**: one or two chained stages
//! - **`Disruptor`**: builder and façade

pub mod disruptor;

pub use disruptor::{
    is_power_of_two, Batch, BlockWaitStrategy, BusySpinWaitStrategy, BytePayload,
    CallbackProducer, Consumer, ConsumerStages, ConsumerStrategy, Disruptor, DisruptorBuilder,
    DisruptorConfig, DisruptorError, FixedBuffer, GrowableBuffer, InputPayload, ObjectPayload,
    Payload,
    Producer, Result, RingBuffer, Sequence, Sequential, WaitStrategy, WaitStrategyKind,
    YieldWaitStrategy, INITIAL_CURSOR_VALUE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `TickRing` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
