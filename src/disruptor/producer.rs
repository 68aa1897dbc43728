//! Producer side of the façade
//!
//! Anything that receives data (a socket reader, a replay tool, a test) implements
//! [`Producer`]. At construction the disruptor registers a callback with every producer;
//! the producer then hands each message to that callback from its own thread.

use parking_lot::RwLock;
use std::sync::Arc;

/// Callback a producer invokes per message: `(data, receive_time, id) -> bytes consumed`
pub type DataCallback<I> = Arc<dyn Fn(&I, u64, i64) -> usize + Send + Sync>;

/// A source of messages for a disruptor
pub trait Producer<I: ?Sized>: Send + Sync {
    /// Install the callback messages are published through; replaces any previous one
    fn register_data_callback(&self, callback: DataCallback<I>);
}

/// A producer that forwards every [`push`](CallbackProducer::push) to the registered callback
///
/// Until a disruptor registers itself, pushed messages are discarded and report zero
/// bytes consumed.
pub struct CallbackProducer<I: ?Sized> {
    callback: RwLock<Option<DataCallback<I>>>,
}

impl<I: ?Sized> CallbackProducer<I> {
    /// Create a producer with no callback registered yet
    pub fn new() -> Self {
        Self {
            callback: RwLock::new(None),
        }
    }

    /// Hand one message to the registered callback
    ///
    /// # Returns
    /// The bytes the callback reports as consumed, 0 if nothing is registered
    pub fn push(&self, data: &I, receive_time: u64, id: i64) -> usize {
        // Clone out so the lock is not held across a publish that may wait on consumers.
        let callback = self.callback.read().clone();
        match callback {
            Some(callback) => callback(data, receive_time, id),
            None => 0,
        }
    }

    /// Whether a disruptor has registered its data callback
    pub fn is_registered(&self) -> bool {
        self.callback.read().is_some()
    }
}

impl<I: ?Sized> Default for CallbackProducer<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ?Sized + 'static> Producer<I> for CallbackProducer<I> {
    fn register_data_callback(&self, callback: DataCallback<I>) {
        *self.callback.write() = Some(callback);
    }
}

impl<I: ?Sized> std::fmt::Debug for CallbackProducer<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackProducer")
            .field("registered", &self.is_registered())
            .finish()
    }
}
