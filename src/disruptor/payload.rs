//! Ring slot payloads
//!
//! Every slot in the ring is a pre-constructed payload that is overwritten in place by
//! each publish. Four representations are provided, each with different ownership and
//! copy semantics:
//!
//! - [`FixedBuffer`]: byte buffer pre-allocated to `max_msg_size`, deep copy in, oversize
//!   input is rejected and the slot marked invalid.
//! - [`GrowableBuffer`]: byte buffer that grows on demand; the only payload the
//!   [`Batch`](crate::disruptor::Batch) consumer strategy can merge into.
//! - [`ObjectPayload`]: holds one value of a user type, no byte buffer at all.
//! - [`BroadcastBuffer`]: reference-counted bytes, so several stages can observe the same
//!   buffer without copying.

use std::fmt;
use std::sync::Arc;

/// Metadata carried by every payload representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Sequence this slot was last written for
    pub sequence_value: i64,
    /// Producer-supplied message id
    pub id: i64,
    /// Producer-supplied receive timestamp
    pub receive_timestamp: u64,
    /// False when the producer dropped the message (e.g. oversize)
    pub is_valid: bool,
    /// Hint that a contiguous run of entries follows this one
    pub has_more_data: bool,
}

impl Default for PayloadHeader {
    fn default() -> Self {
        Self {
            sequence_value: crate::disruptor::INITIAL_CURSOR_VALUE,
            id: 0,
            receive_timestamp: 0,
            is_valid: false,
            has_more_data: false,
        }
    }
}

/// A slot representation stored in the ring
///
/// Slots are written either through [`InputPayload::set_value`] from borrowed producer
/// input, or directly through
/// [`Disruptor::publish_with`](crate::disruptor::Disruptor::publish_with), which can move
/// values in.
pub trait Payload: Send + Sync + 'static {
    /// Construct an empty slot; `max_msg_size` is a hint only some payloads honor
    fn with_capacity(max_msg_size: usize) -> Self
    where
        Self: Sized;

    /// Metadata of the message currently in the slot
    fn header(&self) -> &PayloadHeader;

    /// Mutable metadata, for the producer barrier and consumer strategies
    fn header_mut(&mut self) -> &mut PayloadHeader;

    #[inline]
    fn sequence_value(&self) -> i64 {
        self.header().sequence_value
    }

    #[inline]
    fn set_sequence_value(&mut self, sequence: i64) {
        self.header_mut().sequence_value = sequence;
    }

    #[inline]
    fn id(&self) -> i64 {
        self.header().id
    }

    #[inline]
    fn receive_timestamp(&self) -> u64 {
        self.header().receive_timestamp
    }

    #[inline]
    fn is_valid(&self) -> bool {
        self.header().is_valid
    }

    #[inline]
    fn set_is_valid(&mut self, is_valid: bool) {
        self.header_mut().is_valid = is_valid;
    }

    #[inline]
    fn has_more_data(&self) -> bool {
        self.header().has_more_data
    }

    #[inline]
    fn set_has_more_data(&mut self, has_more_data: bool) {
        self.header_mut().has_more_data = has_more_data;
    }
}

/// Payloads a producer callback can fill from borrowed input
///
/// `Input` is what a producer hands over: `[u8]` for the byte payloads, `T` for
/// [`ObjectPayload<T>`] when `T: Clone`.
pub trait InputPayload: Payload {
    /// What a producer callback writes into the slot
    type Input: ?Sized;

    /// Write `input` into the slot, returning false when the message had to be dropped
    fn set_value(&mut self, input: &Self::Input, receive_timestamp: u64, id: i64) -> bool;

    /// What the producer callback reports as consumed for `input`
    fn consumed_len(input: &Self::Input) -> usize;
}

/// Payloads whose content is a contiguous byte slice
pub trait BytePayload: InputPayload<Input = [u8]> {
    fn data(&self) -> &[u8];

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Payloads that can absorb other payloads in place (batch delivery)
pub trait MergeablePayload: BytePayload {
    /// Concatenate `other`'s bytes onto this payload
    fn append(&mut self, other: &Self);
}

#[inline]
fn stamp(header: &mut PayloadHeader, receive_timestamp: u64, id: i64) {
    header.receive_timestamp = receive_timestamp;
    header.id = id;
    header.is_valid = true;
}

/// Byte buffer pre-allocated to the configured maximum message size
#[derive(Debug, Clone)]
pub struct FixedBuffer {
    header: PayloadHeader,
    data: Vec<u8>,
    max_msg_size: usize,
}

impl FixedBuffer {
    pub fn max_msg_size(&self) -> usize {
        self.max_msg_size
    }
}

impl Payload for FixedBuffer {
    fn with_capacity(max_msg_size: usize) -> Self {
        Self {
            header: PayloadHeader::default(),
            data: Vec::with_capacity(max_msg_size),
            max_msg_size,
        }
    }

    fn header(&self) -> &PayloadHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PayloadHeader {
        &mut self.header
    }
}

impl InputPayload for FixedBuffer {
    type Input = [u8];

    fn set_value(&mut self, input: &[u8], receive_timestamp: u64, id: i64) -> bool {
        if input.len() > self.max_msg_size {
            tracing::warn!(
                size = input.len(),
                max_msg_size = self.max_msg_size,
                sequence = self.header.sequence_value,
                "incoming message too large, dropping it"
            );
            self.header.is_valid = false;
            return false;
        }

        self.data.clear();
        self.data.extend_from_slice(input);
        stamp(&mut self.header, receive_timestamp, id);
        true
    }

    fn consumed_len(input: &[u8]) -> usize {
        input.len()
    }
}

impl BytePayload for FixedBuffer {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Initial capacity of a [`GrowableBuffer`] slot
pub const GROWABLE_INITIAL_CAPACITY: usize = 64;

/// Byte buffer that starts small and grows by 1.5x when a write would overflow it
#[derive(Debug, Clone)]
pub struct GrowableBuffer {
    header: PayloadHeader,
    data: Vec<u8>,
}

impl GrowableBuffer {
    /// Current allocated capacity
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn ensure_capacity(&mut self, needed: usize) {
        if needed > self.data.capacity() {
            let target = needed + needed / 2;
            self.data.reserve_exact(target - self.data.len());
        }
    }
}

impl Payload for GrowableBuffer {
    fn with_capacity(max_msg_size: usize) -> Self {
        Self {
            header: PayloadHeader::default(),
            data: Vec::with_capacity(max_msg_size.min(GROWABLE_INITIAL_CAPACITY)),
        }
    }

    fn header(&self) -> &PayloadHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PayloadHeader {
        &mut self.header
    }
}

impl InputPayload for GrowableBuffer {
    type Input = [u8];

    fn set_value(&mut self, input: &[u8], receive_timestamp: u64, id: i64) -> bool {
        self.data.clear();
        self.ensure_capacity(input.len());
        self.data.extend_from_slice(input);
        stamp(&mut self.header, receive_timestamp, id);
        true
    }

    fn consumed_len(input: &[u8]) -> usize {
        input.len()
    }
}

impl BytePayload for GrowableBuffer {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

impl MergeablePayload for GrowableBuffer {
    fn append(&mut self, other: &Self) {
        self.ensure_capacity(self.data.len() + other.data.len());
        self.data.extend_from_slice(&other.data);
    }
}

/// Holds one value of a user type instead of bytes
///
/// Suited to sequential dispatch only: there is no meaningful way to merge two objects.
/// Values are moved in with [`set_object`](Self::set_object); producer callbacks that
/// hand over `&T` need `T: Clone`.
#[derive(Debug, Clone, Default)]
pub struct ObjectPayload<T> {
    header: PayloadHeader,
    data: T,
}

impl<T> ObjectPayload<T> {
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Move a value into the slot without cloning it
    pub fn set_object(&mut self, value: T, receive_timestamp: u64, id: i64) {
        self.data = value;
        stamp(&mut self.header, receive_timestamp, id);
    }

    /// Move the value out, leaving `T::default()` behind
    pub fn take_object(&mut self) -> T
    where
        T: Default,
    {
        std::mem::take(&mut self.data)
    }
}

impl<T> Payload for ObjectPayload<T>
where
    T: Default + Send + Sync + 'static,
{
    fn with_capacity(_max_msg_size: usize) -> Self {
        Self {
            header: PayloadHeader::default(),
            data: T::default(),
        }
    }

    fn header(&self) -> &PayloadHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PayloadHeader {
        &mut self.header
    }
}

impl<T> InputPayload for ObjectPayload<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    type Input = T;

    fn set_value(&mut self, input: &T, receive_timestamp: u64, id: i64) -> bool {
        self.data.clone_from(input);
        stamp(&mut self.header, receive_timestamp, id);
        true
    }

    fn consumed_len(_input: &T) -> usize {
        0
    }
}

impl<T: fmt::Display> fmt::Display for ObjectPayload<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {}, rcvt {}, {}",
            self.header.id, self.header.receive_timestamp, self.data
        )
    }
}

/// Reference-counted bytes shared between stages without copying
///
/// Cannot be merged in place, so it only works with sequential dispatch.
#[derive(Debug, Clone)]
pub struct BroadcastBuffer {
    header: PayloadHeader,
    data: Arc<[u8]>,
}

impl BroadcastBuffer {
    /// Another handle to the same bytes
    pub fn shared(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Adopt an already shared buffer without copying
    pub fn set_shared(&mut self, data: Arc<[u8]>, receive_timestamp: u64, id: i64) {
        self.data = data;
        stamp(&mut self.header, receive_timestamp, id);
    }
}

impl Payload for BroadcastBuffer {
    fn with_capacity(_max_msg_size: usize) -> Self {
        Self {
            header: PayloadHeader::default(),
            data: Arc::from(&[][..]),
        }
    }

    fn header(&self) -> &PayloadHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut PayloadHeader {
        &mut self.header
    }
}

impl InputPayload for BroadcastBuffer {
    type Input = [u8];

    fn set_value(&mut self, input: &[u8], receive_timestamp: u64, id: i64) -> bool {
        // Readers of the old bytes keep their own reference; a fresh buffer is cut here.
        self.data = Arc::from(input);
        stamp(&mut self.header, receive_timestamp, id);
        true
    }

    fn consumed_len(input: &[u8]) -> usize {
        input.len()
    }
}

impl BytePayload for BroadcastBuffer {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_buffer_deep_copies() {
        let mut slot = FixedBuffer::with_capacity(16);
        let mut source = b"hello".to_vec();

        assert!(slot.set_value(&source, 7, 42));
        source[0] = b'j';

        assert_eq!(slot.data(), b"hello");
        assert_eq!(slot.receive_timestamp(), 7);
        assert_eq!(slot.id(), 42);
        assert!(slot.is_valid());
    }

    #[test]
    fn test_fixed_buffer_rejects_oversize() {
        let mut slot = FixedBuffer::with_capacity(4);
        assert!(slot.set_value(b"abcd", 0, 1));
        assert!(!slot.set_value(b"abcde", 0, 2));
        assert!(!slot.is_valid());
        // Previous content is not clobbered by a rejected write
        assert_eq!(slot.data(), b"abcd");
    }

    #[test]
    fn test_fixed_buffer_never_reallocates() {
        let mut slot = FixedBuffer::with_capacity(32);
        let before = slot.data.as_ptr();
        for len in [1usize, 32, 7, 0, 31] {
            assert!(slot.set_value(&vec![9u8; len], 0, 0));
            assert_eq!(slot.len(), len);
        }
        assert_eq!(slot.data.as_ptr(), before);
    }

    #[test]
    fn test_growable_buffer_append_grows_by_half() {
        let mut head = GrowableBuffer::with_capacity(4096);
        assert!(head.capacity() < 4096);
        head.set_value(&[1u8; 60], 0, 1);

        let mut tail = GrowableBuffer::with_capacity(4096);
        tail.set_value(&[2u8; 40], 0, 2);
        head.append(&tail);

        assert_eq!(head.len(), 100);
        assert!(head.capacity() >= 150);
        assert_eq!(&head.data()[58..62], &[1, 1, 2, 2]);
    }

    #[test]
    fn test_growable_buffer_accepts_any_size() {
        let mut slot = GrowableBuffer::with_capacity(8);
        assert!(slot.set_value(&[5u8; 1000], 1, 1));
        assert_eq!(slot.len(), 1000);
        assert!(slot.set_value(b"xy", 2, 2));
        assert_eq!(slot.data(), b"xy");
    }

    #[test]
    fn test_object_payload_clone_and_move() {
        let mut slot = ObjectPayload::<String>::with_capacity(0);
        assert_eq!(ObjectPayload::<String>::consumed_len(&"abc".to_string()), 0);

        slot.set_value(&"quote".to_string(), 3, 9);
        assert_eq!(slot.data(), "quote");
        assert!(slot.is_valid());

        slot.set_object("trade".to_string(), 4, 10);
        assert_eq!(slot.data(), "trade");
        assert_eq!(slot.to_string(), "id 10, rcvt 4, trade");
    }

    #[derive(Debug, Default, PartialEq)]
    struct Order {
        legs: Vec<Box<u32>>,
    }

    #[test]
    fn test_object_payload_moves_non_clone_values() {
        let mut slot = ObjectPayload::<Order>::with_capacity(0);
        let order = Order {
            legs: vec![Box::new(1), Box::new(2)],
        };
        let first_leg: *const u32 = &*order.legs[0];

        slot.set_object(order, 5, 11);
        assert!(std::ptr::eq(&*slot.data().legs[0], first_leg));
        assert_eq!(slot.id(), 11);

        let taken = slot.take_object();
        assert_eq!(taken.legs.len(), 2);
        assert_eq!(slot.data(), &Order::default());
    }

    #[test]
    fn test_broadcast_buffer_shares_bytes() {
        let mut slot = BroadcastBuffer::with_capacity(0);
        slot.set_value(b"tick", 1, 1);
        let held = slot.shared();

        slot.set_value(b"next", 2, 2);
        assert_eq!(&*held, b"tick");
        assert_eq!(slot.data(), b"next");

        let shared: Arc<[u8]> = Arc::from(&b"zero-copy"[..]);
        slot.set_shared(Arc::clone(&shared), 3, 3);
        assert!(Arc::ptr_eq(&shared, &slot.shared()));
    }

    #[test]
    fn test_header_defaults() {
        let slot = FixedBuffer::with_capacity(1);
        assert_eq!(slot.sequence_value(), -1);
        assert!(!slot.is_valid());
        assert!(!slot.has_more_data());
    }
}
