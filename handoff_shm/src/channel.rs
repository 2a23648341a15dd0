//! Flag-gated handoff channel over a [`SharedRegion`].
//!
//! Byte 0 of the region is the flag, the rest is the payload area. A message
//! moves through one cycle:
//!
//! ```text
//! EMPTY --(sender copies payload, stores FULL)--> FULL
//! FULL  --(receiver copies payload, stores EMPTY)--> EMPTY
//! ```
//!
//! The flag is loaded with acquire ordering before the payload is touched and
//! stored with release ordering after, on both sides. At most one message is
//! in flight; a second `send` waits until the receiver has cleared the flag.
//!
//! # Example
//!
//! ```
//! use handoff_shm::HandoffChannel;
//!
//! let channel = HandoffChannel::with_capacity(16).unwrap();
//! let (mut tx, mut rx) = channel.split();
//!
//! tx.send(b"hello").unwrap();
//! let mut buf = [0u8; 5];
//! rx.receive(&mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! ```

use crate::error::{ShmError, ShmResult};
use crate::region::SharedRegion;
use crate::spin::{SpinPolicy, spin_until};
use handoff::consts::{
    FLAG_EMPTY, FLAG_FULL, MAX_PAYLOAD_SIZE, PAYLOAD_OFFSET, region_capacity_for,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Decoded value of the flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagState {
    /// Payload area is free for the sender
    Empty,
    /// Payload area holds a message for the receiver
    Full,
}

impl FlagState {
    /// Any nonzero byte counts as full
    pub const fn from_raw(raw: u8) -> Self {
        if raw == FLAG_EMPTY {
            FlagState::Empty
        } else {
            FlagState::Full
        }
    }

    /// Byte written for this state
    pub const fn as_raw(self) -> u8 {
        match self {
            FlagState::Empty => FLAG_EMPTY,
            FlagState::Full => FLAG_FULL,
        }
    }
}

/// A shared region set up for one sender and one receiver
#[derive(Debug)]
pub struct HandoffChannel {
    region: SharedRegion,
}

impl HandoffChannel {
    /// Use `region` as flag plus payload area
    ///
    /// The flag is taken as-is; a freshly acquired region starts `EMPTY`.
    pub fn new(region: SharedRegion) -> ShmResult<Self> {
        if region.capacity() < PAYLOAD_OFFSET {
            return Err(ShmError::InvalidSize {
                size: region.capacity(),
            });
        }
        Ok(Self { region })
    }

    /// Acquire an anonymous region with room for `payload_capacity` bytes
    pub fn with_capacity(payload_capacity: usize) -> ShmResult<Self> {
        if payload_capacity > MAX_PAYLOAD_SIZE {
            return Err(ShmError::InvalidSize {
                size: payload_capacity.saturating_add(PAYLOAD_OFFSET),
            });
        }
        Self::new(SharedRegion::acquire(region_capacity_for(payload_capacity))?)
    }

    /// Largest message this channel carries
    pub fn payload_capacity(&self) -> usize {
        self.region.payload_capacity()
    }

    /// Current flag value
    pub fn state(&self) -> FlagState {
        FlagState::from_raw(self.region.flag().load(Ordering::Acquire))
    }

    /// Underlying region
    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    /// Split into the two endpoints
    ///
    /// After `fork` each process keeps the endpoint of its role and drops the
    /// other; the region stays mapped until both handles in that process are
    /// gone.
    pub fn split(self) -> (Sender, Receiver) {
        let region = Arc::new(self.region);
        (
            Sender {
                region: Arc::clone(&region),
                policy: SpinPolicy::default(),
            },
            Receiver {
                region,
                policy: SpinPolicy::default(),
            },
        )
    }

    /// Keep only the sending endpoint
    pub fn into_sender(self) -> Sender {
        Sender {
            region: Arc::new(self.region),
            policy: SpinPolicy::default(),
        }
    }

    /// Keep only the receiving endpoint
    pub fn into_receiver(self) -> Receiver {
        Receiver {
            region: Arc::new(self.region),
            policy: SpinPolicy::default(),
        }
    }
}

/// Producing endpoint
///
/// With the default unbounded [`SpinPolicy`], `send` spins forever if the
/// receiver dies while a message is in flight. Message length is not carried
/// in-band: the receiver must ask for the same length the sender wrote, and a
/// mismatch goes unnoticed.
#[derive(Debug)]
pub struct Sender {
    region: Arc<SharedRegion>,
    policy: SpinPolicy,
}

impl Sender {
    /// Hand `payload` to the receiver
    ///
    /// Waits for the flag to read `EMPTY`, copies the bytes and publishes them
    /// by storing `FULL`. Returns without waiting for the receiver.
    pub fn send(&mut self, payload: &[u8]) -> ShmResult<()> {
        self.send_with(payload.len(), |area| area.copy_from_slice(payload))
    }

    /// Fill the payload area in place, then publish `len` bytes
    ///
    /// `fill` runs only after the receiver has released the area, and gets
    /// exactly `len` bytes to write.
    pub fn send_with<F>(&mut self, len: usize, fill: F) -> ShmResult<()>
    where
        F: FnOnce(&mut [u8]),
    {
        check_len(len, self.region.payload_capacity())?;
        let flag = self.region.flag();
        spin_until(flag, FlagState::Empty, &self.policy)?;

        // SAFETY: len is within the payload area, and the EMPTY flag observed
        // with acquire ordering gives this side exclusive access to it until
        // FULL is stored below.
        let area = unsafe { std::slice::from_raw_parts_mut(self.region.payload_ptr(), len) };
        fill(area);

        flag.store(FlagState::Full.as_raw(), Ordering::Release);
        Ok(())
    }

    /// Wait until the receiver has taken the last message
    pub fn flush(&mut self) -> ShmResult<()> {
        spin_until(self.region.flag(), FlagState::Empty, &self.policy)
    }

    /// Current flag value
    pub fn state(&self) -> FlagState {
        FlagState::from_raw(self.region.flag().load(Ordering::Acquire))
    }

    /// Largest message this endpoint can send
    pub fn payload_capacity(&self) -> usize {
        self.region.payload_capacity()
    }

    /// Policy applied to every wait
    pub fn spin_policy(&self) -> SpinPolicy {
        self.policy
    }

    /// Replace the wait policy
    pub fn set_spin_policy(&mut self, policy: SpinPolicy) {
        self.policy = policy;
    }

    /// Fail waits with `PartnerGone` once `pid` exits
    pub fn watch_partner(&mut self, pid: u32) {
        self.policy.partner = Some(pid);
    }
}

/// Consuming endpoint
///
/// With the default unbounded [`SpinPolicy`], `receive` spins forever if the
/// sender never publishes. The buffer length decides how many bytes are
/// copied out; it is not checked against what the sender wrote.
#[derive(Debug)]
pub struct Receiver {
    region: Arc<SharedRegion>,
    policy: SpinPolicy,
}

impl Receiver {
    /// Take the next message, copying `buffer.len()` bytes into `buffer`
    pub fn receive(&mut self, buffer: &mut [u8]) -> ShmResult<()> {
        self.receive_with(buffer.len(), |area| buffer.copy_from_slice(area))
    }

    /// Read `len` bytes of the next message in place, then release the area
    ///
    /// The slice handed to `read` is only valid for the duration of the call.
    pub fn receive_with<F, R>(&mut self, len: usize, read: F) -> ShmResult<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        check_len(len, self.region.payload_capacity())?;
        let flag = self.region.flag();
        spin_until(flag, FlagState::Full, &self.policy)?;

        // SAFETY: len is within the payload area, and the FULL flag observed
        // with acquire ordering means the sender finished writing and will not
        // touch the area until EMPTY is stored below.
        let area = unsafe { std::slice::from_raw_parts(self.region.payload_ptr(), len) };
        let out = read(area);

        flag.store(FlagState::Empty.as_raw(), Ordering::Release);
        Ok(out)
    }

    /// Current flag value
    pub fn state(&self) -> FlagState {
        FlagState::from_raw(self.region.flag().load(Ordering::Acquire))
    }

    /// Largest message this endpoint can receive
    pub fn payload_capacity(&self) -> usize {
        self.region.payload_capacity()
    }

    /// Policy applied to every wait
    pub fn spin_policy(&self) -> SpinPolicy {
        self.policy
    }

    /// Replace the wait policy
    pub fn set_spin_policy(&mut self, policy: SpinPolicy) {
        self.policy = policy;
    }

    /// Fail waits with `PartnerGone` once `pid` exits
    pub fn watch_partner(&mut self, pid: u32) {
        self.policy.partner = Some(pid);
    }
}

fn check_len(len: usize, capacity: usize) -> ShmResult<()> {
    if len > capacity {
        return Err(ShmError::PayloadTooLarge { len, capacity });
    }
    Ok(())
}
