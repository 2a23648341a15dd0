//! Channel layout and benchmark constants.
//!
//! These constants are the single source of truth for the flag protocol and
//! the default benchmark matrix. All other crates import from here.

use static_assertions::const_assert;

/// Offset of the flag byte inside a shared region.
pub const FLAG_OFFSET: usize = 0;

/// Offset of the first payload byte inside a shared region.
///
/// The payload area immediately follows the flag byte.
pub const PAYLOAD_OFFSET: usize = FLAG_OFFSET + 1;

/// Flag value: payload area is free, the sender may write.
pub const FLAG_EMPTY: u8 = 0;

/// Flag value: payload area holds a message, the receiver may read.
pub const FLAG_FULL: u8 = 1;

/// Default number of handoffs per message size.
pub const DEFAULT_ITERATIONS: u64 = 100_000;

/// Default largest message size of the benchmark matrix (256 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// Maximum shared region size in bytes (1 GiB).
pub const SHM_MAX_SIZE: usize = 1_073_741_824;

/// Largest payload a region of [`SHM_MAX_SIZE`] can carry.
pub const MAX_PAYLOAD_SIZE: usize = SHM_MAX_SIZE - PAYLOAD_OFFSET;

/// Byte the sender fills its benchmark buffer with.
pub const PAYLOAD_PATTERN: u8 = 0xAB;

/// Directory holding named shared regions.
pub const SHM_DIR: &str = "/dev/shm";

/// File name prefix of named shared regions.
pub const SHM_NAME_PREFIX: &str = "handoff_";

const_assert!(FLAG_EMPTY != FLAG_FULL);
const_assert!(DEFAULT_MAX_MESSAGE_SIZE <= MAX_PAYLOAD_SIZE);

/// Region capacity needed to carry payloads of up to `max_payload` bytes.
#[inline]
pub const fn region_capacity_for(max_payload: usize) -> usize {
    max_payload + PAYLOAD_OFFSET
}
