//! # Flag-gated Shared Memory Handoff
//!
//! Zero-copy, single-producer/single-consumer message handoff between two
//! processes that map the same memory region. One byte of the region is a
//! latch (`EMPTY`/`FULL`); the rest carries the payload. Both sides busy-wait
//! on the latch instead of blocking in the kernel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐       ┌──────────────────────────┐       ┌─────────────┐
//! │   Sender    │       │      SharedRegion        │       │  Receiver   │
//! │             ├──────►│ [flag | payload ........]├──────►│             │
//! │ wait EMPTY  │       │   0      1 .. capacity   │       │ wait FULL   │
//! │ copy in     │       └──────────────────────────┘       │ copy out    │
//! │ store FULL  │                                          │ store EMPTY │
//! └─────────────┘                                          └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use handoff_shm::{HandoffChannel, SpinPolicy};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut tx, mut rx) = HandoffChannel::with_capacity(1024)?.split();
//! rx.set_spin_policy(SpinPolicy::unbounded().with_timeout(Duration::from_secs(1)));
//!
//! let producer = std::thread::spawn(move || tx.send(&[7u8; 1024]));
//!
//! let mut buf = vec![0u8; 1024];
//! rx.receive(&mut buf)?;
//! assert!(buf.iter().all(|&b| b == 7));
//! producer.join().unwrap()?;
//! # Ok(())
//! # }
//! ```
//!
//! Across processes, acquire the channel before `fork` and keep one endpoint
//! on each side of it.
//!
//! ## Known Weaknesses
//!
//! - With the default unbounded [`SpinPolicy`] a crashed partner leaves the
//!   survivor spinning forever.
//! - Message length is not sent: both sides must agree on it out of band.
//! - A waiting endpoint burns a full core.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod platform;
pub mod region;
pub mod spin;

pub use channel::{FlagState, HandoffChannel, Receiver, Sender};
pub use error::{ShmError, ShmResult};
pub use region::SharedRegion;
pub use spin::SpinPolicy;
