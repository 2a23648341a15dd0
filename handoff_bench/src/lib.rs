//! # Handoff Benchmark Library
//!
//! Latency and bandwidth measurement for the shared memory handoff channel.
//!
//! # Module Structure
//!
//! - [`driver`] - size matrix, endpoint driving, fork orchestration
//! - [`report`] - per-round results, text and JSON output
//! - [`clock`] - time source used to time rounds
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────┐          ┌────────────────────────────┐
//! │ parent (Rx)                │          │ child (Tx)                 │
//! │  run_rounds(Receiver)      │◄── shm ──│  run_rounds(Sender)        │
//! │  finish_handshake          │          │  finish_handshake          │
//! │  waitpid(child)            │          │  write reports, _exit      │
//! │  write reports             │          │                            │
//! └────────────────────────────┘          └────────────────────────────┘
//! ```

pub mod clock;
pub mod driver;
pub mod report;

pub use clock::{Clock, SystemClock};
pub use driver::{
    Endpoint, FINISH_TIMEOUT, finish_handshake, message_sizes, run_forked, run_role, run_rounds,
    spin_policy_for,
};
pub use report::{RoundReport, write_reports};
