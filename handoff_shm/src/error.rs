//! Error types for shared memory handoff operations

use crate::channel::FlagState;
use thiserror::Error;

/// Errors that can occur while acquiring a region or driving the channel
#[derive(Error, Debug)]
pub enum ShmError {
    /// The platform could not provide shared, coherent memory
    #[error("Shared memory exhausted: cannot map {size} bytes: {source}")]
    ResourceExhausted {
        /// Requested capacity in bytes
        size: usize,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Creating the partner process failed
    #[error("Process creation failed: {source}")]
    ProcessCreationFailure {
        /// Source nix error
        #[source]
        source: nix::Error,
    },

    /// Invalid region capacity
    #[error("Invalid region size: {size} bytes (must be 1 byte to 1GiB)")]
    InvalidSize {
        /// Attempted size in bytes
        size: usize,
    },

    /// Message does not fit the payload area
    #[error("Payload of {len} bytes exceeds payload area of {capacity} bytes")]
    PayloadTooLarge {
        /// Requested transfer length
        len: usize,
        /// Payload area capacity
        capacity: usize,
    },

    /// Bounded spin-wait gave up
    #[error("Spin-wait for {waiting_for:?} flag gave up after {spins} spins")]
    SpinTimeout {
        /// Flag state the caller was waiting for
        waiting_for: FlagState,
        /// Spins performed before giving up
        spins: u64,
    },

    /// Watched partner process no longer exists
    #[error("Partner process {pid} is gone")]
    PartnerGone {
        /// Partner process ID
        pid: u32,
    },

    /// Partner process terminated abnormally
    #[error("Partner process {pid} failed: {status}")]
    PartnerFailed {
        /// Partner process ID
        pid: u32,
        /// Exit status description
        status: String,
    },

    /// Named region already exists
    #[error("Region already exists: {name}")]
    AlreadyExists {
        /// Region name
        name: String,
    },

    /// Named region not found
    #[error("Region not found: {name}")]
    NotFound {
        /// Region name
        name: String,
    },

    /// Region name cannot be used as a file name under `/dev/shm`
    #[error("Invalid region name: {name:?}")]
    InvalidName {
        /// Rejected name
        name: String,
    },

    /// Process ID outside the range of real processes
    #[error("Invalid process ID: {pid}")]
    InvalidPid {
        /// Rejected process ID
        pid: u32,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
