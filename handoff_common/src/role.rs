//! Role of a process in a handoff pair.
//!
//! Displayed as the `Tx` / `Rx` tag used in benchmark reports.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Which side of the channel a process drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Role {
    /// Writes payloads and raises the flag.
    #[serde(rename = "Tx")]
    Sender = 0,
    /// Reads payloads and clears the flag.
    #[serde(rename = "Rx")]
    Receiver = 1,
}

impl Role {
    /// Short report tag.
    #[inline]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Sender => "Tx",
            Self::Receiver => "Rx",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
