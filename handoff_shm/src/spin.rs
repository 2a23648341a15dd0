//! Spin-wait on the flag byte with an optional bound.
//!
//! The default policy spins forever, which is the lowest-latency behavior and
//! also means a dead partner leaves the caller spinning. A bounded policy
//! turns that livelock into an error.

use crate::channel::FlagState;
use crate::error::{ShmError, ShmResult};
use crate::platform::is_process_alive;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Spins between clock reads when a timeout is set
pub const TIMEOUT_CHECK_INTERVAL: u64 = 1 << 10;

/// Spins between partner liveness checks (one syscall each)
pub const PARTNER_CHECK_INTERVAL: u64 = 1 << 16;

/// Limits on a single spin-wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpinPolicy {
    /// Give up after this many spins
    pub max_spins: Option<u64>,
    /// Give up after this much wall time
    pub timeout: Option<Duration>,
    /// Give up once this process is gone
    pub partner: Option<u32>,
}

impl SpinPolicy {
    /// Spin until the flag flips, however long that takes
    pub const fn unbounded() -> Self {
        Self {
            max_spins: None,
            timeout: None,
            partner: None,
        }
    }

    /// Bound the number of spins
    pub const fn with_max_spins(mut self, max_spins: u64) -> Self {
        self.max_spins = Some(max_spins);
        self
    }

    /// Bound the wall time spent in one wait
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the wait when `pid` exits
    pub const fn with_partner(mut self, pid: u32) -> Self {
        self.partner = Some(pid);
        self
    }

    /// Whether any limit is set
    pub const fn is_bounded(&self) -> bool {
        self.max_spins.is_some() || self.timeout.is_some() || self.partner.is_some()
    }
}

/// Spin until the flag reads as `wanted`, loading it with acquire ordering
pub(crate) fn spin_until(flag: &AtomicU8, wanted: FlagState, policy: &SpinPolicy) -> ShmResult<()> {
    if FlagState::from_raw(flag.load(Ordering::Acquire)) == wanted {
        return Ok(());
    }

    let deadline = policy.timeout.map(|timeout| Instant::now() + timeout);
    let mut spins: u64 = 0;

    loop {
        std::hint::spin_loop();
        if FlagState::from_raw(flag.load(Ordering::Acquire)) == wanted {
            return Ok(());
        }
        spins += 1;

        if let Some(max_spins) = policy.max_spins {
            if spins >= max_spins {
                return Err(ShmError::SpinTimeout {
                    waiting_for: wanted,
                    spins,
                });
            }
        }

        if let Some(deadline) = deadline {
            if spins % TIMEOUT_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                return Err(ShmError::SpinTimeout {
                    waiting_for: wanted,
                    spins,
                });
            }
        }

        if let Some(pid) = policy.partner {
            if spins % PARTNER_CHECK_INTERVAL == 0 && !is_process_alive(pid) {
                return Err(ShmError::PartnerGone { pid });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff::consts::{FLAG_EMPTY, FLAG_FULL};

    #[test]
    fn test_default_is_unbounded() {
        assert_eq!(SpinPolicy::default(), SpinPolicy::unbounded());
        assert!(!SpinPolicy::default().is_bounded());
        assert!(SpinPolicy::unbounded().with_max_spins(10).is_bounded());
    }

    #[test]
    fn test_fast_path() {
        let flag = AtomicU8::new(FLAG_FULL);
        let policy = SpinPolicy::unbounded().with_max_spins(1);
        assert!(spin_until(&flag, FlagState::Full, &policy).is_ok());
    }

    #[test]
    fn test_max_spins() {
        let flag = AtomicU8::new(FLAG_EMPTY);
        let policy = SpinPolicy::unbounded().with_max_spins(100);
        let result = spin_until(&flag, FlagState::Full, &policy);
        assert!(matches!(
            result,
            Err(ShmError::SpinTimeout {
                waiting_for: FlagState::Full,
                spins: 100
            })
        ));
    }

    #[test]
    fn test_group_pid_partner_is_gone() {
        let flag = AtomicU8::new(FLAG_EMPTY);
        let policy = SpinPolicy::unbounded().with_partner(0);
        assert!(policy.is_bounded());
        assert!(matches!(
            spin_until(&flag, FlagState::Full, &policy),
            Err(ShmError::PartnerGone { pid: 0 })
        ));
    }

    #[test]
    fn test_timeout() {
        let flag = AtomicU8::new(FLAG_FULL);
        let policy = SpinPolicy::unbounded().with_timeout(Duration::from_millis(20));
        let start = Instant::now();
        let result = spin_until(&flag, FlagState::Empty, &policy);
        assert!(matches!(result, Err(ShmError::SpinTimeout { .. })));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_flag_flipped_by_other_thread() {
        let flag = std::sync::Arc::new(AtomicU8::new(FLAG_EMPTY));
        let setter = {
            let flag = flag.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(5));
                flag.store(FLAG_FULL, Ordering::Release);
            })
        };
        let policy = SpinPolicy::unbounded().with_timeout(Duration::from_secs(10));
        assert!(spin_until(&flag, FlagState::Full, &policy).is_ok());
        setter.join().unwrap();
    }
}
