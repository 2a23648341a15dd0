//! Benchmark driver: runs the size matrix on one endpoint and times it.
//!
//! [`run_forked`] is the full two-process benchmark. The pieces it is built
//! from ([`run_rounds`], [`finish_handshake`]) work on any [`Endpoint`], so
//! tests can drive both sides from two threads instead.

use crate::clock::{Clock, SystemClock};
use crate::report::{RoundReport, write_reports};
use handoff_common::Role;
use handoff_common::config::BenchSection;
use handoff_common::consts::PAYLOAD_PATTERN;
use handoff_shm::platform::{
    Forked, current_cpu, fork_process, get_current_pid, pin_to_cpu, terminate_process,
    wait_for_child,
};
use handoff_shm::{HandoffChannel, Receiver, Sender, ShmError, ShmResult, SpinPolicy};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bound on the closing handoff after the last round
pub const FINISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Message sizes of the matrix: 0, then powers of two up to and including `max`
pub fn message_sizes(max: usize) -> impl Iterator<Item = usize> {
    std::iter::once(0)
        .chain(std::iter::successors(Some(1usize), |s| s.checked_mul(2)))
        .take_while(move |&s| s <= max)
}

/// Spin policy described by the `[bench]` settings
pub fn spin_policy_for(section: &BenchSection) -> SpinPolicy {
    let mut policy = SpinPolicy::unbounded();
    policy.max_spins = section.spin_limit;
    policy.timeout = section.timeout();
    policy
}

/// One side of the channel, as driven by the benchmark
#[derive(Debug)]
pub enum Endpoint {
    /// Copies the buffer in and raises the flag
    Sender(Sender),
    /// Waits for the flag and copies the payload out
    Receiver(Receiver),
}

impl Endpoint {
    /// Role tag for reports
    pub fn role(&self) -> Role {
        match self {
            Endpoint::Sender(_) => Role::Sender,
            Endpoint::Receiver(_) => Role::Receiver,
        }
    }

    /// One handoff of `buf.len()` bytes: send it or fill it
    pub fn transfer(&mut self, buf: &mut [u8]) -> ShmResult<()> {
        match self {
            Endpoint::Sender(tx) => tx.send(buf),
            Endpoint::Receiver(rx) => rx.receive(buf),
        }
    }

    /// `count` handoffs of the same buffer
    pub fn transfer_many(&mut self, buf: &mut [u8], count: u64) -> ShmResult<()> {
        match self {
            Endpoint::Sender(tx) => {
                for _ in 0..count {
                    tx.send(buf)?;
                }
            }
            Endpoint::Receiver(rx) => {
                for _ in 0..count {
                    rx.receive(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Largest message this endpoint handles
    pub fn payload_capacity(&self) -> usize {
        match self {
            Endpoint::Sender(tx) => tx.payload_capacity(),
            Endpoint::Receiver(rx) => rx.payload_capacity(),
        }
    }

    /// Policy applied to every wait
    pub fn spin_policy(&self) -> SpinPolicy {
        match self {
            Endpoint::Sender(tx) => tx.spin_policy(),
            Endpoint::Receiver(rx) => rx.spin_policy(),
        }
    }

    /// Replace the wait policy
    pub fn set_spin_policy(&mut self, policy: SpinPolicy) {
        match self {
            Endpoint::Sender(tx) => tx.set_spin_policy(policy),
            Endpoint::Receiver(rx) => rx.set_spin_policy(policy),
        }
    }
}

/// Run `iterations` handoffs at each size and time every round
///
/// Only the handoff loop sits between the two clock reads; logging and
/// report construction happen outside it.
pub fn run_rounds<I, C>(
    endpoint: &mut Endpoint,
    sizes: I,
    iterations: u64,
    clock: &C,
) -> ShmResult<Vec<RoundReport>>
where
    I: IntoIterator<Item = usize>,
    C: Clock + ?Sized,
{
    let sizes: Vec<usize> = sizes.into_iter().collect();
    let max = sizes.iter().copied().max().unwrap_or(0);
    let capacity = endpoint.payload_capacity();
    if max > capacity {
        return Err(ShmError::PayloadTooLarge { len: max, capacity });
    }

    let role = endpoint.role();
    let fill = match role {
        Role::Sender => PAYLOAD_PATTERN,
        Role::Receiver => 0,
    };
    let mut buf = vec![fill; max];
    let pid = get_current_pid();
    let mut reports = Vec::with_capacity(sizes.len());

    for size in sizes {
        let start = clock.now();
        endpoint.transfer_many(&mut buf[..size], iterations)?;
        let end = clock.now();

        let report = RoundReport::new(role, pid, size, iterations, end - start);
        debug!(
            role = %role,
            size,
            latency = report.latency(),
            "round complete"
        );
        reports.push(report);
    }

    Ok(reports)
}

/// Close the benchmark with one extra zero-length handoff
///
/// Handoffs alternate strictly, so both sides completing this one means they
/// performed the same number of transfers. The sender also waits for the
/// receiver to take it. The wait is bounded by `timeout` on top of the
/// endpoint's own policy, which is restored afterwards.
pub fn finish_handshake(endpoint: &mut Endpoint, timeout: Duration) -> ShmResult<()> {
    let saved = endpoint.spin_policy();
    let mut bounded = saved;
    bounded.timeout = Some(saved.timeout.map_or(timeout, |t| t.min(timeout)));
    endpoint.set_spin_policy(bounded);

    let result = match endpoint {
        Endpoint::Sender(tx) => tx.send(&[]).and_then(|()| tx.flush()),
        Endpoint::Receiver(rx) => rx.receive(&mut []),
    };

    endpoint.set_spin_policy(saved);
    result
}

/// Rounds plus completion handshake for one endpoint
pub fn run_role<C: Clock + ?Sized>(
    endpoint: &mut Endpoint,
    section: &BenchSection,
    clock: &C,
) -> ShmResult<Vec<RoundReport>> {
    let reports = run_rounds(
        endpoint,
        message_sizes(section.max_message_size),
        section.iterations,
        clock,
    )?;
    finish_handshake(endpoint, FINISH_TIMEOUT)?;
    Ok(reports)
}

fn pin_role(role: Role, cpu: Option<usize>) -> ShmResult<()> {
    if let Some(cpu) = cpu {
        pin_to_cpu(cpu)?;
        debug!(role = %role, cpu, running_on = ?current_cpu(), "pinned");
    }
    Ok(())
}

/// Fork into receiver (parent) and sender (child) and run the benchmark
///
/// Each process writes its own reports to `out` once its rounds are done.
/// The child exits right after; the parent reaps it and writes its reports
/// only then, so sender lines come before receiver lines on a shared stream.
pub fn run_forked<W: Write>(section: &BenchSection, out: &mut W) -> ShmResult<()> {
    let channel = HandoffChannel::with_capacity(section.max_message_size)?;
    let (tx, rx) = channel.split();
    let policy = spin_policy_for(section);
    let parent = get_current_pid();

    info!(
        iterations = section.iterations,
        max_message_size = section.max_message_size,
        bounded = policy.is_bounded(),
        "starting handoff benchmark"
    );

    // SAFETY: called from the single-threaded benchmark process; the child
    // runs its role and leaves through _exit.
    match unsafe { fork_process() }? {
        Forked::Child => {
            drop(rx);
            let code = match run_sender(tx, policy, parent, section, out) {
                Ok(()) => 0,
                Err(e) => {
                    error!("sender failed: {}", e);
                    1
                }
            };
            // SAFETY: terminates only this process; buffers were flushed above.
            unsafe { libc::_exit(code) }
        }
        Forked::Parent { child } => {
            drop(tx);
            let mut endpoint = Endpoint::Receiver(rx);
            endpoint.set_spin_policy(policy.with_partner(child));

            let outcome = pin_role(Role::Receiver, section.receiver_cpu)
                .and_then(|()| run_role(&mut endpoint, section, &SystemClock));

            match outcome {
                Ok(reports) => {
                    wait_for_child(child)?;
                    write_reports(out, &reports, section.output)?;
                    info!(rounds = reports.len(), "handoff benchmark complete");
                    Ok(())
                }
                Err(e) => {
                    warn!(child, "receiver failed, stopping sender");
                    if let Err(kill_err) = terminate_process(child) {
                        warn!("failed to stop sender {}: {}", child, kill_err);
                    }
                    let _ = wait_for_child(child);
                    Err(e)
                }
            }
        }
    }
}

fn run_sender<W: Write>(
    tx: Sender,
    policy: SpinPolicy,
    parent: u32,
    section: &BenchSection,
    out: &mut W,
) -> ShmResult<()> {
    pin_role(Role::Sender, section.sender_cpu)?;
    let mut endpoint = Endpoint::Sender(tx);
    endpoint.set_spin_policy(policy.with_partner(parent));

    let reports = run_role(&mut endpoint, section, &SystemClock)?;
    write_reports(out, &reports, section.output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_sizes() {
        assert_eq!(message_sizes(0).collect::<Vec<_>>(), vec![0]);
        assert_eq!(message_sizes(1).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(message_sizes(5).collect::<Vec<_>>(), vec![0, 1, 2, 4]);

        let full: Vec<usize> = message_sizes(262_144).collect();
        assert_eq!(full.len(), 20);
        assert_eq!(full[..4], [0, 1, 2, 4]);
        assert_eq!(full.last(), Some(&262_144));
    }

    #[test]
    fn test_message_sizes_no_overflow() {
        assert_eq!(message_sizes(usize::MAX).count(), usize::BITS as usize + 1);
    }

    #[test]
    fn test_spin_policy_for() {
        let section = BenchSection::default();
        assert!(!spin_policy_for(&section).is_bounded());

        let section = BenchSection {
            spin_limit: Some(500),
            timeout_ms: Some(20),
            ..BenchSection::default()
        };
        let policy = spin_policy_for(&section);
        assert_eq!(policy.max_spins, Some(500));
        assert_eq!(policy.timeout, Some(Duration::from_millis(20)));
        assert_eq!(policy.partner, None);
    }

    #[test]
    fn test_endpoint_roles() {
        let (tx, rx) = HandoffChannel::with_capacity(4).unwrap().split();
        assert_eq!(Endpoint::Sender(tx).role(), Role::Sender);
        assert_eq!(Endpoint::Receiver(rx).role(), Role::Receiver);
    }

    #[test]
    fn test_rounds_reject_oversize() {
        let (tx, _rx) = HandoffChannel::with_capacity(4).unwrap().split();
        let mut endpoint = Endpoint::Sender(tx);
        let result = run_rounds(&mut endpoint, [0, 8], 1, &SystemClock);
        assert!(matches!(
            result,
            Err(ShmError::PayloadTooLarge {
                len: 8,
                capacity: 4
            })
        ));
    }

    #[test]
    fn test_handshake_restores_policy() {
        let (tx, rx) = HandoffChannel::with_capacity(0).unwrap().split();
        let mut sender = Endpoint::Sender(tx);
        let mut receiver = Endpoint::Receiver(rx);

        let policy = SpinPolicy::unbounded().with_max_spins(u64::MAX);
        receiver.set_spin_policy(policy);

        let handle = std::thread::spawn(move || finish_handshake(&mut sender, FINISH_TIMEOUT));
        finish_handshake(&mut receiver, FINISH_TIMEOUT).unwrap();
        handle.join().unwrap().unwrap();

        assert_eq!(receiver.spin_policy(), policy);
    }

    #[test]
    fn test_lone_receiver_handshake_times_out() {
        let (_tx, rx) = HandoffChannel::with_capacity(0).unwrap().split();
        let mut receiver = Endpoint::Receiver(rx);
        let result = finish_handshake(&mut receiver, Duration::from_millis(10));
        assert!(matches!(result, Err(ShmError::SpinTimeout { .. })));
        assert!(!receiver.spin_policy().is_bounded());
    }

    #[test]
    fn test_lone_sender_handshake_times_out() {
        let (tx, _rx) = HandoffChannel::with_capacity(0).unwrap().split();
        let mut sender = Endpoint::Sender(tx);
        let result = finish_handshake(&mut sender, Duration::from_millis(10));
        assert!(matches!(result, Err(ShmError::SpinTimeout { .. })));
    }
}
