//! A single monotonic timer shared by retransmit backoff and lease
//! timers (T1/T2/expiry), reprogrammed on every state transition that
//! changes the next-fire instant rather than juggling several timers.

use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};

use rand::Rng;

use crate::error::Result;

/// Base retransmission backoff schedule (RFC 2131 §4.1): 4s, 8s, 16s,
/// 32s, 64s, then capped at 64s, each with ±1s uniform jitter applied
/// fresh on every retransmit.
const BACKOFF_SCHEDULE_SECS: [u64; 5] = [4, 8, 16, 32, 64];

pub struct Timer {
    fd: TimerFd,
}

impl Timer {
    pub fn new() -> Result<Self> {
        let fd = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_NONBLOCK)
            .map_err(crate::error::Error::Errno)?;
        Ok(Self { fd })
    }

    /// Arms a one-shot fire at `duration` from now, disarming any
    /// previous timer first.
    pub fn arm(&self, duration: Duration) -> Result<()> {
        let spec = TimeSpec::from_duration(duration);
        self.fd
            .set(Expiration::OneShot(spec), TimerSetTimeFlags::empty())
            .map_err(crate::error::Error::Errno)?;
        Ok(())
    }

    pub fn disarm(&self) -> Result<()> {
        self.fd.unset().map_err(crate::error::Error::Errno)?;
        Ok(())
    }

    /// Consumes the expiration count so the fd stops reading ready; a
    /// no-op (returns 0) if the timer was not actually due.
    pub fn consume(&self) -> Result<u64> {
        match self.fd.wait() {
            Ok(n) => Ok(n),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(crate::error::Error::Errno(e)),
        }
    }
}

impl AsRawFd for Timer {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_fd().as_raw_fd()
    }
}

/// Returns the backoff delay for retransmit attempt `attempt` (0-indexed),
/// capped at the schedule's last entry, with ±1s uniform jitter applied.
pub fn backoff(attempt: usize, rng: &mut impl Rng) -> Duration {
    let base = BACKOFF_SCHEDULE_SECS[attempt.min(BACKOFF_SCHEDULE_SECS.len() - 1)];
    jittered(base, rng)
}

fn jittered(base_secs: u64, rng: &mut impl Rng) -> Duration {
    let jitter_ms: i64 = rng.gen_range(-1000..=1000);
    let base_ms = base_secs as i64 * 1000;
    Duration::from_millis((base_ms + jitter_ms).max(0) as u64)
}

/// Retransmit interval while RENEWING: half the remaining time to T2,
/// floored at 60s.
pub fn renewing_interval(remaining_to_t2: Duration) -> Duration {
    Duration::from_secs((remaining_to_t2.as_secs() / 2).max(60))
}

/// Retransmit interval while REBINDING: half the remaining time to
/// expiry, floored at 60s.
pub fn rebinding_interval(remaining_to_expiry: Duration) -> Duration {
    Duration::from_secs((remaining_to_expiry.as_secs() / 2).max(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_last_schedule_entry() {
        let mut rng = rand::thread_rng();
        let d = backoff(50, &mut rng);
        assert!(d.as_secs() >= 63 && d.as_secs() <= 65);
    }

    #[test]
    fn backoff_first_attempt_is_near_four_seconds() {
        let mut rng = rand::thread_rng();
        let d = backoff(0, &mut rng);
        assert!(d.as_millis() >= 3000 && d.as_millis() <= 5000);
    }

    #[test]
    fn renewing_interval_floors_at_sixty_seconds() {
        assert_eq!(renewing_interval(Duration::from_secs(10)), Duration::from_secs(60));
        assert_eq!(renewing_interval(Duration::from_secs(400)), Duration::from_secs(200));
    }
}
