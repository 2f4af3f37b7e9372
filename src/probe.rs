//! A single lease-acquisition attempt.
//!
//! Exactly one probe is active per client; starting a new one cancels
//! whichever was running. The state is a tagged union per §9's design
//! note rather than one struct with fields that are only valid in some
//! states.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::ProbeConfig;
use crate::lease::Lease;

/// Per-state data for the probe's position in the RFC 2131 flow (§4.6).
/// Carries only what's meaningful in that state, rather than a single
/// struct full of `Option`s.
pub enum ProbeState {
    Init {
        attempt: usize,
    },
    Selecting {
        offers: Vec<Lease>,
        deadline: Instant,
    },
    Requesting {
        offer: Lease,
        attempt: usize,
    },
    InitReboot {
        requested_ip: Ipv4Addr,
    },
    Rebooting {
        requested_ip: Ipv4Addr,
        attempt: usize,
    },
    Inform {
        attempt: usize,
    },
    Bound {
        lease: Lease,
    },
    Renewing {
        lease: Lease,
    },
    Rebinding {
        lease: Lease,
    },
    Cancelled,
}

impl ProbeState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Selecting { .. } => "selecting",
            Self::Requesting { .. } => "requesting",
            Self::InitReboot { .. } => "init-reboot",
            Self::Rebooting { .. } => "rebooting",
            Self::Inform { .. } => "inform",
            Self::Bound { .. } => "bound",
            Self::Renewing { .. } => "renewing",
            Self::Rebinding { .. } => "rebinding",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn current_lease(&self) -> Option<&Lease> {
        match self {
            Self::Bound { lease } | Self::Renewing { lease } | Self::Rebinding { lease } => {
                Some(lease)
            }
            _ => None,
        }
    }
}

pub struct ProbeInner {
    pub config: ProbeConfig,
    xid: Cell<u32>,
    pub state: RefCell<ProbeState>,
    pub userdata: RefCell<Option<Box<dyn Any>>>,
    pub entered_state_at: RefCell<Instant>,
}

/// Reference-counted handle to a probe. Dropping the last clone does not
/// itself cancel the probe (the client's strong ref is what keeps it
/// alive); see `Client::probe` for cancellation-on-replacement semantics.
#[derive(Clone)]
pub struct Probe(pub(crate) Rc<ProbeInner>);

impl Probe {
    pub(crate) fn new(config: ProbeConfig, xid: u32, now: Instant) -> Self {
        let initial = if config.inform_only {
            ProbeState::Inform { attempt: 0 }
        } else if config.init_reboot {
            ProbeState::InitReboot {
                requested_ip: config.requested_ip.expect("validated by ProbeConfig::validate"),
            }
        } else {
            ProbeState::Init { attempt: 0 }
        };

        Self(Rc::new(ProbeInner {
            config,
            xid,
            state: RefCell::new(initial),
            userdata: RefCell::new(None),
            entered_state_at: RefCell::new(now),
        }))
    }

    pub fn xid(&self) -> u32 {
        self.0.xid.get()
    }

    /// Rotates the probe's transaction id on a fresh INIT cycle (§4.2's
    /// xid rotation, §4.6's NAK/expiry/decline restarts).
    pub(crate) fn set_xid(&self, xid: u32) {
        self.0.xid.set(xid);
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.0.config
    }

    pub fn state_name(&self) -> &'static str {
        self.0.state.borrow().name()
    }

    pub fn current_lease(&self) -> Option<Lease> {
        self.0.state.borrow().current_lease().cloned()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.0.state.borrow(), ProbeState::Cancelled)
    }

    pub(crate) fn set_state(&self, state: ProbeState, now: Instant) {
        *self.0.state.borrow_mut() = state;
        *self.0.entered_state_at.borrow_mut() = now;
    }

    /// Seconds elapsed since entering the current state, saturated at
    /// 65535 for the wire `secs` field (RFC 2131 §4.6).
    pub fn secs_in_state(&self, now: Instant) -> u16 {
        let elapsed = now
            .saturating_duration_since(*self.0.entered_state_at.borrow())
            .as_secs();
        elapsed.min(u16::MAX as u64) as u16
    }

    pub(crate) fn cancel(&self, now: Instant) {
        self.set_state(ProbeState::Cancelled, now);
    }

    pub fn set_userdata(&self, data: Box<dyn Any>) {
        *self.0.userdata.borrow_mut() = Some(data);
    }

    pub fn userdata(&self) -> std::cell::Ref<'_, Option<Box<dyn Any>>> {
        self.0.userdata.borrow()
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<ProbeInner> {
        Rc::downgrade(&self.0)
    }
}

/// Computes the SELECTING collection-window deadline (default 10s,
/// matching the schedule in §4.6).
pub fn selecting_deadline(now: Instant) -> Instant {
    now + Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_probe_starts_in_init() {
        let probe = Probe::new(ProbeConfig::new(), 1, Instant::now());
        assert_eq!(probe.state_name(), "init");
    }

    #[test]
    fn init_reboot_probe_starts_in_init_reboot() {
        let cfg = ProbeConfig::new().init_reboot(Ipv4Addr::new(192, 0, 2, 10));
        let probe = Probe::new(cfg, 1, Instant::now());
        assert_eq!(probe.state_name(), "init-reboot");
    }

    #[test]
    fn inform_only_probe_starts_in_inform() {
        let cfg = ProbeConfig::new().inform_only();
        let probe = Probe::new(cfg, 1, Instant::now());
        assert_eq!(probe.state_name(), "inform");
    }

    #[test]
    fn cancelling_marks_state_cancelled() {
        let probe = Probe::new(ProbeConfig::new(), 1, Instant::now());
        probe.cancel(Instant::now());
        assert!(probe.is_cancelled());
    }

    #[test]
    fn secs_in_state_saturates_at_u16_max() {
        let start = Instant::now();
        let probe = Probe::new(ProbeConfig::new(), 1, start);
        let far_future = start + Duration::from_secs(100_000);
        assert_eq!(probe.secs_in_state(far_future), u16::MAX);
    }
}
