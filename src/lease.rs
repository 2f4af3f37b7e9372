//! Immutable lease snapshots.
//!
//! A lease is constructed once from a server's OFFER or ACK and never
//! mutated afterwards; its lifecycle (offered/selected/acked) is tracked
//! by a `Cell` purely for the caller-visible state machine gating
//! `decline`, not because the lease's data changes.

use std::cell::Cell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::wire::{Message, MessageType, OptionTable};

/// Where a lease sits in its caller-visible lifecycle. Decline is only
/// valid in `Selected` (before ACK) and `Acked` (before expiry).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LeaseState {
    Offered,
    Selected,
    Acked,
    Declined,
}

#[derive(Debug)]
pub struct LeaseInner {
    pub yiaddr: Ipv4Addr,
    pub server_id: Option<Ipv4Addr>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Vec<Ipv4Addr>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub t1: Option<u32>,
    pub t2: Option<u32>,
    pub message_type: MessageType,
    pub options: OptionTable,
    state: Cell<LeaseState>,
    /// When this snapshot was accepted as the bound lease (set on ACK);
    /// T1/T2/expiry are scheduled relative to this instant, not to when
    /// the OFFER/ACK happened to be parsed.
    granted_at: Cell<Option<Instant>>,
}

/// A reference-counted, immutable lease handle. Cloning is cheap and
/// shares the same underlying snapshot; the lease is only actually freed
/// once the last clone is dropped.
#[derive(Clone, Debug)]
pub struct Lease(pub(crate) Rc<LeaseInner>);

impl Lease {
    /// Builds a lease snapshot from a decoded OFFER or ACK, normalizing
    /// T1/T2 per RFC 2131 §4.4.5 (T1 = T/2, T2 = 7T/8 when absent) and
    /// validating `0 < T1 < T2 < T` whenever a lease time is present.
    pub fn from_message(msg: &Message) -> Result<Self> {
        let message_type = msg
            .options
            .message_type()
            .ok_or(Error::InvalidMessageType)?;

        let yiaddr = msg.header.yiaddr;
        if yiaddr.is_unspecified()
            && matches!(message_type, MessageType::Offer | MessageType::Ack)
        {
            return Err(Error::Malformed);
        }

        let server_id = msg.options.server_identifier();
        if message_type == MessageType::Ack && server_id.is_none() {
            return Err(Error::Malformed);
        }

        let (lease_time, t1, t2) = normalize_timers(
            msg.options.lease_time(),
            msg.options.renewal_t1(),
            msg.options.rebinding_t2(),
        )?;

        Ok(Self(Rc::new(LeaseInner {
            yiaddr,
            server_id,
            subnet_mask: msg.options.subnet_mask(),
            routers: msg.options.routers(),
            dns_servers: msg.options.dns_servers(),
            lease_time,
            t1,
            t2,
            message_type,
            options: msg.options.clone(),
            state: Cell::new(LeaseState::Offered),
            granted_at: Cell::new(None),
        })))
    }

    /// Records `now` as the instant this lease became the bound lease;
    /// idempotent so a RENEWING/REBINDING refresh can call it again to
    /// re-anchor the T1/T2/expiry schedule.
    pub(crate) fn mark_granted(&self, now: Instant) {
        self.0.granted_at.set(Some(now));
    }

    pub fn granted_at(&self) -> Option<Instant> {
        self.0.granted_at.get()
    }

    /// Absolute instant T1/T2/expiry fall at, given the relative seconds
    /// from `granted_at`. `None` if the lease hasn't been granted yet or
    /// `secs` itself is `None` (infinite lease).
    pub fn instant_after(&self, secs: Option<u32>) -> Option<Instant> {
        Some(self.granted_at()? + Duration::from_secs(secs? as u64))
    }

    pub fn t2_instant(&self) -> Option<Instant> {
        self.instant_after(self.0.t2)
    }

    pub fn expiry_instant(&self) -> Option<Instant> {
        self.instant_after(self.0.lease_time)
    }

    pub fn state(&self) -> LeaseState {
        self.0.state.get()
    }

    pub(crate) fn set_state(&self, state: LeaseState) {
        self.0.state.set(state);
    }

    pub fn yiaddr(&self) -> Ipv4Addr {
        self.0.yiaddr
    }

    pub fn server_id(&self) -> Option<Ipv4Addr> {
        self.0.server_id
    }

    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        self.0.subnet_mask
    }

    pub fn routers(&self) -> &[Ipv4Addr] {
        &self.0.routers
    }

    pub fn dns_servers(&self) -> &[Ipv4Addr] {
        &self.0.dns_servers
    }

    /// `None` means an infinite lease (wire value 0xFFFFFFFF); callers
    /// must never schedule an expiry in that case.
    pub fn lease_time(&self) -> Option<Duration> {
        self.0.lease_time.map(|secs| Duration::from_secs(secs as u64))
    }

    pub fn t1(&self) -> Option<Duration> {
        self.0.t1.map(|secs| Duration::from_secs(secs as u64))
    }

    pub fn t2(&self) -> Option<Duration> {
        self.0.t2.map(|secs| Duration::from_secs(secs as u64))
    }

    /// Returns the raw bytes stored under `code`, or `None` if the lease
    /// carries no such option.
    pub fn query(&self, code: u8) -> Option<&[u8]> {
        self.0.options.get(code)
    }

    /// Valid only in `Selected` (before ACK) or `Acked` (before expiry);
    /// returns `Error::Internal` otherwise. Side effect (sending the
    /// DHCPDECLINE and returning the owning probe to INIT) is driven by
    /// the client/probe layer, which calls this after validating state.
    pub fn decline(&self) -> Result<()> {
        match self.state() {
            LeaseState::Selected | LeaseState::Acked => {
                self.set_state(LeaseState::Declined);
                Ok(())
            }
            _ => Err(Error::Internal("lease cannot be declined in its current state")),
        }
    }
}

/// Normalizes the wire lease time alongside T1/T2, also folding the
/// `0xFFFFFFFF` ("infinite") sentinel into a `None` lease time: none of
/// the three ever schedules a timer for an infinite lease.
fn normalize_timers(
    lease_time: Option<u32>,
    t1: Option<u32>,
    t2: Option<u32>,
) -> Result<(Option<u32>, Option<u32>, Option<u32>)> {
    let Some(total) = lease_time else {
        return Ok((None, t1, t2));
    };

    if total == crate::wire::INFINITE_LEASE {
        return Ok((None, None, None));
    }

    let t1 = t1.unwrap_or(total / 2);
    let t2 = t2.unwrap_or((total as u64 * 7 / 8) as u32);

    if !(0 < t1 && t1 < t2 && t2 < total) {
        return Err(Error::Malformed);
    }

    Ok((Some(total), Some(t1), Some(t2)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Header, OPT_LEASE_TIME, OPT_MESSAGE_TYPE, OPT_SERVER_ID, OPT_SUBNET_MASK};

    fn ack_message(yiaddr: Ipv4Addr, lease_time: u32) -> Message {
        let header = Header::new_request(1, 6, [0; 16], 0x1234, 0, false, Ipv4Addr::UNSPECIFIED);
        let mut header = header;
        header.yiaddr = yiaddr;

        let mut options = OptionTable::new();
        options.set_u8(OPT_MESSAGE_TYPE, MessageType::Ack as u8);
        options.set_ipv4(OPT_SERVER_ID, Ipv4Addr::new(192, 0, 2, 1));
        options.set_ipv4(OPT_SUBNET_MASK, Ipv4Addr::new(255, 255, 255, 0));
        options.set_u32(OPT_LEASE_TIME, lease_time);

        Message::new(header, options)
    }

    #[test]
    fn normalizes_t1_t2_from_lease_time_alone() {
        let msg = ack_message(Ipv4Addr::new(192, 0, 2, 10), 3600);
        let lease = Lease::from_message(&msg).unwrap();

        assert_eq!(lease.t1(), Some(Duration::from_secs(1800)));
        assert_eq!(lease.t2(), Some(Duration::from_secs(3150)));
        assert_eq!(lease.lease_time(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn infinite_lease_has_no_timers() {
        let msg = ack_message(Ipv4Addr::new(192, 0, 2, 10), crate::wire::INFINITE_LEASE);
        let lease = Lease::from_message(&msg).unwrap();

        assert_eq!(lease.lease_time(), None);
        assert_eq!(lease.t1(), None);
        assert_eq!(lease.t2(), None);
    }

    #[test]
    fn ack_without_yiaddr_is_rejected() {
        let msg = ack_message(Ipv4Addr::UNSPECIFIED, 3600);
        assert!(Lease::from_message(&msg).is_err());
    }

    #[test]
    fn decline_only_valid_from_selected_or_acked() {
        let msg = ack_message(Ipv4Addr::new(192, 0, 2, 10), 3600);
        let lease = Lease::from_message(&msg).unwrap();

        assert!(lease.decline().is_err());

        lease.set_state(LeaseState::Selected);
        assert!(lease.decline().is_ok());
        assert_eq!(lease.state(), LeaseState::Declined);
    }
}
