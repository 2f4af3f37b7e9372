//! The client state machine: owns the sockets, the timer, the current
//! probe, and the event queue, and drives RFC 2131 transitions from a
//! single `dispatch` call.

use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::{Duration, Instant};

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ClientConfig, ProbeConfig};
use crate::error::{Error, Result};
use crate::event::{Event, EventQueue};
use crate::lease::{Lease, LeaseState};
use crate::net::{PacketSocket, UdpSocket};
use crate::probe::{selecting_deadline, Probe, ProbeState};
use crate::timer::{self, Timer};
use crate::wire::{
    Header, Message, MessageType, OptionTable, OPT_PARAM_REQUEST_LIST, OPT_REQUESTED_IP,
    OPT_SERVER_ID,
};

/// Minimum MTU below which the link is considered unusable for DHCP
/// (a message cannot possibly fit); triggers a `Down` event.
const MIN_USABLE_MTU: u32 = 576;

struct ClientTokens;
impl ClientTokens {
    const TIMER: u64 = 1;
    const PACKET: u64 = 2;
    const UDP: u64 = 3;
}

pub struct ClientInner {
    config: ClientConfig,
    rng: RefCell<StdRng>,
    epoll: Epoll,
    packet_socket: RefCell<Option<PacketSocket>>,
    udp_socket: RefCell<Option<UdpSocket>>,
    timer: Timer,
    probe: RefCell<Option<Probe>>,
    events: RefCell<EventQueue>,
    drop_count: Cell<u64>,
    mtu_ok: Cell<bool>,
}

/// Reference-counted handle to a DHCP client. Dropping the last clone
/// tears down its sockets and timer via ordinary `Drop`.
#[derive(Clone)]
pub struct Client(Rc<ClientInner>);

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::empty()).map_err(Error::Errno)?;
        let timer = Timer::new()?;

        epoll
            .add(
                timer.as_raw_fd(),
                EpollEvent::new(EpollFlags::EPOLLIN, ClientTokens::TIMER),
            )
            .map_err(Error::Errno)?;

        let inner = ClientInner {
            config,
            rng: RefCell::new(StdRng::from_entropy()),
            epoll,
            packet_socket: RefCell::new(None),
            udp_socket: RefCell::new(None),
            timer,
            probe: RefCell::new(None),
            events: RefCell::new(EventQueue::new()),
            drop_count: Cell::new(0),
            mtu_ok: Cell::new(true),
        };

        Ok(Self(Rc::new(inner)))
    }

    /// Starts a new probe, cancelling and emitting `Cancelled` for
    /// whichever probe was previously active.
    pub fn probe(&self, config: ProbeConfig) -> Result<Probe> {
        config.validate()?;

        let now = Instant::now();
        if let Some(old) = self.0.probe.borrow_mut().take() {
            old.cancel(now);
            self.0
                .events
                .borrow_mut()
                .push(Event::Cancelled { probe: old.downgrade() });
        }

        self.teardown_udp();

        let xid = self.0.rng.borrow_mut().gen();
        let probe = Probe::new(config, xid, now);
        *self.0.probe.borrow_mut() = Some(probe.clone());

        self.open_packet_socket(xid)?;
        self.send_initial(&probe)?;

        Ok(probe)
    }

    pub fn pop_event(&self) -> Option<Event> {
        self.0.events.borrow_mut().pop()
    }

    /// Called with a link MTU observation; emits `Down` and drops it
    /// into a terminal state if the link can no longer carry DHCP.
    pub fn update_mtu(&self, mtu: u32) {
        let ok = mtu >= MIN_USABLE_MTU;
        let was_ok = self.0.mtu_ok.replace(ok);
        if was_ok && !ok {
            self.0.events.borrow_mut().push(Event::Down);
        }
    }

    pub fn dropped_packet_count(&self) -> u64 {
        self.0.drop_count.get()
    }

    /// Drains every ready fd (timer, packet socket, UDP socket) and
    /// advances the state machine. A no-op, returning `Ok(())`, when
    /// nothing is ready.
    pub fn dispatch(&self) -> Result<()> {
        let mut buf = [EpollEvent::empty(); 8];
        let n = self
            .0
            .epoll
            .wait(&mut buf, 0u16)
            .map_err(Error::Errno)?;

        for ev in &buf[..n] {
            match ev.data() {
                ClientTokens::TIMER => self.on_timer_ready()?,
                ClientTokens::PACKET => self.on_packet_ready()?,
                ClientTokens::UDP => self.on_udp_ready()?,
                _ => {}
            }
        }

        Ok(())
    }

    fn on_timer_ready(&self) -> Result<()> {
        let fired = self.0.timer.consume()? > 0;
        if !fired {
            return Ok(());
        }

        let Some(probe) = self.0.probe.borrow().clone() else {
            return Ok(());
        };
        if probe.is_cancelled() {
            return Ok(());
        }

        self.advance_on_timer(&probe)
    }

    fn on_packet_ready(&self) -> Result<()> {
        let msg = {
            let sock = self.0.packet_socket.borrow();
            match sock.as_ref() {
                Some(s) => s.recv()?,
                None => None,
            }
        };

        let Some(msg) = msg else {
            self.0.drop_count.set(self.0.drop_count.get() + 1);
            return Ok(());
        };

        self.on_reply(msg)
    }

    fn on_udp_ready(&self) -> Result<()> {
        let msg = {
            let sock = self.0.udp_socket.borrow();
            match sock.as_ref() {
                Some(s) => s.recv()?,
                None => None,
            }
        };

        let Some(msg) = msg else {
            self.0.drop_count.set(self.0.drop_count.get() + 1);
            return Ok(());
        };

        self.on_reply(msg)
    }

    fn on_reply(&self, msg: Message) -> Result<()> {
        let Some(probe) = self.0.probe.borrow().clone() else {
            return Ok(());
        };
        if probe.is_cancelled() {
            return Ok(());
        }
        if !msg.is_for_us(&self.0.config.mac, probe.xid()) {
            self.0.drop_count.set(self.0.drop_count.get() + 1);
            return Ok(());
        }

        let Some(message_type) = msg.options.message_type() else {
            self.0.drop_count.set(self.0.drop_count.get() + 1);
            return Ok(());
        };

        let now = Instant::now();
        let state_name = probe.state_name();

        match (state_name, message_type) {
            ("selecting", MessageType::Offer) => self.on_offer(&probe, &msg, now),
            ("requesting", MessageType::Ack) | ("rebooting", MessageType::Ack) => {
                self.on_ack_granted(&probe, &msg, now)
            }
            ("requesting", MessageType::Nak) | ("rebooting", MessageType::Nak) => {
                self.on_nak(&probe, now, true)
            }
            ("renewing", MessageType::Ack) => self.on_ack_refresh(&probe, &msg, now, false),
            ("rebinding", MessageType::Ack) => self.on_ack_refresh(&probe, &msg, now, true),
            ("renewing", MessageType::Nak) => self.on_nak(&probe, now, false),
            ("rebinding", MessageType::Nak) => self.on_nak(&probe, now, false),
            ("inform", MessageType::Ack) => self.on_inform_ack(&probe, &msg, now),
            _ => {
                self.0.drop_count.set(self.0.drop_count.get() + 1);
                Ok(())
            }
        }
    }

    fn on_offer(&self, probe: &Probe, msg: &Message, _now: Instant) -> Result<()> {
        let lease = Lease::from_message(msg)?;

        let is_first = {
            let mut state = probe_state_mut(probe);
            let ProbeState::Selecting { offers, .. } = &mut *state else {
                return Ok(());
            };
            let is_first = offers.is_empty();
            offers.push(lease.clone());
            is_first
        };

        if is_first {
            self.0.events.borrow_mut().push(Event::Offer {
                probe: probe.downgrade(),
                lease: Rc::downgrade(&lease.0),
            });
        }

        Ok(())
    }

    /// Caller-driven: accepts `lease` (which must be one of the offers
    /// collected during SELECTING, or the sole offer of an INIT-REBOOT)
    /// and moves the probe to REQUESTING.
    pub fn select_lease(&self, probe: &Probe, lease: &Lease) -> Result<()> {
        lease.set_state(LeaseState::Selected);
        let now = Instant::now();
        probe.set_state(
            ProbeState::Requesting {
                offer: lease.clone(),
                attempt: 0,
            },
            now,
        );
        self.send_request_selecting(probe, lease, 0)
    }

    fn on_ack_granted(&self, probe: &Probe, msg: &Message, now: Instant) -> Result<()> {
        let lease = Lease::from_message(msg)?;
        lease.set_state(LeaseState::Acked);
        lease.mark_granted(now);

        probe.set_state(ProbeState::Bound { lease: lease.clone() }, now);
        self.teardown_packet_socket();
        self.open_udp_socket(lease.yiaddr())?;
        self.arm_t1(&lease)?;

        self.0.events.borrow_mut().push(Event::Granted {
            probe: probe.downgrade(),
            lease: Rc::downgrade(&lease.0),
        });
        Ok(())
    }

    fn on_ack_refresh(&self, probe: &Probe, msg: &Message, now: Instant, _was_rebinding: bool) -> Result<()> {
        let lease = Lease::from_message(msg)?;
        lease.set_state(LeaseState::Acked);
        lease.mark_granted(now);

        probe.set_state(ProbeState::Bound { lease: lease.clone() }, now);
        self.arm_t1(&lease)?;

        self.0.events.borrow_mut().push(Event::Extended {
            probe: probe.downgrade(),
            lease: Rc::downgrade(&lease.0),
        });
        Ok(())
    }

    fn on_inform_ack(&self, probe: &Probe, msg: &Message, now: Instant) -> Result<()> {
        let lease = Lease::from_message(msg)?;
        lease.set_state(LeaseState::Acked);
        lease.mark_granted(now);
        probe.set_state(ProbeState::Bound { lease: lease.clone() }, now);

        self.0.events.borrow_mut().push(Event::Granted {
            probe: probe.downgrade(),
            lease: Rc::downgrade(&lease.0),
        });
        Ok(())
    }

    fn on_nak(&self, probe: &Probe, now: Instant, _had_ip_transport: bool) -> Result<()> {
        self.0.events.borrow_mut().push(Event::Retracted {
            probe: probe.downgrade(),
        });
        self.restart_in_init(probe, now)
    }

    /// Returns `probe` to INIT with a freshly rotated xid (§4.2), closing
    /// the UDP socket if bound and reattaching the packet socket's BPF
    /// filter with the new transaction id, since INIT always transmits
    /// over the raw packet path.
    fn restart_in_init(&self, probe: &Probe, now: Instant) -> Result<()> {
        self.teardown_udp();
        let new_xid = self.0.rng.borrow_mut().gen();
        probe.set_xid(new_xid);
        probe.set_state(ProbeState::Init { attempt: 0 }, now);
        self.open_packet_socket(new_xid)?;
        self.arm_backoff(0)
    }

    fn advance_on_timer(&self, probe: &Probe) -> Result<()> {
        let now = Instant::now();
        let state = probe_state_mut(probe);

        match &*state {
            ProbeState::Init { attempt } => {
                let attempt = *attempt;
                drop(state);
                self.send_discover(probe)?;
                probe.set_state(ProbeState::Init { attempt: attempt + 1 }, now);
                self.arm_backoff(attempt + 1)
            }
            ProbeState::InitReboot { requested_ip } => {
                let requested_ip = *requested_ip;
                drop(state);
                self.send_request_init_reboot(probe, requested_ip, 0)?;
                probe.set_state(ProbeState::Rebooting { requested_ip, attempt: 0 }, now);
                self.arm_backoff(0)
            }
            ProbeState::Rebooting { requested_ip, attempt } => {
                let (requested_ip, attempt) = (*requested_ip, *attempt);
                drop(state);
                self.send_request_init_reboot(probe, requested_ip, attempt + 1)?;
                probe.set_state(
                    ProbeState::Rebooting { requested_ip, attempt: attempt + 1 },
                    now,
                );
                self.arm_backoff(attempt + 1)
            }
            ProbeState::Inform { attempt } => {
                let attempt = *attempt;
                drop(state);
                self.send_inform(probe)?;
                probe.set_state(ProbeState::Inform { attempt: attempt + 1 }, now);
                self.arm_backoff(attempt + 1)
            }
            ProbeState::Requesting { offer, attempt } => {
                let (offer, attempt) = (offer.clone(), *attempt);
                drop(state);
                self.send_request_selecting(probe, &offer, attempt + 1)?;
                probe.set_state(
                    ProbeState::Requesting { offer, attempt: attempt + 1 },
                    now,
                );
                self.arm_backoff(attempt + 1)
            }
            ProbeState::Selecting { .. } => {
                // The collection window bounds how long we wait before a
                // caller must call `select_lease`; it does not force a
                // choice on its own. Re-arm a bounded wait so dispatch
                // keeps making progress without busy-looping.
                drop(state);
                self.0.timer.arm(Duration::from_secs(10))?;
                Ok(())
            }
            ProbeState::Bound { lease } => {
                let lease = lease.clone();
                drop(state);
                probe.set_state(ProbeState::Renewing { lease: lease.clone() }, now);
                self.open_udp_socket(lease.yiaddr())?;
                self.send_renew(&lease)?;
                self.arm_renew_retransmit(&lease, now)
            }
            ProbeState::Renewing { lease } => {
                let lease = lease.clone();
                match (lease.server_id(), lease.t2_instant()) {
                    (Some(_), Some(t2)) if now >= t2 => {
                        drop(state);
                        probe.set_state(ProbeState::Rebinding { lease: lease.clone() }, now);
                        self.send_rebind(&lease)?;
                        self.arm_rebind_retransmit(&lease, now)
                    }
                    (Some(server_id), _) => {
                        drop(state);
                        self.resend_renew(&lease, server_id)?;
                        self.arm_renew_retransmit(&lease, now)
                    }
                    (None, _) => {
                        // No server identifier on this lease at all; there is
                        // no unicast target to renew against, so fall
                        // straight through to REBINDING's broadcast.
                        drop(state);
                        probe.set_state(ProbeState::Rebinding { lease: lease.clone() }, now);
                        self.send_rebind(&lease)?;
                        self.arm_rebind_retransmit(&lease, now)
                    }
                }
            }
            ProbeState::Rebinding { lease } => {
                let lease = lease.clone();
                if lease.expiry_instant().is_some_and(|expiry| now >= expiry) {
                    drop(state);
                    self.0.events.borrow_mut().push(Event::Expired {
                        probe: probe.downgrade(),
                    });
                    self.restart_in_init(probe, now)
                } else {
                    drop(state);
                    self.send_rebind(&lease)?;
                    self.arm_rebind_retransmit(&lease, now)
                }
            }
            ProbeState::Cancelled => Ok(()),
        }
    }

    fn arm_t1(&self, lease: &Lease) -> Result<()> {
        match lease.t1() {
            Some(t1) => self.0.timer.arm(t1),
            // Infinite lease: never schedule a renewal.
            None => self.0.timer.disarm(),
        }
    }

    fn arm_renew_retransmit(&self, lease: &Lease, now: Instant) -> Result<()> {
        let Some(t2_instant) = lease.t2_instant() else {
            return self.0.timer.disarm();
        };
        let remaining = t2_instant.saturating_duration_since(now);
        self.0.timer.arm(timer::renewing_interval(remaining))
    }

    fn arm_rebind_retransmit(&self, lease: &Lease, now: Instant) -> Result<()> {
        let Some(expiry_instant) = lease.expiry_instant() else {
            return self.0.timer.disarm();
        };
        let remaining = expiry_instant.saturating_duration_since(now);
        self.0.timer.arm(timer::rebinding_interval(remaining))
    }

    fn arm_backoff(&self, attempt: usize) -> Result<()> {
        let mut rng = self.0.rng.borrow_mut();
        let delay = timer::backoff(attempt, &mut *rng);
        drop(rng);
        self.0.timer.arm(delay)
    }

    fn open_packet_socket(&self, xid: u32) -> Result<()> {
        self.teardown_packet_socket();
        let sock = PacketSocket::new(self.0.config.ifindex, xid)?;
        self.0
            .epoll
            .add(
                sock.as_raw_fd(),
                EpollEvent::new(EpollFlags::EPOLLIN, ClientTokens::PACKET),
            )
            .map_err(Error::Errno)?;
        *self.0.packet_socket.borrow_mut() = Some(sock);
        Ok(())
    }

    fn teardown_packet_socket(&self) {
        if let Some(sock) = self.0.packet_socket.borrow_mut().take() {
            let _ = self.0.epoll.delete(sock.as_raw_fd());
        }
    }

    fn open_udp_socket(&self, ciaddr: Ipv4Addr) -> Result<()> {
        if self.0.udp_socket.borrow().is_some() {
            return Ok(());
        }
        let sock = UdpSocket::new(ciaddr, &self.0.config.ifname)?;
        self.0
            .epoll
            .add(
                sock.as_raw_fd(),
                EpollEvent::new(EpollFlags::EPOLLIN, ClientTokens::UDP),
            )
            .map_err(Error::Errno)?;
        *self.0.udp_socket.borrow_mut() = Some(sock);
        Ok(())
    }

    fn teardown_udp(&self) {
        if let Some(sock) = self.0.udp_socket.borrow_mut().take() {
            let _ = self.0.epoll.delete(sock.as_raw_fd());
        }
    }

    fn new_header(&self, probe: &Probe, ciaddr: Ipv4Addr) -> Header {
        let mut chaddr = [0u8; 16];
        let n = self.0.config.mac.len().min(16);
        if self.0.config.transport.hlen() > 0 {
            chaddr[..n].copy_from_slice(&self.0.config.mac[..n]);
        }

        Header::new_request(
            self.0.config.transport.htype(),
            self.0.config.transport.hlen(),
            chaddr,
            probe.xid(),
            probe.secs_in_state(Instant::now()),
            true,
            ciaddr,
        )
    }

    fn base_options(&self, probe: &Probe, message_type: MessageType) -> OptionTable {
        let mut opts = OptionTable::new();
        opts.set_u8(crate::wire::OPT_MESSAGE_TYPE, message_type as u8);
        if let Some((code, id)) = self.0.config.client_id_option() {
            opts.set(code, id.to_vec());
        }
        if !probe.config().requested_options.is_empty() {
            opts.set(OPT_PARAM_REQUEST_LIST, probe.config().requested_options.clone());
        }
        opts
    }

    fn send_discover(&self, probe: &Probe) -> Result<()> {
        let header = self.new_header(probe, Ipv4Addr::UNSPECIFIED);
        let mut options = self.base_options(probe, MessageType::Discover);
        if let Some(ip) = probe.config().requested_ip {
            options.set_ipv4(OPT_REQUESTED_IP, ip);
        }
        let msg = Message::new(header, options);

        let sock = self.0.packet_socket.borrow();
        sock.as_ref()
            .ok_or(Error::Internal("no packet socket while sending DISCOVER"))?
            .send_broadcast(&msg)?;

        probe.set_state(
            ProbeState::Selecting {
                offers: Vec::new(),
                deadline: selecting_deadline(Instant::now()),
            },
            Instant::now(),
        );
        Ok(())
    }

    fn send_request_selecting(&self, probe: &Probe, offer: &Lease, attempt: usize) -> Result<()> {
        let _ = attempt;
        let header = self.new_header(probe, Ipv4Addr::UNSPECIFIED);
        let mut options = self.base_options(probe, MessageType::Request);
        options.set_ipv4(OPT_REQUESTED_IP, offer.yiaddr());
        if let Some(server_id) = offer.server_id() {
            options.set_ipv4(OPT_SERVER_ID, server_id);
        }
        let msg = Message::new(header, options);

        let sock = self.0.packet_socket.borrow();
        sock.as_ref()
            .ok_or(Error::Internal("no packet socket while sending REQUEST"))?
            .send_broadcast(&msg)
    }

    fn send_request_init_reboot(&self, probe: &Probe, requested_ip: Ipv4Addr, attempt: usize) -> Result<()> {
        let _ = attempt;
        let header = self.new_header(probe, Ipv4Addr::UNSPECIFIED);
        let mut options = self.base_options(probe, MessageType::Request);
        options.set_ipv4(OPT_REQUESTED_IP, requested_ip);
        let msg = Message::new(header, options);

        let sock = self.0.packet_socket.borrow();
        sock.as_ref()
            .ok_or(Error::Internal("no packet socket while sending REQUEST"))?
            .send_broadcast(&msg)
    }

    fn send_inform(&self, probe: &Probe) -> Result<()> {
        let ciaddr = probe.config().requested_ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let header = self.new_header(probe, ciaddr);
        let options = self.base_options(probe, MessageType::Inform);
        let msg = Message::new(header, options);

        let sock = self.0.packet_socket.borrow();
        sock.as_ref()
            .ok_or(Error::Internal("no packet socket while sending INFORM"))?
            .send_broadcast(&msg)
    }

    fn send_renew(&self, lease: &Lease) -> Result<()> {
        let Some(server_id) = lease.server_id() else {
            return Err(Error::Internal("renewing lease has no server identifier"));
        };
        self.resend_renew(lease, server_id)
    }

    fn resend_renew(&self, lease: &Lease, server_id: Ipv4Addr) -> Result<()> {
        let probe = self.0.probe.borrow().clone();
        let Some(probe) = probe else {
            return Err(Error::Internal("renewing with no active probe"));
        };

        let header = self.new_header(&probe, lease.yiaddr());
        let options = self.base_options(&probe, MessageType::Request);
        let msg = Message::new(header, options);

        let sock = self.0.udp_socket.borrow();
        sock.as_ref()
            .ok_or(Error::Internal("no UDP socket while renewing"))?
            .send_to(&msg, server_id)
    }

    fn send_rebind(&self, lease: &Lease) -> Result<()> {
        let probe = self.0.probe.borrow().clone();
        let Some(probe) = probe else {
            return Err(Error::Internal("rebinding with no active probe"));
        };

        let header = self.new_header(&probe, lease.yiaddr());
        let options = self.base_options(&probe, MessageType::Request);
        let msg = Message::new(header, options);

        let sock = self.0.udp_socket.borrow();
        sock.as_ref()
            .ok_or(Error::Internal("no UDP socket while rebinding"))?
            .send_broadcast(&msg)
    }

    /// Sends the initial message for a freshly created probe and arms
    /// its first timer, dispatching on the probe's starting state.
    fn send_initial(&self, probe: &Probe) -> Result<()> {
        match &*probe_state_mut(probe) {
            ProbeState::Init { .. } => {
                drop(probe_state_mut(probe));
                self.send_discover(probe)?;
                self.arm_backoff(0)
            }
            ProbeState::InitReboot { requested_ip } => {
                let requested_ip = *requested_ip;
                drop(probe_state_mut(probe));
                self.send_request_init_reboot(probe, requested_ip, 0)?;
                self.arm_backoff(0)
            }
            ProbeState::Inform { .. } => {
                drop(probe_state_mut(probe));
                self.send_inform(probe)?;
                self.arm_backoff(0)
            }
            _ => Ok(()),
        }
    }

    /// Declines `lease` (must be `Selected`, on the packet socket, or
    /// `Acked`, on the bound UDP socket), sends DHCPDECLINE over
    /// whichever transport is actually live, and returns the owning
    /// probe to INIT.
    pub fn decline_lease(&self, probe: &Probe, lease: &Lease) -> Result<()> {
        lease.decline()?;

        let header = self.new_header(probe, Ipv4Addr::UNSPECIFIED);
        let mut options = self.base_options(probe, MessageType::Decline);
        options.set_ipv4(OPT_REQUESTED_IP, lease.yiaddr());
        if let Some(server_id) = lease.server_id() {
            options.set_ipv4(OPT_SERVER_ID, server_id);
        }
        let msg = Message::new(header, options);

        if let Some(sock) = self.0.packet_socket.borrow().as_ref() {
            sock.send_broadcast(&msg)?;
        } else if let Some(sock) = self.0.udp_socket.borrow().as_ref() {
            match lease.server_id() {
                Some(server_id) => sock.send_to(&msg, server_id)?,
                None => sock.send_broadcast(&msg)?,
            }
        } else {
            return Err(Error::Internal("no transport available to send DECLINE"));
        }

        self.restart_in_init(probe, Instant::now())
    }
}

impl AsRawFd for Client {
    fn as_raw_fd(&self) -> RawFd {
        self.0.epoll.as_raw_fd()
    }
}

fn probe_state_mut(probe: &Probe) -> std::cell::RefMut<'_, ProbeState> {
    probe.0.state.borrow_mut()
}
