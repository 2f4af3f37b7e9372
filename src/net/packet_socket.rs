//! The pre-IP AF_PACKET/SOCK_DGRAM socket used for everything before a
//! lease is bound: DISCOVER/REQUEST broadcasts and their OFFER/ACK/NAK
//! replies. `SOCK_DGRAM` means the kernel strips the link-layer header
//! on receive and builds it from `sockaddr_ll` on send, so frames here
//! start at the IPv4 header in both directions.

use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};

use super::bpf::{client_reply_filter, fprog};
use super::ip::{decode_udp, encode_udp, Ipv4Header, UDP_PROTO};
use crate::error::{Error, Result};
use crate::wire::{self, Message, CLIENT_PORT, SERVER_PORT};
use std::net::Ipv4Addr;

const ETH_P_IP: u16 = 0x0800;
const ETH_ALEN: usize = 6;

/// Broadcast link-layer address, used as the `sockaddr_ll` destination
/// for every send in the pre-bound phase of the state machine.
const ETH_BROADCAST: [u8; ETH_ALEN] = [0xff; ETH_ALEN];

pub struct PacketSocket {
    fd: OwnedFd,
    ifindex: i32,
    /// Kept alive for the lifetime of the attached filter; `SO_ATTACH_FILTER`
    /// only copies the program at attach time but we rebuild it on every xid
    /// change so there is nothing to pin here beyond normal drop order.
    _filter: Vec<libc::sock_filter>,
}

impl PacketSocket {
    /// Opens a new AF_PACKET/SOCK_DGRAM socket bound to `ifindex`, with a
    /// BPF program installed that passes only unfragmented UDP/IPv4 DHCP
    /// replies carrying `xid`.
    pub fn new(ifindex: i32, xid: u32) -> Result<Self> {
        let raw_fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_DGRAM, (ETH_P_IP.to_be()) as i32) };
        if raw_fd < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        // SAFETY: raw_fd was just returned by a successful socket(2) call
        // and is not otherwise owned.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).map_err(Error::Errno)?;

        let mut sock = Self {
            fd,
            ifindex,
            _filter: Vec::new(),
        };

        sock.attach_filter(xid)?;
        sock.enable_auxdata()?;
        sock.bind()?;

        Ok(sock)
    }

    /// Rebuilds and reattaches the BPF program for a new transaction id,
    /// called on every retransmit as well as at the start of a new probe.
    pub fn reattach_filter(&mut self, xid: u32) -> Result<()> {
        self.attach_filter(xid)
    }

    fn attach_filter(&mut self, xid: u32) -> Result<()> {
        let filter = client_reply_filter(xid, wire::HEADER_SIZE as u32 + 1);
        let prog = fprog(&filter);

        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &prog as *const _ as *const libc::c_void,
                mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Errno(Errno::last()));
        }

        // Keep the program alive; fprog only holds a pointer into it and
        // the kernel copies it at attach time, but we retain it anyway so
        // that a caller inspecting `self` sees what's installed.
        self._filter = filter;
        Ok(())
    }

    fn enable_auxdata(&self) -> Result<()> {
        let on: libc::c_int = 1;
        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_PACKET,
                libc::PACKET_AUXDATA,
                &on as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        Ok(())
    }

    fn bind(&self) -> Result<()> {
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = ETH_P_IP.to_be();
        addr.sll_ifindex = self.ifindex;

        let rc = unsafe {
            libc::bind(
                self.fd.as_raw_fd(),
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        Ok(())
    }

    /// Encodes `msg` as an IPv4/UDP datagram from `0.0.0.0:68` to
    /// `255.255.255.255:67` and sends it with the link-layer broadcast
    /// address in `sockaddr_ll`; the kernel builds the Ethernet framing.
    pub fn send_broadcast(&self, msg: &Message) -> Result<()> {
        let dhcp_bytes = msg.encode(false)?;

        let ip_hdr = Ipv4Header {
            ttl: 64,
            proto: UDP_PROTO,
            src: msg.header.ciaddr,
            dst: Ipv4Addr::BROADCAST,
        };
        let udp_packet = encode_udp(CLIENT_PORT, SERVER_PORT, &ip_hdr, &dhcp_bytes);
        let ip_packet = ip_hdr.encode_with_payload(&udp_packet);

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = ETH_P_IP.to_be();
        addr.sll_ifindex = self.ifindex;
        addr.sll_halen = ETH_ALEN as u8;
        addr.sll_addr[..ETH_ALEN].copy_from_slice(&ETH_BROADCAST);

        let rc = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                ip_packet.as_ptr() as *const libc::c_void,
                ip_packet.len(),
                0,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        Ok(())
    }

    /// Receives one datagram via `recvmsg`, consulting the kernel's
    /// PACKET_AUXDATA ancillary data for checksum status (§4.2) before
    /// falling back to a software recompute, strips the IPv4/UDP framing
    /// (the kernel already stripped the link-layer header for us) and
    /// returns the decoded DHCP message, or `None` if the datagram didn't
    /// parse as a well-formed DHCP reply (logged and dropped, not an
    /// error: malformed frames from the wire are expected background
    /// noise on a shared broadcast domain).
    pub fn recv(&self) -> Result<Option<Message>> {
        let mut buf = vec![0u8; 1500];
        let mut cmsg_buf = [0u8; 128];

        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = cmsg_buf.len();

        let n = unsafe { libc::recvmsg(self.fd.as_raw_fd(), &mut msg, 0) };
        if n < 0 {
            let errno = Errno::last();
            if errno == Errno::EAGAIN || errno == Errno::EWOULDBLOCK {
                return Ok(None);
            }
            return Err(Error::Errno(errno));
        }
        buf.truncate(n as usize);

        let checksum_trusted = unsafe { auxdata_checksum_status(&msg) };

        let (ip_hdr, udp_segment) = match Ipv4Header::decode_with_payload(&buf) {
            Ok(v) => v,
            Err(e) => {
                log::trace!("dropping malformed IP packet: {e}");
                return Ok(None);
            }
        };

        if ip_hdr.proto != UDP_PROTO {
            return Ok(None);
        }

        let (_, _, dhcp_bytes) =
            match decode_udp(udp_segment, ip_hdr.src, ip_hdr.dst, checksum_trusted) {
                Ok(v) => v,
                Err(e) => {
                    log::trace!("dropping malformed UDP segment: {e}");
                    return Ok(None);
                }
            };

        match Message::decode(dhcp_bytes) {
            Ok(msg) => Ok(Some(msg)),
            Err(e) => {
                log::trace!("dropping malformed DHCP message: {e}");
                Ok(None)
            }
        }
    }
}

// Linux `enum tpacket_v1::tp_status` bits relevant to checksum offload
// (linux/if_packet.h). Not re-exported by `libc`, so named here
// alongside the rest of the hand-rolled constants in this module.
const TP_STATUS_CSUMNOTREADY: u32 = 0x8;
const TP_STATUS_CSUM_VALID: u32 = 0x80;

/// Walks the control messages attached to a `recvmsg` call looking for
/// `SOL_PACKET`/`PACKET_AUXDATA`, and interprets its `tp_status` per
/// §4.2: `Some(true)` the kernel already validated the checksum,
/// `Some(false)` the kernel says it's bad, `None` no auxdata was present
/// or the kernel hasn't computed it yet (software fallback needed).
///
/// SAFETY: `msg` must be the `msghdr` just populated by a successful
/// `recvmsg` call using the control buffer it still points at.
unsafe fn auxdata_checksum_status(msg: &libc::msghdr) -> Option<bool> {
    let mut cmsg = libc::CMSG_FIRSTHDR(msg);
    while !cmsg.is_null() {
        let hdr = &*cmsg;
        if hdr.cmsg_level == libc::SOL_PACKET && hdr.cmsg_type == libc::PACKET_AUXDATA {
            let data = libc::CMSG_DATA(cmsg) as *const libc::tpacket_auxdata;
            let status = (*data).tp_status;

            return if status & TP_STATUS_CSUMNOTREADY != 0 {
                None
            } else {
                Some(status & TP_STATUS_CSUM_VALID != 0)
            };
        }
        cmsg = libc::CMSG_NXTHDR(msg, cmsg);
    }
    None
}

impl AsRawFd for PacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
