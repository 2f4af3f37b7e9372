//! The bound-state UDP socket used once a lease is held: unicast
//! RENEWING traffic to the server, and broadcast REBINDING/INFORM
//! traffic, both sent from the leased address rather than `0.0.0.0`.

use std::mem;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};

use crate::error::{Error, Result};
use crate::wire::{Message, CLIENT_PORT, SERVER_PORT};

pub struct UdpSocket {
    fd: OwnedFd,
}

impl UdpSocket {
    /// Opens a UDP socket bound to `ciaddr:68` on `ifname`, with
    /// `SO_REUSEADDR` (so it can coexist with any other DHCP-adjacent
    /// listener during a handover) and `IP_PKTINFO` (so the destination
    /// address of a received datagram, not just the source, is known).
    pub fn new(ciaddr: Ipv4Addr, ifname: &str) -> Result<Self> {
        let raw_fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if raw_fd < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        // SAFETY: raw_fd was just returned by a successful socket(2) call.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).map_err(Error::Errno)?;

        let sock = Self { fd };
        sock.set_reuseaddr()?;
        sock.bind_to_device(ifname)?;
        sock.enable_pktinfo()?;
        sock.bind(ciaddr)?;

        Ok(sock)
    }

    fn set_reuseaddr(&self) -> Result<()> {
        let on: libc::c_int = 1;
        self.setsockopt(libc::SOL_SOCKET, libc::SO_REUSEADDR, &on)
    }

    fn bind_to_device(&self, ifname: &str) -> Result<()> {
        let mut buf = [0u8; libc::IFNAMSIZ];
        let name_bytes = ifname.as_bytes();
        if name_bytes.len() >= buf.len() {
            return Err(Error::InvalidArgument("interface name too long"));
        }
        buf[..name_bytes.len()].copy_from_slice(name_bytes);

        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_BINDTODEVICE,
                buf.as_ptr() as *const libc::c_void,
                buf.len() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        Ok(())
    }

    fn enable_pktinfo(&self) -> Result<()> {
        let on: libc::c_int = 1;
        self.setsockopt(libc::IPPROTO_IP, libc::IP_PKTINFO, &on)
    }

    fn setsockopt<T>(&self, level: libc::c_int, name: libc::c_int, val: &T) -> Result<()> {
        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                level,
                name,
                val as *const T as *const libc::c_void,
                mem::size_of::<T>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        Ok(())
    }

    fn bind(&self, ciaddr: Ipv4Addr) -> Result<()> {
        let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
        addr.sin_family = libc::AF_INET as u16;
        addr.sin_port = CLIENT_PORT.to_be();
        addr.sin_addr.s_addr = u32::from_be_bytes(ciaddr.octets());

        let rc = unsafe {
            libc::bind(
                self.fd.as_raw_fd(),
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        Ok(())
    }

    /// Unicasts `msg` to `dst`, port 67.
    pub fn send_to(&self, msg: &Message, dst: Ipv4Addr) -> Result<()> {
        self.send_dgram(msg, dst)
    }

    /// Broadcasts `msg` to 255.255.255.255:67 (REBINDING, INFORM when no
    /// server address is yet known).
    pub fn send_broadcast(&self, msg: &Message) -> Result<()> {
        let on: libc::c_int = 1;
        self.setsockopt(libc::SOL_SOCKET, libc::SO_BROADCAST, &on)?;
        self.send_dgram(msg, Ipv4Addr::BROADCAST)
    }

    fn send_dgram(&self, msg: &Message, dst: Ipv4Addr) -> Result<()> {
        let bytes = msg.encode(false)?;

        let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
        addr.sin_family = libc::AF_INET as u16;
        addr.sin_port = SERVER_PORT.to_be();
        addr.sin_addr.s_addr = u32::from_be_bytes(dst.octets());

        let rc = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
                0,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(Error::Errno(Errno::last()));
        }
        Ok(())
    }

    /// Receives one datagram and decodes it as a DHCP message, or
    /// returns `None` for a would-block or a malformed payload.
    pub fn recv(&self) -> Result<Option<Message>> {
        let mut buf = vec![0u8; 1500];
        let n = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if n < 0 {
            let errno = Errno::last();
            if errno == Errno::EAGAIN || errno == Errno::EWOULDBLOCK {
                return Ok(None);
            }
            return Err(Error::Errno(errno));
        }
        buf.truncate(n as usize);

        match Message::decode(&buf) {
            Ok(msg) => Ok(Some(msg)),
            Err(e) => {
                log::trace!("dropping malformed DHCP message on bound socket: {e}");
                Ok(None)
            }
        }
    }
}

impl AsRawFd for UdpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
