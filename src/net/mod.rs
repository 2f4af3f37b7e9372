//! Raw socket plumbing: everything that talks to the kernel directly
//! rather than through `std::net`, because a DHCP client must be able to
//! send and receive before it has an IP address at all.

mod bpf;
mod ip;
mod packet_socket;
mod udp_socket;

pub use packet_socket::PacketSocket;
pub use udp_socket::UdpSocket;
