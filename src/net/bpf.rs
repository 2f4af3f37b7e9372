//! Classic BPF program construction for the client packet socket.
//!
//! The filter mirrors the one installed by systemd-networkd's DHCP client:
//! it runs entirely in the kernel so that unrelated broadcast traffic never
//! crosses into userspace, and it is rebuilt and reattached every time the
//! transaction id changes (on retransmit as well as on a fresh probe).

use libc::{sock_filter, sock_fprog};

// BPF instruction classes (linux/bpf_common.h).
const BPF_LD: u16 = 0x00;
const BPF_LDX: u16 = 0x01;
const BPF_ALU: u16 = 0x04;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_MISC: u16 = 0x07;

// Size modifiers.
const BPF_W: u16 = 0x00;
const BPF_H: u16 = 0x08;
const BPF_B: u16 = 0x10;

// Addressing modes.
const BPF_IMM: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_IND: u16 = 0x40;
const BPF_LEN: u16 = 0x80;
const BPF_MSH: u16 = 0xa0;

// ALU/jump operations.
const BPF_ADD: u16 = 0x00;
const BPF_SUB: u16 = 0x10;
const BPF_AND: u16 = 0x50;
const BPF_JEQ: u16 = 0x10;
const BPF_JGE: u16 = 0x30;
const BPF_K: u16 = 0x00;
const BPF_X: u16 = 0x08;

const BPF_TAX: u16 = 0x00;

const IPPROTO_UDP: u32 = 17;
const IP_MF_OFFMASK: u32 = 0x3fff; // network-byte-order mask of MF | fragment offset
const BOOTREPLY: u32 = 2;
const DHCP_MAGIC: u32 = 0x63825363;
const DHCP_CLIENT_PORT: u32 = 68;

const IP_PROTOCOL_OFFSET: u32 = 9; // offsetof(struct iphdr, protocol)
const IP_FRAG_OFFSET: u32 = 6; // offsetof(struct iphdr, frag_off)
const UDP_DEST_OFFSET: u32 = 2; // offsetof(struct udphdr, dest)
const UDP_HEADER_LEN: u32 = 8;

// Offsets into the DHCP payload (i.e. relative to X after the UDP header
// skip), matching the wire layout encoded by `wire::Message::encode`, not
// the in-memory layout of `wire::Header`.
const DHCP_WIRE_OP_OFFSET: u32 = 0;
const DHCP_WIRE_XID_OFFSET: u32 = 4;
const DHCP_WIRE_COOKIE_OFFSET: u32 = 236;

fn stmt(code: u16, k: u32) -> sock_filter {
    sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

fn jump(code: u16, k: u32, jt: u8, jf: u8) -> sock_filter {
    sock_filter { code, jt, jf, k }
}

/// Builds the classic BPF program that accepts only unfragmented UDP/IPv4
/// DHCP replies addressed to our client port, carrying `xid`, with the
/// DHCP magic cookie present at its fixed offset.
///
/// `dhcp_header_len` is `size_of::<wire::Header>()` plus the minimum
/// options area the caller wants to guarantee is present (the magic
/// cookie plus at least one TLV byte).
pub fn client_reply_filter(xid: u32, dhcp_min_len: u32) -> Vec<sock_filter> {
    vec![
        // IP: must be UDP.
        stmt(BPF_LD | BPF_B | BPF_ABS, IP_PROTOCOL_OFFSET),
        jump(BPF_JMP | BPF_JEQ | BPF_K, IPPROTO_UDP, 1, 0),
        stmt(BPF_RET | BPF_K, 0),
        // IP: must be unfragmented.
        stmt(BPF_LD | BPF_B | BPF_ABS, IP_FRAG_OFFSET),
        stmt(BPF_ALU | BPF_AND | BPF_K, IP_MF_OFFMASK),
        jump(BPF_JMP | BPF_JEQ | BPF_K, 0, 1, 0),
        stmt(BPF_RET | BPF_K, 0),
        // X <- IP header length; A <- packet length; A -= X; must hold
        // at least a UDP header plus the minimum DHCP payload.
        stmt(BPF_LDX | BPF_B | BPF_MSH, 0),
        stmt(BPF_LD | BPF_W | BPF_LEN, 0),
        stmt(BPF_ALU | BPF_SUB | BPF_X, 0),
        jump(BPF_JMP | BPF_JGE | BPF_K, UDP_HEADER_LEN + dhcp_min_len, 1, 0),
        stmt(BPF_RET | BPF_K, 0),
        // UDP: destination port must be the DHCP client port.
        stmt(BPF_LD | BPF_H | BPF_IND, UDP_DEST_OFFSET),
        jump(BPF_JMP | BPF_JEQ | BPF_K, DHCP_CLIENT_PORT, 1, 0),
        stmt(BPF_RET | BPF_K, 0),
        // X <- offset of the DHCP payload (IP header length + UDP header length).
        stmt(BPF_LD | BPF_W | BPF_IMM, UDP_HEADER_LEN),
        stmt(BPF_ALU | BPF_ADD | BPF_X, 0),
        stmt(BPF_MISC | BPF_TAX, 0),
        // DHCP: op must be BOOTREPLY.
        stmt(BPF_LD | BPF_B | BPF_IND, DHCP_WIRE_OP_OFFSET),
        jump(BPF_JMP | BPF_JEQ | BPF_K, BOOTREPLY, 1, 0),
        stmt(BPF_RET | BPF_K, 0),
        // DHCP: xid must match.
        stmt(BPF_LD | BPF_W | BPF_IND, DHCP_WIRE_XID_OFFSET),
        jump(BPF_JMP | BPF_JEQ | BPF_K, xid, 1, 0),
        stmt(BPF_RET | BPF_K, 0),
        // DHCP: magic cookie must match.
        stmt(BPF_LD | BPF_W | BPF_IND, DHCP_WIRE_COOKIE_OFFSET),
        jump(BPF_JMP | BPF_JEQ | BPF_K, DHCP_MAGIC, 1, 0),
        stmt(BPF_RET | BPF_K, 0),
        // Accept, and hand the kernel the whole frame.
        stmt(BPF_RET | BPF_K, 0xffff),
    ]
}

/// Wraps a compiled filter program in the `sock_fprog` shape expected by
/// `SO_ATTACH_FILTER`. The returned value borrows `filter` and must not
/// outlive it.
pub fn fprog(filter: &[sock_filter]) -> sock_fprog {
    sock_fprog {
        len: filter.len() as u16,
        filter: filter.as_ptr() as *mut sock_filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_ends_in_accept_all() {
        let filter = client_reply_filter(0x1234_5678, crate::wire::HEADER_SIZE as u32 + 4);
        let last = filter.last().unwrap();
        assert_eq!(last.code, BPF_RET | BPF_K);
        assert_eq!(last.k, 0xffff);
    }

    #[test]
    fn filter_encodes_requested_xid() {
        let xid = 0xdead_beef;
        let filter = client_reply_filter(xid, crate::wire::HEADER_SIZE as u32 + 4);
        assert!(filter.iter().any(|f| f.k == xid));
    }
}
