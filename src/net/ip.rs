//! Hand-rolled IPv4 and UDP header encode/decode with checksum
//! computation, for framing DHCP messages sent over the raw packet
//! socket before an address is held.

use std::net::Ipv4Addr;

use crate::error::Error;

const IPV4_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
pub const UDP_PROTO: u8 = 17;

#[derive(Clone, Debug)]
pub struct Ipv4Header {
    pub ttl: u8,
    pub proto: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Encodes an IPv4 header (no options) wrapping `payload`, computing
    /// the header checksum by hand.
    pub fn encode_with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let total_len = IPV4_MIN_HEADER_LEN + payload.len();

        let mut hdr = vec![0u8; IPV4_MIN_HEADER_LEN];
        hdr[0] = (4 << 4) | (IPV4_MIN_HEADER_LEN / 4) as u8;
        hdr[1] = 0; // tos
        hdr[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        hdr[4..6].copy_from_slice(&0u16.to_be_bytes()); // id
        hdr[6..8].copy_from_slice(&0u16.to_be_bytes()); // flags/frag offset
        hdr[8] = self.ttl;
        hdr[9] = self.proto;
        hdr[10..12].copy_from_slice(&0u16.to_be_bytes()); // checksum placeholder
        hdr[12..16].copy_from_slice(&self.src.octets());
        hdr[16..20].copy_from_slice(&self.dst.octets());

        let checksum = checksum(&hdr);
        hdr[10..12].copy_from_slice(&checksum.to_be_bytes());

        let mut out = hdr;
        out.extend_from_slice(payload);
        out
    }

    /// Decodes the IPv4 header at the start of `data`, validating the
    /// header checksum, and returns it together with the payload that
    /// follows (per `total length`, not `data.len()`).
    pub fn decode_with_payload(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(Error::DataUnderflow);
        }

        let version = data[0] >> 4;
        if version != 4 {
            return Err(Error::Malformed);
        }

        let ihl = ((data[0] & 0x0f) as usize) * 4;
        if ihl < IPV4_MIN_HEADER_LEN || data.len() < ihl {
            return Err(Error::Malformed);
        }

        let total_len = u16::from_be_bytes(data[2..4].try_into().unwrap()) as usize;
        if data.len() < total_len || total_len < ihl {
            return Err(Error::DataUnderflow);
        }

        if checksum(&data[..ihl]) != 0 {
            return Err(Error::ChecksumError);
        }

        let flags_frag = u16::from_be_bytes(data[6..8].try_into().unwrap());

        let hdr = Self {
            ttl: data[8],
            proto: data[9],
            src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        };

        // Callers that need the fragmentation bits check them directly;
        // exposed here for the userspace mirror of the kernel BPF check.
        let _ = flags_frag;

        Ok((hdr, &data[ihl..total_len]))
    }

    pub fn is_fragmented(data: &[u8]) -> bool {
        if data.len() < 8 {
            return true;
        }
        let flags_frag = u16::from_be_bytes(data[6..8].try_into().unwrap());
        flags_frag & 0x3fff != 0 // MF bit or non-zero fragment offset
    }
}

/// Encodes a UDP header + payload and computes the checksum over the
/// IPv4 pseudo-header, the UDP header and the payload.
pub fn encode_udp(src_port: u16, dst_port: u16, ip: &Ipv4Header, payload: &[u8]) -> Vec<u8> {
    let udp_len = UDP_HEADER_LEN + payload.len();

    let mut pkt = vec![0u8; UDP_HEADER_LEN];
    pkt[0..2].copy_from_slice(&src_port.to_be_bytes());
    pkt[2..4].copy_from_slice(&dst_port.to_be_bytes());
    pkt[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());
    pkt[6..8].copy_from_slice(&0u16.to_be_bytes());
    pkt.extend_from_slice(payload);

    let checksum = udp_checksum(&pkt, ip.src, ip.dst);
    pkt[6..8].copy_from_slice(&checksum.to_be_bytes());

    pkt
}

/// Decodes a UDP header from `data` (the IPv4 payload), validating its
/// checksum against the given IPv4 pseudo-header addresses.
///
/// `trusted` carries what the kernel's PACKET_AUXDATA already told us
/// about this datagram's checksum (§4.2): `Some(true)` skips the
/// software recompute because the kernel already validated it,
/// `Some(false)` fails immediately because the kernel says it's bad,
/// and `None` (no auxdata, or the kernel hasn't computed it yet) falls
/// back to verifying in software here.
pub fn decode_udp<'a>(
    data: &'a [u8],
    src: Ipv4Addr,
    dst: Ipv4Addr,
    trusted: Option<bool>,
) -> Result<(u16, u16, &'a [u8]), Error> {
    if data.len() < UDP_HEADER_LEN {
        return Err(Error::DataUnderflow);
    }

    let src_port = u16::from_be_bytes(data[0..2].try_into().unwrap());
    let dst_port = u16::from_be_bytes(data[2..4].try_into().unwrap());
    let len = u16::from_be_bytes(data[4..6].try_into().unwrap()) as usize;
    let sum = u16::from_be_bytes(data[6..8].try_into().unwrap());

    if data.len() < len || len < UDP_HEADER_LEN {
        return Err(Error::DataUnderflow);
    }

    match trusted {
        Some(false) => return Err(Error::ChecksumError),
        Some(true) => {}
        None if sum != 0 => {
            let computed = udp_checksum(&data[..len], src, dst);
            if computed != sum {
                return Err(Error::ChecksumError);
            }
        }
        None => {}
    }

    Ok((src_port, dst_port, &data[UDP_HEADER_LEN..len]))
}

fn udp_checksum(udp_packet: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> u16 {
    let mut pseudo = Vec::with_capacity(12);
    pseudo.extend_from_slice(&src.octets());
    pseudo.extend_from_slice(&dst.octets());
    pseudo.push(0);
    pseudo.push(UDP_PROTO);
    pseudo.extend_from_slice(&(udp_packet.len() as u16).to_be_bytes());

    let sum = checksum_accumulate(&pseudo) + checksum_accumulate(udp_packet);
    checksum_finish(sum)
}

/// One's-complement checksum of a header with its own checksum field
/// (assumed already zeroed by the caller): returns the complemented sum,
/// which should be zero when re-run over a received, valid header.
fn checksum(header: &[u8]) -> u16 {
    checksum_finish(checksum_accumulate(header))
}

fn checksum_accumulate(bytes: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut iter = bytes.chunks_exact(2);

    for word in &mut iter {
        sum += u16::from_be_bytes([word[0], word[1]]) as u32;
    }
    if let [last] = iter.remainder() {
        sum += (*last as u32) << 8;
    }

    sum
}

fn checksum_finish(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xffff);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_header_round_trips_with_valid_checksum() {
        let hdr = Ipv4Header {
            ttl: 64,
            proto: UDP_PROTO,
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::BROADCAST,
        };
        let payload = b"hello";
        let encoded = hdr.encode_with_payload(payload);

        let (decoded, decoded_payload) = Ipv4Header::decode_with_payload(&encoded).unwrap();
        assert_eq!(decoded.src, Ipv4Addr::UNSPECIFIED);
        assert_eq!(decoded.dst, Ipv4Addr::BROADCAST);
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn udp_round_trips_with_valid_checksum() {
        let ip = Ipv4Header {
            ttl: 64,
            proto: UDP_PROTO,
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(10, 0, 0, 2),
        };
        let encoded = encode_udp(68, 67, &ip, b"payload");
        let (src_port, dst_port, payload) = decode_udp(&encoded, ip.src, ip.dst, None).unwrap();

        assert_eq!(src_port, 68);
        assert_eq!(dst_port, 67);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn detects_fragmented_packets() {
        let mut data = vec![0u8; 20];
        data[6] = 0x20; // MF bit set
        assert!(Ipv4Header::is_fragmented(&data));

        data[6] = 0;
        assert!(!Ipv4Header::is_fragmented(&data));
    }
}
