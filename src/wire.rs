//! BOOTP/DHCP wire codec.
//!
//! Encodes and decodes the fixed BOOTP prelude plus the DHCP option TLV
//! stream, including the "options overload" (`sname`/`file` reused as
//! option space) described in RFC 2131 §4.1 and RFC 2132 §9.3.
//!
//! Unlike a no-alloc embedded codec, options are decoded into an owned
//! `BTreeMap<u8, Vec<u8>>` (see [`OptionTable`]) rather than re-walked
//! lazily from the original buffer on every access; the client holds
//! decoded messages past the lifetime of the receive buffer.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::Error;

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
pub const MAGIC_COOKIE_U32: u32 = 0x6382_5363;

pub const CLIENT_PORT: u16 = 68;
pub const SERVER_PORT: u16 = 67;

pub const BOOT_REQUEST: u8 = 1;
pub const BOOT_REPLY: u8 = 2;

const SNAME_LEN: usize = 64;
const FILE_LEN: usize = 128;
const CHADDR_LEN: usize = 16;

/// Size of the fixed BOOTP header plus the magic cookie, before any options.
pub const HEADER_SIZE: usize = 236 + 4;

/// Minimum total message size the codec decodes.
pub const MIN_MESSAGE_SIZE: usize = HEADER_SIZE;

/// Historical BOOTP-compatible minimum message size some relays expect.
pub const MIN_BOOTP_MESSAGE_SIZE: usize = 300;

const OPT_PAD: u8 = 0;
pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS: u8 = 6;
pub const OPT_HOST_NAME: u8 = 12;
pub const OPT_REQUESTED_IP: u8 = 50;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_OVERLOAD: u8 = 52;
pub const OPT_MESSAGE_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_PARAM_REQUEST_LIST: u8 = 55;
pub const OPT_MESSAGE: u8 = 56;
pub const OPT_RENEWAL_T1: u8 = 58;
pub const OPT_REBINDING_T2: u8 = 59;
pub const OPT_CLIENT_ID: u8 = 61;
const OPT_END: u8 = 255;

/// Value 0xFFFFFFFF on the wire means "infinite lease" and must never be
/// mistaken for a concrete expiry instant.
pub const INFINITE_LEASE: u32 = 0xFFFF_FFFF;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            _ => return None,
        })
    }
}

/// The fixed BOOTP prelude, before the magic cookie and options.
#[derive(Clone, Debug)]
pub struct Header {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub broadcast: bool,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; CHADDR_LEN],
}

impl Header {
    pub fn new_request(
        htype: u8,
        hlen: u8,
        chaddr: [u8; CHADDR_LEN],
        xid: u32,
        secs: u16,
        broadcast: bool,
        ciaddr: Ipv4Addr,
    ) -> Self {
        Self {
            op: BOOT_REQUEST,
            htype,
            hlen,
            hops: 0,
            xid,
            secs,
            broadcast,
            ciaddr,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
        }
    }

    /// True if `chaddr`'s leading `hlen` bytes match `mac` and the rest are zero.
    pub fn chaddr_matches(&self, mac: &[u8]) -> bool {
        if mac.len() > CHADDR_LEN {
            return false;
        }

        self.chaddr[..mac.len()] == *mac && self.chaddr[mac.len()..].iter().all(|b| *b == 0)
    }
}

/// A decoded option table: DHCP splits long values across repeated option
/// codes ("option concatenation" — RFC 3396), and the codec rejoins them
/// here under a single code key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionTable(BTreeMap<u8, Vec<u8>>);

impl OptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.0.get(&code).map(|v| v.as_slice())
    }

    pub fn contains(&self, code: u8) -> bool {
        self.0.contains_key(&code)
    }

    /// Sets (overwrites) an option's raw value.
    pub fn set(&mut self, code: u8, value: Vec<u8>) {
        self.0.insert(code, value);
    }

    pub fn set_u8(&mut self, code: u8, value: u8) {
        self.set(code, vec![value]);
    }

    pub fn set_u32(&mut self, code: u8, value: u32) {
        self.set(code, value.to_be_bytes().to_vec());
    }

    pub fn set_ipv4(&mut self, code: u8, value: Ipv4Addr) {
        self.set(code, value.octets().to_vec());
    }

    pub fn set_ipv4_list(&mut self, code: u8, values: &[Ipv4Addr]) {
        let mut buf = Vec::with_capacity(values.len() * 4);
        for v in values {
            buf.extend_from_slice(&v.octets());
        }
        self.set(code, buf);
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.get(OPT_MESSAGE_TYPE)
            .and_then(|v| v.first())
            .and_then(|b| MessageType::from_u8(*b))
    }

    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.get_ipv4(OPT_SERVER_ID)
    }

    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        self.get_ipv4(OPT_SUBNET_MASK)
    }

    pub fn routers(&self) -> Vec<Ipv4Addr> {
        self.get_ipv4_list(OPT_ROUTER)
    }

    pub fn dns_servers(&self) -> Vec<Ipv4Addr> {
        self.get_ipv4_list(OPT_DNS)
    }

    pub fn lease_time(&self) -> Option<u32> {
        self.get_u32(OPT_LEASE_TIME)
    }

    pub fn renewal_t1(&self) -> Option<u32> {
        self.get_u32(OPT_RENEWAL_T1)
    }

    pub fn rebinding_t2(&self) -> Option<u32> {
        self.get_u32(OPT_REBINDING_T2)
    }

    fn get_u32(&self, code: u8) -> Option<u32> {
        let v = self.get(code)?;
        Some(u32::from_be_bytes(v.get(0..4)?.try_into().ok()?))
    }

    fn get_ipv4(&self, code: u8) -> Option<Ipv4Addr> {
        let v = self.get(code)?;
        let octets: [u8; 4] = v.get(0..4)?.try_into().ok()?;
        Some(octets.into())
    }

    fn get_ipv4_list(&self, code: u8) -> Vec<Ipv4Addr> {
        let Some(v) = self.get(code) else {
            return Vec::new();
        };

        v.chunks_exact(4)
            .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
            .collect()
    }

    /// Appends the bytes for `code`, concatenating onto any bytes already
    /// present under that code (RFC 3396 option concatenation).
    fn append(&mut self, code: u8, data: &[u8]) {
        self.0.entry(code).or_default().extend_from_slice(data);
    }

    /// Parses a single TLV stream (main options area, or an overloaded
    /// `file`/`sname` field) into `self`, stopping at End or underflow.
    fn decode_stream(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut off = 0;

        while off < data.len() {
            let code = data[off];
            off += 1;

            if code == OPT_END {
                return Ok(());
            }
            if code == OPT_PAD {
                continue;
            }

            let len = *data.get(off).ok_or(Error::Malformed)? as usize;
            off += 1;

            let end = off.checked_add(len).ok_or(Error::Malformed)?;
            let value = data.get(off..end).ok_or(Error::Malformed)?;
            self.append(code, value);

            off = end;
        }

        Ok(())
    }

    /// Encodes every option as one or more TLVs (splitting values > 255
    /// bytes into repeated codes), followed by the mandatory End marker.
    fn encode(&self, out: &mut Vec<u8>) {
        for (&code, value) in self.0.iter() {
            if value.is_empty() {
                out.push(code);
                out.push(0);
                continue;
            }

            for chunk in value.chunks(255) {
                out.push(code);
                out.push(chunk.len() as u8);
                out.extend_from_slice(chunk);
            }
        }

        out.push(OPT_END);
    }
}

/// A fully decoded DHCP message: BOOTP header plus the (possibly
/// overload-reassembled) option table.
#[derive(Clone, Debug)]
pub struct Message {
    pub header: Header,
    pub options: OptionTable,
}

impl Message {
    pub fn new(header: Header, options: OptionTable) -> Self {
        Self { header, options }
    }

    /// True if this message is a reply (`op == BOOTREPLY`) addressed to
    /// `mac` under transaction `xid`.
    pub fn is_for_us(&self, mac: &[u8], xid: u32) -> bool {
        self.header.op == BOOT_REPLY && self.header.xid == xid && self.header.chaddr_matches(mac)
    }

    /// Decodes a complete DHCP message (BOOTP header + cookie + options),
    /// resolving any file/sname options overload (option 52).
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        if data.len() < MIN_MESSAGE_SIZE {
            return Err(Error::DataUnderflow);
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];
        let xid = u32::from_be_bytes(data[4..8].try_into().unwrap());
        let secs = u16::from_be_bytes(data[8..10].try_into().unwrap());
        let flags = u16::from_be_bytes(data[10..12].try_into().unwrap());
        let ciaddr = ipv4_at(data, 12);
        let yiaddr = ipv4_at(data, 16);
        let siaddr = ipv4_at(data, 20);
        let giaddr = ipv4_at(data, 24);
        let mut chaddr = [0u8; CHADDR_LEN];
        chaddr.copy_from_slice(&data[28..28 + CHADDR_LEN]);

        let sname = &data[44..44 + SNAME_LEN];
        let file = &data[108..108 + FILE_LEN];

        let cookie_off = 236;
        if data[cookie_off..cookie_off + 4] != MAGIC_COOKIE {
            return Err(Error::MissingCookie);
        }

        let mut options = OptionTable::new();
        options.decode_stream(&data[cookie_off + 4..])?;

        if let Some(overload) = options.get(OPT_OVERLOAD).and_then(|v| v.first().copied()) {
            if overload & 1 != 0 {
                options.decode_stream(file)?;
            }
            if overload & 2 != 0 {
                options.decode_stream(sname)?;
            }
        }

        if options.message_type().is_none() {
            return Err(Error::InvalidMessageType);
        }

        let header = Header {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            broadcast: flags & 0x8000 != 0,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
        };

        Ok(Self { header, options })
    }

    /// Encodes the message, padding to [`MIN_BOOTP_MESSAGE_SIZE`] when
    /// `bootp_compat` is set (legacy relays expect a minimum frame size).
    pub fn encode(&self, bootp_compat: bool) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(MIN_BOOTP_MESSAGE_SIZE);

        out.push(self.header.op);
        out.push(self.header.htype);
        out.push(self.header.hlen);
        out.push(self.header.hops);
        out.extend_from_slice(&self.header.xid.to_be_bytes());
        out.extend_from_slice(&self.header.secs.to_be_bytes());
        out.extend_from_slice(&(if self.header.broadcast { 0x8000u16 } else { 0 }).to_be_bytes());
        out.extend_from_slice(&self.header.ciaddr.octets());
        out.extend_from_slice(&self.header.yiaddr.octets());
        out.extend_from_slice(&self.header.siaddr.octets());
        out.extend_from_slice(&self.header.giaddr.octets());
        out.extend_from_slice(&self.header.chaddr);
        out.resize(out.len() + SNAME_LEN + FILE_LEN, 0);
        out.extend_from_slice(&MAGIC_COOKIE);

        self.options.encode(&mut out);

        if bootp_compat {
            while out.len() < MIN_BOOTP_MESSAGE_SIZE {
                out.push(OPT_PAD);
            }
        }

        Ok(out)
    }
}

fn ipv4_at(data: &[u8], off: usize) -> Ipv4Addr {
    Ipv4Addr::new(data[off], data[off + 1], data[off + 2], data[off + 3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(xid: u32) -> Header {
        Header::new_request(1, 6, [0; 16], xid, 0, true, Ipv4Addr::UNSPECIFIED)
    }

    #[test]
    fn round_trips_header_and_options() {
        let mut options = OptionTable::new();
        options.set_u8(OPT_MESSAGE_TYPE, MessageType::Discover as u8);
        options.set_ipv4(OPT_REQUESTED_IP, Ipv4Addr::new(192, 0, 2, 10));

        let msg = Message::new(sample_header(0x1234_5678), options);
        let encoded = msg.encode(false).unwrap();
        let decoded = Message::decode(&encoded).unwrap();

        assert_eq!(decoded.header.xid, 0x1234_5678);
        assert_eq!(decoded.options.message_type(), Some(MessageType::Discover));
        assert_eq!(
            decoded.options.get_ipv4(OPT_REQUESTED_IP),
            Some(Ipv4Addr::new(192, 0, 2, 10))
        );
    }

    #[test]
    fn rejects_bad_cookie() {
        let mut data = vec![0u8; MIN_MESSAGE_SIZE];
        data[0] = BOOT_REPLY;
        // cookie left as zero, not the magic value
        assert!(matches!(Message::decode(&data), Err(Error::MissingCookie)));
    }

    #[test]
    fn rejects_missing_message_type() {
        let msg = Message::new(sample_header(1), OptionTable::new());
        let encoded = msg.encode(false).unwrap();
        assert!(matches!(
            Message::decode(&encoded),
            Err(Error::InvalidMessageType)
        ));
    }

    #[test]
    fn splits_long_option_values_across_tlvs() {
        let mut options = OptionTable::new();
        options.set_u8(OPT_MESSAGE_TYPE, MessageType::Inform as u8);
        options.set(OPT_MESSAGE, vec![b'x'; 300]);

        let msg = Message::new(sample_header(1), options);
        let encoded = msg.encode(false).unwrap();

        // two TLVs for code 56: 255 bytes then 45 bytes
        let cookie_off = 236;
        let opts = &encoded[cookie_off + 4..];
        assert_eq!(opts[0], OPT_MESSAGE);
        assert_eq!(opts[1], 255);
        let second_tlv_off = 2 + 255;
        assert_eq!(opts[second_tlv_off], OPT_MESSAGE);
        assert_eq!(opts[second_tlv_off + 1], 45);

        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded.options.get(OPT_MESSAGE).unwrap().len(), 300);
    }

    #[test]
    fn overload_combines_file_and_sname_streams() {
        let mut sname = vec![0u8; SNAME_LEN];
        sname[0] = OPT_HOST_NAME;
        sname[1] = 3;
        sname[2..5].copy_from_slice(b"abc");
        sname[5] = OPT_END;

        let mut file = vec![0u8; FILE_LEN];
        file[0] = OPT_MESSAGE;
        file[1] = 1;
        file[2] = b'!';
        file[3] = OPT_END;

        let mut data = vec![0u8; MIN_MESSAGE_SIZE];
        data[0] = BOOT_REPLY;
        data[44..44 + SNAME_LEN].copy_from_slice(&sname);
        data[108..108 + FILE_LEN].copy_from_slice(&file);
        data[236..240].copy_from_slice(&MAGIC_COOKIE);

        // options area: message-type, overload=3, end
        let options_area = [OPT_MESSAGE_TYPE, 1, MessageType::Ack as u8, OPT_OVERLOAD, 1, 3, OPT_END];
        data.extend_from_slice(&options_area);

        let decoded = Message::decode(&data).unwrap();
        assert_eq!(decoded.options.get(OPT_HOST_NAME), Some(&b"abc"[..]));
        assert_eq!(decoded.options.get(OPT_MESSAGE), Some(&b"!"[..]));
    }

    #[test]
    fn infinite_lease_preserved() {
        let mut options = OptionTable::new();
        options.set_u32(OPT_LEASE_TIME, INFINITE_LEASE);
        assert_eq!(options.lease_time(), Some(INFINITE_LEASE));
    }
}
