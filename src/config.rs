//! Client and probe configuration.
//!
//! Both configs are plain, validated-at-construction structs: there is no
//! file-based layer in this domain, so validation happens once, eagerly,
//! in `::new()`, the same pattern the teacher crate uses for its fallible
//! constructors.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::wire::OPT_CLIENT_ID;

/// Link-layer transport in use, determining `htype`/`hlen` and the
/// `chaddr` encoding rules (RFC 2131 §4.1, RFC 4390 for InfiniBand).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Transport {
    Ethernet,
    InfiniBand,
}

impl Transport {
    pub fn htype(&self) -> u8 {
        match self {
            Self::Ethernet => 1,
            Self::InfiniBand => 32,
        }
    }

    pub fn hlen(&self) -> u8 {
        match self {
            Self::Ethernet => 6,
            Self::InfiniBand => 0,
        }
    }
}

/// Immutable, per-client configuration: interface, transport, and the
/// hardware addressing needed to frame outbound packets.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub ifindex: i32,
    pub ifname: String,
    pub transport: Transport,
    pub mac: Vec<u8>,
    /// Option 61. Mandatory for InfiniBand (RFC 4390); optional for Ethernet.
    pub client_id: Option<Vec<u8>>,
}

impl ClientConfig {
    /// Validates `ifindex != 0` (rejected uniformly here rather than at
    /// each socket constructor) and the InfiniBand/client-identifier
    /// requirement from RFC 4390.
    pub fn new(
        ifindex: i32,
        ifname: impl Into<String>,
        transport: Transport,
        mac: Vec<u8>,
        client_id: Option<Vec<u8>>,
    ) -> Result<Self> {
        if ifindex == 0 {
            return Err(Error::InvalidArgument("ifindex must not be zero"));
        }

        if transport == Transport::InfiniBand && client_id.is_none() {
            return Err(Error::InvalidArgument(
                "InfiniBand transport requires a client identifier (option 61)",
            ));
        }

        if transport == Transport::Ethernet && mac.len() != 6 {
            return Err(Error::InvalidArgument(
                "Ethernet transport requires a 6-byte MAC address",
            ));
        }

        Ok(Self {
            ifindex,
            ifname: ifname.into(),
            transport,
            mac,
            client_id,
        })
    }

    /// Option 61 value to attach to outbound messages, if any.
    pub fn client_id_option(&self) -> Option<(u8, &[u8])> {
        self.client_id.as_deref().map(|id| (OPT_CLIENT_ID, id))
    }
}

/// Immutable, per-probe configuration: acquisition mode and the options
/// the caller wants the server to include.
#[derive(Clone, Debug, Default)]
pub struct ProbeConfig {
    pub init_reboot: bool,
    pub inform_only: bool,
    pub requested_ip: Option<Ipv4Addr>,
    pub requested_options: Vec<u8>,
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_reboot(mut self, requested_ip: Ipv4Addr) -> Self {
        self.init_reboot = true;
        self.requested_ip = Some(requested_ip);
        self
    }

    pub fn inform_only(mut self) -> Self {
        self.inform_only = true;
        self
    }

    pub fn request_options(mut self, codes: impl IntoIterator<Item = u8>) -> Self {
        self.requested_options = codes.into_iter().collect();
        self
    }

    /// Validates the mode flags are not contradictory and init-reboot
    /// carries the address it needs.
    pub fn validate(&self) -> Result<()> {
        if self.init_reboot && self.inform_only {
            return Err(Error::InvalidArgument(
                "a probe cannot be both init-reboot and inform-only",
            ));
        }
        if self.init_reboot && self.requested_ip.is_none() {
            return Err(Error::InvalidArgument(
                "init-reboot requires a requested IP address",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_ifindex() {
        let err = ClientConfig::new(0, "eth0", Transport::Ethernet, vec![0; 6], None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn infiniband_requires_client_id() {
        let err =
            ClientConfig::new(2, "ib0", Transport::InfiniBand, vec![], None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let ok = ClientConfig::new(2, "ib0", Transport::InfiniBand, vec![], Some(vec![1, 2, 3]));
        assert!(ok.is_ok());
    }

    #[test]
    fn ethernet_requires_six_byte_mac() {
        let err =
            ClientConfig::new(2, "eth0", Transport::Ethernet, vec![0; 4], None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn init_reboot_without_requested_ip_is_rejected() {
        let cfg = ProbeConfig::new();
        let cfg = ProbeConfig {
            init_reboot: true,
            ..cfg
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn init_reboot_and_inform_only_are_mutually_exclusive() {
        let cfg = ProbeConfig::new()
            .init_reboot(Ipv4Addr::new(192, 0, 2, 10))
            .inform_only();
        assert!(cfg.validate().is_err());
    }
}
