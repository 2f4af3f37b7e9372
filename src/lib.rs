//! A synchronous, fd-driven DHCPv4 client over raw packet and UDP sockets.
//!
//! The [`Client`] is driven by the host application: register its
//! [`Client::as_raw_fd`] (an epoll instance aggregating the packet
//! socket, the UDP socket, and a timer) with the host's event loop, call
//! [`Client::dispatch`] when it becomes readable, and drain
//! [`Client::pop_event`] for semantic transitions (offer available,
//! lease granted, lease retracted, lease extended, lease expired, link
//! down, probe cancelled).
//!
//! Start one attempt at a time with [`Client::probe`]; accept an offer
//! with [`Client::select_lease`]. Everything here runs on a single
//! thread with no internal suspension points — blocking only happens in
//! the host's own poll/epoll call.

mod client;
mod config;
mod error;
mod event;
mod lease;
mod net;
mod probe;
mod timer;
mod wire;

pub use client::Client;
pub use config::{ClientConfig, ProbeConfig, Transport};
pub use error::{Error, Result};
pub use event::Event;
pub use lease::{Lease, LeaseState};
pub use probe::{Probe, ProbeState};
pub use wire::{Header, Message, MessageType, OptionTable};
