//! Unified error type for the wire codec, the socket layer and the public API.
//!
//! Per the three-tier error model: packet-level malformation never reaches
//! this type (it is logged and dropped inside the codec/socket layer),
//! recoverable protocol errors are surfaced as events rather than `Error`,
//! and only fatal/argument errors make it out of a public entry point.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The byte buffer ran out before a fixed-size field could be read.
    #[error("DHCP message truncated")]
    DataUnderflow,

    /// An option's length field claims more bytes than remain in the buffer.
    #[error("DHCP option overruns buffer")]
    Malformed,

    /// The output buffer is too small to hold the encoded message.
    #[error("output buffer too small")]
    BufferOverflow,

    /// The magic cookie did not match 0x63825363.
    #[error("missing or invalid DHCP magic cookie")]
    MissingCookie,

    /// `hlen`/`htype` did not match the configured transport.
    #[error("invalid hardware address length")]
    InvalidHlen,

    /// Option 53 (message type) absent, or its value is not a known type.
    #[error("missing or invalid DHCP message type")]
    InvalidMessageType,

    /// An IPv4 or UDP checksum did not match, and the kernel did not
    /// attest to it already having been validated.
    #[error("invalid IP/UDP checksum")]
    ChecksumError,

    /// A caller-supplied constructor argument was invalid (zero ifindex,
    /// missing client identifier for InfiniBand, wrong MAC length, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The probe this handle referred to was superseded by a newer one.
    #[error("probe was preempted by a newer probe")]
    Preempted,

    /// A logic invariant was violated (e.g. dispatch on a client with no
    /// live sockets). Fatal: the caller should destroy the client.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),

    /// A fatal, unrecoverable OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A fatal `nix` errno failure from socket/epoll/timerfd setup.
    #[error("system call failed: {0}")]
    Errno(#[from] nix::errno::Errno),
}

pub type Result<T> = std::result::Result<T, Error>;
