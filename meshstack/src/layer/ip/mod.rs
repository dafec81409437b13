//! Interfaces and egress selection for IPv6.
//!
//! The engines above do not own any network device. They only need to know which interfaces
//! exist, what kind of link each interface drives (segment sizes on a low-power mesh link are
//! clamped far below those of an ethernet link) and which interface a destination is reached
//! through. Datagrams built by the engines carry the chosen interface and are handed back to the
//! owner for transmission.
use core::fmt;

use crate::wire::Ipv6Address;

mod route;

pub use route::{Route, Routes};

/// The identifier of a network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(pub u8);

/// The kind of link an interface drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    /// A link with at least the IPv6 minimum MTU and no further restrictions.
    Ethernet,

    /// A low-power mesh link (6LoWPAN over IEEE 802.15.4).
    ///
    /// Frames are small and fragmentation is costly so TCP segment sizes are clamped further.
    Mesh,
}

/// A registered network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interface {
    /// The identifier used in datagrams and routes.
    pub id: InterfaceId,
    /// The link kind.
    pub link: Link,
    /// The source address of connections opened through this interface.
    pub address: Ipv6Address,
}

/// A datagram produced by an engine, ready for the IP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// The egress interface.
    pub interface: InterfaceId,
    /// The IPv6 source address.
    pub src_addr: Ipv6Address,
    /// The IPv6 destination address.
    pub dst_addr: Ipv6Address,
    /// The upper layer payload, including its own header and checksum.
    pub payload: alloc::vec::Vec<u8>,
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}
