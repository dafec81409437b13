//! IEEE 802.15.4 link-layer addresses.
use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

enum_with_unknown! {
    /// The addressing mode field of a frame control word.
    pub enum AddressMode(u8) {
        /// No address present.
        Absent = 0b00,
        /// A 16-bit short address.
        Short = 0b10,
        /// A 64-bit extended address.
        Extended = 0b11,
    }
}

/// A link-layer address of a mesh neighbor.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum LinkAddress {
    /// An assigned 16-bit short address.
    Short(u16),
    /// The 64-bit extended (MAC) address.
    Extended([u8; 8]),
}

/// The short address marking a device that has none assigned yet.
pub const SHORT_UNASSIGNED: u16 = 0xfffe;

/// The broadcast short address, never assigned to a device.
pub const SHORT_BROADCAST: u16 = 0xffff;

impl LinkAddress {
    /// Parse an address of the given mode from the octets it occupies in a frame.
    ///
    /// Addresses appear in frames in little-endian byte order.
    pub fn parse(mode: AddressMode, data: &[u8]) -> Result<LinkAddress> {
        match mode {
            AddressMode::Short => {
                let bytes = data.get(..2).ok_or(Error::Truncated)?;
                Ok(LinkAddress::Short(u16::from_le_bytes([bytes[0], bytes[1]])))
            },
            AddressMode::Extended => {
                let bytes = data.get(..8).ok_or(Error::Truncated)?;
                let mut mac = [0; 8];
                for (dst, src) in mac.iter_mut().zip(bytes.iter().rev()) {
                    *dst = *src;
                }
                Ok(LinkAddress::Extended(mac))
            },
            AddressMode::Absent | AddressMode::Unknown(_) => Err(Error::Unrecognized),
        }
    }

    /// The addressing mode that carries this address.
    pub fn mode(&self) -> AddressMode {
        match self {
            LinkAddress::Short(_) => AddressMode::Short,
            LinkAddress::Extended(_) => AddressMode::Extended,
        }
    }

    /// Query whether a short address is one actually assigned to a device.
    pub fn is_assigned_short(short: u16) -> bool {
        short < SHORT_UNASSIGNED
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkAddress::Short(short) => write!(f, "{:04x}", short),
            LinkAddress::Extended(mac) => {
                write!(f, "{:04x}", NetworkEndian::read_u16(&mac[0..2]))?;
                write!(f, ":{:04x}", NetworkEndian::read_u16(&mac[2..4]))?;
                write!(f, ":{:04x}", NetworkEndian::read_u16(&mac[4..6]))?;
                write!(f, ":{:04x}", NetworkEndian::read_u16(&mac[6..8]))
            },
        }
    }
}
