//! IPv6 addresses and the internet checksum.
use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

/// The minimum link MTU any IPv6 link must support, RFC 8200.
pub const MIN_MTU: usize = 1280;

/// The length of the fixed IPv6 header.
pub const HEADER_LEN: usize = 40;

/// The next header value of TCP.
pub const PROTOCOL_TCP: u8 = 6;

/// A sixteen-octet IPv6 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 16]);

impl Address {
    /// The unspecified address `::`.
    pub const UNSPECIFIED: Address = Address([0x00; 16]);

    /// The link-local all nodes multicast address `ff02::1`.
    pub const LINK_LOCAL_ALL_NODES: Address =
        Address([0xff, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);

    /// The prefix of link-local unicast addresses, `fe80::/64`.
    const LINK_LOCAL_PREFIX: [u8; 8] = [0xfe, 0x80, 0, 0, 0, 0, 0, 0];

    /// Construct an address from its eight sixteen-bit parts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(a0: u16, a1: u16, a2: u16, a3: u16,
               a4: u16, a5: u16, a6: u16, a7: u16) -> Address {
        let mut addr = [0u8; 16];
        NetworkEndian::write_u16(&mut addr[0..2], a0);
        NetworkEndian::write_u16(&mut addr[2..4], a1);
        NetworkEndian::write_u16(&mut addr[4..6], a2);
        NetworkEndian::write_u16(&mut addr[6..8], a3);
        NetworkEndian::write_u16(&mut addr[8..10], a4);
        NetworkEndian::write_u16(&mut addr[10..12], a5);
        NetworkEndian::write_u16(&mut addr[12..14], a6);
        NetworkEndian::write_u16(&mut addr[14..16], a7);
        Address(addr)
    }

    /// Construct a link-local address from an interface identifier.
    pub fn link_local(iid: [u8; 8]) -> Address {
        let mut addr = [0u8; 16];
        addr[..8].copy_from_slice(&Self::LINK_LOCAL_PREFIX);
        addr[8..].copy_from_slice(&iid);
        Address(addr)
    }

    /// Construct an address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not sixteen octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 16];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an IPv6 address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is the unspecified address.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0x00; 16]
    }

    /// Query whether the address is a multicast address.
    pub fn is_multicast(&self) -> bool {
        self.0[0] == 0xff
    }

    /// Query whether the address lies in `fe80::/64`.
    pub fn is_link_local(&self) -> bool {
        self.0[..8] == Self::LINK_LOCAL_PREFIX
    }

    /// The interface identifier, the lower 64 bits.
    pub fn interface_id(&self) -> [u8; 8] {
        let mut iid = [0; 8];
        iid.copy_from_slice(&self.0[8..]);
        iid
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // No `::` compression, these end up in trace output only.
        for (i, word) in self.0.chunks(2).enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:x}", NetworkEndian::read_u16(word))?;
        }
        Ok(())
    }
}

/// An IPv6 network prefix.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Subnet {
    address: Address,
    prefix_len: u8,
}

impl Subnet {
    /// The subnet containing every address.
    pub const ANY: Subnet = Subnet { address: Address::UNSPECIFIED, prefix_len: 0 };

    /// Create a subnet from an address and a prefix length.
    ///
    /// Host bits of the address are masked off. Returns `None` if the prefix length is larger
    /// than 128.
    pub fn new(address: Address, prefix_len: u8) -> Option<Subnet> {
        if prefix_len > 128 {
            return None;
        }

        let mut masked = address.0;
        for (i, byte) in masked.iter_mut().enumerate() {
            *byte &= Self::mask_byte(prefix_len, i);
        }
        Some(Subnet { address: Address(masked), prefix_len })
    }

    /// The network address.
    pub fn network(&self) -> Address {
        self.address
    }

    /// The length of the prefix in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Query whether the subnet contains an address.
    pub fn contains(&self, address: Address) -> bool {
        self.address.0.iter()
            .zip(address.0.iter())
            .enumerate()
            .all(|(i, (net, addr))| net & Self::mask_byte(self.prefix_len, i) == addr & Self::mask_byte(self.prefix_len, i))
    }

    fn mask_byte(prefix_len: u8, index: usize) -> u8 {
        let bits = usize::from(prefix_len).saturating_sub(index * 8).min(8);
        match bits {
            0 => 0,
            n => !0u8 << (8 - n),
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

pub mod checksum {
    //! The internet checksum, RFC 1071.
    use byteorder::{ByteOrder, NetworkEndian};

    use super::Address;

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        // For each 32-byte chunk...
        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            let mut d = &data[..CHUNK_SIZE];
            // ... take by 2 bytes and sum them.
            while d.len() >= 2 {
                accum += NetworkEndian::read_u16(d) as u32;
                d = &d[2..];
            }

            data = &data[CHUNK_SIZE..];
        }

        // Sum the rest that does not fit the last 32-byte chunk,
        // taking by 2 bytes.
        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        // Add the last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Checksum a gather list as if its parts were one contiguous buffer.
    ///
    /// Parts of odd length are allowed anywhere, the byte following an odd part is summed as the
    /// low octet of the straddling word.
    pub fn gather(parts: &[&[u8]]) -> u16 {
        let mut accum: u32 = 0;
        let mut odd = false;
        for part in parts {
            let mut part: &[u8] = part;
            if odd {
                if let Some((&low, rest)) = part.split_first() {
                    accum += u32::from(low);
                    part = rest;
                    odd = false;
                }
            }
            let sum = data(part);
            if part.len() % 2 == 1 {
                odd = true;
            }
            accum += u32::from(sum);
            accum = u32::from(propagate_carries(accum));
        }
        propagate_carries(accum)
    }

    /// Checksum an upper layer payload together with its IPv6 pseudo header.
    ///
    /// The pseudo header consists of both addresses, the payload length as 32 bits, three zero
    /// octets and the next header.
    pub fn upper_layer(src_addr: &Address, dst_addr: &Address, next_header: u8, payload: &[u8]) -> u16 {
        let mut proto_len = [0u8; 8];
        NetworkEndian::write_u32(&mut proto_len[0..4], payload.len() as u32);
        proto_len[7] = next_header;
        gather(&[src_addr.as_bytes(), dst_addr.as_bytes(), &proto_len[..], payload])
    }
}
