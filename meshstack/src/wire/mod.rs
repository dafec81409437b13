/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase byte wrappers, e.g. [`tcp_packet`].
 * Second, it provides a compact, high-level representation of header data that can be created
   from parsing and emitted into a sequence of octets. This happens through the `Repr` family of
   structs, e.g. [`TcpRepr`].

[`tcp_packet`]: struct.tcp_packet.html
[`TcpRepr`]: struct.TcpRepr.html

The byte wrappers guarantee that, if the `check_len()` method returned `Ok(())`, then no field
accessor or setter method will panic. When parsing untrusted input it is *necessary* to use the
checked constructor. When emitting, the buffer length is calculated by the `Repr` struct.

In the `Repr` family of data structures, the `Repr::parse()` method never panics and the
`Repr::emit()` method never panics as long as the underlying buffer is exactly `Repr::buffer_len()`
octets long.

# Examples

To emit a TCP header into an octet buffer, and then parse it back:

```rust
use meshstack::wire::{Ipv6Address, TcpFlags, TcpRepr, TcpSeqNumber, tcp_packet};
let repr = TcpRepr {
    src_port:     49152,
    dst_port:     80,
    flags:        TcpFlags::SYN,
    seq_number:   TcpSeqNumber(1),
    ack_number:   None,
    window_len:   1024,
    max_seg_size: Some(1220),
    payload_len:  0,
};
let src = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
let dst = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
let mut buffer = vec![0; repr.buffer_len()];
{ // emission
    let packet = tcp_packet::new_unchecked_mut(&mut buffer);
    repr.emit(packet);
    packet.fill_checksum(src, dst);
}
{ // parsing
    let packet = tcp_packet::new_checked(&buffer)
        .expect("truncated segment");
    assert!(packet.verify_checksum(src, dst));
    let parsed = TcpRepr::parse(packet)
        .expect("malformed segment");
    assert_eq!(repr, parsed);
}
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `error.rs`
// * `ip.rs`
// * `mod.rs` (this file)
// * `tcp.rs`

// FIXME: Most fields should be self-explanatory and there is the general guide but enable once the
// other issues have been resolved.
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
}

mod error;
pub mod ieee802154;
pub mod ip;
mod tcp;

pub use self::error::{Error, Result};

pub use self::ip::{
    Address as Ipv6Address,
    Subnet as Ipv6Subnet,
    checksum};

pub use self::ieee802154::{
    AddressMode as Ieee802154AddressMode,
    LinkAddress};

pub use self::tcp::{
    tcp as tcp_packet,
    parse_options as parse_tcp_options,
    DEFAULT_MSS as TCP_DEFAULT_MSS,
    HEADER_LEN as TCP_HEADER_LEN,
    Flags as TcpFlags,
    Repr as TcpRepr,
    SeqNumber as TcpSeqNumber,
    TcpOption};
