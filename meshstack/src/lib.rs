//! A protocol core for constrained mesh devices.
//!
//! ## Table of contents
//!
//! 1. [Design](#design-and-relevant-core-concepts)
//! 2. [The wire module](wire/index.html)
//!    1. [Ipv6 addresses and checksums](wire/ip/index.html)
//!    1. [Tcp segments](wire/struct.TcpRepr.html)
//!    1. [IEEE 802.15.4 link addresses](wire/ieee802154/index.html)
//! 3. [The layers](layer/index.html)
//!    1. [Interfaces and routes](layer/ip/index.html)
//!    1. [The tcp session engine](layer/tcp/index.html)
//!    1. [Mle neighbor tables](layer/mle/index.html)
//! 4. Internals
//!    1. [The managed module](managed/index.html)
//!    1. [Time](time/index.html)
//!
//! ## Design and relevant core concepts
//!
//! The crate contains two engines that share nothing except the wire representations: a TCP
//! session engine for IPv6 that speaks RFC 793 over a minimal socket control block, and the
//! neighbor tables of Mesh Link Establishment which age, challenge and evict the neighbors of
//! each mesh interface.
//!
//! Both engines keep all of their state in an explicit context value. There are no globals, so
//! several independent stacks may live in one process (which is exactly what the tests do).
//!
//! Memory is reserved upfront. Session pools, socket buffers and neighbor tables are sized when
//! they are created and never grow afterwards. Running out of a pool is an ordinary error that
//! the caller is expected to handle by dropping a packet or refusing a connection.
//!
//! Neither engine blocks or spawns work. Waiting is expressed by a tick counter that the owner
//! advances from its own timer facility.
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

#[macro_use] mod macros;
pub mod layer;
pub mod managed;
pub mod time;
pub mod wire;

/// The `alloc` crate.
///
/// Pools are allocated once, at construction, and are never resized afterwards.
pub extern crate alloc;
