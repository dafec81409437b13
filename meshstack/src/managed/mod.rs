//! Fixed-capacity containers.
//!
//! The containers reserve all of their memory at construction. Insertion fails with `None` once
//! the capacity is reached instead of reallocating, which turns pool exhaustion into an ordinary
//! return value for the protocol code above.
pub mod slotmap;

pub use self::slotmap::{Key, SlotMap};
