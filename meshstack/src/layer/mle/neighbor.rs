use core::fmt;

use crate::time::{Instant, TICKS_PER_SECOND};
use crate::wire::LinkAddress;
use crate::wire::ieee802154::SHORT_UNASSIGNED;

/// The mode bits a neighbor announced about itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceMode(pub u8);

impl DeviceMode {
    /// The receiver stays on while the device is idle.
    pub const RX_ON_IDLE: u8 = 0x08;

    /// A full function device that can route.
    pub const FULL_DEVICE: u8 = 0x02;

    /// Query whether the neighbor can be reached at any time.
    ///
    /// Otherwise it is sleepy and frames for it are queued until it polls.
    pub fn is_rx_on_idle(self) -> bool {
        self.0 & Self::RX_ON_IDLE != 0
    }

    /// Query whether the neighbor is a full function device.
    pub fn is_full_device(self) -> bool {
        self.0 & Self::FULL_DEVICE != 0
    }
}

/// A neighbor in an MLE table.
///
/// Entries live in the slots of their table and never move. The attribute index is the slot
/// number, it stays the same for as long as the table exists and is what other subsystems use to
/// refer to the neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    mac: [u8; 8],
    short: u16,
    attribute_index: u8,
    mode: DeviceMode,
    pub(crate) ttl: u32,
    timeout_rx: u32,
    last_contact: Instant,
    handshake_ready: bool,
    priority: bool,
    pub(crate) medium_ttl_challenge: bool,
    new_key_pending: bool,
    link_margin: u16,
}

impl Neighbor {
    /// The timeout of a neighbor that announced none, in seconds.
    pub const DEFAULT_TIMEOUT: u32 = 500;

    /// The longest timeout a neighbor may announce, in seconds.
    pub const MAX_TIMEOUT: u32 = 86_400;

    /// Ticks before expiry in which a priority neighbor of an end device is kept alive.
    pub const CHALLENGE_TIMER: u32 = 20;

    /// The link margin average is kept scaled by `1 << LINK_MARGIN_SHIFT`.
    pub const LINK_MARGIN_SHIFT: u32 = 3;

    /// A cleared entry for a slot.
    pub(crate) fn new(attribute_index: u8) -> Self {
        let mut neighbor = Neighbor {
            mac: [0; 8],
            short: SHORT_UNASSIGNED,
            attribute_index,
            mode: DeviceMode::default(),
            ttl: 0,
            timeout_rx: 0,
            last_contact: Instant::from_millis(0),
            handshake_ready: false,
            priority: false,
            medium_ttl_challenge: false,
            new_key_pending: false,
            link_margin: 0,
        };
        neighbor.timeout_update(0);
        neighbor.ttl = neighbor.timeout_rx;
        neighbor
    }

    /// Clear the entry for a new neighbor.
    ///
    /// Only the attribute index survives.
    pub(crate) fn reset(&mut self, mac: [u8; 8], link_margin: u8, now: Instant) {
        *self = Neighbor::new(self.attribute_index);
        self.mac = mac;
        self.last_contact = now;
        self.link_margin = u16::from(link_margin) << Self::LINK_MARGIN_SHIFT;
    }

    /// Fold a new link margin sample into the moving average.
    pub(crate) fn update_link_margin(&mut self, sample: u8) {
        let scaled = self.link_margin;
        self.link_margin = scaled
            .saturating_add(u16::from(sample))
            .saturating_sub(scaled >> Self::LINK_MARGIN_SHIFT);
    }

    /// Set the timeout the neighbor announced, in seconds.
    ///
    /// Zero selects the default, other values are clamped to at most a day. The stored timeout is
    /// in ticks, rounded up by one so a neighbor never expires early.
    pub fn timeout_update(&mut self, seconds: u32) {
        let seconds = match seconds {
            0 => Self::DEFAULT_TIMEOUT,
            other => other.min(Self::MAX_TIMEOUT),
        };
        self.timeout_rx = seconds * TICKS_PER_SECOND + 1;
    }

    /// Restart the countdown after hearing from the neighbor.
    pub fn timeout_refresh(&mut self, now: Instant) {
        self.ttl = self.timeout_rx;
        self.medium_ttl_challenge = false;
        self.last_contact = now;
    }

    /// The extended address.
    pub fn mac(&self) -> [u8; 8] {
        self.mac
    }

    /// The assigned short address, if any.
    pub fn short_address(&self) -> Option<u16> {
        if LinkAddress::is_assigned_short(self.short) {
            Some(self.short)
        } else {
            None
        }
    }

    /// Assign a short address.
    ///
    /// One of the reserved values removes the assignment.
    pub fn set_short_address(&mut self, short: u16) {
        self.short = short;
    }

    /// The slot number of this entry.
    pub fn attribute_index(&self) -> u8 {
        self.attribute_index
    }

    /// The announced device mode.
    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// Record the announced device mode.
    pub fn set_mode(&mut self, mode: DeviceMode) {
        self.mode = mode;
    }

    /// Ticks until the neighbor expires.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// The full timeout in ticks.
    pub fn timeout_rx(&self) -> u32 {
        self.timeout_rx
    }

    /// When the neighbor was last heard from.
    pub fn last_contact(&self) -> Instant {
        self.last_contact
    }

    /// Query whether the link establishment handshake completed.
    pub fn is_handshake_ready(&self) -> bool {
        self.handshake_ready
    }

    /// Mark the handshake as completed or not.
    pub fn set_handshake_ready(&mut self, ready: bool) {
        self.handshake_ready = ready;
    }

    /// Query whether the neighbor is the preferred parent.
    pub fn has_priority(&self) -> bool {
        self.priority
    }

    /// Mark the neighbor as the preferred parent.
    pub fn set_priority(&mut self, priority: bool) {
        self.priority = priority;
    }

    /// Query whether a router challenge is outstanding.
    pub fn challenge_outstanding(&self) -> bool {
        self.medium_ttl_challenge
    }

    /// Query whether the neighbor still has to switch to the next key.
    pub fn is_new_key_pending(&self) -> bool {
        self.new_key_pending
    }

    /// Mark or clear a pending key switch.
    pub fn set_new_key_pending(&mut self, pending: bool) {
        self.new_key_pending = pending;
    }

    /// The averaged link margin.
    pub fn link_margin(&self) -> u8 {
        (self.link_margin >> Self::LINK_MARGIN_SHIFT).min(u16::from(u8::MAX)) as u8
    }
}

impl fmt::Display for Neighbor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{} {}", self.attribute_index, LinkAddress::Extended(self.mac))?;
        if let Some(short) = self.short_address() {
            write!(f, " ({:04x})", short)?;
        }
        Ok(())
    }
}
