use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::neighbor::Neighbor;
use crate::layer::{Error, Result};
use crate::layer::ip::InterfaceId;
use crate::time::Instant;
use crate::wire::LinkAddress;

/// The role of the local device on an interface.
///
/// Decides how neighbors age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableMode {
    /// Neighbors are other routers and children, routers are challenged when half of their
    /// timeout passed.
    Router,
    /// The priority neighbor is our parent and is kept alive before it expires.
    EndDevice,
    /// A sleepy end device, neighbors simply expire.
    SleepyEndDevice,
}

/// The answer of a keep-alive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeepAlive {
    /// Could not be sent now, hold the neighbor at its current age and try again next tick.
    Hold,
    /// Sent, the neighbor ages on and expires unless it answers.
    Age,
}

/// Something that happened to the topology, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyEvent {
    /// A neighbor was added.
    Add([u8; 8]),
    /// A neighbor was removed.
    Remove([u8; 8]),
    /// All neighbors of the interface were dropped.
    Clear,
}

/// The callbacks of the protocol using a table.
///
/// Registered per interface together with the table.
pub trait Hooks {
    /// A neighbor is about to leave the table.
    fn on_remove(&mut self, interface: InterfaceId, neighbor: &Neighbor);

    /// The priority neighbor of an end device is about to expire.
    fn keep_alive(&mut self, interface: InterfaceId, neighbor: &Neighbor) -> KeepAlive;

    /// Challenge a router that was not heard from for half of its timeout.
    ///
    /// An error stops the challenges for this tick.
    fn challenge(&mut self, interface: InterfaceId, neighbor: &Neighbor) -> Result<()> {
        let _ = (interface, neighbor);
        Err(Error::Illegal)
    }

    /// Query whether the interface is up, neighbors age only while it is.
    fn is_active(&mut self, interface: InterfaceId) -> bool {
        let _ = interface;
        true
    }
}

/// What the neighbor tables need from the rest of the stack.
pub trait Services {
    /// Query whether an interface with that identifier exists.
    fn interface_exists(&self, interface: InterfaceId) -> bool;

    /// Drop all frames queued for indirect delivery to a link address.
    fn flush_indirect(&mut self, interface: InterfaceId, address: LinkAddress);

    /// Forget the link quality statistics of a neighbor.
    fn etx_neighbor_remove(&mut self, interface: InterfaceId, attribute_index: u8);

    /// Record a topology change.
    fn trace(&mut self, interface: InterfaceId, event: TopologyEvent);

    /// Arrange for `Engine::timer_expired` to be called after some ticks.
    fn schedule_tick(&mut self, ticks: u32);

    /// Stop the timer.
    fn cancel_tick(&mut self);
}

/// The neighbor table of one interface.
pub(crate) struct TableClass {
    pub(crate) interface: InterfaceId,
    pub(crate) mode: TableMode,
    pub(crate) entries: Vec<Neighbor>,
    /// Slots in use, most recently allocated first.
    pub(crate) active: VecDeque<u8>,
    /// Slots available, the next one on top.
    free: Vec<u8>,
    pub(crate) hooks: Box<dyn Hooks>,
    /// Snapshot of `active` while aging.
    scratch: Vec<u8>,
}

impl TableClass {
    /// The most slots a table can have, attribute indices are octets.
    pub(crate) const MAX_CAPACITY: usize = 256;

    /// Allocate a table with all slots free.
    pub(crate) fn new(interface: InterfaceId, capacity: usize, hooks: Box<dyn Hooks>) -> Result<Self> {
        if capacity == 0 || capacity > Self::MAX_CAPACITY {
            return Err(Error::Illegal);
        }

        let mut entries = Vec::new();
        let mut free = Vec::new();
        let mut scratch = Vec::new();
        let mut active = VecDeque::new();
        entries.try_reserve_exact(capacity).map_err(|_| Error::Exhausted)?;
        free.try_reserve_exact(capacity).map_err(|_| Error::Exhausted)?;
        scratch.try_reserve_exact(capacity).map_err(|_| Error::Exhausted)?;
        active.try_reserve_exact(capacity).map_err(|_| Error::Exhausted)?;

        // Checked above, every slot number fits.
        entries.extend((0..capacity).map(|slot| Neighbor::new(slot as u8)));
        free.extend((0..capacity).rev().map(|slot| slot as u8));

        Ok(TableClass {
            interface,
            mode: TableMode::EndDevice,
            entries,
            active,
            free,
            hooks,
            scratch,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn entry(&self, slot: u8) -> Option<&Neighbor> {
        self.entries.get(usize::from(slot))
    }

    pub(crate) fn entry_mut(&mut self, slot: u8) -> Option<&mut Neighbor> {
        self.entries.get_mut(usize::from(slot))
    }

    pub(crate) fn is_active(&self, slot: u8) -> bool {
        self.active.contains(&slot)
    }

    pub(crate) fn active_entries(&self) -> impl Iterator<Item=&Neighbor> + '_ {
        self.active.iter().filter_map(move |&slot| self.entry(slot))
    }

    /// Find the slot of a link address.
    ///
    /// A short address only matches neighbors that have one assigned.
    pub(crate) fn find(&self, address: LinkAddress) -> Option<u8> {
        self.active.iter().copied().find(|&slot| {
            let neighbor = match self.entry(slot) {
                Some(neighbor) => neighbor,
                None => return false,
            };
            match address {
                LinkAddress::Short(short) => neighbor.short_address() == Some(short),
                LinkAddress::Extended(mac) => neighbor.mac() == mac,
            }
        })
    }

    /// Take a free slot for a new neighbor and put it in front of the active list.
    pub(crate) fn allocate(&mut self, mac: [u8; 8], link_margin: u8, now: Instant) -> Option<u8> {
        let slot = self.free.pop()?;
        if let Some(entry) = self.entries.get_mut(usize::from(slot)) {
            entry.reset(mac, link_margin, now);
        }
        self.active.push_front(slot);
        Some(slot)
    }

    /// Remove an active neighbor and return its slot to the free list.
    ///
    /// The remove hook runs after queued frames were flushed but before the slot is reusable.
    pub(crate) fn remove<S: Services>(&mut self, slot: u8, services: &mut S) -> Result<()> {
        let position = self.active.iter().position(|&active| active == slot)
            .ok_or(Error::NotFound)?;
        self.active.remove(position);

        let interface = self.interface;
        let entry = match self.entries.get(usize::from(slot)) {
            Some(entry) => entry,
            None => return Err(Error::NotFound),
        };

        if let Some(short) = entry.short_address() {
            services.flush_indirect(interface, LinkAddress::Short(short));
        }
        services.flush_indirect(interface, LinkAddress::Extended(entry.mac()));
        self.hooks.on_remove(interface, entry);
        services.etx_neighbor_remove(interface, slot);
        services.trace(interface, TopologyEvent::Remove(entry.mac()));
        net_debug!("mle: {} removed neighbor {}", interface, entry);

        self.free.push(slot);
        Ok(())
    }

    /// Remove every neighbor.
    pub(crate) fn clear<S: Services>(&mut self, services: &mut S) {
        while let Some(&slot) = self.active.front() {
            if self.remove(slot, services).is_err() {
                break;
            }
        }
        services.trace(self.interface, TopologyEvent::Clear);
    }

    /// Age all neighbors by some ticks and evict the expired ones.
    pub(crate) fn age<S: Services>(&mut self, ticks: u32, services: &mut S) {
        let mut slots = core::mem::take(&mut self.scratch);
        slots.clear();
        slots.extend(self.active.iter().copied());

        for &slot in slots.iter() {
            let expired = match self.entries.get_mut(usize::from(slot)) {
                Some(entry) => Self::decay(self.mode, self.interface, &mut *self.hooks, entry, ticks),
                None => continue,
            };
            if expired {
                net_debug!("mle: {} neighbor #{} expired", self.interface, slot);
                let _ = self.remove(slot, services);
            }
        }

        if self.mode == TableMode::Router {
            self.challenge_routers();
        }

        self.scratch = slots;
    }

    /// Count down one entry, returning whether it expired.
    fn decay(mode: TableMode, interface: InterfaceId, hooks: &mut dyn Hooks, entry: &mut Neighbor, ticks: u32)
        -> bool
    {
        if entry.ttl <= ticks {
            return true;
        }

        // Only the exact boundary triggers the keep-alive. A step of several ticks may skip it.
        if mode == TableMode::EndDevice && entry.has_priority() && entry.ttl == Neighbor::CHALLENGE_TIMER {
            match hooks.keep_alive(interface, entry) {
                KeepAlive::Hold => net_trace!("mle: {} keep-alive for {} deferred", interface, entry),
                KeepAlive::Age => entry.ttl -= ticks,
            }
            return false;
        }

        entry.ttl -= ticks;
        false
    }

    /// Challenge at most two routers that were silent for half their timeout.
    fn challenge_routers(&mut self) {
        const PER_TICK: usize = 2;
        let mut challenged = 0;

        for &slot in self.active.iter() {
            if challenged == PER_TICK {
                break;
            }
            let entry = match self.entries.get_mut(usize::from(slot)) {
                Some(entry) => entry,
                None => continue,
            };
            if !entry.mode().is_full_device()
                || entry.medium_ttl_challenge
                || entry.ttl >= entry.timeout_rx() / 2
            {
                continue;
            }

            if let Err(_err) = self.hooks.challenge(self.interface, entry) {
                net_trace!("mle: {} challenge of {} failed: {}", self.interface, entry, _err);
                break;
            }
            entry.medium_ttl_challenge = true;
            challenged += 1;
        }
    }
}
