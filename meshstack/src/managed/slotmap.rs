use alloc::vec::Vec;

/// Provides a slotmap over a pool reserved upfront.
///
/// A slotmap provides a `Vec`-like interface where each entry is associated with a stable
/// index-like key. Lookup with the key will detect if an entry has been removed, so a key behaves
/// like a weak handle: it never resolves to an element inserted after its own was removed, even
/// when that element occupies the same slot.
///
/// ## Usage
///
/// ```
/// # use meshstack::managed::SlotMap;
/// let mut map = SlotMap::with_capacity(2);
/// let index = map.insert(42).unwrap();
/// assert_eq!(map.get(index).cloned(), Some(42));
/// ```
#[derive(Debug)]
pub struct SlotMap<T> {
    slots: Vec<Slot<T>>,
    generation: Generation,
    free_top: Option<usize>,
    len: usize,
    capacity: usize,
}

/// An index into a slotmap.
///
/// The index remains valid until the entry is removed. Accessing the slotmap with the index
/// after the entry was removed will fail, even if the slot has been reused for another element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    idx: usize,
    generation: Generation,
}

#[derive(Debug)]
struct Slot<T> {
    /// The generation of the element, or the link to the next free slot.
    state: GenerationOrFreelink,
    element: Option<T>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GenerationOrFreelink {
    Generation(Generation),
    Free(Option<usize>),
}

/// The generation counter.
///
/// Has strictly positive values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Generation(u32);

impl<T> SlotMap<T> {
    /// Create an empty map that can hold at most `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        SlotMap {
            slots: Vec::with_capacity(capacity),
            generation: Generation::default(),
            free_top: None,
            len: 0,
            capacity,
        }
    }

    /// The maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of elements currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if another insertion would fail.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Retrieve a value by index.
    pub fn get(&self, index: Key) -> Option<&T> {
        let slot = self.slots.get(index.idx)?;
        if slot.state != GenerationOrFreelink::Generation(index.generation) {
            return None;
        }
        slot.element.as_ref()
    }

    /// Retrieve a mutable value by index.
    pub fn get_mut(&mut self, index: Key) -> Option<&mut T> {
        let slot = self.slots.get_mut(index.idx)?;
        if slot.state != GenerationOrFreelink::Generation(index.generation) {
            return None;
        }
        slot.element.as_mut()
    }

    /// Check if the key still refers to an element.
    pub fn contains(&self, index: Key) -> bool {
        self.get(index).is_some()
    }

    /// Insert a value, returning its key.
    ///
    /// Returns `None` when the map is full, the value is dropped in that case.
    pub fn insert(&mut self, value: T) -> Option<Key> {
        let idx = self.free()?;
        let key = Key { idx, generation: self.generation };
        let slot = &mut self.slots[idx];

        if let GenerationOrFreelink::Free(next) = slot.state {
            self.free_top = next;
        }

        slot.state = GenerationOrFreelink::Generation(self.generation);
        slot.element = Some(value);
        self.generation.advance();
        self.len += 1;
        Some(key)
    }

    /// Remove an element.
    ///
    /// Returns `None` if the provided index did not refer to an element that could be freed.
    pub fn remove(&mut self, index: Key) -> Option<T> {
        if !self.contains(index) {
            return None;
        }

        let slot = &mut self.slots[index.idx];
        slot.state = GenerationOrFreelink::Free(self.free_top);
        self.free_top = Some(index.idx);
        self.len -= 1;
        slot.element.take()
    }

    /// Iterate over all elements and their keys.
    pub fn iter(&self) -> impl Iterator<Item=(Key, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            match (slot.state, slot.element.as_ref()) {
                (GenerationOrFreelink::Generation(generation), Some(element)) =>
                    Some((Key { idx, generation }, element)),
                _ => None,
            }
        })
    }

    /// Iterate over all elements mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item=(Key, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(idx, slot)| {
            match (slot.state, slot.element.as_mut()) {
                (GenerationOrFreelink::Generation(generation), Some(element)) =>
                    Some((Key { idx, generation }, element)),
                _ => None,
            }
        })
    }

    /// Collect the keys of all elements into a buffer.
    ///
    /// Allows a pass over the map that may remove elements while visiting them. The buffer is
    /// cleared first.
    pub fn keys_into(&self, buffer: &mut Vec<Key>) {
        buffer.clear();
        buffer.extend(self.iter().map(|(key, _)| key));
    }

    /// Get the next free slot, pushing a new one within the reserved capacity if necessary.
    fn free(&mut self) -> Option<usize> {
        if let Some(top) = self.free_top {
            return Some(top);
        }

        let new_index = self.slots.len();
        if new_index >= self.capacity {
            return None;
        }

        self.slots.push(Slot {
            state: GenerationOrFreelink::Free(None),
            element: None,
        });
        Some(new_index)
    }
}

impl Key {
    /// The slot position of the key.
    ///
    /// Stable for the lifetime of the element but shared with any later element of that slot.
    pub fn index(self) -> usize {
        self.idx
    }
}

impl Generation {
    fn advance(&mut self) {
        self.0 = self.0.wrapping_add(1).max(1)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation(1)
    }
}
