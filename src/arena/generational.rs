//! A space-efficient, generational Arena allocator.
//!
//! Invariants:
//!
//! - The first entry (index 0) will always be Vacant, and serves as the
//! head of the free list. This allows us to use an Option<NonZeroU32>
//! to save space
//!
//! - `Index` is also a NonZeroU32, where the highest 8 bits are used to
//! store the generation of the entry, and the low 24 bits are represent
//! the index of the `Entry` in the `Arena`. This puts a hard cap on the
//! number of generations (255, after which they wrap) and items (2^24 - 2)
//! that can be stored in the `Arena`.
//!
//! - A vacant entry remembers the generation of the last value it held, so
//! an `Index` to a removed value never resolves to a later occupant of the
//! same slot (until the generation wraps).
#![forbid(unsafe_code)]
use std::fmt;
use std::num::NonZeroU32;

const MIN_CAPACITY: u32 = 16;
const INDEX_MASK: u32 = 0x00FF_FFFF;
const GEN_MASK: u32 = 0xFF00_0000;

/// A generational arena allowing 255 generations, and 2^24 - 2 items
pub struct Arena<T> {
    data: Vec<Entry<T>>,
    len: u32,
}

/// Entry in an Arena<T>
enum Entry<T> {
    /// Vacant entry contains the generation of its last occupant and a
    /// pointer to the next free vacant entry
    Vacant(u8, Option<NonZeroU32>),
    /// Occupied entry contains a generation count and a value
    Occupied(u8, T),
}

/// `Index` into an `Arena`, with bitpacked generation and index values
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Index(NonZeroU32);

impl Index {
    fn pair(self) -> (u8, u32) {
        let gen = ((self.0.get() & GEN_MASK) >> 24) as u8;
        let idx = self.0.get() & INDEX_MASK;
        (gen, idx)
    }

    fn new(gen: u8, index: NonZeroU32) -> Index {
        // `index` is nonzero and masked, so or-ing in the generation keeps
        // it nonzero.
        Index(index | ((gen as u32) << 24))
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (gen, idx) = self.pair();
        write!(f, "Index({}v{})", idx, gen)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Arena<T> {
        Arena::with_capacity(MIN_CAPACITY)
    }

    /// Allocate an `Arena` capable of storing `n` items before re-allocating.
    /// Requests above the index space are clamped to it.
    fn with_capacity(n: u32) -> Arena<T> {
        let mut arena = Arena {
            data: vec![Entry::Vacant(0, None)],
            len: 0,
        };
        arena.reserve(n.max(MIN_CAPACITY));
        arena
    }

    /// Number of occupied entries
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of items the `Arena` can store without allocating
    pub fn capacity(&self) -> u32 {
        self.data.len() as u32 - 1
    }

    #[inline]
    fn next_free(&self) -> Option<NonZeroU32> {
        match self.data.first() {
            Some(Entry::Vacant(_, next)) => *next,
            _ => None,
        }
    }

    #[inline]
    fn set_free(&mut self, next: Option<NonZeroU32>) {
        self.data[0] = Entry::Vacant(0, next);
    }

    /// Append up to `n` vacant entries to the free list. Returns the number
    /// of entries actually added, which is less than `n` near the 24 bit
    /// index limit.
    fn reserve(&mut self, n: u32) -> u32 {
        let start = self.data.len() as u32;
        let end = start.saturating_add(n).min(INDEX_MASK);
        if end <= start {
            return 0;
        }
        let head = self.next_free();

        self.data.reserve((end - start) as usize);
        self.data.extend((start..end).map(|idx| {
            if idx == end - 1 {
                Entry::Vacant(0, head)
            } else {
                Entry::Vacant(0, NonZeroU32::new(idx + 1))
            }
        }));
        self.set_free(NonZeroU32::new(start));
        end - start
    }

    /// Attempt to insert an item into the `Arena` without performing any
    /// additional allocations.
    ///
    /// Will return an `Err` if the `Arena` has no remaining capacity
    pub fn try_insert(&mut self, item: T) -> Result<Index, T> {
        let free = match self.next_free() {
            Some(free) => free,
            None => return Err(item),
        };
        let slot = free.get() as usize;
        match self.data[slot] {
            Entry::Vacant(gen, next) => {
                self.set_free(next);
                self.data[slot] = Entry::Occupied(gen, item);
                self.len += 1;
                Ok(Index::new(gen, free))
            }
            // The free list only ever links vacant entries
            Entry::Occupied(..) => Err(item),
        }
    }

    /// Insert an item, growing the `Arena` if needed. Only fails once the
    /// 24 bit index space is used up.
    pub fn insert(&mut self, item: T) -> Result<Index, T> {
        match self.try_insert(item) {
            Ok(idx) => Ok(idx),
            Err(item) => {
                if self.reserve(self.capacity()) == 0 {
                    return Err(item);
                }
                self.try_insert(item)
            }
        }
    }

    pub fn get(&self, index: Index) -> Option<&T> {
        let (gen, idx) = index.pair();
        match self.data.get(idx as usize) {
            Some(Entry::Occupied(g, val)) if *g == gen => Some(val),
            _ => None,
        }
    }

    /// Remove the item at `index`, bumping the generation of its slot.
    /// Stale indices return `None`.
    pub fn remove(&mut self, index: Index) -> Option<T> {
        let (gen, idx) = index.pair();
        match self.data.get(idx as usize) {
            Some(Entry::Occupied(g, _)) if *g == gen => {}
            _ => return None,
        }
        let free = self.next_free();
        let prev = std::mem::replace(
            &mut self.data[idx as usize],
            Entry::Vacant(gen.wrapping_add(1), free),
        );
        self.set_free(NonZeroU32::new(idx));
        self.len -= 1;
        match prev {
            Entry::Occupied(_, item) => Some(item),
            Entry::Vacant(..) => None,
        }
    }

    /// Iterate over occupied entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.data
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(slot, entry)| match entry {
                Entry::Occupied(gen, val) => {
                    let slot = NonZeroU32::new(slot as u32)?;
                    Some((Index::new(*gen, slot), val))
                }
                Entry::Vacant(..) => None,
            })
    }

    /// Iterate mutably over occupied entries in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.data
            .iter_mut()
            .enumerate()
            .skip(1)
            .filter_map(|(slot, entry)| match entry {
                Entry::Occupied(gen, val) => {
                    let slot = NonZeroU32::new(slot as u32)?;
                    Some((Index::new(*gen, slot), val))
                }
                Entry::Vacant(..) => None,
            })
    }
}

impl<T: fmt::Debug> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
