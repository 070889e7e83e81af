use crate::abi::{LeafAttributes, PageTableAbi, Slot};
use crate::entry::Sv39Entry;
use crate::geometry::LevelGeometry;
use crate::PhysMapper;
use kernel_addresses::{Frame, PhysicalAddress, VirtualAddress, mask_bits};

/// Entries in one Sv39 page table.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Bits resolved by one table level.
const INDEX_BITS: u32 = 9;

/// One Sv39 page table: 512 entries, one frame, frame-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [Sv39Entry; ENTRIES_PER_TABLE],
}

impl PageTable {
    /// A fully zeroed table (all slots empty).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [Sv39Entry::new(); ENTRIES_PER_TABLE],
        }
    }

    /// Read the entry at `index`.
    #[inline]
    #[must_use]
    pub const fn get(&self, index: usize) -> Sv39Entry {
        self.entries[index]
    }

    /// Write the entry at `index`.
    #[inline]
    pub const fn set(&mut self, index: usize, entry: Sv39Entry) {
        self.entries[index] = entry;
    }
}

/// The Sv39 implementation of [`PageTableAbi`].
///
/// Tables live in physical frames reached through a [`PhysMapper`]; the
/// structure itself is stateless beyond that borrow.
pub struct Sv39Tables<'m, M: PhysMapper> {
    mapper: &'m M,
}

impl<'m, M: PhysMapper> Sv39Tables<'m, M> {
    /// Three table levels of 9 bits plus the 4 KiB data-page level; every
    /// level's objects are one frame.
    pub const GEOMETRY: LevelGeometry =
        LevelGeometry::new(&[9, 9, 9, 12], &[12, 12, 12, 12]);

    #[inline]
    #[must_use]
    pub const fn new(mapper: &'m M) -> Self {
        Self { mapper }
    }

    /// Borrow the table held in `frame`.
    #[inline]
    fn table(&self, frame: Frame) -> &'m mut PageTable {
        // SAFETY: frames handed to the walker are page-table frames owned by
        // an image; the mapper contract covers the borrow.
        unsafe { self.mapper.phys_to_mut::<PageTable>(frame.base()) }
    }
}

impl<M: PhysMapper> PageTableAbi for Sv39Tables<'_, M> {
    type Entry = Sv39Entry;

    #[inline]
    fn geometry(&self) -> LevelGeometry {
        Self::GEOMETRY
    }

    fn lookup_slot(&self, root: Frame, va: VirtualAddress, depth: usize) -> Slot {
        debug_assert!(depth >= 1);
        debug_assert!(depth <= Self::GEOMETRY.last_level());

        let mut bits_left = Self::GEOMETRY.translation_bits();
        let mut table = root;
        let mut remaining = depth;
        loop {
            bits_left -= INDEX_BITS;
            #[allow(clippy::cast_possible_truncation)]
            let index = ((va.as_u64() >> bits_left) & mask_bits(INDEX_BITS)) as usize;
            let slot = Slot {
                table,
                index,
                bits_left,
            };

            let entry = self.table(table).get(index);
            remaining -= 1;
            // Stop at the requested depth, or as soon as the walk meets
            // something that is not a page table (a leaf or an empty slot).
            if remaining == 0 || !entry.is_table() {
                return slot;
            }
            table = Frame::from_addr(entry.physical_address());
        }
    }

    #[inline]
    fn read_entry(&self, slot: Slot) -> Sv39Entry {
        self.table(slot.table).get(slot.index)
    }

    #[inline]
    fn write_entry(&self, slot: Slot, entry: Sv39Entry) {
        self.table(slot.table).set(slot.index, entry);
    }

    #[inline]
    fn is_present(&self, entry: Sv39Entry) -> bool {
        entry.valid()
    }

    #[inline]
    fn is_intermediate(&self, entry: Sv39Entry) -> bool {
        entry.is_table()
    }

    #[inline]
    fn entry_address(&self, entry: Sv39Entry) -> PhysicalAddress {
        entry.physical_address()
    }

    #[inline]
    fn entry_at_address(&self, entry: Sv39Entry, pa: PhysicalAddress) -> Sv39Entry {
        let mut adjusted = entry;
        adjusted.set_physical_address(pa);
        adjusted
    }

    #[inline]
    fn table_entry(&self, next: Frame) -> Sv39Entry {
        let mut entry = Sv39Entry::new().with_valid(true);
        entry.set_physical_address(next.base());
        entry
    }

    #[inline]
    fn leaf_entry(&self, pa: PhysicalAddress, attrs: LeafAttributes) -> Sv39Entry {
        let mut entry = Sv39Entry::new()
            .with_valid(true)
            .with_readable(true)
            .with_writable(attrs.writable)
            .with_executable(attrs.executable)
            .with_global(attrs.global)
            .with_accessed(true)
            .with_dirty(true);
        entry.set_physical_address(pa);
        entry
    }
}
