use crate::geometry::LevelGeometry;
use core::fmt;
use kernel_addresses::{Frame, PhysicalAddress, VirtualAddress};

/// A page-table slot located by [`PageTableAbi::lookup_slot`].
///
/// Identifies one entry (`table`, `index`) and reports `bits_left`, the
/// number of virtual-address bits the walk had not yet resolved when it
/// stopped. A walk that ends shallower than requested (superpage or empty
/// slot on the path) reports more bits left than the target depth implies;
/// callers use the difference to detect both conditions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Slot {
    /// Frame holding the table this slot lives in.
    pub table: Frame,
    /// Entry index within the table.
    pub index: usize,
    /// Virtual-address bits unresolved at this slot.
    pub bits_left: u32,
}

/// Permissions for a leaf entry, already reduced to what the architecture
/// needs to know. Kernel mappings are never user-accessible.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LeafAttributes {
    /// Writes allowed through this mapping.
    pub writable: bool,
    /// Instruction fetches allowed through this mapping.
    pub executable: bool,
    /// Translation survives an address-space switch.
    pub global: bool,
}

/// Opaque per-architecture page-table operations.
///
/// The image-management core is written entirely against this interface;
/// the entry encoding never escapes the implementation. `depth` counts walk
/// steps from the root: depth 1 addresses a root slot.
pub trait PageTableAbi {
    /// Architecture entry representation; opaque to callers.
    type Entry: Copy + fmt::Debug;

    /// The translation hierarchy this implementation walks.
    fn geometry(&self) -> LevelGeometry;

    /// Walk from `root` towards `depth`, stopping early at any non-table
    /// entry, and return the slot the walk ended on.
    fn lookup_slot(&self, root: Frame, va: VirtualAddress, depth: usize) -> Slot;

    /// Read the entry in `slot`.
    fn read_entry(&self, slot: Slot) -> Self::Entry;

    /// Write `entry` into `slot`. The caller owns any required translation-
    /// cache maintenance.
    fn write_entry(&self, slot: Slot, entry: Self::Entry);

    /// Whether `entry` maps or points at anything at all.
    fn is_present(&self, entry: Self::Entry) -> bool;

    /// Whether `entry` points at a next-level table rather than memory.
    fn is_intermediate(&self, entry: Self::Entry) -> bool;

    /// Physical address encoded in `entry`.
    fn entry_address(&self, entry: Self::Entry) -> PhysicalAddress;

    /// `entry` with its physical address replaced by `pa`, all other
    /// attributes preserved. Used to re-base a superpage alias onto the
    /// block inside it.
    fn entry_at_address(&self, entry: Self::Entry, pa: PhysicalAddress) -> Self::Entry;

    /// An entry pointing at the next-level table in `next`.
    fn table_entry(&self, next: Frame) -> Self::Entry;

    /// A leaf entry mapping `pa` with `attrs`.
    fn leaf_entry(&self, pa: PhysicalAddress, attrs: LeafAttributes) -> Self::Entry;

    /// Resolve `va` to a physical address through a full-depth walk,
    /// following superpage leaves wherever the walk stops.
    fn translate(&self, root: Frame, va: VirtualAddress) -> Option<PhysicalAddress> {
        let slot = self.lookup_slot(root, va, self.geometry().last_level());
        let entry = self.read_entry(slot);
        if !self.is_present(entry) || self.is_intermediate(entry) {
            return None;
        }
        Some(self.entry_address(entry) + va.block_offset(slot.bits_left))
    }
}
