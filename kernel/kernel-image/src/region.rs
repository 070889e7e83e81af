use core::fmt;
use kernel_addresses::VirtualAddress;
use kernel_layout::WindowLayout;
use log::debug;

/// Number of regions the kernel window is carved into.
pub const NUM_REGIONS: usize = 9;

/// Identifier of one kernel-window region.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(usize)]
pub enum RegionId {
    /// The whole retained kernel image (covers Text..Shared). Bookkeeping
    /// only; never mapped under its own name.
    Elf = 0,
    /// Kernel code; identical bytes in every image, never written.
    Text = 1,
    /// The image-switch trampoline; one shared copy.
    Switch = 2,
    /// Per-image data, including the kernel stacks.
    Private = 3,
    /// Per-image idle-thread state.
    IdleThread = 4,
    /// Shared dynamic kernel state.
    Shared = 5,
    /// The physical-memory window.
    PhysWindow = 6,
    /// The device-mapping window.
    Device = 7,
    /// The whole kernel window. Bookkeeping only.
    Window = 8,
}

impl RegionId {
    /// Every region, in catalog order.
    pub const ALL: [Self; NUM_REGIONS] = [
        Self::Elf,
        Self::Text,
        Self::Switch,
        Self::Private,
        Self::IdleThread,
        Self::Shared,
        Self::PhysWindow,
        Self::Device,
        Self::Window,
    ];
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Elf => "elf",
            Self::Text => "text",
            Self::Switch => "switch",
            Self::Private => "private",
            Self::IdleThread => "idle-thread",
            Self::Shared => "shared",
            Self::PhysWindow => "phys-window",
            Self::Device => "device",
            Self::Window => "kernel-window",
        })
    }
}

/// How a region's pages materialise in a cloned image.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MapStrategy {
    /// Not mapped at all; excluded from every counting and mapping pass.
    None,
    /// One set of pages, aliased into every image.
    Shared,
    /// Physically duplicated pages, byte-copied on clone.
    Copied,
    /// The physical-memory window, aliased at its own depth.
    PhysWindow,
    /// Device mappings, aliased at their own depth for as far as the source
    /// has them.
    Device,
}

impl fmt::Display for MapStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Shared => "shared",
            Self::Copied => "copied",
            Self::PhysWindow => "phys-window",
            Self::Device => "device",
        })
    }
}

/// Access rights a region's leaf mappings carry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MapRights {
    /// Never mapped with permissions (bookkeeping regions).
    KernelOnly,
    /// Read-only; these are the code regions, so they execute.
    ReadOnly,
    /// Read-write data.
    ReadWrite,
}

/// One immutable region descriptor: a half-open address range plus its
/// mapping strategy and rights.
#[derive(Copy, Clone, Debug)]
pub struct Region {
    /// First address in the region.
    pub start: VirtualAddress,
    /// Address immediately after the region.
    pub end: VirtualAddress,
    /// How clones materialise the region.
    pub strategy: MapStrategy,
    /// Rights for the region's leaf mappings.
    pub rights: MapRights,
}

/// The static table of all nine regions, derived once from a
/// [`WindowLayout`] and never mutated.
#[derive(Copy, Clone, Debug)]
pub struct RegionCatalog {
    regions: [Region; NUM_REGIONS],
}

impl RegionCatalog {
    /// Build the catalog for `layout`.
    #[must_use]
    pub const fn new(layout: &WindowLayout) -> Self {
        Self {
            regions: [
                Region {
                    start: layout.elf_start,
                    end: layout.elf_end,
                    strategy: MapStrategy::None,
                    rights: MapRights::KernelOnly,
                },
                Region {
                    start: layout.elf_start,
                    end: layout.text_end,
                    strategy: MapStrategy::Copied,
                    rights: MapRights::ReadOnly,
                },
                Region {
                    start: layout.text_end,
                    end: layout.switch_end,
                    strategy: MapStrategy::Shared,
                    rights: MapRights::ReadOnly,
                },
                Region {
                    start: layout.switch_end,
                    end: layout.private_end,
                    strategy: MapStrategy::Copied,
                    rights: MapRights::ReadWrite,
                },
                Region {
                    start: layout.private_end,
                    end: layout.idle_end,
                    strategy: MapStrategy::Copied,
                    rights: MapRights::ReadWrite,
                },
                Region {
                    start: layout.idle_end,
                    end: layout.elf_end,
                    strategy: MapStrategy::Shared,
                    rights: MapRights::ReadWrite,
                },
                Region {
                    start: layout.phys_window_start,
                    end: layout.phys_window_end,
                    strategy: MapStrategy::PhysWindow,
                    rights: MapRights::ReadWrite,
                },
                Region {
                    start: layout.device_start,
                    end: layout.device_end,
                    strategy: MapStrategy::Device,
                    rights: MapRights::ReadWrite,
                },
                Region {
                    start: layout.window_start,
                    end: layout.window_end,
                    strategy: MapStrategy::None,
                    rights: MapRights::KernelOnly,
                },
            ],
        }
    }

    /// Look up one region.
    #[inline]
    #[must_use]
    pub const fn region(&self, id: RegionId) -> &Region {
        &self.regions[id as usize]
    }

    /// All regions in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        RegionId::ALL.iter().map(|&id| (id, self.region(id)))
    }

    /// Emit the boot-time region dump.
    pub fn log_regions(&self) {
        for (id, region) in self.iter() {
            debug!(
                "{:>13} ({:>11}): {} -> {}",
                id, region.strategy, region.start, region.end
            );
        }
    }
}
