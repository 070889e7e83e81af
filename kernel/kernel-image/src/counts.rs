use crate::plan::MapDepths;
use crate::region::{MapStrategy, Region, RegionCatalog, RegionId};
use kernel_addresses::VirtualAddress;
use kernel_vmem::{LevelGeometry, MAX_LEVELS};
use log::debug;

/// Number of kernel memories needed to fill the span between two addresses
/// when `unresolved_bits` address bits remain unresolved — the number of
/// distinct `unresolved_bits`-aligned blocks `[start, end)` touches.
///
/// A partially covered final block counts as one. For widths at or above
/// the machine word the shift would have no defined meaning, so only the
/// partial-block term is reported; the kernel window that spans the whole
/// translated range relies on this.
#[must_use]
pub fn count_span(start: VirtualAddress, end: VirtualAddress, unresolved_bits: u32) -> u64 {
    let mut memories = 0;

    if end.block_offset(unresolved_bits) != 0 {
        memories += 1;
    }

    if unresolved_bits >= u64::BITS {
        return memories;
    }

    let start_block = start.as_u64() >> unresolved_bits;
    let end_block = end.as_u64() >> unresolved_bits;

    if end_block >= start_block {
        memories + (end_block - start_block)
    } else {
        0
    }
}

/// Memories needed to cover one region at `unresolved_bits`.
fn count_region(region: &Region, unresolved_bits: u32) -> u64 {
    count_span(region.start, region.end, unresolved_bits)
}

/// Memories in the intersection of two regions at `unresolved_bits`.
fn count_intersection(a: &Region, b: &Region, unresolved_bits: u32) -> u64 {
    let start = if a.start < b.start { b.start } else { a.start };
    let end = if a.end < b.end { a.end } else { b.end };
    count_span(start, end, unresolved_bits)
}

/// Pages a `Copied` region duplicates, re-derived at page granularity.
///
/// Independent of the span counting above; [`crate::ImagePlan::new`] checks
/// the two derivations against each other.
#[must_use]
pub fn pages_copied(region: &Region, page_bits: u32) -> u64 {
    if region.strategy != MapStrategy::Copied {
        return 0;
    }
    let start = region.start.block_base(page_bits);
    let mut pages = (region.end - start) >> page_bits;
    if region.end.block_offset(page_bits) != 0 {
        pages += 1;
    }
    pages
}

/// The memory-count table: how many kernel memories each level needs.
///
/// Computed once during boot, read-only afterwards.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LevelCounts {
    counts: [u64; MAX_LEVELS],
    levels: usize,
}

impl LevelCounts {
    /// Count for one level; 0 when out of range.
    #[inline]
    #[must_use]
    pub const fn count(&self, level: usize) -> u64 {
        if level < self.levels {
            self.counts[level]
        } else {
            0
        }
    }

    /// Number of levels described.
    #[inline]
    #[must_use]
    pub const fn levels(&self) -> usize {
        self.levels
    }

    /// Total memories a fully mapped image requires.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts[..self.levels].iter().sum()
    }

    /// Copy the per-level counts out, e.g. into the boot-info frame.
    ///
    /// ### Panics
    /// When `dst` is shorter than [`Self::levels`].
    pub fn copy_to(&self, dst: &mut [u64]) {
        dst[..self.levels].copy_from_slice(&self.counts[..self.levels]);
    }
}

/// Compute the memory-count table for `catalog` under `geometry` and
/// `depths`.
///
/// Walking from the root: levels above the phys-window depth must span the
/// entire kernel window; levels from there to the device depth span the
/// retained image plus one object for the device window (minus any
/// double-counted overlap); levels below that span the retained image
/// alone. The final level counts the duplicate data pages of every
/// `Copied` region.
#[must_use]
pub fn compute_level_counts(
    catalog: &RegionCatalog,
    geometry: &LevelGeometry,
    depths: &MapDepths,
) -> LevelCounts {
    let mut counts = [0u64; MAX_LEVELS];

    for (level, count) in counts
        .iter_mut()
        .enumerate()
        .take(geometry.last_level())
    {
        let unresolved_bits = geometry.untranslated_bits(level);

        if level >= depths.phys_window {
            let elf = catalog.region(RegionId::Elf);
            *count = count_region(elf, unresolved_bits);

            if level < depths.device {
                // The device window needs at least one mapping object at
                // every level above the last, unless the object covering
                // the retained image already covers it.
                let device = catalog.region(RegionId::Device);
                *count += 1;
                *count -= count_intersection(elf, device, unresolved_bits);
            }
        } else {
            *count = count_region(catalog.region(RegionId::Window), unresolved_bits);
        }

        debug!("level {level}: {count} mapping objects");
    }

    let page_bits = geometry.untranslated_bits(geometry.last_level());
    let mut duplicate_pages = 0;
    for (_, region) in catalog.iter() {
        if region.strategy == MapStrategy::Copied {
            duplicate_pages += count_region(region, page_bits);
        }
    }
    counts[geometry.last_level()] = duplicate_pages;
    debug!(
        "level {}: {} duplicate pages",
        geometry.last_level(),
        duplicate_pages
    );

    LevelCounts {
        counts,
        levels: geometry.levels(),
    }
}

/// Memories the retained image needs at `unresolved_bits`; the mapper's
/// region selection repeats the counting pass' arithmetic.
pub(crate) fn elf_memories(catalog: &RegionCatalog, unresolved_bits: u32) -> u64 {
    count_region(catalog.region(RegionId::Elf), unresolved_bits)
}

/// Duplicate pages one region contributes at the final level.
pub(crate) fn region_pages(region: &Region, page_bits: u32) -> u64 {
    if region.strategy == MapStrategy::Copied {
        count_region(region, page_bits)
    } else {
        0
    }
}
