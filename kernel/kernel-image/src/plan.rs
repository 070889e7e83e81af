use crate::counts::{LevelCounts, compute_level_counts, count_span, pages_copied};
use crate::error::ConfigError;
use crate::region::{MapStrategy, RegionCatalog};
use kernel_vmem::LevelGeometry;
use log::debug;

/// Page-table depths at which the large-block regions are handled.
///
/// The physical-memory and device windows are mapped with large blocks, so
/// they need mapping objects only down to these depths rather than a full
/// set of intermediate tables.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MapDepths {
    /// Depth of the physical-window block mappings.
    pub phys_window: usize,
    /// Depth of the device-window block mappings.
    pub device: usize,
}

impl MapDepths {
    #[inline]
    #[must_use]
    pub const fn new(phys_window: usize, device: usize) -> Self {
        Self {
            phys_window,
            device,
        }
    }
}

/// Everything the mapper, cloner and switcher need to know about the
/// address-space shape: the region catalog, the level geometry, the
/// large-block depths and the memory-count table.
///
/// Built exactly once during boot; read-only afterwards. Construction
/// validates the configuration and fails boot on inconsistency.
#[derive(Copy, Clone, Debug)]
pub struct ImagePlan {
    catalog: RegionCatalog,
    geometry: LevelGeometry,
    depths: MapDepths,
    counts: LevelCounts,
}

impl ImagePlan {
    /// Validate the configuration and compute the memory-count table.
    ///
    /// # Errors
    /// - [`ConfigError::DepthOrder`] unless
    ///   `1 ≤ phys_window ≤ device ≤ last table level` — block regions are
    ///   never indexed at the root itself.
    /// - [`ConfigError::CopiedCountMismatch`] when the span-counted
    ///   duplicate-page total disagrees with the page-granule re-derivation
    ///   for any copied region.
    pub fn new(
        catalog: RegionCatalog,
        geometry: LevelGeometry,
        depths: MapDepths,
    ) -> Result<Self, ConfigError> {
        if depths.phys_window == 0
            || depths.phys_window > depths.device
            || depths.device > geometry.last_level()
        {
            return Err(ConfigError::DepthOrder);
        }

        catalog.log_regions();
        let counts = compute_level_counts(&catalog, &geometry, &depths);

        // The final-level count must agree with an independent page-granule
        // derivation; a mismatch means the region bounds are inconsistent.
        let page_bits = geometry.untranslated_bits(geometry.last_level());
        for (_, region) in catalog.iter() {
            if region.strategy == MapStrategy::Copied
                && count_span(region.start, region.end, page_bits)
                    != pages_copied(region, page_bits)
            {
                return Err(ConfigError::CopiedCountMismatch);
            }
        }

        debug!("image plan: {} memories per image", counts.total());

        Ok(Self {
            catalog,
            geometry,
            depths,
            counts,
        })
    }

    #[inline]
    #[must_use]
    pub const fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    #[inline]
    #[must_use]
    pub const fn geometry(&self) -> &LevelGeometry {
        &self.geometry
    }

    #[inline]
    #[must_use]
    pub const fn depths(&self) -> &MapDepths {
        &self.depths
    }

    #[inline]
    #[must_use]
    pub const fn counts(&self) -> &LevelCounts {
        &self.counts
    }

    /// Total memories a fully mapped image requires.
    #[inline]
    #[must_use]
    pub fn total_memories(&self) -> u64 {
        self.counts.total()
    }

    /// The depth at which exhaustively mapped regions bottom out: the last
    /// table level.
    #[inline]
    #[must_use]
    pub const fn elf_depth(&self) -> usize {
        self.geometry.last_level()
    }

    /// The depth at which a region of the given strategy is indexed.
    #[inline]
    #[must_use]
    pub const fn depth_for(&self, strategy: MapStrategy) -> usize {
        match strategy {
            MapStrategy::PhysWindow => self.depths.phys_window,
            MapStrategy::Device => self.depths.device,
            _ => self.elf_depth(),
        }
    }
}
