//! # Kernel Images
//!
//! Construction, cloning and switching of **kernel images**: complete,
//! independently switchable copies of the kernel's own virtual address
//! space, one per isolation domain or core.
//!
//! The kernel window is carved into regions with differing mapping
//! requirements:
//!
//! ```text
//!      +-------------------+ 0x00000000
//!      | Userspace         |
//!      +- WINDOW_START ----+
//!      |                   |
//!      | physical window   | <- shared, large-block mapped
//!      |                   |
//!      +- ELF_BASE --------+
//!      | .text             | <- duplicated per image, read-only
//!      +-------------------+
//!      | .text.switch      | <- shared; the only code that runs
//!      |                   |    while no single image is current
//!      +-------------------+
//!      | private data      | <- duplicated per image (incl. stacks)
//!      +-------------------+
//!      | idle-thread state | <- duplicated per image
//!      +-------------------+
//!      | shared data       | <- shared kernel state
//!      +- ELF_END ---------+
//!      +- DEVICE_BASE -----+
//!      |  device mappings  | <- shared, large-block mapped
//!      +- WINDOW_END ------+
//! ```
//!
//! Boot proceeds in three phases:
//!
//! 1. [`ImagePlan::new`] counts, once, how many page-table-level objects
//!    ("kernel memories") a fully populated image needs per level.
//! 2. The mapper ([`locate_next_slot`] / [`map_memory`], or the
//!    [`build_image`] loop) places raw memory blocks into the canonical next
//!    slot until an image is fully mapped; [`init_boot_image`] does this for
//!    image 0 and then populates it with the loaded kernel.
//! 3. [`clone_image`] derives further images from a populated one —
//!    duplicating per-image regions, aliasing shared ones — and
//!    [`ImageSwitcher`] makes one of them current on a core, relocating the
//!    in-flight kernel stack on the first entry into a fresh clone.
//!
//! Everything is written against the opaque
//! [`PageTableAbi`](kernel_vmem::PageTableAbi); no entry encoding appears
//! here.
//!
//! ## Concurrency
//!
//! All operations run with preemption disabled and never block. The mapper
//! has a single owner (boot); a clone destination is not yet runnable, so no
//! other core can observe it; the switcher publishes its writes with
//! explicit barriers before the current-image update, which is the final
//! step.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

mod boot;
mod clone;
mod colour;
mod counts;
mod error;
mod image;
mod mapper;
mod plan;
mod region;
mod state;
mod switch;
mod vspace;

pub use crate::boot::{BootBacking, init_boot_image};
pub use crate::clone::clone_image;
pub use crate::colour::{in_page_of_colour, next_page_of_colour};
pub use crate::counts::{LevelCounts, compute_level_counts, count_span, pages_copied};
pub use crate::error::{ConfigError, ImageError};
pub use crate::image::{
    Asid, CoreId, CoreSet, ImageId, ImageTable, KernelImage, MAX_IMAGES,
};
pub use crate::mapper::{MappingDescriptor, build_image, locate_next_slot, map_memory};
pub use crate::plan::{ImagePlan, MapDepths};
pub use crate::region::{MapRights, MapStrategy, NUM_REGIONS, Region, RegionCatalog, RegionId};
pub use crate::state::{BOOT_STATE, BootState};
pub use crate::switch::{CoreContext, CoreOps, ImageSwitcher};
pub use crate::vspace::{AsidLookup, bind_vspace};
