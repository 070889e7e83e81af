use crate::error::ImageError;
use crate::image::KernelImage;
use crate::mapper::build_image;
use crate::plan::ImagePlan;
use crate::region::{MapRights, MapStrategy};
use kernel_addresses::{FRAME_SIZE, FRAME_SIZE_BITS, Frame, PhysicalAddress, VirtualAddress};
use kernel_layout::{WindowLayout, memory};
use kernel_vmem::{BlockSource, LeafAttributes, PageTableAbi, PhysMapper};
use log::debug;

/// Physical backing the boot image is wired to.
#[derive(Copy, Clone, Debug)]
pub struct BootBacking {
    /// Physical address the retained image was loaded at; backs the shared
    /// regions and seeds the copied regions.
    pub elf_load: PhysicalAddress,
    /// Physical address mapped at the start of the physical window.
    pub phys_window_base: PhysicalAddress,
    /// Physical address of the first device block.
    pub device_base: PhysicalAddress,
    /// Device blocks present on this platform; the device window beyond
    /// them stays unmapped.
    pub device_blocks: u64,
}

impl BootBacking {
    /// This platform's backing.
    #[must_use]
    pub const fn platform() -> Self {
        Self {
            elf_load: PhysicalAddress::new(memory::ELF_LOAD_BASE),
            phys_window_base: PhysicalAddress::zero(),
            device_base: PhysicalAddress::new(0x1_0000_0000),
            device_blocks: 4,
        }
    }
}

/// Install a leaf into an empty slot at `depth`.
fn install_leaf<A: PageTableAbi>(
    plan: &ImagePlan,
    abi: &A,
    root: Frame,
    va: VirtualAddress,
    depth: usize,
    pa: PhysicalAddress,
    attrs: LeafAttributes,
) -> Result<(), ImageError> {
    let slot = abi.lookup_slot(root, va, depth);
    if slot.bits_left != plan.geometry().untranslated_bits(depth)
        || abi.is_present(abi.read_entry(slot))
    {
        return Err(ImageError::LookupFault);
    }
    abi.write_entry(slot, abi.leaf_entry(pa, attrs));
    Ok(())
}

/// Build and populate image 0, the clone source.
///
/// The boot image ends up the way the statically initialised boot address
/// space does on a real machine: a full set of tables and duplicate pages
/// from the standard mapper loop, leaf mappings for the shared regions
/// pointing into the loaded kernel, large-block mappings for the physical
/// and device windows, and the copied regions seeded with the loaded
/// kernel's bytes. On success the image is fully mapped, populated,
/// runnable, and its stack is considered live.
///
/// # Errors
/// - [`ImageError::AlreadyPopulated`] when the image has any mappings.
/// - [`ImageError::OutOfMemory`] when `alloc` runs dry.
/// - [`ImageError::LookupFault`] on inconsistent tables.
pub fn init_boot_image<A: PageTableAbi, M: PhysMapper, B: BlockSource>(
    plan: &ImagePlan,
    layout: &WindowLayout,
    backing: &BootBacking,
    abi: &A,
    mapper: &M,
    alloc: &mut B,
    image: &mut KernelImage,
) -> Result<(), ImageError> {
    debug_assert!(image.asid().is_boot());
    if image.memories_mapped() != 0 || image.root().is_some() {
        return Err(ImageError::AlreadyPopulated);
    }

    // Root, intermediate tables and the duplicate data pages.
    build_image(plan, abi, mapper, alloc, image)?;
    let root = image.root().ok_or(ImageError::MissingRoot)?;

    // Shared regions: map the loaded kernel's pages directly.
    for (id, region) in plan.catalog().iter() {
        if region.strategy != MapStrategy::Shared {
            continue;
        }
        debug!("boot-mapping {id} from the load image");
        let mut va = region.start;
        while va < region.end {
            let pa = backing.elf_load + (va - layout.elf_start);
            install_leaf(
                plan,
                abi,
                root,
                va,
                plan.elf_depth(),
                pa,
                LeafAttributes {
                    writable: region.rights == MapRights::ReadWrite,
                    executable: region.rights == MapRights::ReadOnly,
                    global: true,
                },
            )?;
            va = va.wrapping_add(FRAME_SIZE);
        }
    }

    // The physical window, in large blocks at its depth.
    {
        let region = plan.catalog().region(crate::region::RegionId::PhysWindow);
        let depth = plan.depths().phys_window;
        let bits = plan.geometry().untranslated_bits(depth);
        let blocks = (region.end - region.start) >> bits;
        debug!("boot-mapping phys-window: {blocks} blocks of 2^{bits}");
        for block in 0..blocks {
            let va = region.start.wrapping_add(block << bits);
            let pa = backing.phys_window_base + (block << bits);
            install_leaf(
                plan,
                abi,
                root,
                va,
                depth,
                pa,
                LeafAttributes {
                    writable: true,
                    executable: false,
                    global: true,
                },
            )?;
        }
    }

    // The device window, as far as devices exist.
    {
        let region = plan.catalog().region(crate::region::RegionId::Device);
        let depth = plan.depths().device;
        let bits = plan.geometry().untranslated_bits(depth);
        debug!(
            "boot-mapping device window: {} blocks of 2^{bits}",
            backing.device_blocks
        );
        for block in 0..backing.device_blocks {
            let va = region.start.wrapping_add(block << bits);
            let pa = backing.device_base + (block << bits);
            install_leaf(
                plan,
                abi,
                root,
                va,
                depth,
                pa,
                LeafAttributes {
                    writable: true,
                    executable: false,
                    global: true,
                },
            )?;
        }
    }

    // Seed the duplicate pages with the loaded kernel's content.
    for (_, region) in plan.catalog().iter() {
        if region.strategy != MapStrategy::Copied {
            continue;
        }
        let mut va = region.start.block_base(FRAME_SIZE_BITS);
        while va < region.end {
            let src = backing.elf_load + (va - layout.elf_start);
            let dst = abi.translate(root, va).ok_or(ImageError::LookupFault)?;
            // SAFETY: the duplicate pages were freshly allocated by the
            // mapper; the load image is read-only here.
            unsafe {
                #[allow(clippy::cast_possible_truncation)]
                let len = FRAME_SIZE as usize;
                mapper.bytes_mut(dst, len).copy_from_slice(mapper.bytes(src, len));
            }
            va = va.wrapping_add(FRAME_SIZE);
        }
    }

    image.copied = true;
    image.runnable = true;
    image.stack_initialized = true;
    image.stack_pointer = layout.stack_top(0);

    debug!(
        "boot image ready: {} memories, root {:?}",
        image.memories_mapped(),
        root
    );

    Ok(())
}
