use crate::counts::{elf_memories, region_pages};
use crate::error::ImageError;
use crate::image::KernelImage;
use crate::plan::ImagePlan;
use crate::region::{MapRights, RegionId};
use kernel_addresses::{Frame, PhysicalAddress, VirtualAddress};
use kernel_vmem::{BlockSource, LeafAttributes, PageTableAbi, PhysMapper};
use log::trace;

/// Where the next kernel memory goes: the level, the address the new object
/// will resolve, and the region it belongs to.
///
/// Transient — recomputed from `memories_mapped` on every call, never
/// stored.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MappingDescriptor {
    /// Level of the object to be inserted; 0 is the root.
    pub level: usize,
    /// Address the object will resolve, aligned to the level's granule.
    pub vaddr: VirtualAddress,
    /// Region the object belongs to.
    pub region: RegionId,
}

/// Determine where the image's next kernel memory must be placed.
///
/// A pure function of `image.memories_mapped`: the n-th memory falls into
/// whichever level's count bucket contains n, and within the level into
/// whichever region's sub-count contains the remainder. Calling this twice
/// without an intervening [`map_memory`] returns the same descriptor.
///
/// # Errors
/// - [`ImageError::FullyMapped`] once every required memory was placed.
pub fn locate_next_slot(
    plan: &ImagePlan,
    image: &KernelImage,
) -> Result<MappingDescriptor, ImageError> {
    if image.memories_mapped() >= plan.total_memories() {
        return Err(ImageError::FullyMapped);
    }

    // Find the level whose count bucket holds the next memory.
    let counts = plan.counts();
    let mut level = 0;
    let mut level_index = image.memories_mapped();
    while level_index >= counts.count(level) {
        level_index -= counts.count(level);
        level += 1;
        // Cannot run past the last level while the image is not fully
        // mapped: the buckets sum to the required total.
        debug_assert!(level < plan.geometry().levels());
    }

    let unresolved_bits = plan.geometry().untranslated_bits(level);

    // Find the region the memory belongs to.
    let depths = plan.depths();
    let (region, region_index) = if level < depths.phys_window {
        // Everything at the top spans the whole window.
        (RegionId::Window, level_index)
    } else if level < depths.device {
        let elf = elf_memories(plan.catalog(), unresolved_bits);
        if level_index < elf {
            (RegionId::Elf, level_index)
        } else {
            (RegionId::Device, level_index - elf)
        }
    } else if level < plan.elf_depth() {
        // Only the retained image is mapped exhaustively below here.
        (RegionId::Elf, level_index)
    } else {
        // A duplicated data page; walk the copied regions in catalog order.
        let mut index = level_index;
        let mut chosen = None;
        for (id, region) in plan.catalog().iter() {
            let pages = region_pages(region, unresolved_bits);
            if index < pages {
                chosen = Some(id);
                break;
            }
            index -= pages;
        }
        let Some(id) = chosen else {
            // The last-level bucket summed the same page counts; running
            // off the end means the plan is inconsistent.
            return Err(ImageError::LookupFault);
        };
        (id, index)
    };

    let base = plan.catalog().region(region).start.block_base(unresolved_bits);
    // A granule at or above the word width fits at most one object, at the
    // block base itself.
    let offset = if unresolved_bits >= u64::BITS {
        0
    } else {
        region_index << unresolved_bits
    };
    let vaddr = base.wrapping_add(offset);

    Ok(MappingDescriptor {
        level,
        vaddr,
        region,
    })
}

/// Install one raw memory block at the slot a descriptor names.
///
/// The block must be `2^size_bits(level)` bytes; it is zeroed before use.
/// Level 0 installs the image's root; deeper levels walk to the parent slot
/// and write a table pointer, or — at the final level — a leaf whose
/// writable/executable bits derive from the region's rights. Increments
/// `memories_mapped` on success.
///
/// Mapping order is the strictly increasing `memories_mapped` order
/// produced by [`locate_next_slot`]; mapping out of order is undefined and
/// surfaces as [`ImageError::LookupFault`] when the parent path is
/// inconsistent.
///
/// # Errors
/// - [`ImageError::FullyMapped`] when nothing remains to map.
/// - [`ImageError::MissingRoot`] when a non-root mapping precedes the root.
/// - [`ImageError::LookupFault`] when the walk does not end on the expected
///   empty slot.
pub fn map_memory<A: PageTableAbi, M: PhysMapper>(
    plan: &ImagePlan,
    abi: &A,
    mapper: &M,
    image: &mut KernelImage,
    mapping: &MappingDescriptor,
    block: PhysicalAddress,
) -> Result<(), ImageError> {
    if image.memories_mapped() >= plan.total_memories() {
        return Err(ImageError::FullyMapped);
    }

    let size_bits = plan.geometry().size_bits(mapping.level);
    // SAFETY: the allocator handed us this block for exclusive use.
    unsafe {
        mapper.bytes_mut(block, 1usize << size_bits).fill(0);
    }

    trace!(
        "mapping {block} at {} level {} of {}",
        mapping.vaddr, mapping.level, mapping.region
    );

    if mapping.level == 0 {
        if image.root.is_some() {
            return Err(ImageError::LookupFault);
        }
        image.root = Some(Frame::from_addr(block));
    } else {
        let root = image.root.ok_or(ImageError::MissingRoot)?;
        let slot = abi.lookup_slot(root, mapping.vaddr, mapping.level);
        if slot.bits_left != plan.geometry().untranslated_bits(mapping.level)
            || abi.is_present(abi.read_entry(slot))
        {
            return Err(ImageError::LookupFault);
        }

        let entry = if mapping.level == plan.geometry().last_level() {
            // Leaves are global: images share ASIDs within the kernel and
            // all translation caches are flushed on an image switch.
            let rights = plan.catalog().region(mapping.region).rights;
            abi.leaf_entry(
                block,
                LeafAttributes {
                    writable: matches!(rights, MapRights::ReadWrite),
                    executable: matches!(rights, MapRights::ReadOnly),
                    global: true,
                },
            )
        } else {
            abi.table_entry(Frame::from_addr(block))
        };
        abi.write_entry(slot, entry);
    }

    image.memories_mapped += 1;
    Ok(())
}

/// Drive locate+map until `image` is fully mapped, drawing blocks from
/// `alloc`. The boot bring-up loop.
///
/// # Errors
/// - [`ImageError::OutOfMemory`] when the allocator runs dry; otherwise
///   whatever [`map_memory`] reports.
pub fn build_image<A: PageTableAbi, M: PhysMapper, B: BlockSource>(
    plan: &ImagePlan,
    abi: &A,
    mapper: &M,
    alloc: &mut B,
    image: &mut KernelImage,
) -> Result<(), ImageError> {
    while image.memories_mapped() < plan.total_memories() {
        let mapping = locate_next_slot(plan, image)?;
        let size_bits = plan.geometry().size_bits(mapping.level);
        let block = alloc
            .alloc_block(size_bits)
            .ok_or(ImageError::OutOfMemory)?;
        map_memory(plan, abi, mapper, image, &mapping, block)?;
    }
    Ok(())
}
