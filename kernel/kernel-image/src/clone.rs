use crate::error::ImageError;
use crate::image::KernelImage;
use crate::plan::ImagePlan;
use crate::region::{MapStrategy, Region, RegionId};
use kernel_addresses::{Frame, PhysicalAddress, VirtualAddress, mask_bits};
use kernel_vmem::{PageTableAbi, PhysMapper};
use log::{debug, trace};

/// The source image's effective entry for the block at `va`, indexed at
/// `depth`.
///
/// When the source maps the block through a shallower large-block leaf, the
/// returned entry is re-based onto the offset of `va`'s block within that
/// leaf, so writing it into a depth-level slot aliases exactly the intended
/// range.
///
/// # Errors
/// - [`ImageError::LookupFault`] when the source has nothing mapped there.
fn block_entry<A: PageTableAbi>(
    plan: &ImagePlan,
    abi: &A,
    root: Frame,
    va: VirtualAddress,
    depth: usize,
) -> Result<A::Entry, ImageError> {
    let slot = abi.lookup_slot(root, va, depth);
    let entry = abi.read_entry(slot);
    if !abi.is_present(entry) {
        return Err(ImageError::LookupFault);
    }

    let expected = plan.geometry().untranslated_bits(depth);
    if slot.bits_left > expected {
        // Large-block mapping above the requested depth: derive the entry
        // for the sub-block containing `va`.
        let offset = va.block_offset(slot.bits_left) & !mask_bits(expected);
        Ok(abi.entry_at_address(entry, abi.entry_address(entry) + offset))
    } else {
        debug_assert_eq!(slot.bits_left, expected);
        Ok(entry)
    }
}

/// Physical address backing the block at `va` in the image rooted at
/// `root`.
fn block_backing<A: PageTableAbi>(
    plan: &ImagePlan,
    abi: &A,
    root: Frame,
    va: VirtualAddress,
    depth: usize,
) -> Result<PhysicalAddress, ImageError> {
    block_entry(plan, abi, root, va, depth).map(|entry| abi.entry_address(entry))
}

/// Clone one block: byte-copy for `Copied` regions, alias the translation
/// otherwise.
fn clone_entry<A: PageTableAbi, M: PhysMapper>(
    plan: &ImagePlan,
    abi: &A,
    mapper: &M,
    dest_root: Frame,
    src_root: Frame,
    va: VirtualAddress,
    depth: usize,
    region: &Region,
) -> Result<(), ImageError> {
    debug_assert!(depth >= 1);
    debug_assert!(depth <= plan.elf_depth());

    let dest_slot = abi.lookup_slot(dest_root, va, depth);
    if dest_slot.bits_left != plan.geometry().untranslated_bits(depth) {
        return Err(ImageError::LookupFault);
    }
    let dest_entry = abi.read_entry(dest_slot);

    if region.strategy == MapStrategy::Copied {
        // The mapper already placed the destination's duplicate page; fill
        // it with the source's bytes.
        if !abi.is_present(dest_entry) {
            return Err(ImageError::LookupFault);
        }
        let src_pa = block_backing(plan, abi, src_root, va, depth)?;
        let dest_pa = abi.entry_address(dest_entry);
        let len = 1usize << plan.geometry().untranslated_bits(depth);
        // SAFETY: both blocks were placed by the mapper/boot path and are
        // not aliased; the destination image is not yet runnable.
        unsafe {
            mapper
                .bytes_mut(dest_pa, len)
                .copy_from_slice(mapper.bytes(src_pa, len));
        }
    } else {
        // Share the block by copying the source's translation entry into
        // the empty destination slot.
        if abi.is_present(dest_entry) {
            return Err(ImageError::LookupFault);
        }
        let entry = block_entry(plan, abi, src_root, va, depth)?;
        abi.write_entry(dest_slot, entry);
    }

    Ok(())
}

/// Clone one region at its depth, block by block.
fn clone_region<A: PageTableAbi, M: PhysMapper>(
    plan: &ImagePlan,
    abi: &A,
    mapper: &M,
    dest_root: Frame,
    src_root: Frame,
    id: RegionId,
    region: &Region,
    depth: usize,
) -> Result<(), ImageError> {
    let bits = plan.geometry().untranslated_bits(depth);

    let mut entries = (region.end - region.start) >> bits;
    if region.end.block_offset(bits) != 0 {
        entries += 1;
    }

    let mut va = region.start.block_base(bits);
    for _ in 0..entries {
        trace!("{} {va} at depth {depth} of {id}", region.strategy);

        match clone_entry(plan, abi, mapper, dest_root, src_root, va, depth, region) {
            // A lookup fault while scanning the device window is the end of
            // the mapped devices, not an error.
            Err(ImageError::LookupFault) if region.strategy == MapStrategy::Device => break,
            Err(e) => return Err(e),
            Ok(()) => {}
        }

        va = va.wrapping_add(1u64 << bits);
    }

    Ok(())
}

/// Produce a second, independent image from a fully populated one.
///
/// For every region that is mapped at all, operating at the region's depth:
/// `Copied` regions have their page contents duplicated into the
/// destination's pre-existing pages; every other strategy aliases the
/// source's translation entries, leaving both images pointing at the same
/// memory. On success the destination becomes runnable.
///
/// # Errors
/// - [`ImageError::NotFullyMapped`] unless both images are fully mapped.
/// - [`ImageError::SourceNotCloneable`] unless the source is runnable and
///   populated.
/// - [`ImageError::AlreadyCloned`] when the destination is runnable or
///   already populated.
/// - [`ImageError::MissingRoot`] / [`ImageError::LookupFault`] on
///   inconsistent page tables.
pub fn clone_image<A: PageTableAbi, M: PhysMapper>(
    plan: &ImagePlan,
    abi: &A,
    mapper: &M,
    dest: &mut KernelImage,
    src: &KernelImage,
) -> Result<(), ImageError> {
    if dest.memories_mapped() != plan.total_memories()
        || src.memories_mapped() != plan.total_memories()
    {
        return Err(ImageError::NotFullyMapped);
    }
    if !src.runnable() || !src.copied() {
        return Err(ImageError::SourceNotCloneable);
    }
    if dest.runnable() || dest.copied() {
        return Err(ImageError::AlreadyCloned);
    }
    let dest_root = dest.root().ok_or(ImageError::MissingRoot)?;
    let src_root = src.root().ok_or(ImageError::MissingRoot)?;

    for (id, region) in plan.catalog().iter() {
        if region.strategy == MapStrategy::None {
            continue;
        }
        let depth = plan.depth_for(region.strategy);
        debug!("cloning {id} ({}) at depth {depth}", region.strategy);
        clone_region(plan, abi, mapper, dest_root, src_root, id, region, depth)?;
    }

    dest.copied = true;
    dest.runnable = true;

    Ok(())
}
