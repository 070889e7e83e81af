use crate::error::ImageError;
use crate::image::{Asid, KernelImage};
use crate::plan::ImagePlan;
use crate::region::RegionId;
use kernel_addresses::{Frame, mask_bits};
use kernel_vmem::{PageTableAbi, Slot};
use log::debug;

/// Resolution of ASIDs to user address-space roots.
///
/// Owned by the capability system; this subsystem only consumes it.
pub trait AsidLookup {
    /// The VSpace root bound to `asid`, if any.
    fn find_vspace_root(&self, asid: Asid) -> Option<Frame>;
}

/// Copy the root-level entries of the kernel window into the VSpace bound
/// to `asid`.
///
/// Only meaningful where kernel and user share a page-table root: the user
/// root then carries the kernel half verbatim. The window's upper bound is
/// the last representable address, so the entry range is computed
/// inclusively to avoid overflowing past it.
///
/// # Errors
/// - [`ImageError::UnknownAsid`] when no VSpace is bound to `asid`.
/// - [`ImageError::MissingRoot`] when the image has no root yet.
pub fn bind_vspace<A: PageTableAbi>(
    plan: &ImagePlan,
    abi: &A,
    image: &KernelImage,
    asid: Asid,
    asids: &impl AsidLookup,
) -> Result<(), ImageError> {
    let vspace_root = asids
        .find_vspace_root(asid)
        .ok_or(ImageError::UnknownAsid(asid))?;
    let root = image.root().ok_or(ImageError::MissingRoot)?;

    let geometry = plan.geometry();
    let shift = geometry.untranslated_bits(1);
    let index_mask = mask_bits(geometry.index_bits(0));

    let window = plan.catalog().region(RegionId::Window);
    let base_index = (window.start.as_u64() >> shift) & index_mask;
    let entries = (((window.end - window.start) >> shift) & index_mask) + 1;

    for entry in 0..entries {
        #[allow(clippy::cast_possible_truncation)]
        let index = (base_index + entry) as usize;
        let from = Slot {
            table: root,
            index,
            bits_left: shift,
        };
        let to = Slot {
            table: vspace_root,
            index,
            bits_left: shift,
        };
        abi.write_entry(to, abi.read_entry(from));
    }

    debug!("bound image for ASID {} ({entries} root entries)", asid);

    Ok(())
}
