use crate::error::ImageError;
use crate::image::{Asid, CoreId, ImageId, ImageTable, KernelImage};
use crate::plan::ImagePlan;
use kernel_addresses::{FRAME_SIZE_BITS, PhysicalAddress, VirtualAddress};
use kernel_layout::WindowLayout;
use kernel_vmem::{PageTableAbi, PhysMapper};
use log::trace;

/// Per-core hardware execution context.
///
/// The switcher drives the architecture through this: reading and writing
/// the stack pointer, installing a translation root, and ordering its
/// writes. Implemented with inline assembly on a real core, by a recording
/// mock in hosted tests.
pub trait CoreOps {
    /// The core's current stack pointer.
    fn stack_pointer(&self) -> VirtualAddress;

    /// Redirect execution to `sp`.
    fn set_stack_pointer(&mut self, sp: VirtualAddress);

    /// Install `root` as the active translation root for `asid`, flushing
    /// non-global translations.
    fn install_root(&mut self, root: PhysicalAddress, asid: Asid);

    /// Full memory barrier; everything written before is visible to other
    /// cores before anything written after.
    fn barrier(&self);
}

/// A core's view of the image subsystem: which core it is and which image
/// it is currently executing under.
///
/// Caller-owned and single-writer: exactly one of these exists per core,
/// and only that core mutates it.
#[derive(Copy, Clone, Debug)]
pub struct CoreContext {
    core: CoreId,
    current: ImageId,
}

impl CoreContext {
    /// A context for `core`, currently executing under `initial`.
    #[inline]
    #[must_use]
    pub const fn new(core: CoreId, initial: ImageId) -> Self {
        Self {
            core,
            current: initial,
        }
    }

    #[inline]
    #[must_use]
    pub const fn core(&self) -> CoreId {
        self.core
    }

    /// The image this core is executing under.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> ImageId {
        self.current
    }
}

/// Makes kernel images current on cores.
pub struct ImageSwitcher<'a, A: PageTableAbi, M: PhysMapper> {
    plan: &'a ImagePlan,
    layout: &'a WindowLayout,
    abi: &'a A,
    mapper: &'a M,
}

impl<'a, A: PageTableAbi, M: PhysMapper> ImageSwitcher<'a, A, M> {
    #[must_use]
    pub const fn new(
        plan: &'a ImagePlan,
        layout: &'a WindowLayout,
        abi: &'a A,
        mapper: &'a M,
    ) -> Self {
        Self {
            plan,
            layout,
            abi,
            mapper,
        }
    }

    /// Make `target` the core's current image.
    ///
    /// No-op when `target` is already current. Otherwise: save the core's
    /// stack pointer into the image being left and publish it; on the first
    /// entry into a fresh clone, copy the in-flight stack into the clone's
    /// private backing so execution can continue seamlessly after the root
    /// swap; install the target's root; restore the target's saved stack
    /// pointer; and finally update the core's current-image reference and
    /// record the core in the target's execution set.
    ///
    /// # Errors
    /// - [`ImageError::NotRunnable`] when `target` may not be executed
    ///   under; nothing is modified. The scheduler must never let this
    ///   happen and should treat it as fatal.
    /// - [`ImageError::MissingRoot`] / [`ImageError::LookupFault`] on an
    ///   image with inconsistent mappings.
    pub fn set_kernel_image(
        &self,
        ctx: &mut CoreContext,
        images: &mut ImageTable,
        target: ImageId,
        hw: &mut impl CoreOps,
    ) -> Result<(), ImageError> {
        if !images.get(target).runnable() {
            return Err(ImageError::NotRunnable);
        }
        if target == ctx.current {
            return Ok(());
        }

        let sp = hw.stack_pointer();
        let (current, next) = images.pair_mut(ctx.current, target);

        // Save where the departing image stopped, and make that visible
        // before its root can be left.
        current.stack_pointer = sp;
        hw.barrier();

        if !next.stack_initialized {
            // Only clones arrive here: the boot image's stack is live from
            // the start.
            debug_assert!(!next.asid().is_boot());
            self.relocate_stack(ctx.core, current, next, sp)?;
            next.stack_pointer = sp;
            next.stack_initialized = true;
            hw.barrier();
        }

        let root = next.root().ok_or(ImageError::MissingRoot)?;
        trace!(
            "core {} switching to image asid {} (root {:?})",
            ctx.core.as_usize(),
            next.asid(),
            root
        );
        hw.install_root(root.base(), next.asid());
        hw.set_stack_pointer(next.stack_pointer);

        next.nodes_executed.insert(ctx.core);
        ctx.current = target;

        Ok(())
    }

    /// Switch to the domain's pre-bound idle image.
    ///
    /// Never fails for a correctly bound idle image; a failure here means
    /// the scheduler handed out an unusable binding.
    pub fn switch_to_idle_image(
        &self,
        ctx: &mut CoreContext,
        images: &mut ImageTable,
        idle: ImageId,
        hw: &mut impl CoreOps,
    ) {
        let result = self.set_kernel_image(ctx, images, idle, hw);
        debug_assert!(result.is_ok(), "idle image must be switchable");
        let _ = result;
    }

    /// Copy the live stack `[sp, stack_top)` into the target image's
    /// private backing.
    ///
    /// At this moment execution still runs on the departing image's stack
    /// frames; the clone's private stack page must receive the exact
    /// in-flight call frames. Both sides are resolved page-wise through
    /// their image's tables, since the private backings are distinct
    /// physical pages.
    fn relocate_stack(
        &self,
        core: CoreId,
        current: &KernelImage,
        next: &KernelImage,
        sp: VirtualAddress,
    ) -> Result<(), ImageError> {
        let current_root = current.root().ok_or(ImageError::MissingRoot)?;
        let next_root = next.root().ok_or(ImageError::MissingRoot)?;

        let stack_top = self.layout.stack_top(core.as_usize());
        debug_assert!(sp <= stack_top);
        debug_assert!(
            self.plan.geometry().untranslated_bits(self.plan.elf_depth())
                == FRAME_SIZE_BITS
        );

        let mut va = sp;
        while va < stack_top {
            let page_end = {
                let next_page = va.block_base(FRAME_SIZE_BITS).wrapping_add(1 << FRAME_SIZE_BITS);
                if next_page < stack_top { next_page } else { stack_top }
            };
            #[allow(clippy::cast_possible_truncation)]
            let len = (page_end - va) as usize;

            let src = self
                .abi
                .translate(current_root, va)
                .ok_or(ImageError::LookupFault)?;
            let dst = self
                .abi
                .translate(next_root, va)
                .ok_or(ImageError::LookupFault)?;

            // SAFETY: the clone's private pages are distinct from the live
            // stack's pages, and the clone is not yet executing anywhere.
            unsafe {
                self.mapper
                    .bytes_mut(dst, len)
                    .copy_from_slice(self.mapper.bytes(src, len));
            }

            va = page_end;
        }

        Ok(())
    }
}
