use crate::memory;
use kernel_addresses::VirtualAddress;

/// Bounds of every sub-range the kernel window is carved into.
///
/// On a real build the ELF-backed bounds come from link-time symbols; the
/// rest are platform constants. The region catalog consumes one of these and
/// never looks at raw constants itself, which keeps alternative layouts (and
/// hosted tests) a constructor away.
#[derive(Copy, Clone, Debug)]
pub struct WindowLayout {
    /// First address of the kernel window.
    pub window_start: VirtualAddress,
    /// Last address of the kernel window (the window is closed at the top of
    /// the address space; span arithmetic accounts for the final byte).
    pub window_end: VirtualAddress,
    /// Physical-memory window bounds.
    pub phys_window_start: VirtualAddress,
    pub phys_window_end: VirtualAddress,
    /// Device-mapping window bounds.
    pub device_start: VirtualAddress,
    pub device_end: VirtualAddress,
    /// Start of the retained kernel image (and of its text range).
    pub elf_start: VirtualAddress,
    /// End of text, start of the switch trampoline.
    pub text_end: VirtualAddress,
    /// End of the switch trampoline, start of private data.
    pub switch_end: VirtualAddress,
    /// End of private data, start of the idle-thread state. This is also the
    /// base (highest address) of core 0's kernel stack.
    pub private_end: VirtualAddress,
    /// End of the idle-thread state, start of shared data.
    pub idle_end: VirtualAddress,
    /// End of shared data and of the retained image.
    pub elf_end: VirtualAddress,
}

impl WindowLayout {
    /// The layout baked into this platform's linker script and constants.
    #[must_use]
    pub const fn platform() -> Self {
        Self {
            window_start: VirtualAddress::new(memory::WINDOW_START),
            window_end: VirtualAddress::new(memory::WINDOW_END),
            phys_window_start: VirtualAddress::new(memory::PHYS_WINDOW_START),
            phys_window_end: VirtualAddress::new(memory::PHYS_WINDOW_END),
            device_start: VirtualAddress::new(memory::DEVICE_START),
            device_end: VirtualAddress::new(memory::DEVICE_END),
            elf_start: VirtualAddress::new(memory::ELF_BASE),
            text_end: VirtualAddress::new(memory::TEXT_END),
            switch_end: VirtualAddress::new(memory::SWITCH_END),
            private_end: VirtualAddress::new(memory::PRIVATE_END),
            idle_end: VirtualAddress::new(memory::IDLE_END),
            elf_end: VirtualAddress::new(memory::ELF_END),
        }
    }

    /// Base of the kernel stack for `core`.
    ///
    /// Stacks sit at the top of the private range and grow downwards, one
    /// per core. The returned address is one past the highest stack byte.
    #[inline]
    #[must_use]
    pub const fn stack_top(&self, core: usize) -> VirtualAddress {
        VirtualAddress::new(
            self.private_end.as_u64() - core as u64 * memory::KERNEL_STACK_SIZE,
        )
    }
}
