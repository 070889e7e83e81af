//! # Memory Layout Constants

/// First address of the kernel window; everything below is user space.
pub const WINDOW_START: u64 = 0xFFFF_FFC0_0000_0000;

/// Last representable address; the kernel window runs to the top of the
/// address space.
pub const WINDOW_END: u64 = u64::MAX;

/// First address of the physical-memory window (within the kernel window).
/// Anything mapped at [`PHYS_WINDOW_START`] + `pa` lets the kernel access
/// physical memory via a fixed offset.
pub const PHYS_WINDOW_START: u64 = WINDOW_START;

/// End of the physical-memory window.
pub const PHYS_WINDOW_END: u64 = 0xFFFF_FFFF_8000_0000;

/// First address of the kernel device-mapping window.
pub const DEVICE_START: u64 = 0xFFFF_FFFF_C000_0000;

/// End of the device-mapping window; runs to the top of the kernel window.
pub const DEVICE_END: u64 = WINDOW_END;

/// Where the kernel image executes (VMA); matches the linker script. The
/// first 4 KiB of the 2 MiB link slot hold the discarded boot stub, so the
/// retained image begins one page in.
pub const ELF_BASE: u64 = 0xFFFF_FFFF_8400_1000;

/// End of the executable text range.
pub const TEXT_END: u64 = ELF_BASE + TEXT_SIZE;

/// End of the image-switch trampoline range.
pub const SWITCH_END: u64 = TEXT_END + SWITCH_SIZE;

/// End of the per-image private data range (read-only data, node-local
/// state and the kernel stacks).
pub const PRIVATE_END: u64 = SWITCH_END + PRIVATE_SIZE;

/// End of the idle-thread state range.
pub const IDLE_END: u64 = PRIVATE_END + IDLE_SIZE;

/// End of the retained kernel image; also the end of the shared data range.
pub const ELF_END: u64 = IDLE_END + SHARED_SIZE;

/// Bytes of kernel text.
pub const TEXT_SIZE: u64 = 512 * 1024;

/// Bytes of image-switch trampoline code.
pub const SWITCH_SIZE: u64 = 4 * 1024;

/// Bytes of per-image private data.
pub const PRIVATE_SIZE: u64 = 128 * 1024;

/// Bytes of idle-thread state.
pub const IDLE_SIZE: u64 = 16 * 1024;

/// Bytes of shared kernel data.
pub const SHARED_SIZE: u64 = 256 * 1024;

/// The size of one kernel stack; one per core, stacked downwards from the
/// top of the private range.
pub const KERNEL_STACK_SIZE: u64 = 4 * 1024;

/// Depth of the physical-window block mappings: 1 GiB blocks installed in
/// the root table.
pub const PHYS_WINDOW_DEPTH: usize = 1;

/// Depth of the device-window block mappings: 2 MiB blocks, one table below
/// the root.
pub const DEVICE_DEPTH: usize = 2;

/// Where the retained image is placed in physical memory at load time.
pub const ELF_LOAD_BASE: u64 = RAM_BASE + 0x20_0000;

/// First byte of RAM on this platform.
pub const RAM_BASE: u64 = 0x8000_0000;

const _: () = {
    assert!(ELF_BASE % 4096 == 0);
    assert!(TEXT_SIZE % 4096 == 0);
    assert!(SWITCH_SIZE % 4096 == 0);
    assert!(PRIVATE_SIZE % 4096 == 0);
    assert!(IDLE_SIZE % 4096 == 0);
    assert!(SHARED_SIZE % 4096 == 0);
    assert!(KERNEL_STACK_SIZE % 4096 == 0);
    assert!(PHYS_WINDOW_END <= ELF_BASE);
    assert!(ELF_END <= DEVICE_START);
    // The retained image must stay inside the 2 MiB block it is linked
    // into, and must not begin on the block boundary itself: intermediate
    // page tables are placed at block-aligned addresses, data pages at
    // page-aligned addresses, and the two sequences may never meet.
    assert!(ELF_BASE % 0x20_0000 != 0);
    assert!(ELF_END <= (ELF_BASE & !0x1F_FFFF) + 0x20_0000);
    // RAM window must be large-page aligned for the depth-1 mappings.
    assert!(RAM_BASE % 0x4000_0000 == 0);
};
