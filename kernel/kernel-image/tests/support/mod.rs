//! Shared fixtures: an in-memory physical arena, a bump block source and a
//! recording mock core.

#![allow(dead_code)]

use kernel_addresses::{PhysicalAddress, VirtualAddress};
use kernel_image::{Asid, CoreOps};
use kernel_vmem::{BlockSource, PhysMapper};

/// First physical address the arena models.
pub const ARENA_BASE: u64 = 0x8000_0000;

/// Where the test block source starts handing out frames; everything below
/// is reserved for the "loaded kernel" backing.
pub const ALLOC_BASE: u64 = 0x8040_0000;

/// One 4 KiB-aligned frame of simulated RAM.
#[repr(align(4096))]
struct RawFrame([u8; 4096]);

/// A tiny in-memory "physical memory": frames are boxed so their addresses
/// stay put, physical addresses are byte offsets from [`ARENA_BASE`].
pub struct Arena {
    frames: Vec<Box<RawFrame>>,
}

impl Arena {
    pub fn new(frames: usize) -> Self {
        let mut v = Vec::with_capacity(frames);
        for _ in 0..frames {
            v.push(Box::new(RawFrame([0; 4096])));
        }
        Self { frames: v }
    }

    fn frame_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = pa.as_u64() - ARENA_BASE;
        let idx = (offset >> 12) as usize;
        let within = (offset & 0xFFF) as usize;
        assert!(idx < self.frames.len(), "arena access out of range: {pa}");
        let base = core::ptr::from_ref(self.frames[idx].as_ref()).cast_mut();
        unsafe { base.cast::<u8>().add(within) }
    }

    /// Read `len` bytes at `pa`.
    pub fn read(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        unsafe { self.bytes(pa, len) }.to_vec()
    }

    /// Write `bytes` at `pa`.
    pub fn write(&self, pa: PhysicalAddress, bytes: &[u8]) {
        unsafe { self.bytes_mut(pa, bytes.len()) }.copy_from_slice(bytes);
    }
}

impl PhysMapper for Arena {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.frame_ptr(pa).cast::<T>() }
    }
}

/// Hands out frames from [`ALLOC_BASE`] upwards, aligned to the requested
/// size.
pub struct BumpAlloc {
    next: u64,
    end: u64,
}

impl BumpAlloc {
    pub fn new(start: u64, end: u64) -> Self {
        Self { next: start, end }
    }

    /// A source covering the arena's allocatable tail, given the arena's
    /// frame count.
    pub fn over_arena(frames: usize) -> Self {
        Self::new(ALLOC_BASE, ARENA_BASE + ((frames as u64) << 12))
    }
}

impl BlockSource for BumpAlloc {
    fn alloc_block(&mut self, size_bits: u32) -> Option<PhysicalAddress> {
        let size = 1u64 << size_bits;
        let base = self.next.next_multiple_of(size);
        if base + size > self.end {
            return None;
        }
        self.next = base + size;
        Some(PhysicalAddress::new(base))
    }
}

/// A core whose stack pointer and hardware effects are plain fields.
pub struct MockCore {
    pub sp: VirtualAddress,
    pub installed_roots: Vec<(PhysicalAddress, Asid)>,
    pub barriers: core::cell::Cell<usize>,
}

impl MockCore {
    pub fn new(sp: VirtualAddress) -> Self {
        Self {
            sp,
            installed_roots: Vec::new(),
            barriers: core::cell::Cell::new(0),
        }
    }
}

impl CoreOps for MockCore {
    fn stack_pointer(&self) -> VirtualAddress {
        self.sp
    }

    fn set_stack_pointer(&mut self, sp: VirtualAddress) {
        self.sp = sp;
    }

    fn install_root(&mut self, root: PhysicalAddress, asid: Asid) {
        self.installed_roots.push((root, asid));
    }

    fn barrier(&self) {
        self.barriers.set(self.barriers.get() + 1);
    }
}
