use crate::{PhysicalAddress, mask_bits};
use core::fmt;

/// Number of address bits covered by one physical frame.
pub const FRAME_SIZE_BITS: u32 = 12;

/// Size of one physical frame, 4096 bytes.
pub const FRAME_SIZE: u64 = 1 << FRAME_SIZE_BITS;

/// A 4 KiB-aligned physical frame.
///
/// Page-table objects and duplicated data pages are always whole frames;
/// carrying the alignment in the type keeps the entry-encoding code free of
/// ad-hoc assertions.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Frame(PhysicalAddress);

impl Frame {
    /// Wrap a frame-aligned physical address.
    ///
    /// ### Debug assertions
    /// - Asserts 4 KiB alignment in debug builds.
    #[inline]
    #[must_use]
    pub const fn from_addr(pa: PhysicalAddress) -> Self {
        debug_assert!((pa.as_u64() & mask_bits(FRAME_SIZE_BITS)) == 0);
        Self(pa)
    }

    /// The frame containing `pa` (rounds down).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self(PhysicalAddress::new(
            pa.as_u64() & !mask_bits(FRAME_SIZE_BITS),
        ))
    }

    /// First byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(0x{:016X})", self.0.as_u64())
    }
}

impl From<Frame> for PhysicalAddress {
    #[inline]
    fn from(frame: Frame) -> Self {
        frame.base()
    }
}
