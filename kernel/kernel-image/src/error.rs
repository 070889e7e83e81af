use crate::image::Asid;

/// Boot-time configuration failures. Any of these aborts initialisation;
/// there is no recovery path.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Mapping depths must satisfy
    /// `phys_window ≤ device ≤ last table level`.
    #[error("mapping depths are not ordered")]
    DepthOrder,

    /// The last-level count of duplicate pages disagrees with the
    /// page-granule re-derivation over the copied regions.
    #[error("copied-region page count mismatch")]
    CopiedCountMismatch,
}

/// Failures of image operations.
///
/// The sequencing variants are unreachable from correctly ordered boot code
/// but are checked unconditionally; `UnknownAsid` is the one genuinely
/// data-dependent failure and is surfaced to the caller's caller. A
/// `LookupFault` while scanning the device window during cloning is absorbed
/// there as the end-of-window terminator and never escapes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ImageError {
    /// The image already has every required memory mapped.
    #[error("image is already fully mapped")]
    FullyMapped,

    /// The operation needs a fully mapped image.
    #[error("image is not fully mapped")]
    NotFullyMapped,

    /// The image already carries mappings it should not have yet.
    #[error("image is already populated")]
    AlreadyPopulated,

    /// The clone destination is already runnable or populated.
    #[error("destination image was already cloned")]
    AlreadyCloned,

    /// The clone source is not runnable or was never populated.
    #[error("source image cannot be cloned from")]
    SourceNotCloneable,

    /// The image has no root table yet.
    #[error("image has no root table")]
    MissingRoot,

    /// A page-table walk did not end on the expected slot.
    #[error("page-table walk did not reach the expected slot")]
    LookupFault,

    /// The image may not be executed under.
    #[error("image is not runnable")]
    NotRunnable,

    /// The block allocator ran dry.
    #[error("out of raw memory")]
    OutOfMemory,

    /// No address space is bound to the ASID.
    #[error("no address space is bound to ASID {0}")]
    UnknownAsid(Asid),
}
