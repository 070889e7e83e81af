//! # Kernel Memory Layout
//!
//! Platform constants for the kernel's virtual-address window and the
//! [`WindowLayout`] descriptor consumed by the region catalog.
//!
//! The kernel window is carved into a fixed set of sub-ranges:
//!
//! ```text
//!      +- WINDOW_START ----+ = PPTR_BASE
//!      |                   |
//!      | physical window   |   all of RAM at a fixed offset
//!      |                   |
//!      +- PPTR_TOP --------+
//!      +- ELF_BASE --------+
//!      | .text             |   per-image copy, read-only, executable
//!      +-------------------+
//!      | .text.switch      |   shared, the image-switch trampoline
//!      +-------------------+
//!      | private data      |   per-image copy (incl. the kernel stacks)
//!      +-------------------+
//!      | idle-thread state |   per-image copy
//!      +-------------------+
//!      | shared data       |   shared, the kernel's global state
//!      +- ELF_END ---------+
//!      +- DEVICE_BASE -----+
//!      |  device mappings  |
//!      +- WINDOW_END ------+ = last representable address
//! ```
//!
//! The bounds of the ELF-backed ranges come from link-time symbols on a real
//! build; [`WindowLayout::platform`] bakes in this platform's values so the
//! subsystem can be exercised hosted as well.

#![cfg_attr(not(test), no_std)]

pub mod memory;
mod window;

pub use crate::window::WindowLayout;
