// Global constants across the entire crate
//
//  Copyright (C) 2014-2022 Ryan Specialty Group, LLC.
//
//  This file is part of bootld.
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! System-wide static configuration.
//!
//! This module provides a system-wide configuration.
//! Subsystems should reference these values rather than defining their own
//!   and risk incompatibilities or maintenance issues as requirements
//!   change.
//!
//! By convention,
//!   import this entire module rather than individual members and reference
//!   them as `global::foo` to emphasize their nature and risk.
//!
//! Values that may vary between runs are found in
//!   [`LinkConfig`](crate::ld::LinkConfig),
//!     which uses these constants as its defaults.

use std::num;

/// A size capable of representing every interned string in a link.
pub type ProgSymSize = u32;

/// A non-zero equivalent of [`ProgSymSize`];
pub type NonZeroProgSymSize = num::NonZeroU32;

/// An address within the target's physical address space.
///
/// This is always 64 bits wide,
///   even for 32-bit targets;
///     narrowing happens only when a value is written into the image.
pub type Addr = u64;

/// Initial capacity of the global interner.
///
/// Boot class sets are on the order of tens of thousands of descriptors,
///   each contributing a handful of names.
pub const INIT_GLOBAL_INTERNER_CAPACITY: usize = 65536;

/// Physical address at which the boot loader places the image.
///
/// This must agree with the load address in the multiboot header that the
///   native blob provides.
pub const LOAD_ADDR: Addr = 0x0010_0000;

/// Number of bytes reserved for the image buffer before any growth.
pub const INITIAL_IMAGE_SIZE: usize = 64 * 1024 * 1024;

/// Upper bound on the size of an image.
///
/// Exceeding this is fatal rather than reallocating without limit.
pub const MAX_IMAGE_SIZE: usize = 512 * 1024 * 1024;

/// Page size of the target;
///   the native blob and the image end are aligned to this boundary.
pub const PAGE_SIZE: usize = 4096;

/// Window at the start of the image within which the multiboot header
///   must be found.
pub const HEADER_SCAN_LEN: usize = 4096;

/// Number of words in an object header following its size word:
///   the flags word and the type reference.
pub const HEADER_SLOTS: usize = 2;

/// Alignment of every object in the image, in bytes.
pub const OBJECT_ALIGN: usize = 8;

/// Size of the initial thread's stack, in slots.
pub const DEFAULT_STACK_SLOTS: usize = 16 * 1024;

/// Number of slots at the low end of a stack reserved as the overflow
///   guard.
pub const STACK_OVERFLOW_LIMIT_SLOTS: usize = 256;

/// Default size of the boot heap object body, in bytes.
pub const DEFAULT_BOOT_HEAP_SIZE: usize = 64 * 1024;

/// Default size of the default heap object body, in bytes.
pub const DEFAULT_HEAP_SIZE: usize = 512 * 1024;

/// Maximum depth of simultaneously open objects in the image.
pub const MAX_OBJECT_NESTING: usize = 8;
