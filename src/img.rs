// Boot image buffer and object layout
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

//! The raw bytes of a boot image and the heap objects laid out within
//!   them.
//!
//! A boot image is a flat run of bytes that a multiboot loader places at a
//!   fixed physical address.
//! The [`ImageBuf`] holds those bytes;
//!   it only ever grows,
//!     and bytes already written may be patched once their final value is
//!     known
//!       (e.g. once a [label](crate::ld::label) is resolved).
//!
//! Most of the image is a sequence of heap objects,
//!   each preceded by a fixed-size header.
//! [`ObjectLayout`] describes the geometry of that header for a given
//!   [`Word`] size and [`ObjectRecorder`] tracks where each object begins
//!   and ends.
//!
//! ```text
//!   header_start                start                         end
//!   |                           |                             |
//!   v                           v                             v
//!   [slack..][size][flags][type][ instance data ....... ][pad]
//!             \__ patched by ObjectRecorder::end
//! ```
//!
//! The _start_ of an object is its reference address;
//!   everything that points to an object points just past its header.

mod buf;
mod error;
mod layout;
mod obj;

pub use buf::ImageBuf;
pub use error::{ImageError, ImageResult};
pub use layout::{object_align, ObjectLayout, OBJECT_FLAGS_DEFAULT};
pub use obj::{ObjectHandle, ObjectRecord, ObjectRecorder};

/// Size of a machine word (an address-sized slot) on the target.
///
/// All multi-byte values are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    W32,
    W64,
}

impl Word {
    /// Number of bytes in a single word.
    pub const fn bytes(self) -> usize {
        match self {
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    /// Number of bits in a single word.
    pub const fn bits(self) -> u32 {
        match self {
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// Whether `value` can be represented in a single word.
    pub fn fits(self, value: u64) -> bool {
        match self {
            Self::W32 => value <= u32::MAX as u64,
            Self::W64 => true,
        }
    }
}

impl std::fmt::Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}
