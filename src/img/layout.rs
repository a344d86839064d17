// Heap object header geometry
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

//! Geometry of heap object headers.
//!
//! An object header is [`HEADER_SLOTS`](global::HEADER_SLOTS) words
//!   (flags and type reference) preceded by a size word,
//!     preceded in turn by enough zero _slack_ words that the object body
//!     begins on an [`OBJECT_ALIGN`](global::OBJECT_ALIGN) boundary.

use super::Word;
use crate::global;

/// Initial value of the flags word of every object placed in the image
///   (the collector's default color).
pub const OBJECT_FLAGS_DEFAULT: u64 = 0;

/// Round `value` up to the next multiple of
///   [`OBJECT_ALIGN`](global::OBJECT_ALIGN).
pub const fn object_align(value: usize) -> usize {
    (value + (global::OBJECT_ALIGN - 1)) & !(global::OBJECT_ALIGN - 1)
}

const_assert!(global::OBJECT_ALIGN.is_power_of_two());
const_assert_eq!(object_align(12), 16);
const_assert_eq!(object_align(24), 24);

/// Object header geometry for a given word size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLayout {
    word: Word,
}

impl ObjectLayout {
    pub const fn new(word: Word) -> Self {
        Self { word }
    }

    #[inline]
    pub const fn word(&self) -> Word {
        self.word
    }

    /// Size in bytes of the size word and header slots,
    ///   excluding slack.
    pub const fn header_words_size(&self) -> usize {
        (global::HEADER_SLOTS + 1) * self.word.bytes()
    }

    /// Number of zero slack bytes that must precede the size word so that
    ///   the body of an object beginning at an aligned offset is itself
    ///   aligned.
    pub const fn slack(&self) -> usize {
        object_align(self.header_words_size()) - self.header_words_size()
    }

    /// Total size of a header including slack.
    ///
    /// This is the distance from an aligned cursor to the start of the
    ///   object that follows.
    pub const fn header_size(&self) -> usize {
        object_align(self.header_words_size())
    }

    /// Distance of the size word from the start of the object.
    pub const fn size_slot_back(&self) -> usize {
        self.header_words_size()
    }

    /// Distance of the type reference word from the start of the object.
    pub const fn type_slot_back(&self) -> usize {
        self.word.bytes()
    }
}
