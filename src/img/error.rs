// Image buffer errors
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

//! Errors resulting from operations on the image buffer.

use crate::sym::SymbolId;
use std::fmt::{self, Display};

pub type ImageResult<T> = Result<T, ImageError>;

/// An error while writing to or patching an [`ImageBuf`](super::ImageBuf).
///
/// All of these errors are fatal to a link.
#[derive(Debug, PartialEq, Eq)]
pub enum ImageError {
    /// Writing `requested` more bytes would exceed the image's maximum
    ///   capacity.
    CapacityExceeded {
        len: usize,
        requested: usize,
        capacity: usize,
    },

    /// A read or patch of `width` bytes at `offset` lies beyond the
    ///   current length of the image.
    OutOfRange {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// A value does not fit within the number of bytes available to it.
    ValueRange { value: i128, width: usize },

    /// Alignment must be a non-zero power of two.
    BadAlignment(usize),

    /// An object was ended while another object opened after it is still
    ///   open.
    ///
    /// The first symbol is the object that was ended;
    ///   the second is the innermost open object.
    Interleaved(SymbolId, SymbolId),

    /// An object was ended that is not open,
    ///   either because it was already ended or because no object is
    ///   open at all.
    NotOpen(SymbolId),

    /// Too many objects are open at once.
    NestingTooDeep(SymbolId, usize),
}

impl Display for ImageError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        use ImageError::*;

        match self {
            CapacityExceeded {
                len,
                requested,
                capacity,
            } => write!(
                fmt,
                "image capacity of {capacity} bytes exceeded \
                    (length {len}, requested {requested} more)",
            ),
            OutOfRange { offset, width, len } => write!(
                fmt,
                "access of {width} byte(s) at offset {offset:#x} is beyond \
                    image length {len:#x}",
            ),
            ValueRange { value, width } => write!(
                fmt,
                "value {value} does not fit in {width} byte(s)",
            ),
            BadAlignment(align) => {
                write!(fmt, "invalid alignment {align} (must be a power of two)")
            }
            Interleaved(ended, open) => write!(
                fmt,
                "cannot end object `{ended}` while object `{open}` \
                    is still open",
            ),
            NotOpen(name) => {
                write!(fmt, "cannot end object `{name}`: object is not open")
            }
            NestingTooDeep(name, max) => write!(
                fmt,
                "cannot begin object `{name}`: \
                    more than {max} objects are open",
            ),
        }
    }
}

impl std::error::Error for ImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
