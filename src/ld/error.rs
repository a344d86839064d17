// Boot image link errors
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

//! Errors resulting from linking a boot image.

use super::{config::ConfigError, init::InitOrderError};
use crate::{
    global::Addr, img::ImageError, obj::BlobError, sym::SymbolId,
};
use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

pub type LinkResult<T> = Result<T, LinkError>;

/// A fatal error while linking a boot image.
///
/// There is no recovery from any of these errors;
///   the link is abandoned and no output is written.
#[derive(Debug)]
pub enum LinkError {
    /// The link configuration is inconsistent.
    Config(ConfigError),

    /// An object layout does not agree with what the linker or the
    ///   runtime expects.
    Layout(LayoutError),

    /// Labels remained unresolved after the image was fully assembled.
    ///
    /// Every unresolved label is listed,
    ///   in the order in which each was first declared.
    Unresolved(Vec<SymbolId>),

    /// A label was resolved more than once.
    DuplicateLabel(SymbolId),

    /// The native blob could not be loaded.
    BlobLoad(BlobError),

    /// No multiboot header magic was found within the first `scanned`
    ///   bytes of the image.
    HeaderNotFound { scanned: usize },

    /// The load address in the multiboot header does not match the base
    ///   address of the image.
    AddressMismatch { found: Addr, expected: Addr },

    /// An operation on the image buffer failed.
    Image(ImageError),

    /// Static initializers could not be ordered.
    InitOrder(InitOrderError),

    /// Reading an input or writing the output failed.
    Io(io::Error),
}

impl Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use LinkError::*;

        match self {
            Config(e) => write!(f, "invalid link configuration: {e}"),
            Layout(e) => Display::fmt(e, f),
            Unresolved(names) => {
                write!(f, "there are {} unresolved label(s): ", names.len())?;

                let mut sep = "";
                for name in names {
                    write!(f, "{sep}`{name}`")?;
                    sep = ", ";
                }

                Ok(())
            }
            DuplicateLabel(name) => {
                write!(f, "label `{name}` resolved more than once")
            }
            BlobLoad(e) => write!(f, "failed to load native blob: {e}"),
            HeaderNotFound { scanned } => write!(
                f,
                "multiboot header not found in the first {scanned} bytes \
                    of the image"
            ),
            AddressMismatch { found, expected } => write!(
                f,
                "non-matching load address, found {found:#010x}, \
                    expected {expected:#010x}"
            ),
            Image(e) => Display::fmt(e, f),
            InitOrder(e) => Display::fmt(e, f),
            Io(e) => Display::fmt(e, f),
        }
    }
}

impl Error for LinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use LinkError::*;

        match self {
            Config(e) => Some(e),
            Layout(e) => Some(e),
            BlobLoad(e) => Some(e),
            Image(e) => Some(e),
            InitOrder(e) => Some(e),
            Io(e) => Some(e),
            Unresolved(_)
            | DuplicateLabel(_)
            | HeaderNotFound { .. }
            | AddressMismatch { .. } => None,
        }
    }
}

impl From<ConfigError> for LinkError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<LayoutError> for LinkError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

impl From<BlobError> for LinkError {
    fn from(e: BlobError) -> Self {
        Self::BlobLoad(e)
    }
}

impl From<ImageError> for LinkError {
    fn from(e: ImageError) -> Self {
        Self::Image(e)
    }
}

impl From<InitOrderError> for LinkError {
    fn from(e: InitOrderError) -> Self {
        Self::InitOrder(e)
    }
}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// An object does not have the shape that the linker requires of it.
#[derive(Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// The header of the first object in the image does not end at the
    ///   entry offset of the target,
    ///     and so the boot loader would jump into the middle of a header.
    EntryOffset { computed: usize, expected: usize },

    /// A descriptor that the linker must write into lacks a field.
    MissingField { descriptor: SymbolId, field: SymbolId },

    /// A field extends beyond the size of its object body.
    FieldOverflow {
        descriptor: SymbolId,
        field: SymbolId,
        end: usize,
        size: usize,
    },

    /// A field begins before the previous field ends.
    FieldOverlap {
        descriptor: SymbolId,
        field: SymbolId,
        prev: SymbolId,
    },

    /// A field value cannot be encoded as the field's declared type.
    ValueMismatch { descriptor: SymbolId, field: SymbolId },
}

impl Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use LayoutError::*;

        match self {
            EntryOffset { computed, expected } => write!(
                f,
                "first object header size {computed} does not match \
                    the target entry offset {expected}"
            ),
            MissingField { descriptor, field } => write!(
                f,
                "descriptor `{descriptor}` has no field `{field}`"
            ),
            FieldOverflow {
                descriptor,
                field,
                end,
                size,
            } => write!(
                f,
                "field `{field}` of `{descriptor}` ends at {end}, \
                    beyond its object size {size}"
            ),
            FieldOverlap {
                descriptor,
                field,
                prev,
            } => write!(
                f,
                "field `{field}` of `{descriptor}` overlaps field `{prev}`"
            ),
            ValueMismatch { descriptor, field } => write!(
                f,
                "value of field `{field}` of `{descriptor}` does not \
                    match its type"
            ),
        }
    }
}

impl Error for LayoutError {}
