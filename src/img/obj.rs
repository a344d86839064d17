// Heap object boundaries within the image
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

//! Recording of heap objects as they are serialized into the image.
//!
//! Every object is bracketed by [`ObjectRecorder::begin`] and
//!   [`ObjectRecorder::end`].
//! Objects may nest
//!   (an object may be opened while another is open)
//!   but may not interleave:
//!     only the innermost open object may be ended.

use super::{
    object_align, ImageBuf, ImageError, ImageResult, ObjectLayout,
    OBJECT_FLAGS_DEFAULT,
};
use crate::global::{self, Addr};
use crate::sym::SymbolId;
use arrayvec::ArrayVec;
use fxhash::FxHashMap;

/// Placement of a single object within the image.
///
/// Offsets are relative to the start of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    name: SymbolId,
    header_start: usize,
    start: usize,
    end: Option<usize>,
}

impl ObjectRecord {
    /// Name of the descriptor from which this object originated.
    pub fn name(&self) -> SymbolId {
        self.name
    }

    /// Offset of the first byte of the header,
    ///   including slack.
    pub fn header_start(&self) -> usize {
        self.header_start
    }

    /// Offset of the object reference point,
    ///   immediately following the header.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Offset immediately following the (aligned) body,
    ///   or [`None`] if the object is still open.
    pub fn end(&self) -> Option<usize> {
        self.end
    }

    /// Size of the header actually written for this object.
    pub fn header_size(&self) -> usize {
        self.start - self.header_start
    }

    /// Size of the body,
    ///   if the object has been ended.
    pub fn body_size(&self) -> Option<usize> {
        self.end.map(|end| end - self.start)
    }

    /// Physical address of this object given the image base.
    pub fn address(&self, base: Addr) -> Addr {
        base + self.start as Addr
    }
}

/// Handle to an object opened with [`ObjectRecorder::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHandle(usize);

/// Tracks the placement of every object written to an [`ImageBuf`].
#[derive(Debug)]
pub struct ObjectRecorder {
    layout: ObjectLayout,
    records: Vec<ObjectRecord>,
    open: ArrayVec<usize, { global::MAX_OBJECT_NESTING }>,
    by_name: FxHashMap<SymbolId, usize>,
}

impl ObjectRecorder {
    pub fn new(layout: ObjectLayout) -> Self {
        Self {
            layout,
            records: Vec::new(),
            open: ArrayVec::new(),
            by_name: Default::default(),
        }
    }

    pub fn layout(&self) -> ObjectLayout {
        self.layout
    }

    /// Begin a new object named `name` at the cursor.
    ///
    /// The cursor is first aligned to
    ///   [`OBJECT_ALIGN`](global::OBJECT_ALIGN).
    /// The header is then written with a zero size word
    ///   (patched by [`end`](ObjectRecorder::end))
    ///   and a zero type reference word,
    ///     the offset of which is available via
    ///     [`type_slot`](ObjectRecorder::type_slot) so that the caller may
    ///     link it to the object's class.
    pub fn begin(
        &mut self,
        buf: &mut ImageBuf,
        name: SymbolId,
    ) -> ImageResult<ObjectHandle> {
        if self.open.is_full() {
            return Err(ImageError::NestingTooDeep(
                name,
                global::MAX_OBJECT_NESTING,
            ));
        }

        buf.align(global::OBJECT_ALIGN)?;
        let header_start = buf.len();

        buf.write_zeros(self.layout.slack())?;
        buf.write_word(0)?; // size
        buf.write_word(OBJECT_FLAGS_DEFAULT)?;
        buf.write_word(0)?; // type

        let start = buf.len();
        debug_assert_eq!(start, object_align(start));

        let index = self.records.len();
        self.records.push(ObjectRecord {
            name,
            header_start,
            start,
            end: None,
        });
        self.by_name.entry(name).or_insert(index);
        self.open.push(index);

        Ok(ObjectHandle(index))
    }

    /// End the object identified by `handle`,
    ///   aligning the cursor and patching the size word of its header.
    pub fn end(
        &mut self,
        buf: &mut ImageBuf,
        handle: ObjectHandle,
    ) -> ImageResult<&ObjectRecord> {
        let ObjectHandle(index) = handle;
        let name = self.records[index].name;

        match self.open.last() {
            Some(&innermost) if innermost == index => (),
            Some(&innermost) if self.records[index].end.is_none() => {
                return Err(ImageError::Interleaved(
                    name,
                    self.records[innermost].name,
                ))
            }
            _ => return Err(ImageError::NotOpen(name)),
        }

        buf.align(global::OBJECT_ALIGN)?;

        let start = self.records[index].start;
        let size = buf.len() - start;
        buf.set_word(start - self.layout.size_slot_back(), size as u64)?;

        self.open.pop();

        let record = &mut self.records[index];
        record.end = Some(buf.len());

        Ok(record)
    }

    /// Offset of the type reference word of the object identified by
    ///   `handle`.
    pub fn type_slot(&self, handle: ObjectHandle) -> usize {
        self.records[handle.0].start - self.layout.type_slot_back()
    }

    pub fn get(&self, handle: ObjectHandle) -> &ObjectRecord {
        &self.records[handle.0]
    }

    /// Look up the first object recorded under `name`.
    pub fn find(&self, name: SymbolId) -> Option<&ObjectRecord> {
        self.by_name.get(&name).map(|&index| &self.records[index])
    }

    /// Records in the order in which objects were begun.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of objects that have been begun but not yet ended.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}
