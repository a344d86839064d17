// Object body encoding
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

//! Serialization of descriptor bodies into the image.
//!
//! The header of each object is the business of the
//!   [object recorder](crate::img::ObjectRecorder);
//!     an [`ObjectEncoder`] writes only the body,
//!       beginning at the cursor,
//!       between the opening and closing of the object.

use super::{Descriptor, FieldSlot, FieldType, FieldValue};
use crate::{
    img::ImageBuf,
    ld::{LabelTable, LayoutError, LinkResult, PatchSite},
};

/// Writes the body of a descriptor's object.
pub trait ObjectEncoder {
    /// Write the body of `desc` at the cursor of `buf`.
    ///
    /// References to other descriptors are recorded in `labels`.
    fn encode(
        &self,
        buf: &mut ImageBuf,
        labels: &mut LabelTable,
        desc: &Descriptor,
    ) -> LinkResult<()>;
}

/// Encodes each field at the offset given by the descriptor's layout,
///   zero-filling gaps and any tail up to the body size.
///
/// Fields may be declared in any order but must not overlap and must
///   lie entirely within the body.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutEncoder;

impl LayoutEncoder {
    fn write_field(
        buf: &mut ImageBuf,
        labels: &mut LabelTable,
        desc: &Descriptor,
        slot: &FieldSlot,
    ) -> LinkResult<()> {
        let word = buf.word();
        let width = slot.ty.width(word);

        let mismatch = || LayoutError::ValueMismatch {
            descriptor: desc.name(),
            field: slot.name,
        };

        match (slot.ty, desc.value(slot.name)) {
            (_, FieldValue::Null) => {
                buf.write_zeros(width)?;
            }

            (FieldType::Ref, FieldValue::Ref(target)) => {
                let site = buf.write_word(0)?;
                let id = labels.declare(*target);

                labels.reference(buf, id, PatchSite::word(word, site))?;
            }

            (FieldType::Bytes(len), FieldValue::Bytes(bytes)) => {
                if bytes.len() > len {
                    return Err(mismatch().into());
                }

                buf.write(bytes)?;
                buf.write_zeros(len - bytes.len())?;
            }

            (FieldType::U8, FieldValue::Int(value)) => {
                buf.write8(u8::try_from(*value).map_err(|_| mismatch())?)?;
            }

            (FieldType::U16, FieldValue::Int(value)) => {
                buf.write16(u16::try_from(*value).map_err(|_| mismatch())?)?;
            }

            (FieldType::U32, FieldValue::Int(value)) => {
                buf.write32(u32::try_from(*value).map_err(|_| mismatch())?)?;
            }

            (FieldType::U64, FieldValue::Int(value)) => {
                buf.write64(*value)?;
            }

            (FieldType::Word, FieldValue::Int(value)) if word.fits(*value) => {
                buf.write_word(*value)?;
            }

            _ => return Err(mismatch().into()),
        }

        Ok(())
    }
}

impl ObjectEncoder for LayoutEncoder {
    fn encode(
        &self,
        buf: &mut ImageBuf,
        labels: &mut LabelTable,
        desc: &Descriptor,
    ) -> LinkResult<()> {
        let word = buf.word();
        let layout = desc.layout();
        let size = layout.size(word);
        let body = buf.len();

        let mut fields: Vec<&FieldSlot> = layout.fields().iter().collect();
        fields.sort_by_key(|slot| slot.offset);

        let mut pos = 0;
        let mut prev = None;

        for slot in fields {
            let width = slot.ty.width(word);
            let end = slot
                .offset
                .checked_add(width)
                .filter(|end| *end <= size)
                .ok_or_else(|| LayoutError::FieldOverflow {
                    descriptor: desc.name(),
                    field: slot.name,
                    end: slot.offset.saturating_add(width),
                    size,
                })?;

            match prev {
                Some(prev) if slot.offset < pos => {
                    return Err(LayoutError::FieldOverlap {
                        descriptor: desc.name(),
                        field: slot.name,
                        prev,
                    }
                    .into())
                }
                _ => (),
            }

            buf.write_zeros(slot.offset - pos)?;
            Self::write_field(buf, labels, desc, slot)?;
            debug_assert_eq!(body + end, buf.len());

            pos = end;
            prev = Some(slot.name);
        }

        buf.write_zeros(size - pos)?;

        Ok(())
    }
}
