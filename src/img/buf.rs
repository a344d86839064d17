// Growable boot image buffer
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

//! Append-only byte buffer addressed relative to a load base.

use super::{ImageError, ImageResult, Word};
use crate::global::Addr;

/// The bytes of a boot image.
///
/// Offsets are relative to the start of the image;
///   the physical address of offset `n` is `base + n`
///   (see [`ImageBuf::address_of`]).
/// The cursor is always the current length:
///   every `write*` method appends at the end of the buffer and returns
///   the offset at which the data were placed.
///
/// The buffer never shrinks.
/// Growth beyond `capacity` is an error rather than a reallocation,
///   since an image that large would not fit in the target's memory
///   anyway.
#[derive(Debug)]
pub struct ImageBuf {
    base: Addr,
    word: Word,
    data: Vec<u8>,
    capacity: usize,
}

impl ImageBuf {
    /// Create an empty image loaded at `base`.
    ///
    /// `initial` bytes are reserved up front
    ///   (never more than `capacity`).
    pub fn new(base: Addr, word: Word, initial: usize, capacity: usize) -> Self {
        Self {
            base,
            word,
            data: Vec::with_capacity(initial.min(capacity)),
            capacity,
        }
    }

    #[inline]
    pub fn base(&self) -> Addr {
        self.base
    }

    #[inline]
    pub fn word(&self) -> Word {
        self.word
    }

    /// Current length of the image,
    ///   which is also the offset at which the next write will occur.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Physical address of the byte at `offset`.
    #[inline]
    pub fn address_of(&self, offset: usize) -> Addr {
        self.base + offset as Addr
    }

    /// Physical address of the cursor.
    #[inline]
    pub fn cursor_addr(&self) -> Addr {
        self.address_of(self.len())
    }

    #[inline]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn reserve(&mut self, requested: usize) -> ImageResult<usize> {
        let len = self.len();

        match len.checked_add(requested) {
            Some(end) if end <= self.capacity => Ok(len),
            _ => Err(ImageError::CapacityExceeded {
                len,
                requested,
                capacity: self.capacity,
            }),
        }
    }

    /// Append `bytes`,
    ///   returning the offset at which they were written.
    pub fn write(&mut self, bytes: &[u8]) -> ImageResult<usize> {
        let offset = self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);

        Ok(offset)
    }

    /// Append `n` zero bytes.
    pub fn write_zeros(&mut self, n: usize) -> ImageResult<usize> {
        let offset = self.reserve(n)?;
        self.data.resize(offset + n, 0);

        Ok(offset)
    }

    pub fn write8(&mut self, value: u8) -> ImageResult<usize> {
        self.write(&[value])
    }

    pub fn write16(&mut self, value: u16) -> ImageResult<usize> {
        self.write(&value.to_le_bytes())
    }

    pub fn write32(&mut self, value: u32) -> ImageResult<usize> {
        self.write(&value.to_le_bytes())
    }

    pub fn write64(&mut self, value: u64) -> ImageResult<usize> {
        self.write(&value.to_le_bytes())
    }

    /// Append a single target word.
    ///
    /// For 32-bit targets,
    ///   `value` must fit in 32 bits.
    pub fn write_word(&mut self, value: u64) -> ImageResult<usize> {
        match self.word {
            Word::W32 => self.write32(narrow32(value)?),
            Word::W64 => self.write64(value),
        }
    }

    /// Pad with zero bytes until the cursor is a multiple of `align`,
    ///   returning the number of bytes written.
    pub fn align(&mut self, align: usize) -> ImageResult<usize> {
        if !align.is_power_of_two() {
            return Err(ImageError::BadAlignment(align));
        }

        let pad = self.len().wrapping_neg() & (align - 1);
        self.write_zeros(pad)?;

        Ok(pad)
    }

    fn range(&self, offset: usize, width: usize) -> ImageResult<usize> {
        match offset.checked_add(width) {
            Some(end) if end <= self.len() => Ok(end),
            _ => Err(ImageError::OutOfRange {
                offset,
                width,
                len: self.len(),
            }),
        }
    }

    /// Overwrite previously written bytes beginning at `offset`.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) -> ImageResult<()> {
        let end = self.range(offset, bytes.len())?;
        self.data[offset..end].copy_from_slice(bytes);

        Ok(())
    }

    /// Read previously written bytes.
    pub fn get(&self, offset: usize, width: usize) -> ImageResult<&[u8]> {
        let end = self.range(offset, width)?;

        Ok(&self.data[offset..end])
    }

    pub fn get32(&self, offset: usize) -> ImageResult<u32> {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(self.get(offset, 4)?);

        Ok(u32::from_le_bytes(bytes))
    }

    pub fn get64(&self, offset: usize) -> ImageResult<u64> {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(self.get(offset, 8)?);

        Ok(u64::from_le_bytes(bytes))
    }

    pub fn set32(&mut self, offset: usize, value: u32) -> ImageResult<()> {
        self.patch(offset, &value.to_le_bytes())
    }

    pub fn set64(&mut self, offset: usize, value: u64) -> ImageResult<()> {
        self.patch(offset, &value.to_le_bytes())
    }

    /// Overwrite a single target word at `offset`.
    pub fn set_word(&mut self, offset: usize, value: u64) -> ImageResult<()> {
        match self.word {
            Word::W32 => self.set32(offset, narrow32(value)?),
            Word::W64 => self.set64(offset, value),
        }
    }
}

fn narrow32(value: u64) -> ImageResult<u32> {
    u32::try_from(value).map_err(|_| ImageError::ValueRange {
        value: value as i128,
        width: 4,
    })
}
