// Multiboot header patching
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

//! Location and patching of the multiboot header.
//!
//! The native blob embeds a multiboot header,
//!   which a compliant boot loader locates by scanning for its magic
//!   within the first [`HEADER_SCAN_LEN`](global::HEADER_SCAN_LEN) bytes
//!   of the image.
//! The blob cannot know the final size of the image,
//!   so the load end and bss end fields are patched once the image is
//!   complete,
//!     as is the requested video mode.
//!
//! Offsets are relative to the magic:
//!
//! ```text
//!   +0   magic         +20  load_end_addr   +32  mode_type
//!   +4   flags         +24  bss_end_addr    +36  width
//!   +8   checksum      +28  entry_addr      +40  height
//!   +12  header_addr                        +44  depth
//!   +16  load_addr
//! ```

use super::{LinkError, LinkResult};
use crate::{
    global,
    img::{ImageBuf, ImageError},
};
use memchr::memmem;
use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// Multiboot header magic.
pub const MULTIBOOT_MAGIC: u32 = 0x1BAD_B002;

pub const LOAD_ADDR: usize = 16;
pub const LOAD_END_ADDR: usize = 20;
pub const BSS_END_ADDR: usize = 24;
pub const MODE_TYPE: usize = 32;
pub const WIDTH: usize = 36;
pub const HEIGHT: usize = 40;
pub const DEPTH: usize = 44;

/// Linear graphics mode requested of the boot loader.
const MODE_TYPE_LINEAR: u32 = 0;

/// Video mode requested of the boot loader.
///
/// All-zero means no preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VbeMode {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl FromStr for VbeMode {
    type Err = VbeModeError;

    /// Parse a mode of the form `WxHxD`
    ///   (e.g. `1024x768x32`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('x').map(str::parse::<u32>);

        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(width)), Some(Ok(height)), Some(Ok(depth)), None) => {
                Ok(Self {
                    width,
                    height,
                    depth,
                })
            }
            _ => Err(VbeModeError(s.into())),
        }
    }
}

impl Display for VbeMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}

/// A video mode string could not be parsed.
#[derive(Debug, PartialEq, Eq)]
pub struct VbeModeError(String);

impl Display for VbeModeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid video mode `{}`; expected WxHxD", self.0)
    }
}

impl std::error::Error for VbeModeError {}

/// Offset of the multiboot header within `buf`.
///
/// The magic must be 4-byte aligned and lie entirely within the first
///   [`HEADER_SCAN_LEN`](global::HEADER_SCAN_LEN) bytes.
pub fn find_header(buf: &ImageBuf) -> LinkResult<usize> {
    let contents = buf.contents();
    let scanned = contents.len().min(global::HEADER_SCAN_LEN);
    let magic = MULTIBOOT_MAGIC.to_le_bytes();

    memmem::find_iter(&contents[..scanned], &magic)
        .find(|offset| offset % 4 == 0)
        .ok_or(LinkError::HeaderNotFound { scanned })
}

/// Verify the multiboot header against the image base and patch its
///   load end,
///   bss end,
///   and video mode fields.
///
/// Returns the offset of the header.
pub fn patch_header(buf: &mut ImageBuf, vbe: VbeMode) -> LinkResult<usize> {
    let mb_hdr = find_header(buf)?;

    let found = buf.get32(mb_hdr + LOAD_ADDR)? as u64;
    let expected = buf.base();

    if found != expected {
        return Err(LinkError::AddressMismatch { found, expected });
    }

    let end = buf.address_of(buf.len());
    let end32 = u32::try_from(end).map_err(|_| ImageError::ValueRange {
        value: end as i128,
        width: 4,
    })?;

    buf.set32(mb_hdr + LOAD_END_ADDR, end32)?;
    buf.set32(mb_hdr + BSS_END_ADDR, end32)?;

    buf.set32(mb_hdr + MODE_TYPE, MODE_TYPE_LINEAR)?;
    buf.set32(mb_hdr + WIDTH, vbe.width)?;
    buf.set32(mb_hdr + HEIGHT, vbe.height)?;
    buf.set32(mb_hdr + DEPTH, vbe.depth)?;

    Ok(mb_hdr)
}
