// Boot image linker library
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

//! The [linker][] is responsible for combining the boot class set of the
//!   managed runtime with a natively assembled bootstrap blob into a single
//!   flat image.
//!
//! Its user-facing binary is [`bootld`][bootld].
//!
//! The resulting image is two things at once:
//!
//!   1. a kernel that a [multiboot][]-compliant boot loader can load and
//!        jump into; and
//!   2. the frozen initial heap of the managed runtime.
//!
//! Linking is a single linear pass performed by an [`ImageLinker`];
//!   see the [`image`] module for the layout of the image and the steps
//!   involved.
//! Every reference to an address not yet known is made through a
//!   [`LabelTable`] and patched upon resolution.
//!
//! [linker]: https://en.wikipedia.org/wiki/Linker_(computing)
//! [multiboot]: https://www.gnu.org/software/grub/manual/multiboot/
//! [bootld]: ../../bootld

pub mod config;
pub mod header;
pub mod image;
pub mod init;
pub mod label;
pub mod list;
pub mod trace;
pub mod wellknown;

mod error;

pub use config::{ConfigError, GlueNames, InitOrderKind, LinkConfig};
pub use error::{LayoutError, LinkError, LinkResult};
pub use header::VbeMode;
pub use image::{ImageLinker, LinkedImage};
pub use init::{
    DeclarationOrder, DependencyOrder, InitOrderError, InitializerOrder,
};
pub use label::{LabelId, LabelKind, LabelTable, PatchKind, PatchSite};
pub use list::write_listing;
