// JNode boot image linker (bootld)
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

//! Ahead-of-time linker producing bootable images of the JNode managed
//!   runtime.
//!
//! The crate is organized leaves-first:
//!
//!   - [`sym`] interns every name seen during a link;
//!   - [`img`] holds the image buffer and the placement of heap objects
//!       within it;
//!   - [`boot`] models the boot class set and serializes its
//!       descriptors;
//!   - [`obj`] loads the native bootstrap blob;
//!   - [`arch`] emits the machine code of the boot glue; and
//!   - [`ld`] ties everything together into a [`LinkedImage`](ld::LinkedImage).

// We build docs for private items.
#![allow(rustdoc::private_intra_doc_links)]

pub mod global;

#[macro_use]
extern crate static_assertions;

pub mod arch;
pub mod boot;
pub mod fs;
pub mod img;
pub mod ld;
pub mod obj;
pub mod sym;
