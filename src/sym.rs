// String internment system
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

//! String internment system.
//!
//! Every name the linker handles is interned exactly once:
//!   label names,
//!   descriptor names,
//!   layout field names,
//!   and the names of symbols exported and imported by the native blob.
//! Interned strings are represented by a [`SymbolId`],
//!   which is a [`Copy`] integer that compares equal for equal strings and
//!   can be used as a dense index into tables such as the
//!   [label arena](crate::ld::LabelTable).
//!
//! Most code should use the global interner:
//!
//! ```
//! use bootld::sym::{GlobalSymbolIntern, GlobalSymbolResolve, SymbolId};
//!
//! let a: SymbolId = "vm_invoke".intern();
//! let b: SymbolId = "vm_invoke".intern();
//! let c: SymbolId = "bootHeapStart".intern();
//!
//! assert_eq!(a, b);
//! assert_ne!(a, c);
//! assert_eq!("vm_invoke", a.lookup_str());
//! ```
//!
//! The global interner is thread-local;
//!   the linker is single-threaded,
//!     so no locking is performed.
//! Symbols allocated on one thread must not be resolved on another.
//!
//! Symbols are never freed;
//!   they live until the end of the process.
//! This is a perfect fit for a batch tool that links one image and exits.

mod interner;
mod symbol;

pub use interner::{ArenaInterner, DefaultInterner, Interner};
pub use symbol::{GlobalSymbolIntern, GlobalSymbolResolve, SymbolId};
