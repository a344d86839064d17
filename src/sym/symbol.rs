// String internment symbol objects
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

//! Symbol objects representing interned strings.
//!
//! See the [parent module](super) for more information.

use super::interner::{new_global_interner, DefaultInterner};
use super::Interner;
use crate::global;
use std::fmt::{Debug, Display};

/// Reference to an interned string.
///
/// This is a [`Copy`] integer that compares equal only to symbols of the
///   same string in the same interner.
/// The index `0` is reserved so that `Option<SymbolId>` costs nothing
///   extra.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(global::NonZeroProgSymSize);
assert_eq_size!(Option<SymbolId>, SymbolId);

impl SymbolId {
    /// Construct a symbol from a dense interner index.
    ///
    /// Panics
    /// ======
    /// The index must be non-zero and fit within
    ///   [`ProgSymSize`](global::ProgSymSize);
    ///     both conditions indicate a bug in the interner.
    pub(super) fn from_index(index: usize) -> Self {
        global::ProgSymSize::try_from(index)
            .ok()
            .and_then(global::NonZeroProgSymSize::new)
            .map(SymbolId)
            .unwrap_or_else(|| {
                panic!("internal error: SymbolId index {index} out of range")
            })
    }

    /// Dense index of this symbol,
    ///   suitable for indexing arenas keyed by symbol.
    pub fn as_usize(self) -> usize {
        self.0.get() as usize
    }
}

impl From<SymbolId> for usize {
    fn from(value: SymbolId) -> usize {
        value.as_usize()
    }
}

thread_local! {
    static INTERNER: DefaultInterner<'static> = new_global_interner();
}

/// Invoke `f` with the global interner,
///   extending its lifetime to `'static`.
///
/// The thread-local storage lives for the remainder of the thread and is
///   only accessible to this thread,
///     so strings it hands out remain valid for `'static`.
fn with_static_interner<F, R>(f: F) -> R
where
    F: FnOnce(&'static DefaultInterner<'static>) -> R,
{
    INTERNER.with(|interner| {
        f(unsafe {
            // These type annotations are inferred, but please leave
            // them here; transmute is especially dangerous, and we want
            // to be sure reality always matches our expectations.
            std::mem::transmute::<
                &DefaultInterner<'static>,
                &'static DefaultInterner<'static>,
            >(interner)
        })
    })
}

/// Resolve a [`SymbolId`] to the string value it represents using the
///   global interner.
///
/// This exists as its own trait
///   (rather than simply adding to [`SymbolId`])
///   to make it easy to see what systems rely on global state.
pub trait GlobalSymbolResolve {
    /// Resolve a [`SymbolId`] allocated using the global interner.
    ///
    /// Panics
    /// ======
    /// This will panic if the symbol cannot be found,
    ///   which would represent a bug in the program.
    /// Use [`GlobalSymbolResolve::try_lookup_str`] if that is a problem.
    fn lookup_str(&self) -> &'static str;

    /// Attempt to resolve a [`SymbolId`] allocated using the global
    ///   interner.
    fn try_lookup_str(&self) -> Option<&'static str>;
}

impl GlobalSymbolResolve for SymbolId {
    fn lookup_str(&self) -> &'static str {
        with_static_interner(|interner| {
            interner.index_lookup(*self).unwrap_or_else(|| {
                panic!(
                    "failed to resolve SymbolId({}) using global \
                        interner of length {}",
                    self.0,
                    interner.len()
                )
            })
        })
    }

    fn try_lookup_str(&self) -> Option<&'static str> {
        with_static_interner(|interner| interner.index_lookup(*self))
    }
}

impl Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.lookup_str())
    }
}

impl Debug for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // This may be called during a panic,
        //   so don't panic again if the symbol cannot be found.
        write!(
            f,
            "SymbolId({} \"{}\")",
            self.0,
            self.try_lookup_str().unwrap_or("<#!UNKNOWN_SYMBOL>")
        )
    }
}

/// Intern a string using the global interner.
///
/// This provides a convenient API that creates the appearance that string
///   interning is a core Rust language feature
///   (e.g. `"foo".intern()`).
pub trait GlobalSymbolIntern {
    /// Intern a string using the global interner.
    fn intern(self) -> SymbolId;
}

impl GlobalSymbolIntern for &str {
    fn intern(self) -> SymbolId {
        with_static_interner(|interner| interner.intern(self))
    }
}

impl From<&str> for SymbolId {
    fn from(value: &str) -> Self {
        value.intern()
    }
}
