// String interner
//
//  Copyright (C) 2014-2021 Ryan Specialty Group, LLC.
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

//! Interners used to intern values as symbols.
//!
//! See the [parent module](super) for more information.
//!
//! ```
//! use bootld::sym::{DefaultInterner, Interner};
//!
//! let interner = DefaultInterner::new();
//!
//! let a = interner.intern("VmType_compile");
//! let b = interner.intern(&String::from("VmType_compile"));
//!
//! assert_eq!(a, b);
//! assert_eq!(1, interner.len());
//! assert_eq!(Some("VmType_compile"), interner.index_lookup(a));
//! ```

use super::SymbolId;
use crate::global;
use bumpalo::Bump;
use fxhash::FxBuildHasher;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::BuildHasher;

/// Create, store, compare, and retrieve interned values.
///
/// The same [`SymbolId`] will always be returned for a given string.
/// Interners employ interior mutability and so do not need to be declared
///   `mut`.
pub trait Interner<'i> {
    /// Intern a string slice or return an existing [`SymbolId`].
    fn intern(&self, value: &str) -> SymbolId;

    /// Retrieve an existing intern for the provided string slice without
    ///   interning it.
    fn intern_soft(&self, value: &str) -> Option<SymbolId>;

    /// Determine whether the given value has already been interned.
    fn contains(&self, value: &str) -> bool;

    /// Number of interned strings in this interner's pool.
    fn len(&self) -> usize;

    /// Look up a symbol's string value by its [`SymbolId`].
    ///
    /// If the symbol was not allocated by this interner,
    ///   the result is [`None`].
    fn index_lookup(&'i self, index: SymbolId) -> Option<&'i str>;
}

/// An interner backed by an [arena](bumpalo).
///
/// Since all symbols exist until the interner itself is freed,
///   an arena provides a stable location in memory for symbol data and
///   avoids an allocation per string.
pub struct ArenaInterner<'i, S>
where
    S: BuildHasher + Default,
{
    /// Storage for interned strings.
    arena: Bump,

    /// Interned strings by [`SymbolId`].
    ///
    /// The first index is always populated during initialization so that
    ///   no [`SymbolId`] is ever `0`.
    strings: RefCell<Vec<&'i str>>,

    /// Map of interned strings to their respective [`SymbolId`].
    map: RefCell<HashMap<&'i str, SymbolId, S>>,
}

impl<'i, S> ArenaInterner<'i, S>
where
    S: BuildHasher + Default,
{
    /// Initialize a new interner with no initial capacity.
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Initialize a new interner with an initial capacity for the
    ///   underlying [`HashMap`].
    ///
    /// The given `capacity` has no effect on arena allocation.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut strings = Vec::<_>::with_capacity(capacity + 1);

        // The first index is not used since SymbolId cannot be 0.
        strings.push("");

        Self {
            arena: Bump::new(),
            strings: RefCell::new(strings),
            map: RefCell::new(HashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
        }
    }

    #[inline]
    fn copy_slice_into_arena(&self, value: &str) -> &'i str {
        // The arena is owned by `self` and never frees or moves its
        //   allocations,
        //     so extending the lifetime to `'i` is sound for as long as
        //     the interner lives.
        unsafe { &*(self.arena.alloc_str(value) as *const str) }
    }
}

impl<'i, S> Default for ArenaInterner<'i, S>
where
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'i, S> Interner<'i> for ArenaInterner<'i, S>
where
    S: BuildHasher + Default,
{
    fn intern(&self, value: &str) -> SymbolId {
        let mut map = self.map.borrow_mut();

        if let Some(sym) = map.get(value) {
            return *sym;
        }

        let mut syms = self.strings.borrow_mut();

        let id = SymbolId::from_index(syms.len());
        let clone = self.copy_slice_into_arena(value);

        map.insert(clone, id);
        syms.push(clone);

        id
    }

    #[inline]
    fn intern_soft(&self, value: &str) -> Option<SymbolId> {
        self.map.borrow().get(value).copied()
    }

    #[inline]
    fn contains(&self, value: &str) -> bool {
        self.map.borrow().contains_key(value)
    }

    #[inline]
    fn len(&self) -> usize {
        self.map.borrow().len()
    }

    fn index_lookup(&'i self, index: SymbolId) -> Option<&'i str> {
        self.strings.borrow().get(index.as_usize()).copied()
    }
}

/// Recommended [`Interner`] and configuration,
///   using the [Fx Hash][fxhash] hashing function.
///
/// Denial of service against the hash function is not a concern for a
///   linker fed by its own build.
pub type DefaultInterner<'i> = ArenaInterner<'i, FxBuildHasher>;

/// Create the interner backing the global symbol pool.
pub(super) fn new_global_interner() -> DefaultInterner<'static> {
    DefaultInterner::with_capacity(global::INIT_GLOBAL_INTERNER_CAPACITY)
}

// Note that these tests assert on standalone interners, not on the globals;
//   see the `symbol` sibling module for those tests.
#[cfg(test)]
mod test {
    use super::*;

    type Sut<'i> = DefaultInterner<'i>;

    #[test]
    fn recognizes_equal_strings() {
        let a = "foo";
        let b = a.to_string();
        let c = "bar";
        let d = c.to_string();

        let sut = Sut::new();

        let (ia, ib, ic, id) =
            (sut.intern(a), sut.intern(&b), sut.intern(c), sut.intern(&d));

        assert_eq!(ia, ib);
        assert_eq!(ic, id);
        assert_ne!(ia, ic);
    }

    #[test]
    fn symbol_id_increases_with_each_new_intern() {
        let sut = Sut::new();

        // Remember that identifiers begin at 1
        assert_eq!(1, sut.intern("foo").as_usize(), "First index should be 1");

        assert_eq!(
            1,
            sut.intern("foo").as_usize(),
            "Index should not increment for already-interned symbols"
        );

        assert_eq!(
            2,
            sut.intern("bar").as_usize(),
            "Index should increment for new symbols"
        );
    }

    #[test]
    fn length_increases_with_each_new_intern() {
        let sut = Sut::new();

        assert_eq!(0, sut.len(), "invalid empty len");

        sut.intern("foo");
        assert_eq!(1, sut.len(), "increment len");

        // duplicate
        sut.intern("foo");
        assert_eq!(1, sut.len(), "do not increment len on duplicates");

        sut.intern("bar");
        assert_eq!(2, sut.len(), "increment len (2)");
    }

    #[test]
    fn can_check_whether_string_is_interned() {
        let sut = Sut::new();

        assert!(!sut.contains("foo"), "recognize missing value");
        sut.intern("foo");
        assert!(sut.contains("foo"), "recognize interned value");
    }

    #[test]
    fn intern_soft() {
        let sut = Sut::new();

        assert_eq!(None, sut.intern_soft("foo"));

        let foo = sut.intern("foo");
        assert_eq!(Some(foo), sut.intern_soft("foo"));
    }

    #[test]
    fn new_with_capacity() {
        let n = 512;
        let sut = Sut::with_capacity(n);

        // note that this is not publicly available
        assert!(sut.map.borrow().capacity() >= n);
    }

    #[test]
    fn lookup_symbol_by_index() {
        let sut = Sut::new();
        let sym = sut.intern("foo");

        assert_eq!(Some("foo"), sut.index_lookup(sym));
    }

    #[test]
    fn lookup_missing_index() {
        let sut = Sut::new();
        sut.intern("foo");

        assert_eq!(None, sut.index_lookup(SymbolId::from_index(5)));
    }
}
