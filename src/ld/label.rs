// Label table
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

//! Named addresses within the image and the sites that refer to them.
//!
//! A _label_ is a name that will eventually be bound to an address.
//! Code and data may refer to a label before it is bound;
//!   each such reference records a [`PatchSite`] in the image that is
//!   written once the label is [resolved](LabelTable::resolve).
//! A label may also be _linked_ to another label,
//!   in which case the linked label takes on the same address as soon as
//!   the first is resolved;
//!     this is how [well-known symbols](super::wellknown) are bound to
//!     the descriptors that implement them.
//!
//! Labels are stored in an arena in declaration order and indexed by
//!   their interned name,
//!     so iteration over the table is deterministic.
//!
//! ```
//! use bootld::img::{ImageBuf, Word};
//! use bootld::ld::{LabelKind, LabelTable, PatchSite};
//! use bootld::sym::GlobalSymbolIntern;
//!
//! let mut buf = ImageBuf::new(0x100000, Word::W32, 0, 64);
//! let mut labels = LabelTable::new();
//!
//! let site = buf.write32(0).unwrap();
//! let target = labels.declare("target".intern());
//!
//! labels.reference(&mut buf, target, PatchSite::abs32(site)).unwrap();
//! labels.resolve(&mut buf, target, 0x100040, LabelKind::Code).unwrap();
//!
//! assert_eq!(0x100040, buf.get32(site).unwrap());
//! assert!(labels.finalize().is_ok());
//! ```

use super::{LinkError, LinkResult};
use crate::{
    global::Addr,
    img::{ImageBuf, ImageError, Word},
    sym::SymbolId,
};
use fxhash::FxHashMap;

/// What a resolved label refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// Raw machine code or data
    ///   (e.g. glue code or a symbol exported by the native blob).
    Code,

    /// The reference point of a heap object.
    Object,
}

impl std::fmt::Display for LabelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Object => write!(f, "object"),
        }
    }
}

/// How a label's address is written into a [`PatchSite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// Absolute 32-bit address.
    Abs32,

    /// Absolute 64-bit address.
    Abs64,

    /// 32-bit displacement relative to the address of the site itself.
    Rel32,
}

impl PatchKind {
    pub fn width(self) -> usize {
        match self {
            Self::Abs32 | Self::Rel32 => 4,
            Self::Abs64 => 8,
        }
    }
}

/// A location in the image awaiting a label's address.
///
/// The value written is `target + addend` for absolute patches and
///   `target + addend - site` for relative patches,
///     where `site` is the physical address of `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSite {
    offset: usize,
    kind: PatchKind,
    addend: i64,
}

impl PatchSite {
    pub fn new(offset: usize, kind: PatchKind, addend: i64) -> Self {
        Self {
            offset,
            kind,
            addend,
        }
    }

    pub fn abs32(offset: usize) -> Self {
        Self::new(offset, PatchKind::Abs32, 0)
    }

    pub fn abs64(offset: usize) -> Self {
        Self::new(offset, PatchKind::Abs64, 0)
    }

    pub fn rel32(offset: usize, addend: i64) -> Self {
        Self::new(offset, PatchKind::Rel32, addend)
    }

    /// Absolute patch the width of a target word.
    pub fn word(word: Word, offset: usize) -> Self {
        match word {
            Word::W32 => Self::abs32(offset),
            Word::W64 => Self::abs64(offset),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn kind(&self) -> PatchKind {
        self.kind
    }

    pub fn addend(&self) -> i64 {
        self.addend
    }

    /// Write `target` into `buf` at this site.
    pub fn apply(&self, buf: &mut ImageBuf, target: Addr) -> LinkResult<()> {
        let value = target as i128 + self.addend as i128;

        let out_of_range = |value| ImageError::ValueRange {
            value,
            width: self.kind.width(),
        };

        match self.kind {
            PatchKind::Abs32 => {
                let v = u32::try_from(value).map_err(|_| out_of_range(value))?;
                buf.set32(self.offset, v)?;
            }
            PatchKind::Abs64 => {
                let v = u64::try_from(value).map_err(|_| out_of_range(value))?;
                buf.set64(self.offset, v)?;
            }
            PatchKind::Rel32 => {
                let rel = value - buf.address_of(self.offset) as i128;
                let v = i32::try_from(rel).map_err(|_| out_of_range(rel))?;
                buf.set32(self.offset, v as u32)?;
            }
        }

        Ok(())
    }
}

/// Opaque index of a label within a [`LabelTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(usize);

#[derive(Debug)]
struct Label {
    name: SymbolId,
    resolved: Option<(Addr, LabelKind)>,
    pending: Vec<PatchSite>,
    links: Vec<LabelId>,
}

/// Arena of labels keyed by interned name.
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: Vec<Label>,
    index: FxHashMap<SymbolId, LabelId>,
}

impl LabelTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Retrieve the label named `name`,
    ///   creating it if it does not yet exist.
    pub fn declare(&mut self, name: SymbolId) -> LabelId {
        let labels = &mut self.labels;

        *self.index.entry(name).or_insert_with(|| {
            let id = LabelId(labels.len());
            labels.push(Label {
                name,
                resolved: None,
                pending: Vec::new(),
                links: Vec::new(),
            });

            id
        })
    }

    /// Retrieve the label named `name` without declaring it.
    pub fn lookup(&self, name: SymbolId) -> Option<LabelId> {
        self.index.get(&name).copied()
    }

    pub fn name(&self, id: LabelId) -> SymbolId {
        self.labels[id.0].name
    }

    /// Address to which `id` has been resolved,
    ///   if any.
    pub fn address(&self, id: LabelId) -> Option<Addr> {
        self.labels[id.0].resolved.map(|(addr, _)| addr)
    }

    pub fn kind(&self, id: LabelId) -> Option<LabelKind> {
        self.labels[id.0].resolved.map(|(_, kind)| kind)
    }

    /// Request that the address of `id` be written to `site`.
    ///
    /// If `id` is already resolved,
    ///   the site is patched immediately.
    pub fn reference(
        &mut self,
        buf: &mut ImageBuf,
        id: LabelId,
        site: PatchSite,
    ) -> LinkResult<()> {
        let label = &mut self.labels[id.0];

        match label.resolved {
            Some((addr, _)) => site.apply(buf, addr),
            None => {
                label.pending.push(site);
                Ok(())
            }
        }
    }

    /// Request that `dest` be resolved to the same address as `src`.
    ///
    /// If `src` is already resolved,
    ///   `dest` is resolved immediately.
    pub fn link(
        &mut self,
        buf: &mut ImageBuf,
        src: LabelId,
        dest: LabelId,
    ) -> LinkResult<()> {
        match self.labels[src.0].resolved {
            Some((addr, kind)) => self.resolve(buf, dest, addr, kind),
            None => {
                self.labels[src.0].links.push(dest);
                Ok(())
            }
        }
    }

    /// Bind `id` to `addr`,
    ///   patching every pending site and resolving every linked label.
    ///
    /// A label may be resolved only once.
    pub fn resolve(
        &mut self,
        buf: &mut ImageBuf,
        id: LabelId,
        addr: Addr,
        kind: LabelKind,
    ) -> LinkResult<()> {
        let mut work = vec![id];

        while let Some(next) = work.pop() {
            let label = &mut self.labels[next.0];

            if label.resolved.is_some() {
                return Err(LinkError::DuplicateLabel(label.name));
            }

            label.resolved = Some((addr, kind));

            for site in std::mem::take(&mut label.pending) {
                site.apply(buf, addr)?;
            }

            work.extend(std::mem::take(&mut label.links));
        }

        Ok(())
    }

    /// Verify that every label has been resolved.
    ///
    /// The error names every unresolved label in declaration order.
    pub fn finalize(&self) -> LinkResult<()> {
        let unresolved: Vec<_> = self
            .labels
            .iter()
            .filter(|label| label.resolved.is_none())
            .map(|label| label.name)
            .collect();

        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(LinkError::Unresolved(unresolved))
        }
    }

    /// Labels in declaration order with their resolved address and kind.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (SymbolId, Option<(Addr, LabelKind)>)> + '_ {
        self.labels.iter().map(|label| (label.name, label.resolved))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
