// Boot class set
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

//! The boot class set:
//!   the statically-closed collection of type descriptors,
//!   method descriptors,
//!   and static data that make up the initial heap of the managed runtime.
//!
//! Discovering and compiling the boot class set is not the business of the
//!   linker;
//!     it receives an ordered [`BootClassSet`] of [`Descriptor`]s,
//!       either constructed in code or read from a
//!       [boot manifest](manifest).
//! Each descriptor carries an explicit [`Layout`]:
//!   the byte offset and encoded type of every field within the object
//!   body,
//!     along with the value of each field.
//! Serializing a descriptor is therefore a matter of writing each value at
//!   its offset
//!     (see [`encode`]).
//!
//! The linker _assumes_ that the set is transitively closed;
//!   a reference to a descriptor outside of the set surfaces as an
//!   unresolved label when the link is finalized.
//!
//! ```
//! use bootld::boot::{BootClassSet, Depth, Descriptor, DescriptorKind, FieldType, FieldValue};
//! use bootld::sym::GlobalSymbolIntern;
//!
//! let main = Descriptor::new("org.jnode.boot.Main".intern(), DescriptorKind::Type)
//!     .with_class("org.jnode.vm.classmgr.VmNormalClass".intern())
//!     .with_depth(Depth::Full)
//!     .with_field("pluginRegistry".intern(), FieldType::Ref, 0)
//!     .with_size(8);
//!
//! let mut set = BootClassSet::new();
//! set.push(main).unwrap();
//!
//! assert_eq!(1, set.len());
//! assert!(set.get("org.jnode.boot.Main".intern()).is_some());
//! ```

pub mod encode;
pub mod manifest;

pub use encode::{LayoutEncoder, ObjectEncoder};
pub use manifest::{read_manifest, ManifestError};

use crate::{img::Word, sym::SymbolId};
use fxhash::FxHashMap;
use std::fmt::{self, Display};

/// What a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// A type (class, interface, array type).
    Type,
    /// A method, including its compiled code.
    Method,
    /// A table of static fields.
    Statics,
    /// Any other object instance.
    Instance,
}

impl Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Method => write!(f, "method"),
            Self::Statics => write!(f, "statics"),
            Self::Instance => write!(f, "instance"),
        }
    }
}

/// How much of a descriptor is exposed to other descriptors by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Depth {
    /// Only the object itself is labeled.
    #[default]
    Shallow,

    /// Each field of the object is additionally labeled as
    ///   `<descriptor>#<field>`.
    Full,
}

/// Encoded type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    U16,
    U32,
    U64,
    /// Target word.
    Word,
    /// Reference to another descriptor (a target word).
    Ref,
    /// Raw bytes of the given length.
    Bytes(usize),
}

impl FieldType {
    /// Number of bytes occupied by a field of this type.
    pub fn width(self, word: Word) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
            Self::Word | Self::Ref => word.bytes(),
            Self::Bytes(len) => len,
        }
    }
}

/// Value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    /// All zero bytes
    ///   (a null reference, a zero integer).
    #[default]
    Null,
    Int(u64),
    Ref(SymbolId),
    Bytes(Vec<u8>),
}

/// A field within an object body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    pub name: SymbolId,
    pub ty: FieldType,
    /// Byte offset from the start of the object body.
    pub offset: usize,
}

/// Fields of an object body and its total size.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layout {
    fields: Vec<FieldSlot>,
    size: Option<usize>,
}

impl Layout {
    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldSlot] {
        &self.fields
    }

    pub fn field(&self, name: SymbolId) -> Option<&FieldSlot> {
        self.fields.iter().find(|slot| slot.name == name)
    }

    /// Size of the object body.
    ///
    /// If no size was given explicitly,
    ///   this is the end of the furthest field,
    ///   saturating at [`usize::MAX`].
    pub fn size(&self, word: Word) -> usize {
        self.size.unwrap_or_else(|| {
            self.fields
                .iter()
                .map(|slot| {
                    slot.offset.saturating_add(slot.ty.width(word))
                })
                .max()
                .unwrap_or(0)
        })
    }
}

/// A single object of the boot class set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    name: SymbolId,
    kind: DescriptorKind,
    class: Option<SymbolId>,
    eager: bool,
    depth: Depth,
    clinit: bool,
    layout: Layout,
    values: Vec<(SymbolId, FieldValue)>,
}

impl Descriptor {
    pub fn new(name: SymbolId, kind: DescriptorKind) -> Self {
        Self {
            name,
            kind,
            class: None,
            eager: false,
            depth: Depth::default(),
            clinit: false,
            layout: Layout::default(),
            values: Vec::new(),
        }
    }

    /// Type referenced by the header of this object.
    pub fn with_class(self, class: SymbolId) -> Self {
        Self {
            class: Some(class),
            ..self
        }
    }

    pub fn with_eager(self, eager: bool) -> Self {
        Self { eager, ..self }
    }

    pub fn with_depth(self, depth: Depth) -> Self {
        Self { depth, ..self }
    }

    /// Whether this type declares a static initializer.
    pub fn with_clinit(self, clinit: bool) -> Self {
        Self { clinit, ..self }
    }

    pub fn with_field(
        mut self,
        name: SymbolId,
        ty: FieldType,
        offset: usize,
    ) -> Self {
        self.layout.fields.push(FieldSlot { name, ty, offset });
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.layout.size = Some(size);
        self
    }

    /// Set the value of field `name`,
    ///   replacing any previous value.
    pub fn with_value(mut self, name: SymbolId, value: FieldValue) -> Self {
        self.set_value(name, value);
        self
    }

    pub fn set_value(&mut self, name: SymbolId, value: FieldValue) {
        match self.values.iter_mut().find(|(field, _)| *field == name) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn name(&self) -> SymbolId {
        self.name
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn class(&self) -> Option<SymbolId> {
        self.class
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    pub fn has_clinit(&self) -> bool {
        self.clinit
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Value of field `name`,
    ///   defaulting to [`FieldValue::Null`].
    pub fn value(&self, name: SymbolId) -> &FieldValue {
        const NULL: &FieldValue = &FieldValue::Null;

        self.values
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
            .unwrap_or(NULL)
    }

    /// Descriptors referenced by the fields of this descriptor,
    ///   in layout order.
    pub fn refs(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.layout.fields.iter().filter_map(|slot| {
            match self.value(slot.name) {
                FieldValue::Ref(target) => Some(*target),
                _ => None,
            }
        })
    }
}

/// An error constructing a [`BootClassSet`].
#[derive(Debug, PartialEq, Eq)]
pub enum BootSetError {
    /// Two descriptors share the same name.
    Duplicate(SymbolId),
}

impl Display for BootSetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Duplicate(name) => {
                write!(f, "duplicate descriptor `{name}` in boot class set")
            }
        }
    }
}

impl std::error::Error for BootSetError {}

/// Ordered set of descriptors to be serialized into the image.
///
/// Descriptors are serialized in the order in which they were added.
#[derive(Debug, Default, Clone)]
pub struct BootClassSet {
    descriptors: Vec<Descriptor>,
    index: FxHashMap<SymbolId, usize>,
}

impl BootClassSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Append `desc`.
    ///
    /// Descriptor names must be unique within the set.
    pub fn push(&mut self, desc: Descriptor) -> Result<(), BootSetError> {
        let name = desc.name();

        if self.index.contains_key(&name) {
            return Err(BootSetError::Duplicate(name));
        }

        self.index.insert(name, self.descriptors.len());
        self.descriptors.push(desc);

        Ok(())
    }

    pub fn get(&self, name: SymbolId) -> Option<&Descriptor> {
        self.index.get(&name).map(|&i| &self.descriptors[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl TryFrom<Vec<Descriptor>> for BootClassSet {
    type Error = BootSetError;

    fn try_from(descriptors: Vec<Descriptor>) -> Result<Self, Self::Error> {
        let mut set = Self::new();

        for desc in descriptors {
            set.push(desc)?;
        }

        Ok(set)
    }
}
