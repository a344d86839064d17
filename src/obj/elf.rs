// Native blob loader
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

//! Loading of the native blob into the image.
//!
//! The blob is an ELF relocatable object.
//! Every loadable section is copied into the image at the cursor in
//!   section header order,
//!     each aligned to its own alignment;
//!   `.bss`-like sections are zero-filled.
//! Relocations are then applied in place:
//!
//!   - A relocation against a symbol or section that was copied into the
//!       image is patched immediately.
//!   - A relocation against an undefined symbol becomes a reference to the
//!       [label](crate::ld::label) of the same name,
//!         to be patched once that label is resolved.
//!   - A relocation against anything else
//!       (e.g. a debug section that was not copied)
//!       is an error.
//!
//! Global symbols defined by the blob are published as
//!   [code labels](crate::ld::LabelKind::Code);
//!     this is how the blob provides `vm_invoke`.

use crate::{
    arch::Target,
    global::Addr,
    img::ImageBuf,
    ld::{LabelKind, LabelTable, LinkResult, PatchKind, PatchSite},
    sym::GlobalSymbolIntern,
};
use fxhash::FxHashMap;
use object::{
    Architecture, BinaryFormat, Object, ObjectKind, ObjectSection,
    ObjectSymbol, RelocationKind, RelocationTarget, SectionIndex,
    SectionKind, SymbolKind, SymbolSection,
};
use std::fmt::{self, Display};

/// An error loading the native blob.
#[derive(Debug)]
pub enum BlobError {
    /// The blob could not be parsed.
    Parse(object::Error),

    /// The blob is not an ELF object.
    Format(BinaryFormat),

    /// The blob is an ELF object but not a relocatable one
    ///   (e.g. an executable).
    NotRelocatable(ObjectKind),

    /// The blob was assembled for a different machine than the target.
    Machine {
        found: Architecture,
        expected: Architecture,
    },

    /// A section declares an alignment that is not a power of two.
    BadAlignment { section: String, align: u64 },

    /// A relocation kind or size is not supported.
    UnsupportedRelocation {
        section: String,
        offset: u64,
        kind: RelocationKind,
        size: u8,
    },

    /// A relocation's patch site lies outside of its section.
    SiteOutOfRange { section: String, offset: u64 },

    /// A relocation refers to something that was not copied into the
    ///   image.
    TargetOutsideImage {
        section: String,
        offset: u64,
        target: String,
    },
}

impl Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use BlobError::*;

        match self {
            Parse(e) => write!(f, "malformed object file: {e}"),
            Format(format) => {
                write!(f, "expected an ELF object, found {format:?}")
            }
            NotRelocatable(kind) => {
                write!(f, "expected a relocatable object, found {kind:?}")
            }
            Machine { found, expected } => write!(
                f,
                "unknown architecture {found:?} (expected {expected:?})"
            ),
            BadAlignment { section, align } => {
                write!(f, "section `{section}` has invalid alignment {align}")
            }
            UnsupportedRelocation {
                section,
                offset,
                kind,
                size,
            } => write!(
                f,
                "unsupported {size}-bit {kind:?} relocation \
                    at `{section}`+{offset:#x}"
            ),
            SiteOutOfRange { section, offset } => write!(
                f,
                "relocation at `{section}`+{offset:#x} lies outside \
                    of its section"
            ),
            TargetOutsideImage {
                section,
                offset,
                target,
            } => write!(
                f,
                "relocation at `{section}`+{offset:#x} targets `{target}`, \
                    which is outside of the copied sections"
            ),
        }
    }
}

impl std::error::Error for BlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<object::Error> for BlobError {
    fn from(e: object::Error) -> Self {
        Self::Parse(e)
    }
}

/// Summary of a loaded blob,
///   for tracing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlobSummary {
    /// Offset of the first byte of the first loaded section.
    pub start: usize,
    /// Offset immediately following the last loaded section.
    pub end: usize,
    pub sections: usize,
    pub relocations: usize,
    pub externals: usize,
    pub exports: usize,
}

/// Whether a section of kind `kind` is copied into the image.
fn is_loadable(kind: SectionKind) -> bool {
    matches!(
        kind,
        SectionKind::Text
            | SectionKind::Data
            | SectionKind::ReadOnlyData
            | SectionKind::ReadOnlyDataWithRel
            | SectionKind::ReadOnlyString
            | SectionKind::UninitializedData
    )
}

/// Where a relocation's value comes from.
enum Resolution {
    /// Known address.
    Addr(Addr),
    /// Undefined symbol to be resolved by label.
    External(String),
}

/// Copy the blob `data` into `buf` at the cursor,
///   applying its relocations and publishing its global symbols to
///   `labels`.
pub fn load_blob(
    buf: &mut ImageBuf,
    labels: &mut LabelTable,
    target: &dyn Target,
    data: &[u8],
) -> LinkResult<BlobSummary> {
    let file = object::File::parse(data).map_err(BlobError::from)?;

    check_file(&file, target)?;

    let mut summary = BlobSummary {
        start: buf.len(),
        ..Default::default()
    };

    let placed = copy_sections(buf, &file, &mut summary)?;

    for symbol in file.symbols() {
        if !symbol.is_global() || symbol.kind() == SymbolKind::Section {
            continue;
        }

        let offset = match symbol.section() {
            SymbolSection::Section(index) => match placed.get(&index) {
                Some(offset) => *offset,
                None => continue,
            },
            _ => continue,
        };

        let name = symbol.name().map_err(BlobError::from)?;
        let addr = buf.address_of(offset) + symbol.address();

        let id = labels.declare(name.intern());
        labels.resolve(buf, id, addr, LabelKind::Code)?;
        summary.exports += 1;
    }

    for section in file.sections() {
        let base = match placed.get(&section.index()) {
            Some(base) => *base,
            None => continue,
        };

        let section_name = section.name().unwrap_or("<unnamed>");

        for (offset, reloc) in section.relocations() {
            let patch_kind = match (reloc.kind(), reloc.size()) {
                (RelocationKind::Absolute, 32) => PatchKind::Abs32,
                (RelocationKind::Absolute, 64) => PatchKind::Abs64,
                (RelocationKind::Relative | RelocationKind::PltRelative, 32) => {
                    PatchKind::Rel32
                }
                (kind, size) => {
                    return Err(BlobError::UnsupportedRelocation {
                        section: section_name.into(),
                        offset,
                        kind,
                        size,
                    }
                    .into())
                }
            };

            let in_range = offset
                .checked_add(patch_kind.width() as u64)
                .map_or(false, |end| end <= section.size());

            if !in_range {
                return Err(BlobError::SiteOutOfRange {
                    section: section_name.into(),
                    offset,
                }
                .into());
            }

            let site = base + offset as usize;

            let addend = if reloc.has_implicit_addend() {
                match patch_kind {
                    PatchKind::Abs64 => buf.get64(site)? as i64,
                    PatchKind::Abs32 | PatchKind::Rel32 => {
                        buf.get32(site)? as i32 as i64
                    }
                }
            } else {
                reloc.addend()
            };

            let outside = |target: String| BlobError::TargetOutsideImage {
                section: section_name.into(),
                offset,
                target,
            };

            let resolution = match reloc.target() {
                RelocationTarget::Symbol(index) => {
                    let symbol =
                        file.symbol_by_index(index).map_err(BlobError::from)?;
                    let name = symbol.name().unwrap_or("<unnamed>");

                    match symbol.section() {
                        SymbolSection::Section(sindex) => {
                            match placed.get(&sindex) {
                                Some(soff) => Resolution::Addr(
                                    buf.address_of(*soff) + symbol.address(),
                                ),
                                None => return Err(outside(name.into()).into()),
                            }
                        }
                        SymbolSection::Undefined => {
                            Resolution::External(name.into())
                        }
                        SymbolSection::Absolute => {
                            Resolution::Addr(symbol.address())
                        }
                        _ => return Err(outside(name.into()).into()),
                    }
                }
                RelocationTarget::Section(sindex) => match placed.get(&sindex) {
                    Some(soff) => Resolution::Addr(buf.address_of(*soff)),
                    None => {
                        let name = file
                            .section_by_index(sindex)
                            .ok()
                            .and_then(|s| s.name().ok().map(String::from))
                            .unwrap_or_else(|| format!("section {}", sindex.0));

                        return Err(outside(name).into());
                    }
                },
                RelocationTarget::Absolute => Resolution::Addr(0),
                _ => {
                    return Err(BlobError::UnsupportedRelocation {
                        section: section_name.into(),
                        offset,
                        kind: reloc.kind(),
                        size: reloc.size(),
                    }
                    .into())
                }
            };

            let patch = PatchSite::new(site, patch_kind, addend);

            match resolution {
                Resolution::Addr(addr) => patch.apply(buf, addr)?,
                Resolution::External(name) => {
                    let id = labels.declare(name.as_str().intern());
                    labels.reference(buf, id, patch)?;
                    summary.externals += 1;
                }
            }

            summary.relocations += 1;
        }
    }

    summary.end = buf.len();

    Ok(summary)
}

fn check_file(file: &object::File, target: &dyn Target) -> Result<(), BlobError> {
    if file.format() != BinaryFormat::Elf {
        return Err(BlobError::Format(file.format()));
    }

    if file.kind() != ObjectKind::Relocatable {
        return Err(BlobError::NotRelocatable(file.kind()));
    }

    let expected = target.elf_architecture();
    if file.architecture() != expected {
        return Err(BlobError::Machine {
            found: file.architecture(),
            expected,
        });
    }

    Ok(())
}

/// Copy every loadable section into `buf`,
///   returning the image offset of each.
fn copy_sections(
    buf: &mut ImageBuf,
    file: &object::File,
    summary: &mut BlobSummary,
) -> LinkResult<FxHashMap<SectionIndex, usize>> {
    let mut placed = FxHashMap::default();

    for section in file.sections() {
        if !is_loadable(section.kind()) {
            continue;
        }

        let align = section.align().max(1);
        if !align.is_power_of_two() {
            return Err(BlobError::BadAlignment {
                section: section.name().unwrap_or("<unnamed>").into(),
                align,
            }
            .into());
        }

        buf.align(align as usize)?;

        let offset = match section.kind() {
            SectionKind::UninitializedData => {
                buf.write_zeros(section.size() as usize)?
            }
            _ => buf.write(section.data().map_err(BlobError::from)?)?,
        };

        placed.insert(section.index(), offset);
        summary.sections += 1;
    }

    // The first section may have been aligned after the cursor.
    if let Some(first) = placed.values().min() {
        summary.start = *first;
    }

    Ok(placed)
}
