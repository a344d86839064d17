// Boot image listing
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

//! Human-readable listing of a linked image.
//!
//! The listing first enumerates the boot class set in serialization
//!   order,
//!     then,
//!     after a blank line,
//!     every resolved label sorted by address:
//!
//! ```text
//! bootclass 0: org.jnode.vm.classmgr.VmMethodCode
//! bootclass 1: org.jnode.boot.Main
//!
//! $00100010	$$bootCode (code)
//! $00100060	vm_invoke (code)
//! ```
//!
//! Labels sharing an address are listed in the order in which they were
//!   declared.
//! Unlike [traces](super::trace),
//!   this format is stable and suitable for use by other tools.

use super::image::LinkedImage;
use crate::boot::BootClassSet;
use std::io::{self, Write};

/// Write the listing of `image`,
///   linked from `set`,
///   to `out`.
pub fn write_listing<W: Write>(
    out: &mut W,
    set: &BootClassSet,
    image: &LinkedImage,
) -> io::Result<()> {
    for (i, desc) in set.iter().enumerate() {
        writeln!(out, "bootclass {i}: {}", desc.name())?;
    }

    writeln!(out)?;

    let mut labels: Vec<_> = image
        .labels()
        .iter()
        .filter_map(|(name, resolved)| {
            resolved.map(|(addr, kind)| (addr, name, kind))
        })
        .collect();

    labels.sort_by_key(|(addr, _, _)| *addr);

    let width = image.word().bytes() * 2;

    for (addr, name, kind) in labels {
        writeln!(out, "${addr:0width$x}\t{name} ({kind})")?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        boot::{Descriptor, DescriptorKind},
        global::Addr,
        img::{ImageBuf, ObjectLayout, ObjectRecorder, Word},
        ld::label::{LabelKind, LabelTable},
        sym::GlobalSymbolIntern,
    };

    const BASE: Addr = 0x100000;

    fn image(word: Word, labels: &[(&str, Option<(Addr, LabelKind)>)]) -> LinkedImage {
        let mut buf = ImageBuf::new(BASE, word, 0, 4096);
        let mut table = LabelTable::new();

        for (name, resolved) in labels {
            let id = table.declare(name.intern());

            if let Some((addr, kind)) = resolved {
                table.resolve(&mut buf, id, *addr, *kind).unwrap();
            }
        }

        LinkedImage::from_parts(
            buf,
            table,
            ObjectRecorder::new(ObjectLayout::new(word)),
        )
    }

    fn listing(set: &BootClassSet, image: &LinkedImage) -> String {
        let mut out = Vec::new();
        write_listing(&mut out, set, image).unwrap();

        String::from_utf8(out).unwrap()
    }

    #[test]
    fn boot_classes_then_labels_by_address() {
        let set = BootClassSet::try_from(vec![
            Descriptor::new("A".intern(), DescriptorKind::Type),
            Descriptor::new("B".intern(), DescriptorKind::Method),
        ])
        .unwrap();

        let sut = image(
            Word::W32,
            &[
                ("late", Some((0x100200, LabelKind::Object))),
                ("early", Some((0x100010, LabelKind::Code))),
                ("unresolved", None),
                ("alias", Some((0x100200, LabelKind::Object))),
            ],
        );

        assert_eq!(
            "bootclass 0: A\n\
             bootclass 1: B\n\
             \n\
             $00100010\tearly (code)\n\
             $00100200\tlate (object)\n\
             $00100200\talias (object)\n",
            listing(&set, &sut),
        );
    }

    #[test]
    fn wide_addresses_for_64_bit() {
        let sut = image(
            Word::W64,
            &[("x", Some((0x1_0000_0000, LabelKind::Code)))],
        );

        assert_eq!(
            "\n$0000000100000000\tx (code)\n",
            listing(&BootClassSet::new(), &sut),
        );
    }
}
