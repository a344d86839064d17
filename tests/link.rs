// Boot image link scenarios
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

mod common;

use bootld::{
    boot::{read_manifest, BootClassSet, ManifestError},
    ld::{
        image::{BOOT_CODE, CLINIT_CALLER},
        write_listing, ImageLinker, InitOrderKind, LayoutError, LinkConfig,
        LinkError, LinkResult, LinkedImage,
    },
    sym::GlobalSymbolIntern,
};
use common::*;
use std::fs;

fn config() -> LinkConfig {
    LinkConfig {
        initial_capacity: 0,
        ..Default::default()
    }
}

fn set(xml: &str) -> BootClassSet {
    read_manifest(xml.as_bytes()).expect("invalid manifest fixture")
}

fn link(config: LinkConfig, xml: &str, kernel: &[u8]) -> LinkResult<LinkedImage> {
    ImageLinker::new(config).link(&set(xml), kernel)
}

#[test]
fn minimal_set_builds() -> Result<(), Box<dyn std::error::Error>> {
    let scratch = Scratch::new("minimal");
    let dest = scratch.path("image.bin");

    let image = link(config(), &manifest(&[]), &kernel(BASE as u32))?;
    image.write(&dest)?;

    let bytes = fs::read(&dest)?;
    assert_eq!(image.contents(), &bytes[..]);
    assert_eq!(0, bytes.len() % 4096);

    // execution enters at the body of the first object
    let first = image.objects().iter().next().unwrap();
    assert_eq!(BOOT_CODE.intern(), first.name());
    assert_eq!(16, first.start());
    assert_eq!(Some(BASE + 16), image.address_of(BOOT_CODE.intern()));
    assert_eq!(0xBF, bytes[16]); // mov edi, imm32

    // load end patched to image end
    let hdr = image.header_offset();
    let end = u32::from_le_bytes(bytes[hdr + 20..hdr + 24].try_into()?);
    assert_eq!(BASE as usize + bytes.len(), end as usize);

    assert!(!scratch.path("image.bin.tmp").exists());

    Ok(())
}

#[test]
fn stripped_magic_header_not_found() {
    let result = link(
        config(),
        &manifest(&[]),
        &kernel_with_magic(0xDEAD_BEEF, BASE as u32),
    );

    assert!(matches!(
        result,
        Err(LinkError::HeaderNotFound { scanned: 4096 })
    ));
}

#[test]
fn base_disagreeing_with_header_is_mismatch() {
    let config = LinkConfig {
        base: 0x0020_0000,
        ..config()
    };

    match link(config, &manifest(&[]), &kernel(BASE as u32)) {
        Err(e @ LinkError::AddressMismatch { .. }) => {
            let msg = e.to_string();
            assert!(msg.contains("0x00100000"), "{msg}");
            assert!(msg.contains("0x00200000"), "{msg}");
        }
        other => panic!("expected address mismatch, got {other:?}"),
    }
}

#[test]
fn missing_reschedule_method_unresolved() {
    let xml = manifest(&["org.jnode.vm.scheduler.VmProcessor#reschedule"]);

    match link(config(), &xml, &kernel(BASE as u32)) {
        Err(e @ LinkError::Unresolved(_)) => {
            assert!(e.to_string().contains("`VmProcessor_reschedule`"));
        }
        other => panic!("expected unresolved labels, got {other:?}"),
    }
}

#[test]
fn identical_inputs_produce_identical_files(
) -> Result<(), Box<dyn std::error::Error>> {
    let scratch = Scratch::new("determinism");
    let (a, b) = (scratch.path("a.bin"), scratch.path("b.bin"));

    link(config(), &manifest(&[]), &kernel(BASE as u32))?.write(&a)?;
    link(config(), &manifest(&[]), &kernel(BASE as u32))?.write(&b)?;

    assert_eq!(fs::read(a)?, fs::read(b)?);

    Ok(())
}

#[test]
fn values_encoded_at_field_offsets() -> LinkResult<()> {
    let image = link(config(), &manifest(&[]), &kernel(BASE as u32))?;

    let registry = image
        .address_of("org.jnode.plugin.model.PluginRegistryModel".intern())
        .unwrap();
    let offset = (registry - image.base()) as usize;

    assert_eq!(
        &[1, 0, 0, 0, 0xCA, 0xFE, 0, 0],
        &image.contents()[offset..offset + 8]
    );

    // initial thread references the boot processor
    let thread = image
        .address_of("org.jnode.vm.scheduler.VmThread$initial".intern())
        .unwrap();
    let processor = image
        .address_of("org.jnode.vm.scheduler.VmProcessor$boot".intern())
        .unwrap();
    let offset = (thread - image.base()) as usize + 8;

    assert_eq!(
        processor as u32,
        u32::from_le_bytes(image.contents()[offset..offset + 4].try_into().unwrap())
    );

    Ok(())
}

/// Manifest with two eager types with static initializers,
///   the first of which refers to the second.
fn with_initializers(cyclic: bool) -> String {
    let base = manifest(&[]);
    let back = if cyclic {
        r#"<field name="a" type="ref" offset="0" value="org.example.A"/>"#
    } else {
        ""
    };

    let extra = format!(
        r#"  <descriptor name="org.example.A" kind="type" eager="true" clinit="true">
    <field name="b" type="ref" offset="0" value="org.example.B"/>
  </descriptor>
  <descriptor name="org.example.B" kind="type" eager="true" clinit="true">
    {back}
  </descriptor>
  <descriptor name="org.example.A#&lt;clinit&gt;" kind="method"/>
  <descriptor name="org.example.B#&lt;clinit&gt;" kind="method"/>
</boot-classes>
"#
    );

    base.replace("</boot-classes>\n", &extra)
}

#[test]
fn initializers_in_declaration_order() -> LinkResult<()> {
    let image = link(config(), &with_initializers(false), &kernel(BASE as u32))?;

    assert_eq!(
        &["org.example.A".intern(), "org.example.B".intern()],
        image.initializers()
    );
    assert!(image.address_of(CLINIT_CALLER.intern()).is_some());

    Ok(())
}

#[test]
fn initializers_in_dependency_order() -> LinkResult<()> {
    let config = LinkConfig {
        init_order: InitOrderKind::Dependency,
        ..config()
    };

    let image = link(config, &with_initializers(false), &kernel(BASE as u32))?;

    assert_eq!(
        &["org.example.B".intern(), "org.example.A".intern()],
        image.initializers()
    );

    Ok(())
}

#[test]
fn initializer_cycle_fails_dependency_order() {
    let deps = LinkConfig {
        init_order: InitOrderKind::Dependency,
        ..config()
    };

    assert!(matches!(
        link(deps, &with_initializers(true), &kernel(BASE as u32)),
        Err(LinkError::InitOrder(_))
    ));

    // declaration order does not care
    assert!(link(config(), &with_initializers(true), &kernel(BASE as u32)).is_ok());
}

#[test]
fn listing_names_boot_classes_and_labels() -> LinkResult<()> {
    let set = set(&manifest(&[]));
    let image = ImageLinker::new(config()).link(&set, &kernel(BASE as u32))?;

    let mut out = Vec::new();
    write_listing(&mut out, &set, &image)?;
    let listing = String::from_utf8(out).unwrap();

    assert!(listing.starts_with(
        "bootclass 0: org.jnode.vm.classmgr.VmMethodCode\n"
    ));
    assert!(listing.contains("\n\n$00100010\t$$bootCode (code)\n"));
    assert!(listing.contains("\tVmProcessor_reschedule (object)\n"));

    Ok(())
}

#[test]
fn image_and_listing_written_together() -> Result<(), Box<dyn std::error::Error>> {
    let scratch = Scratch::new("with-listing");
    let dest = scratch.path("image.bin");
    let list = scratch.path("image.lst");

    let set = set(&manifest(&[]));
    let image = ImageLinker::new(config()).link(&set, &kernel(BASE as u32))?;
    image.write_with_listing(&dest, &list, &set)?;

    assert_eq!(image.contents(), &fs::read(&dest)?[..]);
    assert!(fs::read_to_string(&list)?.contains("$$bootCode (code)"));

    // listing cannot be created; image must not appear either
    let lost = scratch.path("lost.bin");
    let result =
        image.write_with_listing(&lost, scratch.path("no/dir/x.lst"), &set);

    assert!(matches!(result, Err(LinkError::Io(_))));
    assert!(!lost.exists());
    assert!(!scratch.path("lost.bin.tmp").exists());

    Ok(())
}

#[test]
fn field_offset_beyond_address_space_fails() {
    let xml = manifest(&[]).replace(
        r#"<field name="flags" type="u32" offset="0" value="0x1"/>"#,
        r#"<field name="flags" type="u32" offset="0xFFFFFFFFFFFFFFFF"/>"#,
    );

    match read_manifest(xml.as_bytes()) {
        // unaddressable on hosts narrower than 64 bits
        Err(e) => assert!(matches!(
            e,
            ManifestError::BadAttr { attr: "offset", .. }
        )),

        Ok(set) => assert!(matches!(
            ImageLinker::new(config()).link(&set, &kernel(BASE as u32)),
            Err(LinkError::Layout(LayoutError::FieldOverflow { .. }))
        )),
    }
}
