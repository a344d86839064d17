// Tests for boot image linker
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

use super::*;
use crate::{
    arch::{Emitter, X86},
    boot::{Descriptor, DescriptorKind, FieldType},
    img::Word,
    ld::{config::ConfigError, header, trace::VoidTrace, LinkError},
};
use object::{
    write::{self, Object as WriteObject},
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags,
    SymbolKind, SymbolScope,
};

const BASE: Addr = 0x100000;

type Sut = ImageLinker<VoidTrace>;

fn config(word: Word) -> LinkConfig {
    LinkConfig {
        word,
        initial_capacity: 0,
        max_capacity: 1 << 20,
        stack_slots: 64,
        overflow_limit_slots: 4,
        boot_heap_size: 64,
        heap_size: 128,
        ..Default::default()
    }
}

/// Relocatable object holding a multiboot header followed by a `ret`
///   exported as `vm_invoke`.
fn blob(arch: Architecture, load_addr: u32) -> Vec<u8> {
    let mut text = Vec::new();
    text.extend(header::MULTIBOOT_MAGIC.to_le_bytes());
    text.extend(0x0001_0003u32.to_le_bytes()); // flags
    text.extend(0u32.to_le_bytes()); // checksum
    text.extend(0u32.to_le_bytes()); // header_addr
    text.extend(load_addr.to_le_bytes());
    text.resize(48, 0);
    text.push(0xC3);

    let mut obj = WriteObject::new(BinaryFormat::Elf, arch, Endianness::Little);
    let id = obj.add_section(vec![], b".text".to_vec(), SectionKind::Text);
    obj.append_section_data(id, &text, 4);

    obj.add_symbol(write::Symbol {
        name: b"vm_invoke".to_vec(),
        value: 48,
        size: 1,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: write::SymbolSection::Section(id),
        flags: SymbolFlags::None,
    });

    obj.write().unwrap()
}

fn blob32() -> Vec<u8> {
    blob(Architecture::I386, BASE as u32)
}

fn ty(name: &str) -> Descriptor {
    Descriptor::new(name.intern(), DescriptorKind::Type)
}

/// Smallest boot class set satisfying the glue and every well-known
///   symbol.
fn fixture(word: Word) -> Vec<Descriptor> {
    let w = word.bytes();

    let mut descs = vec![
        ty("org.jnode.vm.classmgr.VmMethodCode"),
        ty("org.jnode.vm.objects.VmSystemObject"),
        ty("org.jnode.vm.memmgr.def.VmBootHeap"),
        ty("org.jnode.vm.memmgr.def.VmDefaultHeap"),
        Descriptor::new(
            "org.jnode.plugin.model.PluginRegistryModel".intern(),
            DescriptorKind::Instance,
        ),
        Descriptor::new("org.jnode.boot.Main".intern(), DescriptorKind::Statics)
            .with_depth(Depth::Full)
            .with_field("pluginRegistry".intern(), FieldType::Ref, 0),
        Descriptor::new(
            "org.jnode.vm.memmgr.def.DefaultHeapManager".intern(),
            DescriptorKind::Statics,
        )
        .with_depth(Depth::Full)
        .with_field("bootHeap".intern(), FieldType::Ref, 0)
        .with_field("firstNormalHeap".intern(), FieldType::Ref, w),
        Descriptor::new(
            "org.jnode.vm.scheduler.VmThread$initial".intern(),
            DescriptorKind::Instance,
        )
        .with_field("stack".intern(), FieldType::Word, 0)
        .with_field("stackEnd".intern(), FieldType::Word, w),
        Descriptor::new(
            "org.jnode.vm.scheduler.VmProcessor$boot".intern(),
            DescriptorKind::Instance,
        )
        .with_field("stackEnd".intern(), FieldType::Word, 0),
        Descriptor::new(
            "org.jnode.boot.Main#vmMain".intern(),
            DescriptorKind::Method,
        ),
    ];

    for wk in WELL_KNOWN {
        if let Binding::Method(method) = wk.binding {
            descs.push(Descriptor::new(method.intern(), DescriptorKind::Method));
        }
    }

    descs
}

fn set(descs: Vec<Descriptor>) -> BootClassSet {
    BootClassSet::try_from(descs).unwrap()
}

fn link32(descs: Vec<Descriptor>) -> LinkResult<LinkedImage> {
    Sut::with_trace(config(Word::W32), VoidTrace).link(&set(descs), &blob32())
}

fn addr(image: &LinkedImage, name: &str) -> Addr {
    image
        .address_of(name.intern())
        .unwrap_or_else(|| panic!("`{name}` not resolved"))
}

fn word_at(image: &LinkedImage, addr: Addr) -> u32 {
    let offset = (addr - image.base()) as usize;
    let bytes = &image.contents()[offset..offset + 4];

    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[test]
fn minimal_set_links_with_entry_in_first_object() {
    let image = link32(fixture(Word::W32)).unwrap();

    let first = image.objects().iter().next().unwrap();
    assert_eq!(BOOT_CODE.intern(), first.name());
    assert_eq!(0, first.header_start());
    assert_eq!(X86::bits32().entry_offset(), first.start());
    assert!(first.body_size().unwrap() > 0);

    assert_eq!(0, image.len() % global::PAGE_SIZE);
    assert_eq!(first.end(), Some(image.blob().start));
    assert_eq!(image.blob().start, image.header_offset());
}

#[test]
fn header_patched_with_image_end() {
    let image = link32(fixture(Word::W32)).unwrap();
    let hdr = image.header_offset() as Addr + BASE;
    let end = BASE + image.len() as Addr;

    assert_eq!(end as u32, word_at(&image, hdr + header::LOAD_END_ADDR as Addr));
    assert_eq!(end as u32, word_at(&image, hdr + header::BSS_END_ADDR as Addr));
}

#[test]
fn object_symbols_are_bound_to_object_start() {
    let image = link32(fixture(Word::W32)).unwrap();

    for record in image.objects().iter() {
        assert_eq!(
            Some(record.address(BASE)),
            image.address_of(record.name()),
            "{}",
            record.name(),
        );
    }
}

#[test]
fn object_headers_reference_their_class() {
    let image = link32(fixture(Word::W32)).unwrap();
    let code_class = addr(&image, "org.jnode.vm.classmgr.VmMethodCode");

    // type word immediately precedes the object start
    let first = addr(&image, BOOT_CODE);
    assert_eq!(code_class as u32, word_at(&image, first - 4));

    let stack_class = addr(&image, "org.jnode.vm.objects.VmSystemObject");
    let stack = addr(&image, INITIAL_STACK);
    assert_eq!(stack_class as u32, word_at(&image, stack - 4));
}

#[test]
fn glue_stores_registry_into_slot() {
    let image = link32(fixture(Word::W32)).unwrap();
    let entry = addr(&image, BOOT_CODE);
    let code = &image.contents()[(entry - BASE) as usize..];

    let slot = addr(&image, "org.jnode.boot.Main#pluginRegistry");
    let registry = addr(&image, "org.jnode.plugin.model.PluginRegistryModel");

    // mov edi, slot
    assert_eq!(0xBF, code[0]);
    assert_eq!(slot as u32, word_at(&image, entry + 1));

    // mov ebx, registry
    assert_eq!(0xBB, code[5]);
    assert_eq!(registry as u32, word_at(&image, entry + 6));

    // mov [edi+0], ebx
    assert_eq!(&[0x89, 0x9F, 0, 0, 0, 0], &code[10..16]);

    // slot is the first field of its class
    assert_eq!(addr(&image, "org.jnode.boot.Main"), slot);
}

#[test]
fn static_fields_published_only_for_full_depth() {
    let image = link32(fixture(Word::W32)).unwrap();

    let mgr = addr(&image, "org.jnode.vm.memmgr.def.DefaultHeapManager");
    assert_eq!(
        mgr + 4,
        addr(
            &image,
            "org.jnode.vm.memmgr.def.DefaultHeapManager#firstNormalHeap"
        )
    );

    assert_eq!(
        None,
        image.address_of("org.jnode.vm.scheduler.VmThread$initial#stack".intern())
    );
}

#[test]
fn initial_stack_carries_limit_and_end() {
    let image = link32(fixture(Word::W32)).unwrap();
    let stack = addr(&image, INITIAL_STACK);

    // 64 slots, overflow limit at 4 slots
    assert_eq!((stack + 16) as u32, word_at(&image, stack));
    assert_eq!((stack + 256) as u32, word_at(&image, stack + 4));
    assert_eq!(stack + 256, addr(&image, wellknown::USER_ESP));

    let record = image.objects().find(INITIAL_STACK.intern()).unwrap();
    assert_eq!(Some(256), record.body_size());
}

#[test]
fn markers_bound_to_heap_boundaries() {
    let image = link32(fixture(Word::W32)).unwrap();
    let end = BASE + image.len() as Addr;

    let start = addr(&image, wellknown::BOOT_HEAP_START);
    assert_eq!(0, start % global::PAGE_SIZE as Addr);
    assert!(start >= BASE + image.blob().end as Addr);
    assert!(start < addr(&image, INITIAL_STACK));

    assert_eq!(end, addr(&image, wellknown::FREE_MEMORY_START));
    assert_eq!(end, addr(&image, wellknown::BOOT_HEAP_END));
}

#[test]
fn well_known_methods_linked_to_descriptors() {
    let image = link32(fixture(Word::W32)).unwrap();

    assert_eq!(
        addr(&image, "org.jnode.vm.scheduler.VmProcessor#reschedule"),
        addr(&image, "VmProcessor_reschedule"),
    );
    assert_eq!(
        addr(&image, "org.jnode.vm.scheduler.VmProcessor$boot"),
        addr(&image, wellknown::CUR_PROCESSOR),
    );

    let vm_invoke = image
        .labels()
        .lookup(wellknown::VM_INVOKE.intern())
        .unwrap();
    assert_eq!(Some(LabelKind::Code), image.labels().kind(vm_invoke));
}

#[test]
fn missing_method_fails_naming_well_known_symbol() {
    let descs = fixture(Word::W32)
        .into_iter()
        .filter(|desc| {
            desc.name()
                != "org.jnode.vm.scheduler.VmProcessor#reschedule".intern()
        })
        .collect();

    match link32(descs) {
        Err(LinkError::Unresolved(names)) => {
            assert!(names.contains(&"VmProcessor_reschedule".intern()));
        }
        other => panic!("expected unresolved labels, got {other:?}"),
    }
}

#[test]
fn missing_thread_field_is_layout_error() {
    let thread = "org.jnode.vm.scheduler.VmThread$initial".intern();

    let descs = fixture(Word::W32)
        .into_iter()
        .map(|desc| {
            if desc.name() == thread {
                Descriptor::new(thread, DescriptorKind::Instance).with_field(
                    "stack".intern(),
                    FieldType::Word,
                    0,
                )
            } else {
                desc
            }
        })
        .collect();

    assert_eq!(
        Some(LayoutError::MissingField {
            descriptor: thread,
            field: "stackEnd".intern(),
        }),
        match link32(descs) {
            Err(LinkError::Layout(e)) => Some(e),
            _ => None,
        }
    );
}

#[test]
fn processor_stack_end_optional() {
    let processor = "org.jnode.vm.scheduler.VmProcessor$boot".intern();

    let descs = fixture(Word::W32)
        .into_iter()
        .map(|desc| {
            if desc.name() == processor {
                Descriptor::new(processor, DescriptorKind::Instance)
            } else {
                desc
            }
        })
        .collect();

    assert!(link32(descs).is_ok());
}

#[test]
fn static_initializers_called_through_vm_invoke() {
    let mut descs = fixture(Word::W32);
    descs.push(
        ty("org.example.Init")
            .with_eager(true)
            .with_clinit(true),
    );
    descs.push(Descriptor::new(
        "org.example.Init#<clinit>".intern(),
        DescriptorKind::Method,
    ));

    let image = link32(descs).unwrap();
    assert_eq!(&["org.example.Init".intern()], image.initializers());

    let caller = addr(&image, CLINIT_CALLER);
    let code = &image.contents()[(caller - BASE) as usize..];

    // mov eax, <clinit>
    assert_eq!(0xB8, code[0]);
    assert_eq!(
        addr(&image, "org.example.Init#<clinit>") as u32,
        word_at(&image, caller + 1)
    );

    // call vm_invoke; ret
    assert_eq!(0xE8, code[5]);
    let rel = word_at(&image, caller + 6) as i32 as i64;
    assert_eq!(
        addr(&image, wellknown::VM_INVOKE) as i64,
        (caller + 10) as i64 + rel
    );
    assert_eq!(0xC3, code[10]);
}

#[test]
fn missing_initializer_method_unresolved() {
    let mut descs = fixture(Word::W32);
    descs.push(
        ty("org.example.Init")
            .with_eager(true)
            .with_clinit(true),
    );

    match link32(descs) {
        Err(LinkError::Unresolved(names)) => {
            assert_eq!(vec!["org.example.Init#<clinit>".intern()], names);
        }
        other => panic!("expected unresolved labels, got {other:?}"),
    }
}

#[test]
fn load_address_mismatch() {
    let result = Sut::with_trace(config(Word::W32), VoidTrace)
        .link(&set(fixture(Word::W32)), &blob(Architecture::I386, 0x200000));

    assert!(matches!(
        result,
        Err(LinkError::AddressMismatch {
            found: 0x200000,
            expected: BASE
        })
    ));
}

#[test]
fn wrong_architecture_blob_rejected() {
    let result = Sut::with_trace(config(Word::W32), VoidTrace).link(
        &set(fixture(Word::W32)),
        &blob(Architecture::X86_64, BASE as u32),
    );

    assert!(matches!(result, Err(LinkError::BlobLoad(_))));
}

#[test]
fn inconsistent_config_rejected_before_emitting() {
    let bad = LinkConfig {
        stack_slots: 1,
        overflow_limit_slots: 0,
        ..config(Word::W32)
    };

    let result = Sut::with_trace(bad, VoidTrace)
        .link(&set(fixture(Word::W32)), &blob32());

    assert!(matches!(
        result,
        Err(LinkError::Config(ConfigError::StackGeometry {
            limit_slots: 0,
            stack_slots: 1,
        }))
    ));
}

/// A target that disagrees with the object layout about where execution
///   begins.
struct Skewed(X86);

impl Target for Skewed {
    fn name(&self) -> &'static str {
        "skewed"
    }

    fn word(&self) -> Word {
        self.0.word()
    }

    fn entry_offset(&self) -> usize {
        self.0.entry_offset() + 16
    }

    fn elf_architecture(&self) -> Architecture {
        self.0.elf_architecture()
    }

    fn emitter(&self) -> &dyn Emitter {
        self.0.emitter()
    }
}

#[test]
fn entry_offset_disagreement_fails() {
    let result = Sut::with_trace(config(Word::W32), VoidTrace)
        .with_target(Box::new(Skewed(X86::bits32())))
        .link(&set(fixture(Word::W32)), &blob32());

    match result {
        Err(LinkError::Layout(LayoutError::EntryOffset {
            computed,
            expected,
        })) => assert_eq!((16, 32), (computed, expected)),
        other => panic!("expected entry offset error, got {other:?}"),
    }
}

#[test]
fn links_64_bit_image() {
    let image = Sut::with_trace(config(Word::W64), VoidTrace)
        .link(
            &set(fixture(Word::W64)),
            &blob(Architecture::X86_64, BASE as u32),
        )
        .unwrap();

    let first = image.objects().iter().next().unwrap();
    assert_eq!(24, first.start());

    let stack = addr(&image, INITIAL_STACK);
    assert_eq!(stack + 64 * 8, addr(&image, wellknown::USER_ESP));
}

#[test]
fn identical_inputs_produce_identical_images() {
    let a = link32(fixture(Word::W32)).unwrap().into_bytes();
    let b = link32(fixture(Word::W32)).unwrap().into_bytes();

    assert_eq!(a, b);
}
