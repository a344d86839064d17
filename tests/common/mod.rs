// Shared fixtures for bootld integration tests
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

// not every test crate uses every fixture
#![allow(dead_code)]

use bootld::ld::wellknown::{Binding, WELL_KNOWN};
use object::{
    write::{self, Object as WriteObject},
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags,
    SymbolKind, SymbolScope,
};
use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicUsize, Ordering},
};

pub const BASE: u64 = 0x0010_0000;

pub const MULTIBOOT_MAGIC: u32 = 0x1BAD_B002;

/// 32-bit kernel blob with a multiboot header declaring `load_addr`,
///   followed by a `ret` exported as `vm_invoke`.
pub fn kernel(load_addr: u32) -> Vec<u8> {
    kernel_with_magic(MULTIBOOT_MAGIC, load_addr)
}

pub fn kernel_with_magic(magic: u32, load_addr: u32) -> Vec<u8> {
    let mut text = Vec::new();
    text.extend(magic.to_le_bytes());
    text.extend(0x0001_0003u32.to_le_bytes()); // flags
    text.extend(magic.wrapping_add(0x0001_0003).wrapping_neg().to_le_bytes());
    text.extend(0u32.to_le_bytes()); // header_addr
    text.extend(load_addr.to_le_bytes());
    text.resize(48, 0);
    text.push(0xC3);

    let mut obj = WriteObject::new(
        BinaryFormat::Elf,
        Architecture::I386,
        Endianness::Little,
    );
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

    obj.write().expect("failed to write kernel fixture")
}

/// Boot manifest satisfying the boot glue and every well-known symbol,
///   less any descriptor named in `omit`.
pub fn manifest(omit: &[&str]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0"?>
<boot-classes>
  <descriptor name="org.jnode.vm.classmgr.VmMethodCode" kind="type"/>
  <descriptor name="org.jnode.vm.objects.VmSystemObject" kind="type"/>
  <descriptor name="org.jnode.vm.memmgr.def.VmBootHeap" kind="type"/>
  <descriptor name="org.jnode.vm.memmgr.def.VmDefaultHeap" kind="type"/>
  <descriptor name="org.jnode.vm.classmgr.VmNormalClass" kind="type"/>
  <descriptor name="org.jnode.plugin.model.PluginRegistryModel"
              kind="instance" class="org.jnode.vm.classmgr.VmNormalClass"
              size="8">
    <field name="flags" type="u32" offset="0" value="0x1"/>
    <field name="tag" type="bytes" offset="4" value="cafe" len="4"/>
  </descriptor>
  <descriptor name="org.jnode.boot.Main" kind="statics" depth="full">
    <field name="pluginRegistry" type="ref" offset="0"/>
  </descriptor>
  <descriptor name="org.jnode.vm.memmgr.def.DefaultHeapManager"
              kind="statics" depth="full">
    <field name="bootHeap" type="ref" offset="0"/>
    <field name="firstNormalHeap" type="ref" offset="4"/>
  </descriptor>
  <descriptor name="org.jnode.vm.scheduler.VmThread$initial" kind="instance">
    <field name="stack" type="word" offset="0"/>
    <field name="stackEnd" type="word" offset="4"/>
    <field name="processor" type="ref" offset="8"
           value="org.jnode.vm.scheduler.VmProcessor$boot"/>
  </descriptor>
  <descriptor name="org.jnode.vm.scheduler.VmProcessor$boot" kind="instance">
    <field name="stackEnd" type="word" offset="0"/>
  </descriptor>
  <descriptor name="org.jnode.boot.Main#vmMain" kind="method"/>
"#,
    );

    for wk in WELL_KNOWN {
        if let Binding::Method(method) = wk.binding {
            if !omit.contains(&method) {
                xml.push_str(&format!(
                    "  <descriptor name=\"{method}\" kind=\"method\"/>\n"
                ));
            }
        }
    }

    xml.push_str("</boot-classes>\n");
    xml
}

/// Scratch directory removed when dropped.
pub struct Scratch(PathBuf);

impl Scratch {
    pub fn new(name: &str) -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);

        let mut path = env::temp_dir();
        path.push(format!(
            "bootld-{name}-{}-{}",
            process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed),
        ));

        fs::create_dir_all(&path).expect("failed to create scratch dir");
        Self(path)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }

    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("failed to write scratch file");
        path
    }

    pub fn dir(&self) -> &Path {
        &self.0
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}
