// Boot image link configuration
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

//! Configuration of a boot image link.
//!
//! Defaults for numeric parameters live in [`global`];
//!   the descriptor names used by the initialization glue default to
//!   those of the JNode runtime.

use super::{
    header::VbeMode,
    init::{DeclarationOrder, DependencyOrder, InitializerOrder},
};
use crate::{
    arch::{Target, X86},
    global::{self, Addr},
    img::Word,
    sym::{GlobalSymbolIntern, SymbolId},
};
use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// Static initializer ordering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitOrderKind {
    /// See [`DeclarationOrder`].
    #[default]
    Declaration,
    /// See [`DependencyOrder`].
    Dependency,
}

impl InitOrderKind {
    pub fn policy(self) -> Box<dyn InitializerOrder> {
        match self {
            Self::Declaration => Box::new(DeclarationOrder),
            Self::Dependency => Box::new(DependencyOrder),
        }
    }
}

impl FromStr for InitOrderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decl" => Ok(Self::Declaration),
            "deps" => Ok(Self::Dependency),
            _ => Err(format!(
                "invalid initializer order `{s}`; expected `decl` or `deps`"
            )),
        }
    }
}

impl Display for InitOrderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Declaration => write!(f, "decl"),
            Self::Dependency => write!(f, "deps"),
        }
    }
}

/// Names of the descriptors and slots that the linker writes to or
///   refers to while emitting initialization glue and runtime objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlueNames {
    /// Class of objects holding machine code.
    pub code_class: SymbolId,
    /// Plugin registry descriptor.
    pub registry: SymbolId,
    /// Static slot receiving the plugin registry (`<class>#<field>`).
    pub registry_slot: SymbolId,
    /// Static slot receiving the boot heap object.
    pub boot_heap_slot: SymbolId,
    /// Static slot receiving the default heap object.
    pub heap_slot: SymbolId,
    pub boot_heap_class: SymbolId,
    pub heap_class: SymbolId,
    /// Class of the initial stack object.
    pub stack_class: SymbolId,
    /// Thread that runs the entry point.
    pub initial_thread: SymbolId,
    /// Field of the initial thread receiving the low stack address.
    pub thread_stack: SymbolId,
    /// Field of the initial thread receiving the stack overflow limit.
    pub thread_stack_end: SymbolId,
    /// Processor of the initial thread.
    pub processor: SymbolId,
    /// Field of the processor receiving the stack overflow limit,
    ///   if the processor descriptor declares it.
    pub processor_stack_end: SymbolId,
    /// Entry point method.
    pub main: SymbolId,
    /// Name of the static initializer method of a type.
    pub clinit: SymbolId,
}

impl Default for GlueNames {
    fn default() -> Self {
        Self {
            code_class: "org.jnode.vm.classmgr.VmMethodCode".intern(),
            registry: "org.jnode.plugin.model.PluginRegistryModel".intern(),
            registry_slot: "org.jnode.boot.Main#pluginRegistry".intern(),
            boot_heap_slot: "org.jnode.vm.memmgr.def.DefaultHeapManager#bootHeap"
                .intern(),
            heap_slot: "org.jnode.vm.memmgr.def.DefaultHeapManager#firstNormalHeap"
                .intern(),
            boot_heap_class: "org.jnode.vm.memmgr.def.VmBootHeap".intern(),
            heap_class: "org.jnode.vm.memmgr.def.VmDefaultHeap".intern(),
            stack_class: "org.jnode.vm.objects.VmSystemObject".intern(),
            initial_thread: "org.jnode.vm.scheduler.VmThread$initial".intern(),
            thread_stack: "stack".intern(),
            thread_stack_end: "stackEnd".intern(),
            processor: "org.jnode.vm.scheduler.VmProcessor$boot".intern(),
            processor_stack_end: "stackEnd".intern(),
            main: "org.jnode.boot.Main#vmMain".intern(),
            clinit: "<clinit>".intern(),
        }
    }
}

/// Configuration of a single link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub word: Word,
    /// Physical load address of the image.
    pub base: Addr,
    pub initial_capacity: usize,
    pub max_capacity: usize,
    /// Size of the initial stack in words.
    pub stack_slots: usize,
    /// Distance of the stack overflow limit from the low end of the
    ///   stack,
    ///     in words.
    pub overflow_limit_slots: usize,
    pub boot_heap_size: usize,
    pub heap_size: usize,
    pub vbe: VbeMode,
    pub init_order: InitOrderKind,
    pub names: GlueNames,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            word: Word::W32,
            base: global::LOAD_ADDR,
            initial_capacity: global::INITIAL_IMAGE_SIZE,
            max_capacity: global::MAX_IMAGE_SIZE,
            stack_slots: global::DEFAULT_STACK_SLOTS,
            overflow_limit_slots: global::STACK_OVERFLOW_LIMIT_SLOTS,
            boot_heap_size: global::DEFAULT_BOOT_HEAP_SIZE,
            heap_size: global::DEFAULT_HEAP_SIZE,
            vbe: VbeMode::default(),
            init_order: InitOrderKind::default(),
            names: GlueNames::default(),
        }
    }
}

impl LinkConfig {
    /// Target selected by [`LinkConfig::word`].
    pub fn target(&self) -> X86 {
        X86::new(self.word)
    }

    /// Size of the initial stack in bytes.
    pub fn stack_size(&self) -> usize {
        self.stack_slots * self.word.bytes()
    }

    /// Offset of the stack overflow limit from the low end of the stack,
    ///   in bytes.
    pub fn overflow_limit(&self) -> usize {
        self.overflow_limit_slots * self.word.bytes()
    }

    /// Verify that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target().addressable(self.base) {
            return Err(ConfigError::Unaddressable {
                base: self.base,
                bits: self.word.bits(),
            });
        }

        if self.base % global::PAGE_SIZE as u64 != 0 {
            return Err(ConfigError::UnalignedBase(self.base));
        }

        if self.initial_capacity > self.max_capacity {
            return Err(ConfigError::Capacity {
                initial: self.initial_capacity,
                max: self.max_capacity,
            });
        }

        // the two marker words must fit below the overflow limit
        if self.overflow_limit_slots < 2
            || self.overflow_limit_slots >= self.stack_slots
        {
            return Err(ConfigError::StackGeometry {
                limit_slots: self.overflow_limit_slots,
                stack_slots: self.stack_slots,
            });
        }

        Ok(())
    }
}

/// A [`LinkConfig`] whose parameters are inconsistent with one another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The base address cannot be expressed in a target word.
    Unaddressable { base: Addr, bits: u32 },

    /// The base address does not lie on a page boundary.
    UnalignedBase(Addr),

    /// The initial buffer capacity exceeds the maximum.
    Capacity { initial: usize, max: usize },

    /// The stack overflow limit does not leave room for the stack
    ///   markers or lies beyond the end of the stack.
    StackGeometry {
        limit_slots: usize,
        stack_slots: usize,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unaddressable { base, bits } => write!(
                f,
                "base address {base:#x} is not addressable by a {bits}-bit \
                    target"
            ),
            Self::UnalignedBase(base) => {
                write!(f, "base address {base:#x} is not page-aligned")
            }
            Self::Capacity { initial, max } => write!(
                f,
                "initial capacity {initial} exceeds maximum capacity {max}"
            ),
            Self::StackGeometry {
                limit_slots,
                stack_slots,
            } => write!(
                f,
                "stack overflow limit of {limit_slots} slot(s) must lie \
                    within a stack of {stack_slots} slot(s)"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(Ok(()), LinkConfig::default().validate());
    }

    #[test]
    fn default_stack_geometry() {
        let sut = LinkConfig::default();

        assert_eq!(16 * 1024 * 4, sut.stack_size());
        assert_eq!(256 * 4, sut.overflow_limit());

        let wide = LinkConfig {
            word: Word::W64,
            ..sut
        };

        assert_eq!(16 * 1024 * 8, wide.stack_size());
    }

    #[test]
    fn unaligned_base_rejected() {
        let sut = LinkConfig {
            base: 0x100010,
            ..Default::default()
        };

        assert_eq!(Err(ConfigError::UnalignedBase(0x100010)), sut.validate());
    }

    #[test]
    fn base_beyond_32_bits_rejected_only_for_32_bit() {
        let sut = LinkConfig {
            base: 0x1_0000_0000,
            ..Default::default()
        };

        assert!(sut.validate().is_err());

        let wide = LinkConfig {
            word: Word::W64,
            ..sut
        };

        assert_eq!(Ok(()), wide.validate());
    }

    #[test]
    fn overflow_limit_within_stack() {
        let sut = LinkConfig {
            stack_slots: 64,
            overflow_limit_slots: 64,
            ..Default::default()
        };

        assert_eq!(
            Err(ConfigError::StackGeometry {
                limit_slots: 64,
                stack_slots: 64,
            }),
            sut.validate(),
        );
    }

    #[test]
    fn init_order_parse() {
        assert_eq!(Ok(InitOrderKind::Declaration), "decl".parse());
        assert_eq!(Ok(InitOrderKind::Dependency), "deps".parse());
        assert!("topo".parse::<InitOrderKind>().is_err());
    }
}
