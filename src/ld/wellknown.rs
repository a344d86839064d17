// Well-known symbols
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

//! Labels that the native blob and the runtime depend on by name.
//!
//! Native code cannot name a method descriptor directly,
//!   so it refers instead to a short well-known label
//!   (e.g. `VmProcessor_reschedule`),
//!     which the linker [links](super::LabelTable::link) to the
//!     descriptor that implements it.
//! Every well-known label is declared at the start of a link and so must
//!   be resolved by its end,
//!     even if nothing in the blob happens to refer to it.

/// How a well-known label receives its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Exported by the native blob.
    Blob,

    /// The method descriptor of the given name
    ///   (`<class>#<method>`).
    Method(&'static str),

    /// The processor descriptor named by the link configuration.
    Processor,

    /// An address computed by the linker while laying out the image.
    Marker,
}

/// A well-known label and its binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnown {
    pub name: &'static str,
    pub binding: Binding,
}

const fn wk(name: &'static str, binding: Binding) -> WellKnown {
    WellKnown { name, binding }
}

/// Low-level invocation trampoline.
pub const VM_INVOKE: &str = "vm_invoke";

/// Initial stack pointer.
pub const USER_ESP: &str = "Luser_esp";

/// First byte of free memory following the image.
pub const FREE_MEMORY_START: &str = "freeMemoryStart";

/// Start of the region holding the runtime objects and boot class set.
pub const BOOT_HEAP_START: &str = "bootHeapStart";

/// End of the boot heap region.
pub const BOOT_HEAP_END: &str = "bootHeapEnd";

/// Processor of the boot thread.
pub const CUR_PROCESSOR: &str = "vmCurProcessor";

use Binding::*;

/// Every well-known label.
pub const WELL_KNOWN: &[WellKnown] = &[
    wk(VM_INVOKE, Blob),
    wk(
        "VmType_compile",
        Method("org.jnode.vm.classmgr.VmType#compile"),
    ),
    wk(
        "VmMethod_recompile",
        Method("org.jnode.vm.classmgr.VmMethod#recompile"),
    ),
    wk(
        "VmMethod_recordInvoke",
        Method("org.jnode.vm.classmgr.VmMethod#recordInvoke"),
    ),
    wk(
        "VmType_initialize",
        Method("org.jnode.vm.classmgr.VmType#initialize"),
    ),
    wk(
        "vm_findThrowableHandler",
        Method("org.jnode.vm.VmSystem#findThrowableHandler"),
    ),
    wk(
        "VmSystem_currentTimeMillis",
        Method("org.jnode.vm.VmSystem#currentTimeMillis"),
    ),
    wk(
        "VmProcessor_reschedule",
        Method("org.jnode.vm.scheduler.VmProcessor#reschedule"),
    ),
    wk(
        "SoftByteCodes_allocArray",
        Method("org.jnode.vm.SoftByteCodes#allocArray"),
    ),
    wk(
        "SoftByteCodes_allocMultiArray",
        Method("org.jnode.vm.SoftByteCodes#allocMultiArray"),
    ),
    wk(
        "SoftByteCodes_allocObject",
        Method("org.jnode.vm.SoftByteCodes#allocObject"),
    ),
    wk(
        "SoftByteCodes_anewarray",
        Method("org.jnode.vm.SoftByteCodes#anewarray"),
    ),
    wk(
        "SoftByteCodes_resolveClass",
        Method("org.jnode.vm.SoftByteCodes#resolveClass"),
    ),
    wk(
        "SoftByteCodes_resolveField",
        Method("org.jnode.vm.SoftByteCodes#resolveField"),
    ),
    wk(
        "SoftByteCodes_resolveMethod",
        Method("org.jnode.vm.SoftByteCodes#resolveMethod"),
    ),
    wk(
        "SoftByteCodes_unknownOpcode",
        Method("org.jnode.vm.SoftByteCodes#unknownOpcode"),
    ),
    // raised on behalf of the current thread
    wk(
        "SoftByteCodes_systemException",
        Method("org.jnode.vm.scheduler.VmThread#systemException"),
    ),
    wk(
        "VmThread_runThread",
        Method("org.jnode.vm.scheduler.VmThread#runThread"),
    ),
    wk(CUR_PROCESSOR, Processor),
    wk(USER_ESP, Marker),
    wk(FREE_MEMORY_START, Marker),
    wk(BOOT_HEAP_START, Marker),
    wk(BOOT_HEAP_END, Marker),
    wk(
        "MonitorManager_monitorEnter",
        Method("org.jnode.vm.scheduler.MonitorManager#monitorEnter"),
    ),
    wk(
        "MonitorManager_monitorExit",
        Method("org.jnode.vm.scheduler.MonitorManager#monitorExit"),
    ),
    wk("MathSupport_ldiv", Method("org.jnode.vm.MathSupport#ldiv")),
    wk("MathSupport_lrem", Method("org.jnode.vm.MathSupport#lrem")),
];
