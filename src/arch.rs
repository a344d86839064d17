// Target architectures
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

//! Target architectures and machine code emission.
//!
//! The [image linker](crate::ld::ImageLinker) is architecture-neutral;
//!   everything that depends on the instruction set or the width of an
//!   address is reached through [`Target`].
//!
//! The glue code that the linker writes into the first object of the
//!   image needs only a handful of instructions,
//!     provided by [`Emitter`].
//! Registers are named by their _role_ ([`Reg`]) rather than by their
//!   machine name so that the glue can be written once for every target.

pub mod x86;

use crate::{
    global::Addr,
    img::{ImageBuf, Word},
    ld::{LabelId, LabelTable, LinkResult},
};

pub use x86::X86;

/// A register by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    /// First argument of a call into the runtime.
    Arg0,
    /// Base address register for stores.
    Base,
    /// Value register for stores.
    Value,
}

/// Source of a value loaded into a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A constant.
    Imm(u64),

    /// The address of a label,
    ///   which need not be resolved yet.
    Label(LabelId),
}

impl From<LabelId> for Operand {
    fn from(id: LabelId) -> Self {
        Self::Label(id)
    }
}

/// Emission of the instructions used by boot glue code.
///
/// Every method appends to `buf` at its cursor.
/// References to unresolved labels are recorded in `labels` and patched
///   once the label is resolved.
pub trait Emitter {
    /// Load `src` into `dst`.
    fn mov(
        &self,
        buf: &mut ImageBuf,
        labels: &mut LabelTable,
        dst: Reg,
        src: Operand,
    ) -> LinkResult<()>;

    /// Store the word in `src` at `[base + disp]`.
    fn store(
        &self,
        buf: &mut ImageBuf,
        base: Reg,
        disp: i32,
        src: Reg,
    ) -> LinkResult<()>;

    /// Load the effective address `base + disp` into `dst`.
    fn lea(
        &self,
        buf: &mut ImageBuf,
        dst: Reg,
        base: Reg,
        disp: i32,
    ) -> LinkResult<()>;

    /// Call the code at `target`.
    fn call(
        &self,
        buf: &mut ImageBuf,
        labels: &mut LabelTable,
        target: LabelId,
    ) -> LinkResult<()>;

    /// Return from the current call.
    fn ret(&self, buf: &mut ImageBuf) -> LinkResult<()>;
}

/// A target architecture.
pub trait Target {
    /// Human-readable name of the target,
    ///   used in traces and listings.
    fn name(&self) -> &'static str;

    /// Size of an address-sized slot.
    fn word(&self) -> Word;

    /// Offset from the start of the image at which execution enters the
    ///   first object.
    ///
    /// The header of the first object must be exactly this size.
    fn entry_offset(&self) -> usize;

    /// Machine that the native blob must have been assembled for.
    fn elf_architecture(&self) -> object::Architecture;

    /// Instruction emitter for this target.
    fn emitter(&self) -> &dyn Emitter;

    /// Whether `addr` can be addressed by this target.
    fn addressable(&self, addr: Addr) -> bool {
        self.word().fits(addr)
    }
}
