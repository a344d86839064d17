// x86 target
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

//! The x86 target in 32-bit (i386) and 64-bit (x86-64) modes.
//!
//! Only the encodings needed by boot glue are provided.
//! Memory operands always use a 32-bit displacement
//!   (`mod = 10`),
//!     which is valid for every base register except the stack pointer;
//!   no [`Reg`] role maps to the stack pointer.

use super::{Emitter, Operand, Reg, Target};
use crate::{
    global,
    img::{object_align, ImageBuf, Word},
    ld::{LabelId, LabelTable, LinkResult, PatchSite},
};

/// Entry offset for 32-bit mode.
pub const ENTRY_OFFSET32: usize = object_align((global::HEADER_SLOTS + 1) * 4);

/// Entry offset for 64-bit mode.
pub const ENTRY_OFFSET64: usize = object_align((global::HEADER_SLOTS + 1) * 8);

const_assert_eq!(ENTRY_OFFSET32, 16);
const_assert_eq!(ENTRY_OFFSET64, 24);

const REX_W: u8 = 0x48;
const OP_MOV_IMM: u8 = 0xB8;
const OP_MOV_STORE: u8 = 0x89;
const OP_LEA: u8 = 0x8D;
const OP_CALL_REL32: u8 = 0xE8;
const OP_RET: u8 = 0xC3;
const MOD_DISP32: u8 = 0b10;

/// General-purpose register numbers as encoded in ModR/M.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum X86Reg {
    Ax = 0,
    Cx = 1,
    Dx = 2,
    Bx = 3,
    Sp = 4,
    Bp = 5,
    Si = 6,
    Di = 7,
}

impl From<Reg> for X86Reg {
    fn from(reg: Reg) -> Self {
        match reg {
            Reg::Arg0 => Self::Ax,
            Reg::Base => Self::Di,
            Reg::Value => Self::Bx,
        }
    }
}

fn modrm(md: u8, reg: X86Reg, rm: X86Reg) -> u8 {
    (md << 6) | ((reg as u8) << 3) | (rm as u8)
}

/// The x86 target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct X86 {
    word: Word,
}

impl X86 {
    pub fn new(word: Word) -> Self {
        Self { word }
    }

    pub fn bits32() -> Self {
        Self::new(Word::W32)
    }

    pub fn bits64() -> Self {
        Self::new(Word::W64)
    }

    fn rex_w(&self, buf: &mut ImageBuf) -> LinkResult<()> {
        if self.word == Word::W64 {
            buf.write8(REX_W)?;
        }

        Ok(())
    }

    /// `op r, [base + disp32]` or `op [base + disp32], r`.
    fn mem_op(
        &self,
        buf: &mut ImageBuf,
        op: u8,
        reg: X86Reg,
        base: X86Reg,
        disp: i32,
    ) -> LinkResult<()> {
        debug_assert_ne!(base, X86Reg::Sp, "SP base requires SIB");

        self.rex_w(buf)?;
        buf.write(&[op, modrm(MOD_DISP32, reg, base)])?;
        buf.write32(disp as u32)?;

        Ok(())
    }
}

impl Emitter for X86 {
    fn mov(
        &self,
        buf: &mut ImageBuf,
        labels: &mut LabelTable,
        dst: Reg,
        src: Operand,
    ) -> LinkResult<()> {
        let dst = X86Reg::from(dst);

        self.rex_w(buf)?;
        buf.write8(OP_MOV_IMM + dst as u8)?;

        match src {
            Operand::Imm(value) => {
                buf.write_word(value)?;
            }
            Operand::Label(id) => {
                let site = buf.write_word(0)?;
                labels.reference(buf, id, PatchSite::word(self.word, site))?;
            }
        }

        Ok(())
    }

    fn store(
        &self,
        buf: &mut ImageBuf,
        base: Reg,
        disp: i32,
        src: Reg,
    ) -> LinkResult<()> {
        self.mem_op(buf, OP_MOV_STORE, src.into(), base.into(), disp)
    }

    fn lea(
        &self,
        buf: &mut ImageBuf,
        dst: Reg,
        base: Reg,
        disp: i32,
    ) -> LinkResult<()> {
        self.mem_op(buf, OP_LEA, dst.into(), base.into(), disp)
    }

    fn call(
        &self,
        buf: &mut ImageBuf,
        labels: &mut LabelTable,
        target: LabelId,
    ) -> LinkResult<()> {
        buf.write8(OP_CALL_REL32)?;
        let site = buf.write32(0)?;

        // displacement is relative to the end of the instruction
        labels.reference(buf, target, PatchSite::rel32(site, -4))
    }

    fn ret(&self, buf: &mut ImageBuf) -> LinkResult<()> {
        buf.write8(OP_RET)?;

        Ok(())
    }
}

impl Target for X86 {
    fn name(&self) -> &'static str {
        match self.word {
            Word::W32 => "i386",
            Word::W64 => "x86_64",
        }
    }

    fn word(&self) -> Word {
        self.word
    }

    fn entry_offset(&self) -> usize {
        match self.word {
            Word::W32 => ENTRY_OFFSET32,
            Word::W64 => ENTRY_OFFSET64,
        }
    }

    fn elf_architecture(&self) -> object::Architecture {
        match self.word {
            Word::W32 => object::Architecture::I386,
            Word::W64 => object::Architecture::X86_64,
        }
    }

    fn emitter(&self) -> &dyn Emitter {
        self
    }
}
