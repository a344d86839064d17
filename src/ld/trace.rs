// Boot image link tracing
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

//! Tracing for boot image links.
//!
//! This provides human-readable traces on standard error as the
//!   [`ImageLinker`](super::ImageLinker) proceeds through each step of a
//!   link.
//! These traces are provided automatically when `cfg(test)`,
//!   which means that they are automatically included in the output of any
//!   test failure.
//!
//! Outside of tests,
//!   this can be enabled at configuration-time using the
//!   `ld-trace-stderr` feature flag.
//!
//! _These traces are not meant to be machine-readable!_
//! Do not try to use the human-readable traces in that way since the format
//!   is subject to change without notice;
//!     use the [listing](super::list) instead.

use crate::{
    global::Addr,
    img::{ImageBuf, ObjectRecord},
    obj::BlobSummary,
};
use std::fmt::{self, Display};

/// A step of the link,
///   in the order in which steps are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStep {
    Begin,
    Glue,
    Blob,
    BootHeap,
    RuntimeObjects,
    BootClassSet,
    Initializers,
    ImageEnd,
    WellKnown,
    Finalize,
    Header,
}

impl Display for LinkStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use LinkStep::*;

        match self {
            Begin => write!(f, "begin image"),
            Glue => write!(f, "emit initialization glue"),
            Blob => write!(f, "load native blob"),
            BootHeap => write!(f, "begin boot heap"),
            RuntimeObjects => write!(f, "emit runtime objects"),
            BootClassSet => write!(f, "serialize boot class set"),
            Initializers => write!(f, "emit static initializer caller"),
            ImageEnd => write!(f, "end image"),
            WellKnown => write!(f, "link well-known symbols"),
            Finalize => write!(f, "finalize labels"),
            Header => write!(f, "patch multiboot header"),
        }
    }
}

pub trait LinkTrace: Default {
    /// Output a trace upon beginning `step`.
    ///
    /// There is no means to return an error and a failure to output the
    ///   trace should not interrupt the link.
    fn trace_step(&mut self, step: LinkStep, buf: &ImageBuf);

    /// Output a trace for an object that has just been closed.
    fn trace_object(&mut self, record: &ObjectRecord, base: Addr);

    /// Output a trace for a native blob that has just been loaded.
    fn trace_blob(&mut self, summary: &BlobSummary);

    /// Output a trace for the number of static initializers to be
    ///   called at boot.
    fn trace_initializers(&mut self, count: usize);
}

/// Perform no tracing.
///
/// This should be used by default for non-test builds.
#[derive(Debug, PartialEq, Default)]
pub struct VoidTrace;

impl LinkTrace for VoidTrace {
    fn trace_step(&mut self, _step: LinkStep, _buf: &ImageBuf) {
        // Do nothing at all.
    }

    fn trace_object(&mut self, _record: &ObjectRecord, _base: Addr) {
        // Do nothing at all.
    }

    fn trace_blob(&mut self, _summary: &BlobSummary) {
        // Do nothing at all.
    }

    fn trace_initializers(&mut self, _count: usize) {
        // Do nothing at all.
    }
}

/// Human-readable [`LinkTrace`].
///
/// See [module-level](self) documentation for more information.
#[derive(Debug, PartialEq, Default)]
pub struct HumanReadableTrace;

impl HumanReadableTrace {
    fn note() {
        #[allow(unused_variables)]
        let cfg = ""; // so that this compiles without matching cfg
        #[cfg(feature = "ld-trace-stderr")]
        #[allow(unused_variables)]
        let cfg = "feature = \"ld-trace-stderr\"";
        #[cfg(test)] // takes precedence if both are set
        let cfg = "test";
        eprint!(
            "= note: this trace was output as a debugging aid \
                because `cfg({cfg})`.\n\n",
        );
    }
}

impl LinkTrace for HumanReadableTrace {
    fn trace_step(&mut self, step: LinkStep, buf: &ImageBuf) {
        eprint!(
            "\
[ImageLinker] {step}
| ==> cursor at offset {len:#x} (address {addr:#010x})
|  |  {step:?}\n",
            len = buf.len(),
            addr = buf.cursor_addr(),
        );

        Self::note();
    }

    fn trace_object(&mut self, record: &ObjectRecord, base: Addr) {
        eprint!(
            "\
[ImageLinker] object `{name}`
| ==> at {addr:#010x}, header {hdr} byte(s), body {body} byte(s)
|  |  {record:?}\n",
            name = record.name(),
            addr = record.address(base),
            hdr = record.header_size(),
            body = record.body_size().unwrap_or(0),
        );

        Self::note();
    }

    fn trace_blob(&mut self, summary: &BlobSummary) {
        eprint!(
            "\
[ImageLinker] native blob
| ==> {sections} section(s), {relocs} relocation(s), \
{ext} external reference(s), {exp} export(s)
|  |  {summary:?}\n",
            sections = summary.sections,
            relocs = summary.relocations,
            ext = summary.externals,
            exp = summary.exports,
        );

        Self::note();
    }

    fn trace_initializers(&mut self, count: usize) {
        eprint!(
            "\
[ImageLinker] static initializers
| ==> {count} initializer(s) to be called at boot\n",
        );

        Self::note();
    }
}

/// Trace used by [`ImageLinker`](super::ImageLinker) unless otherwise
///   specified.
#[cfg(any(test, feature = "ld-trace-stderr"))]
pub type DefaultTrace = HumanReadableTrace;

/// Trace used by [`ImageLinker`](super::ImageLinker) unless otherwise
///   specified.
#[cfg(not(any(test, feature = "ld-trace-stderr")))]
pub type DefaultTrace = VoidTrace;
