// Boot image linker
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

//! Assembly of a complete boot image.
//!
//! An [`ImageLinker`] performs a single link in one linear pass:
//!
//! ```text
//!   [$$bootCode: header | glue] [native blob] <page>
//!   [$$initialStack] [$$bootHeap] [$$heap]
//!   [boot class set ...] [$$clInitCaller] [$$imageEnd] <page>
//! ```
//!
//! The boot loader jumps to the first byte following the header of the
//!   first object,
//!     which holds glue that wires up the runtime before entering it.
//! Everything after the native blob constitutes the boot heap.
//!
//! Addresses are never known ahead of time;
//!   every reference goes through the [`LabelTable`] and is patched once
//!   its label is resolved.
//! Any error aborts the link.

use super::{
    config::LinkConfig,
    header::patch_header,
    init::InitializerOrder,
    label::{LabelKind, LabelTable, PatchSite},
    list::write_listing,
    trace::{DefaultTrace, LinkStep, LinkTrace},
    wellknown::{self, Binding, WELL_KNOWN},
    LayoutError, LinkResult,
};
use crate::{
    arch::{Reg, Target},
    boot::{BootClassSet, Depth, LayoutEncoder, ObjectEncoder},
    fs,
    global::{self, Addr},
    img::{
        ImageBuf, ImageError, ObjectHandle, ObjectLayout, ObjectRecorder, Word,
    },
    obj::{load_blob, BlobSummary},
    sym::{GlobalSymbolIntern, SymbolId},
};
use std::{io::Write, path::Path};

/// Object holding the boot glue;
///   always the first object in the image.
pub const BOOT_CODE: &str = "$$bootCode";

/// Stack of the initial thread.
pub const INITIAL_STACK: &str = "$$initialStack";

pub const BOOT_HEAP: &str = "$$bootHeap";

pub const HEAP: &str = "$$heap";

/// Code calling each static initializer to be run at boot.
pub const CLINIT_CALLER: &str = "$$clInitCaller";

/// Terminal object padding the image to a page boundary.
pub const IMAGE_END: &str = "$$imageEnd";

/// Links a boot class set and a native blob into a boot image.
///
/// An `ImageLinker` performs exactly one link;
///   see [`ImageLinker::link`].
pub struct ImageLinker<T: LinkTrace = DefaultTrace> {
    config: LinkConfig,
    target: Box<dyn Target>,
    encoder: Box<dyn ObjectEncoder>,
    order: Box<dyn InitializerOrder>,
    trace: T,
}

impl ImageLinker {
    /// Prepare a link using the target,
    ///   initializer order,
    ///   and descriptor names of `config`,
    ///     encoding objects with [`LayoutEncoder`].
    pub fn new(config: LinkConfig) -> Self {
        Self::with_trace(config, DefaultTrace::default())
    }
}

impl<T: LinkTrace> ImageLinker<T> {
    /// Like [`ImageLinker::new`],
    ///   but reporting progress to `trace`.
    pub fn with_trace(config: LinkConfig, trace: T) -> Self {
        Self {
            target: Box::new(config.target()),
            order: config.init_order.policy(),
            encoder: Box::new(LayoutEncoder),
            trace,
            config,
        }
    }

    /// Replace the target architecture.
    ///
    /// The word size of the configuration follows that of the target.
    pub fn with_target(mut self, target: Box<dyn Target>) -> Self {
        self.config.word = target.word();
        self.target = target;
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn ObjectEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_order(mut self, order: Box<dyn InitializerOrder>) -> Self {
        self.order = order;
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Link `set` and the ELF relocatable object `blob` into a boot image.
    ///
    /// The configuration is [validated](LinkConfig::validate) before
    ///   anything is emitted.
    ///
    /// Nothing is written to disk;
    ///   see [`LinkedImage::write`].
    pub fn link(
        self,
        set: &BootClassSet,
        blob: &[u8],
    ) -> LinkResult<LinkedImage> {
        let Self {
            config,
            target,
            encoder,
            order,
            mut trace,
        } = self;

        config.validate()?;

        let word = target.word();

        let mut session = Session {
            config: &config,
            target: target.as_ref(),
            encoder: encoder.as_ref(),
            trace: &mut trace,
            buf: ImageBuf::new(
                config.base,
                word,
                config.initial_capacity,
                config.max_capacity,
            ),
            labels: LabelTable::new(),
            objects: ObjectRecorder::new(ObjectLayout::new(word)),
        };

        session.begin();
        session.boot_code(set)?;
        let blob = session.blob(blob)?;
        session.boot_heap()?;
        session.runtime_objects()?;
        session.boot_class_set(set)?;

        let initializers = order.order(set)?;
        session.clinit_caller(&initializers)?;
        session.image_end()?;
        session.well_known()?;
        session.finalize()?;
        let header = session.header()?;

        let Session {
            buf,
            labels,
            objects,
            ..
        } = session;

        Ok(LinkedImage {
            buf,
            labels,
            objects,
            blob,
            initializers,
            header,
        })
    }
}

/// State of a link in progress.
struct Session<'l, T: LinkTrace> {
    config: &'l LinkConfig,
    target: &'l dyn Target,
    encoder: &'l dyn ObjectEncoder,
    trace: &'l mut T,
    buf: ImageBuf,
    labels: LabelTable,
    objects: ObjectRecorder,
}

impl<'l, T: LinkTrace> Session<'l, T> {
    fn step(&mut self, step: LinkStep) {
        self.trace.trace_step(step, &self.buf);
    }

    fn begin(&mut self) {
        self.step(LinkStep::Begin);

        for wk in WELL_KNOWN {
            self.labels.declare(wk.name.intern());
        }
    }

    /// Open an object named `name` whose header references `class`.
    fn open(
        &mut self,
        name: SymbolId,
        class: Option<SymbolId>,
    ) -> LinkResult<(ObjectHandle, Addr)> {
        let handle = self.objects.begin(&mut self.buf, name)?;

        if let Some(class) = class {
            let class = self.labels.declare(class);
            let site = PatchSite::word(
                self.buf.word(),
                self.objects.type_slot(handle),
            );

            self.labels.reference(&mut self.buf, class, site)?;
        }

        Ok((handle, self.buf.cursor_addr()))
    }

    /// Close the object `handle` and bind its name to its address.
    fn close(
        &mut self,
        handle: ObjectHandle,
        kind: LabelKind,
    ) -> LinkResult<Addr> {
        let base = self.buf.base();
        let record = self.objects.end(&mut self.buf, handle)?;
        let (name, addr) = (record.name(), record.address(base));

        self.trace.trace_object(record, base);

        let id = self.labels.declare(name);
        self.labels.resolve(&mut self.buf, id, addr, kind)?;

        Ok(addr)
    }

    fn resolve_marker(&mut self, name: &str, addr: Addr) -> LinkResult<()> {
        let id = self.labels.declare(name.intern());
        self.labels.resolve(&mut self.buf, id, addr, LabelKind::Code)
    }

    /// First object of the image,
    ///   holding the glue executed on entry.
    fn boot_code(&mut self, set: &BootClassSet) -> LinkResult<()> {
        let (handle, _) =
            self.open(BOOT_CODE.intern(), Some(self.config.names.code_class))?;

        let computed = self.objects.get(handle).header_size();
        let expected = self.target.entry_offset();

        if computed != expected {
            return Err(LayoutError::EntryOffset { computed, expected }.into());
        }

        self.step(LinkStep::Glue);
        self.glue(set)?;

        self.close(handle, LabelKind::Code)?;

        Ok(())
    }

    fn glue(&mut self, set: &BootClassSet) -> LinkResult<()> {
        let (config, target) = (self.config, self.target);
        let names = &config.names;

        self.store_label(names.registry_slot, names.registry)?;
        self.store_label(names.boot_heap_slot, BOOT_HEAP.intern())?;
        self.store_label(names.heap_slot, HEAP.intern())?;
        self.init_thread(set)?;

        let em = target.emitter();

        let clinit_caller = self.labels.declare(CLINIT_CALLER.intern());
        em.call(&mut self.buf, &mut self.labels, clinit_caller)?;

        let main = self.labels.declare(names.main);
        let vm_invoke = self.labels.declare(wellknown::VM_INVOKE.intern());
        em.mov(&mut self.buf, &mut self.labels, Reg::Arg0, main.into())?;
        em.call(&mut self.buf, &mut self.labels, vm_invoke)?;
        em.ret(&mut self.buf)
    }

    /// Emit code storing the address of `value` into the slot labeled
    ///   `slot`.
    fn store_label(&mut self, slot: SymbolId, value: SymbolId) -> LinkResult<()> {
        let target = self.target;
        let em = target.emitter();
        let slot = self.labels.declare(slot);
        let value = self.labels.declare(value);

        em.mov(&mut self.buf, &mut self.labels, Reg::Base, slot.into())?;
        em.mov(&mut self.buf, &mut self.labels, Reg::Value, value.into())?;
        em.store(&mut self.buf, Reg::Base, 0, Reg::Value)
    }

    /// Emit code assigning the initial stack to the initial thread and
    ///   its stack overflow limit to the thread and,
    ///     if it declares the field,
    ///     the boot processor.
    fn init_thread(&mut self, set: &BootClassSet) -> LinkResult<()> {
        let (config, target) = (self.config, self.target);
        let names = &config.names;

        let thread = names.initial_thread;
        let field_disp = |field: SymbolId| -> LinkResult<i32> {
            let slot = set
                .get(thread)
                .and_then(|desc| desc.layout().field(field))
                .ok_or(LayoutError::MissingField {
                    descriptor: thread,
                    field,
                })?;

            disp(slot.offset)
        };

        let stack_disp = field_disp(names.thread_stack)?;
        let stack_end_disp = field_disp(names.thread_stack_end)?;
        let limit_disp = disp(config.overflow_limit())?;

        let processor_disp = set
            .get(names.processor)
            .and_then(|desc| desc.layout().field(names.processor_stack_end))
            .map(|slot| disp(slot.offset))
            .transpose()?;

        let em = target.emitter();
        let thread = self.labels.declare(thread);
        let stack = self.labels.declare(INITIAL_STACK.intern());
        let processor = self.labels.declare(names.processor);

        em.mov(&mut self.buf, &mut self.labels, Reg::Base, thread.into())?;
        em.mov(&mut self.buf, &mut self.labels, Reg::Value, stack.into())?;
        em.store(&mut self.buf, Reg::Base, stack_disp, Reg::Value)?;
        em.lea(&mut self.buf, Reg::Value, Reg::Value, limit_disp)?;
        em.store(&mut self.buf, Reg::Base, stack_end_disp, Reg::Value)?;

        if let Some(processor_disp) = processor_disp {
            em.mov(&mut self.buf, &mut self.labels, Reg::Base, processor.into())?;
            em.store(&mut self.buf, Reg::Base, processor_disp, Reg::Value)?;
        }

        Ok(())
    }

    fn blob(&mut self, data: &[u8]) -> LinkResult<BlobSummary> {
        self.step(LinkStep::Blob);

        let summary =
            load_blob(&mut self.buf, &mut self.labels, self.target, data)?;
        self.trace.trace_blob(&summary);

        Ok(summary)
    }

    fn boot_heap(&mut self) -> LinkResult<()> {
        self.step(LinkStep::BootHeap);

        self.buf.align(global::PAGE_SIZE)?;

        let start = self.buf.cursor_addr();
        self.resolve_marker(wellknown::BOOT_HEAP_START, start)
    }

    fn runtime_objects(&mut self) -> LinkResult<()> {
        self.step(LinkStep::RuntimeObjects);

        let config = self.config;
        let names = &config.names;

        let stack_size = config.stack_size();
        let limit = config.overflow_limit();
        let word = self.buf.word().bytes();

        let (handle, stack) =
            self.open(INITIAL_STACK.intern(), Some(names.stack_class))?;

        self.buf.write_word(stack + limit as Addr)?;
        self.buf.write_word(stack + stack_size as Addr)?;
        self.buf.write_zeros(stack_size - 2 * word)?;
        self.close(handle, LabelKind::Object)?;
        self.resolve_marker(wellknown::USER_ESP, stack + stack_size as Addr)?;

        let (handle, _) = self.open(BOOT_HEAP.intern(), Some(names.boot_heap_class))?;
        self.buf.write_zeros(config.boot_heap_size)?;
        self.close(handle, LabelKind::Object)?;

        let (handle, _) = self.open(HEAP.intern(), Some(names.heap_class))?;
        self.buf.write_zeros(config.heap_size)?;
        self.close(handle, LabelKind::Object)?;

        Ok(())
    }

    fn boot_class_set(&mut self, set: &BootClassSet) -> LinkResult<()> {
        self.step(LinkStep::BootClassSet);

        for desc in set.iter() {
            let (handle, addr) = self.open(desc.name(), desc.class())?;
            self.encoder.encode(&mut self.buf, &mut self.labels, desc)?;
            self.close(handle, LabelKind::Object)?;

            if desc.depth() == Depth::Full {
                for slot in desc.layout().fields() {
                    let name = format!("{}#{}", desc.name(), slot.name);
                    let id = self.labels.declare(name.intern());

                    self.labels.resolve(
                        &mut self.buf,
                        id,
                        addr + slot.offset as Addr,
                        LabelKind::Object,
                    )?;
                }
            }
        }

        Ok(())
    }

    /// Emit code invoking the static initializer of each of `types`,
    ///   in order.
    fn clinit_caller(&mut self, types: &[SymbolId]) -> LinkResult<()> {
        self.step(LinkStep::Initializers);
        self.trace.trace_initializers(types.len());

        let (code_class, clinit) =
            (self.config.names.code_class, self.config.names.clinit);

        let (handle, _) = self.open(CLINIT_CALLER.intern(), Some(code_class))?;

        let target = self.target;
        let em = target.emitter();
        let vm_invoke = self.labels.declare(wellknown::VM_INVOKE.intern());

        for ty in types {
            let method = self.labels.declare(format!("{ty}#{clinit}").intern());

            em.mov(&mut self.buf, &mut self.labels, Reg::Arg0, method.into())?;
            em.call(&mut self.buf, &mut self.labels, vm_invoke)?;
        }

        em.ret(&mut self.buf)?;
        self.close(handle, LabelKind::Code)?;

        Ok(())
    }

    fn image_end(&mut self) -> LinkResult<()> {
        self.step(LinkStep::ImageEnd);

        let code_class = self.config.names.code_class;
        let (handle, _) = self.open(IMAGE_END.intern(), Some(code_class))?;
        self.buf.align(global::PAGE_SIZE)?;
        self.close(handle, LabelKind::Object)?;

        let end = self.buf.cursor_addr();
        self.resolve_marker(wellknown::FREE_MEMORY_START, end)?;
        self.resolve_marker(wellknown::BOOT_HEAP_END, end)
    }

    fn well_known(&mut self) -> LinkResult<()> {
        self.step(LinkStep::WellKnown);

        for wk in WELL_KNOWN {
            let src = match wk.binding {
                Binding::Method(method) => method.intern(),
                Binding::Processor => self.config.names.processor,
                Binding::Blob | Binding::Marker => continue,
            };

            let src = self.labels.declare(src);
            let dest = self.labels.declare(wk.name.intern());

            self.labels.link(&mut self.buf, src, dest)?;
        }

        Ok(())
    }

    fn finalize(&mut self) -> LinkResult<()> {
        self.step(LinkStep::Finalize);
        self.labels.finalize()
    }

    fn header(&mut self) -> LinkResult<usize> {
        self.step(LinkStep::Header);
        patch_header(&mut self.buf, self.config.vbe)
    }
}

/// Displacement of a field from its object's start.
fn disp(offset: usize) -> LinkResult<i32> {
    i32::try_from(offset).map_err(|_| {
        ImageError::ValueRange {
            value: offset as i128,
            width: 4,
        }
        .into()
    })
}

/// The result of a successful link.
#[derive(Debug)]
pub struct LinkedImage {
    buf: ImageBuf,
    labels: LabelTable,
    objects: ObjectRecorder,
    blob: BlobSummary,
    initializers: Vec<SymbolId>,
    header: usize,
}

impl LinkedImage {
    #[cfg(test)]
    pub(crate) fn from_parts(
        buf: ImageBuf,
        labels: LabelTable,
        objects: ObjectRecorder,
    ) -> Self {
        Self {
            buf,
            labels,
            objects,
            blob: Default::default(),
            initializers: Vec::new(),
            header: 0,
        }
    }

    pub fn base(&self) -> Addr {
        self.buf.base()
    }

    pub fn word(&self) -> Word {
        self.buf.word()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn contents(&self) -> &[u8] {
        self.buf.contents()
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn objects(&self) -> &ObjectRecorder {
        &self.objects
    }

    pub fn blob(&self) -> &BlobSummary {
        &self.blob
    }

    /// Types whose static initializers are called at boot,
    ///   in the order in which they are called.
    pub fn initializers(&self) -> &[SymbolId] {
        &self.initializers
    }

    /// Offset of the multiboot header.
    pub fn header_offset(&self) -> usize {
        self.header
    }

    /// Address bound to the label `name`.
    pub fn address_of(&self, name: SymbolId) -> Option<Addr> {
        self.labels
            .lookup(name)
            .and_then(|id| self.labels.address(id))
    }

    /// Write the image to `dest`.
    ///
    /// `dest` is replaced only once the image has been written in full.
    pub fn write<P: AsRef<Path>>(&self, dest: P) -> LinkResult<()> {
        fs::write_atomic(dest, self.contents())?;
        Ok(())
    }

    /// Write the image to `dest` and its [listing](super::list),
    ///   as linked from `set`,
    ///   to `list`.
    ///
    /// Both files are written in full before either is committed,
    ///   and the image is committed last;
    ///     a failure leaves no image at `dest`.
    pub fn write_with_listing<P: AsRef<Path>, L: AsRef<Path>>(
        &self,
        dest: P,
        list: L,
        set: &BootClassSet,
    ) -> LinkResult<()> {
        let mut image = fs::AtomicFile::create(dest)?;
        let mut listing = fs::AtomicFile::create(list)?;

        image.write_all(self.contents())?;
        write_listing(&mut listing, set, self)?;

        listing.commit()?;
        image.commit()?;

        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_bytes()
    }
}

#[cfg(test)]
mod test;
