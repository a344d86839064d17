// Boot manifest reader
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

//! Read a [`BootClassSet`] from an XML boot manifest.
//!
//! The manifest is produced by whatever compiled the boot class set and
//!   has the form:
//!
//! ```xml
//! <boot-classes>
//!   <descriptor name="org.jnode.boot.Main" kind="type"
//!               class="org.jnode.vm.classmgr.VmNormalClass"
//!               eager="true" depth="full" clinit="true" size="8">
//!     <field name="pluginRegistry" type="ref" offset="0"
//!            value="org.jnode.plugin.model.PluginRegistryModel"/>
//!     <field name="flags" type="u32" offset="4" value="0x1"/>
//!   </descriptor>
//! </boot-classes>
//! ```
//!
//! Numbers may be given in decimal or as `0x`-prefixed hexadecimal.
//! A `ref` field whose value is `null` or that has no value is a null
//!   reference;
//!     `bytes` values are given as hexadecimal digit pairs.
//!
//! This uses [`quick_xml`] as the parser.

use super::{
    BootClassSet, BootSetError, Depth, Descriptor, DescriptorKind, FieldType,
    FieldValue,
};
use crate::sym::GlobalSymbolIntern;
use quick_xml::{
    events::{BytesStart, Event as QuickXmlEvent},
    Error as QuickXmlError,
};
use std::{
    fmt::{self, Display},
    io::BufRead,
};

const EL_ROOT: &str = "boot-classes";
const EL_DESCRIPTOR: &str = "descriptor";
const EL_FIELD: &str = "field";

/// Read a boot class set from the manifest `reader`.
pub fn read_manifest<B: BufRead>(
    reader: B,
) -> Result<BootClassSet, ManifestError> {
    let mut reader = quick_xml::Reader::from_reader(reader);
    reader.trim_text(true);

    let mut readbuf = Vec::new();
    let mut set = BootClassSet::new();
    let mut state = State::Prolog;

    loop {
        readbuf.clear();

        let ev = reader.read_event_into(&mut readbuf)?;

        state = match (state, ev) {
            (State::Prolog, QuickXmlEvent::Start(ele))
                if ele.name().as_ref() == EL_ROOT.as_bytes() =>
            {
                State::Root
            }
            (State::Prolog, QuickXmlEvent::Empty(ele))
                if ele.name().as_ref() == EL_ROOT.as_bytes() =>
            {
                State::Done
            }

            (State::Root, QuickXmlEvent::Start(ele))
                if ele.name().as_ref() == EL_DESCRIPTOR.as_bytes() =>
            {
                State::Descriptor(parse_descriptor(&ele)?)
            }
            (State::Root, QuickXmlEvent::Empty(ele))
                if ele.name().as_ref() == EL_DESCRIPTOR.as_bytes() =>
            {
                set.push(parse_descriptor(&ele)?)?;
                State::Root
            }
            (State::Root, QuickXmlEvent::End(_)) => State::Done,

            (State::Descriptor(desc), QuickXmlEvent::Empty(ele))
                if ele.name().as_ref() == EL_FIELD.as_bytes() =>
            {
                State::Descriptor(parse_field(desc, &ele)?)
            }
            (State::Descriptor(desc), QuickXmlEvent::End(_)) => {
                set.push(desc)?;
                State::Root
            }

            (_, QuickXmlEvent::Start(ele) | QuickXmlEvent::Empty(ele)) => {
                return Err(ManifestError::UnexpectedElement(
                    String::from_utf8_lossy(ele.name().as_ref()).into(),
                ))
            }

            (State::Done, QuickXmlEvent::Eof) => return Ok(set),
            (_, QuickXmlEvent::Eof) => return Err(ManifestError::UnexpectedEof),

            // declarations, comments, processing instructions, and text
            (state, _) => state,
        };
    }
}

#[derive(Debug)]
enum State {
    Prolog,
    Root,
    Descriptor(Descriptor),
    Done,
}

/// Attributes of a single element,
///   unescaped.
struct Attrs {
    element: &'static str,
    pairs: Vec<(Vec<u8>, String)>,
}

impl Attrs {
    fn read(
        element: &'static str,
        ele: &BytesStart,
    ) -> Result<Self, ManifestError> {
        let mut pairs = Vec::new();

        for attr in ele.attributes() {
            let attr = attr.map_err(QuickXmlError::from)?;
            let value = attr.unescape_value()?.into_owned();

            pairs.push((attr.key.as_ref().to_vec(), value));
        }

        Ok(Self { element, pairs })
    }

    fn optional(&self, name: &'static str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name.as_bytes())
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, name: &'static str) -> Result<&str, ManifestError> {
        self.optional(name).ok_or(ManifestError::MissingAttr {
            element: self.element,
            attr: name,
        })
    }

    fn bad(&self, name: &'static str, value: &str) -> ManifestError {
        ManifestError::BadAttr {
            element: self.element,
            attr: name,
            value: value.into(),
        }
    }

    /// Parse an optional attribute with `f`,
    ///   producing an error naming the attribute if `f` fails.
    fn parse<T>(
        &self,
        name: &'static str,
        f: impl FnOnce(&str) -> Option<T>,
    ) -> Result<Option<T>, ManifestError> {
        self.optional(name)
            .map(|value| f(value).ok_or_else(|| self.bad(name, value)))
            .transpose()
    }
}

fn parse_descriptor(ele: &BytesStart) -> Result<Descriptor, ManifestError> {
    let attrs = Attrs::read(EL_DESCRIPTOR, ele)?;

    let name = attrs.required("name")?.intern();
    let kind_str = attrs.required("kind")?;
    let kind = parse_kind(kind_str).ok_or_else(|| attrs.bad("kind", kind_str))?;

    let mut desc = Descriptor::new(name, kind)
        .with_eager(attrs.parse("eager", parse_bool)?.unwrap_or(false))
        .with_depth(attrs.parse("depth", parse_depth)?.unwrap_or_default())
        .with_clinit(attrs.parse("clinit", parse_bool)?.unwrap_or(false));

    if let Some(class) = attrs.optional("class") {
        desc = desc.with_class(class.intern());
    }

    if let Some(size) = attrs.parse("size", parse_len)? {
        desc = desc.with_size(size);
    }

    Ok(desc)
}

fn parse_field(
    desc: Descriptor,
    ele: &BytesStart,
) -> Result<Descriptor, ManifestError> {
    let attrs = Attrs::read(EL_FIELD, ele)?;

    let name = attrs.required("name")?.intern();
    let ty_str = attrs.required("type")?;
    let offset_str = attrs.required("offset")?;

    let offset = parse_len(offset_str)
        .ok_or_else(|| attrs.bad("offset", offset_str))?;

    let value = attrs.optional("value");

    let (ty, value) = match ty_str {
        "u8" => (FieldType::U8, attrs.parse("value", parse_int)?),
        "u16" => (FieldType::U16, attrs.parse("value", parse_int)?),
        "u32" => (FieldType::U32, attrs.parse("value", parse_int)?),
        "u64" => (FieldType::U64, attrs.parse("value", parse_int)?),
        "word" => (FieldType::Word, attrs.parse("value", parse_int)?),
        "ref" => (FieldType::Ref, value.map(parse_ref)),
        "bytes" => {
            let bytes = attrs.parse("value", parse_hex)?.unwrap_or_default();
            let len = attrs.parse("len", parse_len)?.unwrap_or(bytes.len());

            (FieldType::Bytes(len), Some(FieldValue::Bytes(bytes)))
        }
        _ => return Err(attrs.bad("type", ty_str)),
    };

    Ok(desc
        .with_field(name, ty, offset)
        .with_value(name, value.unwrap_or_default()))
}

fn parse_kind(s: &str) -> Option<DescriptorKind> {
    match s {
        "type" => Some(DescriptorKind::Type),
        "method" => Some(DescriptorKind::Method),
        "statics" => Some(DescriptorKind::Statics),
        "instance" => Some(DescriptorKind::Instance),
        _ => None,
    }
}

fn parse_depth(s: &str) -> Option<Depth> {
    match s {
        "shallow" => Some(Depth::Shallow),
        "full" => Some(Depth::Full),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
pub(crate) fn parse_num(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Parse a size or offset,
///   which must be addressable on the host.
fn parse_len(s: &str) -> Option<usize> {
    parse_num(s).and_then(|n| usize::try_from(n).ok())
}

fn parse_int(s: &str) -> Option<FieldValue> {
    parse_num(s).map(FieldValue::Int)
}

fn parse_ref(s: &str) -> FieldValue {
    match s {
        "null" => FieldValue::Null,
        name => FieldValue::Ref(name.intern()),
    }
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }

    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

/// An error reading a boot manifest.
#[derive(Debug)]
pub enum ManifestError {
    /// The manifest is not well-formed XML.
    Xml(QuickXmlError),

    /// An element appeared where it is not permitted.
    UnexpectedElement(String),

    /// A required attribute is missing.
    MissingAttr {
        element: &'static str,
        attr: &'static str,
    },

    /// An attribute value could not be parsed.
    BadAttr {
        element: &'static str,
        attr: &'static str,
        value: String,
    },

    /// The manifest ended before the root element was closed.
    UnexpectedEof,

    /// The descriptors do not form a valid boot class set.
    BootSet(BootSetError),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ManifestError::*;

        match self {
            Xml(e) => write!(f, "malformed boot manifest: {e}"),
            UnexpectedElement(name) => {
                write!(f, "unexpected element `{name}` in boot manifest")
            }
            MissingAttr { element, attr } => write!(
                f,
                "missing required attribute `@{attr}` of `{element}`"
            ),
            BadAttr {
                element,
                attr,
                value,
            } => write!(
                f,
                "invalid value `{value}` for attribute `@{attr}` of `{element}`"
            ),
            UnexpectedEof => write!(
                f,
                "unexpected end of boot manifest; expected `</{EL_ROOT}>`"
            ),
            BootSet(e) => Display::fmt(e, f),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Xml(e) => Some(e),
            Self::BootSet(e) => Some(e),
            _ => None,
        }
    }
}

impl From<QuickXmlError> for ManifestError {
    fn from(e: QuickXmlError) -> Self {
        Self::Xml(e)
    }
}

impl From<BootSetError> for ManifestError {
    fn from(e: BootSetError) -> Self {
        Self::BootSet(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn read(src: &str) -> Result<BootClassSet, ManifestError> {
        read_manifest(src.as_bytes())
    }

    #[test]
    fn reads_descriptors_and_fields() -> Result<(), ManifestError> {
        let set = read(
            r#"<?xml version="1.0"?>
            <boot-classes>
              <!-- entry -->
              <descriptor name="org.jnode.boot.Main" kind="type"
                          class="org.jnode.vm.classmgr.VmNormalClass"
                          eager="true" depth="full" clinit="true" size="16">
                <field name="pluginRegistry" type="ref" offset="0"
                       value="org.jnode.plugin.model.PluginRegistryModel"/>
                <field name="flags" type="u32" offset="4" value="0x1"/>
                <field name="none" type="ref" offset="8" value="null"/>
                <field name="raw" type="bytes" offset="12" value="deadbeef"/>
              </descriptor>
              <descriptor name="org.jnode.plugin.model.PluginRegistryModel"
                          kind="instance"/>
            </boot-classes>"#,
        )?;

        assert_eq!(2, set.len());

        let main = set.get("org.jnode.boot.Main".intern()).unwrap();
        assert_eq!(DescriptorKind::Type, main.kind());
        assert_eq!(
            Some("org.jnode.vm.classmgr.VmNormalClass".intern()),
            main.class()
        );
        assert!(main.is_eager());
        assert!(main.has_clinit());
        assert_eq!(Depth::Full, main.depth());
        assert_eq!(16, main.layout().size(crate::img::Word::W32));
        assert_eq!(4, main.layout().fields().len());

        assert_eq!(
            &FieldValue::Ref(
                "org.jnode.plugin.model.PluginRegistryModel".intern()
            ),
            main.value("pluginRegistry".intern()),
        );
        assert_eq!(&FieldValue::Int(1), main.value("flags".intern()));
        assert_eq!(&FieldValue::Null, main.value("none".intern()));
        assert_eq!(
            &FieldValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
            main.value("raw".intern()),
        );
        assert_eq!(
            Some(FieldType::Bytes(4)),
            main.layout().field("raw".intern()).map(|slot| slot.ty),
        );

        let reg = set
            .get("org.jnode.plugin.model.PluginRegistryModel".intern())
            .unwrap();
        assert_eq!(DescriptorKind::Instance, reg.kind());
        assert!(!reg.is_eager());
        assert_eq!(Depth::Shallow, reg.depth());

        Ok(())
    }

    #[test]
    fn empty_root_is_empty_set() -> Result<(), ManifestError> {
        assert!(read("<boot-classes/>")?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_attr_names_element_and_attr() {
        match read(r#"<boot-classes><descriptor kind="type"/></boot-classes>"#)
        {
            Err(ManifestError::MissingAttr { element, attr }) => {
                assert_eq!(("descriptor", "name"), (element, attr));
            }
            other => panic!("expected missing attr, got {other:?}"),
        }
    }

    #[test]
    fn bad_attr_value() {
        let result = read(
            r#"<boot-classes>
                 <descriptor name="a" kind="type">
                   <field name="f" type="u32" offset="four"/>
                 </descriptor>
               </boot-classes>"#,
        );

        match result {
            Err(ManifestError::BadAttr {
                element,
                attr,
                value,
            }) => {
                assert_eq!(("field", "offset", "four"), (element, attr, &*value));
            }
            other => panic!("expected bad attr, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_bad_attr() {
        assert!(matches!(
            read(r#"<boot-classes><descriptor name="a" kind="x"/></boot-classes>"#),
            Err(ManifestError::BadAttr { attr: "kind", .. })
        ));
    }

    #[test]
    fn unexpected_element() {
        match read("<boot-classes><class/></boot-classes>") {
            Err(ManifestError::UnexpectedElement(name)) => {
                assert_eq!("class", name)
            }
            other => panic!("expected unexpected element, got {other:?}"),
        }
    }

    #[test]
    fn truncated_manifest() {
        assert!(matches!(
            read(r#"<boot-classes><descriptor name="a" kind="type">"#),
            Err(ManifestError::UnexpectedEof)
        ));
    }

    #[test]
    fn duplicate_descriptor() {
        assert!(matches!(
            read(
                r#"<boot-classes>
                     <descriptor name="a" kind="type"/>
                     <descriptor name="a" kind="method"/>
                   </boot-classes>"#
            ),
            Err(ManifestError::BootSet(BootSetError::Duplicate(_)))
        ));
    }

    #[test]
    fn numbers_decimal_and_hex() {
        assert_eq!(Some(16), parse_num("16"));
        assert_eq!(Some(16), parse_num("0x10"));
        assert_eq!(None, parse_num("0xZZ"));
        assert_eq!(None, parse_num(""));

        assert_eq!(Some(16), parse_len("0x10"));
        assert_eq!(None, parse_len("sixteen"));
    }

    #[test]
    fn odd_hex_is_rejected() {
        assert_eq!(None, parse_hex("abc"));
        assert_eq!(Some(vec![0xab, 0xcd]), parse_hex("abcd"));
    }
}
