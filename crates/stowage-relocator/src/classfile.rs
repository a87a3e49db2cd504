//! Constant pool rewriting.
//!
//! Every symbolic name in a class file lives in a `Utf8` constant, so
//! relocation only has to rewrite the constant pool. The rest of the file is
//! copied verbatim: it refers to constants by index, and indices do not
//! change.
//!
//! How a `Utf8` constant is rewritten depends on who references it:
//!
//! | referenced by | treated as |
//! |---|---|
//! | `Class` | internal name or array descriptor |
//! | `Package` | slashed package name |
//! | `String` | class name, resource path or descriptor literal |
//! | annotation string value | same as `String` |
//! | anything else | descriptor or generic signature, if it parses as one |
//!
//! Annotation string values are only reachable through attributes, so the
//! class, field, method and record component attributes are walked to find
//! them.
//!
//! Constants that are not plain UTF-8 (modified UTF-8 encodes NUL and
//! supplementary characters differently) never contain relocatable names
//! and are left untouched.

use std::collections::HashSet;

use stowage_core::RelocationRules;

use crate::error::ClassFormatError;
use crate::names::{looks_like_signature, map_internal_name, map_signature, map_string_literal};

const MAGIC: u32 = 0xCAFE_BABE;

/// Magic, minor and major version.
const HEADER_LEN: usize = 8;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// Annotations nested deeper than this are rejected.
const MAX_ANNOTATION_DEPTH: usize = 32;

/// One parsed constant pool slot.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Index 0 and the second half of a long or double.
    Unusable,
    /// A `Utf8` constant; `start..end` spans its bytes (without length).
    Utf8 { start: usize, end: usize },
    /// Any other constant; `start..end` spans tag and payload.
    Other { start: usize, end: usize },
}

/// How a `Utf8` constant is used.
#[derive(Debug, Default)]
struct Roles {
    class_names: HashSet<u16>,
    packages: HashSet<u16>,
    strings: HashSet<u16>,
}

/// Rewrite the class file `bytes` under `rules`.
///
/// Returns `Ok(None)` when no constant changed.
///
/// # Errors
///
/// Returns [`ClassFormatError`] when the constant pool is malformed or a
/// rewritten constant would exceed the `Utf8` length limit.
pub fn relocate_class(
    bytes: &[u8],
    rules: &RelocationRules,
) -> Result<Option<Vec<u8>>, ClassFormatError> {
    let pool = ConstantPool::parse(bytes)?;

    let mut replacements: Vec<(usize, String)> = Vec::new();
    for (index, slot) in pool.slots.iter().enumerate() {
        let Slot::Utf8 { start, end } = *slot else {
            continue;
        };
        let index = u16::try_from(index).map_err(|_| ClassFormatError::BadReference {
            index: u16::MAX,
        })?;
        let Some(raw) = bytes.get(start..end) else {
            return Err(ClassFormatError::Truncated { offset: start });
        };
        let Ok(text) = std::str::from_utf8(raw) else {
            continue;
        };
        if let Some(mapped) = pool.roles.rewrite(index, text, rules) {
            if mapped.len() > usize::from(u16::MAX) {
                return Err(ClassFormatError::ConstantTooLong {
                    index,
                    length: mapped.len(),
                });
            }
            replacements.push((usize::from(index), mapped));
        }
    }

    if replacements.is_empty() {
        return Ok(None);
    }
    Ok(Some(pool.rebuild(bytes, &replacements)))
}

impl Roles {
    fn rewrite(&self, index: u16, text: &str, rules: &RelocationRules) -> Option<String> {
        if self.class_names.contains(&index) {
            return map_internal_name(text, rules);
        }
        if self.packages.contains(&index) {
            return rules.map_path(text);
        }
        if self.strings.contains(&index) {
            if let Some(mapped) = map_string_literal(text, rules) {
                return Some(mapped);
            }
        }
        if looks_like_signature(text) {
            return map_signature(text, rules);
        }
        None
    }
}

struct ConstantPool {
    slots: Vec<Slot>,
    roles: Roles,
    /// Offset of the first byte after the pool.
    end: usize,
}

impl ConstantPool {
    fn parse(bytes: &[u8]) -> Result<Self, ClassFormatError> {
        let mut reader = Reader::new(bytes);
        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic { found: magic });
        }
        reader.skip(4)?;
        let count = reader.u16()?;

        let mut slots = Vec::with_capacity(usize::from(count));
        slots.push(Slot::Unusable);
        let mut class_refs = Vec::new();
        let mut package_refs = Vec::new();
        let mut string_refs = Vec::new();

        let mut index: u16 = 1;
        while index < count {
            let start = reader.pos;
            let tag = reader.u8()?;
            let mut width: u16 = 1;
            match tag {
                TAG_UTF8 => {
                    let len = usize::from(reader.u16()?);
                    let data_start = reader.pos;
                    reader.skip(len)?;
                    slots.push(Slot::Utf8 {
                        start: data_start,
                        end: reader.pos,
                    });
                    index = next_index(index, width)?;
                    continue;
                },
                TAG_CLASS => class_refs.push(reader.u16()?),
                TAG_STRING => string_refs.push(reader.u16()?),
                TAG_PACKAGE => package_refs.push(reader.u16()?),
                TAG_METHOD_TYPE | TAG_MODULE => reader.skip(2)?,
                TAG_INTEGER
                | TAG_FLOAT
                | TAG_FIELDREF
                | TAG_METHODREF
                | TAG_INTERFACE_METHODREF
                | TAG_NAME_AND_TYPE
                | TAG_DYNAMIC
                | TAG_INVOKE_DYNAMIC => reader.skip(4)?,
                TAG_LONG | TAG_DOUBLE => {
                    reader.skip(8)?;
                    width = 2;
                },
                TAG_METHOD_HANDLE => reader.skip(3)?,
                _ => return Err(ClassFormatError::UnknownTag { tag, index }),
            }
            slots.push(Slot::Other {
                start,
                end: reader.pos,
            });
            if width == 2 {
                slots.push(Slot::Unusable);
            }
            index = next_index(index, width)?;
        }

        let mut roles = Roles::default();
        for (refs, set) in [
            (class_refs, &mut roles.class_names),
            (package_refs, &mut roles.packages),
            (string_refs, &mut roles.strings),
        ] {
            for target in refs {
                match slots.get(usize::from(target)) {
                    Some(Slot::Utf8 { .. }) => {
                        set.insert(target);
                    },
                    _ => return Err(ClassFormatError::BadReference { index: target }),
                }
            }
        }

        let end = reader.pos;
        let mut walker = AttributeWalker {
            bytes,
            slots: &slots,
            strings: Vec::new(),
        };
        walker.class_body(&mut reader)?;
        for target in walker.strings {
            roles.strings.insert(target);
        }

        Ok(Self { slots, roles, end })
    }

    /// Re-encode the pool with `replacements` and append the untouched rest
    /// of the class file.
    fn rebuild(&self, bytes: &[u8], replacements: &[(usize, String)]) -> Vec<u8> {
        let extra: usize = replacements.iter().map(|(_, s)| s.len()).sum();
        let mut out = Vec::with_capacity(bytes.len().saturating_add(extra));
        out.extend_from_slice(&bytes[..HEADER_LEN.saturating_add(2)]);

        let mut pending = replacements.iter().peekable();
        for (index, slot) in self.slots.iter().enumerate() {
            match *slot {
                Slot::Unusable => {},
                Slot::Other { start, end } => out.extend_from_slice(&bytes[start..end]),
                Slot::Utf8 { start, end } => {
                    out.push(TAG_UTF8);
                    match pending.next_if(|(i, _)| *i == index) {
                        Some((_, text)) => {
                            // Length checked by the caller.
                            let len = u16::try_from(text.len()).unwrap_or(u16::MAX);
                            out.extend_from_slice(&len.to_be_bytes());
                            out.extend_from_slice(text.as_bytes());
                        },
                        None => {
                            let len_start = start.saturating_sub(2);
                            out.extend_from_slice(&bytes[len_start..end]);
                        },
                    }
                },
            }
        }

        out.extend_from_slice(&bytes[self.end..]);
        out
    }
}

/// Collects the `Utf8` indices of annotation string values.
struct AttributeWalker<'a> {
    bytes: &'a [u8],
    slots: &'a [Slot],
    strings: Vec<u16>,
}

impl<'a> AttributeWalker<'a> {
    /// Walk everything after the constant pool.
    fn class_body(&mut self, reader: &mut Reader<'_>) -> Result<(), ClassFormatError> {
        // Access flags, this class, super class.
        reader.skip(6)?;
        let interfaces = reader.u16()?;
        reader.skip(usize::from(interfaces).saturating_mul(2))?;
        // Fields, then methods.
        for _ in 0..2 {
            let members = reader.u16()?;
            for _ in 0..members {
                reader.skip(6)?;
                self.attributes(reader)?;
            }
        }
        self.attributes(reader)
    }

    fn attributes(&mut self, reader: &mut Reader<'_>) -> Result<(), ClassFormatError> {
        let count = reader.u16()?;
        for _ in 0..count {
            let name_index = reader.u16()?;
            let offset = reader.pos;
            let len = usize::try_from(reader.u32()?)
                .map_err(|_| ClassFormatError::Truncated { offset })?;
            let mut body = reader.split(len)?;
            match self.utf8(name_index)? {
                "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                    self.annotations(&mut body)?;
                },
                "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                    let parameters = body.u8()?;
                    for _ in 0..parameters {
                        self.annotations(&mut body)?;
                    }
                },
                "AnnotationDefault" => self.element_value(&mut body, 0)?,
                "Record" => {
                    let components = body.u16()?;
                    for _ in 0..components {
                        body.skip(4)?;
                        self.attributes(&mut body)?;
                    }
                },
                _ => {},
            }
        }
        Ok(())
    }

    fn annotations(&mut self, reader: &mut Reader<'_>) -> Result<(), ClassFormatError> {
        let count = reader.u16()?;
        for _ in 0..count {
            self.annotation(reader, 0)?;
        }
        Ok(())
    }

    fn annotation(
        &mut self,
        reader: &mut Reader<'_>,
        depth: usize,
    ) -> Result<(), ClassFormatError> {
        // Type descriptor; rewritten as a signature.
        reader.skip(2)?;
        let pairs = reader.u16()?;
        for _ in 0..pairs {
            reader.skip(2)?;
            self.element_value(reader, depth)?;
        }
        Ok(())
    }

    fn element_value(
        &mut self,
        reader: &mut Reader<'_>,
        depth: usize,
    ) -> Result<(), ClassFormatError> {
        if depth > MAX_ANNOTATION_DEPTH {
            return Err(ClassFormatError::NestingTooDeep { offset: reader.pos });
        }
        let offset = reader.pos;
        let tag = reader.u8()?;
        match tag {
            b's' => {
                let index = reader.u16()?;
                self.utf8(index)?;
                self.strings.push(index);
            },
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'c' => reader.skip(2)?,
            b'e' => reader.skip(4)?,
            b'@' => self.annotation(reader, depth.saturating_add(1))?,
            b'[' => {
                let values = reader.u16()?;
                for _ in 0..values {
                    self.element_value(reader, depth.saturating_add(1))?;
                }
            },
            _ => return Err(ClassFormatError::BadElementValue { tag, offset }),
        }
        Ok(())
    }

    /// The text of `Utf8` constant `index`. Constants that are not plain
    /// UTF-8 read as empty.
    fn utf8(&self, index: u16) -> Result<&'a str, ClassFormatError> {
        match self.slots.get(usize::from(index)) {
            Some(&Slot::Utf8 { start, end }) => Ok(self
                .bytes
                .get(start..end)
                .and_then(|raw| std::str::from_utf8(raw).ok())
                .unwrap_or_default()),
            _ => Err(ClassFormatError::BadReference { index }),
        }
    }
}

fn next_index(index: u16, width: u16) -> Result<u16, ClassFormatError> {
    index
        .checked_add(width)
        .ok_or(ClassFormatError::BadReference { index })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ClassFormatError> {
        let truncated = ClassFormatError::Truncated { offset: self.pos };
        let end = self.pos.checked_add(len).ok_or(truncated.clone())?;
        let slice = self.bytes.get(self.pos..end).ok_or(truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassFormatError> {
        self.take(len).map(|_| ())
    }

    /// A reader over the next `len` bytes, keeping absolute offsets.
    fn split(&mut self, len: usize) -> Result<Reader<'a>, ClassFormatError> {
        let start = self.pos;
        self.take(len)?;
        Ok(Reader {
            bytes: &self.bytes[..self.pos],
            pos: start,
        })
    }

    fn u8(&mut self) -> Result<u8, ClassFormatError> {
        let b = self.take(1)?;
        Ok(b[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_test::{ClassFileBuilder, ClassFileView};

    fn rules() -> RelocationRules {
        RelocationRules::from_pairs([("a.b", "x.y")]).unwrap()
    }

    #[test]
    fn rewrites_self_and_references() {
        let class = ClassFileBuilder::new("a/b/Main")
            .interface("a/b/Api")
            .field("dep", "La/b/Dep;")
            .method("run", "(La/b/Dep;I)La/b/Result;")
            .field_ref("a/b/Other", "VALUE", "[La/b/Dep;")
            .class_ref("[La/b/Dep;")
            .string("a.b.Service")
            .string("plain text")
            .signature("Ljava/lang/Object;La/b/Api<La/b/Dep;>;")
            .build();

        let out = relocate_class(&class, &rules()).unwrap().unwrap();
        let view = ClassFileView::parse(&out).unwrap();

        assert_eq!(view.this_class(), Some("x/y/Main"));
        let classes = view.class_names();
        assert!(classes.contains(&"x/y/Api"));
        assert!(classes.contains(&"x/y/Other"));
        assert!(classes.contains(&"[Lx/y/Dep;"));
        assert!(classes.contains(&"java/lang/Object"));
        assert!(view.string_constants().contains(&"x.y.Service"));
        assert!(view.string_constants().contains(&"plain text"));
        let utf8 = view.utf8_constants();
        assert!(utf8.contains(&"Lx/y/Dep;"));
        assert!(utf8.contains(&"(Lx/y/Dep;I)Lx/y/Result;"));
        assert!(utf8.contains(&"Ljava/lang/Object;Lx/y/Api<Lx/y/Dep;>;"));
        assert!(!view.mentions("a/b/"));
    }

    #[test]
    fn tail_is_preserved() {
        let class = ClassFileBuilder::new("a/b/Main").field("n", "I").build();
        let before = ClassFileView::parse(&class).unwrap();
        let out = relocate_class(&class, &rules()).unwrap().unwrap();
        let after = ClassFileView::parse(&out).unwrap();
        assert_eq!(before.tail, after.tail);
    }

    #[test]
    fn long_constants_keep_indices() {
        let class = ClassFileBuilder::new("a/b/Main")
            .long_constant(7)
            .string("a.b.Key")
            .build();
        let out = relocate_class(&class, &rules()).unwrap().unwrap();
        let view = ClassFileView::parse(&out).unwrap();
        assert_eq!(view.this_class(), Some("x/y/Main"));
        assert_eq!(view.string_constants(), ["x.y.Key"]);
    }

    #[test]
    fn unrelated_class_is_unchanged() {
        let class = ClassFileBuilder::new("c/d/Main")
            .field("f", "Lc/d/Other;")
            .string("a.bc.NotMatched")
            .build();
        assert_eq!(relocate_class(&class, &rules()).unwrap(), None);
    }

    #[test]
    fn first_rule_wins() {
        let rules = RelocationRules::from_pairs([("a.b", "first"), ("a", "second")]).unwrap();
        let class = ClassFileBuilder::new("a/b/Main").interface("a/c/Api").build();
        let out = relocate_class(&class, &rules).unwrap().unwrap();
        let view = ClassFileView::parse(&out).unwrap();
        assert_eq!(view.this_class(), Some("first/Main"));
        assert!(view.class_names().contains(&"second/c/Api"));
    }

    #[test]
    fn annotation_string_values_are_relocated() {
        let class = ClassFileBuilder::new("c/d/Main")
            .annotation("La/b/Marker;", &[("value", "a.b.Impl"), ("label", "plain")])
            .annotation_array("Lc/d/Providers;", "value", &["a.b.First", "c.d.Kept"])
            .build();

        let out = relocate_class(&class, &rules()).unwrap().unwrap();
        let view = ClassFileView::parse(&out).unwrap();

        let utf8 = view.utf8_constants();
        for expected in ["x.y.Impl", "x.y.First", "c.d.Kept", "plain", "Lx/y/Marker;"] {
            assert!(utf8.contains(&expected), "{expected} missing from {utf8:?}");
        }
        assert!(!view.mentions("a.b."));
        assert!(!view.mentions("a/b/"));
        assert_eq!(view.this_class(), Some("c/d/Main"));
    }

    #[test]
    fn rejects_truncated_attribute() {
        let class = ClassFileBuilder::new("a/b/Main")
            .annotation("La/b/Marker;", &[("value", "a.b.Impl")])
            .build();
        let err = relocate_class(&class[..class.len().saturating_sub(3)], &rules()).unwrap_err();
        assert!(matches!(err, ClassFormatError::Truncated { .. }));
    }

    #[test]
    fn rejects_unknown_element_value() {
        let mut class = ClassFileBuilder::new("a/b/Main")
            .annotation("La/b/Marker;", &[("value", "a.b.Impl")])
            .build();
        // The element tag precedes its two-byte constant index.
        let tag = class.len().saturating_sub(3);
        class[tag] = b'?';
        let err = relocate_class(&class, &rules()).unwrap_err();
        assert!(matches!(err, ClassFormatError::BadElementValue { tag: b'?', .. }));
    }

    #[test]
    fn rejects_bad_magic() {
        let err = relocate_class(b"not a class file", &rules()).unwrap_err();
        assert!(matches!(err, ClassFormatError::BadMagic { .. }));
    }

    #[test]
    fn rejects_truncated_pool() {
        let class = ClassFileBuilder::new("a/b/Main").build();
        let err = relocate_class(&class[..14], &rules()).unwrap_err();
        assert!(matches!(err, ClassFormatError::Truncated { .. }));
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut class = ClassFileBuilder::new("a/b/Main").build();
        // First constant's tag.
        class[10] = 99;
        let err = relocate_class(&class, &rules()).unwrap_err();
        assert!(matches!(err, ClassFormatError::UnknownTag { tag: 99, index: 1 }));
    }
}
