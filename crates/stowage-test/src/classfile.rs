//! Minimal class files for relocation tests.
//!
//! [`ClassFileBuilder`] emits a structurally valid class file with just
//! enough content to carry symbolic references: the self type, a super type,
//! interfaces, field and method descriptors, a generic signature, class
//! references, string constants and class annotations with string values.
//! Methods carry no code.
//!
//! [`ClassFileView`] decodes the constant pool of any class file so tests can
//! assert on what a rewrite produced.

use std::collections::HashMap;

const MAGIC: u32 = 0xCAFE_BABE;
const MAJOR_VERSION: u16 = 52;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_LONG: u8 = 5;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_NAME_AND_TYPE: u8 = 12;

const ACC_PUBLIC: u16 = 0x0001;
const ACC_ABSTRACT: u16 = 0x0400;

/// A string-valued annotation element.
#[derive(Debug, Clone)]
enum ElementValue {
    String(String),
    Array(Vec<String>),
}

/// A class annotation: type descriptor and named elements.
type Annotation = (String, Vec<(String, ElementValue)>);

/// Builder for a minimal class file.
#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    name: String,
    super_name: String,
    interfaces: Vec<String>,
    fields: Vec<(String, String)>,
    methods: Vec<(String, String)>,
    field_refs: Vec<(String, String, String)>,
    class_refs: Vec<String>,
    strings: Vec<String>,
    signature: Option<String>,
    long_constant: Option<i64>,
    annotations: Vec<Annotation>,
}

impl ClassFileBuilder {
    /// Start a class with internal name `name` (e.g. `a/b/Main`).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: "java/lang/Object".into(),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            field_refs: Vec::new(),
            class_refs: Vec::new(),
            strings: Vec::new(),
            signature: None,
            long_constant: None,
            annotations: Vec::new(),
        }
    }

    /// Set the super class.
    #[must_use]
    pub fn super_class(mut self, name: impl Into<String>) -> Self {
        self.super_name = name.into();
        self
    }

    /// Implement an interface.
    #[must_use]
    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.fields.push((name.into(), descriptor.into()));
        self
    }

    /// Declare an abstract method.
    #[must_use]
    pub fn method(mut self, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        self.methods.push((name.into(), descriptor.into()));
        self
    }

    /// Add a `Fieldref` to a field of another class.
    #[must_use]
    pub fn field_ref(
        mut self,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        self.field_refs
            .push((owner.into(), name.into(), descriptor.into()));
        self
    }

    /// Add a `Class` constant (internal name or array descriptor).
    #[must_use]
    pub fn class_ref(mut self, name: impl Into<String>) -> Self {
        self.class_refs.push(name.into());
        self
    }

    /// Add a `String` constant.
    #[must_use]
    pub fn string(mut self, value: impl Into<String>) -> Self {
        self.strings.push(value.into());
        self
    }

    /// Attach a class-level `Signature` attribute.
    #[must_use]
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Attach a runtime-visible class annotation of type `descriptor`
    /// (e.g. `La/b/Marker;`) whose elements are string values.
    ///
    /// String values live in bare `Utf8` constants, referenced only from the
    /// annotation.
    #[must_use]
    pub fn annotation(mut self, descriptor: impl Into<String>, elements: &[(&str, &str)]) -> Self {
        let elements = elements
            .iter()
            .map(|(name, value)| ((*name).to_string(), ElementValue::String((*value).to_string())))
            .collect();
        self.annotations.push((descriptor.into(), elements));
        self
    }

    /// Attach a runtime-visible class annotation with one array element
    /// `name` holding string `values`.
    #[must_use]
    pub fn annotation_array(
        mut self,
        descriptor: impl Into<String>,
        name: impl Into<String>,
        values: &[&str],
    ) -> Self {
        let values = values.iter().map(|v| (*v).to_string()).collect();
        self.annotations
            .push((descriptor.into(), vec![(name.into(), ElementValue::Array(values))]));
        self
    }

    /// Add a `Long` constant, which occupies two pool slots.
    #[must_use]
    pub fn long_constant(mut self, value: i64) -> Self {
        self.long_constant = Some(value);
        self
    }

    /// Encode the class file.
    ///
    /// # Panics
    ///
    /// Panics if the constant pool overflows, which fixture-sized classes
    /// never do.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolWriter::default();

        // A long first, so every later index sits behind a two-slot entry.
        if let Some(value) = self.long_constant {
            pool.long(value);
        }
        pool.integer(42);

        let this_class = pool.class(&self.name);
        let super_class = pool.class(&self.super_name);
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();
        let fields: Vec<(u16, u16)> = self
            .fields
            .iter()
            .map(|(n, d)| (pool.utf8(n), pool.utf8(d)))
            .collect();
        let methods: Vec<(u16, u16)> = self
            .methods
            .iter()
            .map(|(n, d)| (pool.utf8(n), pool.utf8(d)))
            .collect();
        for (owner, name, descriptor) in &self.field_refs {
            pool.field_ref(owner, name, descriptor);
        }
        for name in &self.class_refs {
            pool.class(name);
        }
        for value in &self.strings {
            pool.string(value);
        }
        let signature = self
            .signature
            .as_ref()
            .map(|s| (pool.utf8("Signature"), pool.utf8(s)));
        let annotations = (!self.annotations.is_empty()).then(|| {
            let attribute_name = pool.utf8("RuntimeVisibleAnnotations");
            (attribute_name, encode_annotations(&self.annotations, &mut pool))
        });

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&MAJOR_VERSION.to_be_bytes());
        out.extend_from_slice(&pool.count().to_be_bytes());
        out.extend_from_slice(&pool.bytes);
        push_u16(&mut out, ACC_PUBLIC | ACC_ABSTRACT);
        push_u16(&mut out, this_class);
        push_u16(&mut out, super_class);
        push_len(&mut out, interfaces.len());
        for index in interfaces {
            push_u16(&mut out, index);
        }
        push_len(&mut out, fields.len());
        for (name, descriptor) in fields {
            push_member(&mut out, ACC_PUBLIC, name, descriptor);
        }
        push_len(&mut out, methods.len());
        for (name, descriptor) in methods {
            push_member(&mut out, ACC_PUBLIC | ACC_ABSTRACT, name, descriptor);
        }
        push_len(
            &mut out,
            usize::from(signature.is_some()).saturating_add(usize::from(annotations.is_some())),
        );
        if let Some((attribute_name, value)) = signature {
            push_u16(&mut out, attribute_name);
            out.extend_from_slice(&2u32.to_be_bytes());
            push_u16(&mut out, value);
        }
        if let Some((attribute_name, body)) = annotations {
            push_u16(&mut out, attribute_name);
            let len = u32::try_from(body.len()).expect("fixture attribute fits in u32");
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&body);
        }
        out
    }
}

/// Encode a `RuntimeVisibleAnnotations` attribute body.
fn encode_annotations(annotations: &[Annotation], pool: &mut PoolWriter) -> Vec<u8> {
    let mut body = Vec::new();
    push_len(&mut body, annotations.len());
    for (descriptor, elements) in annotations {
        push_u16(&mut body, pool.utf8(descriptor));
        push_len(&mut body, elements.len());
        for (name, value) in elements {
            push_u16(&mut body, pool.utf8(name));
            match value {
                ElementValue::String(value) => {
                    body.push(b's');
                    push_u16(&mut body, pool.utf8(value));
                },
                ElementValue::Array(values) => {
                    body.push(b'[');
                    push_len(&mut body, values.len());
                    for value in values {
                        body.push(b's');
                        push_u16(&mut body, pool.utf8(value));
                    }
                },
            }
        }
    }
    body
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_len(out: &mut Vec<u8>, len: usize) {
    push_u16(out, u16::try_from(len).expect("fixture count fits in u16"));
}

fn push_member(out: &mut Vec<u8>, flags: u16, name: u16, descriptor: u16) {
    push_u16(out, flags);
    push_u16(out, name);
    push_u16(out, descriptor);
    push_u16(out, 0);
}

#[derive(Debug, Default)]
struct PoolWriter {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl PoolWriter {
    fn count(&self) -> u16 {
        self.next.checked_add(1).expect("constant pool overflow")
    }

    fn allocate(&mut self, slots: u16) -> u16 {
        let index = self.count();
        self.next = self.next.checked_add(slots).expect("constant pool overflow");
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(&index) = self.utf8.get(value) {
            return index;
        }
        let index = self.allocate(1);
        self.bytes.push(TAG_UTF8);
        push_len(&mut self.bytes, value.len());
        self.bytes.extend_from_slice(value.as_bytes());
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(&index) = self.classes.get(name) {
            return index;
        }
        let name_index = self.utf8(name);
        let index = self.allocate(1);
        self.bytes.push(TAG_CLASS);
        push_u16(&mut self.bytes, name_index);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn string(&mut self, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        let index = self.allocate(1);
        self.bytes.push(TAG_STRING);
        push_u16(&mut self.bytes, utf8);
        index
    }

    fn integer(&mut self, value: i32) -> u16 {
        let index = self.allocate(1);
        self.bytes.push(TAG_INTEGER);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        index
    }

    fn long(&mut self, value: i64) -> u16 {
        let index = self.allocate(2);
        self.bytes.push(TAG_LONG);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        index
    }

    fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let nat = self.allocate(1);
        self.bytes.push(TAG_NAME_AND_TYPE);
        push_u16(&mut self.bytes, name);
        push_u16(&mut self.bytes, descriptor);
        let index = self.allocate(1);
        self.bytes.push(TAG_FIELDREF);
        push_u16(&mut self.bytes, class);
        push_u16(&mut self.bytes, nat);
        index
    }
}

/// Decoded view of a class file's constant pool.
#[derive(Debug, Clone, Default)]
pub struct ClassFileView {
    utf8: Vec<(u16, String)>,
    classes: Vec<(u16, u16)>,
    strings: Vec<u16>,
    this_class: u16,
    /// Bytes following the constant pool.
    pub tail: Vec<u8>,
}

impl ClassFileView {
    /// Decode `bytes`. Returns `None` for anything that is not a well formed
    /// class file.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let mut reader = Reader { bytes, pos: 0 };
        if reader.u32()? != MAGIC {
            return None;
        }
        reader.u16()?;
        reader.u16()?;
        let count = reader.u16()?;

        let mut view = Self::default();
        let mut index: u16 = 1;
        while index < count {
            let tag = reader.u8()?;
            let mut slots = 1;
            match tag {
                TAG_UTF8 => {
                    let len = usize::from(reader.u16()?);
                    let raw = reader.take(len)?;
                    view.utf8
                        .push((index, String::from_utf8_lossy(raw).into_owned()));
                },
                TAG_CLASS => view.classes.push((index, reader.u16()?)),
                TAG_STRING => view.strings.push(reader.u16()?),
                16 | 19 | 20 => {
                    reader.u16()?;
                },
                TAG_INTEGER | 4 | TAG_FIELDREF | 10 | 11 | TAG_NAME_AND_TYPE | 17 | 18 => {
                    reader.take(4)?;
                },
                TAG_LONG | 6 => {
                    reader.take(8)?;
                    slots = 2;
                },
                15 => {
                    reader.take(3)?;
                },
                _ => return None,
            }
            index = index.checked_add(slots)?;
        }

        reader.u16()?;
        view.this_class = reader.u16()?;
        view.tail = bytes.get(reader.pos..)?.to_vec();
        Some(view)
    }

    fn utf8_at(&self, index: u16) -> Option<&str> {
        self.utf8
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, s)| s.as_str())
    }

    /// Every `Utf8` constant.
    #[must_use]
    pub fn utf8_constants(&self) -> Vec<&str> {
        self.utf8.iter().map(|(_, s)| s.as_str()).collect()
    }

    /// Whether any `Utf8` constant contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.utf8.iter().any(|(_, s)| s.contains(needle))
    }

    /// Names referenced by `Class` constants.
    #[must_use]
    pub fn class_names(&self) -> Vec<&str> {
        self.classes
            .iter()
            .filter_map(|&(_, name)| self.utf8_at(name))
            .collect()
    }

    /// Values of `String` constants.
    #[must_use]
    pub fn string_constants(&self) -> Vec<&str> {
        self.strings.iter().filter_map(|&i| self.utf8_at(i)).collect()
    }

    /// Internal name of the class itself.
    #[must_use]
    pub fn this_class(&self) -> Option<&str> {
        let &(_, name) = self.classes.iter().find(|(i, _)| *i == self.this_class)?;
        self.utf8_at(name)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> Option<&[u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
