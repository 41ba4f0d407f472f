//! Classfile parser: raw classfile bytes to `ClassInfo`, no classloading.
//!
//! Only the structures needed for metadata are parsed: constant pool, class
//! header, field and method tables, and the attributes of interest
//! (`Signature`, `RuntimeVisibleAnnotations`,
//! `RuntimeVisibleParameterAnnotations`, `MethodParameters`,
//! `ConstantValue`). Everything else is skipped by its recorded length.
//! Constant-pool strings are decoded lazily from buffered offsets, so a
//! classfile full of irrelevant constants costs no string allocations.

use thiserror::Error;

use crate::class_info::{
    AnnotationInfo, AnnotationParam, AnnotationValue, ClassInfo, FieldInfo, MethodInfo,
    MethodParameterInfo, ParameterAlignmentError, align_parameter_metadata,
};
use crate::reader::{ClassfileReader, ReadError};

const CLASSFILE_MAGIC: u32 = 0xcafe_babe;

#[derive(Debug, Error)]
pub enum ClassfileParseError {
    #[error("bad classfile magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unknown constant pool tag {tag} at index {index}")]
    BadConstantPoolTag { tag: u8, index: u16 },
    #[error("constant pool index {index} does not hold a {expected}")]
    BadConstantPoolRef { index: u16, expected: &'static str },
    #[error("unknown annotation element tag {0:?}")]
    BadElementTag(char),
    #[error("unsupported ConstantValue field descriptor {0:?}")]
    BadConstantValueDescriptor(String),
    #[error(transparent)]
    Alignment(#[from] ParameterAlignmentError),
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// One constant-pool slot. String payloads stay in the reader's buffer as
/// offsets until something resolves them.
#[derive(Debug, Clone, Copy)]
enum CpEntry {
    /// Offset of the u16 length prefix in the classfile.
    Utf8 { offset: usize },
    /// Offset of the 4- or 8-byte payload.
    Primitive { offset: usize },
    Class { name_index: u16 },
    StringRef { utf8_index: u16 },
    /// Member refs, name-and-type pairs and the invokedynamic family; their
    /// payloads are never resolved here.
    Other,
    /// Second slot of a long/double, and the unused slot zero.
    Unused,
}

struct ConstantPool {
    entries: Vec<CpEntry>,
}

impl ConstantPool {
    fn entry(&self, index: u16) -> Result<CpEntry, ClassfileParseError> {
        self.entries
            .get(index as usize)
            .copied()
            .ok_or(ClassfileParseError::BadConstantPoolRef {
                index,
                expected: "valid entry",
            })
    }

    fn utf8(
        &self,
        index: u16,
        reader: &mut ClassfileReader<'_>,
        replace_slash_with_dot: bool,
        strip_lsemicolon: bool,
    ) -> Result<String, ClassfileParseError> {
        match self.entry(index)? {
            CpEntry::Utf8 { offset } => {
                Ok(reader.utf8_at(offset, replace_slash_with_dot, strip_lsemicolon)?)
            }
            _ => Err(ClassfileParseError::BadConstantPoolRef {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Dotted class name behind a `Class` entry.
    fn class_name(
        &self,
        index: u16,
        reader: &mut ClassfileReader<'_>,
    ) -> Result<String, ClassfileParseError> {
        match self.entry(index)? {
            CpEntry::Class { name_index } => self.utf8(name_index, reader, true, false),
            _ => Err(ClassfileParseError::BadConstantPoolRef {
                index,
                expected: "Class",
            }),
        }
    }

    fn primitive_offset(&self, index: u16) -> Result<usize, ClassfileParseError> {
        match self.entry(index)? {
            CpEntry::Primitive { offset } => Ok(offset),
            _ => Err(ClassfileParseError::BadConstantPoolRef {
                index,
                expected: "primitive constant",
            }),
        }
    }

    fn string_value(
        &self,
        index: u16,
        reader: &mut ClassfileReader<'_>,
    ) -> Result<String, ClassfileParseError> {
        match self.entry(index)? {
            CpEntry::StringRef { utf8_index } => self.utf8(utf8_index, reader, false, false),
            CpEntry::Utf8 { .. } => self.utf8(index, reader, false, false),
            _ => Err(ClassfileParseError::BadConstantPoolRef {
                index,
                expected: "String",
            }),
        }
    }
}

/// Parse one classfile into a `ClassInfo`. A failure here is scoped to this
/// classfile; callers log and continue the scan.
pub fn parse_classfile(
    reader: &mut ClassfileReader<'_>,
) -> Result<ClassInfo, ClassfileParseError> {
    let magic = reader.read_u32()?;
    if magic != CLASSFILE_MAGIC {
        return Err(ClassfileParseError::BadMagic(magic));
    }
    // minor, major version: not needed for metadata.
    reader.skip(4)?;

    let pool = read_constant_pool(reader)?;

    let access_flags = reader.read_u16()?;
    let this_class = reader.read_u16()?;
    let class_name = pool.class_name(this_class, reader)?;
    let super_class = reader.read_u16()?;
    // Index zero only for java/lang/Object.
    let superclass_name = if super_class == 0 {
        None
    } else {
        Some(pool.class_name(super_class, reader)?)
    };

    let interface_count = reader.read_u16()?;
    let mut interface_names = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let idx = reader.read_u16()?;
        interface_names.push(pool.class_name(idx, reader)?);
    }

    let field_count = reader.read_u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(read_field(reader, &pool)?);
    }

    let method_count = reader.read_u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(read_method(reader, &pool, &class_name)?);
    }

    let mut annotations = Vec::new();
    let mut type_signature_str = None;
    let attr_count = reader.read_u16()?;
    for _ in 0..attr_count {
        let name_idx = reader.read_u16()?;
        let len = reader.read_u32()? as usize;
        let attr_name = pool.utf8(name_idx, reader, false, false)?;
        match attr_name.as_str() {
            "Signature" => {
                let sig_idx = reader.read_u16()?;
                type_signature_str = Some(pool.utf8(sig_idx, reader, false, false)?);
            }
            "RuntimeVisibleAnnotations" => {
                annotations = read_annotations(reader, &pool)?;
            }
            _ => reader.skip(len)?,
        }
    }

    Ok(ClassInfo::new(
        class_name,
        access_flags,
        superclass_name,
        interface_names,
        annotations,
        fields,
        methods,
        type_signature_str,
    ))
}

fn read_constant_pool(
    reader: &mut ClassfileReader<'_>,
) -> Result<ConstantPool, ClassfileParseError> {
    let count = reader.read_u16()?;
    let mut entries = vec![CpEntry::Unused; count as usize];
    let mut index = 1u16;
    while index < count {
        let tag = reader.read_u8()?;
        let mut double_slot = false;
        entries[index as usize] = match tag {
            1 => {
                let offset = reader.position();
                let len = reader.read_u16()? as usize;
                reader.skip(len)?;
                CpEntry::Utf8 { offset }
            }
            3 | 4 => {
                let offset = reader.position();
                reader.skip(4)?;
                CpEntry::Primitive { offset }
            }
            5 | 6 => {
                let offset = reader.position();
                reader.skip(8)?;
                double_slot = true;
                CpEntry::Primitive { offset }
            }
            7 => CpEntry::Class {
                name_index: reader.read_u16()?,
            },
            8 => CpEntry::StringRef {
                utf8_index: reader.read_u16()?,
            },
            // Fieldref / Methodref / InterfaceMethodref / NameAndType /
            // Dynamic / InvokeDynamic
            9 | 10 | 11 | 12 | 17 | 18 => {
                reader.skip(4)?;
                CpEntry::Other
            }
            // MethodHandle
            15 => {
                reader.skip(3)?;
                CpEntry::Other
            }
            // MethodType / Module / Package
            16 | 19 | 20 => {
                reader.skip(2)?;
                CpEntry::Other
            }
            _ => return Err(ClassfileParseError::BadConstantPoolTag { tag, index }),
        };
        index += if double_slot { 2 } else { 1 };
    }
    Ok(ConstantPool { entries })
}

fn read_field(
    reader: &mut ClassfileReader<'_>,
    pool: &ConstantPool,
) -> Result<FieldInfo, ClassfileParseError> {
    let modifiers = reader.read_u16()?;
    let name_idx = reader.read_u16()?;
    let desc_idx = reader.read_u16()?;
    let name = pool.utf8(name_idx, reader, false, false)?;
    let descriptor = pool.utf8(desc_idx, reader, false, false)?;

    let mut type_signature_str = None;
    let mut annotations = Vec::new();
    let mut constant_initializer = None;

    let attr_count = reader.read_u16()?;
    for _ in 0..attr_count {
        let attr_name_idx = reader.read_u16()?;
        let len = reader.read_u32()? as usize;
        let attr_name = pool.utf8(attr_name_idx, reader, false, false)?;
        match attr_name.as_str() {
            "Signature" => {
                let sig_idx = reader.read_u16()?;
                type_signature_str = Some(pool.utf8(sig_idx, reader, false, false)?);
            }
            "RuntimeVisibleAnnotations" => {
                annotations = read_annotations(reader, pool)?;
            }
            "ConstantValue" => {
                let value_idx = reader.read_u16()?;
                constant_initializer =
                    Some(read_constant_value(reader, pool, value_idx, &descriptor)?);
            }
            _ => reader.skip(len)?,
        }
    }

    Ok(FieldInfo {
        name,
        modifiers,
        descriptor,
        type_signature_str,
        annotations,
        constant_initializer,
    })
}

fn read_method(
    reader: &mut ClassfileReader<'_>,
    pool: &ConstantPool,
    class_name: &str,
) -> Result<MethodInfo, ClassfileParseError> {
    let modifiers = reader.read_u16()?;
    let name_idx = reader.read_u16()?;
    let desc_idx = reader.read_u16()?;
    let name = pool.utf8(name_idx, reader, false, false)?;
    let descriptor = pool.utf8(desc_idx, reader, false, false)?;

    let mut type_signature_str = None;
    let mut annotations = Vec::new();
    let mut param_names: Vec<Option<String>> = Vec::new();
    let mut param_modifiers: Vec<u16> = Vec::new();
    let mut param_annotations: Vec<Vec<AnnotationInfo>> = Vec::new();

    let attr_count = reader.read_u16()?;
    for _ in 0..attr_count {
        let attr_name_idx = reader.read_u16()?;
        let len = reader.read_u32()? as usize;
        let attr_name = pool.utf8(attr_name_idx, reader, false, false)?;
        match attr_name.as_str() {
            "Signature" => {
                let sig_idx = reader.read_u16()?;
                type_signature_str = Some(pool.utf8(sig_idx, reader, false, false)?);
            }
            "RuntimeVisibleAnnotations" => {
                annotations = read_annotations(reader, pool)?;
            }
            // Present only when the producing compiler opted in
            // (javac -parameters).
            "MethodParameters" => {
                let count = reader.read_u8()?;
                for _ in 0..count {
                    let pname_idx = reader.read_u16()?;
                    let pflags = reader.read_u16()?;
                    let pname = if pname_idx == 0 {
                        None
                    } else {
                        Some(pool.utf8(pname_idx, reader, false, false)?)
                    };
                    param_names.push(pname);
                    param_modifiers.push(pflags);
                }
            }
            "RuntimeVisibleParameterAnnotations" => {
                let count = reader.read_u8()?;
                for _ in 0..count {
                    param_annotations.push(read_annotations(reader, pool)?);
                }
            }
            _ => reader.skip(len)?,
        }
    }

    let arity = descriptor_arity(&descriptor);
    let parameters: Vec<MethodParameterInfo> =
        align_parameter_metadata(arity, param_names, param_modifiers, param_annotations)?;

    Ok(MethodInfo::new(
        class_name.to_string(),
        name,
        modifiers,
        descriptor,
        type_signature_str,
        annotations,
        parameters,
    ))
}

/// Parameter count of a method descriptor, the ground truth that parameter
/// metadata is aligned against.
fn descriptor_arity(descriptor: &str) -> usize {
    let bytes = descriptor.as_bytes();
    let mut i = 0;
    // Move past '('.
    if bytes.first() == Some(&b'(') {
        i = 1;
    }
    let mut arity = 0;
    while i < bytes.len() && bytes[i] != b')' {
        while i < bytes.len() && bytes[i] == b'[' {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'L' {
            while i < bytes.len() && bytes[i] != b';' {
                i += 1;
            }
        }
        i += 1;
        arity += 1;
    }
    arity
}

fn read_annotations(
    reader: &mut ClassfileReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<AnnotationInfo>, ClassfileParseError> {
    let count = reader.read_u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(read_annotation(reader, pool)?);
    }
    Ok(annotations)
}

fn read_annotation(
    reader: &mut ClassfileReader<'_>,
    pool: &ConstantPool,
) -> Result<AnnotationInfo, ClassfileParseError> {
    let type_idx = reader.read_u16()?;
    // The type is an object descriptor like `Lcom/foo/Ann;`.
    let class_name = pool.utf8(type_idx, reader, true, true)?;
    let pair_count = reader.read_u16()?;
    let mut params = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let name_idx = reader.read_u16()?;
        let name = pool.utf8(name_idx, reader, false, false)?;
        let value = read_element_value(reader, pool)?;
        params.push(AnnotationParam { name, value });
    }
    Ok(AnnotationInfo { class_name, params })
}

fn read_element_value(
    reader: &mut ClassfileReader<'_>,
    pool: &ConstantPool,
) -> Result<AnnotationValue, ClassfileParseError> {
    let tag = reader.read_u8()? as char;
    Ok(match tag {
        'B' | 'C' | 'I' | 'S' | 'Z' => {
            let idx = reader.read_u16()?;
            let offset = pool.primitive_offset(idx)?;
            let raw = reader.u32_at(offset)? as i32;
            match tag {
                'B' => AnnotationValue::Byte(raw as i8),
                'C' => AnnotationValue::Char(
                    char::from_u32(raw as u32).unwrap_or(char::REPLACEMENT_CHARACTER),
                ),
                'S' => AnnotationValue::Short(raw as i16),
                'Z' => AnnotationValue::Boolean(raw != 0),
                _ => AnnotationValue::Int(raw),
            }
        }
        'J' => {
            let idx = reader.read_u16()?;
            let offset = pool.primitive_offset(idx)?;
            AnnotationValue::Long(reader.u64_at(offset)? as i64)
        }
        'F' => {
            let idx = reader.read_u16()?;
            let offset = pool.primitive_offset(idx)?;
            AnnotationValue::Float(f32::from_bits(reader.u32_at(offset)?))
        }
        'D' => {
            let idx = reader.read_u16()?;
            let offset = pool.primitive_offset(idx)?;
            AnnotationValue::Double(f64::from_bits(reader.u64_at(offset)?))
        }
        's' => {
            let idx = reader.read_u16()?;
            AnnotationValue::Str(pool.utf8(idx, reader, false, false)?)
        }
        'e' => {
            let type_idx = reader.read_u16()?;
            let const_idx = reader.read_u16()?;
            AnnotationValue::EnumConst {
                class_name: pool.utf8(type_idx, reader, true, true)?,
                const_name: pool.utf8(const_idx, reader, false, false)?,
            }
        }
        'c' => {
            let idx = reader.read_u16()?;
            AnnotationValue::ClassRef(pool.utf8(idx, reader, true, true)?)
        }
        '@' => AnnotationValue::Annotation(read_annotation(reader, pool)?),
        '[' => {
            let count = reader.read_u16()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(read_element_value(reader, pool)?);
            }
            AnnotationValue::Array(values)
        }
        other => return Err(ClassfileParseError::BadElementTag(other)),
    })
}

fn read_constant_value(
    reader: &mut ClassfileReader<'_>,
    pool: &ConstantPool,
    value_idx: u16,
    descriptor: &str,
) -> Result<AnnotationValue, ClassfileParseError> {
    Ok(match descriptor {
        "B" | "C" | "I" | "S" | "Z" => {
            let raw = reader.u32_at(pool.primitive_offset(value_idx)?)? as i32;
            match descriptor {
                "B" => AnnotationValue::Byte(raw as i8),
                "C" => AnnotationValue::Char(
                    char::from_u32(raw as u32).unwrap_or(char::REPLACEMENT_CHARACTER),
                ),
                "S" => AnnotationValue::Short(raw as i16),
                "Z" => AnnotationValue::Boolean(raw != 0),
                _ => AnnotationValue::Int(raw),
            }
        }
        "J" => AnnotationValue::Long(reader.u64_at(pool.primitive_offset(value_idx)?)? as i64),
        "F" => AnnotationValue::Float(f32::from_bits(
            reader.u32_at(pool.primitive_offset(value_idx)?)?,
        )),
        "D" => AnnotationValue::Double(f64::from_bits(
            reader.u64_at(pool.primitive_offset(value_idx)?)?,
        )),
        "Ljava/lang/String;" => AnnotationValue::Str(pool.string_value(value_idx, reader)?),
        other => {
            return Err(ClassfileParseError::BadConstantValueDescriptor(
                other.to_string(),
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal classfile assembler for tests. Only what the parser reads is
    /// modelled; member tables are supplied as raw bytes built with the
    /// helpers below.
    struct ClassfileBuilder {
        cp: Vec<Vec<u8>>,
        slots: u16,
    }

    impl ClassfileBuilder {
        fn new() -> Self {
            Self {
                cp: Vec::new(),
                slots: 0,
            }
        }

        fn utf8(&mut self, s: &str) -> u16 {
            let mut e = vec![1u8];
            e.extend_from_slice(&(s.len() as u16).to_be_bytes());
            e.extend_from_slice(s.as_bytes());
            self.push(e, 1)
        }

        fn class(&mut self, name: &str) -> u16 {
            let name_idx = self.utf8(name);
            let mut e = vec![7u8];
            e.extend_from_slice(&name_idx.to_be_bytes());
            self.push(e, 1)
        }

        fn integer(&mut self, v: i32) -> u16 {
            let mut e = vec![3u8];
            e.extend_from_slice(&v.to_be_bytes());
            self.push(e, 1)
        }

        fn long(&mut self, v: i64) -> u16 {
            let mut e = vec![5u8];
            e.extend_from_slice(&v.to_be_bytes());
            self.push(e, 2)
        }

        fn string(&mut self, s: &str) -> u16 {
            let utf8_idx = self.utf8(s);
            let mut e = vec![8u8];
            e.extend_from_slice(&utf8_idx.to_be_bytes());
            self.push(e, 1)
        }

        fn push(&mut self, entry: Vec<u8>, slots: u16) -> u16 {
            self.cp.push(entry);
            let idx = self.slots + 1;
            self.slots += slots;
            idx
        }

        fn assemble(
            &self,
            access: u16,
            this_idx: u16,
            super_idx: u16,
            fields: (u16, &[u8]),
            methods: (u16, &[u8]),
            class_attrs: (u16, &[u8]),
        ) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(&0xcafe_babeu32.to_be_bytes());
            out.extend_from_slice(&[0, 0, 0, 52]);
            out.extend_from_slice(&(self.slots + 1).to_be_bytes());
            for e in &self.cp {
                out.extend_from_slice(e);
            }
            out.extend_from_slice(&access.to_be_bytes());
            out.extend_from_slice(&this_idx.to_be_bytes());
            out.extend_from_slice(&super_idx.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
            out.extend_from_slice(&fields.0.to_be_bytes());
            out.extend_from_slice(fields.1);
            out.extend_from_slice(&methods.0.to_be_bytes());
            out.extend_from_slice(methods.1);
            out.extend_from_slice(&class_attrs.0.to_be_bytes());
            out.extend_from_slice(class_attrs.1);
            out
        }
    }

    fn attribute(name_idx: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = name_idx.to_be_bytes().to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn parses_minimal_class_header() {
        let mut b = ClassfileBuilder::new();
        let this_idx = b.class("com/foo/Bar");
        let super_idx = b.class("com/foo/Base");
        let bytes = b.assemble(0x0021, this_idx, super_idx, (0, &[]), (0, &[]), (0, &[]));

        let mut reader = ClassfileReader::from_bytes(&bytes);
        let info = parse_classfile(&mut reader).unwrap();
        assert_eq!(info.name, "com.foo.Bar");
        assert_eq!(info.superclass_name.as_deref(), Some("com.foo.Base"));
        assert!(info.interface_names.is_empty());
        assert!(info.fields.is_empty());
        assert!(info.methods.is_empty());
    }

    #[test]
    fn superclass_index_zero_means_root_object() {
        let mut b = ClassfileBuilder::new();
        let this_idx = b.class("java/lang/Object");
        let bytes = b.assemble(0x0021, this_idx, 0, (0, &[]), (0, &[]), (0, &[]));

        let mut reader = ClassfileReader::from_bytes(&bytes);
        let info = parse_classfile(&mut reader).unwrap();
        assert_eq!(info.name, "java.lang.Object");
        assert_eq!(info.superclass_name, None);
    }

    #[test]
    fn bad_magic_is_a_fatal_parse_error_for_the_classfile() {
        let bytes = [0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 52];
        let mut reader = ClassfileReader::from_bytes(&bytes);
        assert!(matches!(
            parse_classfile(&mut reader),
            Err(ClassfileParseError::BadMagic(0xdeadbeef))
        ));
    }

    #[test]
    fn truncated_classfile_is_a_parse_error() {
        let mut b = ClassfileBuilder::new();
        let this_idx = b.class("com/foo/Bar");
        let super_idx = b.class("com/foo/Base");
        let bytes = b.assemble(0x0021, this_idx, super_idx, (0, &[]), (0, &[]), (0, &[]));

        let mut reader = ClassfileReader::from_bytes(&bytes[..bytes.len() - 6]);
        assert!(matches!(
            parse_classfile(&mut reader),
            Err(ClassfileParseError::Read(_))
        ));
    }

    #[test]
    fn parses_field_with_signature_and_constant() {
        let mut b = ClassfileBuilder::new();
        let this_idx = b.class("com/foo/Bar");
        let super_idx = b.class("java/lang/Object");
        let field_name = b.utf8("COUNT");
        let field_desc = b.utf8("J");
        let sig_attr_name = b.utf8("Signature");
        let sig_value = b.utf8("TT;");
        let cv_attr_name = b.utf8("ConstantValue");
        let long_idx = b.long(1_234_567_890_123);

        let mut field = Vec::new();
        field.extend_from_slice(&0x0019u16.to_be_bytes()); // public static final
        field.extend_from_slice(&field_name.to_be_bytes());
        field.extend_from_slice(&field_desc.to_be_bytes());
        field.extend_from_slice(&2u16.to_be_bytes());
        field.extend_from_slice(&attribute(sig_attr_name, &sig_value.to_be_bytes()));
        field.extend_from_slice(&attribute(cv_attr_name, &long_idx.to_be_bytes()));

        let bytes = b.assemble(0x0021, this_idx, super_idx, (1, &field), (0, &[]), (0, &[]));
        let mut reader = ClassfileReader::from_bytes(&bytes);
        let info = parse_classfile(&mut reader).unwrap();

        let f = &info.fields[0];
        assert_eq!(f.name, "COUNT");
        assert_eq!(f.descriptor, "J");
        assert_eq!(f.type_signature_str.as_deref(), Some("TT;"));
        assert_eq!(
            f.constant_initializer,
            Some(AnnotationValue::Long(1_234_567_890_123))
        );
    }

    #[test]
    fn parses_method_annotations_and_right_aligned_parameters() {
        let mut b = ClassfileBuilder::new();
        let this_idx = b.class("com/foo/Bar");
        let super_idx = b.class("java/lang/Object");
        let m_name = b.utf8("doWork");
        let m_desc = b.utf8("(Ljava/lang/String;IJ)V");
        let mp_attr = b.utf8("MethodParameters");
        let p_name = b.utf8("value");
        let ann_attr = b.utf8("RuntimeVisibleAnnotations");
        let ann_type = b.utf8("Lcom/foo/Marker;");
        let ann_param_name = b.utf8("level");
        let ann_param_value = b.integer(3);

        // MethodParameters with a single recorded entry against arity 3.
        let mut mp = vec![1u8];
        mp.extend_from_slice(&p_name.to_be_bytes());
        mp.extend_from_slice(&0x8000u16.to_be_bytes());

        // One annotation: @Marker(level = 3)
        let mut ann = 1u16.to_be_bytes().to_vec();
        ann.extend_from_slice(&ann_type.to_be_bytes());
        ann.extend_from_slice(&1u16.to_be_bytes());
        ann.extend_from_slice(&ann_param_name.to_be_bytes());
        ann.push(b'I');
        ann.extend_from_slice(&ann_param_value.to_be_bytes());

        let mut method = Vec::new();
        method.extend_from_slice(&0x0001u16.to_be_bytes());
        method.extend_from_slice(&m_name.to_be_bytes());
        method.extend_from_slice(&m_desc.to_be_bytes());
        method.extend_from_slice(&2u16.to_be_bytes());
        method.extend_from_slice(&attribute(mp_attr, &mp));
        method.extend_from_slice(&attribute(ann_attr, &ann));

        let bytes = b.assemble(0x0021, this_idx, super_idx, (0, &[]), (1, &method), (0, &[]));
        let mut reader = ClassfileReader::from_bytes(&bytes);
        let info = parse_classfile(&mut reader).unwrap();

        let m = &info.methods[0];
        assert_eq!(m.name, "doWork");
        assert_eq!(m.parameters.len(), 3);
        assert_eq!(m.parameters[0].name, None);
        assert_eq!(m.parameters[1].name, None);
        assert_eq!(m.parameters[2].name.as_deref(), Some("value"));
        assert_eq!(m.parameters[2].modifiers, 0x8000);

        assert_eq!(m.annotations.len(), 1);
        assert_eq!(m.annotations[0].class_name, "com.foo.Marker");
        assert_eq!(m.annotations[0].params[0].name, "level");
        assert_eq!(m.annotations[0].params[0].value, AnnotationValue::Int(3));
    }

    #[test]
    fn class_annotation_with_nested_values() {
        let mut b = ClassfileBuilder::new();
        let this_idx = b.class("com/foo/Bar");
        let super_idx = b.class("java/lang/Object");
        let ann_attr = b.utf8("RuntimeVisibleAnnotations");
        let ann_type = b.utf8("Lcom/foo/Config;");
        let p_names = b.utf8("names");
        let s1 = b.string("a");
        let s2 = b.string("b");
        let p_kind = b.utf8("kind");
        let enum_type = b.utf8("Lcom/foo/Kind;");
        let enum_const = b.utf8("FAST");

        let mut ann = 1u16.to_be_bytes().to_vec();
        ann.extend_from_slice(&ann_type.to_be_bytes());
        ann.extend_from_slice(&2u16.to_be_bytes());
        // names = {"a", "b"}
        ann.extend_from_slice(&p_names.to_be_bytes());
        ann.push(b'[');
        ann.extend_from_slice(&2u16.to_be_bytes());
        ann.push(b's');
        ann.extend_from_slice(&s1.to_be_bytes());
        ann.push(b's');
        ann.extend_from_slice(&s2.to_be_bytes());
        // kind = Kind.FAST
        ann.extend_from_slice(&p_kind.to_be_bytes());
        ann.push(b'e');
        ann.extend_from_slice(&enum_type.to_be_bytes());
        ann.extend_from_slice(&enum_const.to_be_bytes());

        let attrs = attribute(ann_attr, &ann);
        let bytes = b.assemble(0x0021, this_idx, super_idx, (0, &[]), (0, &[]), (1, &attrs));
        let mut reader = ClassfileReader::from_bytes(&bytes);
        let info = parse_classfile(&mut reader).unwrap();

        let ann = &info.annotations[0];
        assert_eq!(ann.class_name, "com.foo.Config");
        assert_eq!(
            ann.params[0].value,
            AnnotationValue::Array(vec![
                AnnotationValue::Str("a".to_string()),
                AnnotationValue::Str("b".to_string()),
            ])
        );
        assert_eq!(
            ann.params[1].value,
            AnnotationValue::EnumConst {
                class_name: "com.foo.Kind".to_string(),
                const_name: "FAST".to_string(),
            }
        );
    }

    #[test]
    fn unknown_attributes_are_skipped_by_length() {
        let mut b = ClassfileBuilder::new();
        let this_idx = b.class("com/foo/Bar");
        let super_idx = b.class("java/lang/Object");
        let junk_attr = b.utf8("SourceFile");
        let junk_val = b.utf8("Bar.java");

        let attrs = attribute(junk_attr, &junk_val.to_be_bytes());
        let bytes = b.assemble(0x0021, this_idx, super_idx, (0, &[]), (0, &[]), (1, &attrs));
        let mut reader = ClassfileReader::from_bytes(&bytes);
        let info = parse_classfile(&mut reader).unwrap();
        assert_eq!(info.name, "com.foo.Bar");
        assert!(info.type_signature_str.is_none());
    }

    #[test]
    fn descriptor_arity_counts_all_parameter_kinds() {
        assert_eq!(descriptor_arity("()V"), 0);
        assert_eq!(descriptor_arity("(IJ)V"), 2);
        assert_eq!(descriptor_arity("(Ljava/lang/String;[I[[Lcom/foo/Bar;D)V"), 4);
    }
}
