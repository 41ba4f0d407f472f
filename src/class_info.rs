//! Class metadata assembled from parsed classfiles.
//!
//! These types hold only what the classfile parser extracted; nothing here
//! touches a classloader. Generic signatures are kept as raw strings and
//! parsed on first access through a compute-once cell, falling back to the
//! plain descriptor when no `Signature` attribute was present.

use once_cell::sync::OnceCell;

use crate::signature::{
    ClassTypeSignature, MethodTypeSignature, SignatureParseError, parse_class_signature,
    parse_method_signature,
};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

/// One scanned class, interface, enum or annotation.
#[derive(Debug)]
pub struct ClassInfo {
    /// Fully-qualified dotted name, unique within a scan result.
    pub name: String,
    pub modifiers: u16,
    /// Absent only for `java.lang.Object`.
    pub superclass_name: Option<String>,
    pub interface_names: Vec<String>,
    pub annotations: Vec<AnnotationInfo>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    /// Raw `Signature` attribute, present only for generic classes.
    pub type_signature_str: Option<String>,
    parsed_signature: OnceCell<ClassTypeSignature>,
}

impl ClassInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        modifiers: u16,
        superclass_name: Option<String>,
        interface_names: Vec<String>,
        annotations: Vec<AnnotationInfo>,
        fields: Vec<FieldInfo>,
        methods: Vec<MethodInfo>,
        type_signature_str: Option<String>,
    ) -> Self {
        Self {
            name,
            modifiers,
            superclass_name,
            interface_names,
            annotations,
            fields,
            methods,
            type_signature_str,
            parsed_signature: OnceCell::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.modifiers & ACC_INTERFACE != 0 && !self.is_annotation()
    }

    pub fn is_annotation(&self) -> bool {
        self.modifiers & ACC_ANNOTATION != 0
    }

    pub fn is_enum(&self) -> bool {
        self.modifiers & ACC_ENUM != 0
    }

    pub fn has_annotation(&self, annotation_name: &str) -> bool {
        self.annotations.iter().any(|a| a.class_name == annotation_name)
    }

    /// Parsed generic class signature, computed once on first access.
    /// `None` when the class carries no `Signature` attribute.
    pub fn type_signature(&self) -> Result<Option<&ClassTypeSignature>, SignatureParseError> {
        let Some(text) = self.type_signature_str.as_deref() else {
            return Ok(None);
        };
        self.parsed_signature
            .get_or_try_init(|| parse_class_signature(text, &self.name))
            .map(Some)
    }
}

#[derive(Debug)]
pub struct FieldInfo {
    pub name: String,
    pub modifiers: u16,
    /// Non-generic type descriptor, e.g. `Ljava/lang/String;`.
    pub descriptor: String,
    pub type_signature_str: Option<String>,
    pub annotations: Vec<AnnotationInfo>,
    /// `ConstantValue` attribute, present on static final constants.
    pub constant_initializer: Option<AnnotationValue>,
}

/// One method, with parameter metadata right-aligned against the
/// descriptor's parameter count.
#[derive(Debug)]
pub struct MethodInfo {
    /// Dotted name of the defining class.
    pub class_name: String,
    pub name: String,
    pub modifiers: u16,
    /// Non-generic method descriptor, e.g. `(Ljava/lang/String;I)V`.
    pub descriptor: String,
    pub type_signature_str: Option<String>,
    pub annotations: Vec<AnnotationInfo>,
    pub parameters: Vec<MethodParameterInfo>,
    parsed_signature: OnceCell<MethodTypeSignature>,
}

impl MethodInfo {
    pub fn new(
        class_name: String,
        name: String,
        modifiers: u16,
        descriptor: String,
        type_signature_str: Option<String>,
        annotations: Vec<AnnotationInfo>,
        parameters: Vec<MethodParameterInfo>,
    ) -> Self {
        Self {
            class_name,
            name,
            modifiers,
            descriptor,
            type_signature_str,
            annotations,
            parameters,
            parsed_signature: OnceCell::new(),
        }
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Parsed method signature. Falls back to parsing the plain descriptor
    /// when no generic `Signature` attribute was recorded.
    pub fn type_signature(&self) -> Result<&MethodTypeSignature, SignatureParseError> {
        self.parsed_signature.get_or_try_init(|| {
            let text = self.type_signature_str.as_deref().unwrap_or(&self.descriptor);
            parse_method_signature(text, &self.class_name, &self.name, &self.descriptor)
        })
    }
}

/// Parameter metadata aligned to one descriptor parameter slot. Name and
/// annotations may be absent when the producing compiler did not record
/// them, or for synthetic/mandated leading parameters.
#[derive(Debug, Default)]
pub struct MethodParameterInfo {
    pub name: Option<String>,
    pub modifiers: u16,
    pub annotations: Vec<AnnotationInfo>,
}

/// Right-align shorter parameter-metadata arrays against the descriptor
/// arity. Some compilers insert synthetic or mandated parameters at the
/// front without recording metadata for them, so missing slots are padded
/// at the front with unknowns. This is a heuristic for those producers,
/// not a JVM-level guarantee. An array longer than the descriptor arity is
/// an error, since descriptor arity is ground truth.
pub fn align_parameter_metadata(
    arity: usize,
    names: Vec<Option<String>>,
    modifiers: Vec<u16>,
    annotations: Vec<Vec<AnnotationInfo>>,
) -> Result<Vec<MethodParameterInfo>, ParameterAlignmentError> {
    for (len, kind) in [
        (names.len(), "names"),
        (modifiers.len(), "modifiers"),
        (annotations.len(), "annotations"),
    ] {
        if len > arity {
            return Err(ParameterAlignmentError {
                kind,
                len,
                arity,
            });
        }
    }
    let mut params: Vec<MethodParameterInfo> =
        (0..arity).map(|_| MethodParameterInfo::default()).collect();
    let offset = arity - names.len();
    for (i, name) in names.into_iter().enumerate() {
        params[offset + i].name = name;
    }
    let offset = arity - modifiers.len();
    for (i, m) in modifiers.into_iter().enumerate() {
        params[offset + i].modifiers = m;
    }
    let offset = arity - annotations.len();
    for (i, a) in annotations.into_iter().enumerate() {
        params[offset + i].annotations = a;
    }
    Ok(params)
}

#[derive(Debug, thiserror::Error)]
#[error("parameter {kind} array has {len} entries but descriptor arity is {arity}")]
pub struct ParameterAlignmentError {
    pub kind: &'static str,
    pub len: usize,
    pub arity: usize,
}

/// One annotation occurrence with its parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationInfo {
    /// Dotted name of the annotation class.
    pub class_name: String,
    pub params: Vec<AnnotationParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationParam {
    pub name: String,
    pub value: AnnotationValue,
}

/// An annotation parameter value; values nest through annotations and
/// arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Str(String),
    EnumConst { class_name: String, const_name: String },
    ClassRef(String),
    Annotation(AnnotationInfo),
    Array(Vec<AnnotationValue>),
}
