//! Recursive-descent parser for JVM generic type signatures.
//!
//! Signatures are the extended type encoding emitted for generic code
//! (`Lcom/foo/Bar<Ljava/lang/String;>;`), as opposed to plain descriptors.
//! The parser produces an immutable tree; `Display` renders the tree back to
//! signature text, and re-parsing that text yields a structurally equal tree.

use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid type signature at offset {offset}: expected {expected}, found {found:?}")]
pub struct SignatureParseError {
    pub offset: usize,
    pub expected: &'static str,
    pub found: Option<char>,
}

/// Primitive or void type, the single-character base types of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Void,
}

impl BaseType {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            'V' => BaseType::Void,
            _ => return None,
        })
    }

    fn to_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
            BaseType::Void => 'V',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wildcard {
    /// A concrete type argument, no wildcard.
    None,
    /// `*` — carries no bound signature.
    Any,
    /// `+` bound.
    Extends,
    /// `-` bound.
    Super,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeArgument {
    pub wildcard: Wildcard,
    /// `None` exactly when the wildcard is `Any`.
    pub signature: Option<TypeSignature>,
}

/// A class reference with type arguments and any nested-class suffixes
/// (`Lcom/a/Outer<TT;>.Inner<TU;>;`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassRefTypeSignature {
    /// Internal (slash-separated) binary name of the outermost class.
    pub class_name: String,
    pub type_arguments: Vec<TypeArgument>,
    /// Dotted static-nested-class segments, each with its own arguments.
    pub suffixes: Vec<(String, Vec<TypeArgument>)>,
}

impl ClassRefTypeSignature {
    fn for_each_type_variable<F: FnMut(&mut TypeVariableSignature)>(&mut self, f: &mut F) {
        for arg in self
            .type_arguments
            .iter_mut()
            .chain(self.suffixes.iter_mut().flat_map(|(_, args)| args.iter_mut()))
        {
            if let Some(sig) = arg.signature.as_mut() {
                sig.for_each_type_variable(f);
            }
        }
    }

    fn set_defining_class(&mut self, class_name: &str) {
        self.for_each_type_variable(&mut |v| {
            v.defining_class = Some(class_name.to_string());
        });
    }

    /// Fully-qualified dotted name including nested-class suffixes, without
    /// generic arguments.
    pub fn fully_qualified_class_name(&self) -> String {
        let mut name = self.class_name.replace('/', ".");
        for (suffix, _) in &self.suffixes {
            name.push('$');
            name.push_str(suffix);
        }
        name
    }
}

/// Identity of the method a signature was attached to. Variables seen in a
/// method signature resolve outward from the method's own `<...>` parameters
/// before falling back to the class's, so the method has to be identifiable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodIdentity {
    /// Internal (slash-separated) name of the declaring class.
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
}

/// A reference to a type variable (`TT;`). The defining class and method are
/// back-reference identifiers set after parsing; they never participate in
/// equality or hashing, so independently parsed identical signatures
/// compare equal. `defining_method` is set only for variables that appeared
/// in a method signature.
#[derive(Debug, Clone)]
pub struct TypeVariableSignature {
    pub name: String,
    pub defining_class: Option<String>,
    pub defining_method: Option<MethodIdentity>,
}

impl PartialEq for TypeVariableSignature {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeVariableSignature {}

impl Hash for TypeVariableSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayTypeSignature {
    pub element: Box<TypeSignature>,
    pub num_dims: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    Base(BaseType),
    ClassRef(ClassRefTypeSignature),
    TypeVariable(TypeVariableSignature),
    Array(ArrayTypeSignature),
}

impl TypeSignature {
    /// Compare ignoring generic type arguments: class references match on
    /// raw class name alone, arrays on dimensionality plus element
    /// comparison. Used for covariant-return/bridge-method matching.
    pub fn equals_ignoring_type_params(&self, other: &TypeSignature) -> bool {
        match (self, other) {
            (TypeSignature::Base(a), TypeSignature::Base(b)) => a == b,
            (TypeSignature::ClassRef(a), TypeSignature::ClassRef(b)) => {
                a.class_name == b.class_name
                    && a.suffixes.len() == b.suffixes.len()
                    && a.suffixes
                        .iter()
                        .zip(&b.suffixes)
                        .all(|((sa, _), (sb, _))| sa == sb)
            }
            (TypeSignature::TypeVariable(a), TypeSignature::TypeVariable(b)) => a.name == b.name,
            (TypeSignature::Array(a), TypeSignature::Array(b)) => {
                a.num_dims == b.num_dims && a.element.equals_ignoring_type_params(&b.element)
            }
            _ => false,
        }
    }

    fn for_each_type_variable<F: FnMut(&mut TypeVariableSignature)>(&mut self, f: &mut F) {
        match self {
            TypeSignature::Base(_) => {}
            TypeSignature::ClassRef(c) => c.for_each_type_variable(f),
            TypeSignature::TypeVariable(v) => f(v),
            TypeSignature::Array(a) => a.element.for_each_type_variable(f),
        }
    }

    fn set_defining_class(&mut self, class_name: &str) {
        self.for_each_type_variable(&mut |v| {
            v.defining_class = Some(class_name.to_string());
        });
    }

    fn set_defining_method(&mut self, identity: &MethodIdentity) {
        self.for_each_type_variable(&mut |v| {
            v.defining_class = Some(identity.class_name.clone());
            v.defining_method = Some(identity.clone());
        });
    }
}

/// One `<T:...:...>` entry: identifier, optional class bound, zero or more
/// interface bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeParameter {
    pub name: String,
    pub class_bound: Option<TypeSignature>,
    pub interface_bounds: Vec<TypeSignature>,
}

/// Parsed `Signature` attribute of a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassTypeSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub superclass: ClassRefTypeSignature,
    pub interfaces: Vec<ClassRefTypeSignature>,
}

/// Parsed `Signature` attribute of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodTypeSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameter_types: Vec<TypeSignature>,
    pub result: TypeSignature,
    pub throws: Vec<TypeSignature>,
}

impl MethodTypeSignature {
    /// Arity of the (possibly generic) parameter list.
    pub fn arity(&self) -> usize {
        self.parameter_types.len()
    }
}

/// Parse a type signature or plain type descriptor (`[[I`, `TT;`,
/// `Lcom/foo/Bar<...>;`).
pub fn parse_type_signature(text: &str) -> Result<TypeSignature, SignatureParseError> {
    let mut p = Parser::new(text);
    let sig = p.type_signature()?;
    p.expect_end()?;
    Ok(sig)
}

/// Parse the `Signature` attribute of a class, recording `class_name` as
/// the defining class on every type variable in the tree.
pub fn parse_class_signature(
    text: &str,
    class_name: &str,
) -> Result<ClassTypeSignature, SignatureParseError> {
    let mut p = Parser::new(text);
    let mut type_parameters = p.type_parameters()?;
    let mut superclass = p.class_ref_type_signature()?;
    superclass.set_defining_class(class_name);
    let mut interfaces = Vec::new();
    while !p.at_end() {
        let mut itf = p.class_ref_type_signature()?;
        itf.set_defining_class(class_name);
        interfaces.push(itf);
    }
    for param in &mut type_parameters {
        if let Some(cb) = param.class_bound.as_mut() {
            cb.set_defining_class(class_name);
        }
        for ib in &mut param.interface_bounds {
            ib.set_defining_class(class_name);
        }
    }
    Ok(ClassTypeSignature {
        type_parameters,
        superclass,
        interfaces,
    })
}

/// Parse the `Signature` attribute (or plain descriptor) of a method,
/// recording the declaring class and method identity on every type variable
/// so a bound lookup can start at the method's own type parameters.
pub fn parse_method_signature(
    text: &str,
    class_name: &str,
    method_name: &str,
    descriptor: &str,
) -> Result<MethodTypeSignature, SignatureParseError> {
    let identity = MethodIdentity {
        class_name: class_name.to_string(),
        method_name: method_name.to_string(),
        descriptor: descriptor.to_string(),
    };
    let mut p = Parser::new(text);
    let mut type_parameters = p.type_parameters()?;
    p.expect('(')?;
    let mut parameter_types = Vec::new();
    while p.peek() != Some(')') {
        parameter_types.push(p.type_signature()?);
    }
    p.expect(')')?;
    let mut result = p.type_signature()?;
    let mut throws = Vec::new();
    while p.peek() == Some('^') {
        p.next();
        let t = match p.peek() {
            Some('T') => p.type_signature()?,
            _ => TypeSignature::ClassRef(p.class_ref_type_signature()?),
        };
        throws.push(t);
    }
    p.expect_end()?;
    for param in &mut type_parameters {
        if let Some(cb) = param.class_bound.as_mut() {
            cb.set_defining_method(&identity);
        }
        for ib in &mut param.interface_bounds {
            ib.set_defining_method(&identity);
        }
    }
    for sig in parameter_types.iter_mut().chain(throws.iter_mut()) {
        sig.set_defining_method(&identity);
    }
    result.set_defining_method(&identity);
    Ok(MethodTypeSignature {
        type_parameters,
        parameter_types,
        result,
        throws,
    })
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.bytes.get(self.pos).map(|&b| b as char)
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn err(&self, expected: &'static str) -> SignatureParseError {
        SignatureParseError {
            offset: self.pos,
            expected,
            found: self.peek(),
        }
    }

    fn expect(&mut self, c: char) -> Result<(), SignatureParseError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(match c {
                '(' => self.err("'('"),
                ')' => self.err("')'"),
                ';' => self.err("';'"),
                '>' => self.err("'>'"),
                ':' => self.err("':'"),
                _ => self.err("literal"),
            })
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn expect_end(&self) -> Result<(), SignatureParseError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.err("end of signature"))
        }
    }

    /// An identifier runs until one of the grammar's delimiter characters.
    fn identifier(&mut self) -> Result<String, SignatureParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ';' | ':' | '<' | '>' | '.' | '/' | '[' | '^' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("identifier"));
        }
        // Signature text is ASCII-delimited; identifier bytes are valid UTF-8
        // because the attribute string came from modified-UTF-8 decoding.
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn type_parameters(&mut self) -> Result<Vec<TypeParameter>, SignatureParseError> {
        if self.peek() != Some('<') {
            return Ok(Vec::new());
        }
        self.next();
        let mut params = Vec::new();
        while self.peek() != Some('>') {
            let name = self.identifier()?;
            self.expect(':')?;
            // The class bound may be empty (interface-only bounds).
            let class_bound = match self.peek() {
                Some(':') | Some('>') | None => None,
                _ => Some(self.reference_type_signature()?),
            };
            let mut interface_bounds = Vec::new();
            while self.peek() == Some(':') {
                self.next();
                interface_bounds.push(self.reference_type_signature()?);
            }
            params.push(TypeParameter {
                name,
                class_bound,
                interface_bounds,
            });
        }
        self.expect('>')?;
        Ok(params)
    }

    fn type_signature(&mut self) -> Result<TypeSignature, SignatureParseError> {
        match self.peek() {
            Some('[') => {
                let mut num_dims = 0usize;
                while self.peek() == Some('[') {
                    self.next();
                    num_dims += 1;
                }
                let element = self.type_signature()?;
                Ok(TypeSignature::Array(ArrayTypeSignature {
                    element: Box::new(element),
                    num_dims,
                }))
            }
            Some('L') => Ok(TypeSignature::ClassRef(self.class_ref_type_signature()?)),
            Some('T') => {
                self.next();
                let name = self.identifier()?;
                self.expect(';')?;
                Ok(TypeSignature::TypeVariable(TypeVariableSignature {
                    name,
                    defining_class: None,
                    defining_method: None,
                }))
            }
            Some(c) if BaseType::from_char(c).is_some() => {
                self.next();
                Ok(TypeSignature::Base(BaseType::from_char(c).unwrap()))
            }
            _ => Err(self.err("type signature")),
        }
    }

    fn reference_type_signature(&mut self) -> Result<TypeSignature, SignatureParseError> {
        match self.peek() {
            Some('L') | Some('T') | Some('[') => self.type_signature(),
            _ => Err(self.err("reference type signature")),
        }
    }

    fn class_ref_type_signature(
        &mut self,
    ) -> Result<ClassRefTypeSignature, SignatureParseError> {
        if self.peek() != Some('L') {
            return Err(self.err("'L'"));
        }
        self.next();
        let mut class_name = self.identifier()?;
        while self.peek() == Some('/') {
            self.next();
            class_name.push('/');
            class_name.push_str(&self.identifier()?);
        }
        let type_arguments = self.type_arguments()?;
        let mut suffixes = Vec::new();
        while self.peek() == Some('.') {
            self.next();
            let suffix = self.identifier()?;
            let args = self.type_arguments()?;
            suffixes.push((suffix, args));
        }
        self.expect(';')?;
        Ok(ClassRefTypeSignature {
            class_name,
            type_arguments,
            suffixes,
        })
    }

    fn type_arguments(&mut self) -> Result<Vec<TypeArgument>, SignatureParseError> {
        if self.peek() != Some('<') {
            return Ok(Vec::new());
        }
        self.next();
        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some('>') => break,
                Some('*') => {
                    self.next();
                    args.push(TypeArgument {
                        wildcard: Wildcard::Any,
                        signature: None,
                    });
                }
                Some('+') => {
                    self.next();
                    args.push(TypeArgument {
                        wildcard: Wildcard::Extends,
                        signature: Some(self.reference_type_signature()?),
                    });
                }
                Some('-') => {
                    self.next();
                    args.push(TypeArgument {
                        wildcard: Wildcard::Super,
                        signature: Some(self.reference_type_signature()?),
                    });
                }
                Some(_) => {
                    args.push(TypeArgument {
                        wildcard: Wildcard::None,
                        signature: Some(self.reference_type_signature()?),
                    });
                }
                None => return Err(self.err("type argument")),
            }
        }
        self.expect('>')?;
        if args.is_empty() {
            return Err(self.err("type argument"));
        }
        Ok(args)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

impl fmt::Display for TypeArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.wildcard {
            Wildcard::Any => write!(f, "*"),
            Wildcard::Extends => write!(f, "+{}", self.signature.as_ref().unwrap()),
            Wildcard::Super => write!(f, "-{}", self.signature.as_ref().unwrap()),
            Wildcard::None => write!(f, "{}", self.signature.as_ref().unwrap()),
        }
    }
}

fn write_type_arguments(f: &mut fmt::Formatter<'_>, args: &[TypeArgument]) -> fmt::Result {
    if !args.is_empty() {
        write!(f, "<")?;
        for a in args {
            write!(f, "{a}")?;
        }
        write!(f, ">")?;
    }
    Ok(())
}

impl fmt::Display for ClassRefTypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.class_name)?;
        write_type_arguments(f, &self.type_arguments)?;
        for (suffix, args) in &self.suffixes {
            write!(f, ".{suffix}")?;
            write_type_arguments(f, args)?;
        }
        write!(f, ";")
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Base(b) => write!(f, "{b}"),
            TypeSignature::ClassRef(c) => write!(f, "{c}"),
            TypeSignature::TypeVariable(v) => write!(f, "T{};", v.name),
            TypeSignature::Array(a) => {
                for _ in 0..a.num_dims {
                    write!(f, "[")?;
                }
                write!(f, "{}", a.element)
            }
        }
    }
}

fn write_type_parameters(f: &mut fmt::Formatter<'_>, params: &[TypeParameter]) -> fmt::Result {
    if !params.is_empty() {
        write!(f, "<")?;
        for p in params {
            write!(f, "{}:", p.name)?;
            if let Some(cb) = &p.class_bound {
                write!(f, "{cb}")?;
            }
            for ib in &p.interface_bounds {
                write!(f, ":{ib}")?;
            }
        }
        write!(f, ">")?;
    }
    Ok(())
}

impl fmt::Display for ClassTypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type_parameters(f, &self.type_parameters)?;
        write!(f, "{}", self.superclass)?;
        for itf in &self.interfaces {
            write!(f, "{itf}")?;
        }
        Ok(())
    }
}

impl fmt::Display for MethodTypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type_parameters(f, &self.type_parameters)?;
        write!(f, "(")?;
        for p in &self.parameter_types {
            write!(f, "{p}")?;
        }
        write!(f, "){}", self.result)?;
        for t in &self.throws {
            write!(f, "^{t}")?;
        }
        Ok(())
    }
}
