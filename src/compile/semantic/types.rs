use std::fmt::Display;

/// Checked types. `Unknown` stands for types the checker cannot pin down (loop items over
/// non-arrays, unresolvable annotations) and is compatible with everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Byte,
    Void,
    Pointer(Box<Type>),
    Array(Box<Type>, Option<u64>),
    Tuple(Vec<Type>),
    Struct(String),
    Enum(String),
    Interface(String),
    ErrorUnion(Box<Type>),
    /// The type of an `error.Name` value.
    Error,
    Atomic(Box<Type>),
    Unknown,
}

impl Type {
    pub fn primitive(name: &str) -> Option<Type> {
        let ty = match name {
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "u8" => Type::U8,
            "u16" => Type::U16,
            "u32" => Type::U32,
            "u64" | "usize" => Type::U64,
            "f32" => Type::F32,
            "f64" => Type::F64,
            "bool" => Type::Bool,
            "byte" => Type::Byte,
            "void" => Type::Void,
            _ => return None,
        };

        Some(ty)
    }

    /// Atomic wrappers only matter for the C output.
    pub fn unwrap_atomic(&self) -> &Type {
        match self {
            Type::Atomic(inner) => inner.unwrap_atomic(),
            other => other,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.unwrap_atomic(),
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
                | Type::Byte
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self.unwrap_atomic(), Type::F32 | Type::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.unwrap_atomic(), Type::Array(..))
    }

    pub fn array_size(&self) -> Option<u64> {
        match self.unwrap_atomic() {
            Type::Array(_, size) => *size,
            _ => None,
        }
    }

    pub fn array_element(&self) -> Option<&Type> {
        match self.unwrap_atomic() {
            Type::Array(elem, _) => Some(elem),
            _ => None,
        }
    }

    pub fn tuple_arity(&self) -> Option<usize> {
        match self.unwrap_atomic() {
            Type::Tuple(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Name of a nominal type, as it appears in the C output.
    pub fn nominal_name(&self) -> Option<&str> {
        match self.unwrap_atomic() {
            Type::Struct(name) | Type::Enum(name) | Type::Interface(name) => Some(name),
            _ => None,
        }
    }

    /// Result type of an arithmetic operator: `f64` wins over `f32`, any float wins over
    /// integers, and two integers keep the left operand's type.
    pub fn promote(lhs: &Type, rhs: &Type) -> Type {
        let (lhs, rhs) = (lhs.unwrap_atomic(), rhs.unwrap_atomic());

        if *lhs == Type::F64 || *rhs == Type::F64 {
            return Type::F64;
        }

        if lhs.is_float() || rhs.is_float() {
            return Type::F32;
        }

        lhs.clone()
    }

    /// Whether a value of type `value` may be stored where `self` is expected.
    pub fn accepts(&self, value: &Type) -> bool {
        match (self.unwrap_atomic(), value.unwrap_atomic()) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (target, value) if target == value => true,
            (Type::ErrorUnion(_), Type::Error) => true,
            (Type::ErrorUnion(target), value) => target.accepts(value),
            (Type::Byte, Type::U8) | (Type::U8, Type::Byte) => true,
            (Type::Pointer(target), Type::Pointer(value)) => target.accepts(value),
            (Type::Array(target, target_size), Type::Array(value, value_size)) => {
                target.accepts(value)
                    && (target_size.is_none() || value_size.is_none() || target_size == value_size)
            }
            (Type::Tuple(targets), Type::Tuple(values)) => {
                targets.len() == values.len()
                    && targets.iter().zip(values).all(|(t, v)| t.accepts(v))
            }
            _ => false,
        }
    }

    /// Comparison operands must match exactly or both be numeric.
    pub fn comparable_with(&self, other: &Type) -> bool {
        (self.is_numeric() && other.is_numeric()) || self.accepts(other) || other.accepts(self)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::U32 => write!(f, "u32"),
            Type::U64 => write!(f, "u64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Bool => write!(f, "bool"),
            Type::Byte => write!(f, "byte"),
            Type::Void => write!(f, "void"),
            Type::Pointer(inner) => write!(f, "*{inner}"),
            Type::Array(elem, Some(size)) => write!(f, "[{elem} : {size}]"),
            Type::Array(elem, None) => write!(f, "[{elem}]"),
            Type::Tuple(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Type::Struct(name) | Type::Enum(name) | Type::Interface(name) => write!(f, "{name}"),
            Type::ErrorUnion(inner) => write!(f, "!{inner}"),
            Type::Error => write!(f, "error"),
            Type::Atomic(inner) => write!(f, "atomic {inner}"),
            Type::Unknown => write!(f, "{{unknown}}"),
        }
    }
}
