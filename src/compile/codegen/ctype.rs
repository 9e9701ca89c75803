use crate::compile::semantic::types::Type;

use super::LoweringError;

/// C spelling of a type in positions without a declarator, such as prototypes' return
/// types or `__typeof__` fallbacks. Arrays decay to a pointer to their element.
pub fn c_type(ty: &Type) -> Result<String, LoweringError> {
    let name = match ty {
        Type::I8 => "int8_t".to_string(),
        Type::I16 => "int16_t".to_string(),
        Type::I32 => "int32_t".to_string(),
        Type::I64 => "int64_t".to_string(),
        Type::U8 | Type::Bool | Type::Byte => "uint8_t".to_string(),
        Type::U16 => "uint16_t".to_string(),
        Type::U32 | Type::Error => "uint32_t".to_string(),
        Type::U64 => "uint64_t".to_string(),
        Type::F32 => "float".to_string(),
        Type::F64 => "double".to_string(),
        Type::Void => "void".to_string(),
        Type::Pointer(inner) => format!("{}*", c_type(inner)?),
        Type::Array(elem, _) => format!("{}*", c_type(elem)?),
        Type::Tuple(_) => format!("struct {}", mangle(ty)?),
        Type::Struct(name) => format!("struct {name}"),
        Type::Enum(name) => format!("enum {name}"),
        Type::Interface(_) => "struct interface".to_string(),
        Type::ErrorUnion(inner) => format!("struct error_union_{}", mangle(inner)?),
        Type::Atomic(inner) => format!("_Atomic({})", c_type(inner)?),
        Type::Unknown => {
            return Err(LoweringError::MalformedIr(
                "a value of unknown type has no C spelling".to_string(),
            ));
        }
    };

    Ok(name)
}

/// A full C declaration of `name` with type `ty`. Sized arrays keep their extent.
pub fn declarator(ty: &Type, name: &str) -> Result<String, LoweringError> {
    match ty {
        Type::Array(elem, Some(size)) => declarator(elem, &format!("{name}[{size}]")),
        Type::Array(elem, None) => declarator(elem, &format!("*{name}")),
        other => Ok(format!("{} {name}", c_type(other)?)),
    }
}

/// Identifier fragment naming a type inside generated struct tags.
pub fn mangle(ty: &Type) -> Result<String, LoweringError> {
    let name = match ty {
        Type::I8 => "i8".to_string(),
        Type::I16 => "i16".to_string(),
        Type::I32 => "i32".to_string(),
        Type::I64 => "i64".to_string(),
        Type::U8 => "u8".to_string(),
        Type::U16 => "u16".to_string(),
        Type::U32 => "u32".to_string(),
        Type::U64 => "u64".to_string(),
        Type::F32 => "f32".to_string(),
        Type::F64 => "f64".to_string(),
        Type::Bool => "bool".to_string(),
        Type::Byte => "byte".to_string(),
        Type::Void => "void".to_string(),
        Type::Error => "error".to_string(),
        Type::Pointer(inner) => format!("{}_ptr", mangle(inner)?),
        Type::Array(elem, Some(size)) => format!("{}_arr{size}", mangle(elem)?),
        Type::Array(elem, None) => format!("{}_slice", mangle(elem)?),
        Type::Tuple(items) => {
            let items = items.iter().map(mangle).collect::<Result<Vec<_>, _>>()?;
            format!("tuple_{}", items.join("_"))
        }
        Type::Struct(name) | Type::Enum(name) | Type::Interface(name) => name.clone(),
        Type::ErrorUnion(inner) => format!("error_union_{}", mangle(inner)?),
        Type::Atomic(inner) => format!("atomic_{}", mangle(inner)?),
        Type::Unknown => {
            return Err(LoweringError::MalformedIr(
                "error union or tuple over a type that cannot be named".to_string(),
            ));
        }
    };

    Ok(name)
}

/// Tags of the structs a value of `ty` holds by value. Their definitions have to come
/// before any struct with a field of type `ty`.
pub fn value_tags(ty: &Type) -> Result<Vec<String>, LoweringError> {
    match ty {
        Type::Struct(name) => Ok(vec![name.clone()]),
        Type::Tuple(_) | Type::ErrorUnion(_) => Ok(vec![mangle(ty)?]),
        Type::Array(elem, Some(_)) | Type::Atomic(elem) => value_tags(elem),
        _ => Ok(Vec::new()),
    }
}

/// Generated struct shapes, each recorded once in first-use order.
#[derive(Debug, Default)]
pub struct TypeCollector {
    pub tuples: Vec<Vec<Type>>,
    pub error_unions: Vec<Type>,
}

impl TypeCollector {
    pub fn visit(&mut self, ty: &Type) {
        match ty {
            Type::Pointer(inner) | Type::Array(inner, _) | Type::Atomic(inner) => self.visit(inner),
            Type::Tuple(items) => {
                items.iter().for_each(|item| self.visit(item));
                if !self.tuples.contains(items) {
                    self.tuples.push(items.clone());
                }
            }
            Type::ErrorUnion(inner) => {
                self.visit(inner);
                if !self.error_unions.contains(inner) {
                    self.error_unions.push((**inner).clone());
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TypeCollector, c_type, declarator, mangle, value_tags};
    use crate::compile::semantic::types::Type;

    #[test]
    fn primitive_spellings() {
        assert_eq!(c_type(&Type::I32).unwrap(), "int32_t");
        assert_eq!(c_type(&Type::Bool).unwrap(), "uint8_t");
        assert_eq!(c_type(&Type::F64).unwrap(), "double");
        assert_eq!(c_type(&Type::Pointer(Box::new(Type::Byte))).unwrap(), "uint8_t*");
        assert_eq!(c_type(&Type::Interface("Shape".into())).unwrap(), "struct interface");
    }

    #[test]
    fn error_unions_and_tuples_are_named_by_their_parts() {
        let tuple = Type::Tuple(vec![Type::I32, Type::Pointer(Box::new(Type::U8))]);
        assert_eq!(mangle(&tuple).unwrap(), "tuple_i32_u8_ptr");
        assert_eq!(c_type(&tuple).unwrap(), "struct tuple_i32_u8_ptr");
        assert_eq!(
            c_type(&Type::ErrorUnion(Box::new(Type::Struct("Point".into())))).unwrap(),
            "struct error_union_Point"
        );
    }

    #[test]
    fn array_declarators_keep_their_extent() {
        let nested = Type::Array(Box::new(Type::Array(Box::new(Type::I32), Some(3))), Some(2));
        assert_eq!(declarator(&nested, "grid").unwrap(), "int32_t grid[2][3]");
        assert_eq!(
            declarator(&Type::Array(Box::new(Type::U8), None), "buf").unwrap(),
            "uint8_t *buf"
        );
    }

    #[test]
    fn unknown_types_cannot_be_named() {
        assert!(mangle(&Type::ErrorUnion(Box::new(Type::Unknown))).is_err());
    }

    #[test]
    fn pointers_do_not_need_complete_structs() {
        let pair = Type::Tuple(vec![Type::I32, Type::I32]);
        assert_eq!(value_tags(&pair).unwrap(), vec!["tuple_i32_i32"]);
        assert_eq!(
            value_tags(&Type::Array(Box::new(Type::Struct("P".into())), Some(4))).unwrap(),
            vec!["P"]
        );
        assert!(value_tags(&Type::Pointer(Box::new(Type::Struct("P".into())))).unwrap().is_empty());
    }

    #[test]
    fn collector_records_each_shape_once() {
        let mut collector = TypeCollector::default();
        let pair = Type::Tuple(vec![Type::I32, Type::I32]);
        collector.visit(&Type::ErrorUnion(Box::new(pair.clone())));
        collector.visit(&Type::ErrorUnion(Box::new(pair.clone())));
        collector.visit(&Type::ErrorUnion(Box::new(Type::Void)));

        assert_eq!(collector.tuples, vec![vec![Type::I32, Type::I32]]);
        assert_eq!(collector.error_unions, vec![pair, Type::Void]);
    }
}
