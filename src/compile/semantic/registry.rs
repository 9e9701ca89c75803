use std::collections::HashMap;

use thiserror::Error;

use crate::compile::ast::{SourcePos, TypeExpr};

use super::{
    const_eval::{ConstLookup, ConstValue, const_eval},
    types::Type,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Struct,
    Enum,
    Interface,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("unknown type `{0}`")]
    UnknownType(String, SourcePos),

    #[error("array size must be a non-negative constant integer")]
    InvalidArraySize(SourcePos),
}

impl ResolveError {
    pub fn span(&self) -> SourcePos {
        match self {
            ResolveError::UnknownType(_, span) | ResolveError::InvalidArraySize(span) => {
                span.clone()
            }
        }
    }
}

/// User declared type names and what is known about their shape.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    kinds: HashMap<String, (TypeKind, SourcePos)>,
    fields: HashMap<String, Vec<(String, Type)>>,
    variants: HashMap<String, Vec<String>>,
    methods: HashMap<String, Vec<String>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a type name, returning where it was declared before on a clash.
    pub fn declare(&mut self, name: &str, kind: TypeKind, span: SourcePos) -> Result<(), SourcePos> {
        if let Some((_, previous)) = self.kinds.get(name) {
            return Err(previous.clone());
        }

        self.kinds.insert(name.to_string(), (kind, span));
        Ok(())
    }

    pub fn kind(&self, name: &str) -> Option<TypeKind> {
        self.kinds.get(name).map(|(kind, _)| *kind)
    }

    pub fn set_fields(&mut self, name: &str, fields: Vec<(String, Type)>) {
        self.fields.insert(name.to_string(), fields);
    }

    pub fn set_variants(&mut self, name: &str, variants: Vec<String>) {
        self.variants.insert(name.to_string(), variants);
    }

    pub fn set_methods(&mut self, name: &str, methods: Vec<String>) {
        self.methods.insert(name.to_string(), methods);
    }

    pub fn fields(&self, name: &str) -> Option<&[(String, Type)]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn field(&self, name: &str, field: &str) -> Option<&Type> {
        self.fields(name)?
            .iter()
            .find(|(field_name, _)| field_name == field)
            .map(|(_, ty)| ty)
    }

    pub fn has_variant(&self, name: &str, variant: &str) -> bool {
        self.variants
            .get(name)
            .is_some_and(|variants| variants.iter().any(|v| v == variant))
    }

    pub fn has_method(&self, name: &str, method: &str) -> bool {
        self.methods
            .get(name)
            .is_some_and(|methods| methods.iter().any(|m| m == method))
    }

    /// Turns a written type into a checked one. Array sizes are folded with `consts`.
    pub fn resolve(&self, expr: &TypeExpr, consts: &impl ConstLookup) -> Result<Type, ResolveError> {
        let ty = match expr {
            TypeExpr::Named(name, span) => {
                if let Some(ty) = Type::primitive(name) {
                    return Ok(ty);
                }

                match self.kind(name) {
                    Some(TypeKind::Struct) => Type::Struct(name.clone()),
                    Some(TypeKind::Enum) => Type::Enum(name.clone()),
                    Some(TypeKind::Interface) => Type::Interface(name.clone()),
                    // receiver type inside interface method signatures
                    None if name == "Self" => Type::Unknown,
                    None => return Err(ResolveError::UnknownType(name.clone(), span.clone())),
                }
            }
            TypeExpr::Pointer(inner, _) => Type::Pointer(Box::new(self.resolve(inner, consts)?)),
            TypeExpr::Array(elem, size, span) => {
                let elem = self.resolve(elem, consts)?;
                let size = match const_eval(size, consts) {
                    Some(ConstValue::Int(size)) => u64::try_from(size)
                        .map_err(|_| ResolveError::InvalidArraySize(span.clone()))?,
                    _ => return Err(ResolveError::InvalidArraySize(span.clone())),
                };

                Type::Array(Box::new(elem), Some(size))
            }
            TypeExpr::Tuple(items, _) => Type::Tuple(
                items
                    .iter()
                    .map(|item| self.resolve(item, consts))
                    .collect::<Result<_, _>>()?,
            ),
            TypeExpr::ErrorUnion(inner, _) => {
                Type::ErrorUnion(Box::new(self.resolve(inner, consts)?))
            }
            TypeExpr::Atomic(inner, _) => Type::Atomic(Box::new(self.resolve(inner, consts)?)),
        };

        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ast::{Expr, int_literal::IntLiteral};

    fn named(name: &str) -> TypeExpr {
        TypeExpr::Named(name.to_string(), 0..0)
    }

    #[test]
    fn nominal_names_resolve_by_kind() {
        let mut registry = TypeRegistry::new();
        registry.declare("Point", TypeKind::Struct, 0..5).unwrap();
        registry.declare("Color", TypeKind::Enum, 6..11).unwrap();

        assert_eq!(registry.resolve(&named("Point"), &()), Ok(Type::Struct("Point".into())));
        assert_eq!(registry.resolve(&named("Color"), &()), Ok(Type::Enum("Color".into())));
        assert_eq!(
            registry.resolve(&named("Nope"), &()),
            Err(ResolveError::UnknownType("Nope".into(), 0..0))
        );
        assert_eq!(registry.declare("Point", TypeKind::Enum, 20..25), Err(0..5));
    }

    #[test]
    fn array_sizes_are_folded() {
        let registry = TypeRegistry::new();
        let size = Expr::Int(IntLiteral::new("4".to_string(), 10), 0..0);
        let array = TypeExpr::Array(Box::new(named("i32")), Box::new(size), 0..0);

        assert_eq!(
            registry.resolve(&array, &()),
            Ok(Type::Array(Box::new(Type::I32), Some(4)))
        );

        let unknown = TypeExpr::Array(
            Box::new(named("i32")),
            Box::new(Expr::Ident("n".into(), 3..4)),
            1..5,
        );
        assert_eq!(
            registry.resolve(&unknown, &()),
            Err(ResolveError::InvalidArraySize(1..5))
        );
    }
}
