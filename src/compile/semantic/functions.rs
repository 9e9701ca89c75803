use std::collections::HashMap;

use crate::compile::ast::SourcePos;

use super::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub param_types: Vec<Type>,
    pub return_type: Type,
    pub is_extern: bool,
    pub has_varargs: bool,
    pub span: SourcePos,
}

impl FunctionSignature {
    pub fn is_fallible(&self) -> bool {
        matches!(self.return_type, Type::ErrorUnion(_))
    }

    /// Whether a call with `count` arguments has the right arity.
    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.has_varargs {
            count >= self.param_types.len()
        } else {
            count == self.param_types.len()
        }
    }
}

/// Flat registry of function signatures. Names are unique; there is no overloading.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, FunctionSignature>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `signature`, handing back the existing signature on a name clash.
    pub fn register(&mut self, signature: FunctionSignature) -> Result<(), &FunctionSignature> {
        if self.functions.contains_key(&signature.name) {
            return Err(&self.functions[&signature.name]);
        }

        self.functions.insert(signature.name.clone(), signature);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(name: &str, params: Vec<Type>, varargs: bool) -> FunctionSignature {
        FunctionSignature {
            name: name.to_string(),
            param_types: params,
            return_type: Type::I32,
            is_extern: varargs,
            has_varargs: varargs,
            span: 0..0,
        }
    }

    #[test]
    fn second_registration_is_rejected() {
        let mut table = FunctionTable::new();
        assert!(table.register(signature("f", vec![], false)).is_ok());

        let err = table.register(signature("f", vec![Type::Bool], false));
        assert_eq!(err.map_err(|existing| existing.param_types.len()), Err(0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn varargs_accept_extra_arguments() {
        let printf = signature("printf", vec![Type::Pointer(Box::new(Type::Byte))], true);
        assert!(printf.accepts_arity(1));
        assert!(printf.accepts_arity(4));
        assert!(!printf.accepts_arity(0));

        let fixed = signature("add", vec![Type::I32, Type::I32], false);
        assert!(fixed.accepts_arity(2));
        assert!(!fixed.accepts_arity(3));
    }
}
