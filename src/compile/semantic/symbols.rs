use crate::{
    compile::{ast::SourcePos, source::SourceFile},
    datstructures::scope_stack::{ScopeError, ScopeLevel, ScopeStack, Scoped},
    infra::diagnostic::{Diagnostic, Diagnostics},
};

use super::{
    SemanticError,
    const_eval::{ConstLookup, ConstValue},
    types::Type,
};

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub is_mutable: bool,
    pub is_const: bool,
    pub is_initialized: bool,
    pub is_modified: bool,
    pub scope_level: ScopeLevel,
    pub span: SourcePos,
    /// Folded initializer of a `const` declaration.
    pub const_value: Option<ConstValue>,
}

impl Symbol {
    pub fn variable(name: &str, ty: Type, initialized: bool, span: SourcePos) -> Self {
        Self {
            name: name.to_string(),
            ty,
            is_mutable: true,
            is_const: false,
            is_initialized: initialized,
            is_modified: false,
            scope_level: 0,
            span,
            const_value: None,
        }
    }

    /// Parameters and loop bindings: initialized and never assignable.
    pub fn binding(name: &str, ty: Type, span: SourcePos) -> Self {
        Self {
            is_mutable: false,
            ..Self::variable(name, ty, true, span)
        }
    }

    pub fn constant(name: &str, ty: Type, value: Option<ConstValue>, span: SourcePos) -> Self {
        Self {
            is_mutable: false,
            is_const: true,
            const_value: value,
            ..Self::variable(name, ty, true, span)
        }
    }

    pub fn original_type_name(&self) -> Option<&str> {
        self.ty.nominal_name()
    }

    pub fn array_size(&self) -> Option<u64> {
        self.ty.array_size()
    }

    pub fn array_element_type(&self) -> Option<&Type> {
        self.ty.array_element()
    }

    pub fn tuple_arity(&self) -> Option<usize> {
        self.ty.tuple_arity()
    }
}

impl Scoped for Symbol {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> ScopeLevel {
        self.scope_level
    }
}

/// Symbol store of the checker. Every symbol is tagged with the level that was current
/// when it was added.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    stack: ScopeStack<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_scope(&mut self) -> ScopeLevel {
        self.stack.enter()
    }

    pub fn exit_scope(&mut self) -> Result<ScopeLevel, ScopeError> {
        self.stack.exit()
    }

    pub fn current_level(&self) -> ScopeLevel {
        self.stack.current()
    }

    /// Adds `symbol` at the current level. A name already declared at this level is
    /// reported with both locations and the symbol is dropped.
    pub fn add(&mut self, mut symbol: Symbol, source: &SourceFile, diags: &mut Diagnostics) -> bool {
        symbol.scope_level = self.stack.current();

        if let Some(previous) = self.stack.get_in_level(&symbol.name, symbol.scope_level) {
            let err = SemanticError::DuplicateDefinition {
                name: symbol.name.clone(),
                at: source.span_location(&symbol.span).to_string(),
                previous: source.span_location(&previous.span).to_string(),
            };
            diags.push(
                Diagnostic::error(err.to_string(), symbol.span.clone())
                    .with_label(previous.span.clone(), "previously declared here"),
            );

            return false;
        }

        self.stack.insert(symbol).is_ok()
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.stack.lookup(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.stack.lookup_mut(name)
    }

    pub fn remove_all_in(&mut self, level: ScopeLevel) {
        self.stack.remove_all_in(level);
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl ConstLookup for SymbolTable {
    fn const_value(&self, name: &str) -> Option<ConstValue> {
        self.lookup(name)
            .filter(|symbol| symbol.is_const)
            .and_then(|symbol| symbol.const_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceFile {
        SourceFile::new("test.tora", "var x = 1;\nvar x = 2;\n")
    }

    #[test]
    fn duplicate_in_same_scope_reports_once() {
        let source = source();
        let mut diags = Diagnostics::new();
        let mut table = SymbolTable::new();

        assert!(table.add(Symbol::variable("x", Type::I32, true, 0..10), &source, &mut diags));
        assert!(!table.add(Symbol::variable("x", Type::I32, true, 11..21), &source, &mut diags));
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags.messages()[0],
            "duplicate definition of `x` at test.tora:2:1, previously declared at test.tora:1:1"
        );

        table.enter_scope();
        assert!(table.add(Symbol::variable("x", Type::Bool, true, 11..21), &source, &mut diags));
        assert_eq!(diags.len(), 1);
        assert_eq!(table.lookup("x").map(|s| &s.ty), Some(&Type::Bool));
    }

    #[test]
    fn exit_scope_restores_outer_binding() {
        let source = source();
        let mut diags = Diagnostics::new();
        let mut table = SymbolTable::new();

        table.add(Symbol::variable("x", Type::I32, true, 0..1), &source, &mut diags);
        let level = table.enter_scope();
        table.add(Symbol::variable("x", Type::F64, true, 0..1), &source, &mut diags);
        assert_eq!(table.exit_scope(), Ok(level));

        assert_eq!(table.lookup("x").map(|s| &s.ty), Some(&Type::I32));
        assert!(diags.is_empty());
    }

    #[test]
    fn only_constants_are_visible_to_const_eval() {
        let source = source();
        let mut diags = Diagnostics::new();
        let mut table = SymbolTable::new();

        table.add(
            Symbol::constant("N", Type::I32, Some(ConstValue::Int(4)), 0..1),
            &source,
            &mut diags,
        );
        table.add(Symbol::variable("m", Type::I32, true, 0..1), &source, &mut diags);

        assert_eq!(table.const_value("N"), Some(ConstValue::Int(4)));
        assert_eq!(table.const_value("m"), None);
    }
}
