use std::collections::HashMap;

use tracing::{debug, error, trace};

use crate::{
    compile::{
        ast::{
            AssignOp, BinaryOp, Block, CatchExpr, Decl, Expr, ForLoop, FunctionDecl, InterpSegment,
            MatchExpr, MatchPattern, Program, SourcePos, Stmt, TypeExpr, UnaryOp, VarDecl,
        },
        source::SourceFile,
    },
    infra::diagnostic::Diagnostics,
};

use super::{
    SemanticError,
    const_eval::{ConstLookup, ConstValue, const_eval},
    error_codes::{ErrorRegistry, RegistrationError},
    functions::{FunctionSignature, FunctionTable},
    registry::{ResolveError, TypeKind, TypeRegistry},
    symbols::{Symbol, SymbolTable},
    types::Type,
};

struct FunctionContext {
    name: String,
    return_type: Type,
}

/// Two-pass checker. Declarations and signatures are collected first, then globals and
/// function bodies are checked against them. A failing expression yields `None`, which
/// callers pass upward without reporting again.
pub struct TypeChecker<'a> {
    source: &'a SourceFile,
    symbols: SymbolTable,
    functions: FunctionTable,
    types: TypeRegistry,
    errors: ErrorRegistry,
    global_consts: HashMap<String, ConstValue>,
    diagnostics: Diagnostics,
    current_fn: Option<FunctionContext>,
}

impl ConstLookup for TypeChecker<'_> {
    fn const_value(&self, name: &str) -> Option<ConstValue> {
        match self.symbols.lookup(name) {
            Some(symbol) => symbol.is_const.then_some(symbol.const_value).flatten(),
            None => self.global_consts.get(name).copied(),
        }
    }
}

impl<'a> TypeChecker<'a> {
    pub fn new(source: &'a SourceFile) -> Self {
        Self {
            source,
            symbols: SymbolTable::new(),
            functions: FunctionTable::new(),
            types: TypeRegistry::new(),
            errors: ErrorRegistry::new(),
            global_consts: HashMap::new(),
            diagnostics: Diagnostics::new(),
            current_fn: None,
        }
    }

    pub fn check_program(mut self, program: &Program) -> Diagnostics {
        self.fold_global_consts(program);
        self.declare_types(program);
        self.collect_signatures(program);
        debug!("collected {} function signature(s)", self.functions.len());

        for decl in program.decls.iter() {
            if let Decl::Var(var) = decl {
                self.check_var_decl(var, true);
            }
        }

        for decl in program.decls.iter() {
            if let Decl::Function(function) = decl {
                self.check_function(function);
            }
        }

        self.diagnostics
    }

    fn report(&mut self, err: SemanticError, span: SourcePos) {
        trace!("{err}");
        self.diagnostics.push(err.at(span));
    }

    fn fail<T>(&mut self, err: SemanticError, span: SourcePos) -> Option<T> {
        self.report(err, span);
        None
    }

    fn declare(&mut self, symbol: Symbol) -> bool {
        self.symbols.add(symbol, self.source, &mut self.diagnostics)
    }

    fn exit_scope(&mut self) {
        if let Err(err) = self.symbols.exit_scope() {
            error!("unbalanced scope handling in checker: {err}");
        }
    }

    fn resolve_type(&mut self, expr: &TypeExpr) -> Option<Type> {
        match self.types.resolve(expr, &*self) {
            Ok(ty) => Some(ty),
            Err(err) => {
                let span = err.span();
                self.fail(err.into(), span)
            }
        }
    }

    // --- declarations -------------------------------------------------------------------

    /// Array sizes in signatures and struct fields may name global constants, which are
    /// not symbols yet at that point.
    fn fold_global_consts(&mut self, program: &Program) {
        for decl in program.decls.iter() {
            let Decl::Var(VarDecl {
                name,
                value: Some(value),
                is_const: true,
                ..
            }) = decl
            else {
                continue;
            };

            if let Some(value) = const_eval(value, &self.global_consts) {
                self.global_consts.insert(name.clone(), value);
            }
        }
    }

    fn declare_types(&mut self, program: &Program) {
        for decl in program.decls.iter() {
            let (name, kind, span) = match decl {
                Decl::Struct(decl) => (&decl.name, TypeKind::Struct, &decl.span),
                Decl::Enum(decl) => (&decl.name, TypeKind::Enum, &decl.span),
                Decl::Interface(decl) => (&decl.name, TypeKind::Interface, &decl.span),
                Decl::Error(decl) => {
                    self.register_error(&decl.name, decl.span.clone());
                    continue;
                }
                _ => continue,
            };

            if self.types.declare(name, kind, span.clone()).is_err() {
                self.report(SemanticError::DuplicateType(name.clone()), span.clone());
            }
        }

        // shapes may refer to any declared name
        for decl in program.decls.iter() {
            match decl {
                Decl::Struct(decl) => {
                    let fields = decl
                        .fields
                        .iter()
                        .map(|field| {
                            let ty = self.resolve_type(&field.ty).unwrap_or(Type::Unknown);
                            (field.name.clone(), ty)
                        })
                        .collect();
                    self.types.set_fields(&decl.name, fields);
                }
                Decl::Enum(decl) => {
                    let variants = decl.variants.iter().map(|v| v.name.clone()).collect();
                    self.types.set_variants(&decl.name, variants);
                }
                Decl::Interface(decl) => {
                    let methods = decl.methods.iter().map(|m| m.name.clone()).collect();
                    self.types.set_methods(&decl.name, methods);
                }
                _ => {}
            }
        }
    }

    fn register_error(&mut self, name: &str, span: SourcePos) {
        match self.errors.register(name, span.clone()) {
            Ok(code) => trace!("error `{name}` has code {code}"),
            Err(RegistrationError::Duplicate { previous }) => {
                let err = SemanticError::DuplicateDefinition {
                    name: name.to_string(),
                    at: self.source.span_location(&span).to_string(),
                    previous: self.source.span_location(&previous).to_string(),
                };
                self.diagnostics
                    .push(err.at(span).with_label(previous, "previously declared here"));
            }
            Err(RegistrationError::Collision { other, code }) => self.report(
                SemanticError::ErrorCodeCollision {
                    name: name.to_string(),
                    other,
                    code,
                },
                span,
            ),
        }
    }

    fn collect_signatures(&mut self, program: &Program) {
        for decl in program.decls.iter() {
            let (name, params, ret, is_extern, has_varargs, span) = match decl {
                Decl::Function(f) => (&f.name, &f.params, &f.ret, false, false, &f.span),
                Decl::Extern(e) => (&e.name, &e.params, &e.ret, true, e.has_varargs, &e.span),
                _ => continue,
            };

            let param_types = params
                .iter()
                .map(|param| self.resolve_type(&param.ty).unwrap_or(Type::Unknown))
                .collect();
            let return_type = self.resolve_type(ret).unwrap_or(Type::Unknown);

            let signature = FunctionSignature {
                name: name.clone(),
                param_types,
                return_type,
                is_extern,
                has_varargs,
                span: span.clone(),
            };

            if self.functions.register(signature).is_err() {
                self.report(SemanticError::DuplicateFunction(name.clone()), span.clone());
            }
        }
    }

    fn check_function(&mut self, function: &FunctionDecl) {
        debug!("checking body of `{}`", function.name);

        let (param_types, return_type) = match self.functions.lookup(&function.name) {
            Some(signature) => (signature.param_types.clone(), signature.return_type.clone()),
            None => (Vec::new(), Type::Unknown),
        };

        self.current_fn = Some(FunctionContext {
            name: function.name.clone(),
            return_type,
        });

        self.symbols.enter_scope();
        for (idx, param) in function.params.iter().enumerate() {
            let ty = param_types.get(idx).cloned().unwrap_or(Type::Unknown);
            self.declare(Symbol::binding(&param.name, ty, param.span.clone()));
        }

        self.check_block(&function.body);
        self.exit_scope();
        self.current_fn = None;
    }

    fn check_var_decl(&mut self, decl: &VarDecl, global: bool) {
        let annotated = decl.ty.as_ref().map(|ty| self.resolve_type(ty));
        let hint = annotated.clone().flatten();
        let found = decl
            .value
            .as_ref()
            .map(|value| self.check_expr_hinted(value, hint.as_ref()));

        let ty = match (annotated, found) {
            (Some(Some(expected)), Some(Some(found))) => {
                if !expected.accepts(&found) {
                    let span = decl.value.as_ref().map_or(decl.span.clone(), Expr::span);
                    self.report(
                        SemanticError::MismatchedTypes {
                            expected: expected.clone(),
                            found,
                        },
                        span,
                    );
                }
                expected
            }
            (Some(Some(expected)), _) => expected,
            (Some(None), _) | (None, Some(None)) => Type::Unknown,
            (None, Some(Some(found))) => found,
            (None, None) => {
                self.report(
                    SemanticError::CannotInferType(decl.name.clone()),
                    decl.span.clone(),
                );
                Type::Unknown
            }
        };

        if decl.is_const && decl.value.is_none() {
            self.report(
                SemanticError::ConstWithoutValue(decl.name.clone()),
                decl.span.clone(),
            );
        }

        let symbol = if decl.is_const {
            let value = decl.value.as_ref().and_then(|value| const_eval(value, &*self));
            Symbol::constant(&decl.name, ty, value, decl.span.clone())
        } else {
            // globals live in zeroed storage
            let initialized = global || decl.value.is_some();
            Symbol::variable(&decl.name, ty, initialized, decl.span.clone())
        };

        self.declare(symbol);
    }

    // --- statements ---------------------------------------------------------------------

    fn check_block(&mut self, block: &Block) -> Option<Type> {
        self.symbols.enter_scope();
        let ty = self.check_stmts(&block.stmts);
        self.exit_scope();

        ty
    }

    /// Checks statements in the current scope and returns the type of the last one, which
    /// is the block's value when the block is used as an expression.
    fn check_stmts(&mut self, stmts: &[Stmt]) -> Option<Type> {
        let mut last = Some(Type::Void);
        for stmt in stmts.iter() {
            last = self.check_stmt(stmt);
        }

        last
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Option<Type> {
        match stmt {
            Stmt::Var(decl) => self.check_var_decl(decl, false),
            Stmt::Expr(expr) => return self.check_expr(expr),
            Stmt::Assign(target, op, value, span) => self.check_assign(target, *op, value, span),
            Stmt::If(cond, then, otherwise, _) => {
                self.check_condition(cond);
                self.check_block(then);
                if let Some(otherwise) = otherwise {
                    self.check_block(otherwise);
                }
            }
            Stmt::While(cond, body, _) => {
                self.check_condition(cond);
                self.check_block(body);
            }
            Stmt::For(for_loop) => self.check_for(for_loop),
            Stmt::Return(value, span) => {
                self.check_return(value.as_ref(), span);
                // diverges, so it fits any block value
                return Some(Type::Unknown);
            }
            Stmt::Break(_) | Stmt::Continue(_) => return Some(Type::Unknown),
            Stmt::Block(block) | Stmt::Defer(block, _) | Stmt::ErrDefer(block, _) => {
                self.check_block(block);
            }
        }

        Some(Type::Void)
    }

    fn check_condition(&mut self, cond: &Expr) {
        let Some(ty) = self.check_expr(cond) else {
            return;
        };

        if *ty.unwrap_atomic() != Type::Bool && !ty.is_unknown() {
            self.report(SemanticError::ConditionNotBool(ty), cond.span());
        }
    }

    fn check_for(&mut self, for_loop: &ForLoop) {
        let item_ty = self
            .check_expr(&for_loop.iterable)
            .as_ref()
            .and_then(Type::array_element)
            .cloned()
            .unwrap_or(Type::Unknown);

        self.symbols.enter_scope();
        if let Some(item) = &for_loop.item {
            self.declare(Symbol::binding(item, item_ty, for_loop.span.clone()));
        }
        if let Some(index) = &for_loop.index {
            self.declare(Symbol::binding(index, Type::U64, for_loop.span.clone()));
        }

        self.check_block(&for_loop.body);
        self.exit_scope();
    }

    fn check_return(&mut self, value: Option<&Expr>, span: &SourcePos) {
        let Some(context) = &self.current_fn else {
            return;
        };
        let (name, expected) = (context.name.clone(), context.return_type.clone());

        let Some(value) = value else {
            let returns_nothing = expected.is_void()
                || expected.is_unknown()
                || expected == Type::ErrorUnion(Box::new(Type::Void));
            if !returns_nothing {
                self.report(SemanticError::MissingReturnValue(name), span.clone());
            }
            return;
        };

        if expected.is_void() {
            self.check_expr(value);
            self.report(SemanticError::ReturnValueInVoid(name), value.span());
            return;
        }

        if let Some(found) = self.check_expr_hinted(value, Some(&expected)) {
            if !expected.accepts(&found) {
                self.report(SemanticError::MismatchedTypes { expected, found }, value.span());
            }
        }
    }

    fn check_assign(&mut self, target: &Expr, op: AssignOp, value: &Expr, span: &SourcePos) {
        if !is_place(target) {
            self.check_expr(value);
            self.report(SemanticError::InvalidAssignTarget, target.span());
            return;
        }

        if let Some(name) = root_ident(target) {
            let state = self
                .symbols
                .lookup(name)
                .map(|symbol| (symbol.is_const, symbol.is_mutable));

            let err = match state {
                None => Some(SemanticError::UndefinedVariable(name.to_string())),
                Some((true, _)) => Some(SemanticError::AssignToConst(name.to_string())),
                Some((false, false)) => Some(SemanticError::AssignToImmutable(name.to_string())),
                Some((false, true)) => None,
            };

            if let Some(err) = err {
                self.check_expr(value);
                self.report(err, target.span());
                return;
            }
        }

        // a plain store to a variable is what initializes it
        let target_ty = match (target, op) {
            (Expr::Ident(name, _), AssignOp::Eq) => self.symbols.lookup(name).map(|s| s.ty.clone()),
            _ => self.check_expr(target),
        };

        match Option::<BinaryOp>::from(op) {
            Some(binary) => {
                if self.is_constant_zero_divisor(binary, value) {
                    let err = if binary == BinaryOp::Div {
                        SemanticError::DivisionByZero
                    } else {
                        SemanticError::ModuloByZero
                    };
                    self.report(err, span.clone());
                    return;
                }

                let found = self.check_expr_hinted(value, target_ty.as_ref());
                if let (Some(lhs), Some(rhs)) = (target_ty, found) {
                    let unknown = lhs.is_unknown() || rhs.is_unknown();
                    if !unknown && !(lhs.is_numeric() && rhs.is_numeric()) {
                        let op = binary.symbol();
                        self.report(SemanticError::NonNumericOperands { op, lhs, rhs }, span.clone());
                    }
                }
            }
            None => {
                let found = self.check_expr_hinted(value, target_ty.as_ref());
                if let (Some(expected), Some(found)) = (target_ty, found) {
                    if !expected.accepts(&found) {
                        self.report(SemanticError::MismatchedTypes { expected, found }, value.span());
                    }
                }
            }
        }

        if let Some(name) = root_ident(target) {
            if let Some(symbol) = self.symbols.lookup_mut(name) {
                symbol.is_modified = true;
                if matches!(target, Expr::Ident(..)) {
                    symbol.is_initialized = true;
                }
            }
        }
    }

    // --- expressions --------------------------------------------------------------------

    /// Checks `expr` where a value of type `hint` is expected. Constant literals adapt to
    /// the expected numeric type and array literals take the expected element type.
    fn check_expr_hinted(&mut self, expr: &Expr, hint: Option<&Type>) -> Option<Type> {
        let target = hint.map(|hint| match hint.unwrap_atomic() {
            Type::ErrorUnion(inner) => inner.as_ref(),
            other => other,
        });

        if let (Expr::Array(items, _), Some(Type::Array(elem, _))) = (expr, target) {
            return self.check_array(items, Some((**elem).clone()));
        }

        let found = self.check_expr(expr)?;
        if let Some(target) = target {
            if found.is_numeric() && self.adapts_to(expr, target) {
                return Some(target.clone());
            }
        }

        Some(found)
    }

    fn adapts_to(&self, expr: &Expr, target: &Type) -> bool {
        match const_eval(expr, self) {
            Some(ConstValue::Int(_)) => target.is_numeric(),
            Some(ConstValue::Float(_)) => target.is_float(),
            _ => false,
        }
    }

    fn is_constant_zero_divisor(&self, op: BinaryOp, rhs: &Expr) -> bool {
        matches!(op, BinaryOp::Div | BinaryOp::Mod)
            && const_eval(rhs, self).is_some_and(|value| value.is_zero())
    }

    pub fn check_expr(&mut self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::Int(..) => Some(Type::I32),
            Expr::Float(..) => Some(Type::F64),
            Expr::Bool(..) => Some(Type::Bool),
            Expr::Str(..) => Some(Type::Pointer(Box::new(Type::Byte))),
            Expr::Null(_) => Some(Type::Pointer(Box::new(Type::Unknown))),
            Expr::Ident(name, span) => self.check_ident(name, span),
            Expr::Unary(op, operand, span) => self.check_unary(*op, operand, span),
            Expr::Binary(op, lhs, rhs, span) => self.check_binary(*op, lhs, rhs, span),
            Expr::Call(name, args, span) => self.check_call(name, args, span),
            Expr::Member(object, field, span) => self.check_member(object, field, span),
            Expr::Subscript(object, index, span) => self.check_subscript(object, index, span),
            Expr::StructInit(name, fields, span) => self.check_struct_init(name, fields, span),
            Expr::Tuple(items, _) => {
                let types: Vec<Option<Type>> = items.iter().map(|item| self.check_expr(item)).collect();
                types.into_iter().collect::<Option<Vec<_>>>().map(Type::Tuple)
            }
            Expr::Array(items, _) => self.check_array(items, None),
            Expr::ErrorValue(name, span) => {
                if !self.errors.contains(name) {
                    return self.fail(SemanticError::UndefinedError(name.clone()), span.clone());
                }

                Some(Type::Error)
            }
            Expr::Catch(catch) => self.check_catch(catch),
            Expr::Match(matching) => self.check_match(matching),
            Expr::Interpolated(segments, _) => {
                for segment in segments.iter() {
                    if let InterpSegment::Expr(expr, _) = segment {
                        self.check_expr(expr);
                    }
                }

                Some(Type::Pointer(Box::new(Type::Byte)))
            }
        }
    }

    fn check_ident(&mut self, name: &str, span: &SourcePos) -> Option<Type> {
        let Some(symbol) = self.symbols.lookup(name) else {
            return self.fail(SemanticError::UndefinedVariable(name.to_string()), span.clone());
        };

        // arrays may be filled element by element
        if !symbol.is_initialized && !symbol.ty.is_array() {
            return self.fail(SemanticError::UsedBeforeInit(name.to_string()), span.clone());
        }

        Some(symbol.ty.clone())
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr, span: &SourcePos) -> Option<Type> {
        let ty = self.check_expr(operand)?;

        let result = match op {
            UnaryOp::Try => return self.check_try(ty, span),
            UnaryOp::AddrOf => Type::Pointer(Box::new(ty)),
            UnaryOp::Neg if ty.is_numeric() => ty,
            UnaryOp::LogicalNot if *ty.unwrap_atomic() == Type::Bool => Type::Bool,
            UnaryOp::BitwiseNot if ty.is_integer() => ty,
            UnaryOp::Deref if matches!(ty.unwrap_atomic(), Type::Pointer(_)) => match ty {
                Type::Pointer(inner) => *inner,
                Type::Atomic(atomic) => match *atomic {
                    Type::Pointer(inner) => *inner,
                    other => other,
                },
                other => other,
            },
            _ if ty.is_unknown() => Type::Unknown,
            _ => {
                let op = op.symbol();
                return self.fail(SemanticError::InvalidUnary { op, ty }, span.clone());
            }
        };

        Some(result)
    }

    fn check_try(&mut self, ty: Type, span: &SourcePos) -> Option<Type> {
        let in_fallible = self
            .current_fn
            .as_ref()
            .is_some_and(|f| matches!(f.return_type, Type::ErrorUnion(_)));

        if !in_fallible {
            return self.fail(SemanticError::TryOutsideFallible, span.clone());
        }

        match ty.unwrap_atomic() {
            Type::ErrorUnion(inner) => Some((**inner).clone()),
            Type::Unknown => Some(Type::Unknown),
            _ => self.fail(SemanticError::TryOnInfallible(ty), span.clone()),
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: &SourcePos,
    ) -> Option<Type> {
        // a constant zero divisor poisons the expression before its operands are typed
        if self.is_constant_zero_divisor(op, rhs) {
            let err = if op == BinaryOp::Div {
                SemanticError::DivisionByZero
            } else {
                SemanticError::ModuloByZero
            };
            return self.fail(err, span.clone());
        }

        let lhs_ty = self.check_expr(lhs);
        let rhs_ty = self.check_expr(rhs);
        let (lhs_ty, rhs_ty) = (lhs_ty?, rhs_ty?);

        if let Some(result) = self.check_error_comparison(op, &lhs_ty, &rhs_ty, span) {
            return result;
        }

        if lhs_ty.is_unknown() || rhs_ty.is_unknown() {
            let ty = if op.is_comparison() || op.is_logical() {
                Type::Bool
            } else {
                Type::Unknown
            };
            return Some(ty);
        }

        let symbol = op.symbol();
        if op == BinaryOp::Mod || op.is_bitwise() {
            if !(lhs_ty.is_integer() && rhs_ty.is_integer()) {
                let err = SemanticError::NonIntegerOperands {
                    op: symbol,
                    lhs: lhs_ty,
                    rhs: rhs_ty,
                };
                return self.fail(err, span.clone());
            }

            return Some(lhs_ty);
        }

        if op.is_arithmetic() {
            if !(lhs_ty.is_numeric() && rhs_ty.is_numeric()) {
                let err = SemanticError::NonNumericOperands {
                    op: symbol,
                    lhs: lhs_ty,
                    rhs: rhs_ty,
                };
                return self.fail(err, span.clone());
            }

            return Some(Type::promote(&lhs_ty, &rhs_ty));
        }

        if op.is_logical() {
            if *lhs_ty.unwrap_atomic() != Type::Bool || *rhs_ty.unwrap_atomic() != Type::Bool {
                let err = SemanticError::NonBoolOperands {
                    op: symbol,
                    lhs: lhs_ty,
                    rhs: rhs_ty,
                };
                return self.fail(err, span.clone());
            }

            return Some(Type::Bool);
        }

        if !lhs_ty.comparable_with(&rhs_ty) {
            return self.fail(SemanticError::CannotCompare(lhs_ty, rhs_ty), span.clone());
        }

        Some(Type::Bool)
    }

    /// Fallible results may only be tested for one specific error with `==`. Error codes
    /// bound by `catch` are plain integers and support `==` and `!=`.
    fn check_error_comparison(
        &mut self,
        op: BinaryOp,
        lhs: &Type,
        rhs: &Type,
        span: &SourcePos,
    ) -> Option<Option<Type>> {
        let other = match (lhs.unwrap_atomic(), rhs.unwrap_atomic()) {
            (Type::Error, other) | (other, Type::Error) => other,
            _ => return None,
        };

        if !op.is_comparison() {
            return None;
        }

        let fallible = matches!(other, Type::ErrorUnion(_) | Type::Error);
        if fallible && op != BinaryOp::Eq {
            return Some(self.fail(SemanticError::InvalidErrorOperator(op.symbol()), span.clone()));
        }

        let code_like = other.is_integer() || other.is_unknown();
        if fallible || (code_like && matches!(op, BinaryOp::Eq | BinaryOp::NotEq)) {
            return Some(Some(Type::Bool));
        }

        None
    }

    fn check_call(&mut self, name: &str, args: &[Expr], span: &SourcePos) -> Option<Type> {
        let Some(signature) = self.functions.lookup(name).cloned() else {
            for arg in args.iter() {
                self.check_expr(arg);
            }

            // builtin, yields an array of whatever it was given
            if name == "array" {
                return Some(Type::Array(Box::new(Type::Unknown), None));
            }

            return self.fail(SemanticError::UndefinedFunction(name.to_string()), span.clone());
        };

        if !signature.accepts_arity(args.len()) {
            for arg in args.iter() {
                self.check_expr(arg);
            }

            let (name, expected, found) = (name.to_string(), signature.param_types.len(), args.len());
            let err = if signature.has_varargs {
                SemanticError::TooFewVarargs { name, expected, found }
            } else {
                SemanticError::ArgumentCount { name, expected, found }
            };
            return self.fail(err, span.clone());
        }

        for (idx, arg) in args.iter().enumerate() {
            let expected = signature.param_types.get(idx);
            let found = self.check_expr_hinted(arg, expected);

            if let (Some(expected), Some(found)) = (expected, found) {
                if !expected.accepts(&found) {
                    let err = SemanticError::ArgumentMismatch {
                        name: name.to_string(),
                        index: idx + 1,
                        expected: expected.clone(),
                        found,
                    };
                    self.report(err, arg.span());
                }
            }
        }

        Some(signature.return_type)
    }

    fn check_member(&mut self, object: &Expr, field: &str, span: &SourcePos) -> Option<Type> {
        if let Expr::Ident(name, _) = object {
            let is_enum = self.types.kind(name) == Some(TypeKind::Enum);
            if is_enum && self.symbols.lookup(name).is_none() {
                if self.types.has_variant(name, field) {
                    return Some(Type::Enum(name.clone()));
                }

                let err = SemanticError::UnknownVariant(name.clone(), field.to_string());
                return self.fail(err, span.clone());
            }
        }

        let object_ty = self.check_expr(object)?;
        match object_ty.unwrap_atomic() {
            Type::Tuple(items) => match field.parse::<usize>() {
                Ok(idx) if idx < items.len() => Some(items[idx].clone()),
                _ => {
                    let err = SemanticError::TupleIndexOutOfRange {
                        index: field.to_string(),
                        arity: items.len(),
                    };
                    self.fail(err, span.clone())
                }
            },
            Type::Struct(name) => match self.types.field(name, field).cloned() {
                Some(ty) => Some(ty),
                None => {
                    let err = SemanticError::UnknownField(name.clone(), field.to_string());
                    self.fail(err, span.clone())
                }
            },
            Type::Unknown => Some(Type::Unknown),
            other => {
                let err = SemanticError::MemberOnNonStruct(field.to_string(), other.clone());
                self.fail(err, span.clone())
            }
        }
    }

    fn check_subscript(&mut self, object: &Expr, index: &Expr, span: &SourcePos) -> Option<Type> {
        let object_ty = self.check_expr(object);
        let index_ty = self.check_expr(index);
        let (object_ty, index_ty) = (object_ty?, index_ty?);

        if !index_ty.is_integer() && !index_ty.is_unknown() {
            return self.fail(SemanticError::IndexNotInteger(index_ty), index.span());
        }

        let constant_index = const_eval(index, &*self).and_then(|value| value.as_int());

        match object_ty.unwrap_atomic() {
            Type::Array(elem, size) => {
                if let (Some(size), Some(idx)) = (*size, constant_index) {
                    if idx < 0 || idx as u64 >= size {
                        let err = SemanticError::IndexOutOfBounds { index: idx, size };
                        return self.fail(err, index.span());
                    }
                }

                Some((**elem).clone())
            }
            Type::Pointer(inner) => Some((**inner).clone()),
            Type::Unknown => Some(Type::Unknown),
            other => self.fail(SemanticError::IndexNonArray(other.clone()), span.clone()),
        }
    }

    fn check_struct_init(
        &mut self,
        name: &str,
        fields: &[(String, Expr)],
        span: &SourcePos,
    ) -> Option<Type> {
        if self.types.kind(name) != Some(TypeKind::Struct) {
            for (_, value) in fields.iter() {
                self.check_expr(value);
            }

            let err = ResolveError::UnknownType(name.to_string(), span.clone());
            return self.fail(err.into(), span.clone());
        }

        let declared = self.types.fields(name).map(<[_]>::to_vec).unwrap_or_default();

        for (field, value) in fields.iter() {
            let Some((_, expected)) = declared.iter().find(|(known, _)| known == field) else {
                self.check_expr(value);
                let err = SemanticError::UnknownField(name.to_string(), field.clone());
                self.report(err, value.span());
                continue;
            };

            if let Some(found) = self.check_expr_hinted(value, Some(expected)) {
                if !expected.accepts(&found) {
                    let err = SemanticError::MismatchedTypes {
                        expected: expected.clone(),
                        found,
                    };
                    self.report(err, value.span());
                }
            }
        }

        for (declared, _) in declared.iter() {
            if !fields.iter().any(|(field, _)| field == declared) {
                let err = SemanticError::MissingField(name.to_string(), declared.clone());
                self.report(err, span.clone());
            }
        }

        Some(Type::Struct(name.to_string()))
    }

    fn check_array(&mut self, items: &[Expr], hint: Option<Type>) -> Option<Type> {
        let mut elem = hint;

        for item in items.iter() {
            let found = self.check_expr_hinted(item, elem.as_ref())?;

            if let Some(expected) = &elem {
                if !expected.accepts(&found) {
                    let expected = expected.clone();
                    return self.fail(SemanticError::MismatchedTypes { expected, found }, item.span());
                }
            } else {
                elem = Some(found);
            }
        }

        let elem = elem.unwrap_or(Type::Unknown);
        Some(Type::Array(Box::new(elem), Some(items.len() as u64)))
    }

    fn check_catch(&mut self, catch: &CatchExpr) -> Option<Type> {
        let payload = match self.check_expr(&catch.expr) {
            Some(Type::ErrorUnion(inner)) => Some(*inner),
            Some(Type::Unknown) => Some(Type::Unknown),
            Some(other) => {
                self.report(SemanticError::CatchOnInfallible(other), catch.expr.span());
                None
            }
            None => None,
        };

        self.symbols.enter_scope();
        if let Some(binding) = &catch.binding {
            self.declare(Symbol::binding(binding, Type::U32, catch.span.clone()));
        }
        let value = self.check_stmts(&catch.body.stmts);
        let literal_tail = match (catch.body.stmts.last(), &payload) {
            (Some(Stmt::Expr(tail)), Some(payload)) => self.adapts_to(tail, payload),
            _ => false,
        };
        self.exit_scope();

        let payload = payload?;
        if let Some(value) = value {
            if !payload.is_void() && !literal_tail && !payload.accepts(&value) {
                let err = SemanticError::MismatchedTypes {
                    expected: payload.clone(),
                    found: value,
                };
                self.report(err, catch.body.span.clone());
            }
        }

        Some(payload)
    }

    fn check_match(&mut self, matching: &MatchExpr) -> Option<Type> {
        let scrutinee = self.check_expr(&matching.scrutinee);
        let mut result: Option<Type> = None;

        for arm in matching.arms.iter() {
            if let MatchPattern::Value(pattern) = &arm.pattern {
                let pattern_ty = self.check_expr_hinted(pattern, scrutinee.as_ref());
                if let (Some(scrutinee), Some(pattern_ty)) = (&scrutinee, pattern_ty) {
                    if !scrutinee.comparable_with(&pattern_ty) {
                        let err = SemanticError::CannotCompare(scrutinee.clone(), pattern_ty);
                        self.report(err, pattern.span());
                    }
                }
            }

            let Some(found) = self.check_expr_hinted(&arm.value, result.as_ref()) else {
                continue;
            };

            if let Some(expected) = &result {
                if !expected.accepts(&found) {
                    let expected = expected.clone();
                    self.report(
                        SemanticError::MatchArmMismatch { expected, found },
                        arm.value.span(),
                    );
                }
            } else {
                result = Some(found);
            }
        }

        Some(result.unwrap_or(Type::Void))
    }
}

fn is_place(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(..) | Expr::Unary(UnaryOp::Deref, _, _) => true,
        Expr::Member(object, _, _) | Expr::Subscript(object, _, _) => is_place(object),
        _ => false,
    }
}

/// Variable a place expression ultimately writes into, if it does not go through a pointer.
fn root_ident(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Ident(name, _) => Some(name),
        Expr::Member(object, _, _) | Expr::Subscript(object, _, _) => root_ident(object),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::compile::{parser::parse_program, source::SourceFile};

    use super::TypeChecker;

    #[test]
    fn error_inequality_suggests_negating_the_equality() {
        let src = "error Oops;\nfn g() !i32 { return 1; }\nfn f() bool { var r = g(); return r != error.Oops; }";
        let program = parse_program(src).expect("parse failed");
        let source = SourceFile::new("test.tora", src);
        let diagnostics = TypeChecker::new(&source).check_program(&program);

        let help: Vec<_> = diagnostics.iter().map(|d| d.help.as_deref()).collect();
        assert_eq!(help, vec![Some("negate the equality instead: `!(value == error.Name)`")]);

        let negated = "error Oops;\nfn g() !i32 { return 1; }\nfn f() bool { var r = g(); return !(r == error.Oops); }";
        assert!(check(negated).is_empty());
    }

    fn check(src: &str) -> Vec<String> {
        let program = parse_program(src).expect("parse failed");
        let source = SourceFile::new("test.tora", src);
        TypeChecker::new(&source)
            .check_program(&program)
            .messages()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn literals_adapt_to_annotated_numeric_types() {
        let errors = check("fn f() void { var a: u8 = 3; var b: f32 = 1; var c: [u8 : 2] = [1, 2]; }");
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn float_literal_does_not_adapt_to_integer() {
        let errors = check("fn f() void { var a: i32 = 1.5; }");
        assert_eq!(errors, vec!["mismatched types: expected `i32`, found `f64`"]);
    }

    #[test]
    fn sibling_declarations_keep_being_checked() {
        let errors = check("fn f() i32 { return y; }\nfn g() i32 { return z; }");
        assert_eq!(
            errors,
            vec!["undefined variable `y`", "undefined variable `z`"]
        );
    }

    #[test]
    fn global_consts_size_arrays_in_signatures() {
        let errors = check("const N: i32 = 2 * 2;\nfn f(a: [i32 : N]) i32 { return a[3]; }");
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn locals_shadow_globals_in_nested_scopes() {
        let errors = check("var x: bool = true;\nfn f() i32 { var x: i32 = 1; { var x: i32 = 2; } return x; }");
        assert!(errors.is_empty(), "{errors:?}");
    }
}
