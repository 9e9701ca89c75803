use std::collections::HashMap;

use tracing::{debug, trace};

use crate::compile::{
    ast::{
        self, Block, CatchExpr, Decl, Expr, FunctionDecl, InterpSegment, MatchExpr, MatchPattern, Param,
        Program, Stmt, TypeExpr, UnaryOp,
    },
    codegen::LoweringError,
    semantic::{
        const_eval::{ConstValue, const_eval},
        error_codes::derive_code,
        registry::{TypeKind, TypeRegistry},
        types::Type,
    },
};

use super::{Constant, FuncDef, Inst, MatchArm, TryCatch, VarDecl};

/// Lowers a checked AST into instructions. Owns everything that used to be global state
/// in a compiler run: the temporary name counter, declared types, folded constants and
/// the signatures of all functions.
#[derive(Debug, Default)]
pub struct IrGenerator {
    temp_counter: usize,
    types: TypeRegistry,
    consts: HashMap<String, ConstValue>,
    functions: HashMap<String, Type>,
    params: HashMap<String, Vec<Type>>,
    /// Declared variable types, one map per open block with the globals at the bottom.
    /// `None` marks a name whose type is not tracked, which still hides outer bindings.
    locals: Vec<HashMap<String, Option<Type>>>,
    current_return: Option<Type>,
}

impl IrGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(mut self, program: &Program) -> Result<Vec<Inst>, LoweringError> {
        self.collect_declarations(program)?;
        self.locals = vec![HashMap::new()];

        let mut insts = Vec::new();
        for decl in program.decls.iter() {
            match decl {
                Decl::Struct(decl) => {
                    let fields = decl
                        .fields
                        .iter()
                        .map(|field| Ok((field.name.clone(), self.resolve(&field.ty)?)))
                        .collect::<Result<_, LoweringError>>()?;

                    insts.push(Inst::StructDecl {
                        name: decl.name.clone(),
                        fields,
                    });
                }
                Decl::Enum(decl) => {
                    let variants = decl
                        .variants
                        .iter()
                        .map(|variant| {
                            let value = variant.value.as_ref().map(|v| self.lower_expr(v)).transpose()?;
                            Ok((variant.name.clone(), value))
                        })
                        .collect::<Result<_, LoweringError>>()?;

                    insts.push(Inst::EnumDecl {
                        name: decl.name.clone(),
                        variants,
                    });
                }
                Decl::Error(decl) => insts.push(Inst::ErrorDecl {
                    name: decl.name.clone(),
                    code: derive_code(&decl.name),
                }),
                // interface values all share one descriptor struct
                Decl::Interface(_) => {}
                Decl::Var(decl) => insts.push(Inst::VarDecl(self.lower_var_decl(decl)?)),
                Decl::Extern(decl) => insts.push(Inst::FuncDef(FuncDef {
                    name: decl.name.clone(),
                    params: self.lower_params(&decl.params)?,
                    return_type: self.resolve(&decl.ret)?,
                    body: Vec::new(),
                    is_extern: true,
                    has_varargs: decl.has_varargs,
                })),
                Decl::Function(decl) => insts.push(self.lower_function(decl)?),
            }
        }

        debug!("generated {} top level instruction(s)", insts.len());
        Ok(insts)
    }

    fn collect_declarations(&mut self, program: &Program) -> Result<(), LoweringError> {
        for decl in program.decls.iter() {
            let declared = match decl {
                Decl::Struct(decl) => self.types.declare(&decl.name, TypeKind::Struct, decl.span.clone()),
                Decl::Enum(decl) => self.types.declare(&decl.name, TypeKind::Enum, decl.span.clone()),
                Decl::Interface(decl) => {
                    self.types.declare(&decl.name, TypeKind::Interface, decl.span.clone())
                }
                Decl::Var(decl) => {
                    if let (true, Some(value)) = (decl.is_const, &decl.value) {
                        if let Some(value) = const_eval(value, &self.consts) {
                            self.consts.insert(decl.name.clone(), value);
                        }
                    }
                    Ok(())
                }
                _ => Ok(()),
            };

            if declared.is_err() {
                return Err(LoweringError::MalformedIr(format!(
                    "type `{}` declared twice",
                    decl_name(decl)
                )));
            }
        }

        for decl in program.decls.iter() {
            match decl {
                Decl::Function(decl) => self.declare_function(&decl.name, &decl.params, &decl.ret)?,
                Decl::Extern(decl) => self.declare_function(&decl.name, &decl.params, &decl.ret)?,
                Decl::Struct(decl) => {
                    let fields = decl
                        .fields
                        .iter()
                        .map(|field| Ok((field.name.clone(), self.resolve(&field.ty)?)))
                        .collect::<Result<_, LoweringError>>()?;
                    self.types.set_fields(&decl.name, fields);
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn declare_function(&mut self, name: &str, params: &[Param], ret: &TypeExpr) -> Result<(), LoweringError> {
        let params = params
            .iter()
            .map(|param| self.resolve(&param.ty))
            .collect::<Result<Vec<_>, _>>()?;
        let ret = self.resolve(ret)?;

        self.params.insert(name.to_string(), params);
        self.functions.insert(name.to_string(), ret);
        Ok(())
    }

    fn resolve(&self, ty: &TypeExpr) -> Result<Type, LoweringError> {
        self.types
            .resolve(ty, &self.consts)
            .map_err(|err| LoweringError::MalformedIr(err.to_string()))
    }

    fn temp(&mut self, prefix: &str) -> String {
        self.temp_counter += 1;
        format!("_{prefix}_{}", self.temp_counter)
    }

    fn lower_params(&self, params: &[Param]) -> Result<Vec<VarDecl>, LoweringError> {
        params
            .iter()
            .map(|param| {
                Ok(VarDecl {
                    name: param.name.clone(),
                    ty: Some(self.resolve(&param.ty)?),
                    value: None,
                    is_const: false,
                })
            })
            .collect()
    }

    fn lower_function(&mut self, decl: &FunctionDecl) -> Result<Inst, LoweringError> {
        trace!("lowering `{}` to instructions", decl.name);

        let params = self.lower_params(&decl.params)?;
        let return_type = self.resolve(&decl.ret)?;

        let bindings = params
            .iter()
            .map(|param| (param.name.clone(), param.ty.clone()))
            .collect();
        self.current_return = Some(return_type.clone());

        let body = self.scoped(bindings, |this| this.lower_block(&decl.body))?;
        self.current_return = None;

        Ok(Inst::FuncDef(FuncDef {
            name: decl.name.clone(),
            params,
            return_type,
            body,
            is_extern: false,
            has_varargs: false,
        }))
    }

    fn lower_block(&mut self, block: &Block) -> Result<Vec<Inst>, LoweringError> {
        self.scoped(HashMap::new(), |this| {
            block.stmts.iter().map(|stmt| this.lower_stmt(stmt)).collect()
        })
    }

    /// Runs `lower` with `bindings` as the innermost block of locals.
    fn scoped<T>(
        &mut self,
        bindings: HashMap<String, Option<Type>>,
        lower: impl FnOnce(&mut Self) -> Result<T, LoweringError>,
    ) -> Result<T, LoweringError> {
        self.locals.push(bindings);
        let lowered = lower(self);
        self.locals.pop();

        lowered
    }

    fn local(&self, name: &str) -> Option<&Type> {
        self.locals
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .and_then(Option::as_ref)
    }

    /// Declared type of a variable, struct field, tuple item or array element.
    fn place_type(&self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::Ident(name, _) => self.local(name).cloned(),
            Expr::Member(object, field, _) => match self.place_type(object)? {
                Type::Struct(name) => self.types.field(&name, field).cloned(),
                Type::Tuple(items) => items.get(field.parse::<usize>().ok()?).cloned(),
                _ => None,
            },
            Expr::Subscript(object, _, _) => self.place_type(object)?.array_element().cloned(),
            _ => None,
        }
    }

    fn lower_var_decl(&mut self, decl: &ast::VarDecl) -> Result<VarDecl, LoweringError> {
        let ty = decl.ty.as_ref().map(|ty| self.resolve(ty)).transpose()?;
        let value = decl
            .value
            .as_ref()
            .map(|value| self.lower_into(ty.as_ref(), value))
            .transpose()?;

        let known = match (&ty, &decl.value) {
            (Some(ty), _) => Some(ty.clone()),
            (None, Some(value)) => self.fallible_type(value),
            _ => None,
        };
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(decl.name.clone(), known);
        }

        Ok(VarDecl {
            name: decl.name.clone(),
            ty,
            value: value.map(Inst::boxed),
            is_const: decl.is_const,
        })
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<Inst, LoweringError> {
        let inst = match stmt {
            Stmt::Var(decl) => Inst::VarDecl(self.lower_var_decl(decl)?),
            Stmt::Expr(expr) => self.lower_expr(expr)?,
            Stmt::Assign(target, op, value, _) => {
                let op: Option<ast::BinaryOp> = (*op).into();
                let slot = match op {
                    None => self.place_type(target),
                    Some(_) => None,
                };

                Inst::Assign {
                    target: self.lower_expr(target)?.boxed(),
                    op,
                    value: self.lower_into(slot.as_ref(), value)?.boxed(),
                }
            }
            Stmt::If(cond, then, otherwise, _) => Inst::If {
                cond: self.lower_expr(cond)?.boxed(),
                then: self.lower_block(then)?,
                otherwise: otherwise.as_ref().map(|b| self.lower_block(b)).transpose()?,
            },
            Stmt::While(cond, body, _) => Inst::While {
                cond: self.lower_expr(cond)?.boxed(),
                body: self.lower_block(body)?,
            },
            Stmt::For(for_loop) => {
                let index = match &for_loop.index {
                    Some(index) => index.clone(),
                    None => self.temp("idx"),
                };

                let iterable = self.place_type(&for_loop.iterable);
                let element = iterable.as_ref().and_then(Type::array_element).cloned();
                let bindings = for_loop
                    .item
                    .iter()
                    .map(|item| (item.clone(), element.clone()))
                    .chain(std::iter::once((index.clone(), None)))
                    .collect();

                Inst::For {
                    iterable: self.lower_expr(&for_loop.iterable)?.boxed(),
                    len: iterable.as_ref().and_then(Type::array_size),
                    item: for_loop.item.clone(),
                    index,
                    body: self.scoped(bindings, |this| this.lower_block(&for_loop.body))?,
                }
            }
            Stmt::Return(value, _) => self.lower_return(value.as_ref())?,
            Stmt::Break(_) => Inst::Break,
            Stmt::Continue(_) => Inst::Continue,
            Stmt::Block(block) => Inst::Block(self.lower_block(block)?),
            Stmt::Defer(block, _) | Stmt::ErrDefer(block, _) => {
                if self.current_return.is_none() {
                    return Err(LoweringError::MalformedIr(
                        "`defer` outside of a function".to_string(),
                    ));
                }

                let body = self.lower_block(block)?;
                if matches!(stmt, Stmt::Defer(..)) {
                    Inst::Defer(body)
                } else {
                    Inst::ErrDefer(body)
                }
            }
        };

        Ok(inst)
    }

    fn lower_return(&mut self, value: Option<&Expr>) -> Result<Inst, LoweringError> {
        let Some(return_type) = self.current_return.clone() else {
            return Err(LoweringError::MalformedIr(
                "`return` outside of a function".to_string(),
            ));
        };

        let Some(value) = value else {
            return Ok(Inst::Return {
                value: None,
                forward: false,
            });
        };

        let payload = match &return_type {
            Type::ErrorUnion(inner) => inner.as_ref(),
            other => other,
        };

        let forward = matches!(return_type, Type::ErrorUnion(_))
            && self.fallible_type(value).is_some_and(|ty| ty == return_type);

        let value = match value {
            Expr::Tuple(items, _) => Inst::TupleInit {
                ty: Some(payload.clone()),
                items: self.lower_exprs(items)?,
            },
            value => self.lower_expr(value)?,
        };

        Ok(Inst::Return {
            value: Some(value.boxed()),
            forward,
        })
    }

    /// Fallible type of `expr` when it is a call to a fallible function or a fallible
    /// place.
    fn fallible_type(&self, expr: &Expr) -> Option<Type> {
        let ty = match expr {
            Expr::Call(name, _, _) => self.functions.get(name).cloned(),
            other => self.place_type(other),
        }?;

        matches!(ty, Type::ErrorUnion(_)).then_some(ty)
    }

    /// Lowers `expr` as the value stored into a slot of type `target`. A plain value or
    /// an error headed for a `!T` slot becomes an error union.
    fn lower_into(&mut self, target: Option<&Type>, expr: &Expr) -> Result<Inst, LoweringError> {
        let payload = match target {
            Some(Type::ErrorUnion(payload)) if self.fallible_type(expr).is_none() => {
                payload.as_ref().clone()
            }
            _ => {
                return match expr {
                    Expr::Tuple(items, _) => Ok(Inst::TupleInit {
                        ty: target.cloned(),
                        items: self.lower_exprs(items)?,
                    }),
                    expr => self.lower_expr(expr),
                };
            }
        };

        let inst = match expr {
            Expr::Tuple(items, _) => Inst::TupleInit {
                ty: Some(payload.clone()),
                items: self.lower_exprs(items)?,
            },
            expr => self.lower_expr(expr)?,
        };

        let wrapped = match inst {
            error @ Inst::ErrorValue { .. } => Inst::ErrorUnionInit {
                payload,
                error_id: error.boxed(),
                value: None,
            },
            value => Inst::ErrorUnionInit {
                value: (!payload.is_void()).then(|| value.boxed()),
                payload,
                error_id: Inst::int("0").boxed(),
            },
        };

        Ok(wrapped)
    }

    fn yields_value(&self, expr: &Expr) -> bool {
        self.fallible_type(expr) != Some(Type::ErrorUnion(Box::new(Type::Void)))
    }

    fn lower_exprs(&mut self, exprs: &[Expr]) -> Result<Vec<Inst>, LoweringError> {
        exprs.iter().map(|expr| self.lower_expr(expr)).collect()
    }

    pub fn lower_expr(&mut self, expr: &Expr) -> Result<Inst, LoweringError> {
        let inst = match expr {
            Expr::Int(literal, _) => Inst::Constant(Constant::Int(literal.to_c())),
            Expr::Float(value, _) => Inst::Constant(Constant::Float(value.clone())),
            Expr::Bool(value, _) => Inst::Constant(Constant::Bool(*value)),
            Expr::Str(raw, _) => Inst::Constant(Constant::Str(raw.clone())),
            Expr::Null(_) => Inst::Constant(Constant::Null),
            Expr::Ident(name, _) => Inst::Ident(name.clone()),
            Expr::Unary(UnaryOp::Try, operand, _) => {
                if !matches!(self.current_return, Some(Type::ErrorUnion(_))) {
                    return Err(LoweringError::MalformedIr(
                        "`try` outside of a fallible function".to_string(),
                    ));
                }

                Inst::Try {
                    expr: self.lower_expr(operand)?.boxed(),
                    temp: self.temp("try"),
                    yields_value: self.yields_value(operand),
                }
            }
            Expr::Unary(op, operand, _) => Inst::UnaryOp {
                op: *op,
                operand: self.lower_expr(operand)?.boxed(),
            },
            Expr::Binary(op, lhs, rhs, _) => {
                let mut lhs_inst = self.lower_expr(lhs)?;
                let mut rhs_inst = self.lower_expr(rhs)?;

                // a fallible result equals an error when its error id does
                if matches!(**rhs, Expr::ErrorValue(..)) && self.fallible_type(lhs).is_some() {
                    lhs_inst = Inst::member(lhs_inst, "error_id");
                }
                if matches!(**lhs, Expr::ErrorValue(..)) && self.fallible_type(rhs).is_some() {
                    rhs_inst = Inst::member(rhs_inst, "error_id");
                }

                Inst::BinaryOp {
                    op: *op,
                    lhs: lhs_inst.boxed(),
                    rhs: rhs_inst.boxed(),
                }
            }
            Expr::Call(name, args, _) => {
                let params = self.params.get(name).cloned().unwrap_or_default();
                let args = args
                    .iter()
                    .enumerate()
                    .map(|(idx, arg)| self.lower_into(params.get(idx), arg))
                    .collect::<Result<_, LoweringError>>()?;

                Inst::Call {
                    name: name.clone(),
                    args,
                }
            }
            Expr::Member(object, field, _) => {
                if let Expr::Ident(name, _) = &**object {
                    if self.types.kind(name) == Some(TypeKind::Enum) {
                        return Ok(Inst::EnumVariant {
                            enum_name: name.clone(),
                            variant: field.clone(),
                        });
                    }
                }

                let object = self.lower_expr(object)?;
                if field.chars().all(|c| c.is_ascii_digit()) {
                    Inst::member(object, format!("_{field}"))
                } else {
                    Inst::member(object, field.clone())
                }
            }
            Expr::Subscript(object, index, _) => Inst::Subscript {
                object: self.lower_expr(object)?.boxed(),
                index: self.lower_expr(index)?.boxed(),
            },
            Expr::StructInit(name, fields, _) => Inst::StructInit {
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|(field, value)| {
                        let slot = self.types.field(name, field).cloned();
                        Ok((field.clone(), self.lower_into(slot.as_ref(), value)?))
                    })
                    .collect::<Result<_, LoweringError>>()?,
            },
            Expr::Tuple(items, _) => Inst::TupleInit {
                ty: None,
                items: self.lower_exprs(items)?,
            },
            Expr::Array(items, _) => Inst::ArrayInit(self.lower_exprs(items)?),
            Expr::ErrorValue(name, _) => Inst::ErrorValue {
                name: name.clone(),
                code: derive_code(name),
            },
            Expr::Catch(catch) => self.lower_catch(catch)?,
            Expr::Match(matching) => self.lower_match(matching)?,
            Expr::Interpolated(segments, _) => self.lower_interpolation(segments)?,
        };

        Ok(inst)
    }

    fn lower_catch(&mut self, catch: &CatchExpr) -> Result<Inst, LoweringError> {
        let expr = self.lower_expr(&catch.expr)?;
        let bindings = catch
            .binding
            .iter()
            .map(|binding| (binding.clone(), None))
            .collect();
        let body = self.scoped(bindings, |this| this.lower_block(&catch.body))?;

        Ok(Inst::TryCatch(Box::new(TryCatch {
            expr,
            binding: catch.binding.clone(),
            body,
            temp: self.temp("catch"),
            yields_value: self.yields_value(&catch.expr),
        })))
    }

    fn lower_match(&mut self, matching: &MatchExpr) -> Result<Inst, LoweringError> {
        let scrutinee = self.lower_expr(&matching.scrutinee)?.boxed();
        let arms = matching
            .arms
            .iter()
            .map(|arm| {
                let pattern = match &arm.pattern {
                    MatchPattern::Value(pattern) => Some(self.lower_expr(pattern)?),
                    MatchPattern::Else(_) => None,
                };

                Ok(MatchArm {
                    pattern,
                    value: self.lower_expr(&arm.value)?,
                })
            })
            .collect::<Result<_, LoweringError>>()?;

        Ok(Inst::Match {
            scrutinee,
            temp: self.temp("match"),
            arms,
        })
    }

    /// Builds one printf style format out of the literal pieces and the embedded values.
    fn lower_interpolation(&mut self, segments: &[InterpSegment]) -> Result<Inst, LoweringError> {
        let mut format = String::new();
        let mut args = Vec::new();

        for segment in segments.iter() {
            match segment {
                InterpSegment::Text(text) => {
                    format.push_str(&text.replace('%', "%%").replace("\\$", "$"))
                }
                InterpSegment::Expr(expr, spec) => {
                    format.push('%');
                    format.push_str(spec.as_deref().unwrap_or("d"));
                    args.push(self.lower_expr(expr)?);
                }
            }
        }

        Ok(Inst::StringInterpolation {
            buffer: self.temp("fmt"),
            format,
            args,
        })
    }
}

fn decl_name(decl: &Decl) -> &str {
    match decl {
        Decl::Function(decl) => &decl.name,
        Decl::Extern(decl) => &decl.name,
        Decl::Var(decl) => &decl.name,
        Decl::Struct(decl) => &decl.name,
        Decl::Enum(decl) => &decl.name,
        Decl::Error(decl) => &decl.name,
        Decl::Interface(decl) => &decl.name,
    }
}

#[cfg(test)]
mod tests {
    use super::IrGenerator;
    use crate::compile::{
        ir::{Constant, FuncDef, Inst},
        parser::parse_program,
        semantic::{error_codes::derive_code, types::Type},
    };

    fn generate(src: &str) -> Vec<Inst> {
        let program = parse_program(src).expect("parse failed");
        IrGenerator::new().generate(&program).expect("lowering failed")
    }

    fn function(insts: &[Inst], name: &str) -> FuncDef {
        insts
            .iter()
            .find_map(|inst| match inst {
                Inst::FuncDef(def) if def.name == name => Some(def.clone()),
                _ => None,
            })
            .expect("function not found")
    }

    #[test]
    fn error_values_carry_their_code() {
        let insts = generate("error Oops;\nfn f() !i32 { return error.Oops; }");
        assert_eq!(
            insts[0],
            Inst::ErrorDecl {
                name: "Oops".to_string(),
                code: derive_code("Oops")
            }
        );

        let f = function(&insts, "f");
        assert_eq!(f.return_type, Type::ErrorUnion(Box::new(Type::I32)));
        let Inst::Return { value: Some(value), forward: false } = &f.body[0] else {
            panic!("unexpected body {:?}", f.body);
        };
        assert!(matches!(**value, Inst::ErrorValue { ref name, .. } if name == "Oops"));
    }

    #[test]
    fn returning_a_fallible_call_forwards_it() {
        let insts = generate("fn g() !i32 { return 1; }\nfn f() !i32 { return g(); }");
        let f = function(&insts, "f");
        assert!(matches!(f.body[0], Inst::Return { forward: true, .. }));

        let g = function(&insts, "g");
        assert!(matches!(g.body[0], Inst::Return { forward: false, .. }));
    }

    #[test]
    fn temporaries_are_unique() {
        let insts = generate(
            "fn g() !i32 { return 1; }\nfn f() i32 { var a = g() catch { 0 }; var b = g() catch { 1 }; return a + b; }",
        );
        let f = function(&insts, "f");
        let temps: Vec<String> = f
            .body
            .iter()
            .filter_map(|inst| match inst {
                Inst::VarDecl(var) => match var.value.as_deref() {
                    Some(Inst::TryCatch(catch)) => Some(catch.temp.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect();

        assert_eq!(temps.len(), 2);
        assert_ne!(temps[0], temps[1]);
    }

    #[test]
    fn interpolation_builds_a_format_string() {
        let insts = generate("fn f(x: i32) void { printf(\"100% of ${x:5d} and ${x}\"); }");
        let f = function(&insts, "f");
        let Inst::Call { args, .. } = &f.body[0] else {
            panic!("expected call");
        };
        let Inst::StringInterpolation { format, args, .. } = &args[0] else {
            panic!("expected interpolation");
        };

        assert_eq!(format, "100%% of %5d and %d");
        assert_eq!(args, &vec![Inst::ident("x"), Inst::ident("x")]);
    }

    fn error_id_of(name: &str) -> Inst {
        Inst::member(Inst::ident(name), "error_id")
    }

    #[test]
    fn comparisons_against_errors_use_the_error_id() {
        let insts = generate(
            "error Oops;\nfn g() !i32 { return 1; }\nfn f() bool { var r = g(); return r == error.Oops && error.Oops == r; }",
        );
        let f = function(&insts, "f");
        let Inst::Return { value: Some(value), .. } = &f.body[1] else {
            panic!("unexpected body {:?}", f.body);
        };
        let Inst::BinaryOp { lhs, rhs, .. } = &**value else {
            panic!("expected `&&`, got {value:?}");
        };

        assert!(matches!(&**lhs, Inst::BinaryOp { lhs, .. } if **lhs == error_id_of("r")));
        assert!(matches!(&**rhs, Inst::BinaryOp { rhs, .. } if **rhs == error_id_of("r")));
    }

    #[test]
    fn plain_values_stored_as_fallible_are_wrapped() {
        let insts = generate(
            "error Oops;\nfn take(r: !i32) i32 { return 0; }\n\
             fn f() i32 { var r: !i32 = 5; var s: !i32 = error.Oops; r = 6; return take(7); }",
        );
        let f = function(&insts, "f");

        let Inst::VarDecl(r) = &f.body[0] else {
            panic!("unexpected body {:?}", f.body);
        };
        assert_eq!(
            r.value.as_deref(),
            Some(&Inst::ErrorUnionInit {
                payload: Type::I32,
                error_id: Inst::int("0").boxed(),
                value: Some(Inst::int("5").boxed()),
            })
        );

        let Inst::VarDecl(s) = &f.body[1] else {
            panic!("unexpected body {:?}", f.body);
        };
        assert!(matches!(
            s.value.as_deref(),
            Some(Inst::ErrorUnionInit { error_id, value: None, .. })
                if matches!(**error_id, Inst::ErrorValue { ref name, .. } if name == "Oops")
        ));

        assert!(matches!(&f.body[2], Inst::Assign { value, .. } if matches!(**value, Inst::ErrorUnionInit { .. })));
        assert!(matches!(
            &f.body[3],
            Inst::Return { value: Some(call), .. }
                if matches!(&**call, Inst::Call { args, .. } if matches!(args[0], Inst::ErrorUnionInit { .. }))
        ));
    }

    #[test]
    fn fallible_values_are_not_wrapped_twice() {
        let insts = generate("fn g() !i32 { return 1; }\nfn f() !i32 { var r: !i32 = g(); var s: !i32 = r; return s; }");
        let f = function(&insts, "f");

        assert!(matches!(&f.body[0], Inst::VarDecl(decl) if matches!(decl.value.as_deref(), Some(Inst::Call { .. }))));
        assert!(matches!(&f.body[1], Inst::VarDecl(decl) if decl.value.as_deref() == Some(&Inst::ident("r"))));
    }

    #[test]
    fn block_locals_do_not_outlive_their_block() {
        let insts = generate(
            "fn inner() !i32 { return 1; }\nfn outer() !i32 { var r: !i32 = inner(); { var r: i32 = 5; } return r; }",
        );
        let outer = function(&insts, "outer");
        assert!(matches!(outer.body[2], Inst::Return { forward: true, .. }), "{:?}", outer.body);

        let insts = generate(
            "fn inner() !i32 { return 1; }\nfn outer() !i32 { var r: !i32 = inner(); { var r: i32 = 5; return r; } }",
        );
        let outer = function(&insts, "outer");
        let Inst::Block(block) = &outer.body[1] else {
            panic!("unexpected body {:?}", outer.body);
        };
        assert!(matches!(block[1], Inst::Return { forward: false, .. }));
    }

    #[test]
    fn enum_members_become_variants() {
        let insts = generate("enum Color { Red, Green = 4 }\nfn f() Color { return Color.Green; }");
        assert!(matches!(
            &insts[0],
            Inst::EnumDecl { variants, .. }
                if variants[1] == ("Green".to_string(), Some(Inst::Constant(Constant::Int("4".into()))))
        ));

        let f = function(&insts, "f");
        assert!(matches!(
            &f.body[0],
            Inst::Return { value: Some(value), .. }
                if **value == Inst::EnumVariant { enum_name: "Color".into(), variant: "Green".into() }
        ));
    }
}
