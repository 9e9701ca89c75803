use tracing::trace;

use crate::compile::{
    ast::BinaryOp,
    ir::{FuncDef, Inst, MatchArm, TryCatch, VarDecl},
};

use super::LoweringError;

pub fn return_slot(function: &str) -> String {
    format!("_return_{function}")
}

pub fn error_label(function: &str) -> String {
    format!("_error_return_{function}")
}

pub fn normal_label(function: &str) -> String {
    format!("_normal_return_{function}")
}

/// Rewrites a function body so that every exit runs its cleanup code.
///
/// `defer` and `errdefer` bodies are collected in declaration order and removed from
/// their place. Every `return` fills the return slot and jumps to one of two exit labels.
/// The error exit replays errdefers, then defers, the normal exit replays defers only,
/// each list last-declared-first.
///
/// A non-fallible function without any deferred code keeps its body unchanged.
pub fn lower_function(mut def: FuncDef) -> Result<FuncDef, LoweringError> {
    if def.is_extern || (!def.is_fallible() && !def.body.iter().any(contains_deferred)) {
        return Ok(def);
    }

    trace!("lowering exits of `{}`", def.name);

    let mut lowering = ExitLowering::new(&def);
    let body = lowering.lower_stmts(std::mem::take(&mut def.body), false)?;

    let mut lowered = Vec::new();
    if let Some(slot) = &lowering.slot {
        lowered.push(Inst::VarDecl(VarDecl {
            name: slot.clone(),
            ty: Some(def.return_type.clone()),
            value: None,
            is_const: false,
        }));

        // falling off the end of a `!void` function is a success
        if lowering.fallible {
            lowered.push(Inst::assign(
                Inst::member(Inst::ident(slot), "error_id"),
                Inst::int("0"),
            ));
        }
    }
    lowered.extend(body);

    if lowering.uses_error_exit {
        lowered.push(Inst::Goto(normal_label(&def.name)));
        lowered.push(Inst::Label(error_label(&def.name)));
        lowered.extend(lowering.errdefers.iter().rev().cloned().map(Inst::Block));
        lowered.extend(lowering.defers.iter().rev().cloned().map(Inst::Block));
        lowered.push(lowering.exit());
    }

    lowered.push(Inst::Label(normal_label(&def.name)));
    lowered.extend(lowering.defers.iter().rev().cloned().map(Inst::Block));
    lowered.push(lowering.exit());

    def.body = lowered;
    Ok(def)
}

/// Whether `inst` or anything nested in it is a `defer` or `errdefer`.
pub fn contains_deferred(inst: &Inst) -> bool {
    matches!(inst, Inst::Defer(_) | Inst::ErrDefer(_))
        || inst.children().into_iter().any(contains_deferred)
}

struct ExitLowering {
    function: String,
    fallible: bool,
    payload_is_void: bool,
    slot: Option<String>,
    defers: Vec<Vec<Inst>>,
    errdefers: Vec<Vec<Inst>>,
    uses_error_exit: bool,
}

impl ExitLowering {
    fn new(def: &FuncDef) -> Self {
        let fallible = def.is_fallible();
        let slot = (fallible || !def.return_type.is_void()).then(|| return_slot(&def.name));

        Self {
            function: def.name.clone(),
            fallible,
            payload_is_void: def.payload().is_void(),
            slot,
            defers: Vec::new(),
            errdefers: Vec::new(),
            uses_error_exit: false,
        }
    }

    fn exit(&self) -> Inst {
        Inst::Return {
            value: self.slot.as_ref().map(|slot| Inst::ident(slot).boxed()),
            forward: false,
        }
    }

    fn slot_member(&self, slot: &str, member: &str) -> Inst {
        Inst::member(Inst::ident(slot), member)
    }

    fn lower_stmts(&mut self, stmts: Vec<Inst>, in_defer: bool) -> Result<Vec<Inst>, LoweringError> {
        let mut lowered = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.lower_stmt(stmt, in_defer, &mut lowered)?;
        }

        Ok(lowered)
    }

    fn lower_stmt(&mut self, stmt: Inst, in_defer: bool, out: &mut Vec<Inst>) -> Result<(), LoweringError> {
        match stmt {
            Inst::Defer(_) | Inst::ErrDefer(_) if in_defer => {
                return Err(LoweringError::MalformedIr(format!(
                    "deferred block nested in a deferred block of `{}`",
                    self.function
                )));
            }
            Inst::Defer(body) => {
                let body = self.lower_stmts(body, true)?;
                self.defers.push(body);
                out.push(Inst::Comment("defer block (collected)".to_string()));
            }
            Inst::ErrDefer(body) => {
                let body = self.lower_stmts(body, true)?;
                self.errdefers.push(body);
                out.push(Inst::Comment("errdefer block (collected)".to_string()));
            }
            Inst::Return { .. } if in_defer => {
                return Err(LoweringError::MalformedIr(format!(
                    "`return` inside a deferred block of `{}`",
                    self.function
                )));
            }
            Inst::Return { value, forward } => self.lower_return(value, forward, out)?,
            Inst::If {
                cond,
                then,
                otherwise,
            } => out.push(Inst::If {
                cond: self.lower_value(*cond, in_defer)?.boxed(),
                then: self.lower_stmts(then, in_defer)?,
                otherwise: otherwise
                    .map(|otherwise| self.lower_stmts(otherwise, in_defer))
                    .transpose()?,
            }),
            Inst::While { cond, body } => out.push(Inst::While {
                cond: self.lower_value(*cond, in_defer)?.boxed(),
                body: self.lower_stmts(body, in_defer)?,
            }),
            Inst::For {
                iterable,
                len,
                item,
                index,
                body,
            } => out.push(Inst::For {
                iterable: self.lower_value(*iterable, in_defer)?.boxed(),
                len,
                item,
                index,
                body: self.lower_stmts(body, in_defer)?,
            }),
            Inst::Block(body) => out.push(Inst::Block(self.lower_stmts(body, in_defer)?)),
            Inst::VarDecl(mut decl) => {
                decl.value = decl
                    .value
                    .map(|value| self.lower_value(*value, in_defer).map(Inst::boxed))
                    .transpose()?;
                out.push(Inst::VarDecl(decl));
            }
            Inst::Assign { target, op, value } => out.push(Inst::Assign {
                target: self.lower_value(*target, in_defer)?.boxed(),
                op,
                value: self.lower_value(*value, in_defer)?.boxed(),
            }),
            Inst::Goto(_) | Inst::Label(_) | Inst::Comment(_) | Inst::Break | Inst::Continue => {
                out.push(stmt)
            }
            Inst::FuncDef(_) | Inst::StructDecl { .. } | Inst::EnumDecl { .. } | Inst::ErrorDecl { .. } => {
                return Err(LoweringError::MalformedIr(format!(
                    "{} inside the body of `{}`",
                    stmt.kind(),
                    self.function
                )));
            }
            value => out.push(self.lower_value(value, in_defer)?),
        }

        Ok(())
    }

    fn lower_return(
        &mut self,
        value: Option<Box<Inst>>,
        forward: bool,
        out: &mut Vec<Inst>,
    ) -> Result<(), LoweringError> {
        let value = value
            .map(|value| self.lower_value(*value, false))
            .transpose()?;
        let normal_exit = Inst::Goto(normal_label(&self.function));

        let Some(slot) = self.slot.clone() else {
            // `return f();` in a void function still evaluates the call
            out.extend(value);
            out.push(normal_exit);
            return Ok(());
        };

        if !self.fallible {
            if let Some(value) = value {
                out.push(Inst::assign(Inst::ident(&slot), value));
            }
            out.push(normal_exit);
            return Ok(());
        }

        match value {
            Some(error @ Inst::ErrorValue { .. }) => {
                self.uses_error_exit = true;
                out.push(Inst::assign(self.slot_member(&slot, "error_id"), error));
                out.push(Inst::Goto(error_label(&self.function)));
            }
            Some(result) if forward => {
                self.uses_error_exit = true;
                out.push(Inst::assign(Inst::ident(&slot), result));
                out.push(Inst::If {
                    cond: Inst::BinaryOp {
                        op: BinaryOp::NotEq,
                        lhs: self.slot_member(&slot, "error_id").boxed(),
                        rhs: Inst::int("0").boxed(),
                    }
                    .boxed(),
                    then: vec![Inst::Goto(error_label(&self.function))],
                    otherwise: None,
                });
                out.push(normal_exit);
            }
            value => {
                out.push(Inst::assign(self.slot_member(&slot, "error_id"), Inst::int("0")));
                match value {
                    Some(value) if !self.payload_is_void => {
                        out.push(Inst::assign(self.slot_member(&slot, "value"), value))
                    }
                    Some(value) => out.push(value),
                    None => {}
                }
                out.push(normal_exit);
            }
        }

        Ok(())
    }

    /// Walks an instruction in value position. `try` marks the error exit as used, and
    /// `catch` bodies are statement lists that may themselves return.
    fn lower_value(&mut self, inst: Inst, in_defer: bool) -> Result<Inst, LoweringError> {
        let lowered = match inst {
            Inst::Constant(_)
            | Inst::Ident(_)
            | Inst::EnumVariant { .. }
            | Inst::ErrorValue { .. } => inst,
            Inst::BinaryOp { op, lhs, rhs } => Inst::BinaryOp {
                op,
                lhs: self.lower_value(*lhs, in_defer)?.boxed(),
                rhs: self.lower_value(*rhs, in_defer)?.boxed(),
            },
            Inst::UnaryOp { op, operand } => Inst::UnaryOp {
                op,
                operand: self.lower_value(*operand, in_defer)?.boxed(),
            },
            Inst::Call { name, args } => Inst::Call {
                name,
                args: self.lower_values(args, in_defer)?,
            },
            Inst::MemberAccess { object, member } => Inst::MemberAccess {
                object: self.lower_value(*object, in_defer)?.boxed(),
                member,
            },
            Inst::Subscript { object, index } => Inst::Subscript {
                object: self.lower_value(*object, in_defer)?.boxed(),
                index: self.lower_value(*index, in_defer)?.boxed(),
            },
            Inst::StructInit { name, fields } => Inst::StructInit {
                name,
                fields: fields
                    .into_iter()
                    .map(|(field, value)| Ok((field, self.lower_value(value, in_defer)?)))
                    .collect::<Result<_, LoweringError>>()?,
            },
            Inst::TupleInit { ty, items } => Inst::TupleInit {
                ty,
                items: self.lower_values(items, in_defer)?,
            },
            Inst::ArrayInit(items) => Inst::ArrayInit(self.lower_values(items, in_defer)?),
            Inst::ErrorUnionInit {
                payload,
                error_id,
                value,
            } => Inst::ErrorUnionInit {
                payload,
                error_id: self.lower_value(*error_id, in_defer)?.boxed(),
                value: value
                    .map(|value| self.lower_value(*value, in_defer).map(Inst::boxed))
                    .transpose()?,
            },
            Inst::StringInterpolation {
                buffer,
                format,
                args,
            } => Inst::StringInterpolation {
                buffer,
                format,
                args: self.lower_values(args, in_defer)?,
            },
            Inst::TryCatch(catch) => {
                let TryCatch {
                    expr,
                    binding,
                    body,
                    temp,
                    yields_value,
                } = *catch;

                Inst::TryCatch(Box::new(TryCatch {
                    expr: self.lower_value(expr, in_defer)?,
                    binding,
                    body: self.lower_stmts(body, in_defer)?,
                    temp,
                    yields_value,
                }))
            }
            Inst::Try {
                expr,
                temp,
                yields_value,
            } => {
                if !self.fallible {
                    return Err(LoweringError::MalformedIr(format!(
                        "`try` in `{}`, which cannot fail",
                        self.function
                    )));
                }
                self.uses_error_exit = true;

                Inst::Try {
                    expr: self.lower_value(*expr, in_defer)?.boxed(),
                    temp,
                    yields_value,
                }
            }
            Inst::Match {
                scrutinee,
                temp,
                arms,
            } => Inst::Match {
                scrutinee: self.lower_value(*scrutinee, in_defer)?.boxed(),
                temp,
                arms: arms
                    .into_iter()
                    .map(|arm| {
                        Ok(MatchArm {
                            pattern: arm
                                .pattern
                                .map(|pattern| self.lower_value(pattern, in_defer))
                                .transpose()?,
                            value: self.lower_value(arm.value, in_defer)?,
                        })
                    })
                    .collect::<Result<_, LoweringError>>()?,
            },
            Inst::VarDecl(_)
            | Inst::Assign { .. }
            | Inst::If { .. }
            | Inst::While { .. }
            | Inst::For { .. }
            | Inst::Block(_)
            | Inst::Goto(_)
            | Inst::Label(_)
            | Inst::Comment(_)
            | Inst::FuncDef(_)
            | Inst::StructDecl { .. }
            | Inst::EnumDecl { .. }
            | Inst::ErrorDecl { .. }
            | Inst::Defer(_)
            | Inst::ErrDefer(_)
            | Inst::Return { .. }
            | Inst::Break
            | Inst::Continue => {
                return Err(LoweringError::MalformedIr(format!(
                    "{} used as a value in `{}`",
                    inst.kind(),
                    self.function
                )));
            }
        };

        Ok(lowered)
    }

    fn lower_values(&mut self, insts: Vec<Inst>, in_defer: bool) -> Result<Vec<Inst>, LoweringError> {
        insts
            .into_iter()
            .map(|inst| self.lower_value(inst, in_defer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_deferred, lower_function};
    use crate::compile::{
        ir::{FuncDef, Inst},
        semantic::types::Type,
    };

    fn call(name: &str) -> Inst {
        Inst::Call {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    fn function(return_type: Type, body: Vec<Inst>) -> FuncDef {
        FuncDef {
            name: "f".to_string(),
            params: Vec::new(),
            return_type,
            body,
            is_extern: false,
            has_varargs: false,
        }
    }

    fn ret(value: Inst) -> Inst {
        Inst::Return {
            value: Some(value.boxed()),
            forward: false,
        }
    }

    fn error_value() -> Inst {
        Inst::ErrorValue {
            name: "Oops".to_string(),
            code: 7,
        }
    }

    /// Calls reachable after `label`, in order, skipping nested control flow.
    fn calls_after(body: &[Inst], label: &str) -> Vec<String> {
        let start = body
            .iter()
            .position(|inst| *inst == Inst::Label(label.to_string()))
            .expect("label missing");

        let mut calls = Vec::new();
        for inst in body[start + 1..].iter() {
            match inst {
                Inst::Return { .. } => break,
                Inst::Block(stmts) => stmts.iter().for_each(|stmt| {
                    if let Inst::Call { name, .. } = stmt {
                        calls.push(name.clone());
                    }
                }),
                _ => {}
            }
        }

        calls
    }

    #[test]
    fn plain_functions_are_untouched() {
        let def = function(Type::I32, vec![ret(Inst::int("1"))]);
        assert_eq!(lower_function(def.clone()).unwrap(), def);
    }

    #[test]
    fn normal_exit_runs_defer_but_not_errdefer() {
        let def = function(
            Type::ErrorUnion(Box::new(Type::I32)),
            vec![
                Inst::Defer(vec![call("a")]),
                Inst::ErrDefer(vec![call("b")]),
                ret(Inst::int("42")),
            ],
        );
        let lowered = lower_function(def).unwrap();

        assert!(!lowered.body.contains(&Inst::Label("_error_return_f".to_string())));
        assert_eq!(calls_after(&lowered.body, "_normal_return_f"), vec!["a"]);
        assert!(!lowered.body.iter().any(contains_deferred));
    }

    #[test]
    fn error_exit_runs_errdefer_then_defer() {
        let def = function(
            Type::ErrorUnion(Box::new(Type::I32)),
            vec![
                Inst::Defer(vec![call("a")]),
                Inst::ErrDefer(vec![call("b")]),
                ret(error_value()),
            ],
        );
        let lowered = lower_function(def).unwrap();

        assert_eq!(calls_after(&lowered.body, "_error_return_f"), vec!["b", "a"]);
        assert_eq!(calls_after(&lowered.body, "_normal_return_f"), vec!["a"]);
        assert!(lowered.body.contains(&Inst::Goto("_error_return_f".to_string())));
    }

    #[test]
    fn deferred_blocks_unwind_last_declared_first() {
        let def = function(
            Type::Void,
            vec![
                Inst::Defer(vec![call("first")]),
                Inst::Defer(vec![call("second")]),
                Inst::Return {
                    value: None,
                    forward: false,
                },
            ],
        );
        let lowered = lower_function(def).unwrap();

        assert_eq!(
            calls_after(&lowered.body, "_normal_return_f"),
            vec!["second", "first"]
        );
        assert_eq!(
            lowered.body.last(),
            Some(&Inst::Return {
                value: None,
                forward: false
            })
        );
    }

    #[test]
    fn returns_inside_branches_jump_to_the_exit() {
        let def = function(
            Type::ErrorUnion(Box::new(Type::I32)),
            vec![
                Inst::Defer(vec![call("a")]),
                Inst::If {
                    cond: Inst::ident("bad").boxed(),
                    then: vec![ret(error_value())],
                    otherwise: None,
                },
                ret(Inst::int("1")),
            ],
        );
        let lowered = lower_function(def).unwrap();

        let branch = lowered
            .body
            .iter()
            .find_map(|inst| match inst {
                Inst::If { then, .. } => Some(then.clone()),
                _ => None,
            })
            .expect("branch kept");
        assert_eq!(branch.last(), Some(&Inst::Goto("_error_return_f".to_string())));
    }

    #[test]
    fn return_inside_defer_is_malformed() {
        let def = function(Type::I32, vec![Inst::Defer(vec![ret(Inst::int("1"))])]);
        assert!(lower_function(def).is_err());
    }
}
