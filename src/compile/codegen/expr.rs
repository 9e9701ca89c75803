use std::fmt::Write;

use crate::compile::{
    ast::UnaryOp,
    ir::{Constant, Inst, MatchArm, TryCatch, VarDecl},
    semantic::types::Type,
};

use super::{
    LoweringError,
    ctype::{c_type, declarator},
    defer::{error_label, return_slot},
};

const INDENT: &str = "    ";

/// Renders instructions as C. `function` names the function whose body is written and
/// is `None` for file scope, where `try` has nowhere to propagate to.
#[derive(Debug, Clone, Copy)]
pub struct CWriter<'a> {
    function: Option<&'a str>,
}

impl<'a> CWriter<'a> {
    pub fn file_scope() -> Self {
        Self { function: None }
    }

    pub fn in_function(function: &'a str) -> Self {
        Self {
            function: Some(function),
        }
    }

    pub fn stmts(&self, out: &mut String, stmts: &[Inst], depth: usize) -> Result<(), LoweringError> {
        for stmt in stmts.iter() {
            self.stmt(out, stmt, depth)?;
        }

        Ok(())
    }

    pub fn stmt(&self, out: &mut String, inst: &Inst, depth: usize) -> Result<(), LoweringError> {
        let pad = INDENT.repeat(depth);

        match inst {
            Inst::VarDecl(decl) => writeln!(out, "{pad}{};", self.var_decl(decl)?)?,
            Inst::Assign { target, op, value } => {
                let op = op.map(|op| op.symbol()).unwrap_or_default();
                writeln!(out, "{pad}{} {op}= {};", self.expr(target)?, self.expr(value)?)?;
            }
            Inst::If {
                cond,
                then,
                otherwise,
            } => {
                writeln!(out, "{pad}if ({}) {{", self.expr(cond)?)?;
                self.stmts(out, then, depth + 1)?;
                if let Some(otherwise) = otherwise {
                    writeln!(out, "{pad}}} else {{")?;
                    self.stmts(out, otherwise, depth + 1)?;
                }
                writeln!(out, "{pad}}}")?;
            }
            Inst::While { cond, body } => {
                writeln!(out, "{pad}while ({}) {{", self.expr(cond)?)?;
                self.stmts(out, body, depth + 1)?;
                writeln!(out, "{pad}}}")?;
            }
            Inst::For {
                iterable,
                len,
                item,
                index,
                body,
            } => {
                let iterable = self.expr(iterable)?;
                let bound = match len {
                    Some(len) => len.to_string(),
                    None => format!("sizeof({iterable}) / sizeof(({iterable})[0])"),
                };

                writeln!(
                    out,
                    "{pad}for (size_t {index} = 0; {index} < {bound}; {index}++) {{"
                )?;
                if let Some(item) = item {
                    writeln!(out, "{pad}{INDENT}__auto_type {item} = ({iterable})[{index}];")?;
                }
                self.stmts(out, body, depth + 1)?;
                writeln!(out, "{pad}}}")?;
            }
            Inst::Block(body) => {
                writeln!(out, "{pad}{{")?;
                self.stmts(out, body, depth + 1)?;
                writeln!(out, "{pad}}}")?;
            }
            Inst::Goto(label) => writeln!(out, "{pad}goto {label};")?,
            // the empty statement keeps declarations after a label legal
            Inst::Label(label) => writeln!(out, "{label}:;")?,
            Inst::Comment(text) => writeln!(out, "{pad}/* {text} */")?,
            Inst::Return { value: Some(value), .. } => {
                writeln!(out, "{pad}return {};", self.expr(value)?)?
            }
            Inst::Return { value: None, .. } => writeln!(out, "{pad}return;")?,
            Inst::Break => writeln!(out, "{pad}break;")?,
            Inst::Continue => writeln!(out, "{pad}continue;")?,
            Inst::Defer(_) | Inst::ErrDefer(_) => {
                return Err(LoweringError::MalformedIr(format!(
                    "{} left in a function body after exit lowering",
                    inst.kind()
                )));
            }
            Inst::FuncDef(_) | Inst::StructDecl { .. } | Inst::EnumDecl { .. } | Inst::ErrorDecl { .. } => {
                return Err(LoweringError::MalformedIr(format!(
                    "{} in statement position",
                    inst.kind()
                )));
            }
            value => writeln!(out, "{pad}{};", self.expr(value)?)?,
        }

        Ok(())
    }

    pub fn var_decl(&self, decl: &VarDecl) -> Result<String, LoweringError> {
        let head = match (&decl.ty, &decl.value) {
            (Some(ty), _) if decl.is_const && !ty.is_array() => {
                format!("const {}", declarator(ty, &decl.name)?)
            }
            (Some(ty), _) => declarator(ty, &decl.name)?,
            (None, Some(_)) => format!("__auto_type {}", decl.name),
            (None, None) => {
                return Err(LoweringError::MalformedIr(format!(
                    "variable `{}` has neither a type nor an initializer",
                    decl.name
                )));
            }
        };

        match &decl.value {
            Some(value) => Ok(format!("{head} = {}", self.expr(value)?)),
            None => Ok(head),
        }
    }

    pub fn expr(&self, inst: &Inst) -> Result<String, LoweringError> {
        let text = match inst {
            Inst::Constant(constant) => match constant {
                Constant::Int(text) | Constant::Float(text) => text.clone(),
                Constant::Bool(true) => "1".to_string(),
                Constant::Bool(false) => "0".to_string(),
                Constant::Str(raw) => format!("\"{}\"", raw.replace("\\$", "$")),
                Constant::Null => "NULL".to_string(),
            },
            Inst::Ident(name) => name.clone(),
            Inst::BinaryOp { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(lhs)?, op.symbol(), self.expr(rhs)?)
            }
            Inst::UnaryOp {
                op: UnaryOp::Try, ..
            } => {
                return Err(LoweringError::MalformedIr(
                    "`try` encoded as a unary operation".to_string(),
                ));
            }
            Inst::UnaryOp { op, operand } => format!("({}{})", op.symbol(), self.expr(operand)?),
            // the builtin `array(...)` builds an array from its arguments
            Inst::Call { name, args } if name == "array" => format!("{{ {} }}", self.list(args)?),
            Inst::Call { name, args } => format!("{name}({})", self.list(args)?),
            Inst::MemberAccess { object, member } => format!("{}.{member}", self.expr(object)?),
            Inst::EnumVariant { enum_name, variant } => format!("{enum_name}_{variant}"),
            Inst::Subscript { object, index } => {
                format!("{}[{}]", self.expr(object)?, self.expr(index)?)
            }
            Inst::StructInit { name, fields } => {
                let fields = fields
                    .iter()
                    .map(|(field, value)| Ok(format!(".{field} = {}", self.expr(value)?)))
                    .collect::<Result<Vec<_>, LoweringError>>()?;
                format!("(struct {name}){{ {} }}", fields.join(", "))
            }
            Inst::TupleInit { ty: Some(ty), items } => {
                let items = items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| Ok(format!("._{idx} = {}", self.expr(item)?)))
                    .collect::<Result<Vec<_>, LoweringError>>()?;
                format!("({}){{ {} }}", c_type(ty)?, items.join(", "))
            }
            Inst::TupleInit { ty: None, items } | Inst::ArrayInit(items) => {
                format!("{{ {} }}", self.list(items)?)
            }
            Inst::ErrorValue { name, .. } => format!("ERROR_{name}"),
            Inst::ErrorUnionInit {
                payload,
                error_id,
                value,
            } => {
                let ty = c_type(&Type::ErrorUnion(Box::new(payload.clone())))?;
                match value {
                    Some(value) => format!(
                        "({ty}){{ .error_id = {}, .value = {} }}",
                        self.expr(error_id)?,
                        self.expr(value)?
                    ),
                    None => format!("({ty}){{ .error_id = {} }}", self.expr(error_id)?),
                }
            }
            Inst::StringInterpolation {
                buffer,
                format,
                args,
            } => {
                let mut args_text = String::new();
                for arg in args.iter() {
                    write!(args_text, ", {}", self.expr(arg)?)?;
                }

                format!(
                    "({{ static char {buffer}[256]; snprintf({buffer}, sizeof {buffer}, \"{format}\"{args_text}); {buffer}; }})"
                )
            }
            Inst::TryCatch(catch) => self.catch(catch)?,
            Inst::Try {
                expr,
                temp,
                yields_value,
            } => {
                let Some(function) = self.function else {
                    return Err(LoweringError::MalformedIr(
                        "`try` outside of a function".to_string(),
                    ));
                };

                let value = if *yields_value {
                    format!(" {temp}.value;")
                } else {
                    String::new()
                };
                let expr = self.expr(expr)?;

                format!(
                    "({{ __typeof__({expr}) {temp} = {expr}; if ({temp}.error_id != 0) {{ {slot}.error_id = {temp}.error_id; goto {label}; }}{value} }})",
                    slot = return_slot(function),
                    label = error_label(function),
                )
            }
            Inst::Match {
                scrutinee,
                temp,
                arms,
            } => self.matching(scrutinee, temp, arms)?,
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
                    "{} used as a value",
                    inst.kind()
                )));
            }
        };

        Ok(text)
    }

    fn list(&self, items: &[Inst]) -> Result<String, LoweringError> {
        let items = items
            .iter()
            .map(|item| self.expr(item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items.join(", "))
    }

    /// Statements of a statement expression, on one line.
    fn inline(&self, stmts: &[Inst]) -> Result<String, LoweringError> {
        let mut out = String::new();
        self.stmts(&mut out, stmts, 0)?;

        Ok(out.lines().map(str::trim).collect::<Vec<_>>().join(" "))
    }

    fn catch(&self, catch: &TryCatch) -> Result<String, LoweringError> {
        let temp = &catch.temp;
        let expr = self.expr(&catch.expr)?;
        let binding = match &catch.binding {
            Some(binding) => format!("uint32_t {binding} = {temp}.error_id; "),
            None => String::new(),
        };

        if !catch.yields_value {
            return Ok(format!(
                "({{ __typeof__({expr}) {temp} = {expr}; if ({temp}.error_id != 0) {{ {binding}{} }} }})",
                self.inline(&catch.body)?
            ));
        }

        let result = format!("{temp}_value");
        let (stmts, produced) = match catch.body.split_last() {
            Some((last, stmts)) if last.is_value() => (stmts, Some(last)),
            _ => (catch.body.as_slice(), None),
        };
        let produced = match produced {
            Some(last) => format!(" {result} = {};", self.expr(last)?),
            None => String::new(),
        };

        Ok(format!(
            "({{ __typeof__({expr}) {temp} = {expr}; __typeof__({temp}.value) {result}; if ({temp}.error_id != 0) {{ {binding}{}{produced} }} else {{ {result} = {temp}.value; }} {result}; }})",
            self.inline(stmts)?
        ))
    }

    fn matching(&self, scrutinee: &Inst, temp: &str, arms: &[MatchArm]) -> Result<String, LoweringError> {
        let Some(first) = arms.first() else {
            return Err(LoweringError::MalformedIr("`match` without arms".to_string()));
        };

        let mut fallback = format!("(__typeof__({})){{0}}", self.expr(&first.value)?);
        let mut chain = String::new();
        for arm in arms.iter() {
            match &arm.pattern {
                Some(pattern) => write!(
                    chain,
                    "({temp} == {}) ? {} : ",
                    self.expr(pattern)?,
                    self.expr(&arm.value)?
                )?,
                None => fallback = self.expr(&arm.value)?,
            }
        }

        let scrutinee = self.expr(scrutinee)?;
        Ok(format!(
            "({{ __typeof__({scrutinee}) {temp} = {scrutinee}; {chain}{fallback}; }})"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::CWriter;
    use crate::compile::{
        ast::BinaryOp,
        ir::{Inst, MatchArm, TryCatch, VarDecl},
        semantic::types::Type,
    };

    fn call(name: &str, args: Vec<Inst>) -> Inst {
        Inst::Call {
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn catch_becomes_a_statement_expression() {
        let catch = Inst::TryCatch(Box::new(TryCatch {
            expr: call("parse", Vec::new()),
            binding: Some("e".to_string()),
            body: vec![Inst::int("0")],
            temp: "_catch_1".to_string(),
            yields_value: true,
        }));

        let text = CWriter::file_scope().expr(&catch).unwrap();
        assert_eq!(
            text,
            "({ __typeof__(parse()) _catch_1 = parse(); __typeof__(_catch_1.value) _catch_1_value; \
             if (_catch_1.error_id != 0) { uint32_t e = _catch_1.error_id;  _catch_1_value = 0; } \
             else { _catch_1_value = _catch_1.value; } _catch_1_value; })"
        );
    }

    #[test]
    fn try_jumps_to_the_error_exit() {
        let try_expr = Inst::Try {
            expr: call("parse", Vec::new()).boxed(),
            temp: "_try_1".to_string(),
            yields_value: true,
        };

        let text = CWriter::in_function("load").expr(&try_expr).unwrap();
        assert!(text.contains("_return_load.error_id = _try_1.error_id; goto _error_return_load;"));
        assert!(text.ends_with("_try_1.value; })"));

        assert!(CWriter::file_scope().expr(&try_expr).is_err());
    }

    #[test]
    fn error_unions_are_built_as_compound_literals() {
        let writer = CWriter::file_scope();
        let success = Inst::ErrorUnionInit {
            payload: Type::I32,
            error_id: Inst::int("0").boxed(),
            value: Some(Inst::int("5").boxed()),
        };
        let failure = Inst::ErrorUnionInit {
            payload: Type::I32,
            error_id: Inst::ErrorValue {
                name: "Oops".to_string(),
                code: 1,
            }
            .boxed(),
            value: None,
        };

        assert_eq!(
            writer.expr(&success).unwrap(),
            "(struct error_union_i32){ .error_id = 0, .value = 5 }"
        );
        assert_eq!(
            writer.expr(&failure).unwrap(),
            "(struct error_union_i32){ .error_id = ERROR_Oops }"
        );
    }

    #[test]
    fn match_without_else_falls_back_to_zero() {
        let matching = Inst::Match {
            scrutinee: Inst::ident("x").boxed(),
            temp: "_match_1".to_string(),
            arms: vec![MatchArm {
                pattern: Some(Inst::int("1")),
                value: Inst::int("10"),
            }],
        };

        assert_eq!(
            CWriter::file_scope().expr(&matching).unwrap(),
            "({ __typeof__(x) _match_1 = x; (_match_1 == 1) ? 10 : (__typeof__(10)){0}; })"
        );
    }

    #[test]
    fn declarations_and_loops() {
        let writer = CWriter::in_function("f");
        let decl = VarDecl {
            name: "items".to_string(),
            ty: Some(Type::Array(Box::new(Type::I32), Some(2))),
            value: Some(Inst::ArrayInit(vec![Inst::int("1"), Inst::int("2")]).boxed()),
            is_const: true,
        };
        assert_eq!(writer.var_decl(&decl).unwrap(), "int32_t items[2] = { 1, 2 }");

        let mut out = String::new();
        let for_loop = Inst::For {
            iterable: Inst::ident("items").boxed(),
            len: Some(2),
            item: Some("item".to_string()),
            index: "i".to_string(),
            body: vec![Inst::Assign {
                target: Inst::ident("sum").boxed(),
                op: Some(BinaryOp::Add),
                value: Inst::ident("item").boxed(),
            }],
        };
        writer.stmt(&mut out, &for_loop, 0).unwrap();

        assert_eq!(
            out,
            "for (size_t i = 0; i < 2; i++) {\n    __auto_type item = (items)[i];\n    sum += item;\n}\n"
        );
    }

    #[test]
    fn leftover_defer_is_malformed() {
        let mut out = String::new();
        assert!(
            CWriter::in_function("f")
                .stmt(&mut out, &Inst::Defer(Vec::new()), 1)
                .is_err()
        );
    }
}
