use chumsky::{Parser, input::Input};

use crate::{
    compile::ast::{Program, SourcePos},
    infra::ToraError,
};

pub mod lex;
pub mod parse;

pub type Spanned<T> = (T, SourcePos);

/// Lexes and parses a whole source file.
pub fn parse_program(src: &str) -> Result<Program, ToraError> {
    let tokens = lex::lexer().parse(src).into_result().map_err(|err| {
        let err = err
            .into_iter()
            .map(chumsky::error::Rich::into_owned)
            .collect();

        ToraError::LexerError(err)
    })?;

    let token_stream = tokens
        .as_slice()
        .map(src.len()..src.len(), |(t, s)| (t, s));

    match parse::program_parser().parse(token_stream).into_result() {
        Ok(program) => Ok(program),
        Err(err) => {
            let err = err
                .into_iter()
                .map(|x| x.map_token(|x| x.into_owned()).into_owned())
                .collect();

            Err(ToraError::ParsingError(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_program;
    use crate::compile::ast::{BinaryOp, Decl, Expr, InterpSegment, Stmt, TypeExpr, UnaryOp};

    fn single_fn_body(src: &str) -> Vec<Stmt> {
        let program = parse_program(src).expect("parse failed");
        match program.decls.into_iter().next() {
            Some(Decl::Function(f)) => f.body.stmts,
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn precedence_binds_product_tighter() {
        let body = single_fn_body("fn f() i32 { return 1 + 2 * 3; }");
        let Stmt::Return(Some(Expr::Binary(BinaryOp::Add, _, rhs, _)), _) = &body[0] else {
            panic!("unexpected shape: {body:?}");
        };
        assert!(matches!(**rhs, Expr::Binary(BinaryOp::Mul, ..)));
    }

    #[test]
    fn fallible_signature_and_error_value() {
        let program = parse_program("error Oops;\nfn f() -> !i32 { return error.Oops; }").unwrap();
        assert!(matches!(program.decls[0], Decl::Error(_)));
        let Decl::Function(f) = &program.decls[1] else {
            panic!("expected function");
        };
        assert!(matches!(f.ret, TypeExpr::ErrorUnion(..)));
        assert!(matches!(
            f.body.stmts[0],
            Stmt::Return(Some(Expr::ErrorValue(ref name, _)), _) if name == "Oops"
        ));
    }

    #[test]
    fn extern_with_varargs() {
        let program = parse_program("extern fn printf(fmt: *byte, ...) i32;").unwrap();
        let Decl::Extern(decl) = &program.decls[0] else {
            panic!("expected extern");
        };
        assert!(decl.has_varargs);
        assert_eq!(decl.params.len(), 1);
    }

    #[test]
    fn varargs_rejected_outside_extern() {
        assert!(parse_program("fn f(a: i32, ...) void {}").is_err());
    }

    #[test]
    fn catch_with_binding_and_try() {
        let body = single_fn_body(
            "fn f() !i32 { var x = g() catch |e| { 0 }; var y = try g(); return y; }",
        );
        let Stmt::Var(decl) = &body[0] else { panic!() };
        let Some(Expr::Catch(catch)) = &decl.value else {
            panic!("expected catch, got {:?}", decl.value);
        };
        assert_eq!(catch.binding.as_deref(), Some("e"));

        let Stmt::Var(decl) = &body[1] else { panic!() };
        assert!(matches!(decl.value, Some(Expr::Unary(UnaryOp::Try, ..))));
    }

    #[test]
    fn for_loop_bindings_are_not_bitwise_or() {
        let body = single_fn_body("fn f() void { for items |item, i| { } }");
        let Stmt::For(for_loop) = &body[0] else { panic!() };
        assert_eq!(for_loop.item.as_deref(), Some("item"));
        assert_eq!(for_loop.index.as_deref(), Some("i"));
    }

    #[test]
    fn else_if_chains() {
        let body = single_fn_body("fn f(a: i32) void { if a == 1 { } else if a == 2 { } else { } }");
        let Stmt::If(_, _, Some(otherwise), _) = &body[0] else { panic!() };
        assert!(matches!(otherwise.stmts[0], Stmt::If(_, _, Some(_), _)));
    }

    #[test]
    fn interpolation_segments() {
        let body = single_fn_body(r#"fn f(x: i32) void { print("x = ${x:d}!"); }"#);
        let Stmt::Expr(Expr::Call(_, args, _)) = &body[0] else { panic!() };
        let Expr::Interpolated(segments, _) = &args[0] else {
            panic!("expected interpolation, got {:?}", args[0]);
        };

        assert_eq!(segments.len(), 3);
        assert!(matches!(&segments[0], InterpSegment::Text(t) if t == "x = "));
        assert!(matches!(&segments[1], InterpSegment::Expr(Expr::Ident(n, _), Some(spec)) if n == "x" && spec == "d"));
        assert!(matches!(&segments[2], InterpSegment::Text(t) if t == "!"));
    }

    #[test]
    fn struct_literal_and_if_block_are_distinguished() {
        let body = single_fn_body("fn f(ok: bool) void { if ok { x = 1; } var p = Point { x: 1, y: 2 }; }");
        assert!(matches!(body[0], Stmt::If(..)));
        let Stmt::Var(decl) = &body[1] else { panic!() };
        assert!(matches!(decl.value, Some(Expr::StructInit(..))));
    }

    #[test]
    fn missing_return_type_defaults_to_void() {
        let program = parse_program("fn main() { }").unwrap();
        let Decl::Function(f) = &program.decls[0] else { panic!() };
        assert!(matches!(&f.ret, TypeExpr::Named(name, _) if name == "void"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(parse_program("fn f( { }").is_err());
        assert!(parse_program("fn f() void { var = 1; }").is_err());
    }
}
