use chumsky::input::ValueInput;
use chumsky::prelude::*;

use crate::compile::ast::int_literal::IntLiteral;
use crate::compile::ast::{
    AssignOp, BinaryOp, Block, CatchExpr, Decl, EnumDecl, EnumVariant, ErrorDecl, Expr,
    ExternDecl, ForLoop, FunctionDecl, InterfaceDecl, InterpSegment, MatchArm, MatchExpr,
    MatchPattern, MethodSig, Param, Program, SourcePos, Stmt, StructDecl, TypeExpr, UnaryOp,
    VarDecl,
};
use crate::compile::parser::lex::{Token, lexer};

pub(super) type ErrorParserExtra<'tokens, 'src> =
    extra::Err<Rich<'tokens, Token<'src>, SourcePos>>;

fn ident_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, String, ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    select! { Token::IDENT(ident) => ident.to_string() }
}

enum Postfix {
    Member(String, SourcePos),
    Index(Expr, SourcePos),
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span().start..rhs.span().end;
    Expr::Binary(op, lhs.boxed(), rhs.boxed(), span)
}

/// Expressions and blocks are mutually recursive: `catch` bodies are blocks, and blocks
/// contain expressions. Both parsers are built here and handed out together.
pub fn expr_and_block_parser<'tokens, 'src: 'tokens, I>() -> (
    impl Parser<'tokens, I, Expr, ErrorParserExtra<'tokens, 'src>> + Clone,
    impl Parser<'tokens, I, Block, ErrorParserExtra<'tokens, 'src>> + Clone,
)
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    let mut expr = Recursive::declare();
    let mut block = Recursive::declare();

    let ident = ident_parser();

    let literal = select! {
        Token::NUM { value, base } => Expr::Int(IntLiteral::new(value.to_string(), base), 0..0),
        Token::FLOAT(value) => Expr::Float(value.to_string(), 0..0),
        Token::TRUE => Expr::Bool(true, 0..0),
        Token::FALSE => Expr::Bool(false, 0..0),
        Token::NULL => Expr::Null(0..0),
    }
    .map_with(|expr, ctx| with_span(expr, ctx.span()));

    let string = select! { Token::STR(raw) => raw.to_string() }
        .try_map(|raw, span: SourcePos| string_literal(&raw, span));

    let error_value = just(Token::ERROR)
        .ignore_then(just(Token::DOT))
        .ignore_then(ident.clone())
        .map_with(|name, ctx| Expr::ErrorValue(name, ctx.span()));

    let call = ident
        .clone()
        .then(
            expr.clone()
                .separated_by(just(Token::COMMA))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::L_ROUND), just(Token::R_ROUND)),
        )
        .map_with(|(name, args), ctx| Expr::Call(name, args, ctx.span()));

    let field_init = ident
        .clone()
        .then_ignore(just(Token::COLON))
        .then(expr.clone());

    let struct_init = ident
        .clone()
        .then(
            field_init
                .separated_by(just(Token::COMMA))
                .at_least(1)
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::L_CURLY), just(Token::R_CURLY)),
        )
        .map_with(|(name, fields), ctx| Expr::StructInit(name, fields, ctx.span()));

    let parenthesized = expr
        .clone()
        .separated_by(just(Token::COMMA))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::L_ROUND), just(Token::R_ROUND))
        .map_with(|mut items: Vec<Expr>, ctx| {
            if items.len() == 1 {
                return items.remove(0);
            }

            Expr::Tuple(items, ctx.span())
        });

    let array = expr
        .clone()
        .separated_by(just(Token::COMMA))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::L_SQUARE), just(Token::R_SQUARE))
        .map_with(|items, ctx| Expr::Array(items, ctx.span()));

    let pattern = just(Token::ELSE)
        .map_with(|_, ctx| MatchPattern::Else(ctx.span()))
        .or(expr.clone().map(MatchPattern::Value));

    let arm = pattern
        .then_ignore(just(Token::FAT_ARROW))
        .then(expr.clone())
        .map(|(pattern, value)| MatchArm { pattern, value });

    let matching = just(Token::MATCH)
        .ignore_then(expr.clone())
        .then(
            arm.separated_by(just(Token::COMMA))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::L_CURLY), just(Token::R_CURLY)),
        )
        .map_with(|(scrutinee, arms), ctx| {
            Expr::Match(Box::new(MatchExpr {
                scrutinee,
                arms,
                span: ctx.span(),
            }))
        });

    let atom = choice((
        literal,
        string,
        error_value,
        matching,
        call,
        struct_init,
        ident
            .clone()
            .map_with(|name, ctx| Expr::Ident(name, ctx.span())),
        parenthesized,
        array,
    ))
    .boxed();

    let member_name = ident
        .clone()
        .or(select! { Token::NUM { value, .. } => value.to_string() });

    let postfix_op = choice((
        just(Token::DOT)
            .ignore_then(member_name)
            .map_with(|name, ctx| Postfix::Member(name, ctx.span())),
        expr.clone()
            .delimited_by(just(Token::L_SQUARE), just(Token::R_SQUARE))
            .map_with(|index, ctx| Postfix::Index(index, ctx.span())),
    ));

    let postfix = atom
        .foldl(postfix_op.repeated(), |lhs, op| {
            let start = lhs.span().start;
            match op {
                Postfix::Member(name, span) => Expr::Member(lhs.boxed(), name, start..span.end),
                Postfix::Index(index, span) => {
                    Expr::Subscript(lhs.boxed(), index.boxed(), start..span.end)
                }
            }
        })
        .boxed();

    let unary_op = choice((
        just(Token::MINUS).to(UnaryOp::Neg),
        just(Token::BANG).to(UnaryOp::LogicalNot),
        just(Token::TILDE).to(UnaryOp::BitwiseNot),
        just(Token::AMPERSAND).to(UnaryOp::AddrOf),
        just(Token::STAR).to(UnaryOp::Deref),
        just(Token::TRY).to(UnaryOp::Try),
    ));

    let unary = unary_op
        .map_with(|op, ctx| (op, ctx.span()))
        .repeated()
        .foldr(postfix.clone(), |(op, span): (UnaryOp, SourcePos), rhs| {
            let end = rhs.span().end;
            Expr::Unary(op, rhs.boxed(), span.start..end)
        })
        .boxed();

    // Binary levels, from tightest to loosest.
    let product_op = choice((
        just(Token::STAR).to(BinaryOp::Mul),
        just(Token::SLASH).to(BinaryOp::Div),
        just(Token::PERCENT).to(BinaryOp::Mod),
    ));
    let product = unary
        .clone()
        .foldl(product_op.then(unary).repeated(), |a, (op, b)| {
            binary(op, a, b)
        })
        .boxed();

    let sum_op = just(Token::PLUS)
        .to(BinaryOp::Add)
        .or(just(Token::MINUS).to(BinaryOp::Sub));
    let sum = product
        .clone()
        .foldl(sum_op.then(product).repeated(), |a, (op, b)| binary(op, a, b))
        .boxed();

    let shift_op = just(Token::SHIFT_LEFT)
        .to(BinaryOp::ShiftLeft)
        .or(just(Token::SHIFT_RIGHT).to(BinaryOp::ShiftRight));
    let shift = sum
        .clone()
        .foldl(shift_op.then(sum).repeated(), |a, (op, b)| binary(op, a, b))
        .boxed();

    let relational_op = choice((
        just(Token::LESS_EQ).to(BinaryOp::LessEq),
        just(Token::GREATER_EQ).to(BinaryOp::GreaterEq),
        just(Token::LESS).to(BinaryOp::Less),
        just(Token::GREATER).to(BinaryOp::Greater),
    ));
    let relational = shift
        .clone()
        .foldl(relational_op.then(shift).repeated(), |a, (op, b)| {
            binary(op, a, b)
        })
        .boxed();

    let equality_op = just(Token::EQ_EQ)
        .to(BinaryOp::Eq)
        .or(just(Token::NOT_EQ).to(BinaryOp::NotEq));
    let equality = relational
        .clone()
        .foldl(equality_op.then(relational).repeated(), |a, (op, b)| {
            binary(op, a, b)
        })
        .boxed();

    let bit_and = equality
        .clone()
        .foldl(
            just(Token::AMPERSAND)
                .to(BinaryOp::BitwiseAnd)
                .then(equality)
                .repeated(),
            |a, (op, b)| binary(op, a, b),
        )
        .boxed();

    let bit_xor = bit_and
        .clone()
        .foldl(
            just(Token::CARET)
                .to(BinaryOp::BitwiseXor)
                .then(bit_and)
                .repeated(),
            |a, (op, b)| binary(op, a, b),
        )
        .boxed();

    let bit_or = bit_xor
        .clone()
        .foldl(
            just(Token::PIPE)
                .to(BinaryOp::BitwiseOr)
                .then(bit_xor)
                .repeated(),
            |a, (op, b)| binary(op, a, b),
        )
        .boxed();

    let logical_and = bit_or
        .clone()
        .foldl(
            just(Token::AND_AND)
                .to(BinaryOp::LogicalAnd)
                .then(bit_or)
                .repeated(),
            |a, (op, b)| binary(op, a, b),
        )
        .boxed();

    let logical_or = logical_and
        .clone()
        .foldl(
            just(Token::OR_OR)
                .to(BinaryOp::LogicalOr)
                .then(logical_and)
                .repeated(),
            |a, (op, b)| binary(op, a, b),
        )
        .boxed();

    let catch_binding = ident
        .clone()
        .delimited_by(just(Token::PIPE), just(Token::PIPE))
        .or_not();

    let catch = logical_or
        .then(
            just(Token::CATCH)
                .ignore_then(catch_binding)
                .then(block.clone())
                .or_not(),
        )
        .map_with(|(expr, handler), ctx| match handler {
            None => expr,
            Some((binding, body)) => Expr::Catch(Box::new(CatchExpr {
                expr,
                binding,
                body,
                span: ctx.span(),
            })),
        });

    expr.define(catch);

    let ty = type_parser(expr.clone());

    let var = var_decl_parser(expr.clone(), ty.clone());

    let assign_op = choice((
        just(Token::EQ).to(AssignOp::Eq),
        just(Token::ASSIGN_ADD).to(AssignOp::Add),
        just(Token::ASSIGN_SUB).to(AssignOp::Sub),
        just(Token::ASSIGN_MULT).to(AssignOp::Mul),
        just(Token::ASSIGN_DIV).to(AssignOp::Div),
        just(Token::ASSIGN_MOD).to(AssignOp::Mod),
    ));

    let assign = postfix
        .clone()
        .then(assign_op)
        .then(expr.clone())
        .then_ignore(just(Token::SEMICOLON))
        .map_with(|((target, op), value), ctx| Stmt::Assign(target, op, value, ctx.span()));

    let if_stmt = recursive(|if_stmt| {
        just(Token::IF)
            .ignore_then(expr.clone())
            .then(block.clone())
            .then(
                just(Token::ELSE)
                    .ignore_then(choice((
                        block.clone(),
                        if_stmt.map_with(|stmt, ctx| Block {
                            stmts: vec![stmt],
                            span: ctx.span(),
                        }),
                    )))
                    .or_not(),
            )
            .map_with(|((cond, then), otherwise), ctx| {
                Stmt::If(cond, then, otherwise, ctx.span())
            })
    });

    let while_stmt = just(Token::WHILE)
        .ignore_then(expr.clone())
        .then(block.clone())
        .map_with(|(cond, body), ctx| Stmt::While(cond, body, ctx.span()));

    // The iterable stops before binary operators so `|item|` is not read as a bitwise or.
    let bindings = ident
        .clone()
        .then(just(Token::COMMA).ignore_then(ident.clone()).or_not())
        .delimited_by(just(Token::PIPE), just(Token::PIPE))
        .or_not();

    let for_stmt = just(Token::FOR)
        .ignore_then(postfix)
        .then(bindings)
        .then(block.clone())
        .map_with(|((iterable, bindings), body), ctx| {
            let (item, index) = match bindings {
                Some((item, index)) => (Some(item), index),
                None => (None, None),
            };

            Stmt::For(ForLoop {
                iterable,
                item,
                index,
                body,
                span: ctx.span(),
            })
        });

    let return_stmt = just(Token::RETURN)
        .ignore_then(expr.clone().or_not())
        .then_ignore(just(Token::SEMICOLON))
        .map_with(|value, ctx| Stmt::Return(value, ctx.span()));

    let break_stmt = just(Token::BREAK)
        .then_ignore(just(Token::SEMICOLON))
        .map_with(|_, ctx| Stmt::Break(ctx.span()));

    let continue_stmt = just(Token::CONTINUE)
        .then_ignore(just(Token::SEMICOLON))
        .map_with(|_, ctx| Stmt::Continue(ctx.span()));

    let defer_stmt = just(Token::DEFER)
        .ignore_then(block.clone())
        .then_ignore(just(Token::SEMICOLON).or_not())
        .map_with(|body, ctx| Stmt::Defer(body, ctx.span()));

    let errdefer_stmt = just(Token::ERRDEFER)
        .ignore_then(block.clone())
        .then_ignore(just(Token::SEMICOLON).or_not())
        .map_with(|body, ctx| Stmt::ErrDefer(body, ctx.span()));

    // A block may end in a bare expression, which is its value when used by `catch`.
    let expr_stmt = expr
        .clone()
        .then_ignore(
            just(Token::SEMICOLON)
                .ignored()
                .or(just(Token::R_CURLY).rewind().ignored()),
        )
        .map(Stmt::Expr);

    let stmt = choice((
        var.map(Stmt::Var),
        if_stmt,
        while_stmt,
        for_stmt,
        return_stmt,
        break_stmt,
        continue_stmt,
        defer_stmt,
        errdefer_stmt,
        block.clone().map(Stmt::Block),
        assign,
        expr_stmt,
    ))
    .boxed();

    block.define(
        stmt.repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::L_CURLY), just(Token::R_CURLY))
            .map_with(|stmts, ctx| Block {
                stmts,
                span: ctx.span(),
            }),
    );

    (expr, block)
}

fn with_span(expr: Expr, span: SourcePos) -> Expr {
    match expr {
        Expr::Int(value, _) => Expr::Int(value, span),
        Expr::Float(value, _) => Expr::Float(value, span),
        Expr::Bool(value, _) => Expr::Bool(value, span),
        Expr::Null(_) => Expr::Null(span),
        other => other,
    }
}

pub fn type_parser<'tokens, 'src: 'tokens, I, E>(
    expr: E,
) -> impl Parser<'tokens, I, TypeExpr, ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
    E: Parser<'tokens, I, Expr, ErrorParserExtra<'tokens, 'src>> + Clone + 'tokens,
{
    recursive(|ty| {
        let error_union = just(Token::BANG)
            .ignore_then(ty.clone())
            .map_with(|inner: TypeExpr, ctx| TypeExpr::ErrorUnion(Box::new(inner), ctx.span()));

        let pointer = just(Token::STAR)
            .ignore_then(ty.clone())
            .map_with(|inner, ctx| TypeExpr::Pointer(Box::new(inner), ctx.span()));

        let atomic = just(Token::ATOMIC)
            .ignore_then(ty.clone())
            .map_with(|inner, ctx| TypeExpr::Atomic(Box::new(inner), ctx.span()));

        let array = ty
            .clone()
            .then_ignore(just(Token::COLON))
            .then(expr.clone())
            .delimited_by(just(Token::L_SQUARE), just(Token::R_SQUARE))
            .map_with(|(elem, size), ctx| {
                TypeExpr::Array(Box::new(elem), Box::new(size), ctx.span())
            });

        let tuple = ty
            .clone()
            .separated_by(just(Token::COMMA))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::L_ROUND), just(Token::R_ROUND))
            .map_with(|items, ctx| TypeExpr::Tuple(items, ctx.span()));

        let named = ident_parser().map_with(|name, ctx| TypeExpr::Named(name, ctx.span()));

        choice((error_union, pointer, atomic, array, tuple, named))
    })
}

fn var_decl_parser<'tokens, 'src: 'tokens, I>(
    expr: impl Parser<'tokens, I, Expr, ErrorParserExtra<'tokens, 'src>> + Clone,
    ty: impl Parser<'tokens, I, TypeExpr, ErrorParserExtra<'tokens, 'src>> + Clone,
) -> impl Parser<'tokens, I, VarDecl, ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    let kind = just(Token::VAR).to(false).or(just(Token::CONST).to(true));

    kind.then(ident_parser())
        .then(just(Token::COLON).ignore_then(ty).or_not())
        .then(just(Token::EQ).ignore_then(expr).or_not())
        .then_ignore(just(Token::SEMICOLON))
        .map_with(|(((is_const, name), ty), value), ctx| VarDecl {
            name,
            ty,
            value,
            is_const,
            span: ctx.span(),
        })
}

enum ParamItem {
    Param(Param),
    Ellipsis(SourcePos),
}

fn params_parser<'tokens, 'src: 'tokens, I>(
    ty: impl Parser<'tokens, I, TypeExpr, ErrorParserExtra<'tokens, 'src>> + Clone,
) -> impl Parser<'tokens, I, (Vec<Param>, bool), ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    let param = ident_parser()
        .then_ignore(just(Token::COLON))
        .then(ty)
        .map_with(|(name, ty), ctx| ParamItem::Param(Param {
            name,
            ty,
            span: ctx.span(),
        }));

    let ellipsis = just(Token::ELLIPSIS).map_with(|_, ctx| ParamItem::Ellipsis(ctx.span()));

    param
        .or(ellipsis)
        .separated_by(just(Token::COMMA))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::L_ROUND), just(Token::R_ROUND))
        .try_map(|items: Vec<ParamItem>, _span: SourcePos| {
            let count = items.len();
            let mut params = Vec::with_capacity(count);
            let mut has_varargs = false;

            for (idx, item) in items.into_iter().enumerate() {
                match item {
                    ParamItem::Param(param) => params.push(param),
                    ParamItem::Ellipsis(_) if idx + 1 == count => has_varargs = true,
                    ParamItem::Ellipsis(span) => {
                        return Err(Rich::custom(span, "`...` must be the last parameter"));
                    }
                }
            }

            Ok((params, has_varargs))
        })
}

fn return_type_parser<'tokens, 'src: 'tokens, I>(
    ty: impl Parser<'tokens, I, TypeExpr, ErrorParserExtra<'tokens, 'src>> + Clone,
) -> impl Parser<'tokens, I, TypeExpr, ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    just(Token::ARROW)
        .or_not()
        .ignore_then(ty)
        .or_not()
        .map_with(|ty, ctx| {
            ty.unwrap_or_else(|| {
                let span: SourcePos = ctx.span();
                TypeExpr::Named("void".to_string(), span.start..span.start)
            })
        })
}

pub fn decl_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Decl, ErrorParserExtra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    let (expr, block) = expr_and_block_parser();
    let ty = type_parser(expr.clone());
    let ident = ident_parser();

    let function = just(Token::FN)
        .ignore_then(ident.clone())
        .then(params_parser(ty.clone()))
        .then(return_type_parser(ty.clone()))
        .then(block)
        .try_map(|(((name, (params, has_varargs)), ret), body), span: SourcePos| {
            if has_varargs {
                return Err(Rich::custom(
                    span,
                    format!("only extern functions may take `...`, `{name}` does"),
                ));
            }

            Ok(Decl::Function(FunctionDecl {
                name,
                params,
                ret,
                body,
                span,
            }))
        });

    let extern_fn = just(Token::EXTERN)
        .ignore_then(just(Token::FN))
        .ignore_then(ident.clone())
        .then(params_parser(ty.clone()))
        .then(return_type_parser(ty.clone()))
        .then_ignore(just(Token::SEMICOLON))
        .map_with(|((name, (params, has_varargs)), ret), ctx| {
            Decl::Extern(ExternDecl {
                name,
                params,
                ret,
                has_varargs,
                span: ctx.span(),
            })
        });

    let field = ident
        .clone()
        .then_ignore(just(Token::COLON))
        .then(ty.clone())
        .map_with(|(name, ty), ctx| Param {
            name,
            ty,
            span: ctx.span(),
        });

    let structure = just(Token::STRUCT)
        .ignore_then(ident.clone())
        .then(
            field
                .separated_by(just(Token::COMMA))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::L_CURLY), just(Token::R_CURLY)),
        )
        .map_with(|(name, fields), ctx| {
            Decl::Struct(StructDecl {
                name,
                fields,
                span: ctx.span(),
            })
        });

    let variant = ident
        .clone()
        .then(just(Token::EQ).ignore_then(expr.clone()).or_not())
        .map_with(|(name, value), ctx| EnumVariant {
            name,
            value,
            span: ctx.span(),
        });

    let enumeration = just(Token::ENUM)
        .ignore_then(ident.clone())
        .then(
            variant
                .separated_by(just(Token::COMMA))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::L_CURLY), just(Token::R_CURLY)),
        )
        .map_with(|(name, variants), ctx| {
            Decl::Enum(EnumDecl {
                name,
                variants,
                span: ctx.span(),
            })
        });

    let error = just(Token::ERROR)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::SEMICOLON))
        .map_with(|name, ctx| {
            Decl::Error(ErrorDecl {
                name,
                span: ctx.span(),
            })
        });

    let method = just(Token::FN)
        .ignore_then(ident.clone())
        .then(params_parser(ty.clone()))
        .then(return_type_parser(ty.clone()))
        .then_ignore(just(Token::SEMICOLON))
        .map_with(|((name, (params, _)), ret), ctx| MethodSig {
            name,
            params,
            ret,
            span: ctx.span(),
        });

    let interface = just(Token::INTERFACE)
        .ignore_then(ident)
        .then(
            method
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::L_CURLY), just(Token::R_CURLY)),
        )
        .map_with(|(name, methods), ctx| {
            Decl::Interface(InterfaceDecl {
                name,
                methods,
                span: ctx.span(),
            })
        });

    let global = var_decl_parser(expr, ty).map(Decl::Var);

    choice((
        function,
        extern_fn,
        structure,
        enumeration,
        error,
        interface,
        global,
    ))
}

pub fn program_parser<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Program, ErrorParserExtra<'tokens, 'src>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SourcePos>,
{
    decl_parser()
        .repeated()
        .collect()
        .then_ignore(end())
        .map(|decls| Program { decls })
}

/// Plain literals stay raw. Literals containing `${...}` are split into text and
/// expression segments, each expression lexed and parsed on its own.
fn string_literal<'tokens, 'src>(
    raw: &str,
    span: SourcePos,
) -> Result<Expr, Rich<'tokens, Token<'src>, SourcePos>> {
    if !raw.contains("${") {
        return Ok(Expr::Str(raw.to_string(), span));
    }

    // contents start right after the opening quote
    let base = span.start + 1;
    let mut segments = Vec::new();
    let mut rest = raw;
    let mut offset = 0;

    while let Some(start) = find_interpolation(rest) {
        if start > 0 {
            segments.push(InterpSegment::Text(rest[..start].to_string()));
        }

        let inner_start = start + 2;
        let Some(len) = closing_brace(&rest[inner_start..]) else {
            return Err(Rich::custom(span, "unterminated `${` in string literal"));
        };

        let inner = &rest[inner_start..inner_start + len];
        let (source, spec) = split_format_spec(inner);
        let expr = parse_embedded(source, base + offset + inner_start, span.clone())?;
        segments.push(InterpSegment::Expr(expr, spec.map(str::to_string)));

        let consumed = inner_start + len + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        segments.push(InterpSegment::Text(rest.to_string()));
    }

    Ok(Expr::Interpolated(segments, span))
}

fn find_interpolation(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx + 1 < bytes.len() {
        match (bytes[idx], bytes[idx + 1]) {
            (b'\\', _) => idx += 2,
            (b'$', b'{') => return Some(idx),
            _ => idx += 1,
        }
    }

    None
}

fn closing_brace(text: &str) -> Option<usize> {
    let mut depth = 1;
    for (idx, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }

    None
}

/// `${value:08.3f}` carries a printf style spec after the last top-level colon.
fn split_format_spec(inner: &str) -> (&str, Option<&str>) {
    let Some(colon) = inner.rfind(':') else {
        return (inner, None);
    };

    let spec = &inner[colon + 1..];
    let is_spec = !spec.is_empty()
        && spec
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "#0-+ .".contains(c));
    let braces_balanced = inner[..colon].matches('{').count() == inner[..colon].matches('}').count();

    if is_spec && braces_balanced {
        (&inner[..colon], Some(spec))
    } else {
        (inner, None)
    }
}

fn parse_embedded<'tokens, 'src>(
    source: &str,
    offset: usize,
    literal_span: SourcePos,
) -> Result<Expr, Rich<'tokens, Token<'src>, SourcePos>> {
    let Ok(tokens) = lexer().parse(source).into_result() else {
        return Err(Rich::custom(
            literal_span,
            format!("invalid interpolated expression `{source}`"),
        ));
    };

    let tokens: Vec<_> = tokens
        .into_iter()
        .map(|(token, span)| (token, span.start + offset..span.end + offset))
        .collect();
    let eoi = offset + source.len()..offset + source.len();

    let (expr, _) = expr_and_block_parser();
    expr.then_ignore(end())
        .parse(tokens.as_slice().map(eoi, |(t, s)| (t, s)))
        .into_result()
        .map_err(|_| {
            Rich::custom(
                literal_span,
                format!("invalid interpolated expression `{source}`"),
            )
        })
}
