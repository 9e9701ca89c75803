use std::borrow::Cow;
use std::fmt::Display;

use chumsky::prelude::*;

use super::Spanned;

#[derive(Clone, Debug, PartialEq)]
#[allow(non_camel_case_types)]
pub enum Token<'src> {
    IDENT(Cow<'src, str>),
    NUM { value: Cow<'src, str>, base: u32 },
    FLOAT(Cow<'src, str>),
    STR(Cow<'src, str>),
    FN,
    EXTERN,
    VAR,
    CONST,
    STRUCT,
    ENUM,
    INTERFACE,
    ERROR,
    IF,
    ELSE,
    WHILE,
    FOR,
    BREAK,
    CONTINUE,
    RETURN,
    DEFER,
    ERRDEFER,
    TRY,
    CATCH,
    MATCH,
    TRUE,
    FALSE,
    NULL,
    ATOMIC,
    L_ROUND,
    R_ROUND,
    L_CURLY,
    R_CURLY,
    L_SQUARE,
    R_SQUARE,
    COMMA,
    SEMICOLON,
    COLON,
    DOT,
    ELLIPSIS,
    ARROW,
    FAT_ARROW,
    PIPE,
    BANG,
    AMPERSAND,
    STAR,
    PLUS,
    MINUS,
    SLASH,
    PERCENT,
    CARET,
    TILDE,
    SHIFT_LEFT,
    SHIFT_RIGHT,
    EQ_EQ,
    NOT_EQ,
    LESS,
    LESS_EQ,
    GREATER,
    GREATER_EQ,
    AND_AND,
    OR_OR,
    EQ,
    ASSIGN_ADD,
    ASSIGN_SUB,
    ASSIGN_MULT,
    ASSIGN_DIV,
    ASSIGN_MOD,
}

impl Token<'_> {
    pub fn into_owned(self) -> Token<'static> {
        match self {
            Token::IDENT(ident) => Token::IDENT(Cow::Owned(ident.into_owned())),
            Token::NUM { value, base } => Token::NUM {
                value: Cow::Owned(value.into_owned()),
                base,
            },
            Token::FLOAT(value) => Token::FLOAT(Cow::Owned(value.into_owned())),
            Token::STR(value) => Token::STR(Cow::Owned(value.into_owned())),
            Token::FN => Token::FN,
            Token::EXTERN => Token::EXTERN,
            Token::VAR => Token::VAR,
            Token::CONST => Token::CONST,
            Token::STRUCT => Token::STRUCT,
            Token::ENUM => Token::ENUM,
            Token::INTERFACE => Token::INTERFACE,
            Token::ERROR => Token::ERROR,
            Token::IF => Token::IF,
            Token::ELSE => Token::ELSE,
            Token::WHILE => Token::WHILE,
            Token::FOR => Token::FOR,
            Token::BREAK => Token::BREAK,
            Token::CONTINUE => Token::CONTINUE,
            Token::RETURN => Token::RETURN,
            Token::DEFER => Token::DEFER,
            Token::ERRDEFER => Token::ERRDEFER,
            Token::TRY => Token::TRY,
            Token::CATCH => Token::CATCH,
            Token::MATCH => Token::MATCH,
            Token::TRUE => Token::TRUE,
            Token::FALSE => Token::FALSE,
            Token::NULL => Token::NULL,
            Token::ATOMIC => Token::ATOMIC,
            Token::L_ROUND => Token::L_ROUND,
            Token::R_ROUND => Token::R_ROUND,
            Token::L_CURLY => Token::L_CURLY,
            Token::R_CURLY => Token::R_CURLY,
            Token::L_SQUARE => Token::L_SQUARE,
            Token::R_SQUARE => Token::R_SQUARE,
            Token::COMMA => Token::COMMA,
            Token::SEMICOLON => Token::SEMICOLON,
            Token::COLON => Token::COLON,
            Token::DOT => Token::DOT,
            Token::ELLIPSIS => Token::ELLIPSIS,
            Token::ARROW => Token::ARROW,
            Token::FAT_ARROW => Token::FAT_ARROW,
            Token::PIPE => Token::PIPE,
            Token::BANG => Token::BANG,
            Token::AMPERSAND => Token::AMPERSAND,
            Token::STAR => Token::STAR,
            Token::PLUS => Token::PLUS,
            Token::MINUS => Token::MINUS,
            Token::SLASH => Token::SLASH,
            Token::PERCENT => Token::PERCENT,
            Token::CARET => Token::CARET,
            Token::TILDE => Token::TILDE,
            Token::SHIFT_LEFT => Token::SHIFT_LEFT,
            Token::SHIFT_RIGHT => Token::SHIFT_RIGHT,
            Token::EQ_EQ => Token::EQ_EQ,
            Token::NOT_EQ => Token::NOT_EQ,
            Token::LESS => Token::LESS,
            Token::LESS_EQ => Token::LESS_EQ,
            Token::GREATER => Token::GREATER,
            Token::GREATER_EQ => Token::GREATER_EQ,
            Token::AND_AND => Token::AND_AND,
            Token::OR_OR => Token::OR_OR,
            Token::EQ => Token::EQ,
            Token::ASSIGN_ADD => Token::ASSIGN_ADD,
            Token::ASSIGN_SUB => Token::ASSIGN_SUB,
            Token::ASSIGN_MULT => Token::ASSIGN_MULT,
            Token::ASSIGN_DIV => Token::ASSIGN_DIV,
            Token::ASSIGN_MOD => Token::ASSIGN_MOD,
        }
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Token::IDENT(ident) => return f.write_str(ident),
            Token::NUM { value, .. } | Token::FLOAT(value) => return f.write_str(value),
            Token::STR(value) => return write!(f, "\"{value}\""),
            Token::FN => "fn",
            Token::EXTERN => "extern",
            Token::VAR => "var",
            Token::CONST => "const",
            Token::STRUCT => "struct",
            Token::ENUM => "enum",
            Token::INTERFACE => "interface",
            Token::ERROR => "error",
            Token::IF => "if",
            Token::ELSE => "else",
            Token::WHILE => "while",
            Token::FOR => "for",
            Token::BREAK => "break",
            Token::CONTINUE => "continue",
            Token::RETURN => "return",
            Token::DEFER => "defer",
            Token::ERRDEFER => "errdefer",
            Token::TRY => "try",
            Token::CATCH => "catch",
            Token::MATCH => "match",
            Token::TRUE => "true",
            Token::FALSE => "false",
            Token::NULL => "null",
            Token::ATOMIC => "atomic",
            Token::L_ROUND => "(",
            Token::R_ROUND => ")",
            Token::L_CURLY => "{",
            Token::R_CURLY => "}",
            Token::L_SQUARE => "[",
            Token::R_SQUARE => "]",
            Token::COMMA => ",",
            Token::SEMICOLON => ";",
            Token::COLON => ":",
            Token::DOT => ".",
            Token::ELLIPSIS => "...",
            Token::ARROW => "->",
            Token::FAT_ARROW => "=>",
            Token::PIPE => "|",
            Token::BANG => "!",
            Token::AMPERSAND => "&",
            Token::STAR => "*",
            Token::PLUS => "+",
            Token::MINUS => "-",
            Token::SLASH => "/",
            Token::PERCENT => "%",
            Token::CARET => "^",
            Token::TILDE => "~",
            Token::SHIFT_LEFT => "<<",
            Token::SHIFT_RIGHT => ">>",
            Token::EQ_EQ => "==",
            Token::NOT_EQ => "!=",
            Token::LESS => "<",
            Token::LESS_EQ => "<=",
            Token::GREATER => ">",
            Token::GREATER_EQ => ">=",
            Token::AND_AND => "&&",
            Token::OR_OR => "||",
            Token::EQ => "=",
            Token::ASSIGN_ADD => "+=",
            Token::ASSIGN_SUB => "-=",
            Token::ASSIGN_MULT => "*=",
            Token::ASSIGN_DIV => "/=",
            Token::ASSIGN_MOD => "%=",
        };

        f.write_str(text)
    }
}

pub(super) type ErrorParserExtra<'src> = extra::Err<Rich<'src, char, SimpleSpan>>;

fn decimal<'src>() -> impl Parser<'src, &'src str, Token<'src>, ErrorParserExtra<'src>> + Clone {
    text::int(10).map(|value: &'src str| Token::NUM {
        value: Cow::Borrowed(value),
        base: 10,
    })
}

fn hexadecimal<'src>() -> impl Parser<'src, &'src str, Token<'src>, ErrorParserExtra<'src>> + Clone
{
    just("0x")
        .ignore_then(text::int(16))
        .map(|value: &'src str| Token::NUM {
            value: Cow::Borrowed(value),
            base: 16,
        })
}

fn binary<'src>() -> impl Parser<'src, &'src str, Token<'src>, ErrorParserExtra<'src>> + Clone {
    just("0b")
        .ignore_then(text::int(2))
        .map(|value: &'src str| Token::NUM {
            value: Cow::Borrowed(value),
            base: 2,
        })
}

fn float<'src>() -> impl Parser<'src, &'src str, Token<'src>, ErrorParserExtra<'src>> + Clone {
    text::int(10)
        .then(just('.'))
        .then(text::digits(10))
        .to_slice()
        .map(|value: &'src str| Token::FLOAT(Cow::Borrowed(value)))
}

/// String literal contents are kept raw, escapes included. They are valid C escapes and
/// interpolation segments are split later by the parser.
fn string<'src>() -> impl Parser<'src, &'src str, Token<'src>, ErrorParserExtra<'src>> + Clone {
    let escape = just('\\').then(one_of("nrt0\\\"$")).ignored();
    let plain = none_of("\\\"\n").ignored();

    choice((escape, plain))
        .repeated()
        .to_slice()
        .delimited_by(just('"'), just('"'))
        .map(|value: &'src str| Token::STR(Cow::Borrowed(value)))
}

pub fn lexer<'src>()
-> impl Parser<'src, &'src str, Vec<Spanned<Token<'src>>>, ErrorParserExtra<'src>> {
    let ident = text::ascii::ident().map(|ident: &'src str| match ident {
        "fn" => Token::FN,
        "extern" => Token::EXTERN,
        "var" => Token::VAR,
        "const" => Token::CONST,
        "struct" => Token::STRUCT,
        "enum" => Token::ENUM,
        "interface" => Token::INTERFACE,
        "error" => Token::ERROR,
        "if" => Token::IF,
        "else" => Token::ELSE,
        "while" => Token::WHILE,
        "for" => Token::FOR,
        "break" => Token::BREAK,
        "continue" => Token::CONTINUE,
        "return" => Token::RETURN,
        "defer" => Token::DEFER,
        "errdefer" => Token::ERRDEFER,
        "try" => Token::TRY,
        "catch" => Token::CATCH,
        "match" => Token::MATCH,
        "true" => Token::TRUE,
        "false" => Token::FALSE,
        "null" => Token::NULL,
        "atomic" => Token::ATOMIC,
        _ => Token::IDENT(Cow::Borrowed(ident)),
    });

    let long_symbols = choice((
        just("...").to(Token::ELLIPSIS),
        just("->").to(Token::ARROW),
        just("=>").to(Token::FAT_ARROW),
        just("<<").to(Token::SHIFT_LEFT),
        just(">>").to(Token::SHIFT_RIGHT),
        just("==").to(Token::EQ_EQ),
        just("!=").to(Token::NOT_EQ),
        just("<=").to(Token::LESS_EQ),
        just(">=").to(Token::GREATER_EQ),
        just("&&").to(Token::AND_AND),
        just("||").to(Token::OR_OR),
        just("+=").to(Token::ASSIGN_ADD),
        just("-=").to(Token::ASSIGN_SUB),
        just("*=").to(Token::ASSIGN_MULT),
        just("/=").to(Token::ASSIGN_DIV),
        just("%=").to(Token::ASSIGN_MOD),
    ));

    let short_symbols = choice((
        just("(").to(Token::L_ROUND),
        just(")").to(Token::R_ROUND),
        just("{").to(Token::L_CURLY),
        just("}").to(Token::R_CURLY),
        just("[").to(Token::L_SQUARE),
        just("]").to(Token::R_SQUARE),
        just(",").to(Token::COMMA),
        just(";").to(Token::SEMICOLON),
        just(":").to(Token::COLON),
        just(".").to(Token::DOT),
        just("|").to(Token::PIPE),
        just("!").to(Token::BANG),
        just("&").to(Token::AMPERSAND),
        just("*").to(Token::STAR),
        just("+").to(Token::PLUS),
        just("-").to(Token::MINUS),
        just("/").to(Token::SLASH),
        just("%").to(Token::PERCENT),
        just("^").to(Token::CARET),
        just("~").to(Token::TILDE),
        just("<").to(Token::LESS),
        just(">").to(Token::GREATER),
        just("=").to(Token::EQ),
    ));

    let comment_single_line = just("//")
        .then(any().and_is(text::newline().not()).repeated())
        .ignored()
        .boxed();

    let comment_multi_line = recursive(|comment| {
        let inner = any()
            .and_is(just("*/").not())
            .and_is(just("/*").not())
            .ignored();

        just("/*")
            .ignore_then(choice((comment, inner)).repeated())
            .then_ignore(just("*/"))
            .ignored()
    });

    let comment = choice((comment_single_line, comment_multi_line.boxed())).boxed();
    let padding = choice((text::whitespace().at_least(1).ignored(), comment))
        .repeated()
        .boxed();

    choice((
        hexadecimal(),
        binary(),
        float(),
        decimal(),
        string(),
        ident,
        long_symbols,
        short_symbols,
    ))
    .map_with(|token, ctx| (token, ctx.span().into()))
    .then_ignore(padding.clone())
    .repeated()
    .collect()
    .delimited_by(padding, end())
}
