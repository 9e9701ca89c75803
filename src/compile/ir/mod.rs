use crate::compile::{
    ast::{BinaryOp, UnaryOp},
    semantic::types::Type,
};

pub mod generate;

/// Instructions are a closed tree: every node owns its children, and an instruction used
/// as an operand is moved into its parent.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Constant(Constant),
    Ident(String),
    VarDecl(VarDecl),
    Assign {
        target: Box<Inst>,
        op: Option<BinaryOp>,
        value: Box<Inst>,
    },
    BinaryOp {
        op: BinaryOp,
        lhs: Box<Inst>,
        rhs: Box<Inst>,
    },
    /// Never `UnaryOp::Try`, which has its own instruction.
    UnaryOp {
        op: UnaryOp,
        operand: Box<Inst>,
    },
    Call {
        name: String,
        args: Vec<Inst>,
    },
    If {
        cond: Box<Inst>,
        then: Vec<Inst>,
        otherwise: Option<Vec<Inst>>,
    },
    While {
        cond: Box<Inst>,
        body: Vec<Inst>,
    },
    For {
        iterable: Box<Inst>,
        /// Length of the iterated array when its declaration is visible.
        len: Option<u64>,
        item: Option<String>,
        index: String,
        body: Vec<Inst>,
    },
    Block(Vec<Inst>),
    MemberAccess {
        object: Box<Inst>,
        member: String,
    },
    EnumVariant {
        enum_name: String,
        variant: String,
    },
    Subscript {
        object: Box<Inst>,
        index: Box<Inst>,
    },
    StructInit {
        name: String,
        fields: Vec<(String, Inst)>,
    },
    /// `ty` is known when the tuple initializes something of a declared tuple type.
    TupleInit {
        ty: Option<Type>,
        items: Vec<Inst>,
    },
    ArrayInit(Vec<Inst>),
    ErrorValue {
        name: String,
        code: u32,
    },
    /// A `!T` built in place. `error_id` is an error value, or `0` next to a `value`.
    ErrorUnionInit {
        payload: Type,
        error_id: Box<Inst>,
        value: Option<Box<Inst>>,
    },
    Goto(String),
    Label(String),
    Comment(String),
    StringInterpolation {
        buffer: String,
        format: String,
        args: Vec<Inst>,
    },
    TryCatch(Box<TryCatch>),
    /// `try e`: hands a failure of `e` to the enclosing function's error exit.
    Try {
        expr: Box<Inst>,
        temp: String,
        yields_value: bool,
    },
    Match {
        scrutinee: Box<Inst>,
        temp: String,
        arms: Vec<MatchArm>,
    },
    FuncDef(FuncDef),
    StructDecl {
        name: String,
        fields: Vec<(String, Type)>,
    },
    EnumDecl {
        name: String,
        variants: Vec<(String, Option<Inst>)>,
    },
    ErrorDecl {
        name: String,
        code: u32,
    },
    Defer(Vec<Inst>),
    ErrDefer(Vec<Inst>),
    /// `forward` marks a value that is itself a fallible result of the function's type,
    /// such as the result of calling another fallible function.
    Return {
        value: Option<Box<Inst>>,
        forward: bool,
    },
    Break,
    Continue,
}

impl Inst {
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    pub fn ident(name: impl Into<String>) -> Inst {
        Inst::Ident(name.into())
    }

    pub fn int(value: impl Into<String>) -> Inst {
        Inst::Constant(Constant::Int(value.into()))
    }

    pub fn member(object: Inst, member: impl Into<String>) -> Inst {
        Inst::MemberAccess {
            object: object.boxed(),
            member: member.into(),
        }
    }

    pub fn assign(target: Inst, value: Inst) -> Inst {
        Inst::Assign {
            target: target.boxed(),
            op: None,
            value: value.boxed(),
        }
    }

    /// Direct sub-instructions in evaluation order.
    pub fn children(&self) -> Vec<&Inst> {
        match self {
            Inst::Constant(_)
            | Inst::Ident(_)
            | Inst::EnumVariant { .. }
            | Inst::ErrorValue { .. }
            | Inst::Goto(_)
            | Inst::Label(_)
            | Inst::Comment(_)
            | Inst::StructDecl { .. }
            | Inst::ErrorDecl { .. }
            | Inst::Break
            | Inst::Continue => Vec::new(),
            Inst::VarDecl(decl) => decl.value.iter().map(|v| &**v).collect(),
            Inst::Assign { target, value, .. } => vec![&**target, &**value],
            Inst::BinaryOp { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            Inst::UnaryOp { operand, .. } => vec![&**operand],
            Inst::Call { args, .. } => args.iter().collect(),
            Inst::If {
                cond,
                then,
                otherwise,
            } => std::iter::once(&**cond)
                .chain(then.iter())
                .chain(otherwise.iter().flatten())
                .collect(),
            Inst::While { cond, body } => std::iter::once(&**cond).chain(body.iter()).collect(),
            Inst::For { iterable, body, .. } => {
                std::iter::once(&**iterable).chain(body.iter()).collect()
            }
            Inst::Block(body) | Inst::Defer(body) | Inst::ErrDefer(body) => body.iter().collect(),
            Inst::MemberAccess { object, .. } => vec![&**object],
            Inst::Subscript { object, index } => vec![&**object, &**index],
            Inst::StructInit { fields, .. } => fields.iter().map(|(_, value)| value).collect(),
            Inst::TupleInit { items, .. } | Inst::ArrayInit(items) => items.iter().collect(),
            Inst::ErrorUnionInit { error_id, value, .. } => std::iter::once(&**error_id)
                .chain(value.iter().map(|v| &**v))
                .collect(),
            Inst::StringInterpolation { args, .. } => args.iter().collect(),
            Inst::TryCatch(catch) => std::iter::once(&catch.expr).chain(catch.body.iter()).collect(),
            Inst::Try { expr, .. } => vec![&**expr],
            Inst::Match {
                scrutinee, arms, ..
            } => std::iter::once(&**scrutinee)
                .chain(
                    arms.iter()
                        .flat_map(|arm| arm.pattern.iter().chain(std::iter::once(&arm.value))),
                )
                .collect(),
            Inst::FuncDef(def) => def.body.iter().collect(),
            Inst::EnumDecl { variants, .. } => {
                variants.iter().filter_map(|(_, value)| value.as_ref()).collect()
            }
            Inst::Return { value, .. } => value.iter().map(|v| &**v).collect(),
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(
            self,
            Inst::Constant(_)
                | Inst::Ident(_)
                | Inst::BinaryOp { .. }
                | Inst::UnaryOp { .. }
                | Inst::Call { .. }
                | Inst::MemberAccess { .. }
                | Inst::EnumVariant { .. }
                | Inst::Subscript { .. }
                | Inst::StructInit { .. }
                | Inst::TupleInit { .. }
                | Inst::ArrayInit(_)
                | Inst::ErrorValue { .. }
                | Inst::ErrorUnionInit { .. }
                | Inst::StringInterpolation { .. }
                | Inst::TryCatch(_)
                | Inst::Try { .. }
                | Inst::Match { .. }
        )
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Inst::Constant(_) => "constant",
            Inst::Ident(_) => "identifier",
            Inst::VarDecl(_) => "variable declaration",
            Inst::Assign { .. } => "assignment",
            Inst::BinaryOp { .. } => "binary operation",
            Inst::UnaryOp { .. } => "unary operation",
            Inst::Call { .. } => "call",
            Inst::If { .. } => "if",
            Inst::While { .. } => "while",
            Inst::For { .. } => "for",
            Inst::Block(_) => "block",
            Inst::MemberAccess { .. } => "member access",
            Inst::EnumVariant { .. } => "enum variant",
            Inst::Subscript { .. } => "subscript",
            Inst::StructInit { .. } => "struct initializer",
            Inst::TupleInit { .. } => "tuple initializer",
            Inst::ArrayInit(_) => "array initializer",
            Inst::ErrorValue { .. } => "error value",
            Inst::ErrorUnionInit { .. } => "error union initializer",
            Inst::Goto(_) => "goto",
            Inst::Label(_) => "label",
            Inst::Comment(_) => "comment",
            Inst::StringInterpolation { .. } => "string interpolation",
            Inst::TryCatch(_) => "catch",
            Inst::Try { .. } => "try",
            Inst::Match { .. } => "match",
            Inst::FuncDef(_) => "function definition",
            Inst::StructDecl { .. } => "struct declaration",
            Inst::EnumDecl { .. } => "enum declaration",
            Inst::ErrorDecl { .. } => "error declaration",
            Inst::Defer(_) => "defer",
            Inst::ErrDefer(_) => "errdefer",
            Inst::Return { .. } => "return",
            Inst::Break => "break",
            Inst::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Already in C spelling.
    Int(String),
    Float(String),
    Bool(bool),
    /// String contents exactly as written between the quotes.
    Str(String),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    /// `None` lets the C compiler infer the type from the initializer.
    pub ty: Option<Type>,
    pub value: Option<Box<Inst>>,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryCatch {
    pub expr: Inst,
    pub binding: Option<String>,
    /// The last instruction is the produced value when it is an expression.
    pub body: Vec<Inst>,
    pub temp: String,
    /// False for results without a payload (`!void`).
    pub yields_value: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    /// `None` is the `else` arm.
    pub pattern: Option<Inst>,
    pub value: Inst,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<VarDecl>,
    pub return_type: Type,
    pub body: Vec<Inst>,
    pub is_extern: bool,
    pub has_varargs: bool,
}

impl FuncDef {
    pub fn is_fallible(&self) -> bool {
        matches!(self.return_type, Type::ErrorUnion(_))
    }

    /// The success type: the declared type with any `!` stripped.
    pub fn payload(&self) -> &Type {
        match &self.return_type {
            Type::ErrorUnion(inner) => inner,
            other => other,
        }
    }
}
