use int_literal::IntLiteral;

pub mod int_literal;

pub type SourcePos = core::ops::Range<usize>;

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Function(FunctionDecl),
    Extern(ExternDecl),
    Var(VarDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Error(ErrorDecl),
    Interface(InterfaceDecl),
}

impl Decl {
    pub fn span(&self) -> SourcePos {
        match self {
            Decl::Function(decl) => decl.span.clone(),
            Decl::Extern(decl) => decl.span.clone(),
            Decl::Var(decl) => decl.span.clone(),
            Decl::Struct(decl) => decl.span.clone(),
            Decl::Enum(decl) => decl.span.clone(),
            Decl::Error(decl) => decl.span.clone(),
            Decl::Interface(decl) => decl.span.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeExpr,
    pub body: Block,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct ExternDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeExpr,
    pub has_varargs: bool,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub value: Option<Expr>,
    pub is_const: bool,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Param>,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub name: String,
    pub value: Option<Expr>,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<EnumVariant>,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct ErrorDecl {
    pub name: String,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeExpr,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub name: String,
    pub methods: Vec<MethodSig>,
    pub span: SourcePos,
}

/// Types as written in the source.
#[derive(Debug, Clone)]
pub enum TypeExpr {
    Named(String, SourcePos),
    Pointer(Box<TypeExpr>, SourcePos),
    Array(Box<TypeExpr>, Box<Expr>, SourcePos),
    Tuple(Vec<TypeExpr>, SourcePos),
    ErrorUnion(Box<TypeExpr>, SourcePos),
    Atomic(Box<TypeExpr>, SourcePos),
}

impl TypeExpr {
    pub fn span(&self) -> SourcePos {
        match self {
            TypeExpr::Named(_, span)
            | TypeExpr::Pointer(_, span)
            | TypeExpr::Array(_, _, span)
            | TypeExpr::Tuple(_, span)
            | TypeExpr::ErrorUnion(_, span)
            | TypeExpr::Atomic(_, span) => span.clone(),
        }
    }

    pub fn is_error_union(&self) -> bool {
        matches!(self, TypeExpr::ErrorUnion(..))
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Var(VarDecl),
    Expr(Expr),
    Assign(Expr, AssignOp, Expr, SourcePos),
    If(Expr, Block, Option<Block>, SourcePos),
    While(Expr, Block, SourcePos),
    For(ForLoop),
    Return(Option<Expr>, SourcePos),
    Break(SourcePos),
    Continue(SourcePos),
    Block(Block),
    Defer(Block, SourcePos),
    ErrDefer(Block, SourcePos),
}

impl Stmt {
    pub fn span(&self) -> SourcePos {
        match self {
            Stmt::Var(decl) => decl.span.clone(),
            Stmt::Expr(expr) => expr.span(),
            Stmt::For(for_loop) => for_loop.span.clone(),
            Stmt::Block(block) => block.span.clone(),
            Stmt::Assign(_, _, _, span)
            | Stmt::If(_, _, _, span)
            | Stmt::While(_, _, span)
            | Stmt::Return(_, span)
            | Stmt::Break(span)
            | Stmt::Continue(span)
            | Stmt::Defer(_, span)
            | Stmt::ErrDefer(_, span) => span.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForLoop {
    pub iterable: Expr,
    pub item: Option<String>,
    pub index: Option<String>,
    pub body: Block,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(IntLiteral, SourcePos),
    Float(String, SourcePos),
    Bool(bool, SourcePos),
    Str(String, SourcePos),
    Null(SourcePos),
    Ident(String, SourcePos),
    Unary(UnaryOp, Box<Expr>, SourcePos),
    Binary(BinaryOp, Box<Expr>, Box<Expr>, SourcePos),
    Call(String, Vec<Expr>, SourcePos),
    Member(Box<Expr>, String, SourcePos),
    Subscript(Box<Expr>, Box<Expr>, SourcePos),
    StructInit(String, Vec<(String, Expr)>, SourcePos),
    Tuple(Vec<Expr>, SourcePos),
    Array(Vec<Expr>, SourcePos),
    ErrorValue(String, SourcePos),
    Catch(Box<CatchExpr>),
    Match(Box<MatchExpr>),
    Interpolated(Vec<InterpSegment>, SourcePos),
}

impl Expr {
    pub fn span(&self) -> SourcePos {
        match self {
            Expr::Catch(catch) => catch.span.clone(),
            Expr::Match(matching) => matching.span.clone(),
            Expr::Int(_, span)
            | Expr::Float(_, span)
            | Expr::Bool(_, span)
            | Expr::Str(_, span)
            | Expr::Null(span)
            | Expr::Ident(_, span)
            | Expr::Unary(_, _, span)
            | Expr::Binary(_, _, _, span)
            | Expr::Call(_, _, span)
            | Expr::Member(_, _, span)
            | Expr::Subscript(_, _, span)
            | Expr::StructInit(_, _, span)
            | Expr::Tuple(_, span)
            | Expr::Array(_, span)
            | Expr::ErrorValue(_, span)
            | Expr::Interpolated(_, span) => span.clone(),
        }
    }

    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }
}

#[derive(Debug, Clone)]
pub struct CatchExpr {
    pub expr: Expr,
    pub binding: Option<String>,
    pub body: Block,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub enum MatchPattern {
    Value(Expr),
    Else(SourcePos),
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: MatchPattern,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct MatchExpr {
    pub scrutinee: Expr,
    pub arms: Vec<MatchArm>,
    pub span: SourcePos,
}

#[derive(Debug, Clone)]
pub enum InterpSegment {
    Text(String),
    Expr(Expr, Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    LogicalNot,
    BitwiseNot,
    AddrOf,
    Deref,
    Try,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::LogicalNot => "!",
            Self::BitwiseNot => "~",
            Self::AddrOf => "&",
            Self::Deref => "*",
            Self::Try => "try",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    //
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    //
    LogicalAnd,
    LogicalOr,
    //
    ShiftLeft,
    ShiftRight,
    //
    Eq,
    NotEq,
    //
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            Self::BitwiseAnd | Self::BitwiseOr | Self::BitwiseXor | Self::ShiftLeft | Self::ShiftRight
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::LogicalAnd | Self::LogicalOr)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Less | Self::LessEq | Self::Greater | Self::GreaterEq
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::BitwiseXor => "^",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
        }
    }
}

impl From<AssignOp> for Option<BinaryOp> {
    fn from(value: AssignOp) -> Self {
        match value {
            AssignOp::Eq => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Eq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}
