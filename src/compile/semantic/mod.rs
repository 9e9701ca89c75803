use thiserror::Error;
use tracing::debug;

use crate::{
    compile::{ast::Program, source::SourceFile},
    infra::diagnostic::{Diagnostic, Diagnostics},
};

pub mod const_eval;
pub mod controlflow;
pub mod error_codes;
pub mod functions;
pub mod registry;
pub mod symbols;
pub mod typecheck;
pub mod types;

use types::Type;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SemanticError {
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    #[error("variable `{0}` is used before initialization")]
    UsedBeforeInit(String),

    #[error("duplicate definition of `{name}` at {at}, previously declared at {previous}")]
    DuplicateDefinition {
        name: String,
        at: String,
        previous: String,
    },

    #[error("function `{0}` is already defined")]
    DuplicateFunction(String),

    #[error("type `{0}` is already defined")]
    DuplicateType(String),

    #[error("undefined function `{0}`")]
    UndefinedFunction(String),

    #[error("function `{name}` expects {expected} argument(s), found {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("function `{name}` expects at least {expected} argument(s), found {found}")]
    TooFewVarargs {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of `{name}` expects `{expected}`, found `{found}`")]
    ArgumentMismatch {
        name: String,
        index: usize,
        expected: Type,
        found: Type,
    },

    #[error("operator `{op}` requires numeric operands, found `{lhs}` and `{rhs}`")]
    NonNumericOperands { op: &'static str, lhs: Type, rhs: Type },

    #[error("operator `{op}` requires integer operands, found `{lhs}` and `{rhs}`")]
    NonIntegerOperands { op: &'static str, lhs: Type, rhs: Type },

    #[error("operator `{op}` requires `bool` operands, found `{lhs}` and `{rhs}`")]
    NonBoolOperands { op: &'static str, lhs: Type, rhs: Type },

    #[error("cannot compare `{0}` with `{1}`")]
    CannotCompare(Type, Type),

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo by zero")]
    ModuloByZero,

    #[error("error values can only be compared with `==`, found `{0}`")]
    InvalidErrorOperator(&'static str),

    #[error("undefined error `{0}`")]
    UndefinedError(String),

    #[error("error `{name}` has the same code {code} as `{other}`")]
    ErrorCodeCollision {
        name: String,
        other: String,
        code: u32,
    },

    #[error("operator `{op}` cannot be applied to `{ty}`")]
    InvalidUnary { op: &'static str, ty: Type },

    #[error("tuple index {index} is out of range for a tuple of {arity} element(s)")]
    TupleIndexOutOfRange { index: String, arity: usize },

    #[error("struct `{0}` has no field `{1}`")]
    UnknownField(String, String),

    #[error("enum `{0}` has no variant `{1}`")]
    UnknownVariant(String, String),

    #[error("cannot access field `{0}` on non-struct type `{1}`")]
    MemberOnNonStruct(String, Type),

    #[error("array index must be an integer, found `{0}`")]
    IndexNotInteger(Type),

    #[error("cannot index into non-array type `{0}`")]
    IndexNonArray(Type),

    #[error("array index {index} is out of bounds for an array of size {size}")]
    IndexOutOfBounds { index: i64, size: u64 },

    #[error("missing field `{1}` in initializer of `{0}`")]
    MissingField(String, String),

    #[error("mismatched types: expected `{expected}`, found `{found}`")]
    MismatchedTypes { expected: Type, found: Type },

    #[error("cannot assign to const `{0}`")]
    AssignToConst(String),

    #[error("cannot assign to immutable parameter `{0}`")]
    AssignToImmutable(String),

    #[error("invalid assignment target")]
    InvalidAssignTarget,

    #[error("const `{0}` must be initialized")]
    ConstWithoutValue(String),

    #[error("cannot infer the type of `{0}` without an initializer")]
    CannotInferType(String),

    #[error("condition must be `bool`, found `{0}`")]
    ConditionNotBool(Type),

    #[error("cannot return a value from void function `{0}`")]
    ReturnValueInVoid(String),

    #[error("function `{0}` must return a value")]
    MissingReturnValue(String),

    #[error("`try` can only be used inside a fallible function")]
    TryOutsideFallible,

    #[error("`try` requires a fallible value, found `{0}`")]
    TryOnInfallible(Type),

    #[error("`catch` requires a fallible value, found `{0}`")]
    CatchOnInfallible(Type),

    #[error("match arms have different types: expected `{expected}`, found `{found}`")]
    MatchArmMismatch { expected: Type, found: Type },

    #[error(transparent)]
    Resolve(#[from] registry::ResolveError),
}

impl SemanticError {
    pub fn at(self, span: crate::compile::ast::SourcePos) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.to_string(), span);
        match self.help() {
            Some(help) => diagnostic.with_help(help),
            None => diagnostic,
        }
    }

    fn help(&self) -> Option<&'static str> {
        match self {
            SemanticError::InvalidErrorOperator(_) => {
                Some("negate the equality instead: `!(value == error.Name)`")
            }
            _ => None,
        }
    }
}

/// Runs the type checker and the control flow checks over the whole program. Both always
/// run to completion, so every independent error of a file is reported at once.
pub fn analyze(program: &Program, source: &SourceFile) -> Result<(), Diagnostics> {
    let mut diagnostics = typecheck::TypeChecker::new(source).check_program(program);
    debug!("type checking found {} problem(s)", diagnostics.len());

    for err in controlflow::analyze(program) {
        let span = err.span();
        diagnostics.push(Diagnostic::error(err.to_string(), span));
    }

    diagnostics.into_result()
}
