use thiserror::Error;

use crate::compile::ast::{Block, Decl, FunctionDecl, Program, SourcePos, Stmt, TypeExpr};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlFlowError {
    #[error("function `{0}` does not return a value on every path")]
    MissingReturn(String, SourcePos),

    #[error("`continue` can only appear in loops")]
    InvalidContinue(SourcePos),

    #[error("`break` can only appear in loops")]
    InvalidBreak(SourcePos),

    #[error("`return` is not allowed inside `defer` or `errdefer`")]
    ReturnInDefer(SourcePos),
}

impl ControlFlowError {
    pub fn span(&self) -> SourcePos {
        match self {
            ControlFlowError::MissingReturn(_, span)
            | ControlFlowError::InvalidContinue(span)
            | ControlFlowError::InvalidBreak(span)
            | ControlFlowError::ReturnInDefer(span) => span.clone(),
        }
    }
}

pub fn analyze(program: &Program) -> Vec<ControlFlowError> {
    let mut errors = Vec::new();

    for decl in program.decls.iter() {
        if let Decl::Function(function) = decl {
            analyze_function(function, &mut errors);
        }
    }

    errors
}

fn analyze_function(function: &FunctionDecl, errors: &mut Vec<ControlFlowError>) {
    let root_analyzer = BlockAnalyzer::new(false, false);
    root_analyzer.analyze_block(&function.body, errors);

    if needs_return(&function.ret) && !root_analyzer.block_returns(&function.body) {
        errors.push(ControlFlowError::MissingReturn(
            function.name.clone(),
            function.span.clone(),
        ));
    }
}

/// `void` and `!void` functions may fall off their end.
fn needs_return(ret: &TypeExpr) -> bool {
    match ret {
        TypeExpr::Named(name, _) => name != "void",
        TypeExpr::ErrorUnion(inner, _) => needs_return(inner),
        _ => true,
    }
}

struct BlockAnalyzer {
    inside_loop: bool,
    inside_defer: bool,
}

impl BlockAnalyzer {
    pub fn new(inside_loop: bool, inside_defer: bool) -> Self {
        Self {
            inside_loop,
            inside_defer,
        }
    }

    fn analyze_block(&self, block: &Block, errors: &mut Vec<ControlFlowError>) {
        for stmt in block.stmts.iter() {
            self.analyze(stmt, errors);
        }
    }

    pub fn analyze(&self, stmt: &Stmt, errors: &mut Vec<ControlFlowError>) {
        if let Some(err) = self.misplaced(stmt) {
            errors.push(err);
        }

        match stmt {
            Stmt::Block(block) => self.analyze_block(block, errors),
            Stmt::For(for_loop) => {
                BlockAnalyzer::new(true, self.inside_defer).analyze_block(&for_loop.body, errors)
            }
            Stmt::While(_, body, _) => {
                BlockAnalyzer::new(true, self.inside_defer).analyze_block(body, errors)
            }
            Stmt::If(_, then, otherwise, _) => {
                self.analyze_block(then, errors);

                if let Some(otherwise) = otherwise {
                    self.analyze_block(otherwise, errors);
                }
            }
            // deferred code runs at function exit, outside any loop it was declared in
            Stmt::Defer(body, _) | Stmt::ErrDefer(body, _) => {
                BlockAnalyzer::new(false, true).analyze_block(body, errors)
            }
            _ => {}
        };
    }

    fn misplaced(&self, stmt: &Stmt) -> Option<ControlFlowError> {
        match stmt {
            Stmt::Continue(span) if !self.inside_loop => {
                Some(ControlFlowError::InvalidContinue(span.clone()))
            }
            Stmt::Break(span) if !self.inside_loop => {
                Some(ControlFlowError::InvalidBreak(span.clone()))
            }
            Stmt::Return(_, span) if self.inside_defer => {
                Some(ControlFlowError::ReturnInDefer(span.clone()))
            }
            _ => None,
        }
    }

    fn block_returns(&self, block: &Block) -> bool {
        block.stmts.iter().any(|stmt| self.does_return(stmt))
    }

    fn does_return(&self, stmt: &Stmt) -> bool {
        match stmt {
            Stmt::If(_, then, otherwise, _) => {
                if let Some(otherwise) = otherwise {
                    return self.block_returns(then) && self.block_returns(otherwise);
                }

                false
            }
            Stmt::Return(_, _) => true,
            Stmt::Block(block) => self.block_returns(block),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlFlowError, analyze};
    use crate::compile::parser::parse_program;

    fn errors(src: &str) -> Vec<ControlFlowError> {
        analyze(&parse_program(src).expect("parse failed"))
    }

    #[test]
    fn if_without_else_does_not_return() {
        let errs = errors("fn f(c: bool) i32 { if c { return 1; } }");
        assert!(matches!(errs.as_slice(), [ControlFlowError::MissingReturn(name, _)] if name == "f"));

        assert!(errors("fn f(c: bool) i32 { if c { return 1; } else { return 2; } }").is_empty());
    }

    #[test]
    fn void_functions_may_fall_through() {
        assert!(errors("fn f() void { }\nfn g() !void { }").is_empty());
    }

    #[test]
    fn break_outside_loop_and_inside_defer() {
        let errs = errors("fn f() void { while true { defer { break; } break; } continue; }");
        assert!(matches!(
            errs.as_slice(),
            [ControlFlowError::InvalidBreak(_), ControlFlowError::InvalidContinue(_)]
        ));
    }

    #[test]
    fn return_inside_defer_is_rejected() {
        let errs = errors("fn f() i32 { defer { return 1; } return 0; }");
        assert!(matches!(errs.as_slice(), [ControlFlowError::ReturnInDefer(_)]));
    }
}
