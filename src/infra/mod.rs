use std::process::Termination;

use chumsky::error::Rich;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::compile::{ast::SourcePos, codegen::LoweringError, parser::lex::Token};

pub mod diagnostic;

pub use diagnostic::{Diagnostic, Diagnostics};

pub struct ExitCode(u8);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAIL_LOWERING: ExitCode = ExitCode(3);
    pub const FAIL_SEMANTIC: ExitCode = ExitCode(7);
    pub const FAIL_PARSING: ExitCode = ExitCode(42);
    pub const FAIL_IO: ExitCode = ExitCode(255);

    pub fn code(&self) -> u8 {
        self.0
    }
}

impl Termination for ExitCode {
    fn report(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self.0)
    }
}

impl From<&ToraError> for ExitCode {
    fn from(value: &ToraError) -> Self {
        match value {
            ToraError::LexerError(_) | ToraError::ParsingError(_) => ExitCode::FAIL_PARSING,
            ToraError::SemanticError(_) => ExitCode::FAIL_SEMANTIC,
            ToraError::LoweringError(_) => ExitCode::FAIL_LOWERING,
            ToraError::CCompilerFailed(_) | ToraError::IOError(_) => ExitCode::FAIL_IO,
        }
    }
}

impl From<ToraError> for ExitCode {
    fn from(value: ToraError) -> Self {
        ExitCode::from(&value)
    }
}

#[derive(Error, Debug)]
pub enum ToraError {
    #[error("Lexical Analysis failed.")]
    LexerError(Vec<Rich<'static, char>>),

    #[error("Syntactic Analysis failed.")]
    ParsingError(Vec<Rich<'static, Token<'static>, SourcePos>>),

    #[error("Semantical Analysis failed with {} error(s).", .0.len())]
    SemanticError(Diagnostics),

    #[error("Lowering to C failed: {0}")]
    LoweringError(#[from] LoweringError),

    #[error("The C compiler exited with {0}")]
    CCompilerFailed(std::process::ExitStatus),

    #[error("There was an I/O error: {0}")]
    IOError(#[from] std::io::Error),
}

impl ToraError {
    /// Lexer, parser and checker failures carry source positions and can be rendered as
    /// diagnostics.
    pub fn diagnostics(&self) -> Option<Diagnostics> {
        let mut diagnostics = Diagnostics::new();
        match self {
            ToraError::LexerError(errs) => {
                errs.iter()
                    .cloned()
                    .for_each(|err| diagnostics.push(err.into()));
            }
            ToraError::ParsingError(errs) => {
                errs.iter()
                    .cloned()
                    .for_each(|err| diagnostics.push(err.into()));
            }
            ToraError::SemanticError(diags) => return Some(diags.clone()),
            _ => return None,
        }

        Some(diagnostics)
    }
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over the verbosity flag.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}
