use std::{fs, path::PathBuf};

use tracing::{debug, info};

use crate::{
    compile::{ast::Program, ir::generate::IrGenerator, ir::Inst, source::SourceFile},
    infra::ToraError,
};

pub mod ast;
pub mod codegen;
pub mod ir;
pub mod parser;
pub mod semantic;
pub mod source;

// Custom macro for compiler pipeline errors
macro_rules! pipeline_error {
    ($msg:expr) => {
        return Err(ToraError::IOError(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            $msg,
        )))
    };
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    src_path: Option<PathBuf>,
    out_path: Option<PathBuf>,
    bin_path: Option<PathBuf>,
    cc: Option<String>,
    check_only: bool,
    emit_ir: bool,
    source: Option<SourceFile>,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler::default()
    }

    pub fn src(&mut self, src: PathBuf) -> &mut Self {
        self.src_path = Some(src);

        self
    }

    pub fn out(&mut self, out: PathBuf) -> &mut Self {
        self.out_path = Some(out);

        self
    }

    /// Also build an executable at `bin` with the C compiler `cc`.
    pub fn binary(&mut self, bin: PathBuf, cc: impl Into<String>) -> &mut Self {
        self.bin_path = Some(bin);
        self.cc = Some(cc.into());

        self
    }

    pub fn check_only(&mut self, check_only: bool) -> &mut Self {
        self.check_only = check_only;

        self
    }

    pub fn emit_ir(&mut self, emit_ir: bool) -> &mut Self {
        self.emit_ir = emit_ir;

        self
    }

    /// The source file of the last run, for rendering its diagnostics.
    pub fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    pub fn compile(&mut self) -> Result<&mut Self, ToraError> {
        let program = self.parse()?;
        self.check(&program)?;

        if self.check_only {
            info!("semantic analysis passed");
            return Ok(self);
        }

        let ir = IrGenerator::new().generate(&program)?;
        if self.emit_ir {
            for inst in ir.iter() {
                println!("{inst:#?}");
            }
        }

        let c = codegen::generate(ir)?;
        self.write(&c)?;

        Ok(self)
    }

    fn parse(&mut self) -> Result<Program, ToraError> {
        let Some(ref src_path) = self.src_path else {
            pipeline_error!("No src path provided")
        };

        let text = fs::read_to_string(src_path)?;
        let source = SourceFile::new(src_path.display().to_string(), text);
        info!("parsing {}", source.name());

        let program = parser::parse_program(source.text());
        self.source = Some(source);

        program
    }

    fn check(&self, program: &Program) -> Result<(), ToraError> {
        let Some(ref source) = self.source else {
            pipeline_error!("No source loaded")
        };

        info!("checking {} declaration(s)", program.decls.len());
        semantic::analyze(program, source).map_err(ToraError::SemanticError)
    }

    fn write(&self, c: &str) -> Result<(), ToraError> {
        let out_path = match (&self.out_path, &self.src_path) {
            (Some(out_path), _) => out_path.clone(),
            (None, Some(src_path)) => src_path.with_extension("c"),
            (None, None) => pipeline_error!("No output path provided."),
        };

        debug!("writing {}", out_path.display());
        fs::write(&out_path, c)?;

        if let (Some(bin_path), Some(cc)) = (&self.bin_path, &self.cc) {
            codegen::cc::compile(c, cc, bin_path)?;
        }

        Ok(())
    }
}

/// Runs the whole pipeline on in-memory source text and returns the C translation unit.
pub fn compile_to_c(name: &str, text: &str) -> Result<String, ToraError> {
    let source = SourceFile::new(name, text);
    let program = parser::parse_program(source.text())?;
    semantic::analyze(&program, &source).map_err(ToraError::SemanticError)?;

    let ir = lower(&program)?;
    Ok(codegen::generate(ir)?)
}

/// Instructions for an already checked program.
pub fn lower(program: &Program) -> Result<Vec<Inst>, ToraError> {
    Ok(IrGenerator::new().generate(program)?)
}
