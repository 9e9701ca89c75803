use std::path::PathBuf;

use clap::Parser;

use tora::compile::Compiler;
use tora::infra::{ExitCode, diagnostic, init_logging};

#[derive(Parser, Debug)]
#[command(version, about = "Compiles tora programs to C")]
struct Args {
    /// Source file to compile
    src: PathBuf,

    /// Where to write the C output, defaults to the source path with a `.c` extension
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Stop after semantic analysis
    #[arg(long)]
    check: bool,

    /// Print the instruction list before lowering to C
    #[arg(long)]
    emit_ir: bool,

    /// C compiler used together with `--bin`
    #[arg(long, default_value = "cc")]
    cc: String,

    /// Also build an executable at this path
    #[arg(long)]
    bin: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut compiler = Compiler::new();
    compiler
        .src(args.src)
        .check_only(args.check)
        .emit_ir(args.emit_ir);

    if let Some(out) = args.out {
        compiler.out(out);
    }
    if let Some(bin) = args.bin {
        compiler.binary(bin, args.cc);
    }

    let Some(err) = compiler.compile().err() else {
        return ExitCode::SUCCESS;
    };

    match (err.diagnostics(), compiler.source()) {
        (Some(diagnostics), Some(source)) => diagnostic::emit(source, &diagnostics),
        _ => eprintln!("{err}"),
    }

    err.into()
}
