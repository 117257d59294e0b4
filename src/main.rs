use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use vela_lang::compiler::{compile, CompileOptions, Source};
use vela_lang::display::{IrListing, TreeDisplay};
use vela_lang::err::{FullVelaErr, VelaErr};
use vela_lang::{lexer, parser};

/// The Vela compiler.
#[derive(Parser)]
#[command(name = "vela", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log every step of compilation
    #[arg(long = "xxx-trace", global = true)]
    trace: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tokens of a source file
    Tokens {
        file: PathBuf,
    },
    /// Print the syntax tree of a source file
    Tree {
        file: PathBuf,
    },
    /// Compile source files
    Compile(CompileArgs),
}

#[derive(Args)]
struct CompileArgs {
    /// Source files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output path
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Library metadata to reference
    #[arg(short, long = "reference")]
    reference: Vec<PathBuf>,

    /// Directory to search for references
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,

    /// Flags passed through to the output (`-x dump-ir` is `--xxx-dump-ir`)
    #[arg(short = 'x', value_name = "FLAG")]
    flags: Vec<String>,

    /// Print the IR of every action
    #[arg(long = "xxx-dump-ir")]
    dump_ir: bool,
}

impl CompileArgs {
    fn pairs(&self) -> Vec<(String, String)> {
        let path = |p: &PathBuf| p.display().to_string();

        let mut pairs = vec![];
        pairs.extend(self.out.iter().map(|o| ("out".to_string(), path(o))));
        pairs.extend(self.reference.iter().map(|r| ("reference".to_string(), path(r))));
        pairs.extend(self.include.iter().map(|i| ("include".to_string(), path(i))));
        pairs.extend(self.flags.iter().map(|f| (format!("xxx-{f}"), String::new())));
        if self.dump_ir {
            pairs.push(("xxx-dump-ir".to_string(), String::new()));
        }
        pairs
    }
}

fn read(file: &PathBuf) -> Result<Source, ExitCode> {
    Source::read(file).map_err(|e| {
        eprintln!("cannot read {}: {e}", file.display());
        ExitCode::FAILURE
    })
}

fn report<E: VelaErr>(err: FullVelaErr<E>, sources: &[Source]) -> ExitCode {
    let text = err.loc()
        .and_then(|loc| sources.iter().find(|s| *s.path == *loc.path))
        .map_or("", |s| s.text.as_str());

    eprintln!("{}", err.full_msg(text));
    ExitCode::FAILURE
}

fn run(cmd: Command) -> Result<(), ExitCode> {
    match cmd {
        Command::Tokens { file } => {
            let src = read(&file)?;
            let tokens = lexer::tokenize(&src.text, &src.path)
                .map_err(|e| report(e, std::slice::from_ref(&src)))?;

            for t in tokens {
                println!("{}:{}\t{}\t{}", t.loc.row, t.loc.col, t.group, t.value);
            }
        },
        Command::Tree { file } => {
            let src = read(&file)?;
            let root = parser::parse(&src.text, &src.path)
                .map_err(|e| report(e, std::slice::from_ref(&src)))?;

            for stmt in &root.follows {
                println!("{}", TreeDisplay(stmt));
            }
        },
        Command::Compile(args) => {
            let sources = args.files.iter()
                .map(read)
                .collect::<Result<Vec<_>, _>>()?;
            let options = CompileOptions::from_pairs(args.pairs())
                .map_err(|e| report(e.at_unknown(), &sources))?;

            let out = compile(&sources, &options)
                .map_err(|e| report(e, &sources))?;

            if out.flags.contains_key("xxx-dump-ir") {
                print!("{}", IrListing { table: &out.symbols, ir: &out.ir });
            }
            log::info!("compiled {} actions", out.ir.len());
        },
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.trace { LevelFilter::Trace } else { LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
