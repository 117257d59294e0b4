//! The compile entry point.
//!
//! A compilation reads every source into a syntax tree, analyzes the trees together,
//! then lowers every action body into IR:
//!
//! ```
//! # use vela_lang::compiler::{compile, CompileOptions, Source};
//! let src = Source::new("hello.vela", "`p(\"Hello, World!\")");
//! let out = compile(&[src], &CompileOptions::default()).unwrap();
//! assert!(out.ir.contains_key(&out.entry));
//! ```
//!
//! Everything that lives for exactly one compilation (the label and temporary counter,
//! the token id counter, and the type oracle) is held by a [`Context`].

use std::fmt::Display;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::err::{full_vela_cast_impl, ErrKind, FullVelaErr, VelaErr};
use crate::ir::gen::lower;
use crate::ir::Instr;
use crate::lexer::token::{Token, TokenId};
use crate::lexer::{LexErr, Lexer};
use crate::parser::{ParseErr, Parser};
use crate::semantic::oracle::{Library, TypeOracle};
use crate::semantic::symbols::{ActnId, Builtins, SymbolTable};
use crate::semantic::{analyze, Resolution, SemErr};

/// State shared by every phase of one compilation.
pub struct Context<'o> {
    oracle: &'o dyn TypeOracle,
    counter: usize,
    next_token: usize,
}

impl<'o> Context<'o> {
    /// Creates a context over a type oracle.
    pub fn new(oracle: &'o dyn TypeOracle) -> Self {
        Self { oracle, counter: 0, next_token: 0 }
    }

    /// The oracle that knows external types.
    pub fn oracle(&self) -> &'o dyn TypeOracle {
        self.oracle
    }

    /// Takes the next number for labels and temporaries.
    ///
    /// Numbers are never reused within a compilation.
    pub fn next_id(&mut self) -> usize {
        let n = self.counter;
        self.counter += 1;
        n
    }
}

/// One compilation unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    /// Logical path, used in diagnostics
    pub path: String,
    /// Source text
    pub text: String,
}

impl Source {
    /// Creates a source from its path and text.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self { path: path.into(), text: text.into() }
    }

    /// Reads a source file.
    pub fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        Ok(Self::new(path.display().to_string(), std::fs::read_to_string(path)?))
    }
}

/// An invalid compile option.
#[derive(Debug, PartialEq, Eq)]
pub enum OptionErr {
    /// Not a known option and not an `xxx` flag
    Unknown(String),
    /// An option that can be given only once was given again
    Repeated(String),
    /// A referenced library was not found directly or under any include directory
    MissingReference(String),
    /// A referenced library could not be read
    BadReference(String),
}

impl VelaErr for OptionErr {
    fn kind(&self) -> ErrKind {
        ErrKind::Option
    }
}
impl Display for OptionErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionErr::Unknown(k)          => write!(f, "unknown option '{k}'"),
            OptionErr::Repeated(k)         => write!(f, "option '{k}' given more than once"),
            OptionErr::MissingReference(r) => write!(f, "cannot find reference '{r}'"),
            OptionErr::BadReference(e)     => write!(f, "cannot load reference {e}"),
        }
    }
}
impl std::error::Error for OptionErr {}

/// Options of a compilation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Where the surrounding tooling should write its output
    pub out: Option<PathBuf>,
    /// Library metadata files to load
    pub references: Vec<PathBuf>,
    /// Directories searched for relative references
    pub includes: Vec<PathBuf>,
    /// `xxx` flags, passed through uninterpreted
    pub flags: IndexMap<String, String>,
}

impl CompileOptions {
    /// Reads options from `(key, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self, OptionErr>
        where K: AsRef<str>, V: Into<String>
    {
        let mut opts = Self::default();
        for (k, v) in pairs {
            opts.set(k.as_ref(), v)?;
        }
        Ok(opts)
    }

    /// Sets one option.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), OptionErr> {
        let value = value.into();
        match key {
            "out" => {
                if self.out.is_some() {
                    return Err(OptionErr::Repeated(key.to_string()));
                }
                self.out = Some(PathBuf::from(value));
            },
            "reference" => self.references.push(PathBuf::from(value)),
            "include" => self.includes.push(PathBuf::from(value)),
            _ if key.starts_with("xxx") => {
                self.flags.insert(key.to_string(), value);
            },
            _ => return Err(OptionErr::Unknown(key.to_string())),
        }
        Ok(())
    }

    /// Whether a pass-through flag was given.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    /// Finds a reference, directly or under an include directory.
    fn locate(&self, reference: &Path) -> Option<PathBuf> {
        if reference.is_file() {
            return Some(reference.to_path_buf());
        }
        if reference.is_absolute() {
            return None;
        }
        self.includes.iter()
            .map(|dir| dir.join(reference))
            .find(|p| p.is_file())
    }

    /// Builds the library of this compilation: the base library and every reference.
    pub fn library(&self) -> Result<Library, OptionErr> {
        let mut lib = Library::with_corlib();

        for r in &self.references {
            let path = self.locate(r)
                .ok_or_else(|| OptionErr::MissingReference(r.display().to_string()))?;
            lib.load_file(&path).map_err(|e| OptionErr::BadReference(e.to_string()))?;
            log::debug!("loaded reference {}", path.display());
        }
        Ok(lib)
    }
}

/// An error from any phase of compilation.
#[derive(Debug, PartialEq, Eq)]
pub enum CompileErr {
    /// Tokenizing failed
    Lex(LexErr),
    /// Parsing failed
    Parse(ParseErr),
    /// Semantic analysis failed
    Sem(SemErr),
    /// The options are invalid
    Option(OptionErr),
}

impl VelaErr for CompileErr {
    fn kind(&self) -> ErrKind {
        match self {
            CompileErr::Lex(e) => e.kind(),
            CompileErr::Parse(e) => e.kind(),
            CompileErr::Sem(e) => e.kind(),
            CompileErr::Option(e) => e.kind(),
        }
    }
}
impl Display for CompileErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileErr::Lex(e) => write!(f, "{e}"),
            CompileErr::Parse(e) => write!(f, "{e}"),
            CompileErr::Sem(e) => write!(f, "{e}"),
            CompileErr::Option(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for CompileErr {}

impl From<LexErr> for CompileErr {
    fn from(err: LexErr) -> Self {
        CompileErr::Lex(err)
    }
}
impl From<ParseErr> for CompileErr {
    fn from(err: ParseErr) -> Self {
        match err {
            ParseErr::Lex(e) => CompileErr::Lex(e),
            e => CompileErr::Parse(e),
        }
    }
}
impl From<SemErr> for CompileErr {
    fn from(err: SemErr) -> Self {
        CompileErr::Sem(err)
    }
}
impl From<OptionErr> for CompileErr {
    fn from(err: OptionErr) -> Self {
        CompileErr::Option(err)
    }
}
full_vela_cast_impl!(LexErr, CompileErr);
full_vela_cast_impl!(ParseErr, CompileErr);
full_vela_cast_impl!(SemErr, CompileErr);
full_vela_cast_impl!(OptionErr, CompileErr);

/// A [`Result`] type for compilation.
pub type CompileResult<T> = Result<T, FullCompileErr>;
/// A [`CompileErr`] with its location.
pub type FullCompileErr = FullVelaErr<CompileErr>;

/// The result of a successful compilation.
#[derive(Debug)]
pub struct Compilation {
    /// Every symbol of the compilation
    pub symbols: SymbolTable,
    /// Types every compilation needs
    pub builtins: Builtins,
    /// What each token resolved to
    pub resolutions: std::collections::HashMap<TokenId, Resolution>,
    /// IR of every user action, in declaration order
    pub ir: IndexMap<ActnId, Vec<Instr>>,
    /// The entry point
    pub entry: ActnId,
    /// Output path requested by the options
    pub out: Option<PathBuf>,
    /// `xxx` flags from the options
    pub flags: IndexMap<String, String>,
}

/// Compiles sources against the base library and the options' references.
pub fn compile(sources: &[Source], options: &CompileOptions) -> CompileResult<Compilation> {
    let lib = options.library()
        .map_err(|e| CompileErr::from(e).at_unknown())?;
    compile_with_oracle(sources, options, &lib)
}

/// Compiles sources against a given type oracle.
///
/// The options' references are not loaded.
pub fn compile_with_oracle(sources: &[Source], options: &CompileOptions, oracle: &dyn TypeOracle) -> CompileResult<Compilation> {
    let mut ctx = Context::new(oracle);
    let roots = parse_all(&mut ctx, sources)?;

    let analysis = analyze(&mut ctx, &roots)?;
    let entry = analysis.table.entry
        .ok_or_else(|| SemErr::Internal(String::from("no entry point after analysis")).at_unknown())?;

    let ir = lower(&analysis.table);
    log::debug!("compiled {} sources into {} bodies", sources.len(), ir.len());

    Ok(Compilation {
        symbols: analysis.table,
        builtins: analysis.builtins,
        resolutions: analysis.resolutions,
        ir,
        entry,
        out: options.out.clone(),
        flags: options.flags.clone(),
    })
}

/// Parses every source, keeping token ids unique across them.
pub fn parse_all(ctx: &mut Context, sources: &[Source]) -> Result<Vec<Token>, FullCompileErr> {
    let mut roots = Vec::with_capacity(sources.len());

    for src in sources {
        let lexer = Lexer::starting_at(Cursor::new(src.text.as_str()), &src.path, ctx.next_token)?;
        let mut parser = Parser::new(lexer);
        roots.push(parser.parse()?);
        ctx.next_token = parser.into_lexer().next_id();
        log::debug!("parsed {}", src.path);
    }
    Ok(roots)
}
