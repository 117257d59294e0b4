//! Resolves syntax trees into a symbol table and typed execution nodes.
//!
//! Analysis runs a fixed sequence of passes, each over every node of one kind
//! before the next pass starts:
//! 1. construct scopes, gather `using`s, classes, functions, and top-level lines,
//! 2. declare every class,
//! 3. resolve base classes,
//! 4. declare every field and function signature,
//! 5. add missing default constructors,
//! 6. add implicit base constructor calls,
//! 7. analyze every body (top-level lines first, inside the static initializer),
//! 8. check the entry point and return determinacy, then collect external references.
//!
//! The syntax tree is never modified. What each identifier resolved to is recorded
//! in a side table keyed by [`TokenId`] (see [`Analysis::resolutions`]).

use std::collections::HashMap;
use std::fmt::Display;

use crate::compiler::Context;
use crate::err::{ErrKind, FullVelaErr, VelaErr};
use crate::lexer::token::{Group, Token, TokenId};
use crate::span::Loc;

use self::exec::{returns, Call, Exec};
use self::oracle::Visibility;
use self::symbols::{
    ActnData, ActnId, ActnKind, Builtins, ScopeId, ScopeKind, SourceData, SymbolTable, TypeData, TypeId, TypeKind,
    VarData, VarId, VarKind,
};

pub mod exec;
mod lines;
mod lookup;
pub mod ops;
pub mod oracle;
mod overload;
pub mod symbols;
pub mod types;

/// An error that occurs during semantic analysis.
#[derive(Debug, PartialEq, Eq)]
pub enum SemErr {
    /// A name that is not defined anywhere
    Undefined(String),
    /// A name that is not a member of the type or namespace
    NotAMember(String /* member */, String /* of */),
    /// The callee is neither a function nor a type
    NotCallable(String),
    /// The expression does not name a type
    NotAType(String),
    /// The value cannot be the target of an assignment
    NotAssignable(String),
    /// The expression does not produce a value (e.g. a call to an action)
    NotAValue(String),
    /// No overload accepts the arguments
    NoCandidate(String),
    /// More than one overload accepts the arguments
    Ambiguous(String),
    /// The operator cannot be applied to these operands
    BadOperands(String /* op */, String, String),
    /// The prefix operator cannot be applied to this operand
    BadOperand(String /* op */, String),
    /// A construct that cannot appear here
    Misplaced(String),
    /// Instance member used without an instance
    NeedsInstance(String),
    /// Static member used through an instance
    StaticViaInstance(String),
    /// `break` or `continue` outside of a loop
    NoLoop(String),
    /// `return` in a function with no value after it
    MissingReturnValue,
    /// A function has a path that doesn't return
    NoReturnValue(String),
    /// More than one entry point
    MultipleEntryPoints,
    /// Malformed function header
    BadHeader(String),
    /// Malformed literal (e.g. integer too large)
    BadLiteral(String),
    /// Indexing with the wrong number of indices, or indexing a non-array
    BadIndex(String),
    /// Generic type instantiated with the wrong number of arguments
    GenericArity(String, usize /* expected */, usize /* found */),
    /// `using` of a namespace no library declares
    UnknownNamespace(String),

    /// A variable declared twice in the same scope
    Redeclared(String),
    /// A type declared twice
    DuplicateType(String),
    /// Two functions with the same signature in one type
    DuplicateSignature(String),
    /// A class (indirectly) extends itself
    CyclicBase(String),
    /// The base type cannot be extended
    BadBase(String),

    /// A value of one type where another is required
    Mismatch {
        /// Required type
        expected: String,
        /// Actual type
        found: String
    },

    /// The selected member cannot be accessed from here
    Inaccessible(String),

    /// Broken invariant (bad library metadata or analyzer bug)
    Internal(String),
}

impl VelaErr for SemErr {
    fn kind(&self) -> ErrKind {
        match self {
            SemErr::Redeclared(_)
            | SemErr::DuplicateType(_)
            | SemErr::DuplicateSignature(_)
            | SemErr::CyclicBase(_)
            | SemErr::BadBase(_) => ErrKind::Semantic,
            SemErr::Mismatch { .. } => ErrKind::Type,
            SemErr::Inaccessible(_) => ErrKind::Access,
            SemErr::Internal(_) => ErrKind::Internal,
            _ => ErrKind::Syntax,
        }
    }
}

impl Display for SemErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemErr::Undefined(n)             => write!(f, "'{n}' is not defined"),
            SemErr::NotAMember(n, of)        => write!(f, "'{n}' is not a member of '{of}'"),
            SemErr::NotCallable(n)           => write!(f, "'{n}' is not a function or constructor"),
            SemErr::NotAType(n)              => write!(f, "'{n}' is not a type"),
            SemErr::NotAssignable(n)         => write!(f, "cannot assign to '{n}'"),
            SemErr::NotAValue(n)             => write!(f, "'{n}' does not produce a value"),
            SemErr::NoCandidate(sig)         => write!(f, "no candidate method for '{sig}'"),
            SemErr::Ambiguous(sig)           => write!(f, "more than one candidate for '{sig}'"),
            SemErr::BadOperands(op, l, r)    => write!(f, "operator '{op}' cannot be applied to '{l}' and '{r}'"),
            SemErr::BadOperand(op, t)        => write!(f, "operator '{op}' cannot be applied to '{t}'"),
            SemErr::Misplaced(n)             => write!(f, "'{n}' is not allowed here"),
            SemErr::NeedsInstance(n)         => write!(f, "instance member '{n}' needs an instance"),
            SemErr::StaticViaInstance(n)     => write!(f, "static member '{n}' cannot be used through an instance"),
            SemErr::NoLoop(n)                => write!(f, "'{n}' outside of a loop"),
            SemErr::MissingReturnValue       => write!(f, "'return' needs a value"),
            SemErr::NoReturnValue(n)         => write!(f, "function '{n}' doesn't return value"),
            SemErr::MultipleEntryPoints      => write!(f, "more than one entry point 'main'"),
            SemErr::BadHeader(n)             => write!(f, "malformed function header '{n}'"),
            SemErr::BadLiteral(n)            => write!(f, "invalid literal {n}"),
            SemErr::BadIndex(n)              => write!(f, "cannot index '{n}' like this"),
            SemErr::GenericArity(n, e, g)    => write!(f, "'{n}' takes {e} type arguments, got {g}"),
            SemErr::UnknownNamespace(n)      => write!(f, "unknown namespace '{n}'"),
            SemErr::Redeclared(n)            => write!(f, "'{n}' is already declared in this scope"),
            SemErr::DuplicateType(n)         => write!(f, "type '{n}' is already declared"),
            SemErr::DuplicateSignature(n)    => write!(f, "'{n}' is already declared"),
            SemErr::CyclicBase(n)            => write!(f, "class '{n}' inherits from itself"),
            SemErr::BadBase(n)               => write!(f, "cannot extend '{n}'"),
            SemErr::Mismatch { expected, found } => write!(f, "expected '{expected}', found '{found}'"),
            SemErr::Inaccessible(n)          => write!(f, "'{n}' is not accessible here"),
            SemErr::Internal(m)              => write!(f, "{m}"),
        }
    }
}
impl std::error::Error for SemErr {}

/// A [`Result`] type for operations in semantic analysis.
pub type SemResult<T> = Result<T, FullSemErr>;
pub(crate) type FullSemErr = FullVelaErr<SemErr>;

/// What a token resolved to.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Resolution {
    /// A variable, field, or parameter
    Var(VarId),
    /// A type
    Type(TypeId),
    /// A selected callable (calls and property accesses)
    Actn(ActnId),
    /// A namespace prefix
    Namespace(String),
}

/// The result of semantic analysis.
#[derive(Debug)]
pub struct Analysis {
    /// Every symbol of the compilation
    pub table: SymbolTable,
    /// Types every compilation needs
    pub builtins: Builtins,
    /// What each identifier, member access, and call resolved to
    pub resolutions: HashMap<TokenId, Resolution>,
}

/// Where a line is analyzed from.
pub(crate) struct Body {
    /// The action being analyzed (`None` while reading signatures)
    actn: Option<ActnId>,
    /// The type whose members are accessible without qualification
    owner: TypeId,
    /// Whether there is no `this`
    is_static: bool,
    /// Innermost scope
    scope: ScopeId,
    /// The top-level block of a source (declarations there are static fields)
    globals: Option<ScopeId>,
    /// Label numbers of the enclosing loops
    loops: Vec<usize>,
}

struct ClassDecl<'t> {
    tok: &'t Token,
    source: usize,
    ty: TypeId,
}

#[derive(Clone, Copy)]
struct FunDecl<'t> {
    tok: &'t Token,
    actn: ActnId,
}

/// Analyzes a set of parsed sources.
pub fn analyze(ctx: &mut Context, roots: &[Token]) -> SemResult<Analysis> {
    let mut table = SymbolTable::new();
    let builtins = types::builtins(&mut table, ctx.oracle())
        .map_err(VelaErr::at_unknown)?;

    let mut an = Analyzer {
        ctx,
        table,
        b: builtins,
        resolutions: HashMap::new(),
        classes: vec![],
        funs: vec![],
        top_lines: vec![],
    };
    an.run(roots)?;

    Ok(Analysis { table: an.table, builtins: an.b, resolutions: an.resolutions })
}

pub(crate) struct Analyzer<'t, 'c, 'o> {
    ctx: &'c mut Context<'o>,
    table: SymbolTable,
    b: Builtins,
    resolutions: HashMap<TokenId, Resolution>,
    classes: Vec<ClassDecl<'t>>,
    funs: Vec<FunDecl<'t>>,
    top_lines: Vec<(ScopeId, &'t Token)>,
}

fn is_fun(t: &Token) -> bool {
    matches!(t.group, Group::Fun | Group::StaticFun | Group::VirtualFun | Group::PrivateFun | Group::FamilyFun)
}

fn at_opt(e: SemErr, loc: Option<Loc>) -> FullSemErr {
    match loc {
        Some(l) => e.at(l),
        None => e.at_unknown(),
    }
}

/// Splits the `end` token off a sentence's follows.
fn strip_end(follows: &[Token]) -> &[Token] {
    match follows.split_last() {
        Some((last, rest)) if last.is("end") => rest,
        _ => follows,
    }
}

/// Joins a dotted chain of identifiers (`System.Text`).
fn dotted_name(t: &Token) -> Option<String> {
    match t.group {
        Group::Id => Some(t.value.clone()),
        Group::Dot => {
            let left = dotted_name(t.first()?)?;
            let right = t.second().filter(|r| r.group == Group::Id)?;
            Some(format!("{left}.{}", right.value))
        },
        _ => None
    }
}

impl<'t, 'c, 'o> Analyzer<'t, 'c, 'o> {
    fn run(&mut self, roots: &'t [Token]) -> SemResult<()> {
        log::debug!("analyzing {} sources", roots.len());
        self.construct(roots)?;
        self.declare_types()?;
        self.resolve_bases()?;
        self.declare_members(roots)?;
        self.add_default_ctors();
        self.add_base_calls()?;
        self.analyze_bodies()?;
        self.finalize()
    }

    fn record(&mut self, tok: &Token, res: Resolution) {
        self.resolutions.insert(tok.id, res);
    }

    /// Pass 1.
    fn construct(&mut self, roots: &'t [Token]) -> SemResult<()> {
        for (idx, root) in roots.iter().enumerate() {
            let scope = self.table.add_scope(ScopeKind::Source(idx), Some(self.table.app));
            let mut usings = vec![];
            let mut globals = None;

            for stmt in &root.follows {
                match stmt.group {
                    Group::Using => {
                        let target = stmt.follows.first()
                            .ok_or_else(|| SemErr::Misplaced(stmt.value.clone()).at(stmt.loc.clone()))?;
                        let ns = dotted_name(target)
                            .ok_or_else(|| SemErr::UnknownNamespace(stmt.value.clone()).at(target.loc.clone()))?;
                        if !self.ctx.oracle().is_namespace(&ns) {
                            return Err(SemErr::UnknownNamespace(ns).at(target.loc.clone()));
                        }
                        usings.push(ns);
                    },
                    Group::Class => {
                        let ty = self.table.add_type(TypeData::new(
                            String::new(),
                            TypeKind::User { decl: stmt.id, loc: stmt.loc.clone() },
                            false
                        ));
                        self.classes.push(ClassDecl { tok: stmt, source: idx, ty });
                    },
                    _ if is_fun(stmt) => {},
                    _ => {
                        let block = *globals.get_or_insert_with(|| self.table.add_scope(ScopeKind::Block, Some(scope)));
                        self.top_lines.push((block, stmt));
                    }
                }
            }

            log::trace!("source {} uses {:?}", root.loc.path, usings);
            self.table.sources.push(SourceData { path: root.loc.path.to_string(), usings, scope });
        }
        Ok(())
    }

    /// Pass 2.
    fn declare_types(&mut self) -> SemResult<()> {
        for class in &self.classes {
            let name_tok = class.tok.follows.first()
                .filter(|t| t.group == Group::Id)
                .ok_or_else(|| SemErr::Misplaced(class.tok.value.clone()).at(class.tok.loc.clone()))?;
            let name = &name_tok.value;

            if self.table.app_types.contains_key(name) {
                return Err(SemErr::DuplicateType(name.clone()).at(name_tok.loc.clone()));
            }

            let src_scope = self.table.sources[class.source].scope;
            let scope = self.table.add_scope(ScopeKind::Type(class.ty), Some(src_scope));
            let data = self.table.ty_mut(class.ty);
            data.name = name.clone();
            data.scope = Some(scope);
            data.loaded = true;

            self.table.app_types.insert(name.clone(), class.ty);
            self.resolutions.insert(name_tok.id, Resolution::Type(class.ty));
        }

        log::debug!("declared {} classes", self.classes.len());
        Ok(())
    }

    /// Pass 3.
    fn resolve_bases(&mut self) -> SemResult<()> {
        for i in 0..self.classes.len() {
            let (tok, source, ty) = (self.classes[i].tok, self.classes[i].source, self.classes[i].ty);

            let base = match tok.follows.iter().find(|t| t.group == Group::Extends) {
                Some(ext) => {
                    let target = ext.follows.first()
                        .ok_or_else(|| SemErr::Misplaced(ext.value.clone()).at(ext.loc.clone()))?;
                    let mut cx = self.header_body(self.table.global, self.table.sources[source].scope);
                    let base = self.type_of(&mut cx, target)?;

                    let data = self.table.ty(base);
                    let extendable = !data.is_value
                        && matches!(data.kind, TypeKind::User { .. } | TypeKind::External { .. });
                    if !extendable {
                        return Err(SemErr::BadBase(data.name.clone()).at(target.loc.clone()));
                    }
                    base
                },
                None => self.b.object,
            };
            self.table.ty_mut(ty).base = Some(base);
        }

        for class in &self.classes {
            let mut current = self.table.ty(class.ty).base;
            for _ in 0..self.table.types.len() {
                match current {
                    Some(t) if t == class.ty => {
                        let name = self.table.ty(class.ty).name.clone();
                        return Err(SemErr::CyclicBase(name).at(class.tok.loc.clone()));
                    },
                    Some(t) => current = self.table.ty(t).base,
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// A context for resolving names in declarations.
    fn header_body(&self, owner: TypeId, scope: ScopeId) -> Body {
        Body { actn: None, owner, is_static: true, scope, globals: None, loops: vec![] }
    }

    /// Pass 4.
    fn declare_members(&mut self, roots: &'t [Token]) -> SemResult<()> {
        let mut class_idx = 0;

        for (idx, root) in roots.iter().enumerate() {
            let src_scope = self.table.sources[idx].scope;

            for stmt in &root.follows {
                if stmt.group == Group::Class {
                    let ty = self.classes[class_idx].ty;
                    class_idx += 1;
                    self.declare_class_body(ty, stmt)?;
                } else if is_fun(stmt) {
                    let global = self.table.global;
                    self.declare_fun(global, src_scope, stmt)?;
                }
            }
        }

        log::debug!("declared {} functions", self.funs.len());
        Ok(())
    }

    fn declare_class_body(&mut self, ty: TypeId, class: &'t Token) -> SemResult<()> {
        let Some(scope) = self.table.ty(ty).scope else {
            return Err(SemErr::Internal(format!("class '{}' has no scope", self.table.ty(ty).name)).at_unknown());
        };

        let body = strip_end(&class.follows);
        for item in body.iter().skip(1).filter(|t| t.group != Group::Extends) {
            if is_fun(item) {
                self.declare_fun(ty, scope, item)?;
                continue;
            }

            let field = item.first()
                .filter(|n| item.group == Group::TypeSpec && n.group == Group::Id)
                .ok_or_else(|| SemErr::Misplaced(item.value.clone()).at(item.loc.clone()))?;
            if self.table.ty(ty).fields.contains_key(&field.value) {
                return Err(SemErr::Redeclared(field.value.clone()).at(field.loc.clone()));
            }

            let type_tok = item.second()
                .ok_or_else(|| SemErr::Misplaced(item.value.clone()).at(item.loc.clone()))?;
            let mut cx = self.header_body(ty, scope);
            let fty = self.type_of(&mut cx, type_tok)?;

            let var = self.table.add_var(VarData {
                name: field.value.clone(),
                ty: fty,
                kind: VarKind::Field { owner: ty, is_static: false },
                loc: Some(field.loc.clone())
            });
            self.table.ty_mut(ty).fields.insert(field.value.clone(), var);
            self.record(field, Resolution::Var(var));
        }
        Ok(())
    }

    fn declare_fun(&mut self, owner: TypeId, parent: ScopeId, fun: &'t Token) -> SemResult<()> {
        let top_level = owner == self.table.global;
        let header = fun.follows.first()
            .ok_or_else(|| SemErr::BadHeader(fun.value.clone()).at(fun.loc.clone()))?;
        let bad_header = || SemErr::BadHeader(fun.value.clone()).at(header.loc.clone());

        let (call, ret_tok) = match header.group {
            Group::TypeSpec => (header.first().ok_or_else(bad_header)?, header.second()),
            _ => (header, None),
        };
        let name_tok = call.first()
            .filter(|n| call.group == Group::Call && n.group == Group::Id)
            .ok_or_else(bad_header)?;

        let is_ctor = !top_level && name_tok.value == "new";
        let (is_static, is_virtual, visibility) = match fun.group {
            _ if top_level => (true, false, Visibility::Public),
            Group::StaticFun  => (true, false, Visibility::Public),
            Group::VirtualFun => (false, true, Visibility::Public),
            Group::PrivateFun => (false, false, Visibility::Private),
            Group::FamilyFun  => (false, false, Visibility::Family),
            _ => (false, false, Visibility::Public),
        };
        if is_ctor && (is_static || is_virtual || ret_tok.is_some()) {
            return Err(bad_header());
        }

        let mut cx = self.header_body(owner, parent);
        let ret = match ret_tok {
            Some(r) => Some(self.type_of(&mut cx, r)?).filter(|&t| t != self.b.void),
            None => None,
        };

        let name = if is_ctor { ".ctor" } else { name_tok.value.as_str() };
        let mut actn = ActnData::new(name, owner, if is_ctor { ActnKind::Ctor } else { ActnKind::Method });
        actn.ret = ret;
        actn.is_static = is_static;
        actn.is_virtual = is_virtual;
        actn.visibility = visibility;
        actn.decl = Some(fun.id);
        actn.loc = Some(fun.loc.clone());

        let scope = self.table.add_scope(ScopeKind::Block, Some(parent));
        actn.scope = Some(scope);
        let offset = usize::from(!is_static);

        for (i, p) in Token::comma_items(call.second()).into_iter().enumerate() {
            let (Some(pname), Some(ptype)) = (p.first(), p.second()) else { return Err(bad_header()) };
            if p.group != Group::TypeSpec || pname.group != Group::Id {
                return Err(bad_header());
            }
            if self.table.scope(scope).vars.contains_key(&pname.value) {
                return Err(SemErr::Redeclared(pname.value.clone()).at(pname.loc.clone()));
            }

            let ty = self.type_of(&mut cx, ptype)?;
            let var = self.table.add_var(VarData {
                name: pname.value.clone(),
                ty,
                kind: VarKind::Param(i + offset),
                loc: Some(pname.loc.clone())
            });
            actn.params.push(var);
            self.table.scope_mut(scope).vars.insert(pname.value.clone(), var);
            self.record(pname, Resolution::Var(var));
        }
        if !is_static {
            actn.this = Some(self.table.add_this(owner));
        }

        let params: Vec<_> = actn.params.iter().map(|&p| self.table.var(p).ty).collect();
        let clash = self.table.ty(owner).methods.get(name).into_iter().flatten()
            .any(|&other| self.table.param_types(other) == params);

        let id = self.table.add_actn(actn);
        self.table.scope_mut(scope).kind = ScopeKind::Action(id);
        if clash {
            return Err(SemErr::DuplicateSignature(self.table.signature(id)).at(name_tok.loc.clone()));
        }

        self.record(name_tok, Resolution::Actn(id));
        self.funs.push(FunDecl { tok: fun, actn: id });
        log::trace!("declared {}", self.table.signature(id));
        Ok(())
    }

    /// Pass 5.
    fn add_default_ctors(&mut self) {
        for class in &self.classes {
            if self.table.ty(class.ty).methods.contains_key(".ctor") {
                continue;
            }

            let this = self.table.add_this(class.ty);
            let mut ctor = ActnData::new(".ctor", class.ty, ActnKind::Ctor);
            ctor.this = Some(this);
            ctor.loc = Some(class.tok.loc.clone());
            self.table.add_actn(ctor);
        }
    }

    /// Pass 6.
    fn add_base_calls(&mut self) -> SemResult<()> {
        let ctors: Vec<_> = self.table.user_actns()
            .filter(|&a| self.table.actn(a).kind == ActnKind::Ctor)
            .collect();

        for ctor in ctors {
            let explicit = self.funs.iter()
                .find(|f| f.actn == ctor)
                .and_then(|f| strip_end(&f.tok.follows).get(1))
                .is_some_and(lines::is_base_call);
            if explicit {
                self.table.actn_mut(ctor).explicit_base = true;
                continue;
            }

            let (owner, this, loc) = {
                let data = self.table.actn(ctor);
                (data.owner, data.this, data.loc.clone())
            };
            let Some(base) = self.table.ty(owner).base else { continue };

            let base_ctor = self.pick_ctor(base, &[], owner).map_err(|e| at_opt(e, loc))?;
            let inst = this.map(|t| Box::new(exec::Value::new(owner, exec::ValueKind::Load(t, None))));
            self.table.actn_mut(ctor).body.push(Exec::Call(Call {
                actn: base_ctor,
                inst,
                args: vec![],
                virt: false,
                ret: None
            }));
        }
        Ok(())
    }

    /// Pass 7.
    fn analyze_bodies(&mut self) -> SemResult<()> {
        if !self.top_lines.is_empty() {
            let global = self.table.global;
            let mut cctor = ActnData::new(".cctor", global, ActnKind::Cctor);
            cctor.is_static = true;
            cctor.visibility = Visibility::Private;
            let cctor = self.table.add_actn(cctor);

            let lines = std::mem::take(&mut self.top_lines);
            let mut i = 0;
            while i < lines.len() {
                let block = lines[i].0;
                let run: Vec<&Token> = lines[i..].iter()
                    .take_while(|(b, _)| *b == block)
                    .map(|(_, t)| *t)
                    .collect();
                i += run.len();

                let mut cx = Body {
                    actn: Some(cctor),
                    owner: global,
                    is_static: true,
                    scope: block,
                    globals: Some(block),
                    loops: vec![]
                };
                let execs = self.stmts(&mut cx, run.into_iter())?;
                self.table.actn_mut(cctor).body.extend(execs);
            }
            log::debug!("analyzed top-level lines");
        }

        for i in 0..self.funs.len() {
            let FunDecl { tok, actn } = self.funs[i];
            let data = self.table.actn(actn);
            let (Some(scope), owner, is_static, explicit_base) = (data.scope, data.owner, data.is_static, data.explicit_base) else {
                continue;
            };

            let block = self.table.add_scope(ScopeKind::Block, Some(scope));
            let mut cx = Body { actn: Some(actn), owner, is_static, scope: block, globals: None, loops: vec![] };

            let body = strip_end(&tok.follows);
            let mut stmts = body.iter().skip(1);
            if explicit_base {
                if let Some(call) = stmts.next() {
                    let exec = self.base_call(&mut cx, call)?;
                    self.table.actn_mut(actn).body.push(exec);
                }
            }

            let execs = self.stmts(&mut cx, stmts)?;
            self.table.actn_mut(actn).body.extend(execs);
            log::trace!("analyzed body of {}", self.table.signature(actn));
        }

        log::debug!("analyzed {} bodies", self.funs.len());
        Ok(())
    }

    /// Pass 8.
    fn finalize(&mut self) -> SemResult<()> {
        let global = self.table.global;
        let mains: Vec<_> = self.table.ty(global).methods.get("main").cloned().unwrap_or_default();
        match mains.as_slice() {
            [] => {
                let mut main = ActnData::new("main", global, ActnKind::Method);
                main.is_static = true;
                self.table.entry = Some(self.table.add_actn(main));
            },
            [main] => self.table.entry = Some(*main),
            [_, second, ..] => {
                let loc = self.table.actn(*second).loc.clone();
                return Err(at_opt(SemErr::MultipleEntryPoints, loc));
            },
        }

        for f in &self.funs {
            let data = self.table.actn(f.actn);
            if data.is_function() && !returns(&data.body) {
                return Err(SemErr::NoReturnValue(data.name.clone()).at(f.tok.loc.clone()));
            }
        }

        self.collect_external_refs();
        log::debug!("{} external types referenced", self.table.external_refs.len());
        Ok(())
    }

    fn collect_external_refs(&mut self) {
        let mut used = vec![];
        let mut note = |t: TypeId| used.push(t);

        for class in &self.classes {
            let data = self.table.ty(class.ty);
            data.base.into_iter().for_each(&mut note);
            data.fields.values().for_each(|&v| note(self.table.var(v).ty));
        }
        self.table.ty(self.table.global).fields.values().for_each(|&v| note(self.table.var(v).ty));

        for a in self.table.user_actns() {
            let data = self.table.actn(a);
            data.params.iter().chain(&data.locals).for_each(|&v| note(self.table.var(v).ty));
            data.ret.into_iter().for_each(&mut note);
            data.body.iter().for_each(|e| e.visit_types(&self.table, &mut note));
        }

        let mut refs = indexmap::IndexSet::new();
        while let Some(t) = used.pop() {
            match &self.table.ty(t).kind {
                TypeKind::External { args, .. } => {
                    used.extend(args.iter().copied());
                    refs.insert(t);
                },
                TypeKind::Vector(e) | TypeKind::Array(e, _) => used.push(*e),
                TypeKind::User { .. } | TypeKind::Global => {},
            }
        }

        refs.sort();
        self.table.external_refs = refs;
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Context;
    use crate::parser::parse;
    use crate::semantic::oracle::Library;

    use super::*;

    fn analyze_src(src: &str) -> SemResult<Analysis> {
        let lib = Library::with_corlib();
        let mut ctx = Context::new(&lib);
        let root = parse(src, "test").unwrap();
        analyze(&mut ctx, std::slice::from_ref(&root))
    }

    fn assert_fail(src: &str, err: SemErr) {
        match analyze_src(src) {
            Ok(_) => panic!("analysis of {src:?} succeeded"),
            Err(e) => assert_eq!(e.err, err, "{}", e.full_msg(src)),
        }
    }

    #[test]
    fn classes_and_bases() {
        let a = analyze_src("class A x:int end class B extends A fun get():int return x end end").unwrap();
        let t = &a.table;
        let (ta, tb) = (t.app_types["A"], t.app_types["B"]);

        assert_eq!(t.ty(ta).base, Some(a.builtins.object));
        assert_eq!(t.ty(tb).base, Some(ta));
        assert!(t.ty(ta).methods.contains_key(".ctor"));
        assert_eq!(t.ty(ta).fields.len(), 1);

        let get = t.ty(tb).methods["get"][0];
        assert_eq!(t.actn(get).ret, Some(a.builtins.int));
        assert!(t.actn(get).this.is_some());
    }

    #[test]
    fn declaration_errors() {
        assert_fail("class A end class A end", SemErr::DuplicateType("A".to_string()));
        assert_fail("class A extends B end class B extends A end", SemErr::CyclicBase("A".to_string()));
        assert_fail("class A extends int end", SemErr::BadBase("System.Int32".to_string()));
        assert_fail("fun f(a:int) end fun f(b:int) end", SemErr::DuplicateSignature("f(System.Int32)".to_string()));
        assert_fail("fun f(a:int, a:int) end", SemErr::Redeclared("a".to_string()));
        assert_fail("class A `p(1) end", SemErr::Misplaced("(".to_string()));
        assert_fail("fun f x end", SemErr::BadHeader("fun".to_string()));
        assert_fail("using Nowhere", SemErr::UnknownNamespace("Nowhere".to_string()));
    }

    #[test]
    fn entry_points() {
        let a = analyze_src("fun main() end").unwrap();
        let entry = a.table.entry.unwrap();
        assert!(a.table.actn(entry).decl.is_some());

        let a = analyze_src("x <- 1").unwrap();
        let entry = a.table.entry.unwrap();
        assert!(a.table.actn(entry).decl.is_none());
        assert!(a.table.ty(a.table.global).methods.contains_key(".cctor"));
        assert!(a.table.ty(a.table.global).fields.contains_key("x"));

        assert_fail("fun main() end fun main(a:int) end", SemErr::MultipleEntryPoints);
    }

    #[test]
    fn return_determinacy() {
        assert_fail("fun f():int if true then return 1 end end", SemErr::NoReturnValue("f".to_string()));
        assert!(analyze_src("fun f():int if true then return 1 else return 2 end end").is_ok());
        assert!(analyze_src("fun f():int while true do return 1 end return 0 end").is_ok());
        assert_fail("fun f():int while true do return 1 end end", SemErr::NoReturnValue("f".to_string()));
    }

    #[test]
    fn external_refs() {
        let a = analyze_src("using System.Text sb <- StringBuilder() sb.Append(\"a\")").unwrap();
        let names: Vec<_> = a.table.external_refs.iter().map(|&t| a.table.ty(t).name.as_str()).collect();

        assert!(names.contains(&"System.Text.StringBuilder"));
        assert!(names.contains(&"System.String"));
        assert!(!names.contains(&"System.Math"));
        assert!(!names.contains(&"System.ValueType"));
    }

    fn external_names(src: &str) -> Vec<String> {
        let a = analyze_src(src).unwrap();
        a.table.external_refs.iter().map(|&t| a.table.ty(t).name.clone()).collect()
    }

    #[test]
    fn call_owners_are_referenced() {
        let names = external_names("x <- System.Math.Abs(-1)");
        assert!(names.contains(&"System.Math".to_string()), "{names:?}");

        let names = external_names("if true then System.Console.WriteLine(1) end");
        assert!(names.contains(&"System.Console".to_string()), "{names:?}");

        let names = external_names("fun main() while true do x <- System.Math.Max(1, 2) end end");
        assert!(names.contains(&"System.Math".to_string()), "{names:?}");

        let names = external_names("using System.Text n <- StringBuilder().Length");
        assert!(names.contains(&"System.Text.StringBuilder".to_string()), "{names:?}");
    }
}
