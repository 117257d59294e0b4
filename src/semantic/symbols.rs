//! The symbol hierarchy of a compilation.
//!
//! Every symbol lives in an arena of the [`SymbolTable`] and is addressed by a small copyable id.
//! Scopes form a tree through explicit parent links; the kind of a scope decides
//! which symbols a lookup through it can see (see [`super::lookup`]).

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::lexer::token::TokenId;
use crate::span::Loc;

use super::exec::Exec;
use super::oracle::{ExtType, Visibility};

macro_rules! define_ids {
    ($($(#[$attr:meta])* $id:ident),*) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
            pub struct $id(pub usize);
        )*
    }
}
define_ids! {
    /// Index of a [`Scope`] in the symbol table.
    ScopeId,
    /// Index of a [`TypeData`] in the symbol table.
    TypeId,
    /// Index of an [`ActnData`] in the symbol table.
    ActnId,
    /// Index of a [`VarData`] in the symbol table.
    VarId
}

/// The kind of a scope. Lookups branch on this.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScopeKind {
    /// The outermost scope: built-in aliases, shorthands, and the oracle.
    Environment,
    /// The application: all user types.
    Application,
    /// One source file (index into [`SymbolTable::sources`]).
    Source(usize),
    /// The body of a user type.
    Type(TypeId),
    /// The parameters of a user action.
    Action(ActnId),
    /// A statement block.
    Block,
}

/// A node of the scope tree.
#[derive(Clone, Debug)]
pub struct Scope {
    /// What this scope belongs to
    pub kind: ScopeKind,
    /// The enclosing scope (`None` only for the environment)
    pub parent: Option<ScopeId>,
    /// Variables declared directly in this scope
    pub vars: IndexMap<String, VarId>,
}

/// Per-source data.
#[derive(Clone, Debug)]
pub struct SourceData {
    /// Path used in diagnostics
    pub path: String,
    /// Namespace prefixes imported by `using`
    pub usings: Vec<String>,
    /// The source's scope
    pub scope: ScopeId,
}

/// Where a type comes from.
#[derive(Clone, Debug)]
pub enum TypeKind {
    /// A class declared in the sources.
    User {
        /// The `class` token
        decl: TokenId,
        /// Where it was declared
        loc: Loc
    },
    /// The implicit type holding top-level functions and variables.
    Global,
    /// A type known through the oracle, possibly with generic arguments substituted.
    External {
        /// The oracle's description
        ext: Arc<ExtType>,
        /// Generic arguments, in parameter order
        args: Vec<TypeId>
    },
    /// A single-dimension, zero-based array.
    Vector(TypeId),
    /// A rectangular array of rank 2 or more.
    Array(TypeId, usize),
}

/// A property: a named pair of accessor actions.
#[derive(Clone, Debug)]
pub struct Property {
    /// Type of the property
    pub ty: TypeId,
    /// The getter (`get_Name`)
    pub get: Option<ActnId>,
    /// The setter (`set_Name`)
    pub set: Option<ActnId>,
    /// Whether the accessors are static
    pub is_static: bool,
}

/// A type.
#[derive(Clone, Debug)]
pub struct TypeData {
    /// Full name of the type
    pub name: String,
    /// Where the type comes from
    pub kind: TypeKind,
    /// Base type (`None` only for the root object type and the global type)
    pub base: Option<TypeId>,
    /// Whether values of this type are value types
    pub is_value: bool,
    /// Fields, by name
    pub fields: IndexMap<String, VarId>,
    /// Properties, by name
    pub props: IndexMap<String, Property>,
    /// Overload sets, by name (constructors are `.ctor`)
    pub methods: IndexMap<String, Vec<ActnId>>,
    /// Whether external members were materialized
    pub(super) loaded: bool,
    /// The type's scope (user types only)
    pub scope: Option<ScopeId>,
}

impl TypeData {
    /// Creates a type without members.
    pub fn new(name: impl Into<String>, kind: TypeKind, is_value: bool) -> Self {
        TypeData {
            name: name.into(),
            kind,
            base: None,
            is_value,
            fields: IndexMap::new(),
            props: IndexMap::new(),
            methods: IndexMap::new(),
            loaded: false,
            scope: None,
        }
    }

    /// Whether this type is declared by the compiled sources (including the global type).
    pub fn is_user(&self) -> bool {
        matches!(self.kind, TypeKind::User { .. } | TypeKind::Global)
    }

    /// The assembly this type belongs to (`None` for user types).
    pub fn assembly(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::External { ext, .. } => Some(&ext.assembly),
            TypeKind::Vector(_) | TypeKind::Array(..) => Some("mscorlib"),
            TypeKind::User { .. } | TypeKind::Global => None,
        }
    }
}

/// What kind of callable an action is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ActnKind {
    /// A method (void or value-returning)
    Method,
    /// An instance constructor
    Ctor,
    /// The static initializer of the global type
    Cctor,
    /// A property getter
    Getter,
    /// A property setter
    Setter,
}

/// A callable member: a void action or a value-returning function.
#[derive(Clone, Debug)]
pub struct ActnData {
    /// Member name
    pub name: String,
    /// Declaring type
    pub owner: TypeId,
    /// Kind of callable
    pub kind: ActnKind,
    /// Parameters, excluding `this`
    pub params: Vec<VarId>,
    /// The implicit `this` parameter of instance members
    pub this: Option<VarId>,
    /// Return type (`None` for actions)
    pub ret: Option<TypeId>,
    /// Whether the member is static
    pub is_static: bool,
    /// Whether the member is virtual
    pub is_virtual: bool,
    /// Member visibility
    pub visibility: Visibility,
    /// The `fun` token (user members only)
    pub decl: Option<TokenId>,
    /// Where the member was declared (user members only)
    pub loc: Option<Loc>,
    /// The parameter scope (user members only)
    pub scope: Option<ScopeId>,
    /// Resolved body (user members only)
    pub body: Vec<Exec>,
    /// Locals and temporaries declared in the body
    pub locals: Vec<VarId>,
    /// Whether the body starts with an explicit `base(...)` call
    pub explicit_base: bool,
}

impl ActnData {
    /// Creates an action with no parameters and no body.
    pub fn new(name: impl Into<String>, owner: TypeId, kind: ActnKind) -> Self {
        ActnData {
            name: name.into(),
            owner,
            kind,
            params: vec![],
            this: None,
            ret: None,
            is_static: false,
            is_virtual: false,
            visibility: Visibility::Public,
            decl: None,
            loc: None,
            scope: None,
            body: vec![],
            locals: vec![],
            explicit_base: false,
        }
    }

    /// Whether this returns a value.
    pub fn is_function(&self) -> bool {
        self.ret.is_some()
    }
}

/// What a variable is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarKind {
    /// A local of an action body
    Local,
    /// A temporary created by the compiler
    Temp,
    /// A parameter; instance members count `this` as parameter 0
    Param(usize),
    /// The implicit `this` parameter
    This,
    /// A field of a type
    Field {
        /// Declaring type
        owner: TypeId,
        /// Whether the field is static
        is_static: bool
    },
}

/// A variable.
#[derive(Clone, Debug)]
pub struct VarData {
    /// Variable name
    pub name: String,
    /// Variable type
    pub ty: TypeId,
    /// What the variable is
    pub kind: VarKind,
    /// Where the variable was declared, if in source
    pub loc: Option<Loc>,
}

impl VarData {
    /// Whether reading this variable needs an instance on the stack.
    pub fn is_instance_field(&self) -> bool {
        matches!(self.kind, VarKind::Field { is_static: false, .. })
    }
}

/// Types every compilation needs.
#[derive(Clone, Copy, Debug)]
pub struct Builtins {
    /// `System.Object`
    pub object: TypeId,
    /// `System.Void`
    pub void: TypeId,
    /// `System.Int32`
    pub int: TypeId,
    /// `System.Boolean`
    pub bool: TypeId,
    /// `System.String`
    pub string: TypeId,
    /// `System.Array`, base of vectors and arrays
    pub array: TypeId,
}

/// Name of the implicit type holding top-level members.
pub const GLOBAL_TYPE: &str = "<global>";

/// Arenas of every symbol in one compilation.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    /// All scopes
    pub scopes: Vec<Scope>,
    /// All types
    pub types: Vec<TypeData>,
    /// All actions
    pub actns: Vec<ActnData>,
    /// All variables
    pub vars: Vec<VarData>,
    /// Sources, in the order they were given
    pub sources: Vec<SourceData>,
    /// The environment scope
    pub env: ScopeId,
    /// The application scope
    pub app: ScopeId,
    /// The type holding top-level members
    pub global: TypeId,
    /// User types, in declaration order
    pub app_types: IndexMap<String, TypeId>,
    /// The entry point
    pub entry: Option<ActnId>,
    /// External types used by the application
    pub external_refs: IndexSet<TypeId>,
    pub(super) interned: IndexMap<String, TypeId>,
}

impl SymbolTable {
    /// Creates a table with the environment and application scopes and the global type.
    pub fn new() -> Self {
        let mut table = SymbolTable {
            scopes: vec![],
            types: vec![],
            actns: vec![],
            vars: vec![],
            sources: vec![],
            env: ScopeId(0),
            app: ScopeId(0),
            global: TypeId(0),
            app_types: IndexMap::new(),
            entry: None,
            external_refs: IndexSet::new(),
            interned: IndexMap::new(),
        };

        table.env = table.add_scope(ScopeKind::Environment, None);
        table.app = table.add_scope(ScopeKind::Application, Some(table.env));
        table.global = table.add_type(TypeData::new(GLOBAL_TYPE, TypeKind::Global, false));
        table
    }

    /// Adds a scope.
    pub fn add_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope { kind, parent, vars: IndexMap::new() });
        ScopeId(self.scopes.len() - 1)
    }

    /// Adds a type.
    pub fn add_type(&mut self, data: TypeData) -> TypeId {
        self.types.push(data);
        TypeId(self.types.len() - 1)
    }

    /// Adds an action and registers it in its owner's overload set.
    pub fn add_actn(&mut self, data: ActnData) -> ActnId {
        let id = ActnId(self.actns.len());
        let owner = data.owner;
        let name = data.name.clone();
        self.actns.push(data);

        if !matches!(self.actns[id.0].kind, ActnKind::Getter | ActnKind::Setter) {
            self.types[owner.0].methods.entry(name).or_default().push(id);
        }
        id
    }

    /// Adds a variable (without registering it in any scope).
    pub fn add_var(&mut self, data: VarData) -> VarId {
        self.vars.push(data);
        VarId(self.vars.len() - 1)
    }

    /// Gets a scope.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }
    /// Gets a scope mutably.
    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }
    /// Gets a type.
    pub fn ty(&self, id: TypeId) -> &TypeData {
        &self.types[id.0]
    }
    /// Gets a type mutably.
    pub fn ty_mut(&mut self, id: TypeId) -> &mut TypeData {
        &mut self.types[id.0]
    }
    /// Gets an action.
    pub fn actn(&self, id: ActnId) -> &ActnData {
        &self.actns[id.0]
    }
    /// Gets an action mutably.
    pub fn actn_mut(&mut self, id: ActnId) -> &mut ActnData {
        &mut self.actns[id.0]
    }
    /// Gets a variable.
    pub fn var(&self, id: VarId) -> &VarData {
        &self.vars[id.0]
    }

    /// Parameter types of an action, excluding `this`.
    pub fn param_types(&self, id: ActnId) -> Vec<TypeId> {
        self.actn(id).params.iter().map(|&p| self.var(p).ty).collect()
    }

    /// Whether `sub` is `sup` or inherits from it.
    pub fn inherits(&self, sub: TypeId, sup: TypeId) -> bool {
        self.base_chain(sub).any(|t| t == sup)
    }

    /// A type followed by its ancestors.
    pub fn base_chain(&self, ty: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        let mut seen = 0;
        std::iter::successors(Some(ty), move |&t| {
            seen += 1;
            if seen > self.types.len() { None } else { self.ty(t).base }
        })
    }

    /// The scope chain starting at a scope.
    pub fn scope_chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), |&s| self.scope(s).parent)
    }

    /// Signature text of an action, e.g. `Concat(System.String, System.String)`.
    pub fn signature(&self, id: ActnId) -> String {
        let actn = self.actn(id);
        let params: Vec<_> = actn.params.iter()
            .map(|&p| self.ty(self.var(p).ty).name.as_str())
            .collect();
        format!("{}({})", actn.name, params.join(", "))
    }

    /// User actions in declaration order.
    pub fn user_actns(&self) -> impl Iterator<Item = ActnId> + '_ {
        (0..self.actns.len())
            .map(ActnId)
            .filter(|&a| self.ty(self.actn(a).owner).is_user())
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
