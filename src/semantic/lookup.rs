//! Name lookup.
//!
//! A bare name is looked up by walking the scope chain from the innermost block outward.
//! What each scope contributes depends on its kind:
//! - blocks and actions: their locals and parameters,
//! - a type: its members and those of its base chain,
//! - a source: the members of the global type (top-level functions and variables),
//! - the application: user types,
//! - the environment: built-in aliases, shorthands, then the oracle
//!   (by bare name, then prefixed by every `using` of the current source),
//!   and finally namespaces.

use super::symbols::{ActnId, ScopeId, ScopeKind, TypeId, VarId};
use super::{Analyzer, Body, SemErr};

/// Built-in type aliases.
pub const ALIASES: [(&str, &str); 5] = [
    ("int",    "System.Int32"),
    ("bool",   "System.Boolean"),
    ("string", "System.String"),
    ("object", "System.Object"),
    ("void",   "System.Void"),
];

/// Shorthand names for library functions: (name, type, method).
pub const SHORTHANDS: [(&str, &str, &str); 1] = [
    ("`p", "System.Console", "WriteLine"),
];

/// What a name refers to.
#[derive(Clone, Debug)]
pub(super) enum Found {
    /// A local, parameter, or field
    Var(VarId),
    /// A property (declaring type, name)
    Prop(TypeId, String),
    /// An overload set (name, candidates)
    Methods(String, Vec<ActnId>),
    /// A type
    Type(TypeId),
    /// A namespace prefix
    Namespace(String),
}

impl Analyzer<'_, '_, '_> {
    /// Looks up a bare name from a body.
    pub(super) fn lookup(&mut self, cx: &Body, name: &str) -> Result<Option<Found>, SemErr> {
        let chain: Vec<ScopeId> = self.table.scope_chain(cx.scope).collect();
        let mut source = None;

        for scope in chain {
            let kind = self.table.scope(scope).kind;
            match kind {
                ScopeKind::Block | ScopeKind::Action(_) => {
                    if let Some(&v) = self.table.scope(scope).vars.get(name) {
                        return Ok(Some(Found::Var(v)));
                    }
                },
                ScopeKind::Type(t) => {
                    if let Some(found) = self.find_member(t, name)? {
                        return Ok(Some(found));
                    }
                },
                ScopeKind::Source(idx) => {
                    source = Some(idx);
                    if let Some(found) = self.find_member(self.table.global, name)? {
                        return Ok(Some(found));
                    }
                },
                ScopeKind::Application => {
                    if let Some(&t) = self.table.app_types.get(name) {
                        return Ok(Some(Found::Type(t)));
                    }
                },
                ScopeKind::Environment => return self.lookup_env(name, source),
            }
        }

        Ok(None)
    }

    fn lookup_env(&mut self, name: &str, source: Option<usize>) -> Result<Option<Found>, SemErr> {
        let oracle = self.ctx.oracle();

        if let Some((_, full)) = ALIASES.iter().find(|(alias, _)| *alias == name) {
            return Ok(self.table.intern_external(oracle, full, &[])?.map(Found::Type));
        }
        if let Some(&(_, ty, method)) = SHORTHANDS.iter().find(|(short, ..)| *short == name) {
            let Some(t) = self.table.intern_external(oracle, ty, &[])? else { return Ok(None) };
            let cands = self.collect_methods(t, method)?;
            return Ok(Some(Found::Methods(method.to_string(), cands)));
        }
        if let Some(t) = self.find_oracle_type(name, &[], source)? {
            return Ok(Some(Found::Type(t)));
        }
        if oracle.is_namespace(name) {
            return Ok(Some(Found::Namespace(name.to_string())));
        }

        Ok(None)
    }

    /// Finds a type through the oracle by bare name, then prefixed by each `using`.
    pub(super) fn find_oracle_type(&mut self, name: &str, args: &[TypeId], source: Option<usize>) -> Result<Option<TypeId>, SemErr> {
        let oracle = self.ctx.oracle();
        if let Some(t) = self.table.intern_external(oracle, name, args)? {
            return Ok(Some(t));
        }

        let usings = source.map(|s| self.table.sources[s].usings.clone()).unwrap_or_default();
        for prefix in usings {
            if let Some(t) = self.table.intern_external(oracle, &format!("{prefix}.{name}"), args)? {
                return Ok(Some(t));
            }
        }
        Ok(None)
    }

    /// The source a scope belongs to.
    pub(super) fn source_of(&self, scope: ScopeId) -> Option<usize> {
        self.table.scope_chain(scope).find_map(|s| match self.table.scope(s).kind {
            ScopeKind::Source(idx) => Some(idx),
            _ => None,
        })
    }

    /// Finds a member of a type or one of its ancestors.
    ///
    /// Fields and properties are found by their first (most derived) declaration.
    /// Methods collect the whole overload set along the base chain.
    pub(super) fn find_member(&mut self, ty: TypeId, name: &str) -> Result<Option<Found>, SemErr> {
        let chain: Vec<_> = self.table.base_chain(ty).collect();

        for t in chain {
            self.table.load_members(self.ctx.oracle(), t, &self.b)?;
            let data = self.table.ty(t);

            if let Some(&v) = data.fields.get(name) {
                return Ok(Some(Found::Var(v)));
            }
            if data.props.contains_key(name) {
                return Ok(Some(Found::Prop(t, name.to_string())));
            }
            if data.methods.contains_key(name) && name != ".ctor" {
                let cands = self.collect_methods(ty, name)?;
                return Ok(Some(Found::Methods(name.to_string(), cands)));
            }
        }

        Ok(None)
    }

    /// Collects the overload set of a method along the base chain.
    ///
    /// A derived declaration hides a base declaration with the same parameter types.
    pub(super) fn collect_methods(&mut self, ty: TypeId, name: &str) -> Result<Vec<ActnId>, SemErr> {
        let chain: Vec<_> = self.table.base_chain(ty).collect();
        let mut cands: Vec<ActnId> = vec![];

        for t in chain {
            self.table.load_members(self.ctx.oracle(), t, &self.b)?;
            let Some(set) = self.table.ty(t).methods.get(name) else { continue };

            for &a in set {
                let params = self.table.param_types(a);
                if !cands.iter().any(|&c| self.table.param_types(c) == params) {
                    cands.push(a);
                }
            }
        }

        Ok(cands)
    }

    /// The constructors declared by a type itself.
    pub(super) fn ctors(&mut self, ty: TypeId) -> Result<Vec<ActnId>, SemErr> {
        self.table.load_members(self.ctx.oracle(), ty, &self.b)?;
        Ok(self.table.ty(ty).methods.get(".ctor").cloned().unwrap_or_default())
    }

    /// The name of a type, as written in error messages.
    pub(super) fn type_name(&self, ty: TypeId) -> String {
        self.table.ty(ty).name.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Context;
    use crate::parser::parse;
    use crate::semantic::oracle::Library;
    use crate::semantic::{analyze, Resolution};

    fn resolved_names(src: &str) -> Vec<String> {
        let lib = Library::with_corlib();
        let mut ctx = Context::new(&lib);
        let root = parse(src, "test").unwrap();
        let a = analyze(&mut ctx, std::slice::from_ref(&root)).unwrap();

        let mut res: Vec<_> = a.resolutions.into_iter().collect();
        res.sort_by_key(|(id, _)| *id);
        res.into_iter()
            .filter_map(|(_, r)| match r {
                Resolution::Type(t) => Some(a.table.ty(t).name.clone()),
                Resolution::Namespace(ns) => Some(ns),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn aliases_and_usings() {
        assert_eq!(resolved_names("a:int"), ["System.Int32"]);
        assert_eq!(
            resolved_names("using System.Text b:StringBuilder"),
            ["System.Text.StringBuilder"]
        );
        assert_eq!(
            resolved_names("c:System.Text.StringBuilder"),
            ["System", "System.Text", "System.Text.StringBuilder"]
        );
    }

    #[test]
    fn user_types_shadow_library() {
        assert_eq!(resolved_names("class Console end c:Console"), ["Console", "Console"]);
    }
}
