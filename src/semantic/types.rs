//! Construction of external, vector, and array types, and the assignability relation.
//!
//! Every constructed type is interned by its full name, so asking for `int[]` twice
//! gives the same [`TypeId`] both times.
//! Members of external types are materialized lazily by [`SymbolTable::load_members`],
//! since member signatures refer to other external types.

use super::oracle::{ExtMemberKind, TypeOracle};
use super::symbols::{
    ActnData, ActnKind, Builtins, Property, SymbolTable, TypeData, TypeId, TypeKind, VarData, VarId, VarKind,
};
use super::SemErr;

impl SymbolTable {
    /// Interns the external type `name`, instantiated with `args` if generic.
    ///
    /// Returns `Ok(None)` if the oracle does not know the type.
    pub fn intern_external(&mut self, oracle: &dyn TypeOracle, name: &str, args: &[TypeId]) -> Result<Option<TypeId>, SemErr> {
        let key = if args.is_empty() {
            name.to_string()
        } else {
            let names: Vec<_> = args.iter().map(|&a| self.ty(a).name.as_str()).collect();
            format!("{name}<{}>", names.join(","))
        };
        if let Some(&id) = self.interned.get(&key) {
            return Ok(Some(id));
        }

        let Some(ext) = oracle.find_type(name) else { return Ok(None) };
        if ext.generic_params.len() != args.len() {
            return Err(SemErr::GenericArity(name.to_string(), ext.generic_params.len(), args.len()));
        }

        let base = ext.base.clone();
        let is_value = ext.is_value_type;
        let id = self.add_type(TypeData::new(key.clone(), TypeKind::External { ext, args: args.to_vec() }, is_value));
        self.interned.insert(key, id);

        if let Some(b) = base {
            let base = self.intern_external(oracle, &b, &[])?
                .ok_or_else(|| SemErr::Internal(format!("base type '{b}' of '{name}' is not in any library")))?;
            self.ty_mut(id).base = Some(base);
        }

        log::trace!("interned external type {}", self.ty(id).name);
        Ok(Some(id))
    }

    /// Interns the vector type of `elem` (`elem[]`).
    pub fn vector_of(&mut self, elem: TypeId, b: &Builtins) -> TypeId {
        let key = format!("{}[]", self.ty(elem).name);
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }

        let mut data = TypeData::new(key.clone(), TypeKind::Vector(elem), false);
        data.base = Some(b.array);
        data.loaded = true;
        let id = self.add_type(data);
        self.interned.insert(key, id);
        id
    }

    /// Interns the rectangular array type of `elem` with the given rank (`elem[,]` for rank 2).
    ///
    /// Arrays are accessed through synthesized `.ctor`, `Get`, and `Set` members
    /// taking one `int` per dimension.
    pub fn array_of(&mut self, elem: TypeId, rank: usize, b: &Builtins) -> TypeId {
        let key = format!("{}[{}]", self.ty(elem).name, ",".repeat(rank.saturating_sub(1)));
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }

        let mut data = TypeData::new(key.clone(), TypeKind::Array(elem, rank), false);
        data.base = Some(b.array);
        data.loaded = true;
        let id = self.add_type(data);
        self.interned.insert(key, id);

        let indices = vec![b.int; rank];
        let mut with_value = indices.clone();
        with_value.push(elem);

        self.add_member(id, ".ctor", ActnKind::Ctor, &indices, None, false);
        self.add_member(id, "Get", ActnKind::Method, &indices, Some(elem), false);
        self.add_member(id, "Set", ActnKind::Method, &with_value, None, false);
        id
    }

    /// Adds a synthesized member with positional parameters.
    pub(super) fn add_member(
        &mut self,
        owner: TypeId,
        name: &str,
        kind: ActnKind,
        params: &[TypeId],
        ret: Option<TypeId>,
        is_static: bool
    ) -> super::symbols::ActnId {
        let offset = usize::from(!is_static);
        let mut actn = ActnData::new(name, owner, kind);
        actn.ret = ret;
        actn.is_static = is_static;
        actn.params = params.iter().enumerate()
            .map(|(i, &ty)| self.add_var(VarData {
                name: format!("p{i}"),
                ty,
                kind: VarKind::Param(i + offset),
                loc: None
            }))
            .collect();
        if !is_static {
            actn.this = Some(self.add_this(owner));
        }
        self.add_actn(actn)
    }

    /// Creates the `this` parameter of an instance member of `owner`.
    pub(super) fn add_this(&mut self, owner: TypeId) -> VarId {
        self.add_var(VarData { name: String::from("this"), ty: owner, kind: VarKind::This, loc: None })
    }

    /// Materializes the members of an external type.
    pub fn load_members(&mut self, oracle: &dyn TypeOracle, ty: TypeId, b: &Builtins) -> Result<(), SemErr> {
        if self.ty(ty).loaded {
            return Ok(());
        }
        self.ty_mut(ty).loaded = true;

        let TypeKind::External { ext, args } = self.ty(ty).kind.clone() else { return Ok(()) };

        for m in &ext.members {
            let mut params = Vec::with_capacity(m.params.len());
            for p in &m.params {
                params.push(self.lib_ref(oracle, p, &ext.generic_params, &args, b)?);
            }
            let ret = match &m.ret {
                Some(r) => Some(self.lib_ref(oracle, r, &ext.generic_params, &args, b)?).filter(|&r| r != b.void),
                None => None,
            };

            match m.kind {
                ExtMemberKind::Method | ExtMemberKind::Ctor => {
                    let kind = if m.kind == ExtMemberKind::Ctor { ActnKind::Ctor } else { ActnKind::Method };
                    let id = self.add_member(ty, &m.name, kind, &params, ret, m.is_static);
                    let actn = self.actn_mut(id);
                    actn.is_virtual = m.is_virtual;
                    actn.visibility = m.visibility;
                },
                ExtMemberKind::Property { get, set } => {
                    let Some(pty) = ret else {
                        return Err(SemErr::Internal(format!("property '{}' of '{}' has no type", m.name, ext.name)));
                    };
                    let getter = get.then(|| {
                        let id = self.add_member(ty, &format!("get_{}", m.name), ActnKind::Getter, &[], Some(pty), m.is_static);
                        self.actn_mut(id).visibility = m.visibility;
                        id
                    });
                    let setter = set.then(|| {
                        let id = self.add_member(ty, &format!("set_{}", m.name), ActnKind::Setter, &[pty], None, m.is_static);
                        self.actn_mut(id).visibility = m.visibility;
                        id
                    });
                    self.ty_mut(ty).props.insert(m.name.clone(), Property {
                        ty: pty,
                        get: getter,
                        set: setter,
                        is_static: m.is_static
                    });
                },
            }
        }

        log::trace!("loaded {} members of {}", ext.members.len(), ext.name);
        Ok(())
    }

    /// Resolves a type reference of a library member signature.
    fn lib_ref(
        &mut self,
        oracle: &dyn TypeOracle,
        r: &str,
        generics: &[String],
        args: &[TypeId],
        b: &Builtins
    ) -> Result<TypeId, SemErr> {
        if let Some(inner) = r.strip_suffix("[]") {
            let elem = self.lib_ref(oracle, inner, generics, args, b)?;
            return Ok(self.vector_of(elem, b));
        }
        if let Some(i) = generics.iter().position(|g| g == r) {
            return Ok(args[i]);
        }
        self.intern_external(oracle, r, &[])?
            .ok_or_else(|| SemErr::Internal(format!("type '{r}' is not in any library")))
    }

    /// Whether a value of type `from` can be stored where `to` is expected.
    ///
    /// This is identity or the subtype chain. Plain external types ask the oracle.
    pub fn is_assignable(&self, oracle: &dyn TypeOracle, from: TypeId, to: TypeId) -> bool {
        if from == to {
            return true;
        }

        match (&self.ty(from).kind, &self.ty(to).kind) {
            (
                TypeKind::External { ext: f, args: fa },
                TypeKind::External { ext: t, args: ta }
            ) if fa.is_empty() && ta.is_empty() => oracle.is_assignable(f, t),
            _ => self.inherits(from, to),
        }
    }
}

/// Interns the types every compilation needs.
pub fn builtins(table: &mut SymbolTable, oracle: &dyn TypeOracle) -> Result<Builtins, SemErr> {
    let mut get = |name: &str| {
        table.intern_external(oracle, name, &[])?
            .ok_or_else(|| SemErr::Internal(format!("base library type '{name}' is missing")))
    };

    Ok(Builtins {
        object: get("System.Object")?,
        void:   get("System.Void")?,
        int:    get("System.Int32")?,
        bool:   get("System.Boolean")?,
        string: get("System.String")?,
        array:  get("System.Array")?,
    })
}

#[cfg(test)]
mod tests {
    use crate::semantic::oracle::Library;

    use super::*;

    fn setup() -> (SymbolTable, Library, Builtins) {
        let lib = Library::with_corlib();
        let mut table = SymbolTable::new();
        let b = builtins(&mut table, &lib).unwrap();
        (table, lib, b)
    }

    #[test]
    fn interning() {
        let (mut table, lib, b) = setup();

        assert_eq!(table.intern_external(&lib, "System.Int32", &[]).unwrap(), Some(b.int));
        assert_eq!(table.intern_external(&lib, "System.Nope", &[]).unwrap(), None);
        let base = table.ty(b.int).base;
        assert_eq!(base, table.intern_external(&lib, "System.ValueType", &[]).unwrap());

        let v1 = table.vector_of(b.int, &b);
        let v2 = table.vector_of(b.int, &b);
        assert_eq!(v1, v2);
        assert_eq!(table.ty(v1).name, "System.Int32[]");
        let jagged = table.vector_of(v1, &b);
        assert_eq!(table.ty(jagged).name, "System.Int32[][]");

        let arr = table.array_of(b.int, 2, &b);
        assert_eq!(table.ty(arr).name, "System.Int32[,]");
        let set = table.ty(arr).methods["Set"][0];
        assert_eq!(table.param_types(set), [b.int, b.int, b.int]);
    }

    #[test]
    fn generic_substitution() {
        let (mut table, lib, b) = setup();

        let list = table.intern_external(&lib, "System.Collections.Generic.List`1", &[b.string]).unwrap().unwrap();
        assert_eq!(table.ty(list).name, "System.Collections.Generic.List`1<System.String>");
        table.load_members(&lib, list, &b).unwrap();

        let add = table.ty(list).methods["Add"][0];
        assert_eq!(table.param_types(add), [b.string]);
        assert_eq!(table.ty(list).props["Count"].ty, b.int);

        let e = table.intern_external(&lib, "System.Collections.Generic.List`1", &[]).unwrap_err();
        assert_eq!(e, SemErr::GenericArity("System.Collections.Generic.List`1".to_string(), 1, 0));
    }

    #[test]
    fn members_and_assignability() {
        let (mut table, lib, b) = setup();
        table.load_members(&lib, b.string, &b).unwrap();

        let concat = &table.ty(b.string).methods["Concat"];
        assert_eq!(concat.len(), 2);
        assert!(table.actn(concat[0]).is_static);
        assert!(table.actn(concat[0]).this.is_none());
        let len = &table.ty(b.string).props["Length"];
        assert!(len.get.is_some() && len.set.is_none());

        assert!(table.is_assignable(&lib, b.string, b.object));
        assert!(table.is_assignable(&lib, b.int, b.object));
        assert!(!table.is_assignable(&lib, b.object, b.string));
        let v = table.vector_of(b.string, &b);
        assert!(table.is_assignable(&lib, v, b.object));
        assert!(!table.is_assignable(&lib, v, b.string));
    }
}
