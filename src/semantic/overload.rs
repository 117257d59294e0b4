//! Overload resolution and member accessibility.
//!
//! Among the candidates whose parameter count matches the arguments,
//! exact signature matches are tried first, then matches where every argument
//! is assignable to its parameter. A set with more than one match is narrowed
//! to the accessible candidates; if that still leaves several, the call is ambiguous.

use super::oracle::Visibility;
use super::symbols::{ActnId, SymbolTable, TypeId};
use super::{Analyzer, SemErr};

/// Whether code in `caller` may use `actn`.
pub fn accessible(table: &SymbolTable, caller: TypeId, actn: ActnId) -> bool {
    let data = table.actn(actn);
    let owner = data.owner;

    let family = || table.inherits(caller, owner);
    let assembly = || {
        let (c, o) = (table.ty(caller), table.ty(owner));
        match (c.assembly(), o.assembly()) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    };

    match data.visibility {
        Visibility::Public      => true,
        Visibility::Private     => caller == owner,
        Visibility::Family      => family(),
        Visibility::Assembly    => assembly(),
        Visibility::FamOrAssem  => family() || assembly(),
        Visibility::FamAndAssem => family() && assembly(),
    }
}

impl Analyzer<'_, '_, '_> {
    /// Picks the overload of `name` that `args` select, as seen from `caller`.
    pub(super) fn select(&self, name: &str, cands: &[ActnId], args: &[TypeId], caller: TypeId) -> Result<ActnId, SemErr> {
        let oracle = self.ctx.oracle();
        let arity: Vec<ActnId> = cands.iter()
            .copied()
            .filter(|&c| self.table.actn(c).params.len() == args.len())
            .collect();

        let exact: Vec<_> = arity.iter()
            .copied()
            .filter(|&c| self.table.param_types(c) == args)
            .collect();
        if !exact.is_empty() {
            return self.narrow(name, args, exact, caller);
        }

        let assignable: Vec<_> = arity.into_iter()
            .filter(|&c| {
                self.table.param_types(c).iter()
                    .zip(args)
                    .all(|(&p, &a)| self.table.is_assignable(oracle, a, p))
            })
            .collect();
        if assignable.is_empty() {
            return Err(SemErr::NoCandidate(self.call_sig(name, args)));
        }
        self.narrow(name, args, assignable, caller)
    }

    fn narrow(&self, name: &str, args: &[TypeId], mut set: Vec<ActnId>, caller: TypeId) -> Result<ActnId, SemErr> {
        if let [only] = set[..] {
            return if accessible(&self.table, caller, only) {
                Ok(only)
            } else {
                Err(SemErr::Inaccessible(self.table.signature(only)))
            };
        }

        set.retain(|&c| accessible(&self.table, caller, c));
        match set[..] {
            [] => Err(SemErr::Inaccessible(self.call_sig(name, args))),
            [only] => Ok(only),
            _ => Err(SemErr::Ambiguous(self.call_sig(name, args))),
        }
    }

    /// Picks a constructor of `ty`.
    pub(super) fn pick_ctor(&mut self, ty: TypeId, args: &[TypeId], caller: TypeId) -> Result<ActnId, SemErr> {
        let ctors = self.ctors(ty)?;
        if ctors.is_empty() {
            return Err(SemErr::NotCallable(self.type_name(ty)));
        }
        self.select(&self.type_name(ty), &ctors, args, caller)
    }

    fn call_sig(&self, name: &str, args: &[TypeId]) -> String {
        let args: Vec<_> = args.iter().map(|&a| self.table.ty(a).name.as_str()).collect();
        format!("{name}({})", args.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Context;
    use crate::parser::parse;
    use crate::semantic::exec::{Exec, ValueKind};
    use crate::semantic::oracle::Library;
    use crate::semantic::{analyze, Analysis, SemErr};

    fn analyze_src(src: &str) -> Result<Analysis, SemErr> {
        let lib = Library::with_corlib();
        let mut ctx = Context::new(&lib);
        let root = parse(src, "test").unwrap();
        analyze(&mut ctx, std::slice::from_ref(&root)).map_err(|e| e.err)
    }

    /// The signature of the callee of the first statement of `main`.
    fn main_callee(a: &Analysis) -> String {
        let main = a.table.entry.unwrap();
        match &a.table.actn(main).body[0] {
            Exec::Call(c) => a.table.signature(c.actn),
            Exec::Eval(v) => match &v.kind {
                ValueKind::Call(c) => a.table.signature(c.actn),
                k => panic!("not a call: {k:?}"),
            },
            e => panic!("not a call: {e:?}"),
        }
    }

    #[test]
    fn arity_selects() {
        let a = analyze_src("
            fun f(a:int) end
            fun f(a:int, b:int) end
            fun main() f(1, 2) end
        ").unwrap();
        assert_eq!(main_callee(&a), "f(System.Int32, System.Int32)");

        let a = analyze_src("
            fun f(a:int) end
            fun f(a:int, b:int) end
            fun main() f(1) end
        ").unwrap();
        assert_eq!(main_callee(&a), "f(System.Int32)");
    }

    #[test]
    fn exact_beats_assignable() {
        let a = analyze_src("
            fun f(a:object) end
            fun f(a:string) end
            fun main() f(\"s\") end
        ").unwrap();
        assert_eq!(main_callee(&a), "f(System.String)");

        let a = analyze_src("
            fun f(a:object) end
            fun f(a:string) end
            fun main() f(1) end
        ").unwrap();
        assert_eq!(main_callee(&a), "f(System.Object)");
    }

    #[test]
    fn no_candidate_or_ambiguous() {
        assert_eq!(
            analyze_src("fun f(a:int) end fun main() f(true) end").err(),
            Some(SemErr::NoCandidate("f(System.Boolean)".to_string()))
        );
        assert_eq!(
            analyze_src("class A end fun f(a:A, b:object) end fun f(a:object, b:A) end fun main() f(A(), A()) end").err(),
            Some(SemErr::Ambiguous("f(A, A)".to_string()))
        );
    }

    #[test]
    fn accessibility() {
        let src = "
            class A
                pfun secret() end
                ffun guarded() end
                fun open() secret() end
            end
            class B extends A
                fun probe() guarded() end
            end
        ";
        assert!(analyze_src(src).is_ok());

        assert_eq!(
            analyze_src("class A pfun secret() end end fun main() a <- A() a.secret() end").err(),
            Some(SemErr::Inaccessible("secret()".to_string()))
        );
        assert_eq!(
            analyze_src("class A ffun guarded() end end fun main() a <- A() a.guarded() end").err(),
            Some(SemErr::Inaccessible("guarded()".to_string()))
        );
        assert_eq!(
            analyze_src("o <- object() o.MemberwiseClone()").err(),
            Some(SemErr::Inaccessible("MemberwiseClone()".to_string()))
        );
    }
}
