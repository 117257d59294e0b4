//! Lowers typed execution nodes to IR.
//!
//! Each statement and value knows how to emit itself through [`Emit`].
//! A value used as a statement is emitted, then popped.

use indexmap::IndexMap;

use crate::semantic::exec::{Call, Exec, Value, ValueKind};
use crate::semantic::symbols::{ActnId, SymbolTable, TypeKind};

use super::{Instr, Label};

/// Lowers the body of every user action, in declaration order.
pub fn lower(table: &SymbolTable) -> IndexMap<ActnId, Vec<Instr>> {
    let mut out = IndexMap::new();

    for actn in table.user_actns() {
        let mut gen = IrGen::new(table);
        gen.write_body(actn);
        log::debug!("lowered {} ({} instructions)", table.signature(actn), gen.out.len());
        out.insert(actn, gen.finish());
    }
    out
}

/// Appends the instructions of one body.
pub struct IrGen<'a> {
    table: &'a SymbolTable,
    out: Vec<Instr>,
}

impl<'a> IrGen<'a> {
    /// Creates a generator with an empty instruction list.
    pub fn new(table: &'a SymbolTable) -> Self {
        Self { table, out: vec![] }
    }

    /// Emits the body of an action.
    ///
    /// A void body that doesn't end in `Ret` gets one.
    pub fn write_body(&mut self, actn: ActnId) {
        let data = self.table.actn(actn);
        for e in &data.body {
            e.emit(self);
        }

        if data.ret.is_none() && self.out.last() != Some(&Instr::Ret) {
            self.push(Instr::Ret);
        }
    }

    /// Emits one node.
    pub fn write<E: Emit + ?Sized>(&mut self, e: &E) {
        e.emit(self);
    }

    /// The emitted instructions.
    pub fn finish(self) -> Vec<Instr> {
        self.out
    }

    fn push(&mut self, i: Instr) {
        self.out.push(i);
    }

    fn write_all(&mut self, execs: &[Exec]) {
        execs.iter().for_each(|e| e.emit(self));
    }

    fn write_call(&mut self, c: &Call) {
        if let Some(inst) = &c.inst {
            inst.emit(self);
        }
        c.args.iter().for_each(|a| a.emit(self));
        self.push(Instr::Call { actn: c.actn, virt: c.virt });
    }
}

/// Nodes that can be written into IR.
pub trait Emit {
    /// Appends the instructions of this node.
    fn emit(&self, gen: &mut IrGen);
}

impl Emit for Value {
    fn emit(&self, gen: &mut IrGen) {
        match &self.kind {
            ValueKind::Literal(l) => gen.push(Instr::LoadLiteral(l.clone())),
            ValueKind::Load(var, inst) => {
                if let Some(inst) = inst {
                    inst.emit(gen);
                }
                gen.push(Instr::LoadVar(*var));
            },
            ValueKind::Addr(var) => gen.push(Instr::LoadVarAddr(*var)),
            ValueKind::Spill(temp, v) => {
                v.emit(gen);
                gen.push(Instr::StoreVar(*temp));
                gen.push(Instr::LoadVarAddr(*temp));
            },
            ValueKind::Call(c) => gen.write_call(c),
            ValueKind::New(ctor, args) => {
                args.iter().for_each(|a| a.emit(gen));
                gen.push(Instr::NewObject(*ctor));
            },
            ValueKind::NewArray(elem, len) => {
                len.emit(gen);
                gen.push(Instr::NewArray(*elem));
            },
            ValueKind::LoadElem(array, index) => {
                array.emit(gen);
                index.emit(gen);
                gen.push(Instr::LoadElem(self.ty));
            },
            ValueKind::Calc(op, l, r) => {
                l.emit(gen);
                r.emit(gen);
                gen.push(Instr::BinOp(*op));
            },
            ValueKind::Neg(v) => {
                v.emit(gen);
                gen.push(Instr::Neg);
            },
            ValueKind::Not(v) => {
                v.emit(gen);
                gen.push(Instr::Not);
            },
            ValueKind::Box(v) => {
                v.emit(gen);
                gen.push(Instr::Box(v.ty));
            },
            ValueKind::Assigned(effects, v) => {
                gen.write_all(effects);
                v.emit(gen);
            },
        }
    }
}

impl Emit for Exec {
    fn emit(&self, gen: &mut IrGen) {
        match self {
            Exec::Eval(v) => {
                v.emit(gen);
                gen.push(Instr::Pop);
            },
            Exec::Call(c) => {
                gen.write_call(c);
                if c.ret.is_some() {
                    gen.push(Instr::Pop);
                }
            },
            Exec::Store { var, inst, value } => {
                if let Some(inst) = inst {
                    inst.emit(gen);
                }
                value.emit(gen);
                gen.push(Instr::StoreVar(*var));
            },
            Exec::StoreElem { array, index, value } => {
                let elem = match gen.table.ty(array.ty).kind {
                    TypeKind::Vector(e) => e,
                    _ => value.ty,
                };
                array.emit(gen);
                index.emit(gen);
                value.emit(gen);
                gen.push(Instr::StoreElem(elem));
            },
            Exec::If { id, arms, otherwise } => {
                let end = Label::endif(*id);

                for (k, arm) in arms.iter().enumerate() {
                    let has_next = k + 1 < arms.len() || otherwise.is_some();
                    let next = if has_next { Label::else_arm(*id, k) } else { end.clone() };

                    arm.cond.emit(gen);
                    gen.push(Instr::BrFalse(next.clone()));
                    gen.write_all(&arm.body);
                    if has_next {
                        gen.push(Instr::Br(end.clone()));
                        gen.push(Instr::PutLabel(next));
                    }
                }
                if let Some(body) = otherwise {
                    gen.write_all(body);
                }
                gen.push(Instr::PutLabel(end));
            },
            Exec::While { id, cond, body } => {
                let (start, end) = (Label::do_loop(*id), Label::endwhile(*id));

                gen.push(Instr::PutLabel(start.clone()));
                cond.emit(gen);
                gen.push(Instr::BrFalse(end.clone()));
                gen.write_all(body);
                gen.push(Instr::Br(start));
                gen.push(Instr::PutLabel(end));
            },
            Exec::Return(v) => {
                if let Some(v) = v {
                    v.emit(gen);
                }
                gen.push(Instr::Ret);
            },
            Exec::Break(id) => gen.push(Instr::Br(Label::endwhile(*id))),
            Exec::Continue(id) => gen.push(Instr::Br(Label::do_loop(*id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Context;
    use crate::parser::parse;
    use crate::semantic::analyze;
    use crate::semantic::exec::Literal;
    use crate::semantic::oracle::Library;
    use crate::semantic::symbols::SymbolTable;

    use super::*;

    fn lower_main(src: &str) -> (SymbolTable, ActnId, Vec<Instr>) {
        let lib = Library::with_corlib();
        let mut ctx = Context::new(&lib);
        let root = parse(src, "test").unwrap();
        let a = analyze(&mut ctx, std::slice::from_ref(&root)).unwrap();

        let main = a.table.entry.unwrap();
        let mut ir = lower(&a.table);
        let instrs = ir.swap_remove(&main).unwrap();
        (a.table, main, instrs)
    }

    /// Checks the stack never underflows and is empty at every `Ret`.
    fn assert_balanced(table: &SymbolTable, actn: ActnId, instrs: &[Instr]) {
        let mut depth = 0;
        for i in instrs {
            depth += i.stack_delta(table, actn);
            assert!(depth >= 0, "stack underflow at {i:?} in {instrs:?}");
            if *i == Instr::Ret {
                assert_eq!(depth, 0, "stack not empty at return in {instrs:?}");
            }
        }
    }

    #[test]
    fn statements_pop_values() {
        let (table, main, ir) = lower_main("fun main() 1 + 2 s <- \"a\" s.ToUpper() end");
        assert_eq!(ir[..4], [
            Instr::LoadLiteral(Literal::Int(1)),
            Instr::LoadLiteral(Literal::Int(2)),
            Instr::BinOp(crate::semantic::ops::BinOp::Add),
            Instr::Pop,
        ]);
        assert!(matches!(ir[ir.len() - 2], Instr::Pop));
        assert_eq!(ir.last(), Some(&Instr::Ret));
        assert_balanced(&table, main, &ir);
    }

    #[test]
    fn if_labels() {
        let (table, main, ir) = lower_main("
            fun main()
                a <- 1
                if a < 2 then a <- 2 elif a < 3 then a <- 3 else a <- 4 end
                if true then a <- 5 end
            end
        ");
        let labels: Vec<_> = ir.iter()
            .filter_map(|i| match i {
                Instr::PutLabel(l) => Some(l.to_string()),
                _ => None,
            })
            .collect();

        assert_eq!(labels.len(), 4);
        assert!(labels[0].starts_with("else_") && labels[0].ends_with("_0"));
        assert!(labels[1].starts_with("else_") && labels[1].ends_with("_1"));
        assert!(labels[2].starts_with("endif_"));
        assert!(labels[3].starts_with("endif_"));
        assert_ne!(labels[2], labels[3]);

        let mut sorted = labels.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), labels.len());
        assert_balanced(&table, main, &ir);
    }

    #[test]
    fn loops() {
        let (table, main, ir) = lower_main("
            fun main()
                i <- 0
                while i < 10 do
                    i <- i + 1
                    if i == 5 then continue end
                    if i == 8 then break end
                end
            end
        ");

        let Some(Instr::PutLabel(start)) = ir.get(2) else { panic!("{ir:?}") };
        assert!(start.as_str().starts_with("do_"));
        let n = &start.as_str()[3..];

        assert!(ir.contains(&Instr::BrFalse(Label(format!("endwhile_{n}")))));
        assert!(ir.contains(&Instr::Br(Label(format!("do_{n}")))));
        assert!(ir.contains(&Instr::Br(Label(format!("endwhile_{n}")))));
        assert!(ir.contains(&Instr::PutLabel(Label(format!("endwhile_{n}")))));
        assert_balanced(&table, main, &ir);
    }

    #[test]
    fn fields_and_receivers() {
        let (table, main, ir) = lower_main("
            class P
                x:int
                fun get():int return x end
            end
            fun main()
                p <- P()
                p.x <- 3
                n <- p.get()
                s <- n.ToString()
                t <- (n + 1).ToString()
            end
        ");

        assert!(matches!(ir[0], Instr::NewObject(_)));
        assert!(matches!(ir[2..5], [Instr::LoadVar(_), Instr::LoadLiteral(Literal::Int(3)), Instr::StoreVar(_)]));
        assert!(ir.iter().any(|i| matches!(i, Instr::LoadVarAddr(_))));
        assert!(ir.iter().any(|i| matches!(i, Instr::Call { virt: false, .. })));
        assert_balanced(&table, main, &ir);

        let get = table.ty(table.app_types["P"]).methods["get"][0];
        let gen_get = {
            let mut g = IrGen::new(&table);
            g.write_body(get);
            g.finish()
        };
        let this = table.actn(get).this.unwrap();
        assert_eq!(gen_get[0], Instr::LoadVar(this));
        assert!(matches!(gen_get[1..], [Instr::LoadVar(_), Instr::Ret]));
        assert_balanced(&table, get, &gen_get);
    }

    #[test]
    fn boxing() {
        let (table, main, ir) = lower_main("fun main() o:object <- 1 `p(o) end");
        assert!(matches!(ir[..3], [Instr::LoadLiteral(Literal::Int(1)), Instr::Box(_), Instr::StoreVar(_)]));
        assert_balanced(&table, main, &ir);
    }
}
