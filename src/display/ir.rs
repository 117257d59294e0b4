use std::fmt::{Display, Formatter};

use indexmap::IndexMap;

use crate::ir::Instr;
use crate::semantic::symbols::{ActnId, SymbolTable, TypeId, VarId, VarKind};

use super::fmt_list;

/// Renders one instruction, naming its operands through the symbol table.
pub struct InstrDisplay<'a>(pub &'a SymbolTable, pub &'a Instr);

/// Renders the IR of every action, one `.method` block each.
pub struct IrListing<'a> {
    /// Symbols the IR refers to
    pub table: &'a SymbolTable,
    /// IR per action
    pub ir: &'a IndexMap<ActnId, Vec<Instr>>,
}

struct VarName<'a>(&'a SymbolTable, VarId);
impl Display for VarName<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let var = self.0.var(self.1);
        match var.kind {
            VarKind::Field { owner, .. } => write!(f, "{}::{}", self.0.ty(owner).name, var.name),
            _ => write!(f, "{}", var.name),
        }
    }
}

struct ActnName<'a>(&'a SymbolTable, ActnId);
impl Display for ActnName<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let owner = self.0.actn(self.1).owner;
        write!(f, "{}::{}", self.0.ty(owner).name, self.0.signature(self.1))
    }
}

impl Display for InstrDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let InstrDisplay(table, instr) = *self;
        let ty = move |t: TypeId| table.ty(t).name.as_str();

        match instr {
            Instr::Br(l)           => write!(f, "br {l}"),
            Instr::BrFalse(l)      => write!(f, "brfalse {l}"),
            Instr::PutLabel(l)     => write!(f, "{l}:"),
            Instr::Pop             => write!(f, "pop"),
            Instr::Ret             => write!(f, "ret"),
            Instr::LoadLiteral(l)  => write!(f, "ldlit {l}"),
            Instr::LoadVar(v)      => write!(f, "ldvar {}", VarName(table, *v)),
            Instr::LoadVarAddr(v)  => write!(f, "ldvara {}", VarName(table, *v)),
            Instr::StoreVar(v)     => write!(f, "stvar {}", VarName(table, *v)),
            Instr::NewArray(t)     => write!(f, "newarr {}", ty(*t)),
            Instr::LoadElem(t)     => write!(f, "ldelem {}", ty(*t)),
            Instr::StoreElem(t)    => write!(f, "stelem {}", ty(*t)),
            Instr::NewObject(a)    => write!(f, "newobj {}", ActnName(table, *a)),
            Instr::Call { actn, virt: false } => write!(f, "call {}", ActnName(table, *actn)),
            Instr::Call { actn, virt: true }  => write!(f, "callvirt {}", ActnName(table, *actn)),
            Instr::BinOp(op)       => write!(f, "{}", format!("{op:?}").to_lowercase()),
            Instr::Neg             => write!(f, "neg"),
            Instr::Not             => write!(f, "not"),
            Instr::Box(t)          => write!(f, "box {}", ty(*t)),
        }
    }
}

impl Display for IrListing<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let table = self.table;

        for (&actn, instrs) in self.ir {
            let data = table.actn(actn);
            let modifier = if data.is_static { "static " } else { "" };
            write!(f, ".method {modifier}{}", ActnName(table, actn))?;
            if let Some(r) = data.ret {
                write!(f, " : {}", table.ty(r).name)?;
            }
            writeln!(f)?;

            if !data.locals.is_empty() {
                let locals: Vec<_> = data.locals.iter()
                    .map(|&v| format!("{}:{}", table.var(v).name, table.ty(table.var(v).ty).name))
                    .collect();
                write!(f, "    .locals (")?;
                fmt_list(f, &locals)?;
                writeln!(f, ")")?;
            }

            for i in instrs {
                match i {
                    Instr::PutLabel(_) => writeln!(f, "  {}", InstrDisplay(table, i))?,
                    _ => writeln!(f, "    {}", InstrDisplay(table, i))?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Context;
    use crate::ir::gen::lower;
    use crate::parser::parse;
    use crate::semantic::analyze;
    use crate::semantic::oracle::Library;

    use super::*;

    #[test]
    fn hello_listing() {
        let lib = Library::with_corlib();
        let mut ctx = Context::new(&lib);
        let root = parse("`p(\"Hello, World!\")", "test").unwrap();
        let a = analyze(&mut ctx, std::slice::from_ref(&root)).unwrap();
        let ir = lower(&a.table);

        let listing = IrListing { table: &a.table, ir: &ir }.to_string();
        assert!(listing.contains(".method static <global>::.cctor()\n    ldlit \"Hello, World!\"\n    call System.Console::WriteLine(System.String)\n    ret\n"));
        assert!(listing.contains(".method static <global>::main()\n    ret\n"));
    }
}
