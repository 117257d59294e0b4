//! Resolution of the statements and expressions of a body.
//!
//! Each syntax node's group selects how it is resolved.
//! Expressions resolve to a [`Resolved`] first, since the same syntax can name
//! a value, a type, an overload set, or a namespace depending on what it refers to.

use crate::display::TreeDisplay;
use crate::err::VelaErr;
use crate::lexer::token::{Group, Token};
use crate::lexer::unescape_str;

use super::exec::{Arm, Call, Exec, Literal, Value, ValueKind};
use super::lookup::Found;
use super::ops::{resolve_binop, BinOp, OpImpl};
use super::overload::accessible;
use super::symbols::{ActnId, ScopeKind, TypeId, TypeKind, VarData, VarId, VarKind};
use super::{strip_end, Analyzer, Body, Resolution, SemErr, SemResult};

/// Whether this statement is an explicit base constructor call (`base(...)`).
pub(super) fn is_base_call(t: &Token) -> bool {
    t.group == Group::Call && t.first().is_some_and(|f| f.group == Group::Id && f.value == "base")
}

fn shown(t: &Token) -> String {
    TreeDisplay(t).to_string()
}

fn missing(t: &Token) -> super::FullSemErr {
    SemErr::Internal(format!("malformed '{}' node", t.value)).at(t.loc.clone())
}

/// Where an instance for a member comes from.
enum Recv {
    /// Accessed through a type (`System.Math.Abs`)
    Static,
    /// Accessed through a value (`s.Length`)
    Instance(Value),
    /// Accessed by bare name (`this` if the member needs one)
    Implicit,
}

/// What an expression refers to.
enum Resolved {
    Value(Value),
    Type(TypeId),
    Methods { name: String, cands: Vec<ActnId>, recv: Recv },
    Namespace(String),
    /// A name no scope defines (only meaningful as an assignment target)
    Unresolved(String),
}

/// The result of a call expression.
enum CallOut {
    Call(Call),
    New(Value),
}

impl Analyzer<'_, '_, '_> {
    /// Resolves a sequence of statements.
    ///
    /// In a function, `return` takes the statement after it as its value.
    pub(super) fn stmts<'a>(&mut self, cx: &mut Body, toks: impl IntoIterator<Item = &'a Token>) -> SemResult<Vec<Exec>> {
        let mut toks = toks.into_iter();
        let mut out = vec![];

        while let Some(t) = toks.next() {
            if t.group != Group::Return {
                out.extend(self.stmt(cx, t)?);
                continue;
            }

            match cx.actn.and_then(|a| self.table.actn(a).ret) {
                Some(ret) => {
                    let vt = toks.next().ok_or_else(|| SemErr::MissingReturnValue.at(t.loc.clone()))?;
                    let v = self.value(cx, vt)?;
                    let v = self.coerce(v, ret).map_err(|e| e.at(vt.loc.clone()))?;
                    out.push(Exec::Return(Some(v)));
                },
                None => out.push(Exec::Return(None)),
            }
        }

        Ok(out)
    }

    fn stmt(&mut self, cx: &mut Body, t: &Token) -> SemResult<Option<Exec>> {
        match t.group {
            Group::TypeSpec => {
                self.declare(cx, t)?;
                Ok(None)
            },
            Group::AssignLeft | Group::AssignRight => {
                let (target, source) = assign_sides(t)?;
                let v = self.value(cx, source)?;
                self.store(cx, target, v).map(Some)
            },
            Group::If => self.if_stmt(cx, t).map(Some),
            Group::While => self.while_stmt(cx, t).map(Some),
            Group::Id if t.value == "break" || t.value == "continue" => {
                let &id = cx.loops.last()
                    .ok_or_else(|| SemErr::NoLoop(t.value.clone()).at(t.loc.clone()))?;
                Ok(Some(if t.value == "break" { Exec::Break(id) } else { Exec::Continue(id) }))
            },
            Group::Call => match self.call(cx, t)? {
                CallOut::Call(c) => Ok(Some(Exec::Call(c))),
                CallOut::New(v) => Ok(Some(Exec::Eval(v))),
            },
            _ => self.value(cx, t).map(|v| Some(Exec::Eval(v))),
        }
    }

    /// Resolves an expression that must produce a value.
    fn value(&mut self, cx: &mut Body, t: &Token) -> SemResult<Value> {
        match self.resolve(cx, t)? {
            Resolved::Value(v) => Ok(v),
            Resolved::Unresolved(n) => Err(SemErr::Undefined(n).at(t.loc.clone())),
            Resolved::Type(_) | Resolved::Namespace(_) => Err(SemErr::NotAValue(shown(t)).at(t.loc.clone())),
            Resolved::Methods { name, .. } => Err(SemErr::NotAValue(name).at(t.loc.clone())),
        }
    }

    /// Resolves an expression that must name a type.
    pub(super) fn type_of(&mut self, cx: &mut Body, t: &Token) -> SemResult<TypeId> {
        match self.resolve(cx, t)? {
            Resolved::Type(ty) => Ok(ty),
            _ => Err(SemErr::NotAType(shown(t)).at(t.loc.clone())),
        }
    }

    fn resolve(&mut self, cx: &mut Body, t: &Token) -> SemResult<Resolved> {
        let here = |e: SemErr| e.at(t.loc.clone());

        match t.group {
            Group::Num => {
                let i: i32 = t.value.parse().map_err(|_| here(SemErr::BadLiteral(t.value.clone())))?;
                Ok(Resolved::Value(Value::new(self.b.int, ValueKind::Literal(Literal::Int(i)))))
            },
            Group::Str => {
                let s = unescape_str(&t.value);
                Ok(Resolved::Value(Value::new(self.b.string, ValueKind::Literal(Literal::Str(s)))))
            },
            Group::Bool => {
                let b = t.value == "true";
                Ok(Resolved::Value(Value::new(self.b.bool, ValueKind::Literal(Literal::Bool(b)))))
            },
            Group::Id => self.resolve_id(cx, t),
            Group::Dot => self.resolve_dot(cx, t),
            Group::Paren => {
                let inner = t.first().ok_or_else(|| here(SemErr::Misplaced(shown(t))))?;
                self.resolve(cx, inner)
            },
            Group::Call => match self.call(cx, t)? {
                CallOut::New(v) => Ok(Resolved::Value(v)),
                CallOut::Call(c) => match c.ret {
                    Some(ty) => Ok(Resolved::Value(Value::new(ty, ValueKind::Call(Box::new(c))))),
                    None => Err(here(SemErr::NotAValue(self.table.actn(c.actn).name.clone()))),
                },
            },
            Group::Bracket => self.resolve_bracket(cx, t),
            Group::Generic => self.resolve_generic(cx, t),
            Group::BinOp => self.binop(cx, t).map(Resolved::Value),
            Group::Unary => self.unary(cx, t).map(Resolved::Value),
            Group::AssignLeft | Group::AssignRight => self.assigned(cx, t).map(Resolved::Value),
            _ => Err(here(SemErr::Misplaced(t.value.clone()))),
        }
    }

    fn resolve_id(&mut self, cx: &mut Body, t: &Token) -> SemResult<Resolved> {
        let name = t.value.as_str();
        match name {
            "this" => return self.this(cx).map(Resolved::Value).map_err(|e| e.at(t.loc.clone())),
            "break" | "continue" | "base" => return Err(SemErr::Misplaced(t.value.clone()).at(t.loc.clone())),
            _ => {},
        }

        match self.lookup(cx, name).map_err(|e| e.at(t.loc.clone()))? {
            Some(found) => self.from_found(cx, t, found, Recv::Implicit),
            None => Ok(Resolved::Unresolved(name.to_string())),
        }
    }

    fn resolve_dot(&mut self, cx: &mut Body, t: &Token) -> SemResult<Resolved> {
        let here = |e: SemErr| e.at(t.loc.clone());
        let (Some(left), Some(right)) = (t.first(), t.second()) else { return Err(missing(t)) };
        if right.group != Group::Id {
            return Err(SemErr::Misplaced(shown(right)).at(right.loc.clone()));
        }
        let name = &right.value;

        match self.resolve(cx, left)? {
            Resolved::Namespace(ns) => {
                let full = format!("{ns}.{name}");
                let oracle = self.ctx.oracle();

                if let Some(ty) = self.table.intern_external(oracle, &full, &[]).map_err(here)? {
                    self.record(t, Resolution::Type(ty));
                    Ok(Resolved::Type(ty))
                } else if oracle.is_namespace(&full) {
                    self.record(t, Resolution::Namespace(full.clone()));
                    Ok(Resolved::Namespace(full))
                } else {
                    Err(here(SemErr::NotAMember(name.clone(), ns)))
                }
            },
            Resolved::Type(ty) => {
                let found = self.find_member(ty, name).map_err(here)?
                    .ok_or_else(|| here(SemErr::NotAMember(name.clone(), self.type_name(ty))))?;
                self.from_found(cx, t, found, Recv::Static)
            },
            Resolved::Value(v) => {
                let found = self.find_member(v.ty, name).map_err(here)?
                    .ok_or_else(|| here(SemErr::NotAMember(name.clone(), self.type_name(v.ty))))?;
                self.from_found(cx, t, found, Recv::Instance(v))
            },
            Resolved::Unresolved(n) => Err(SemErr::Undefined(n).at(left.loc.clone())),
            Resolved::Methods { name: m, .. } => Err(here(SemErr::NotAMember(name.clone(), m))),
        }
    }

    /// Turns a lookup result into what the expression refers to.
    fn from_found(&mut self, cx: &mut Body, t: &Token, found: Found, recv: Recv) -> SemResult<Resolved> {
        let here = |e: SemErr| e.at(t.loc.clone());

        match found {
            Found::Var(v) => {
                self.record(t, Resolution::Var(v));
                let inst = self.field_inst(cx, v, recv).map_err(here)?;
                Ok(Resolved::Value(Value::new(self.table.var(v).ty, ValueKind::Load(v, inst.map(Box::new)))))
            },
            Found::Prop(owner, name) => {
                let getter = self.table.ty(owner).props.get(&name)
                    .and_then(|p| p.get)
                    .ok_or_else(|| here(SemErr::NotAValue(name.clone())))?;
                if !accessible(&self.table, cx.owner, getter) {
                    return Err(here(SemErr::Inaccessible(name)));
                }

                self.record(t, Resolution::Actn(getter));
                let call = self.make_call(cx, getter, recv, vec![]).map_err(here)?;
                let ty = call.ret.ok_or_else(|| here(SemErr::NotAValue(name)))?;
                Ok(Resolved::Value(Value::new(ty, ValueKind::Call(Box::new(call)))))
            },
            Found::Methods(name, cands) => Ok(Resolved::Methods { name, cands, recv }),
            Found::Type(ty) => {
                self.record(t, Resolution::Type(ty));
                Ok(Resolved::Type(ty))
            },
            Found::Namespace(ns) => {
                self.record(t, Resolution::Namespace(ns.clone()));
                Ok(Resolved::Namespace(ns))
            },
        }
    }

    /// The `this` parameter of the current body.
    fn this(&self, cx: &Body) -> Result<Value, SemErr> {
        let this = cx.actn
            .filter(|_| !cx.is_static)
            .and_then(|a| self.table.actn(a).this)
            .ok_or_else(|| SemErr::Misplaced(String::from("this")))?;
        Ok(Value::new(cx.owner, ValueKind::Load(this, None)))
    }

    /// The instance a variable is read from, if it is an instance field.
    fn field_inst(&self, cx: &Body, v: VarId, recv: Recv) -> Result<Option<Value>, SemErr> {
        let var = self.table.var(v);
        match (var.is_instance_field(), recv) {
            (true, Recv::Instance(inst)) => Ok(Some(inst)),
            (true, Recv::Implicit) if !cx.is_static => self.this(cx).map(Some),
            (true, _) => Err(SemErr::NeedsInstance(var.name.clone())),
            (false, Recv::Instance(_)) => Err(SemErr::StaticViaInstance(var.name.clone())),
            (false, _) => Ok(None),
        }
    }

    fn call(&mut self, cx: &mut Body, t: &Token) -> SemResult<CallOut> {
        let callee = t.first().ok_or_else(|| missing(t))?;
        if is_base_call(t) {
            return Err(SemErr::Misplaced(String::from("base")).at(callee.loc.clone()));
        }
        let at_callee = |e: SemErr| e.at(callee.loc.clone());

        let mut args = vec![];
        for a in Token::comma_items(t.second()) {
            args.push(self.value(cx, a)?);
        }
        let arg_tys: Vec<_> = args.iter().map(|a| a.ty).collect();

        match self.resolve(cx, callee)? {
            Resolved::Methods { name, cands, recv } => {
                let actn = self.select(&name, &cands, &arg_tys, cx.owner).map_err(at_callee)?;
                self.record(t, Resolution::Actn(actn));
                let call = self.make_call(cx, actn, recv, args).map_err(at_callee)?;
                Ok(CallOut::Call(call))
            },
            Resolved::Type(ty) => {
                let ctor = self.pick_ctor(ty, &arg_tys, cx.owner).map_err(at_callee)?;
                self.record(t, Resolution::Actn(ctor));
                let args = self.coerce_args(ctor, args).map_err(at_callee)?;
                Ok(CallOut::New(Value::new(ty, ValueKind::New(ctor, args))))
            },
            Resolved::Unresolved(n) => Err(at_callee(SemErr::Undefined(n))),
            Resolved::Value(_) | Resolved::Namespace(_) => Err(at_callee(SemErr::NotCallable(shown(callee)))),
        }
    }

    /// Resolves `base(...)` at the start of a constructor.
    pub(super) fn base_call(&mut self, cx: &mut Body, t: &Token) -> SemResult<Exec> {
        let here = |e: SemErr| e.at(t.loc.clone());
        let base = self.table.ty(cx.owner).base.ok_or_else(|| missing(t))?;

        let mut args = vec![];
        for a in Token::comma_items(t.second()) {
            args.push(self.value(cx, a)?);
        }
        let arg_tys: Vec<_> = args.iter().map(|a| a.ty).collect();

        let ctor = self.pick_ctor(base, &arg_tys, cx.owner).map_err(here)?;
        self.record(t, Resolution::Actn(ctor));
        let args = self.coerce_args(ctor, args).map_err(here)?;
        let this = self.this(cx).map_err(here)?;

        Ok(Exec::Call(Call { actn: ctor, inst: Some(Box::new(this)), args, virt: false, ret: None }))
    }

    /// Builds a call, preparing its receiver and arguments.
    fn make_call(&mut self, cx: &mut Body, actn: ActnId, recv: Recv, args: Vec<Value>) -> Result<Call, SemErr> {
        let data = self.table.actn(actn);
        let (is_static, is_virtual, ret, owner) = (data.is_static, data.is_virtual, data.ret, data.owner);
        let name = data.name.clone();

        let inst = if is_static {
            if let Recv::Instance(_) = recv {
                return Err(SemErr::StaticViaInstance(name));
            }
            None
        } else {
            let v = match recv {
                Recv::Instance(v) => v,
                Recv::Implicit if !cx.is_static => self.this(cx)?,
                Recv::Implicit | Recv::Static => return Err(SemErr::NeedsInstance(name)),
            };
            Some(self.receiver(cx, owner, v)?)
        };

        let virt = is_virtual && inst.as_ref().is_some_and(|v| !self.table.ty(v.ty).is_value);
        let args = self.coerce_args(actn, args)?;
        Ok(Call { actn, inst: inst.map(Box::new), args, virt, ret })
    }

    /// Prepares the receiver of an instance call.
    ///
    /// A value-type receiver is passed by address to its own methods and boxed for
    /// methods of reference types.
    fn receiver(&mut self, cx: &mut Body, owner: TypeId, v: Value) -> Result<Value, SemErr> {
        if !self.table.ty(v.ty).is_value {
            return Ok(v);
        }
        if !self.table.ty(owner).is_value {
            return Ok(Value::new(owner, ValueKind::Box(Box::new(v))));
        }

        let addressable = match v.kind {
            ValueKind::Load(var, None) if self.table.var(var).kind != VarKind::This => Some(var),
            _ => None,
        };
        match addressable {
            Some(var) => Ok(Value::new(v.ty, ValueKind::Addr(var))),
            None => {
                let temp = self.temp(cx, v.ty)?;
                Ok(Value::new(v.ty, ValueKind::Spill(temp, Box::new(v))))
            },
        }
    }

    /// Creates a compiler temporary in the current body.
    fn temp(&mut self, cx: &Body, ty: TypeId) -> Result<VarId, SemErr> {
        let actn = cx.actn.ok_or_else(|| SemErr::Internal(String::from("temporary outside of a body")))?;
        let name = format!("<tmp{}>", self.ctx.next_id());
        let var = self.table.add_var(VarData { name, ty, kind: VarKind::Temp, loc: None });
        self.table.actn_mut(actn).locals.push(var);
        Ok(var)
    }

    fn coerce_args(&mut self, actn: ActnId, args: Vec<Value>) -> Result<Vec<Value>, SemErr> {
        let params = self.table.param_types(actn);
        args.into_iter()
            .zip(params)
            .map(|(a, p)| self.coerce(a, p))
            .collect()
    }

    /// Checks that a value fits where `to` is expected, boxing it if required.
    fn coerce(&self, v: Value, to: TypeId) -> Result<Value, SemErr> {
        if !self.table.is_assignable(self.ctx.oracle(), v.ty, to) {
            return Err(SemErr::Mismatch { expected: self.type_name(to), found: self.type_name(v.ty) });
        }

        if self.table.ty(v.ty).is_value && !self.table.ty(to).is_value {
            Ok(Value::new(to, ValueKind::Box(Box::new(v))))
        } else {
            Ok(v)
        }
    }

    /// Declares the variable of `name:Type`.
    fn declare(&mut self, cx: &mut Body, t: &Token) -> SemResult<VarId> {
        let (Some(name), Some(ty_tok)) = (t.first(), t.second()) else { return Err(missing(t)) };
        if name.group != Group::Id {
            return Err(SemErr::Misplaced(shown(t)).at(t.loc.clone()));
        }

        let ty = self.type_of(cx, ty_tok)?;
        self.declare_var(cx, name, ty)
    }

    /// Declares a variable in the current scope.
    ///
    /// At the top level of a source, this is a static field of the global type.
    fn declare_var(&mut self, cx: &mut Body, name_tok: &Token, ty: TypeId) -> SemResult<VarId> {
        let name = &name_tok.value;
        let here = |e: SemErr| e.at(name_tok.loc.clone());
        if matches!(name.as_str(), "this" | "base" | "break" | "continue") {
            return Err(here(SemErr::NotAssignable(name.clone())));
        }

        let var = if cx.globals == Some(cx.scope) {
            let global = self.table.global;
            if self.table.ty(global).fields.contains_key(name) {
                return Err(here(SemErr::Redeclared(name.clone())));
            }
            let var = self.table.add_var(VarData {
                name: name.clone(),
                ty,
                kind: VarKind::Field { owner: global, is_static: true },
                loc: Some(name_tok.loc.clone())
            });
            self.table.ty_mut(global).fields.insert(name.clone(), var);
            var
        } else {
            if self.table.scope(cx.scope).vars.contains_key(name) {
                return Err(here(SemErr::Redeclared(name.clone())));
            }
            let actn = cx.actn.ok_or_else(|| missing(name_tok))?;
            let var = self.table.add_var(VarData {
                name: name.clone(),
                ty,
                kind: VarKind::Local,
                loc: Some(name_tok.loc.clone())
            });
            self.table.scope_mut(cx.scope).vars.insert(name.clone(), var);
            self.table.actn_mut(actn).locals.push(var);
            var
        };

        self.record(name_tok, Resolution::Var(var));
        log::trace!("declared variable {name}");
        Ok(var)
    }

    /// Stores a value into an assignment target.
    fn store(&mut self, cx: &mut Body, target: &Token, value: Value) -> SemResult<Exec> {
        let here = |e: SemErr| e.at(target.loc.clone());

        match target.group {
            Group::TypeSpec => {
                let var = self.declare(cx, target)?;
                let value = self.coerce(value, self.table.var(var).ty).map_err(here)?;
                Ok(Exec::Store { var, inst: None, value })
            },
            Group::Id => {
                if matches!(target.value.as_str(), "this" | "base" | "break" | "continue") {
                    return Err(here(SemErr::NotAssignable(target.value.clone())));
                }
                match self.lookup(cx, &target.value).map_err(here)? {
                    Some(found) => self.store_found(cx, target, found, Recv::Implicit, value),
                    None => {
                        let var = self.declare_var(cx, target, value.ty)?;
                        Ok(Exec::Store { var, inst: None, value })
                    },
                }
            },
            Group::Dot => {
                let (Some(left), Some(right)) = (target.first(), target.second()) else { return Err(missing(target)) };
                let (ty, recv) = match self.resolve(cx, left)? {
                    Resolved::Type(ty) => (ty, Recv::Static),
                    Resolved::Value(v) => (v.ty, Recv::Instance(v)),
                    _ => return Err(here(SemErr::NotAssignable(shown(target)))),
                };
                let found = self.find_member(ty, &right.value).map_err(here)?
                    .ok_or_else(|| here(SemErr::NotAMember(right.value.clone(), self.type_name(ty))))?;
                self.store_found(cx, target, found, recv, value)
            },
            Group::Bracket => self.store_elem(cx, target, value),
            _ => Err(here(SemErr::NotAssignable(shown(target)))),
        }
    }

    fn store_found(&mut self, cx: &mut Body, t: &Token, found: Found, recv: Recv, value: Value) -> SemResult<Exec> {
        let here = |e: SemErr| e.at(t.loc.clone());

        match found {
            Found::Var(var) => {
                if self.table.var(var).kind == VarKind::This {
                    return Err(here(SemErr::NotAssignable(String::from("this"))));
                }
                self.record(t, Resolution::Var(var));
                let inst = self.field_inst(cx, var, recv).map_err(here)?;
                let value = self.coerce(value, self.table.var(var).ty).map_err(here)?;
                Ok(Exec::Store { var, inst, value })
            },
            Found::Prop(owner, name) => {
                let setter = self.table.ty(owner).props.get(&name)
                    .and_then(|p| p.set)
                    .ok_or_else(|| here(SemErr::NotAssignable(name.clone())))?;
                if !accessible(&self.table, cx.owner, setter) {
                    return Err(here(SemErr::Inaccessible(name)));
                }

                self.record(t, Resolution::Actn(setter));
                let call = self.make_call(cx, setter, recv, vec![value]).map_err(here)?;
                Ok(Exec::Call(call))
            },
            _ => Err(here(SemErr::NotAssignable(shown(t)))),
        }
    }

    fn store_elem(&mut self, cx: &mut Body, t: &Token, value: Value) -> SemResult<Exec> {
        let here = |e: SemErr| e.at(t.loc.clone());
        let base = t.first().ok_or_else(|| missing(t))?;
        let items = Token::comma_items(t.second());
        if items.is_empty() {
            return Err(here(SemErr::NotAssignable(shown(t))));
        }

        let array = self.value(cx, base)?;
        let idx = self.indices(cx, &items)?;

        match self.table.ty(array.ty).kind.clone() {
            TypeKind::Vector(elem) if idx.len() == 1 => {
                let value = self.coerce(value, elem).map_err(here)?;
                let index = idx.into_iter().next().ok_or_else(|| missing(t))?;
                Ok(Exec::StoreElem { array, index, value })
            },
            TypeKind::Array(_, rank) if idx.len() == rank => {
                let set = self.array_member(array.ty, "Set").map_err(here)?;
                self.record(t, Resolution::Actn(set));
                let mut args = idx;
                args.push(value);
                let call = self.make_call(cx, set, Recv::Instance(array), args).map_err(here)?;
                Ok(Exec::Call(call))
            },
            _ => Err(here(SemErr::BadIndex(self.type_name(array.ty)))),
        }
    }

    fn array_member(&self, ty: TypeId, name: &str) -> Result<ActnId, SemErr> {
        self.table.ty(ty).methods.get(name)
            .and_then(|m| m.first().copied())
            .ok_or_else(|| SemErr::Internal(format!("array type '{}' has no '{name}'", self.type_name(ty))))
    }

    /// An assignment used as a value: stores, then produces the stored value.
    ///
    /// The source is shared between the store and the result, through a temporary
    /// if computing it twice would be observable.
    fn assigned(&mut self, cx: &mut Body, t: &Token) -> SemResult<Value> {
        let (target, source) = assign_sides(t)?;
        let value = self.value(cx, source)?;

        let mut effects = vec![];
        let shared = if value.is_pure() {
            value
        } else {
            let ty = value.ty;
            let temp = self.temp(cx, ty).map_err(|e| e.at(source.loc.clone()))?;
            effects.push(Exec::Store { var: temp, inst: None, value });
            Value::new(ty, ValueKind::Load(temp, None))
        };

        effects.push(self.store(cx, target, shared.clone())?);
        Ok(Value::new(shared.ty, ValueKind::Assigned(effects, Box::new(shared))))
    }

    fn indices(&mut self, cx: &mut Body, items: &[&Token]) -> SemResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for &i in items {
            let v = self.value(cx, i)?;
            if v.ty != self.b.int {
                return Err(SemErr::Mismatch { expected: self.type_name(self.b.int), found: self.type_name(v.ty) }.at(i.loc.clone()));
            }
            out.push(v);
        }
        Ok(out)
    }

    /// `T[]` (vector type), `T[n]` / `T[n, m]` (instantiation), or `a[i]` / `a[i, j]` (element).
    fn resolve_bracket(&mut self, cx: &mut Body, t: &Token) -> SemResult<Resolved> {
        let here = |e: SemErr| e.at(t.loc.clone());
        let base = t.first().ok_or_else(|| missing(t))?;
        let items = Token::comma_items(t.second());

        match self.resolve(cx, base)? {
            Resolved::Type(elem) if items.is_empty() => {
                let ty = self.table.vector_of(elem, &self.b);
                self.record(t, Resolution::Type(ty));
                Ok(Resolved::Type(ty))
            },
            Resolved::Type(elem) => {
                let mut lens = self.indices(cx, &items)?;
                if lens.len() == 1 {
                    let ty = self.table.vector_of(elem, &self.b);
                    let len = lens.pop().ok_or_else(|| missing(t))?;
                    return Ok(Resolved::Value(Value::new(ty, ValueKind::NewArray(elem, Box::new(len)))));
                }

                let ty = self.table.array_of(elem, lens.len(), &self.b);
                let ctor = self.array_member(ty, ".ctor").map_err(here)?;
                self.record(t, Resolution::Actn(ctor));
                Ok(Resolved::Value(Value::new(ty, ValueKind::New(ctor, lens))))
            },
            Resolved::Value(Value { kind: ValueKind::NewArray(elem, len), .. }) if items.is_empty() => {
                let elem = self.table.vector_of(elem, &self.b);
                let ty = self.table.vector_of(elem, &self.b);
                Ok(Resolved::Value(Value::new(ty, ValueKind::NewArray(elem, len))))
            },
            Resolved::Value(array) if !items.is_empty() => {
                let mut idx = self.indices(cx, &items)?;

                match self.table.ty(array.ty).kind.clone() {
                    TypeKind::Vector(elem) if idx.len() == 1 => {
                        let index = idx.pop().ok_or_else(|| missing(t))?;
                        Ok(Resolved::Value(Value::new(elem, ValueKind::LoadElem(Box::new(array), Box::new(index)))))
                    },
                    TypeKind::Array(elem, rank) if idx.len() == rank => {
                        let get = self.array_member(array.ty, "Get").map_err(here)?;
                        self.record(t, Resolution::Actn(get));
                        let call = self.make_call(cx, get, Recv::Instance(array), idx).map_err(here)?;
                        Ok(Resolved::Value(Value::new(elem, ValueKind::Call(Box::new(call)))))
                    },
                    _ => Err(here(SemErr::BadIndex(self.type_name(array.ty)))),
                }
            },
            Resolved::Value(v) => Err(here(SemErr::BadIndex(self.type_name(v.ty)))),
            Resolved::Unresolved(n) => Err(SemErr::Undefined(n).at(base.loc.clone())),
            _ => Err(here(SemErr::Misplaced(shown(t)))),
        }
    }

    /// `Name{T1, T2}`: the library type ``Name`2`` with its parameters substituted.
    fn resolve_generic(&mut self, cx: &mut Body, t: &Token) -> SemResult<Resolved> {
        let here = |e: SemErr| e.at(t.loc.clone());
        let base = t.first().ok_or_else(|| missing(t))?;

        let mut args = vec![];
        for a in Token::comma_items(t.second()) {
            args.push(self.type_of(cx, a)?);
        }
        if args.is_empty() {
            return Err(here(SemErr::Misplaced(shown(t))));
        }
        let n = args.len();

        let ty = match (base.group, base.first(), base.second()) {
            (Group::Id, ..) => {
                let source = self.source_of(cx.scope);
                self.find_oracle_type(&format!("{}`{n}", base.value), &args, source).map_err(here)?
            },
            (Group::Dot, Some(left), Some(right)) => match self.resolve(cx, left)? {
                Resolved::Namespace(ns) => {
                    let full = format!("{ns}.{}`{n}", right.value);
                    self.table.intern_external(self.ctx.oracle(), &full, &args).map_err(here)?
                },
                _ => None,
            },
            _ => None,
        };

        let ty = ty.ok_or_else(|| SemErr::NotAType(shown(base)).at(base.loc.clone()))?;
        self.record(t, Resolution::Type(ty));
        Ok(Resolved::Type(ty))
    }

    fn binop(&mut self, cx: &mut Body, t: &Token) -> SemResult<Value> {
        let (Some(l), Some(r)) = (t.first(), t.second()) else { return Err(missing(t)) };
        let op = BinOp::from_token(&t.value).ok_or_else(|| missing(t))?;
        let lv = self.value(cx, l)?;
        let rv = self.value(cx, r)?;
        let here = |e: SemErr| e.at(t.loc.clone());

        match resolve_binop(&self.b, op, lv.ty, rv.ty) {
            Some(OpImpl::Native(op, ty)) => Ok(Value::new(ty, ValueKind::Calc(op, Box::new(lv), Box::new(rv)))),
            Some(OpImpl::Concat) => {
                let string = self.b.string;
                let cands = self.collect_methods(string, "Concat").map_err(here)?;
                let concat = self.select("Concat", &cands, &[string, string], cx.owner).map_err(here)?;
                self.record(t, Resolution::Actn(concat));
                let call = self.make_call(cx, concat, Recv::Static, vec![lv, rv]).map_err(here)?;
                Ok(Value::new(string, ValueKind::Call(Box::new(call))))
            },
            None => Err(here(SemErr::BadOperands(op.to_string(), self.type_name(lv.ty), self.type_name(rv.ty)))),
        }
    }

    fn unary(&mut self, cx: &mut Body, t: &Token) -> SemResult<Value> {
        let operand = t.first().ok_or_else(|| missing(t))?;
        let v = self.value(cx, operand)?;

        match t.value.as_str() {
            "-" if v.ty == self.b.int => Ok(Value::new(v.ty, ValueKind::Neg(Box::new(v)))),
            "!" if v.ty == self.b.bool => Ok(Value::new(v.ty, ValueKind::Not(Box::new(v)))),
            _ => Err(SemErr::BadOperand(t.value.clone(), self.type_name(v.ty)).at(t.loc.clone())),
        }
    }

    fn condition(&mut self, cx: &mut Body, t: &Token) -> SemResult<Value> {
        let v = self.value(cx, t)?;
        if v.ty != self.b.bool {
            return Err(SemErr::Mismatch { expected: self.type_name(self.b.bool), found: self.type_name(v.ty) }.at(t.loc.clone()));
        }
        Ok(v)
    }

    /// Resolves statements in a new block scope.
    fn block(&mut self, cx: &mut Body, toks: &[Token]) -> SemResult<Vec<Exec>> {
        let outer = cx.scope;
        cx.scope = self.table.add_scope(ScopeKind::Block, Some(outer));
        let result = self.stmts(cx, toks);
        cx.scope = outer;
        result
    }

    fn arm(&mut self, cx: &mut Body, cond: Option<&Token>, then: Option<&Token>, parent: &Token) -> SemResult<Arm> {
        let (Some(cond), Some(then)) = (cond, then) else { return Err(missing(parent)) };
        let cond = self.condition(cx, cond)?;
        let body = self.block(cx, &then.follows)?;
        Ok(Arm { cond, body })
    }

    fn if_stmt(&mut self, cx: &mut Body, t: &Token) -> SemResult<Exec> {
        let id = self.ctx.next_id();
        let follows = strip_end(&t.follows);

        let mut arms = vec![self.arm(cx, follows.first(), follows.get(1), t)?];
        let mut otherwise = None;
        for clause in follows.iter().skip(2) {
            match clause.group {
                Group::Elif => arms.push(self.arm(cx, clause.follows.first(), clause.follows.get(1), clause)?),
                Group::Else => otherwise = Some(self.block(cx, &clause.follows)?),
                _ => return Err(SemErr::Misplaced(clause.value.clone()).at(clause.loc.clone())),
            }
        }

        Ok(Exec::If { id, arms, otherwise })
    }

    fn while_stmt(&mut self, cx: &mut Body, t: &Token) -> SemResult<Exec> {
        let id = self.ctx.next_id();
        let follows = strip_end(&t.follows);
        let (Some(cond), Some(body)) = (follows.first(), follows.get(1)) else { return Err(missing(t)) };

        let cond = self.condition(cx, cond)?;
        cx.loops.push(id);
        let body = self.block(cx, &body.follows);
        cx.loops.pop();

        Ok(Exec::While { id, cond, body: body? })
    }
}

/// The (target, source) of an assignment in either direction.
fn assign_sides(t: &Token) -> SemResult<(&Token, &Token)> {
    let (Some(l), Some(r)) = (t.first(), t.second()) else { return Err(missing(t)) };
    match t.group {
        Group::AssignRight => Ok((r, l)),
        _ => Ok((l, r)),
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::Context;
    use crate::parser::parse;
    use crate::semantic::exec::{Exec, Literal, ValueKind};
    use crate::semantic::oracle::Library;
    use crate::semantic::symbols::VarKind;
    use crate::semantic::{analyze, Analysis, SemErr};

    fn analyze_src(src: &str) -> Result<Analysis, SemErr> {
        let lib = Library::with_corlib();
        let mut ctx = Context::new(&lib);
        let root = parse(src, "test").unwrap();
        analyze(&mut ctx, std::slice::from_ref(&root)).map_err(|e| e.err)
    }

    fn body_of<'a>(a: &'a Analysis, ty: &str, name: &str) -> &'a [Exec] {
        let owner = if ty.is_empty() { a.table.global } else { a.table.app_types[ty] };
        let actn = a.table.ty(owner).methods[name][0];
        &a.table.actn(actn).body
    }

    #[test]
    fn locals_and_redeclaration() {
        let a = analyze_src("fun main() a:int a <- 2 b <- a end").unwrap();
        let main = a.table.entry.unwrap();
        let locals: Vec<_> = a.table.actn(main).locals.iter().map(|&v| a.table.var(v).name.as_str()).collect();
        assert_eq!(locals, ["a", "b"]);

        assert_eq!(analyze_src("fun main() a:int a:int end").err(), Some(SemErr::Redeclared("a".to_string())));
        assert_eq!(analyze_src("a:int a:string").err(), Some(SemErr::Redeclared("a".to_string())));
        assert!(analyze_src("fun main() a:int if true then a:int end end").is_ok());
    }

    #[test]
    fn type_checks() {
        let mismatch = |e: &str, f: &str| Some(SemErr::Mismatch { expected: e.to_string(), found: f.to_string() });

        assert_eq!(analyze_src("a:int <- \"s\"").err(), mismatch("System.Int32", "System.String"));
        assert_eq!(analyze_src("if 1 then end").err(), mismatch("System.Boolean", "System.Int32"));
        assert_eq!(analyze_src("while \"s\" do end").err(), mismatch("System.Boolean", "System.String"));
        assert_eq!(analyze_src("a <- int[true]").err(), mismatch("System.Int32", "System.Boolean"));
        assert_eq!(analyze_src("fun f():int return true end").err(), mismatch("System.Int32", "System.Boolean"));
        assert_eq!(
            analyze_src("a <- true + false").err(),
            Some(SemErr::BadOperands("+".to_string(), "System.Boolean".to_string(), "System.Boolean".to_string()))
        );
        assert_eq!(
            analyze_src("a <- -true").err(),
            Some(SemErr::BadOperand("-".to_string(), "System.Boolean".to_string()))
        );
    }

    #[test]
    fn name_errors() {
        assert_eq!(analyze_src("a <- b").err(), Some(SemErr::Undefined("b".to_string())));
        assert_eq!(analyze_src("break").err(), Some(SemErr::NoLoop("break".to_string())));
        assert_eq!(analyze_src("a <- this").err(), Some(SemErr::Misplaced("this".to_string())));
        assert_eq!(analyze_src("fun f() end a <- f()").err(), Some(SemErr::NotAValue("f".to_string())));
        assert_eq!(analyze_src("a <- 1 a()").err(), Some(SemErr::NotCallable("a".to_string())));
        assert_eq!(
            analyze_src("a <- \"s\" a.Nope").err(),
            Some(SemErr::NotAMember("Nope".to_string(), "System.String".to_string()))
        );
        assert!(analyze_src("fun f() return end fun main() return end").is_ok());
        assert_eq!(analyze_src("fun f():int return end").err(), Some(SemErr::MissingReturnValue));
        assert_eq!(analyze_src("fun f() class A end end").err(), Some(SemErr::Misplaced("class".to_string())));
        assert_eq!(
            analyze_src("class A x:int sfun f():int return x end end").err(),
            Some(SemErr::NeedsInstance("x".to_string()))
        );
    }

    #[test]
    fn strings_concatenate() {
        let a = analyze_src("s <- \"a\" + \"b\"").unwrap();
        let Exec::Store { value, .. } = &body_of(&a, "", ".cctor")[0] else { panic!() };
        let ValueKind::Call(call) = &value.kind else { panic!("{value:?}") };
        assert_eq!(a.table.signature(call.actn), "Concat(System.String, System.String)");
        assert!(call.inst.is_none());
    }

    #[test]
    fn properties_and_fields() {
        let a = analyze_src("
            class P
                x:int
                fun get():int return x end
                fun set(v:int) x <- v this.x <- v end
            end
            using System.Text
            sb <- StringBuilder()
            sb.Capacity <- 10
            n <- sb.Capacity
        ").unwrap();

        let get = body_of(&a, "P", "get");
        let Exec::Return(Some(v)) = &get[0] else { panic!() };
        let ValueKind::Load(field, Some(inst)) = &v.kind else { panic!("{v:?}") };
        assert_eq!(a.table.var(*field).name, "x");
        assert!(matches!(inst.kind, ValueKind::Load(this, None) if a.table.var(this).kind == VarKind::This));

        let set = body_of(&a, "P", "set");
        assert!(matches!(&set[0], Exec::Store { inst: Some(_), .. }));
        assert!(matches!(&set[1], Exec::Store { inst: Some(_), .. }));

        let top = body_of(&a, "", ".cctor");
        let Exec::Call(setter) = &top[1] else { panic!("{:?}", top[1]) };
        assert_eq!(a.table.actn(setter.actn).name, "set_Capacity");
        let Exec::Store { value, .. } = &top[2] else { panic!() };
        let ValueKind::Call(getter) = &value.kind else { panic!() };
        assert_eq!(a.table.actn(getter.actn).name, "get_Capacity");
    }

    #[test]
    fn value_type_receivers() {
        let a = analyze_src("fun main() j <- 1 s <- j.ToString() t <- (1 + 2).ToString() e <- j.Equals(j) end").unwrap();
        let main = a.table.entry.unwrap();
        let body = &a.table.actn(main).body;

        let receiver = |n: usize| {
            let Exec::Store { value, .. } = &body[n] else { panic!() };
            let ValueKind::Call(c) = &value.kind else { panic!() };
            c.inst.as_deref().cloned().unwrap().kind
        };
        assert!(matches!(receiver(1), ValueKind::Addr(_)));
        assert!(matches!(receiver(2), ValueKind::Spill(..)));
        assert!(matches!(receiver(3), ValueKind::Box(_)));

        let Exec::Store { value, .. } = &body[3] else { panic!() };
        let ValueKind::Call(c) = &value.kind else { panic!() };
        assert!(c.virt);
        assert!(matches!(c.args[0].kind, ValueKind::Box(_)));
    }

    #[test]
    fn arrays() {
        let a = analyze_src("fun main() a:int[] <- int[3] a[0] <- 5 b <- a[0] end").unwrap();
        let main = a.table.entry.unwrap();
        let body = &a.table.actn(main).body;
        let int = a.builtins.int;

        let Exec::Store { value, .. } = &body[0] else { panic!() };
        assert!(matches!(&value.kind, ValueKind::NewArray(e, len) if *e == int && len.kind == ValueKind::Literal(Literal::Int(3))));

        assert!(matches!(&body[1], Exec::StoreElem { index, value, .. }
            if index.kind == ValueKind::Literal(Literal::Int(0)) && value.kind == ValueKind::Literal(Literal::Int(5))));

        let Exec::Store { value, .. } = &body[2] else { panic!() };
        assert!(matches!(value.kind, ValueKind::LoadElem(..)));
        assert_eq!(value.ty, int);
    }

    #[test]
    fn rectangular_and_jagged() {
        let a = analyze_src("fun main() m <- int[2, 3] m[1, 2] <- 4 x <- m[1, 2] j <- int[2][] end").unwrap();
        let main = a.table.entry.unwrap();
        let body = &a.table.actn(main).body;

        let Exec::Store { var, .. } = &body[0] else { panic!() };
        assert_eq!(a.table.ty(a.table.var(*var).ty).name, "System.Int32[,]");

        let Exec::Call(set) = &body[1] else { panic!() };
        assert_eq!(a.table.actn(set.actn).name, "Set");
        assert_eq!(set.args.len(), 3);

        let Exec::Store { value, .. } = &body[2] else { panic!() };
        assert_eq!(value.ty, a.builtins.int);

        let Exec::Store { var, .. } = &body[3] else { panic!() };
        assert_eq!(a.table.ty(a.table.var(*var).ty).name, "System.Int32[][]");

        assert_eq!(
            analyze_src("a <- int[2] a[1, 1] <- 3").err(),
            Some(SemErr::BadIndex("System.Int32[]".to_string()))
        );
    }

    #[test]
    fn chained_assignment() {
        let a = analyze_src("fun main() b <- a <- 1 d <- c <- int[2] end").unwrap();
        let main = a.table.entry.unwrap();
        let data = a.table.actn(main);

        let Exec::Store { value, .. } = &data.body[0] else { panic!() };
        let ValueKind::Assigned(effects, shared) = &value.kind else { panic!() };
        assert_eq!(effects.len(), 1);
        assert_eq!(shared.kind, ValueKind::Literal(Literal::Int(1)));

        let Exec::Store { value, .. } = &data.body[1] else { panic!() };
        let ValueKind::Assigned(effects, shared) = &value.kind else { panic!() };
        assert_eq!(effects.len(), 2);
        let ValueKind::Load(temp, None) = shared.kind else { panic!() };
        assert_eq!(a.table.var(temp).kind, VarKind::Temp);
        assert!(data.locals.contains(&temp));
    }

    #[test]
    fn generics() {
        let a = analyze_src("
            using System.Collections.Generic
            l <- List{int}()
            l.Add(1)
            d <- System.Collections.Generic.Dictionary{string, int}()
            d.Add(\"k\", 2)
        ").unwrap();

        let fields: Vec<_> = a.table.ty(a.table.global).fields.values()
            .map(|&v| a.table.ty(a.table.var(v).ty).name.as_str())
            .collect();
        assert_eq!(fields, [
            "System.Collections.Generic.List`1<System.Int32>",
            "System.Collections.Generic.Dictionary`2<System.String,System.Int32>",
        ]);

        assert_eq!(
            analyze_src("l <- List{int}()").err(),
            Some(SemErr::NotAType("List".to_string()))
        );
    }

    #[test]
    fn constructors() {
        let a = analyze_src("
            class A
                n:int
                fun new(n:int) this.n <- n end
            end
            class B extends A
                fun new() base(3) end
            end
            class C extends A end
        ");
        assert_eq!(a.err(), Some(SemErr::NoCandidate("A()".to_string())));

        let a = analyze_src("
            class A fun new(n:int) end fun new() end end
            class B extends A fun new() base(3) end end
            class C extends A end
            c <- C()
        ").unwrap();
        let b_ctor = a.table.ty(a.table.app_types["B"]).methods[".ctor"][0];
        let Exec::Call(base) = &a.table.actn(b_ctor).body[0] else { panic!() };
        assert_eq!(a.table.signature(base.actn), ".ctor(System.Int32)");
        assert!(a.table.actn(b_ctor).explicit_base);

        let c_ctor = a.table.ty(a.table.app_types["C"]).methods[".ctor"][0];
        let Exec::Call(base) = &a.table.actn(c_ctor).body[0] else { panic!() };
        assert_eq!(a.table.signature(base.actn), ".ctor()");

        assert_eq!(
            analyze_src("fun main() base() end").err(),
            Some(SemErr::Misplaced("base".to_string()))
        );
    }
}
