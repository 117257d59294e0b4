//! The prefix grammar table.
//!
//! Sentences (the keyword-led constructs like `if` or `class`) are described with a compact
//! notation, one production per line:
//!
//! ```text
//! head[suffix] [synonym.s[@N] ...] follow[suffix] ... [-- Name0 Name1 ...]
//! ```
//!
//! Each item may carry a suffix `.` + multiplicity (`1`, `?`, `*`) + kind
//! (`v` literal value, `g` lexical group, `r` reference to a fragment, `s` synonym of the head),
//! and `@N`, which names the role ([`Group`]) the matched token takes from the `--` list.
//! `_(` and `_)` enclose the clauses that follow the item right before them.
//! `Expr` is an embedded expression. A line whose head has kind `r` is a fragment:
//! it is not a sentence, and it is inlined wherever it is referenced.
//!
//! Every clause memoizes the set of tokens that terminate it ([`PrefixDef::ends`]),
//! so repeated expression clauses know when to stop.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;

use crate::lexer::token::{Group, Token};

/// The grammar of the language.
pub const VELA_GRAMMAR: &str = "
Branch.r Expr then@0 _( Expr.* _) -- Then
using@0 Expr -- Using
class@0 Id.g extends.?@1 _( Expr _) Expr.* end -- Class Extends
fun@0 sfun.s@1 vfun.s@2 pfun.s@3 ffun.s@4 Expr Expr.* end -- Fun StaticFun VirtualFun PrivateFun FamilyFun
if@0 Branch.r elif.*@1 _( Branch.r _) else.?@2 _( Expr.* _) end -- If Elif Else
while@0 Expr do@1 _( Expr.* _) end -- While Do
";

/// The compiled grammar of the language.
pub static GRAMMAR: Lazy<Grammar> = Lazy::new(|| Grammar::compile(VELA_GRAMMAR));

/// How many times a clause may occur.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mult {
    /// Exactly once (`.1`)
    One,
    /// Zero or one time (`.?`)
    Optional,
    /// Any number of times (`.*`)
    Many
}

/// What a clause matches.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DefKind {
    /// A token with this exact text
    Value,
    /// Any non-reserved token of this lexical group
    Group(Group),
    /// An embedded expression
    Expr,
    /// A fragment, inlined at compilation
    Ref,
}

/// A node of the compiled prefix grammar.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PrefixDef {
    /// Text of the clause.
    pub value: String,
    /// What the clause matches.
    pub kind: DefKind,
    /// How often it may occur.
    pub mult: Mult,
    /// Role given to the matched token.
    pub group: Option<Group>,
    /// Clauses following the matched token, parsed as its children.
    pub follows: Vec<PrefixDef>,
    /// Tokens which terminate this clause.
    pub ends: IndexSet<String>,
}

/// The prefix grammar table: every sentence, addressable by its head (or synonym).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Grammar {
    sentences: Vec<PrefixDef>,
    heads: HashMap<String, (usize, Option<Group>)>,
    reserved: IndexSet<String>,
}

/// Splits `value.suffix@N`.
///
/// Panics on malformed notation.
fn parse_item(item: &str, names: &[Group], lno: usize) -> PrefixDef {
    let (body, group) = match item.rsplit_once('@') {
        Some((body, n)) => {
            let idx: usize = n.parse()
                .unwrap_or_else(|_| panic!("grammar line {lno}: bad group index in {item:?}"));
            let group = *names.get(idx)
                .unwrap_or_else(|| panic!("grammar line {lno}: no group #{idx} for {item:?}"));
            (body, Some(group))
        },
        None => (item, None),
    };

    let (value, suffix) = body.split_once('.').unwrap_or((body, ""));
    let mut chars = suffix.chars().peekable();

    let mult = match chars.peek() {
        Some('1') => { chars.next(); Mult::One },
        Some('?') => { chars.next(); Mult::Optional },
        Some('*') => { chars.next(); Mult::Many },
        _ => Mult::One,
    };
    let kind = match chars.next() {
        None | Some('v') if value == "Expr" => DefKind::Expr,
        None | Some('v') => DefKind::Value,
        Some('g') => DefKind::Group(value.parse()
            .unwrap_or_else(|_| panic!("grammar line {lno}: unknown group {value:?}"))),
        Some('r') => DefKind::Ref,
        // synonyms are pulled out before they become clauses
        Some('s') => DefKind::Value,
        Some(c) => panic!("grammar line {lno}: unknown clause kind {c:?} in {item:?}"),
    };
    assert!(chars.next().is_none(), "grammar line {lno}: trailing suffix in {item:?}");

    PrefixDef {
        value: value.to_string(),
        kind,
        mult,
        group,
        follows: vec![],
        ends: IndexSet::new(),
    }
}

/// A production as written, before fragments are inlined.
struct Production {
    head: PrefixDef,
    synonyms: Vec<(String, Option<Group>)>,
}

fn parse_line(line: &str, lno: usize) -> Production {
    let (body, names) = match line.split_once(" -- ") {
        Some((body, names)) => {
            let names: Vec<Group> = names.split_whitespace()
                .map(|n| n.parse().unwrap_or_else(|_| panic!("grammar line {lno}: unknown group {n:?}")))
                .collect();
            (body, names)
        },
        None => (line, vec![]),
    };

    let mut items = body.split_whitespace();
    let head_item = items.next()
        .unwrap_or_else(|| panic!("grammar line {lno}: empty production"));
    let mut head = parse_item(head_item, &names, lno);

    let mut synonyms = vec![];
    let mut stack: Vec<Vec<PrefixDef>> = vec![vec![]];
    for item in items {
        match item {
            "_(" => stack.push(vec![]),
            "_)" => {
                let children = stack.pop()
                    .filter(|_| !stack.is_empty())
                    .unwrap_or_else(|| panic!("grammar line {lno}: unbalanced _)"));
                let parent = stack.last_mut()
                    .and_then(|clauses| clauses.last_mut())
                    .unwrap_or_else(|| panic!("grammar line {lno}: _( without a clause"));
                parent.follows = children;
            },
            _ if item.contains(".s") => {
                let syn = parse_item(item, &names, lno);
                synonyms.push((syn.value, syn.group));
            },
            _ => {
                let clause = parse_item(item, &names, lno);
                stack.last_mut()
                    .unwrap_or_else(|| panic!("grammar line {lno}: unbalanced _)"))
                    .push(clause);
            }
        }
    }
    assert_eq!(stack.len(), 1, "grammar line {lno}: unclosed _(");

    head.follows = stack.pop().unwrap_or_default();
    Production { head, synonyms }
}

/// Replaces fragment references with the fragment's clauses.
fn inline_refs(defs: Vec<PrefixDef>, fragments: &IndexMap<String, Vec<PrefixDef>>, depth: usize) -> Vec<PrefixDef> {
    assert!(depth < 32, "grammar fragments reference each other cyclically");

    let mut out = vec![];
    for mut def in defs {
        if def.kind == DefKind::Ref {
            assert_eq!(def.mult, Mult::One, "fragment {:?} must be referenced exactly once", def.value);
            let body = fragments.get(&def.value)
                .unwrap_or_else(|| panic!("unknown grammar fragment {:?}", def.value))
                .clone();
            out.extend(inline_refs(body, fragments, depth + 1));
        } else {
            def.follows = inline_refs(def.follows, fragments, depth);
            out.push(def);
        }
    }
    out
}

/// Computes the terminator set of every clause of a list.
///
/// `outer` holds the terminators inherited from the enclosing clauses.
fn compute_ends(defs: &mut [PrefixDef], outer: &IndexSet<String>) {
    for i in 0..defs.len() {
        let mut ends = IndexSet::new();
        let mut bounded = false;

        for next in &defs[i + 1..] {
            if next.kind == DefKind::Value {
                ends.insert(next.value.clone());
            }
            if next.mult == Mult::One {
                bounded = true;
                break;
            }
        }
        if !bounded {
            ends.extend(outer.iter().cloned());
        }
        if defs[i].mult == Mult::Many && defs[i].kind == DefKind::Value {
            ends.insert(defs[i].value.clone());
        }

        compute_ends(&mut defs[i].follows, &ends);
        defs[i].ends = ends;
    }
}

fn collect_values(defs: &[PrefixDef], out: &mut IndexSet<String>) {
    for def in defs {
        if def.kind == DefKind::Value {
            out.insert(def.value.clone());
        }
        collect_values(&def.follows, out);
    }
}

impl Grammar {
    /// Compiles grammar notation into a table.
    ///
    /// The notation is part of the compiler, so malformed notation panics.
    pub fn compile(src: &str) -> Self {
        let mut fragments = IndexMap::new();
        let mut productions = vec![];

        for (i, line) in src.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let prod = parse_line(line, i + 1);
            if prod.head.kind == DefKind::Ref {
                fragments.insert(prod.head.value.clone(), prod.head.follows);
            } else {
                productions.push(prod);
            }
        }

        let mut sentences = vec![];
        let mut heads = HashMap::new();
        let mut reserved = IndexSet::new();

        for Production { mut head, synonyms } in productions {
            head.follows = inline_refs(head.follows, &fragments, 0);
            compute_ends(&mut head.follows, &IndexSet::new());

            let idx = sentences.len();
            for (value, group) in std::iter::once((head.value.clone(), head.group)).chain(synonyms) {
                reserved.insert(value.clone());
                heads.insert(value, (idx, group));
            }
            collect_values(&head.follows, &mut reserved);
            sentences.push(head);
        }

        Grammar { sentences, heads, reserved }
    }

    /// If this token starts a sentence, its definition and the role the head takes.
    pub fn sentence(&self, t: &Token) -> Option<(&PrefixDef, Option<Group>)> {
        if t.group != Group::Id {
            return None;
        }
        let &(idx, group) = self.heads.get(&t.value)?;
        Some((&self.sentences[idx], group))
    }

    /// Whether this token is a word used by the grammar (and so can't be an identifier).
    pub fn is_reserved(&self, t: &Token) -> bool {
        t.group == Group::Id && self.reserved.contains(&t.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ends_of(d: &PrefixDef) -> Vec<&str> {
        d.ends.iter().map(String::as_str).collect()
    }

    #[test]
    fn compile_is_idempotent() {
        assert_eq!(Grammar::compile(VELA_GRAMMAR), Grammar::compile(VELA_GRAMMAR));
        assert_eq!(&*GRAMMAR, &Grammar::compile(VELA_GRAMMAR));
    }

    #[test]
    fn if_terminators() {
        let def = &GRAMMAR.sentences[GRAMMAR.heads["if"].0];
        let values: Vec<_> = def.follows.iter().map(|d| d.value.as_str()).collect();
        assert_eq!(values, ["Expr", "then", "elif", "else", "end"]);

        let then = &def.follows[1];
        assert_eq!(then.group, Some(Group::Then));
        assert_eq!(ends_of(&then.follows[0]), ["elif", "else", "end"]);

        let elif = &def.follows[2];
        assert_eq!(elif.mult, Mult::Many);
        assert_eq!(ends_of(&elif.follows[0]), ["then"]);
        assert_eq!(ends_of(&elif.follows[1].follows[0]), ["else", "end", "elif"]);

        let els = &def.follows[3];
        assert_eq!(ends_of(&els.follows[0]), ["end"]);
    }

    #[test]
    fn synonyms_and_roles() {
        let fun = &GRAMMAR.heads["fun"];
        let sfun = &GRAMMAR.heads["sfun"];
        assert_eq!(fun.0, sfun.0);
        assert_eq!(fun.1, Some(Group::Fun));
        assert_eq!(sfun.1, Some(Group::StaticFun));

        assert!(GRAMMAR.reserved.contains("extends"));
        assert!(GRAMMAR.reserved.contains("then"));
        assert!(!GRAMMAR.reserved.contains("Branch"));
        assert!(!GRAMMAR.heads.contains_key("Branch"));
    }

    #[test]
    fn class_body_ends() {
        let def = &GRAMMAR.sentences[GRAMMAR.heads["class"].0];
        assert_eq!(def.follows[0].kind, DefKind::Group(Group::Id));
        assert_eq!(ends_of(&def.follows[2]), ["end"]);
    }

    #[test]
    #[should_panic]
    fn malformed_notation() {
        Grammar::compile("if Expr _( then");
    }
}
