//! Binding powers of the infix analyzer.
//!
//! Every token that is not listed here (identifiers, literals, keywords that head a sentence)
//! has a binding power of 0, which is what lets statements follow each other without separators.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::lexer::token::{Group, Token};

/// Which side an infix operator groups to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Assoc {
    /// `a - b - c` is `(a - b) - c`
    Left,
    /// `a <- b <- c` is `a <- (b <- c)`
    Right
}

/// A binary operator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Infix {
    /// Left binding power.
    pub bp: i32,
    /// Associativity.
    pub assoc: Assoc,
    /// Role assigned to the operator token.
    pub group: Group
}

impl Infix {
    /// The minimum binding power the right operand is parsed at.
    pub fn right_bp(&self) -> i32 {
        match self.assoc {
            Assoc::Left  => self.bp,
            Assoc::Right => self.bp - 1,
        }
    }
}

/// A grouping pair such as `(` `)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Circumfix {
    /// Opening token.
    pub open: &'static str,
    /// Closing token.
    pub close: &'static str,
    /// Left binding power, when used after an operand.
    pub bp: i32,
    /// Role when used after an operand (`f(x)`), if allowed.
    pub infix: Option<Group>,
    /// Role when used in operand position (`(x)`), if allowed.
    pub prefix: Option<Group>,
}

/// Binding power given to terminators.
pub const TERMINATOR: i32 = -1;

/// The tables steering the infix analyzer.
#[derive(Debug)]
pub struct Powers {
    infix: HashMap<&'static str, Infix>,
    circumfix: Vec<Circumfix>,
    prefix: HashMap<&'static str, (i32, Group)>,
    terminators: HashMap<&'static str, Option<Group>>,
}

/// The standard binding powers.
pub static POWERS: Lazy<Powers> = Lazy::new(Powers::standard);

impl Powers {
    /// Builds the standard tables.
    pub fn standard() -> Self {
        use Assoc::{Left, Right};

        let mut infix = HashMap::new();
        let mut add = |ops: &[&'static str], bp, assoc, group| {
            for &op in ops {
                infix.insert(op, Infix { bp, assoc, group });
            }
        };
        add(&[","], 10, Left, Group::Comma);
        add(&["<-"], 20, Right, Group::AssignLeft);
        add(&["->"], 20, Left, Group::AssignRight);
        add(&["||"], 30, Left, Group::BinOp);
        add(&["&&"], 40, Left, Group::BinOp);
        add(&["==", "!="], 50, Left, Group::BinOp);
        add(&["<", ">", "<=", ">="], 60, Left, Group::BinOp);
        add(&["+", "-"], 70, Left, Group::BinOp);
        add(&["*", "/", "%"], 80, Left, Group::BinOp);
        add(&[":"], 100, Left, Group::TypeSpec);
        add(&["."], 130, Left, Group::Dot);

        let circumfix = vec![
            Circumfix { open: "(", close: ")", bp: 120, infix: Some(Group::Call), prefix: Some(Group::Paren) },
            Circumfix { open: "[", close: "]", bp: 120, infix: Some(Group::Bracket), prefix: None },
            Circumfix { open: "{", close: "}", bp: 120, infix: Some(Group::Generic), prefix: None },
        ];

        let prefix = HashMap::from([
            ("-", (90, Group::Unary)),
            ("!", (90, Group::Unary)),
        ]);

        let mut terminators: HashMap<_, _> = ["then", "do", "end", "elif", "else", ";", ")", "]", "}"]
            .into_iter()
            .map(|t| (t, None))
            .collect();
        terminators.insert("return", Some(Group::Return));

        Powers { infix, circumfix, prefix, terminators }
    }

    fn word(t: &Token) -> Option<&str> {
        matches!(t.group, Group::Id | Group::Punct).then_some(t.value.as_str())
    }

    /// The left binding power of a token.
    pub fn lbp(&self, t: &Token) -> i32 {
        let Some(w) = Self::word(t) else { return 0 };

        if self.terminators.contains_key(w) {
            TERMINATOR
        } else if let Some(c) = self.circumfix.iter().find(|c| c.open == w) {
            c.bp
        } else if let Some(op) = self.infix.get(w) {
            op.bp
        } else {
            0
        }
    }

    /// The infix operator this token is, if it is one.
    pub fn infix(&self, t: &Token) -> Option<Infix> {
        Self::word(t).and_then(|w| self.infix.get(w)).copied()
    }

    /// The grouping pair this token opens, if it opens one.
    pub fn circumfix(&self, t: &Token) -> Option<Circumfix> {
        let w = Self::word(t)?;
        self.circumfix.iter().find(|c| c.open == w).copied()
    }

    /// The prefix operator this token is, if it is one.
    pub fn prefix(&self, t: &Token) -> Option<(i32, Group)> {
        Self::word(t).and_then(|w| self.prefix.get(w)).copied()
    }

    /// If this token is a terminator that also stands alone as a statement,
    /// the role it takes.
    pub fn standalone(&self, t: &Token) -> Option<Group> {
        Self::word(t).and_then(|w| self.terminators.get(w)).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use crate::lexer::tokenize;

    use super::*;

    #[test]
    fn powers_by_token() {
        let tokens = tokenize("a + \"+\" ( then return :", "test").unwrap();
        let bps: Vec<_> = tokens.iter().map(|t| POWERS.lbp(t)).collect();
        assert_eq!(bps, [0, 70, 0, 120, TERMINATOR, TERMINATOR, 100]);

        assert_eq!(POWERS.standalone(&tokens[5]), Some(Group::Return));
        assert_eq!(POWERS.standalone(&tokens[4]), None);
        assert_eq!(POWERS.infix(&tokens[1]).map(|op| op.right_bp()), Some(70));
    }
}
