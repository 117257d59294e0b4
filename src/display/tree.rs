use std::fmt::{Display, Formatter};

use crate::lexer::token::{Group, Token};

/// Renders a syntax tree as an S-expression.
///
/// A leaf is its text. A node is `(head children...)`, where the children are
/// its operands followed by its sentence clauses. Circumfix nodes are headed
/// by their bracket pair (`()`, `[]`, `{}`).
pub struct TreeDisplay<'t>(pub &'t Token);

fn head(t: &Token) -> &str {
    match (t.group, t.value.as_str()) {
        (Group::Call | Group::Paren, _) => "()",
        (Group::Bracket, _) => "[]",
        (Group::Generic, _) => "{}",
        (_, v) => v,
    }
}

impl Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let t = self.0;
        let circumfix = matches!(t.group, Group::Call | Group::Paren | Group::Bracket | Group::Generic);
        let children: Vec<&Token> = t.first().into_iter()
            .chain(t.second())
            .chain(&t.follows)
            .collect();

        if children.is_empty() && !circumfix {
            return write!(f, "{}", t.value);
        }

        write!(f, "({}", head(t))?;
        for c in children {
            write!(f, " {}", TreeDisplay(c))?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;

    use super::*;

    #[test]
    fn leaves_and_nodes() {
        let root = parse("\"a b\" f() x[]", "test").unwrap();
        let shown: Vec<_> = root.follows.iter().map(|t| TreeDisplay(t).to_string()).collect();
        assert_eq!(shown, ["\"a b\"", "(() f)", "([] x)"]);
    }
}
