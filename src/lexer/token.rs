//! The token tree node shared by the lexer and parser.
//!
//! The lexer produces flat [`Token`]s. The parser then links them into a tree through
//! [`Token::first`], [`Token::second`], [`Token::third`], and [`Token::follows`],
//! and relabels their [`Group`] with the grammatical role they play.

use std::fmt::Display;
use std::str::FromStr;

use crate::span::{Loc, Located};

/// Identity of a token within a compilation.
///
/// The semantic analyzer keys its side tables by this id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TokenId(pub usize);

macro_rules! define_groups {
    ($($(#[$attr:meta])* $id:ident),* $(,)?) => {
        /// The class of a token.
        ///
        /// The lexer only assigns the lexical classes
        /// ([`Group::Num`], [`Group::Str`], [`Group::Bool`], [`Group::Id`], [`Group::Punct`]).
        /// Every other group is a role assigned while parsing.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum Group {
            $($(#[$attr])* $id),*
        }

        impl Group {
            /// The name of this group, as written in the grammar notation
            pub fn name(&self) -> &'static str {
                match self {
                    $(Group::$id => stringify!($id)),*
                }
            }
        }

        impl FromStr for Group {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($id) => Ok(Group::$id),)*
                    _ => Err(())
                }
            }
        }
    }
}

define_groups! {
    /// Integer literal
    Num,
    /// String literal (value includes the quotes)
    Str,
    /// `true` or `false`
    Bool,
    /// Identifier or keyword
    Id,
    /// Punctuation or operator
    Punct,

    /// Binary arithmetic, comparison, or logical operator
    BinOp,
    /// `target <- source`
    AssignLeft,
    /// `source -> target`
    AssignRight,
    /// Member access `a.b`
    Dot,
    /// Type specifier `a:T`
    TypeSpec,
    /// Argument separator
    Comma,
    /// Call `f(...)`
    Call,
    /// Parenthesized group `(...)`
    Paren,
    /// Array type, instantiation, or element access `a[...]`
    Bracket,
    /// Generic instantiation `T{...}`
    Generic,
    /// Prefix operator `-a`, `!a`
    Unary,
    /// `return`
    Return,
    /// The root of a source
    Root,

    Using,
    Class,
    Extends,
    Fun,
    StaticFun,
    VirtualFun,
    PrivateFun,
    FamilyFun,
    If,
    Then,
    Elif,
    Else,
    While,
    Do,
}

impl Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A lexical token, which becomes a syntax tree node after parsing.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    /// Identity of this token in the compilation.
    pub id: TokenId,
    /// Raw text of the token.
    pub value: String,
    /// Lexical class or grammatical role.
    pub group: Group,
    /// Left operand of an infix operator, base of a circumfix, or content of a prefix group.
    pub first: Option<Box<Token>>,
    /// Right operand of an infix operator or content of an infix circumfix.
    pub second: Option<Box<Token>>,
    /// Closing token of a circumfix.
    pub third: Option<Box<Token>>,
    /// Ordered children of a sentence (by prefix definition).
    pub follows: Vec<Token>,
    /// Where this token starts.
    pub loc: Loc
}

impl Token {
    /// Creates a new leaf token.
    pub fn new(id: TokenId, value: impl Into<String>, group: Group, loc: Loc) -> Self {
        Token {
            id,
            value: value.into(),
            group,
            first: None,
            second: None,
            third: None,
            follows: vec![],
            loc
        }
    }

    /// Whether this token is a word or punctuation with the given text.
    ///
    /// String literals never match, even if their text is the same.
    pub fn is(&self, value: &str) -> bool {
        !matches!(self.group, Group::Str | Group::Num | Group::Bool) && self.value == value
    }

    /// The left child.
    pub fn first(&self) -> Option<&Token> {
        self.first.as_deref()
    }

    /// The right child.
    pub fn second(&self) -> Option<&Token> {
        self.second.as_deref()
    }

    /// Collects the operands of a comma separated list.
    ///
    /// A list of one item is that item; an empty list is produced by `None`.
    pub fn comma_items(node: Option<&Token>) -> Vec<&Token> {
        fn walk<'t>(t: &'t Token, out: &mut Vec<&'t Token>) {
            if t.group == Group::Comma {
                t.first().into_iter().for_each(|l| walk(l, out));
                t.second().into_iter().for_each(|r| walk(r, out));
            } else {
                out.push(t);
            }
        }

        let mut out = vec![];
        if let Some(t) = node {
            walk(t, &mut out);
        }
        out
    }
}

impl Located for Token {
    fn loc(&self) -> &Loc {
        &self.loc
    }
}
