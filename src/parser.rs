//! Converts sequences of tokens to a syntax tree.
//!
//! The parser combines two analyzers over one token stream:
//! - an operator precedence (Pratt) analyzer, steered by the binding powers in [`power`], and
//! - a prefix analyzer for keyword-led sentences, steered by the grammar table in [`grammar`].
//!
//! Whenever the precedence analyzer meets a token that heads a sentence in operand position,
//! it hands control to the prefix analyzer. The prefix analyzer hands control back for every
//! `Expr` clause of the sentence.
//!
//! This module provides:
//! - [`parse`]: A function to parse a string into a syntax tree.
//! - [`Parser`]: The struct that does all the parsing.

use std::io::BufRead;

use crate::err::{full_vela_cast_impl, ErrKind, FullVelaErr, VelaErr};
use crate::lexer::token::{Group, Token};
use crate::lexer::{LexErr, Lexer};
use crate::span::Loc;

use self::grammar::{DefKind, Grammar, Mult, PrefixDef, GRAMMAR};
use self::power::{Circumfix, Powers, POWERS};

pub mod grammar;
pub mod power;

/// Parses a source text into a syntax tree.
///
/// The tree's root is a [`Group::Root`] token whose follows are the top-level statements.
pub fn parse(input: &str, path: &str) -> ParseResult<Token> {
    let lexer = Lexer::new(std::io::Cursor::new(input), path)?;
    Parser::new(lexer).parse()
}

/// An error that occurs in the parsing process.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseErr {
    /// The lexer failed while the parser was reading.
    Lex(LexErr),

    /// This token cannot appear here.
    UnexpectedToken(String),

    /// The input ended in the middle of a construct.
    UnexpectedEnd,

    /// The parser expected one token, but found another.
    ExpectedToken(String /* expected */, String /* found */),

    /// A grouping was closed with the wrong token (e.g. `( ... ]`).
    MismatchedClose(String /* expected */, String /* found */),

    /// A grouping was never closed (e.g. `( ...`).
    Unclosed(String),
}
impl VelaErr for ParseErr {
    fn kind(&self) -> ErrKind {
        match self {
            ParseErr::Lex(e) => e.kind(),
            _ => ErrKind::Syntax,
        }
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::Lex(e) => write!(f, "{e}"),
            ParseErr::UnexpectedToken(t) => write!(f, "unexpected '{t}'"),
            ParseErr::UnexpectedEnd => write!(f, "unexpected end of input"),
            ParseErr::ExpectedToken(e, t) => write!(f, "expected '{e}', found '{t}'"),
            ParseErr::MismatchedClose(e, t) => write!(f, "expected closing '{e}', found '{t}'"),
            ParseErr::Unclosed(t) => write!(f, "'{t}' was never closed"),
        }
    }
}
impl std::error::Error for ParseErr {}
impl From<LexErr> for ParseErr {
    fn from(err: LexErr) -> Self {
        ParseErr::Lex(err)
    }
}
full_vela_cast_impl!(LexErr, ParseErr);

/// A [`Result`] type for operations in the parsing process.
pub type ParseResult<T> = Result<T, FullParseErr>;
pub(crate) type FullParseErr = FullVelaErr<ParseErr>;

/// A struct that does the conversion of tokens to a syntax tree.
pub struct Parser<'g, R> {
    lexer: Lexer<R>,
    grammar: &'g Grammar,
    powers: &'g Powers
}

impl<R: BufRead> Parser<'static, R> {
    /// Creates a parser using the language's grammar.
    pub fn new(lexer: Lexer<R>) -> Self {
        Self::with_tables(lexer, &GRAMMAR, &POWERS)
    }
}

impl<'g, R: BufRead> Parser<'g, R> {
    /// Creates a parser with custom tables.
    pub fn with_tables(lexer: Lexer<R>, grammar: &'g Grammar, powers: &'g Powers) -> Self {
        Parser { lexer, grammar, powers }
    }

    /// Gives back the lexer (e.g. to read the next free token id).
    pub fn into_lexer(self) -> Lexer<R> {
        self.lexer
    }

    /// Parses the whole input.
    pub fn parse(&mut self) -> ParseResult<Token> {
        let loc = Loc::new(self.lexer.path().clone(), 1, 1);
        let mut root = Token::new(self.lexer.fresh_id(), "", Group::Root, loc);

        loop {
            self.skip_semis()?;
            if self.lexer.at_end() {
                break;
            }
            root.follows.push(self.expect_expr(0)?);
        }

        log::trace!("parsed {} with {} top-level statements", self.lexer.path(), root.follows.len());
        Ok(root)
    }

    fn end_err(&self) -> FullParseErr {
        ParseErr::UnexpectedEnd.at(self.lexer.end_loc())
    }

    fn unexpected(t: &Token) -> FullParseErr {
        ParseErr::UnexpectedToken(t.value.clone()).at(t.loc.clone())
    }

    /// Consume the current token.
    fn take_current(&mut self) -> ParseResult<Token> {
        match self.lexer.take()? {
            Some(t) => Ok(t),
            None => Err(self.end_err()),
        }
    }

    fn skip_semis(&mut self) -> ParseResult<()> {
        while self.lexer.current().is_some_and(|t| t.is(";")) {
            self.lexer.advance()?;
        }
        Ok(())
    }

    /// Parse an expression whose operators bind tighter than `min_bp`.
    pub fn expect_expr(&mut self, min_bp: i32) -> ParseResult<Token> {
        if let Some(group) = self.lexer.current().and_then(|t| self.powers.standalone(t)) {
            // standalone tokens are statements, never operands
            if min_bp > 0 {
                let Some(t) = self.lexer.current() else { return Err(self.end_err()) };
                return Err(Self::unexpected(t));
            }
            let mut t = self.take_current()?;
            t.group = group;
            return Ok(t);
        }

        let mut left = self.expect_primary()?;

        while let Some(t) = self.lexer.current() {
            if self.powers.lbp(t) <= min_bp {
                break;
            }

            if let Some(c) = self.powers.circumfix(t) {
                let Some(group) = c.infix else { return Err(Self::unexpected(t)) };
                left = self.expect_circumfix(c, group, Some(left))?;
            } else if let Some(op) = self.powers.infix(t) {
                let mut node = self.take_current()?;
                let right = self.expect_expr(op.right_bp())?;

                node.group = op.group;
                node.first = Some(Box::new(left));
                node.second = Some(Box::new(right));
                left = node;
            } else {
                break;
            }
        }

        Ok(left)
    }

    /// Parse the operand at the start of an expression.
    fn expect_primary(&mut self) -> ParseResult<Token> {
        let grammar = self.grammar;
        let Some(t) = self.lexer.current() else { return Err(self.end_err()) };

        if self.powers.lbp(t) < 0 {
            return Err(Self::unexpected(t));
        }
        if let Some((def, group)) = grammar.sentence(t) {
            return self.expect_sentence(def, group);
        }
        if let Some(c) = self.powers.circumfix(t) {
            let Some(group) = c.prefix else { return Err(Self::unexpected(t)) };
            return self.expect_circumfix(c, group, None);
        }
        if let Some((bp, group)) = self.powers.prefix(t) {
            let mut op = self.take_current()?;
            op.group = group;
            op.first = Some(Box::new(self.expect_expr(bp)?));
            return Ok(op);
        }

        let is_word = t.group == Group::Id && !grammar.is_reserved(t);
        match t.group {
            Group::Num | Group::Str | Group::Bool => self.take_current(),
            _ if is_word => self.take_current(),
            _ => Err(Self::unexpected(t)),
        }
    }

    /// Parse a grouping pair, after an operand (`base`) or on its own.
    fn expect_circumfix(&mut self, c: Circumfix, group: Group, base: Option<Token>) -> ParseResult<Token> {
        let mut open = self.take_current()?;

        let inner = match self.lexer.current() {
            Some(t) if t.is(c.close) => None,
            _ => Some(Box::new(self.expect_expr(0)?)),
        };

        match self.lexer.current() {
            Some(t) if t.is(c.close) => {
                open.third = Some(Box::new(self.take_current()?));
            },
            Some(t) => {
                return Err(ParseErr::MismatchedClose(c.close.to_string(), t.value.clone()).at(t.loc.clone()))
            },
            None => return Err(ParseErr::Unclosed(c.open.to_string()).at(open.loc.clone())),
        }

        open.group = group;
        match base {
            Some(b) => {
                open.first = Some(Box::new(b));
                open.second = inner;
            },
            None => open.first = inner,
        }
        Ok(open)
    }

    /// Parse a sentence whose head is the current token.
    fn expect_sentence(&mut self, def: &'g PrefixDef, group: Option<Group>) -> ParseResult<Token> {
        let mut head = self.take_current()?;
        if let Some(g) = group {
            head.group = g;
        }

        self.expect_follows(&def.follows, &mut head)?;
        Ok(head)
    }

    fn expect_follows(&mut self, defs: &'g [PrefixDef], into: &mut Token) -> ParseResult<()> {
        for def in defs {
            match (def.kind, def.mult) {
                (DefKind::Expr, Mult::One) => into.follows.push(self.expect_expr(0)?),
                (DefKind::Expr, _) => self.expect_exprs(def, into)?,

                (_, Mult::One) => self.expect_clause(def, into)?,
                (_, Mult::Optional) => if self.match_clause(def) {
                    self.expect_clause(def, into)?;
                },
                (_, Mult::Many) => while self.match_clause(def) {
                    self.expect_clause(def, into)?;
                },
            }
        }

        Ok(())
    }

    /// Parse expressions until one of the clause's terminators.
    fn expect_exprs(&mut self, def: &PrefixDef, into: &mut Token) -> ParseResult<()> {
        loop {
            self.skip_semis()?;

            match self.lexer.current() {
                None => break,
                Some(t) if def.ends.iter().any(|e| t.is(e)) => break,
                Some(_) => into.follows.push(self.expect_expr(0)?),
            }

            if def.mult == Mult::Optional {
                break;
            }
        }

        Ok(())
    }

    /// Whether the current token can start this (non-expression) clause.
    fn match_clause(&self, def: &PrefixDef) -> bool {
        let Some(t) = self.lexer.current() else { return false };

        match def.kind {
            DefKind::Value => t.is(&def.value),
            DefKind::Group(g) => t.group == g && !self.grammar.is_reserved(t),
            DefKind::Expr | DefKind::Ref => false,
        }
    }

    /// Consume a (non-expression) clause and its nested clauses.
    fn expect_clause(&mut self, def: &'g PrefixDef, into: &mut Token) -> ParseResult<()> {
        if !self.match_clause(def) {
            let expected = match def.kind {
                DefKind::Group(g) => g.name().to_string(),
                _ => def.value.clone(),
            };
            return Err(match self.lexer.current() {
                Some(t) => ParseErr::ExpectedToken(expected, t.value.clone()).at(t.loc.clone()),
                None => ParseErr::ExpectedToken(expected, "end of input".to_string()).at(self.lexer.end_loc()),
            });
        }

        let mut t = self.take_current()?;
        if let Some(g) = def.group {
            t.group = g;
        }
        self.expect_follows(&def.follows, &mut t)?;

        into.follows.push(t);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::display::TreeDisplay;

    use super::*;

    fn tree(src: &str) -> Vec<String> {
        match parse(src, "test") {
            Ok(root) => root.follows.iter().map(|t| TreeDisplay(t).to_string()).collect(),
            Err(e) => panic!("{}", e.full_msg(src)),
        }
    }

    fn assert_parse(src: &str, expected: &[&str]) {
        assert_eq!(tree(src), expected);
    }

    fn assert_parse_fail(src: &str, err: ParseErr) {
        match parse(src, "test") {
            Ok(t) => panic!("Parsing resulted in value: {}", TreeDisplay(&t)),
            Err(e) => assert_eq!(e, err),
        }
    }

    #[test]
    fn precedence() {
        assert_parse("1 + 2 * 3", &["(+ 1 (* 2 3))"]);
        assert_parse("1 * 2 + 3", &["(+ (* 1 2) 3)"]);
        assert_parse("1 - 2 - 3", &["(- (- 1 2) 3)"]);
        assert_parse("a <- b <- 1", &["(<- a (<- b 1))"]);
        assert_parse("1 -> a", &["(-> 1 a)"]);
        assert_parse("-a * b", &["(* (- a) b)"]);
        assert_parse("a || b && !c", &["(|| a (&& b (! c)))"]);
    }

    #[test]
    fn postfix_forms() {
        assert_parse("System.Console.WriteLine(1, 2)", &["(() (. (. System Console) WriteLine) (, 1 2))"]);
        assert_parse("f()", &["(() f)"]);
        assert_parse("a:int[] <- int[3]", &["(<- (: a ([] int)) ([] int 3))"]);
        assert_parse("List{int}()", &["(() ({} List int))"]);
        assert_parse("(1 + 2) * 3", &["(* (() (+ 1 2)) 3)"]);
    }

    #[test]
    fn juxtaposed_statements() {
        assert_parse("a <- 1 b <- a; `p(b)", &["(<- a 1)", "(<- b a)", "(() `p b)"]);
    }

    #[test]
    fn sentences() {
        assert_parse(
            "if a then b elif c then d e else f end",
            &["(if a (then b) (elif c (then d e)) (else f) end)"]
        );
        assert_parse("while a do b end", &["(while a (do b) end)"]);
        assert_parse(
            "fun f(x:int):int return x end",
            &["(fun (: (() f (: x int)) int) return x end)"]
        );
        assert_parse("class A extends B x:int end", &["(class A (extends B) (: x int) end)"]);
        assert_parse("using System.Text", &["(using (. System Text))"]);
    }

    #[test]
    fn sentence_roles() {
        let root = parse("sfun f() end if a then b end", "test").unwrap();
        assert_eq!(root.follows[0].group, Group::StaticFun);

        let iff = &root.follows[1];
        assert_eq!(iff.group, Group::If);
        assert_eq!(iff.follows[1].group, Group::Then);
        assert_eq!(iff.follows[2].group, Group::Id);
    }

    #[test]
    fn nested_sentences() {
        assert_parse(
            "while a do if b then break end end",
            &["(while a (do (if b (then break) end)) end)"]
        );
    }

    #[test]
    fn parse_failures() {
        assert_parse_fail("f(1]", ParseErr::MismatchedClose(")".to_string(), "]".to_string()));
        assert_parse_fail("f(1", ParseErr::Unclosed("(".to_string()));
        assert_parse_fail("a + end", ParseErr::UnexpectedToken("end".to_string()));
        assert_parse_fail("if a b end", ParseErr::ExpectedToken("then".to_string(), "b".to_string()));
        assert_parse_fail("while a do b", ParseErr::ExpectedToken("end".to_string(), "end of input".to_string()));
        assert_parse_fail("a +", ParseErr::UnexpectedEnd);
        assert_parse_fail("x <- \"abc", ParseErr::Lex(LexErr::UnclosedQuote));
    }

    #[test]
    fn return_only_at_statement_level() {
        assert_parse_fail("a + return", ParseErr::UnexpectedToken("return".to_string()));
        assert_parse_fail("a <- -return", ParseErr::UnexpectedToken("return".to_string()));
        assert_parse("if a then return end", &["(if a (then return) end)"]);
    }
}
