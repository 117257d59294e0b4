//! Converts source text to sequences of tokens.
//!
//! The lexer reads its input one line at a time. At each position it tries,
//! in order, a quoted string literal, a block comment, and then the inline pattern
//! (punctuation, numbers, booleans, identifiers, line comments).
//! Strings and block comments may span several lines; the lexer keeps pulling lines
//! until their closing delimiter shows up.
//!
//! This module provides:
//! - [`tokenize`]: A utility function that opaquely does the lexing from string to tokens.
//! - [`Lexer`]: The cursor-style struct which does the lexing lazily.

use std::io::{BufRead, Seek};
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::err::{ErrKind, FullVelaErr, VelaErr};
use crate::span::Loc;

use self::token::{Group, Token, TokenId};
pub mod token;

/// Convert a string and lex it into a sequence of tokens.
///
/// For more control, see the [`Lexer`] struct.
///
/// # Example
/// ```
/// # use vela_lang::lexer::tokenize;
/// use vela_lang::lexer::token::Group;
///
/// let tokens = tokenize("a <- 1 + b", "main.vela").unwrap();
/// let values: Vec<_> = tokens.iter().map(|t| (t.value.as_str(), t.group)).collect();
/// assert_eq!(values, [
///     ("a", Group::Id),
///     ("<-", Group::Punct),
///     ("1", Group::Num),
///     ("+", Group::Punct),
///     ("b", Group::Id),
/// ]);
/// ```
pub fn tokenize(input: &str, path: &str) -> LexResult<Vec<Token>> {
    let mut lx = Lexer::new(std::io::Cursor::new(input), path)?;
    let mut tokens = vec![];

    while let Some(t) = lx.take()? {
        tokens.push(t);
    }
    Ok(tokens)
}

/// An error that occurs in the lexing process.
#[derive(PartialEq, Eq, Debug)]
pub enum LexErr {
    /// Lexer found a character that cannot start any token (e.g. `@`)
    UnknownChar(char),

    /// The lexer read a string literal but there was no closing quote (e.g. `"hello!`)
    UnclosedQuote,

    /// A block comment was not closed (e.g. `/* ... `)
    UnclosedComment,

    /// The input could not be read
    Unreadable(String),
}
/// A [`Result`] type for operations in the lexing process.
pub type LexResult<T> = Result<T, FullLexErr>;
pub(crate) type FullLexErr = FullVelaErr<LexErr>;

impl VelaErr for LexErr {
    fn kind(&self) -> ErrKind {
        ErrKind::Tokenize
    }
}

impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::UnknownChar(c)  => write!(f, "unrecognized character '{c}'"),
            LexErr::UnclosedQuote   => write!(f, "string literal is not terminated"),
            LexErr::UnclosedComment => write!(f, "comment is not terminated"),
            LexErr::Unreadable(e)   => write!(f, "could not read source: {e}"),
        }
    }
}
impl std::error::Error for LexErr {}

/// Escape character for strings and comments.
const ESCAPE: char = '\\';

static INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"(?P<comment>//.*)",
        r"|(?P<punct>->|<-|==|!=|<=|>=|&&|\|\||[-+*/%<>!()\[\]{},.:;])",
        r"|(?P<num>[0-9]+)",
        r"|(?P<bool>(?:true|false)\b)",
        r"|(?P<id>`?[A-Za-z_][A-Za-z0-9_]*)",
        r")"
    )).unwrap()
});

/// A lazy, cursor-style tokenizer.
///
/// After creation, the lexer is positioned at the first token of the input
/// (or at the end, for input with no tokens).
pub struct Lexer<R> {
    reader: R,
    path: Rc<str>,
    line: String,
    /// Byte offset into `line`
    pos: usize,
    /// Row of `line` (1-based, 0 before the first line is read)
    row: usize,
    first_id: usize,
    next_id: usize,
    current: Option<Token>
}

impl<R: BufRead> Lexer<R> {
    /// Creates a lexer and reads the first token.
    pub fn new(reader: R, path: &str) -> LexResult<Self> {
        Self::starting_at(reader, path, 0)
    }

    /// Creates a lexer whose token ids start at `first_id`.
    ///
    /// This keeps token ids unique across several sources of one compilation.
    pub fn starting_at(reader: R, path: &str, first_id: usize) -> LexResult<Self> {
        let mut lx = Lexer {
            reader,
            path: Rc::from(path),
            line: String::new(),
            pos: 0,
            row: 0,
            first_id,
            next_id: first_id,
            current: None
        };

        lx.advance()?;
        Ok(lx)
    }

    /// The token the lexer is positioned on.
    pub fn current(&self) -> Option<&Token> {
        self.current.as_ref()
    }

    /// Whether the lexer has read every token.
    pub fn at_end(&self) -> bool {
        self.current.is_none()
    }

    /// Moves to the next token.
    ///
    /// Advancing at the end is a no-op.
    pub fn advance(&mut self) -> LexResult<()> {
        self.current = self.read_token()?;
        Ok(())
    }

    /// Takes the current token and moves to the next one.
    pub fn take(&mut self) -> LexResult<Option<Token>> {
        let t = self.current.take();
        if t.is_some() {
            self.advance()?;
        }
        Ok(t)
    }

    /// The id the next created token will take.
    pub fn next_id(&self) -> usize {
        self.next_id
    }

    /// Reserves an id for a token that does not come from the input.
    pub fn fresh_id(&mut self) -> TokenId {
        let id = TokenId(self.next_id);
        self.next_id += 1;
        id
    }

    /// The path of the source being read.
    pub fn path(&self) -> &Rc<str> {
        &self.path
    }

    /// The location just past the last character read.
    pub fn end_loc(&self) -> Loc {
        self.loc_here()
    }

    fn loc_here(&self) -> Loc {
        let col = self.line[..self.pos].chars().count() + 1;
        Loc::new(Rc::clone(&self.path), self.row.max(1), col)
    }

    fn make_token(&mut self, value: String, group: Group, loc: Loc) -> Token {
        let id = self.fresh_id();
        Token::new(id, value, group, loc)
    }

    /// Replaces the line buffer with the next line of input.
    ///
    /// Returns false at the end of input.
    fn fill_line(&mut self) -> LexResult<bool> {
        self.line.clear();
        self.pos = 0;

        let n = self.reader.read_line(&mut self.line)
            .map_err(|e| LexErr::Unreadable(e.to_string()).at(self.loc_here()))?;
        if n == 0 {
            Ok(false)
        } else {
            self.row += 1;
            Ok(true)
        }
    }

    fn read_token(&mut self) -> LexResult<Option<Token>> {
        loop {
            let rest = &self.line[self.pos..];
            self.pos += rest.len() - rest.trim_start().len();

            if self.pos >= self.line.len() {
                if !self.fill_line()? {
                    return Ok(None);
                }
                continue;
            }

            let loc = self.loc_here();
            let rest = &self.line[self.pos..];

            if rest.starts_with('"') {
                let raw = self.read_delimited("\"", "\"", LexErr::UnclosedQuote, &loc)?;
                return Ok(Some(self.make_token(raw, Group::Str, loc)));
            }
            if rest.starts_with("/*") {
                self.read_delimited("/*", "*/", LexErr::UnclosedComment, &loc)?;
                continue;
            }

            let Some(caps) = INLINE.captures(rest) else {
                let c = rest.chars().next().unwrap_or(' ');
                return Err(LexErr::UnknownChar(c).at(loc));
            };

            let text = caps[0].to_string();
            self.pos += text.len();

            let group = if caps.name("comment").is_some() {
                continue;
            } else if caps.name("punct").is_some() {
                Group::Punct
            } else if caps.name("num").is_some() {
                Group::Num
            } else if caps.name("bool").is_some() {
                Group::Bool
            } else {
                Group::Id
            };

            return Ok(Some(self.make_token(text, group, loc)));
        }
    }

    /// Reads text from an opening delimiter to the next closing delimiter
    /// that is not escaped, pulling more lines as needed.
    ///
    /// The returned text includes both delimiters.
    fn read_delimited(&mut self, open: &str, close: &str, unclosed: LexErr, start_loc: &Loc) -> LexResult<String> {
        let mut raw = String::new();
        let mut start = self.pos;
        let mut scan = self.pos + open.len();

        loop {
            let mut escaped = false;
            let mut found = None;

            for (i, c) in self.line[scan..].char_indices() {
                let at = scan + i;
                if escaped {
                    escaped = false;
                } else if c == ESCAPE {
                    escaped = true;
                } else if self.line[at..].starts_with(close) {
                    found = Some(at + close.len());
                    break;
                }
            }

            if let Some(end) = found {
                raw.push_str(&self.line[start..end]);
                self.pos = end;
                return Ok(raw);
            }

            raw.push_str(&self.line[start..]);
            if !self.fill_line()? {
                return Err(unclosed.at(start_loc.clone()));
            }
            start = 0;
            scan = 0;
        }
    }
}

impl<R: BufRead + Seek> Lexer<R> {
    /// Rewinds the input and positions the lexer on the first token again.
    ///
    /// Tokens read after a restart get the same ids as the first time.
    pub fn restart(&mut self) -> LexResult<()> {
        self.reader.rewind()
            .map_err(|e| LexErr::Unreadable(e.to_string()).at_unknown())?;
        self.line.clear();
        self.pos = 0;
        self.row = 0;
        self.next_id = self.first_id;
        self.advance()
    }
}

/// Strips the quotes from a string literal and resolves its escapes.
pub fn unescape_str(raw: &str) -> String {
    let inner = raw.strip_prefix('"').unwrap_or(raw);
    let inner = inner.strip_suffix('"').unwrap_or(inner);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push(ESCAPE),
        }
    }
    out
}
