//! Underlying core behind the error reporting of the compiler.
//!
//! This module unifies the several different types of errors output by the other modules.
//! Other error types (e.g. [`LexErr`]) can implement the [`VelaErr`] trait to keep track of the
//! error's kind and message.
//!
//! [`FullVelaErr`] does much of the work to convert [`VelaErr`]s into a printed error in terminal.
//!
//! Compilation stops at the first error, so every error carries at most one location.
//!
//! [`LexErr`]: crate::lexer::LexErr

use std::fmt::Display;

use crate::span::Loc;

/// The taxonomy of compile errors.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ErrKind {
    /// Unterminated string or comment, unrecognized character.
    Tokenize,
    /// Malformed syntax, unresolved identifiers, missing or ambiguous overloads.
    Syntax,
    /// Duplicate declarations and other misuse of well-formed declarations.
    Semantic,
    /// Type mismatch in an assignment, call, condition, or return.
    Type,
    /// An inaccessible member was selected.
    Access,
    /// Broken invariant inside the compiler.
    Internal,
    /// Invalid compile option.
    Option,
}

impl ErrKind {
    /// The printed name of this kind (e.g. `syntax error`)
    pub fn name(&self) -> &'static str {
        match self {
            ErrKind::Tokenize => "tokenize error",
            ErrKind::Syntax   => "syntax error",
            ErrKind::Semantic => "semantic error",
            ErrKind::Type     => "type error",
            ErrKind::Access   => "access error",
            ErrKind::Internal => "internal error",
            ErrKind::Option   => "option error",
        }
    }
}

/// Errors that can be printed by the compiler.
///
/// This trait requires that the struct provides the kind of the error and the message of the error (in Display).
/// Implementing these enables functionality to designate *where* an error occurred and to produce
/// a formatted error message.
pub trait VelaErr: Display + Sized {
    /// The kind of this error.
    fn kind(&self) -> ErrKind;

    /// The name of the error type (e.g. `syntax error`, `type error`)
    fn err_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Designate that this error occurred at a specific position
    fn at(self, loc: Loc) -> FullVelaErr<Self> {
        FullVelaErr::new(self, Some(loc))
    }

    /// Designate that this error occurred at an unknown position in the code
    fn at_unknown(self) -> FullVelaErr<Self> {
        FullVelaErr::new(self, None)
    }
}

impl<E: VelaErr> From<E> for FullVelaErr<E> {
    fn from(err: E) -> Self {
        err.at_unknown()
    }
}

/// An error that has an associated position.
#[derive(PartialEq, Eq, Debug)]
pub struct FullVelaErr<E: VelaErr> {
    pub(crate) err: E,
    loc: Option<Loc>
}

impl<E: VelaErr> FullVelaErr<E> {
    fn new(err: E, loc: Option<Loc>) -> Self {
        Self { err, loc }
    }

    /// The underlying error.
    pub fn err(&self) -> &E {
        &self.err
    }

    /// The kind of the underlying error.
    pub fn kind(&self) -> ErrKind {
        self.err.kind()
    }

    /// Where the error occurred, if known.
    pub fn loc(&self) -> Option<&Loc> {
        self.loc.as_ref()
    }

    /// Get a String designating where the error occurred
    /// and the message associated with the error.
    pub fn short_msg(&self) -> String {
        match &self.loc {
            Some(loc) => format!("{} :: {}: {}", loc, self.err.err_name(), self.err),
            None => format!("{}: {}", self.err.err_name(), self.err),
        }
    }

    /// Get a String designating where the error occurred,
    /// the message associated with the error,
    /// and a pointer to what happened at the line to cause the error.
    ///
    /// `src` should be the text of the source the error's location points into.
    pub fn full_msg(&self, src: &str) -> String {
        let mut lines = vec![self.short_msg()];

        let line = self.loc.as_ref()
            .and_then(|loc| Some((loc, src.lines().nth(loc.row.checked_sub(1)?)?)));
        if let Some((loc, code)) = line {
            lines.push(String::new());
            lines.push(code.to_string());
            lines.push(" ".repeat(loc.col.saturating_sub(1)) + "^");
        }

        lines.join("\n")
    }

    /// Map the inner error to another error.
    pub fn map<F: VelaErr>(self, f: impl FnOnce(E) -> F) -> FullVelaErr<F> {
        FullVelaErr {
            err: f(self.err),
            loc: self.loc
        }
    }

    /// Cast the inner error to another error.
    pub fn cast_err<F: VelaErr + From<E>>(self) -> FullVelaErr<F> {
        self.map(F::from)
    }

    /// Designate a location if this error does not have one yet.
    pub fn or_at(mut self, loc: &Loc) -> Self {
        self.loc.get_or_insert_with(|| loc.clone());
        self
    }
}

impl<E: VelaErr> Display for FullVelaErr<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_msg())
    }
}
impl<E: VelaErr + std::fmt::Debug> std::error::Error for FullVelaErr<E> {}

impl<E: VelaErr + PartialEq> PartialEq<E> for FullVelaErr<E> {
    fn eq(&self, other: &E) -> bool {
        &self.err == other
    }
}

macro_rules! full_vela_cast_impl {
    ($t:ty, $u:ty) => {
        impl From<$crate::err::FullVelaErr<$t>> for $crate::err::FullVelaErr<$u> {
            fn from(err: $crate::err::FullVelaErr<$t>) -> Self {
                err.cast_err()
            }
        }
    }
}
pub(crate) use full_vela_cast_impl;
