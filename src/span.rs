//! This module holds utilities useful for handling source locations.
//!
//! The main items here are the [`Loc`] struct, which points at a character in a source file,
//! and the [`Located`] trait, which indicates that a struct has a location.

use std::fmt::Display;
use std::rc::Rc;

/// A position in a source file.
///
/// Rows and columns are 1-based, and columns count characters (not bytes).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Loc {
    /// The path of the source this location is in.
    pub path: Rc<str>,
    /// The line (starting at 1).
    pub row: usize,
    /// The character in the line (starting at 1).
    pub col: usize
}

impl Loc {
    /// Creates a new location.
    pub fn new(path: Rc<str>, row: usize, col: usize) -> Self {
        Loc { path, row, col }
    }
}

impl Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.row, self.col)
    }
}

/// Trait indicating that an item has a location.
pub trait Located {
    /// Gets the location of this item.
    fn loc(&self) -> &Loc;
}
impl Located for Loc {
    fn loc(&self) -> &Loc {
        self
    }
}
impl<L: Located> Located for &L {
    fn loc(&self) -> &Loc {
        (*self).loc()
    }
}
