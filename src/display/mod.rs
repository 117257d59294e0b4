//! Human-readable renderings of syntax trees and IR.
//!
//! These are debugging views used by the `vela` binary and by tests.

use std::fmt::{Display, Formatter};

mod ir;
mod tree;

pub use self::ir::{InstrDisplay, IrListing};
pub use self::tree::TreeDisplay;

fn fmt_list<D: Display>(f: &mut Formatter<'_>, elems: &[D]) -> std::fmt::Result {
    if let Some((tail, head)) = elems.split_last() {
        for el in head {
            write!(f, "{el}, ")?;
        }

        write!(f, "{tail}")
    } else {
        Ok(())
    }
}
