use std::fmt::Debug;
use std::fs;
use std::path::Path;

use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::compiler::{compile, Compilation, CompileErr, CompileOptions, Source};
use crate::err::ErrKind;

pub mod prelude {
    pub use super::TestLoader;
    pub use super::TestResult;

    macro_rules! load_tests {
        ($f:literal) => {
            load_tests!(tests, $f);
        };
        ($name:ident, $f:literal) => {
            fn $name() -> &'static $crate::test_utils::TestLoader {
                static TEST: once_cell::sync::Lazy<$crate::test_utils::TestLoader> =
                    once_cell::sync::Lazy::new(|| $crate::test_utils::TestLoader::new($f).unwrap());

                &TEST
            }
        };
    }
    pub(crate) use load_tests;
}

pub enum TestErr {
    MissingTestHeader,
    DuplicateTest(String),
    IoErr(std::io::Error),
    TestFailed(String /* name of test */, String /* the error */),
    UnexpectedPass(String),
    WrongKind(String, ErrKind, String),
    UnknownTest(String)
}
impl From<std::io::Error> for TestErr {
    fn from(value: std::io::Error) -> Self {
        TestErr::IoErr(value)
    }
}

impl Debug for TestErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTestHeader => write!(f, "missing test header"),
            Self::DuplicateTest(name) => write!(f, "duplicate test {name}"),
            Self::IoErr(err) => write!(f, "{err:?}"),
            Self::TestFailed(test, err) => write!(f, "{test} failed:\n{err}"),
            Self::UnexpectedPass(test) => write!(f, "{test} compiled, but should have failed"),
            Self::WrongKind(test, kind, err) => write!(f, "{test} should fail with a {}:\n{err}", kind.name()),
            Self::UnknownTest(name) => write!(f, "unknown test {name}"),
        }
    }
}

pub type TestResult<T> = Result<T, TestErr>;

#[derive(Clone, Copy)]
pub struct Test<'t> {
    name: &'t str,
    code: &'t str,
}

impl Test<'_> {
    fn source(&self) -> Source {
        Source::new(self.name, self.code)
    }

    pub fn compile(&self) -> TestResult<Compilation> {
        compile(&[self.source()], &CompileOptions::default())
            .map_err(|e| TestErr::TestFailed(self.name.to_string(), e.full_msg(self.code)))
    }

    /// Compiles the test, expecting it to fail with an error of the given kind.
    pub fn compile_err(&self, kind: ErrKind) -> TestResult<CompileErr> {
        match compile(&[self.source()], &CompileOptions::default()) {
            Ok(_) => Err(TestErr::UnexpectedPass(self.name.to_string())),
            Err(e) if e.kind() == kind => Ok(e.err),
            Err(e) => Err(TestErr::WrongKind(self.name.to_string(), kind, e.full_msg(self.code))),
        }
    }
}

/// Named snippets from one test file.
///
/// Each snippet starts with a `// ! TEST name` line and runs up to the next header.
pub struct TestLoader(IndexMap<String, String>);
impl TestLoader {
    pub fn new(fp: impl AsRef<Path>) -> TestResult<Self> {
        let code = fs::read_to_string(fp.as_ref())?;
        let mut map = IndexMap::new();

        for (header, code) in split_tests(&code)? {
            match map.entry(header) {
                Entry::Occupied(e) => Err(TestErr::DuplicateTest(e.key().clone()))?,
                Entry::Vacant(e) => e.insert(code),
            };
        }

        Ok(Self(map))
    }

    pub fn get(&self, id: &str) -> TestResult<Test> {
        match self.0.get_key_value(id) {
            Some((name, code)) => Ok(Test { name, code }),
            None => Err(TestErr::UnknownTest(id.to_string())),
        }
    }

    /// Compiles every named test, expecting each to succeed.
    pub fn pass_all(&self, ids: &[&str]) -> TestResult<()> {
        for id in ids {
            self.get(id)?.compile()?;
        }
        Ok(())
    }

    /// Compiles every named test, expecting each to fail with an error of the given kind.
    pub fn fail_all(&self, ids: &[&str], kind: ErrKind) -> TestResult<()> {
        for id in ids {
            self.get(id)?.compile_err(kind)?;
        }
        Ok(())
    }
}

fn test_name(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("// ! TEST ")
        .map(str::trim)
}

fn split_tests(code: &str) -> TestResult<Vec<(String, String)>> {
    let mut tests = vec![];
    let mut lines = code.lines().skip_while(|l| l.trim().is_empty());

    let mut header = match lines.next() {
        Some(l) => test_name(l).ok_or(TestErr::MissingTestHeader)?.to_string(),
        None => return Ok(tests),
    };
    let mut current = String::new();

    for line in lines {
        match test_name(line) {
            Some(next_header) => {
                tests.push((header, std::mem::take(&mut current)));
                header = next_header.to_string();
            },
            None => {
                current.push_str(line);
                current.push('\n');
            },
        }
    }

    tests.push((header, current));
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use super::*;

    load_tests!("_test_files/test_utils.vela");

    #[test]
    fn snippets() -> TestResult<()> {
        let names: Vec<_> = tests().0.keys().map(String::as_str).collect();
        assert_eq!(names, ["hello", "undefined"]);

        tests().pass_all(&["hello"])?;
        tests().fail_all(&["undefined"], ErrKind::Syntax)?;

        assert!(matches!(tests().get("missing"), Err(TestErr::UnknownTest(_))));
        assert!(matches!(tests().get("hello")?.compile_err(ErrKind::Syntax), Err(TestErr::UnexpectedPass(_))));
        Ok(())
    }

    #[test]
    fn headers() {
        assert!(matches!(split_tests("x <- 1"), Err(TestErr::MissingTestHeader)));

        let split = split_tests("\n// ! TEST a\nx <- 1\n// ! TEST b\n").unwrap();
        assert_eq!(split, [("a".to_string(), "x <- 1\n".to_string()), ("b".to_string(), String::new())]);
    }
}
