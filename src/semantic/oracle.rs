//! Types that are not declared in the compiled sources.
//!
//! The analyzer only knows external types through the [`TypeOracle`] trait.
//! [`Library`] is the bundled implementation: it reads a line-oriented metadata format
//! and always starts with a small built-in base library.
//!
//! # Metadata format
//!
//! ```text
//! # comment
//! assembly mscorlib
//! type System.Text.StringBuilder : System.Object
//!     ctor (System.String)
//!     method Append (System.String) : System.Text.StringBuilder
//!     virtual method ToString () : System.String
//!     property Capacity : System.Int32 get set
//! value System.Int32 : System.ValueType
//! type System.Collections.Generic.List`1<T> : System.Object
//!     method Add (T)
//! ```
//!
//! Members are indented under their type and may be prefixed by `static`, `virtual`,
//! and a visibility (`public` by default; `private`, `family`, `assembly`, `famorassem`, `famandassem`).
//! A type reference is a full type name, a generic parameter of the enclosing type,
//! or either followed by `[]`.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

/// Visibility of a member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Visibility {
    /// Only the declaring type
    Private,
    /// The declaring type and its subclasses (protected)
    Family,
    /// Types of the same assembly (internal)
    Assembly,
    /// Subclasses that are also in the same assembly
    FamAndAssem,
    /// Subclasses or types of the same assembly
    FamOrAssem,
    /// Everyone
    Public,
}

/// What kind of member an [`ExtMember`] is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExtMemberKind {
    /// A method
    Method,
    /// An instance constructor
    Ctor,
    /// A property with a getter and/or setter
    Property {
        /// Whether the property can be read
        get: bool,
        /// Whether the property can be written
        set: bool
    },
}

/// A member of an external type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExtMember {
    /// Member name (`.ctor` for constructors)
    pub name: String,
    /// Kind of member
    pub kind: ExtMemberKind,
    /// Parameter type references
    pub params: Vec<String>,
    /// Return (or property) type reference, `None` for void
    pub ret: Option<String>,
    /// Whether the member is static
    pub is_static: bool,
    /// Whether the method is virtual
    pub is_virtual: bool,
    /// Member visibility
    pub visibility: Visibility,
}

/// Description of an external type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExtType {
    /// Full name (e.g. `System.String`, ``System.Collections.Generic.List`1``)
    pub name: String,
    /// Full name of the base type
    pub base: Option<String>,
    /// Whether this is a value type
    pub is_value_type: bool,
    /// Names of the generic parameters
    pub generic_params: Vec<String>,
    /// Declared members
    pub members: Vec<ExtMember>,
    /// The assembly declaring the type
    pub assembly: String,
}

/// The query contract for external types.
pub trait TypeOracle {
    /// Whether this full name is a known namespace (e.g. `System.Text`).
    fn is_namespace(&self, name: &str) -> bool;

    /// Looks up a type by full name.
    fn find_type(&self, name: &str) -> Option<Arc<ExtType>>;

    /// Whether a value of type `from` can be assigned to type `to`.
    fn is_assignable(&self, from: &ExtType, to: &ExtType) -> bool {
        let mut current = Some(from.name.clone());
        let mut seen = HashSet::new();

        while let Some(name) = current {
            if name == to.name {
                return true;
            }
            if !seen.insert(name.clone()) {
                break;
            }
            current = self.find_type(&name).and_then(|t| t.base.clone());
        }

        false
    }
}

/// An error raised while reading library metadata.
#[derive(Debug, PartialEq, Eq)]
pub struct LibErr {
    /// The library being read
    pub path: String,
    /// Line of the error (0 if the whole library failed)
    pub line: usize,
    /// What went wrong
    pub msg: String,
}
impl Display for LibErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            write!(f, "{}: {}", self.path, self.msg)
        } else {
            write!(f, "{}:{}: {}", self.path, self.line, self.msg)
        }
    }
}
impl std::error::Error for LibErr {}

static TYPE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<kind>type|value)\s+(?P<name>[^\s<:]+)(?:<(?P<generics>[^>]*)>)?(?:\s*:\s*(?P<base>\S+))?\s*$").unwrap()
});
static MEMBER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?P<mods>(?:(?:public|private|family|assembly|famorassem|famandassem|static|virtual)\s+)*)",
        r"(?P<kind>ctor|method|property)",
        r"(?:\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*))?",
        r"\s*(?:\((?P<params>[^)]*)\))?",
        r"\s*(?::\s*(?P<ret>\S+))?",
        r"(?P<access>(?:\s+(?:get|set))*)\s*$"
    )).unwrap()
});

const CORLIB_SRC: &str = include_str!("corlib.vmeta");

static CORLIB: Lazy<Library> = Lazy::new(|| {
    let mut lib = Library::new();
    if let Err(e) = lib.load_str(CORLIB_SRC, "corlib") {
        panic!("built-in library is malformed: {e}");
    }
    lib
});

/// A set of external types read from metadata files.
#[derive(Clone, Debug, Default)]
pub struct Library {
    types: HashMap<String, Arc<ExtType>>,
    namespaces: HashSet<String>,
}

impl Library {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a library holding the built-in base library.
    pub fn with_corlib() -> Self {
        CORLIB.clone()
    }

    /// Reads a metadata file and adds its types.
    pub fn load_file(&mut self, path: &Path) -> Result<(), LibErr> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| LibErr { path: path.display().to_string(), line: 0, msg: e.to_string() })?;
        self.load_str(&src, &path.display().to_string())
    }

    /// Reads metadata text and adds its types.
    ///
    /// Nothing is added if the text is malformed.
    pub fn load_str(&mut self, src: &str, path: &str) -> Result<(), LibErr> {
        let err = |line: usize, msg: String| LibErr { path: path.to_string(), line, msg };

        let mut assembly = String::from(path);
        let mut types: Vec<ExtType> = vec![];

        for (i, raw) in src.lines().enumerate() {
            let lno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if !raw.starts_with(char::is_whitespace) {
                if let Some(name) = line.strip_prefix("assembly ") {
                    assembly = name.trim().to_string();
                    continue;
                }

                let caps = TYPE_LINE.captures(line)
                    .ok_or_else(|| err(lno, format!("malformed type declaration {line:?}")))?;
                let generic_params = caps.name("generics")
                    .map(|g| g.as_str().split(',').map(|p| p.trim().to_string()).collect())
                    .unwrap_or_default();

                types.push(ExtType {
                    name: caps["name"].to_string(),
                    base: caps.name("base").map(|b| b.as_str().to_string()),
                    is_value_type: &caps["kind"] == "value",
                    generic_params,
                    members: vec![],
                    assembly: assembly.clone(),
                });
                continue;
            }

            let owner = types.last_mut()
                .ok_or_else(|| err(lno, "member outside of a type".to_string()))?;
            let caps = MEMBER_LINE.captures(line)
                .ok_or_else(|| err(lno, format!("malformed member {line:?}")))?;

            let mods: Vec<_> = caps["mods"].split_whitespace().collect();
            let visibility = mods.iter()
                .find_map(|m| match *m {
                    "public"      => Some(Visibility::Public),
                    "private"     => Some(Visibility::Private),
                    "family"      => Some(Visibility::Family),
                    "assembly"    => Some(Visibility::Assembly),
                    "famorassem"  => Some(Visibility::FamOrAssem),
                    "famandassem" => Some(Visibility::FamAndAssem),
                    _ => None
                })
                .unwrap_or(Visibility::Public);

            let access: Vec<_> = caps["access"].split_whitespace().collect();
            let kind = match &caps["kind"] {
                "ctor" => ExtMemberKind::Ctor,
                "method" => ExtMemberKind::Method,
                _ => ExtMemberKind::Property { get: access.contains(&"get"), set: access.contains(&"set") },
            };

            let name = match (kind, caps.name("name")) {
                (ExtMemberKind::Ctor, None) => String::from(".ctor"),
                (ExtMemberKind::Ctor, Some(_)) => return Err(err(lno, "constructors have no name".to_string())),
                (_, Some(n)) => n.as_str().to_string(),
                (_, None) => return Err(err(lno, "member needs a name".to_string())),
            };
            if matches!(kind, ExtMemberKind::Property { .. }) && caps.name("ret").is_none() {
                return Err(err(lno, format!("property {name} needs a type")));
            }

            let params = caps.name("params")
                .map(|p| p.as_str().split(',').map(str::trim).filter(|p| !p.is_empty()).map(String::from).collect())
                .unwrap_or_default();

            owner.members.push(ExtMember {
                name,
                kind,
                params,
                ret: caps.name("ret").map(|r| r.as_str().to_string()),
                is_static: mods.contains(&"static"),
                is_virtual: mods.contains(&"virtual"),
                visibility,
            });
        }

        for ty in types {
            let mut ns = ty.name.as_str();
            while let Some((prefix, _)) = ns.rsplit_once('.') {
                self.namespaces.insert(prefix.to_string());
                ns = prefix;
            }
            self.types.insert(ty.name.clone(), Arc::new(ty));
        }

        log::debug!("loaded library {path}; {} types known", self.types.len());
        Ok(())
    }
}

impl TypeOracle for Library {
    fn is_namespace(&self, name: &str) -> bool {
        self.namespaces.contains(name)
    }

    fn find_type(&self, name: &str) -> Option<Arc<ExtType>> {
        self.types.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corlib_loads() {
        let lib = Library::with_corlib();

        assert!(lib.is_namespace("System"));
        assert!(lib.is_namespace("System.Collections.Generic"));
        assert!(!lib.is_namespace("System.String"));

        let string = lib.find_type("System.String").unwrap();
        assert_eq!(string.base.as_deref(), Some("System.Object"));
        assert!(!string.is_value_type);
        assert_eq!(string.assembly, "mscorlib");

        let concat = string.members.iter().find(|m| m.name == "Concat").unwrap();
        assert!(concat.is_static);
        assert_eq!(concat.params, ["System.String", "System.String"]);
        assert_eq!(concat.ret.as_deref(), Some("System.String"));

        assert!(lib.find_type("System.Int32").unwrap().is_value_type);

        let list = lib.find_type("System.Collections.Generic.List`1").unwrap();
        assert_eq!(list.generic_params, ["T"]);
        let dict = lib.find_type("System.Collections.Generic.Dictionary`2").unwrap();
        assert_eq!(dict.generic_params, ["TKey", "TValue"]);
    }

    #[test]
    fn member_attributes() {
        let lib = Library::with_corlib();
        let object = lib.find_type("System.Object").unwrap();

        let clone = object.members.iter().find(|m| m.name == "MemberwiseClone").unwrap();
        assert_eq!(clone.visibility, Visibility::Family);
        let to_string = object.members.iter().find(|m| m.name == "ToString").unwrap();
        assert!(to_string.is_virtual);
        assert!(object.members.iter().any(|m| m.kind == ExtMemberKind::Ctor && m.params.is_empty()));

        let sb = lib.find_type("System.Text.StringBuilder").unwrap();
        let cap = sb.members.iter().find(|m| m.name == "Capacity").unwrap();
        assert_eq!(cap.kind, ExtMemberKind::Property { get: true, set: true });
    }

    #[test]
    fn assignability() {
        let lib = Library::with_corlib();
        let string = lib.find_type("System.String").unwrap();
        let object = lib.find_type("System.Object").unwrap();
        let int = lib.find_type("System.Int32").unwrap();

        assert!(lib.is_assignable(&string, &object));
        assert!(lib.is_assignable(&int, &object));
        assert!(!lib.is_assignable(&object, &string));
        assert!(!lib.is_assignable(&int, &string));
    }

    #[test]
    fn malformed_library() {
        let mut lib = Library::new();
        let e = lib.load_str("type A\n    method\n", "bad.vmeta").unwrap_err();
        assert_eq!(e.line, 2);
        assert!(lib.find_type("A").is_none());

        let e = lib.load_str("  ctor ()\n", "bad.vmeta").unwrap_err();
        assert_eq!(e.msg, "member outside of a type");

        lib.load_str("assembly Extra\ntype Extra.Thing : System.Object\n    static method Make () : Extra.Thing\n", "extra").unwrap();
        assert_eq!(lib.find_type("Extra.Thing").unwrap().assembly, "Extra");
    }
}
