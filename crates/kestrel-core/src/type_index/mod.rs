//! # Type Index
//!
//! Type lookup by name.
//!
//! Names follow C conventions: a `struct `, `union `, `enum ` or `class `
//! keyword restricts the lookup to tagged types of that kind
//! (`struct task_struct`), while a bare name (`pid_t`, `u64`) prefers
//! typedefs and base types and falls back to a tag of the same name.
//!
//! Two implementations exist:
//!
//! - [`MockTypeIndex`]: a fixed list of descriptors, for mock programs
//! - [`DwarfTypeIndex`]: DWARF from the target's ELF files, parsed lazily

mod dwarf;

use std::sync::Arc;

use crate::error::Result;

pub use dwarf::DwarfTypeIndex;

/// Category of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind
{
    Void,
    Int,
    Bool,
    Float,
    Struct,
    Union,
    Class,
    Enum,
    Typedef,
    Pointer,
    Array,
    Function,
}

impl TypeKind
{
    /// Returns `true` for kinds that live in the C tag namespace.
    pub fn is_tagged(self) -> bool
    {
        matches!(self, TypeKind::Struct | TypeKind::Union | TypeKind::Class | TypeKind::Enum)
    }

    fn keyword(self) -> Option<&'static str>
    {
        match self {
            TypeKind::Struct => Some("struct"),
            TypeKind::Union => Some("union"),
            TypeKind::Class => Some("class"),
            TypeKind::Enum => Some("enum"),
            _ => None,
        }
    }
}

/// Member of a structure, union or class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMember
{
    /// `None` for anonymous members
    pub name: Option<String>,
    /// Name of the member's type, when it has one
    pub type_name: Option<String>,
    pub bit_offset: Option<u64>,
}

/// Named constant of an enumerated type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator
{
    pub name: String,
    pub value: i64,
}

/// Summary of a type found in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor
{
    pub name: String,
    pub kind: TypeKind,
    /// Size in bytes; `None` for incomplete and function types
    pub size: Option<u64>,
    pub members: Vec<TypeMember>,
    pub enumerators: Vec<Enumerator>,
}

impl TypeDescriptor
{
    pub fn new(name: impl Into<String>, kind: TypeKind, size: Option<u64>) -> Self
    {
        Self {
            name: name.into(),
            kind,
            size,
            members: Vec::new(),
            enumerators: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_member(mut self, name: impl Into<String>, type_name: impl Into<String>, bit_offset: u64) -> Self
    {
        self.members.push(TypeMember {
            name: Some(name.into()),
            type_name: Some(type_name.into()),
            bit_offset: Some(bit_offset),
        });
        self
    }

    #[must_use]
    pub fn with_enumerator(mut self, name: impl Into<String>, value: i64) -> Self
    {
        self.enumerators.push(Enumerator {
            name: name.into(),
            value,
        });
        self
    }

    /// Name as written in C, with the tag keyword for tagged types.
    pub fn display_name(&self) -> String
    {
        match self.kind.keyword() {
            Some(keyword) => format!("{keyword} {}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A parsed type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeQuery<'a>
{
    /// Kind required by a tag keyword
    pub kind: Option<TypeKind>,
    pub name: &'a str,
}

impl<'a> TypeQuery<'a>
{
    /// Split an optional tag keyword off `text`.
    ///
    /// ```rust
    /// use kestrel_core::type_index::{TypeKind, TypeQuery};
    ///
    /// let query = TypeQuery::parse("struct  task_struct");
    /// assert_eq!(query.kind, Some(TypeKind::Struct));
    /// assert_eq!(query.name, "task_struct");
    /// assert_eq!(TypeQuery::parse("pid_t").kind, None);
    /// ```
    pub fn parse(text: &'a str) -> Self
    {
        let text = text.trim();
        for (keyword, kind) in [
            ("struct", TypeKind::Struct),
            ("union", TypeKind::Union),
            ("class", TypeKind::Class),
            ("enum", TypeKind::Enum),
        ] {
            if let Some(rest) = text.strip_prefix(keyword) {
                if rest.starts_with(char::is_whitespace) {
                    return Self {
                        kind: Some(kind),
                        name: rest.trim_start(),
                    };
                }
            }
        }
        Self { kind: None, name: text }
    }

    /// Returns `true` if a type of `kind` named `name` satisfies the query
    /// directly. Bare names never match tagged types here; callers fall back
    /// to tags separately.
    pub fn matches(&self, name: &str, kind: TypeKind) -> bool
    {
        if name != self.name {
            return false;
        }
        match self.kind {
            Some(wanted) => wanted == kind,
            None => !kind.is_tagged(),
        }
    }
}

/// Type lookup as seen by a program.
pub trait TypeIndex: Send
{
    /// Find a type by name.
    ///
    /// ## Errors
    ///
    /// `MalformedTarget` if the debug information backing the index is
    /// corrupt. A type that simply isn't there is `Ok(None)`.
    fn find(&self, name: &str) -> Result<Option<Arc<TypeDescriptor>>>;
}

/// Fixed set of type descriptors.
#[derive(Debug, Default)]
pub struct MockTypeIndex
{
    types: Vec<Arc<TypeDescriptor>>,
}

impl MockTypeIndex
{
    pub fn new(types: impl IntoIterator<Item = TypeDescriptor>) -> Self
    {
        Self {
            types: types.into_iter().map(Arc::new).collect(),
        }
    }
}

impl TypeIndex for MockTypeIndex
{
    fn find(&self, name: &str) -> Result<Option<Arc<TypeDescriptor>>>
    {
        let query = TypeQuery::parse(name);
        let direct = self.types.iter().find(|ty| query.matches(&ty.name, ty.kind));
        let found = direct.or_else(|| {
            query
                .kind
                .is_none()
                .then(|| self.types.iter().find(|ty| ty.name == query.name))
                .flatten()
        });
        Ok(found.cloned())
    }
}
