use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::ManagedTypeHandle;

/// The four kinds of type the native framework can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Struct,
    Enum,
    Interface,
}

impl TypeKind {
    pub const ALL: [TypeKind; 4] = [
        TypeKind::Class,
        TypeKind::Struct,
        TypeKind::Enum,
        TypeKind::Interface,
    ];
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Class => write!(f, "class"),
            TypeKind::Struct => write!(f, "struct"),
            TypeKind::Enum => write!(f, "enum"),
            TypeKind::Interface => write!(f, "interface"),
        }
    }
}

/// Identity of a native type descriptor object.
///
/// The native framework owns the object itself; Tether only holds ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeTypeId(u64);

impl NativeTypeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NativeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A by-name reference to another type, as written in module metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeReference {
    pub name: String,
    pub namespace: String,
    pub assembly: String,
}

impl TypeReference {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Property,
    Function,
    EnumItem,
}

/// One member of a type: a property, a function, or an enum item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
    /// Property type or function return type, if any.
    pub type_name: Option<String>,
}

impl MemberDescriptor {
    pub fn property(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Property,
            type_name: Some(type_name.into()),
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Function,
            type_name: None,
        }
    }

    pub fn enum_item(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::EnumItem,
            type_name: None,
        }
    }
}

/// Parsed description of one managed type. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMetadataRecord {
    pub kind: TypeKind,
    pub name: String,
    pub namespace: String,
    pub assembly: String,
    pub parent: Option<TypeReference>,
    pub members: Vec<MemberDescriptor>,
    pub interfaces: Vec<String>,
    /// Editor-facing name, when it differs from `name`.
    pub display_name: Option<String>,
}

impl TypeMetadataRecord {
    pub fn new(kind: TypeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: String::new(),
            assembly: String::new(),
            parent: None,
            members: Vec::new(),
            interfaces: Vec::new(),
            display_name: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(TypeReference::named(parent));
        self
    }

    pub fn with_member(mut self, member: MemberDescriptor) -> Self {
        self.members.push(member);
        self
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.name.as_str())
    }

    pub fn properties(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter().filter(|m| m.kind == MemberKind::Property)
    }

    pub fn functions(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter().filter(|m| m.kind == MemberKind::Function)
    }
}

/// What the native framework reports about one of its type objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeTypeInfo {
    pub id: NativeTypeId,
    pub kind: TypeKind,
    pub name: String,
    pub namespace: String,
    pub parent: Option<NativeTypeId>,
    /// Set once a newer version of the type has replaced this one.
    pub superseded: bool,
}

/// A built type as seen by the rest of Tether: the native descriptor plus
/// the managed type it is backed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub name: String,
    pub native: NativeTypeId,
    pub managed: Option<ManagedTypeHandle>,
}
