//! The semantic type model: type nodes, qualifiers and content-addressed ids.

use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// content-addressed handle for a type node in a [`crate::registry::TypeTable`].
///
/// structural kinds (pointer, array, function, primitive) hash their full
/// shape, so independently built identical chains share one id. named kinds
/// (struct, union, enum) hash their tag only, which keeps the id stable when
/// an opaque forward declaration is completed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub u64);

/// qualifier bit-set: const, restrict, volatile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Quals(u8);

impl Quals {
    pub const NONE: Quals = Quals(0);
    pub const CONST: Quals = Quals(1);
    pub const RESTRICT: Quals = Quals(2);
    pub const VOLATILE: Quals = Quals(4);

    pub fn contains(self, other: Quals) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Quals {
    type Output = Quals;
    fn bitor(self, rhs: Quals) -> Quals {
        Quals(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Quals {
    fn bitor_assign(&mut self, rhs: Quals) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallConv {
    Cdecl,
    Stdcall,
}

/// struct or union member. `quals` carries the element qualifiers; `bitsize`
/// is present for bitfields (a width of 0 closes the current storage unit).
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    pub quals: Quals,
    pub bitsize: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

/// shared shape of struct and union nodes. `fields` is None while the tag is
/// only known opaquely; completion fills it in place without moving the node.
/// `forcename` marks an anonymous body that took its name from a typedef and
/// therefore renders as the bare name.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    pub tag: String,
    pub forcename: bool,
    pub fields: Option<Vec<Field>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    Primitive {
        name: String,
    },
    /// `quals` qualify the pointee, matching the C reading where a qualifier
    /// written after a `*` belongs to the pointer level to its left
    Pointer {
        to: TypeId,
        quals: Quals,
    },
    Array {
        of: TypeId,
        len: Option<u64>,
    },
    Function {
        args: Vec<TypeId>,
        result: TypeId,
        varargs: bool,
        convention: CallConv,
    },
    Struct(Composite),
    Union(Composite),
    /// `partial` marks a tag that has only been mentioned without a body
    Enum {
        tag: String,
        members: Vec<EnumMember>,
        partial: bool,
    },
}

/// canonical form for hashing. named kinds reduce to their tag so the id
/// survives in-place completion; everything else keeps its full structure.
#[derive(Serialize)]
enum CanonicalType<'a> {
    Void,
    Primitive {
        name: &'a str,
    },
    Pointer {
        to: TypeId,
        quals: Quals,
    },
    Array {
        of: TypeId,
        len: Option<u64>,
    },
    Function {
        args: &'a [TypeId],
        result: TypeId,
        varargs: bool,
        convention: CallConv,
    },
    Struct {
        tag: &'a str,
    },
    Union {
        tag: &'a str,
    },
    Enum {
        tag: &'a str,
    },
}

impl TypeKind {
    fn to_canonical(&self) -> CanonicalType<'_> {
        match self {
            TypeKind::Void => CanonicalType::Void,
            TypeKind::Primitive { name } => CanonicalType::Primitive { name },
            TypeKind::Pointer { to, quals } => CanonicalType::Pointer {
                to: *to,
                quals: *quals,
            },
            TypeKind::Array { of, len } => CanonicalType::Array {
                of: *of,
                len: *len,
            },
            TypeKind::Function {
                args,
                result,
                varargs,
                convention,
            } => CanonicalType::Function {
                args,
                result: *result,
                varargs: *varargs,
                convention: *convention,
            },
            TypeKind::Struct(c) => CanonicalType::Struct { tag: &c.tag },
            TypeKind::Union(c) => CanonicalType::Union { tag: &c.tag },
            TypeKind::Enum { tag, .. } => CanonicalType::Enum { tag },
        }
    }

    /// short name for log lines
    pub(crate) fn display_name(&self) -> String {
        match self {
            TypeKind::Void => "void".to_string(),
            TypeKind::Primitive { name } => name.clone(),
            TypeKind::Pointer { .. } => "<pointer>".to_string(),
            TypeKind::Array { .. } => "<array>".to_string(),
            TypeKind::Function { .. } => "<function>".to_string(),
            TypeKind::Struct(c) => format!("struct {}", c.tag),
            TypeKind::Union(c) => format!("union {}", c.tag),
            TypeKind::Enum { tag, .. } => format!("enum {}", tag),
        }
    }
}

pub(crate) fn compute_type_id(kind: &TypeKind) -> TypeId {
    use bincode::Options;

    let canonical = kind.to_canonical();

    let bytes = bincode::DefaultOptions::new()
        .with_fixint_encoding() // ensure consistent integer encoding
        .serialize(&canonical)
        .expect("serialization cannot fail");

    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    TypeId(hasher.finish())
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
