//! Type table and declaration namespace for one session.

use crate::error::{Error, Result};
use crate::model::{TypeId, TypeKind, Quals, compute_type_id};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// central store of type nodes, addressed by content.
///
/// interning an already-known structure returns the existing id, which makes
/// the table double as the structural-equality cache: two pointer chains
/// built independently compare equal by id.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: HashMap<TypeId, TypeKind>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// register a type, deduplicating against existing entries. for named
    /// kinds the existing entry wins, so an opaque reference to an already
    /// completed struct does not erase its fields.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        let id = compute_type_id(&kind);
        if self.types.contains_key(&id) {
            log::trace!("type already interned with id {}", id);
            return id;
        }
        log::trace!("interned {} with id {}", kind.display_name(), id);
        self.types.insert(id, kind);
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeKind> {
        self.types.get(&id)
    }

    /// replace a node in place. the caller guarantees the new kind keeps the
    /// same identity (same tag for named kinds), so references held by other
    /// nodes stay valid.
    pub(crate) fn set(&mut self, id: TypeId, kind: TypeKind) {
        debug_assert_eq!(compute_type_id(&kind), id);
        self.types.insert(id, kind);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// merge another table into this one. content addressing makes this a
    /// union; the only conflicts possible are named tags completed with
    /// different bodies on each side, which are reported instead of merged.
    /// an opaque entry on one side is upgraded by a completed one from the
    /// other.
    pub fn merge_from(&mut self, other: &TypeTable) -> Result<()> {
        let initial = self.len();
        for (id, kind) in &other.types {
            match self.types.get(id) {
                None => {
                    self.types.insert(*id, kind.clone());
                }
                Some(existing) if existing == kind => {}
                Some(existing) => {
                    if let Some(merged) = resolve_named_conflict(existing, kind) {
                        match merged {
                            Keep::Existing => {}
                            Keep::Incoming => {
                                self.types.insert(*id, kind.clone());
                            }
                        }
                    } else {
                        return Err(Error::Redefinition {
                            kind: conflict_kind(existing),
                            name: kind.display_name(),
                        });
                    }
                }
            }
        }
        let added = self.len() - initial;
        log::debug!(
            "merged type table: {} types, {} new, {} shared",
            other.len(),
            added,
            other.len() - added
        );
        Ok(())
    }
}

enum Keep {
    Existing,
    Incoming,
}

/// named kinds share an id across completion states; decide which body wins,
/// or None if both sides are complete and disagree.
fn resolve_named_conflict(existing: &TypeKind, incoming: &TypeKind) -> Option<Keep> {
    match (existing, incoming) {
        (TypeKind::Struct(a), TypeKind::Struct(b)) | (TypeKind::Union(a), TypeKind::Union(b)) => {
            match (&a.fields, &b.fields) {
                (Some(_), None) => Some(Keep::Existing),
                (None, Some(_)) => Some(Keep::Incoming),
                _ => None,
            }
        }
        (
            TypeKind::Enum { partial: pa, .. },
            TypeKind::Enum { partial: pb, .. },
        ) => match (pa, pb) {
            (false, true) => Some(Keep::Existing),
            (true, false) => Some(Keep::Incoming),
            _ => None,
        },
        _ => None,
    }
}

fn conflict_kind(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Union(_) => "union",
        TypeKind::Enum { .. } => "enum",
        _ => "struct",
    }
}

/// namespace of top-level declarations, keyed by kind and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Typedef,
    Struct,
    Union,
    Enum,
    Function,
    Variable,
    Constant,
    Macro,
    ExternPython,
    Anonymous,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Typedef => "typedef",
            DeclKind::Struct => "struct",
            DeclKind::Union => "union",
            DeclKind::Enum => "enum",
            DeclKind::Function => "function",
            DeclKind::Variable => "variable",
            DeclKind::Constant => "constant",
            DeclKind::Macro => "macro",
            DeclKind::ExternPython => "extern_python",
            DeclKind::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclEntry {
    pub ty: TypeId,
    pub quals: Quals,
    /// evaluated value for integer constants (enum members, `#define` ints)
    pub value: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct DeclMap {
    decls: HashMap<(DeclKind, String), DeclEntry>,
    order: Vec<(DeclKind, String)>,
}

impl DeclMap {
    pub fn new() -> Self {
        Self {
            decls: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// register a declaration. redeclaring an identical entry is a no-op;
    /// a conflicting entry fails unless `replace` is set, in which case the
    /// previous entry is superseded.
    pub fn declare(
        &mut self,
        kind: DeclKind,
        name: &str,
        entry: DeclEntry,
        replace: bool,
    ) -> Result<()> {
        let key = (kind, name.to_string());
        if let Some(existing) = self.decls.get_mut(&key) {
            if *existing == entry {
                log::trace!("{:>12} {} (identical redeclaration)", kind.as_str(), name);
                return Ok(());
            }
            if replace {
                log::debug!("{:>12} {} (replaced)", kind.as_str(), name);
                *existing = entry;
                return Ok(());
            }
            return Err(Error::Redefinition {
                kind: kind.as_str(),
                name: name.to_string(),
            });
        }
        log::debug!("{:>12} {}", kind.as_str(), name);
        self.decls.insert(key.clone(), entry);
        self.order.push(key);
        Ok(())
    }

    pub fn lookup(&self, kind: DeclKind, name: &str) -> Option<&DeclEntry> {
        self.decls.get(&(kind, name.to_string()))
    }

    pub fn contains(&self, kind: DeclKind, name: &str) -> bool {
        self.decls.contains_key(&(kind, name.to_string()))
    }

    /// declarations in registration order
    pub fn iter_ordered(&self) -> impl Iterator<Item = (DeclKind, &str, &DeclEntry)> {
        self.order.iter().filter_map(|key| {
            self.decls
                .get(key)
                .map(|entry| (key.0, key.1.as_str(), entry))
        })
    }

    pub fn typedef_names(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|(kind, _)| *kind == DeclKind::Typedef)
            .map(|(_, name)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// import another session's declarations. identical entries merge
    /// silently, new ones are added, conflicting ones are reported. the
    /// source map is never modified.
    pub fn merge_from(&mut self, other: &DeclMap) -> Result<()> {
        let mut added = 0usize;
        for (kind, name, entry) in other.iter_ordered() {
            match self.decls.get(&(kind, name.to_string())) {
                Some(existing) if existing == entry => {}
                Some(_) => {
                    return Err(Error::Redefinition {
                        kind: kind.as_str(),
                        name: name.to_string(),
                    });
                }
                None => {
                    let key = (kind, name.to_string());
                    self.decls.insert(key.clone(), entry.clone());
                    self.order.push(key);
                    added += 1;
                }
            }
        }
        log::debug!(
            "included {} declarations, {} new",
            other.len(),
            added
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Composite;

    fn int_kind() -> TypeKind {
        TypeKind::Primitive {
            name: "int".to_string(),
        }
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut table = TypeTable::new();
        let a = table.intern(int_kind());
        let b = table.intern(int_kind());
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);

        let int_id = a;
        let p1 = table.intern(TypeKind::Pointer {
            to: int_id,
            quals: Quals::NONE,
        });
        let p2 = table.intern(TypeKind::Pointer {
            to: int_id,
            quals: Quals::NONE,
        });
        assert_eq!(p1, p2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_opaque_reference_keeps_completed_body() {
        let mut table = TypeTable::new();
        let int_id = table.intern(int_kind());
        let complete = TypeKind::Struct(Composite {
            tag: "point".to_string(),
            forcename: false,
            fields: Some(vec![crate::model::Field {
                name: "x".to_string(),
                ty: int_id,
                quals: Quals::NONE,
                bitsize: None,
            }]),
        });
        let id = table.intern(complete);

        // a later opaque mention must not clobber the fields
        let same = table.intern(TypeKind::Struct(Composite {
            tag: "point".to_string(),
            forcename: false,
            fields: None,
        }));
        assert_eq!(id, same);
        match table.get(id) {
            Some(TypeKind::Struct(c)) => assert!(c.fields.is_some()),
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_in_place_completion() {
        let mut table = TypeTable::new();
        let id = table.intern(TypeKind::Struct(Composite {
            tag: "node".to_string(),
            forcename: false,
            fields: None,
        }));
        // self-referential pointer built against the opaque entry
        let ptr = table.intern(TypeKind::Pointer {
            to: id,
            quals: Quals::NONE,
        });
        table.set(
            id,
            TypeKind::Struct(Composite {
                tag: "node".to_string(),
                forcename: false,
                fields: Some(vec![crate::model::Field {
                    name: "next".to_string(),
                    ty: ptr,
                    quals: Quals::NONE,
                    bitsize: None,
                }]),
            }),
        );
        match table.get(id) {
            Some(TypeKind::Struct(c)) => {
                assert_eq!(c.fields.as_ref().map(|f| f.len()), Some(1));
            }
            other => panic!("expected struct, got {:?}", other),
        }
        // the pointer still resolves through the same id
        match table.get(ptr) {
            Some(TypeKind::Pointer { to, .. }) => assert_eq!(*to, id),
            other => panic!("expected pointer, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_union_of_tables() {
        let mut a = TypeTable::new();
        let mut b = TypeTable::new();
        let int_a = a.intern(int_kind());
        let int_b = b.intern(int_kind());
        assert_eq!(int_a, int_b);
        b.intern(TypeKind::Primitive {
            name: "float".to_string(),
        });

        a.merge_from(&b).unwrap();
        assert_eq!(a.len(), 2);
        // the source table is untouched
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_merge_conflicting_struct_bodies() {
        let mut a = TypeTable::new();
        let mut b = TypeTable::new();
        let int_a = a.intern(int_kind());
        let int_b = b.intern(int_kind());
        a.intern(TypeKind::Struct(Composite {
            tag: "p".to_string(),
            forcename: false,
            fields: Some(vec![crate::model::Field {
                name: "x".to_string(),
                ty: int_a,
                quals: Quals::NONE,
                bitsize: None,
            }]),
        }));
        b.intern(TypeKind::Struct(Composite {
            tag: "p".to_string(),
            forcename: false,
            fields: Some(vec![crate::model::Field {
                name: "y".to_string(),
                ty: int_b,
                quals: Quals::NONE,
                bitsize: None,
            }]),
        }));
        assert!(a.merge_from(&b).is_err());
    }

    #[test]
    fn test_declare_and_redeclare() {
        let mut table = TypeTable::new();
        let int_id = table.intern(int_kind());
        let long_id = table.intern(TypeKind::Primitive {
            name: "long".to_string(),
        });

        let mut decls = DeclMap::new();
        let entry = DeclEntry {
            ty: int_id,
            quals: Quals::NONE,
            value: None,
        };
        decls
            .declare(DeclKind::Function, "foo", entry.clone(), false)
            .unwrap();
        // identical redeclaration is fine
        decls
            .declare(DeclKind::Function, "foo", entry, false)
            .unwrap();

        let conflicting = DeclEntry {
            ty: long_id,
            quals: Quals::NONE,
            value: None,
        };
        let err = decls
            .declare(DeclKind::Function, "foo", conflicting.clone(), false)
            .unwrap_err();
        assert!(matches!(err, Error::Redefinition { .. }));

        // override replaces
        decls
            .declare(DeclKind::Function, "foo", conflicting.clone(), true)
            .unwrap();
        assert_eq!(
            decls.lookup(DeclKind::Function, "foo"),
            Some(&conflicting)
        );
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let mut table = TypeTable::new();
        let int_id = table.intern(int_kind());
        let mut decls = DeclMap::new();
        let entry = DeclEntry {
            ty: int_id,
            quals: Quals::NONE,
            value: None,
        };
        decls
            .declare(DeclKind::Typedef, "foo", entry.clone(), false)
            .unwrap();
        decls
            .declare(DeclKind::Struct, "foo", entry, false)
            .unwrap();
        assert_eq!(decls.len(), 2);
    }
}
