//! Memory layout computation over a completed type graph.
//!
//! This is the collaborator-facing side of the model: given a target
//! description it computes size, alignment and field offsets. Anything a
//! layout cannot exist for (opaque tags, unsized arrays, functions, void,
//! direct-embedding cycles) is reported as an incomplete type.

use crate::error::{Error, Result};
use crate::model::{Field, TypeId, TypeKind};
use crate::registry::TypeTable;
use std::collections::HashSet;

/// target description: the handful of widths that vary between the data
/// models the renderer and layout care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub pointer_size: usize,
    pub long_size: usize,
    pub wchar_size: usize,
    pub long_double_size: usize,
    pub long_double_align: usize,
    /// largest natural alignment of any scalar
    pub max_align: usize,
}

impl Target {
    /// 64-bit unix
    pub fn lp64() -> Self {
        Self {
            pointer_size: 8,
            long_size: 8,
            wchar_size: 4,
            long_double_size: 16,
            long_double_align: 16,
            max_align: 8,
        }
    }

    /// 32-bit
    pub fn ilp32() -> Self {
        Self {
            pointer_size: 4,
            long_size: 4,
            wchar_size: 4,
            long_double_size: 12,
            long_double_align: 4,
            max_align: 4,
        }
    }

    /// 64-bit windows
    pub fn llp64() -> Self {
        Self {
            pointer_size: 8,
            long_size: 4,
            wchar_size: 2,
            long_double_size: 8,
            long_double_align: 8,
            max_align: 8,
        }
    }

    pub fn host() -> Self {
        #[cfg(target_pointer_width = "32")]
        {
            Self::ilp32()
        }
        #[cfg(not(target_pointer_width = "32"))]
        {
            #[cfg(windows)]
            {
                Self::llp64()
            }
            #[cfg(not(windows))]
            {
                Self::lp64()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
}

/// resolved placement of one struct/union member. `bits` carries the bit
/// offset and width inside the storage unit for bitfields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOffset {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    pub bits: Option<(u32, u32)>,
}

pub struct LayoutEngine<'t> {
    types: &'t TypeTable,
    target: Target,
    // tags currently being laid out, to reject embedding cycles
    active: HashSet<TypeId>,
}

impl<'t> LayoutEngine<'t> {
    pub fn new(types: &'t TypeTable, target: Target) -> Self {
        Self {
            types,
            target,
            active: HashSet::new(),
        }
    }

    pub fn layout_of(&mut self, id: TypeId) -> Result<Layout> {
        let kind = self.types.get(id).ok_or_else(|| Error::Incomplete {
            what: "dangling type handle".to_string(),
        })?;
        match kind {
            TypeKind::Void => Err(Error::Incomplete {
                what: "void has no size".to_string(),
            }),
            TypeKind::Primitive { name } => self.primitive_layout(name),
            TypeKind::Pointer { .. } => Ok(Layout {
                size: self.target.pointer_size,
                align: self.target.pointer_size,
            }),
            TypeKind::Array { of, len } => {
                let of = *of;
                let Some(n) = *len else {
                    return Err(Error::Incomplete {
                        what: "array of unknown length".to_string(),
                    });
                };
                let elem = self.layout_of(of)?;
                Ok(Layout {
                    size: elem.size * n as usize,
                    align: elem.align,
                })
            }
            TypeKind::Function { .. } => Err(Error::Incomplete {
                what: "function type has no size".to_string(),
            }),
            TypeKind::Enum { .. } => Ok(Layout { size: 4, align: 4 }),
            TypeKind::Struct(c) => {
                let tag = c.tag.clone();
                let Some(fields) = c.fields.clone() else {
                    return Err(Error::Incomplete {
                        what: format!("opaque struct {}", tag),
                    });
                };
                self.enter(id, &tag)?;
                let result = self.struct_layout(&fields);
                self.active.remove(&id);
                result
            }
            TypeKind::Union(c) => {
                let tag = c.tag.clone();
                let Some(fields) = c.fields.clone() else {
                    return Err(Error::Incomplete {
                        what: format!("opaque union {}", tag),
                    });
                };
                self.enter(id, &tag)?;
                let result = self.union_layout(&fields);
                self.active.remove(&id);
                result
            }
        }
    }

    /// field placements for a completed struct or union.
    pub fn offsets_of(&mut self, id: TypeId) -> Result<Vec<FieldOffset>> {
        let kind = self.types.get(id).ok_or_else(|| Error::Incomplete {
            what: "dangling type handle".to_string(),
        })?;
        match kind {
            TypeKind::Struct(c) => {
                let tag = c.tag.clone();
                let Some(fields) = c.fields.clone() else {
                    return Err(Error::Incomplete {
                        what: format!("opaque struct {}", tag),
                    });
                };
                self.enter(id, &tag)?;
                let result = self.place_fields(&fields).map(|(offsets, _)| offsets);
                self.active.remove(&id);
                result
            }
            TypeKind::Union(c) => {
                let tag = c.tag.clone();
                let Some(fields) = c.fields.clone() else {
                    return Err(Error::Incomplete {
                        what: format!("opaque union {}", tag),
                    });
                };
                self.enter(id, &tag)?;
                let mut out = Vec::with_capacity(fields.len());
                for f in &fields {
                    let l = self.layout_of(f.ty);
                    match l {
                        Ok(l) => out.push(FieldOffset {
                            name: f.name.clone(),
                            offset: 0,
                            size: l.size,
                            bits: f.bitsize.map(|w| (0, w)),
                        }),
                        Err(e) => {
                            self.active.remove(&id);
                            return Err(e);
                        }
                    }
                }
                self.active.remove(&id);
                Ok(out)
            }
            _ => Err(Error::Incomplete {
                what: "field offsets require a struct or union".to_string(),
            }),
        }
    }

    fn enter(&mut self, id: TypeId, tag: &str) -> Result<()> {
        if !self.active.insert(id) {
            return Err(Error::Incomplete {
                what: format!("recursive embedding of {}", tag),
            });
        }
        Ok(())
    }

    fn struct_layout(&mut self, fields: &[Field]) -> Result<Layout> {
        let (_, layout) = self.place_fields(fields)?;
        Ok(layout)
    }

    /// C struct rules: each non-bitfield member goes to the next offset
    /// aligned for its type; bitfields pack into storage units of their
    /// declared type as long as they fit, and a zero width closes the unit.
    fn place_fields(&mut self, fields: &[Field]) -> Result<(Vec<FieldOffset>, Layout)> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        let mut align = 1usize;
        // open bitfield unit: (unit offset, unit layout, bits used)
        let mut unit: Option<(usize, Layout, u32)> = None;

        for f in fields {
            let fl = self.layout_of(f.ty)?;
            align = align.max(fl.align);
            match f.bitsize {
                Some(0) => {
                    unit = None;
                }
                Some(width) => {
                    let unit_bits = (fl.size * 8) as u32;
                    match unit {
                        Some((uoff, ul, used))
                            if ul.size == fl.size && used + width <= unit_bits =>
                        {
                            offsets.push(FieldOffset {
                                name: f.name.clone(),
                                offset: uoff,
                                size: fl.size,
                                bits: Some((used, width)),
                            });
                            unit = Some((uoff, ul, used + width));
                        }
                        _ => {
                            let uoff = round_up(offset, fl.align);
                            offset = uoff + fl.size;
                            offsets.push(FieldOffset {
                                name: f.name.clone(),
                                offset: uoff,
                                size: fl.size,
                                bits: Some((0, width)),
                            });
                            unit = Some((uoff, fl, width));
                        }
                    }
                }
                None => {
                    unit = None;
                    let foff = round_up(offset, fl.align);
                    offset = foff + fl.size;
                    offsets.push(FieldOffset {
                        name: f.name.clone(),
                        offset: foff,
                        size: fl.size,
                        bits: None,
                    });
                }
            }
        }

        let size = round_up(offset, align);
        Ok((offsets, Layout { size, align }))
    }

    fn union_layout(&mut self, fields: &[Field]) -> Result<Layout> {
        let mut size = 0usize;
        let mut align = 1usize;
        for f in fields {
            let fl = self.layout_of(f.ty)?;
            size = size.max(fl.size);
            align = align.max(fl.align);
        }
        Ok(Layout {
            size: round_up(size, align),
            align,
        })
    }

    fn primitive_layout(&self, name: &str) -> Result<Layout> {
        let t = &self.target;
        let size = match name {
            "char" | "signed char" | "unsigned char" | "_Bool" | "int8_t" | "uint8_t" => 1,
            "short" | "unsigned short" | "int16_t" | "uint16_t" => 2,
            "int" | "unsigned int" | "int32_t" | "uint32_t" | "float" => 4,
            "long" | "unsigned long" => t.long_size,
            "long long" | "unsigned long long" | "int64_t" | "uint64_t" | "double" => 8,
            "intptr_t" | "uintptr_t" | "ptrdiff_t" | "size_t" | "ssize_t" => t.pointer_size,
            "wchar_t" => t.wchar_size,
            "long double" => {
                return Ok(Layout {
                    size: t.long_double_size,
                    align: t.long_double_align,
                });
            }
            other => {
                return Err(Error::Incomplete {
                    what: format!("unknown primitive '{}'", other),
                });
            }
        };
        Ok(Layout {
            size,
            align: size.min(t.max_align),
        })
    }
}

fn round_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Composite, Quals};

    fn prim(t: &mut TypeTable, name: &str) -> TypeId {
        t.intern(TypeKind::Primitive {
            name: name.to_string(),
        })
    }

    fn field(name: &str, ty: TypeId) -> Field {
        Field {
            name: name.to_string(),
            ty,
            quals: Quals::NONE,
            bitsize: None,
        }
    }

    #[test]
    fn test_padding_between_fields() {
        let mut t = TypeTable::new();
        let c = prim(&mut t, "char");
        let i = prim(&mut t, "int");
        let s = t.intern(TypeKind::Struct(Composite {
            tag: "s".to_string(),
            forcename: false,
            fields: Some(vec![field("c", c), field("i", i)]),
        }));
        let mut e = LayoutEngine::new(&t, Target::lp64());
        assert_eq!(e.layout_of(s).unwrap(), Layout { size: 8, align: 4 });
        let offs = e.offsets_of(s).unwrap();
        assert_eq!(offs[0].offset, 0);
        assert_eq!(offs[1].offset, 4);
    }

    #[test]
    fn test_union_is_max() {
        let mut t = TypeTable::new();
        let i = prim(&mut t, "int");
        let d = prim(&mut t, "double");
        let u = t.intern(TypeKind::Union(Composite {
            tag: "u".to_string(),
            forcename: false,
            fields: Some(vec![field("i", i), field("d", d)]),
        }));
        let mut e = LayoutEngine::new(&t, Target::lp64());
        assert_eq!(e.layout_of(u).unwrap(), Layout { size: 8, align: 8 });
    }

    #[test]
    fn test_array_layout() {
        let mut t = TypeTable::new();
        let i = prim(&mut t, "int");
        let a = t.intern(TypeKind::Array {
            of: i,
            len: Some(5),
        });
        let mut e = LayoutEngine::new(&t, Target::lp64());
        assert_eq!(e.layout_of(a).unwrap(), Layout { size: 20, align: 4 });
    }

    #[test]
    fn test_pointer_to_opaque_struct_is_a_pointer() {
        let mut t = TypeTable::new();
        let s = t.intern(TypeKind::Struct(Composite {
            tag: "opaque".to_string(),
            forcename: false,
            fields: None,
        }));
        let p = t.intern(TypeKind::Pointer {
            to: s,
            quals: Quals::NONE,
        });
        let mut e = LayoutEngine::new(&t, Target::lp64());
        assert_eq!(e.layout_of(p).unwrap().size, 8);
        assert!(matches!(
            e.layout_of(s),
            Err(Error::Incomplete { .. })
        ));
    }

    #[test]
    fn test_embedding_cycle_rejected() {
        let mut t = TypeTable::new();
        let a = t.intern(TypeKind::Struct(Composite {
            tag: "a".to_string(),
            forcename: false,
            fields: None,
        }));
        let b = t.intern(TypeKind::Struct(Composite {
            tag: "b".to_string(),
            forcename: false,
            fields: Some(vec![field("a", a)]),
        }));
        t.set(
            a,
            TypeKind::Struct(Composite {
                tag: "a".to_string(),
                forcename: false,
                fields: Some(vec![field("b", b)]),
            }),
        );
        let mut e = LayoutEngine::new(&t, Target::lp64());
        assert!(matches!(e.layout_of(a), Err(Error::Incomplete { .. })));
    }

    #[test]
    fn test_bitfield_packing() {
        let mut t = TypeTable::new();
        let i = prim(&mut t, "int");
        let mk = |name: &str, w: u32| Field {
            name: name.to_string(),
            ty: i,
            quals: Quals::NONE,
            bitsize: Some(w),
        };
        let s = t.intern(TypeKind::Struct(Composite {
            tag: "bits".to_string(),
            forcename: false,
            fields: Some(vec![mk("a", 3), mk("b", 5), mk("sep", 0), mk("c", 1)]),
        }));
        let mut e = LayoutEngine::new(&t, Target::lp64());
        let offs = e.offsets_of(s).unwrap();
        assert_eq!(offs[0].bits, Some((0, 3)));
        assert_eq!(offs[1].bits, Some((3, 5)));
        assert_eq!(offs[0].offset, offs[1].offset);
        // after the zero-width separator, c starts a fresh unit
        assert_eq!(offs[2].bits, Some((0, 1)));
        assert!(offs[2].offset > offs[1].offset);
    }

    #[test]
    fn test_long_differs_by_target() {
        let mut t = TypeTable::new();
        let l = prim(&mut t, "long");
        assert_eq!(
            LayoutEngine::new(&t, Target::lp64()).layout_of(l).unwrap().size,
            8
        );
        assert_eq!(
            LayoutEngine::new(&t, Target::llp64()).layout_of(l).unwrap().size,
            4
        );
        assert_eq!(
            LayoutEngine::new(&t, Target::ilp32()).layout_of(l).unwrap().size,
            4
        );
    }
}
