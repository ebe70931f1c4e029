//! Canonical C spellings for type nodes.
//!
//! Rendering builds the spelling with a `&` marker at the declarator
//! position, then substitutes the variable name (or nothing) into it. That
//! keeps pointer, array and function-pointer nesting correct without a
//! second pass: the marker simply travels inward as each level wraps the
//! spelling of its inner type.

use crate::error::{Error, Result};
use crate::model::{CallConv, Quals, TypeId, TypeKind};
use crate::registry::TypeTable;

/// rendering policy. `emit_convention` controls whether `__stdcall` is
/// spelled out on function-pointer levels; on targets where the convention
/// does not exist in the ABI the keyword is dropped.
#[derive(Debug, Clone, Copy)]
pub struct RenderOpts {
    pub emit_convention: bool,
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            emit_convention: false,
        }
    }
}

impl RenderOpts {
    pub fn for_pointer_size(pointer_size: usize) -> Self {
        Self {
            emit_convention: pointer_size == 4,
        }
    }
}

/// the canonical type spelling, e.g. `char * const *` or `int(*)(int, long)`.
pub fn cname(types: &TypeTable, id: TypeId, opts: &RenderOpts) -> Result<String> {
    render(types, id, "", opts)
}

/// the spelling of a declaration of `name` with this type,
/// e.g. `int (*name)[5]`.
pub fn cname_decl(types: &TypeTable, id: TypeId, name: &str, opts: &RenderOpts) -> Result<String> {
    render(types, id, name, opts)
}

fn render(types: &TypeTable, id: TypeId, name: &str, opts: &RenderOpts) -> Result<String> {
    let marker = marker_name(types, id, opts)?;
    let pos = marker.find('&').unwrap_or(marker.len());
    let mut out = String::with_capacity(marker.len() + name.len());
    out.push_str(&marker[..pos]);
    if !name.is_empty() {
        let needs_space = out
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if needs_space {
            out.push(' ');
        }
        out.push_str(name);
    }
    if pos < marker.len() {
        out.push_str(&marker[pos + 1..]);
    }
    Ok(out)
}

fn marker_name(types: &TypeTable, id: TypeId, opts: &RenderOpts) -> Result<String> {
    let kind = types
        .get(id)
        .ok_or_else(|| Error::Incomplete {
            what: "dangling type handle".to_string(),
        })?;
    Ok(match kind {
        TypeKind::Void => "void&".to_string(),
        TypeKind::Primitive { name } => format!("{}&", name),
        TypeKind::Pointer { to, quals } => {
            let pointee = types.get(*to);
            if let Some(TypeKind::Function {
                args,
                result,
                varargs,
                convention,
            }) = pointee
            {
                // function pointers parenthesize, with the convention
                // keyword right before the star
                let conv = match convention {
                    CallConv::Stdcall if opts.emit_convention => "__stdcall ",
                    _ => "",
                };
                let inner = marker_name(types, *result, opts)?;
                let args = render_args(types, args, *varargs, opts)?;
                inner.replace('&', &format!("({}*&)({})", conv, args))
            } else {
                let inner = marker_name(types, *to, opts)?;
                let extra = if matches!(pointee, Some(TypeKind::Array { .. })) {
                    "(*&)".to_string()
                } else {
                    " *&".to_string()
                };
                inner.replace('&', &qualify(*quals, &extra))
            }
        }
        TypeKind::Array { of, len } => {
            let inner = marker_name(types, *of, opts)?;
            let brackets = match len {
                Some(n) => format!("&[{}]", n),
                None => "&[]".to_string(),
            };
            inner.replace('&', &brackets)
        }
        TypeKind::Function {
            args,
            result,
            varargs,
            ..
        } => {
            // a direct function type; the declarator position sits right
            // before the parameter list, as in `double sin(double)`
            let inner = marker_name(types, *result, opts)?;
            let args = render_args(types, args, *varargs, opts)?;
            inner.replace('&', &format!("&({})", args))
        }
        TypeKind::Struct(c) => {
            if c.tag.starts_with('$') {
                return Err(Error::NoCName { tag: c.tag.clone() });
            }
            if c.forcename {
                format!("{}&", c.tag)
            } else {
                format!("struct {}&", c.tag)
            }
        }
        TypeKind::Union(c) => {
            if c.tag.starts_with('$') {
                return Err(Error::NoCName { tag: c.tag.clone() });
            }
            if c.forcename {
                format!("{}&", c.tag)
            } else {
                format!("union {}&", c.tag)
            }
        }
        TypeKind::Enum { tag, .. } => {
            if tag.starts_with('$') {
                return Err(Error::NoCName { tag: tag.clone() });
            }
            format!("enum {}&", tag)
        }
    })
}

fn render_args(
    types: &TypeTable,
    args: &[TypeId],
    varargs: bool,
    opts: &RenderOpts,
) -> Result<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(cname(types, *arg, opts)?);
    }
    let mut s = parts.join(", ");
    if varargs {
        s.push_str(", ...");
    }
    Ok(s)
}

/// place the qualifier words of a pointer level before its star, in the
/// order `__restrict volatile const`.
fn qualify(quals: Quals, extra: &str) -> String {
    if quals.is_empty() {
        return extra.to_string();
    }
    let mut s = extra.trim_start().to_string();
    if quals.contains(Quals::CONST) {
        s = format!("const {}", s);
    }
    if quals.contains(Quals::VOLATILE) {
        s = format!("volatile {}", s);
    }
    if quals.contains(Quals::RESTRICT) {
        s = format!("__restrict {}", s);
    }
    format!(" {}", s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Composite;

    fn table() -> (TypeTable, TypeId) {
        let mut t = TypeTable::new();
        let c = t.intern(TypeKind::Primitive {
            name: "char".to_string(),
        });
        (t, c)
    }

    fn ptr(t: &mut TypeTable, to: TypeId, quals: Quals) -> TypeId {
        t.intern(TypeKind::Pointer { to, quals })
    }

    #[test]
    fn test_pointer_chain_with_qualifiers() {
        let (mut t, c) = table();
        // char * const *: pointee of the outer star is a const pointer
        let p1 = ptr(&mut t, c, Quals::NONE);
        let p2 = ptr(&mut t, p1, Quals::CONST);
        assert_eq!(cname(&t, p2, &RenderOpts::default()).unwrap(), "char * const *");
    }

    #[test]
    fn test_leaf_qualifier() {
        let (mut t, c) = table();
        let p = ptr(&mut t, c, Quals::CONST);
        assert_eq!(cname(&t, p, &RenderOpts::default()).unwrap(), "char const *");
    }

    #[test]
    fn test_qualifier_word_order() {
        let (mut t, c) = table();
        let p1 = ptr(&mut t, c, Quals::NONE);
        let p2 = ptr(&mut t, p1, Quals::RESTRICT | Quals::VOLATILE);
        let p3 = ptr(&mut t, p2, Quals::NONE);
        assert_eq!(
            cname(&t, p3, &RenderOpts::default()).unwrap(),
            "char * __restrict volatile * *"
        );
    }

    #[test]
    fn test_array_and_pointer_to_array() {
        let (mut t, c) = table();
        let arr = t.intern(TypeKind::Array {
            of: c,
            len: Some(5),
        });
        assert_eq!(cname(&t, arr, &RenderOpts::default()).unwrap(), "char[5]");
        assert_eq!(
            cname_decl(&t, arr, "x", &RenderOpts::default()).unwrap(),
            "char x[5]"
        );
        let p = ptr(&mut t, arr, Quals::NONE);
        assert_eq!(cname(&t, p, &RenderOpts::default()).unwrap(), "char(*)[5]");
        assert_eq!(
            cname_decl(&t, p, "x", &RenderOpts::default()).unwrap(),
            "char(*x)[5]"
        );
    }

    #[test]
    fn test_function_pointer() {
        let mut t = TypeTable::new();
        let int_ = t.intern(TypeKind::Primitive {
            name: "int".to_string(),
        });
        let long_ = t.intern(TypeKind::Primitive {
            name: "long".to_string(),
        });
        let f = t.intern(TypeKind::Function {
            args: vec![int_, long_],
            result: int_,
            varargs: false,
            convention: CallConv::Cdecl,
        });
        let fp = t.intern(TypeKind::Pointer {
            to: f,
            quals: Quals::NONE,
        });
        assert_eq!(
            cname(&t, fp, &RenderOpts::default()).unwrap(),
            "int(*)(int, long)"
        );
        assert_eq!(
            cname_decl(&t, fp, "cb", &RenderOpts::default()).unwrap(),
            "int(*cb)(int, long)"
        );
    }

    #[test]
    fn test_variadic_and_zero_args() {
        let mut t = TypeTable::new();
        let int_ = t.intern(TypeKind::Primitive {
            name: "int".to_string(),
        });
        let f0 = t.intern(TypeKind::Function {
            args: vec![],
            result: int_,
            varargs: false,
            convention: CallConv::Cdecl,
        });
        let fp0 = t.intern(TypeKind::Pointer {
            to: f0,
            quals: Quals::NONE,
        });
        assert_eq!(cname(&t, fp0, &RenderOpts::default()).unwrap(), "int(*)()");

        let fv = t.intern(TypeKind::Function {
            args: vec![int_],
            result: int_,
            varargs: true,
            convention: CallConv::Cdecl,
        });
        let fpv = t.intern(TypeKind::Pointer {
            to: fv,
            quals: Quals::NONE,
        });
        assert_eq!(
            cname(&t, fpv, &RenderOpts::default()).unwrap(),
            "int(*)(int, ...)"
        );
    }

    #[test]
    fn test_stdcall_emission_is_conditional() {
        let mut t = TypeTable::new();
        let int_ = t.intern(TypeKind::Primitive {
            name: "int".to_string(),
        });
        let f = t.intern(TypeKind::Function {
            args: vec![int_],
            result: int_,
            varargs: false,
            convention: CallConv::Stdcall,
        });
        let fp = t.intern(TypeKind::Pointer {
            to: f,
            quals: Quals::NONE,
        });
        let on = RenderOpts {
            emit_convention: true,
        };
        assert_eq!(cname(&t, fp, &on).unwrap(), "int(__stdcall *)(int)");
        assert_eq!(
            cname(&t, fp, &RenderOpts::default()).unwrap(),
            "int(*)(int)"
        );
    }

    #[test]
    fn test_struct_spellings() {
        let mut t = TypeTable::new();
        let named = t.intern(TypeKind::Struct(Composite {
            tag: "point".to_string(),
            forcename: false,
            fields: None,
        }));
        assert_eq!(
            cname(&t, named, &RenderOpts::default()).unwrap(),
            "struct point"
        );
        let forced = t.intern(TypeKind::Struct(Composite {
            tag: "foo_t".to_string(),
            forcename: true,
            fields: None,
        }));
        assert_eq!(cname(&t, forced, &RenderOpts::default()).unwrap(), "foo_t");
        let anon = t.intern(TypeKind::Struct(Composite {
            tag: "$1".to_string(),
            forcename: false,
            fields: None,
        }));
        assert!(matches!(
            cname(&t, anon, &RenderOpts::default()),
            Err(Error::NoCName { .. })
        ));
    }
}
