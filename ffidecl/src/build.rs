//! Type model builder: turns declaration AST nodes into interned type
//! nodes and registry entries.
//!
//! Declarator inversion works level by level. Within one level the pointer
//! stars wrap the base type left to right while the qualifier set written
//! after each `*` stays pending and lands on the next wrapping step; the
//! set still pending at the end is the declaration's own top-level
//! qualifier set. This is what makes `int const *a` a plain pointer to
//! const int but `int *const a` a const pointer to plain int.

use crate::ast::*;
use crate::commontypes;
use crate::constexpr::{eval_expr, parse_int_literal};
use crate::error::{Error, Result};
use crate::model::{CallConv, Composite, EnumMember, Field, Quals, TypeId, TypeKind};
use crate::registry::{DeclEntry, DeclKind, DeclMap, TypeTable};
use crate::session::SessionState;
use crate::source::{RawDefine, SourceLoc};

pub(crate) struct TypeBuilder<'s> {
    types: &'s mut TypeTable,
    decls: &'s mut DeclMap,
    anon_counter: &'s mut u32,
    files: &'s [String],
    replace: bool,
}

impl<'s> TypeBuilder<'s> {
    pub fn new(state: &'s mut SessionState, files: &'s [String], replace: bool) -> Self {
        let SessionState {
            types,
            decls,
            anon_counter,
        } = state;
        Self {
            types,
            decls,
            anon_counter,
            files,
            replace,
        }
    }

    pub fn run(&mut self, decls: &[Decl], defines: &[RawDefine]) -> Result<()> {
        for d in decls {
            self.build_decl(d, false)?;
        }
        for def in defines {
            self.build_define(def)?;
        }
        log::debug!(
            "session holds {} declarations, {} types",
            self.decls.len(),
            self.types.len()
        );
        Ok(())
    }

    /// resolve a bare type expression (used by `parse_type`).
    pub fn build_type_expr(&mut self, spec: &TypeSpec, decl: &Declarator) -> Result<(TypeId, Quals)> {
        let (base, quals) = self.resolve_spec(spec, None)?;
        let (_, ty, quals) = self.apply_declarator(base, quals, decl)?;
        Ok((ty, quals))
    }

    fn build_decl(&mut self, d: &Decl, python: bool) -> Result<()> {
        match d {
            Decl::Typedef { spec, decls, .. } => self.build_typedef(spec, decls),
            Decl::Normal {
                spec,
                decls,
                is_extern,
                ..
            } => self.build_normal(spec, decls, *is_extern, python),
            Decl::ExternPython { decls, .. } => {
                for inner in decls {
                    self.build_decl(inner, true)?;
                }
                Ok(())
            }
        }
    }

    fn build_typedef(&mut self, spec: &TypeSpec, decls: &[Declarator]) -> Result<()> {
        // an anonymous struct/union/enum directly named by a typedef takes
        // that name instead of a synthetic tag
        let forcename = decls
            .iter()
            .find(|d| d.is_direct_name())
            .and_then(|d| d.name())
            .map(str::to_string);
        let (base, base_quals) = self.resolve_spec(spec, forcename.as_deref())?;
        for d in decls {
            let (name, ty, quals) = self.apply_declarator(base, base_quals, d)?;
            let name = name.unwrap_or_default();
            self.decls.declare(
                DeclKind::Typedef,
                &name,
                DeclEntry {
                    ty,
                    quals,
                    value: None,
                },
                self.replace,
            )?;
        }
        Ok(())
    }

    fn build_normal(
        &mut self,
        spec: &TypeSpec,
        decls: &[Declarator],
        is_extern: bool,
        python: bool,
    ) -> Result<()> {
        let (base, base_quals) = self.resolve_spec(spec, None)?;
        for d in decls {
            let (name, ty, quals) = self.apply_declarator(base, base_quals, d)?;
            let Some(name) = name else {
                return Err(Error::syntax(self.files, d.loc, "declaration without a name"));
            };
            let is_function = matches!(self.types.get(ty), Some(TypeKind::Function { .. }));
            if python {
                if !is_function {
                    return Err(Error::unsupported(
                        self.files,
                        d.loc,
                        "extern \"Python\" requires a function declaration",
                    ));
                }
                self.decls.declare(
                    DeclKind::ExternPython,
                    &name,
                    DeclEntry {
                        ty,
                        quals: Quals::NONE,
                        value: None,
                    },
                    self.replace,
                )?;
                continue;
            }
            if is_function {
                self.decls.declare(
                    DeclKind::Function,
                    &name,
                    DeclEntry {
                        ty,
                        quals: Quals::NONE,
                        value: None,
                    },
                    self.replace,
                )?;
                continue;
            }
            // a const-qualified global is a constant; arrays never are
            let is_array = matches!(self.types.get(ty), Some(TypeKind::Array { .. }));
            if quals.contains(Quals::CONST) && !is_array {
                self.decls.declare(
                    DeclKind::Constant,
                    &name,
                    DeclEntry {
                        ty,
                        quals,
                        value: None,
                    },
                    self.replace,
                )?;
            } else {
                if !is_extern {
                    log::warn!("global variable '{}' declared without extern", name);
                }
                self.decls.declare(
                    DeclKind::Variable,
                    &name,
                    DeclEntry {
                        ty,
                        quals,
                        value: None,
                    },
                    self.replace,
                )?;
            }
        }
        Ok(())
    }

    fn resolve_spec(&mut self, spec: &TypeSpec, forcename: Option<&str>) -> Result<(TypeId, Quals)> {
        match &spec.base {
            BaseSpec::Primitive(name) => {
                let id = if name == "void" {
                    self.types.intern(TypeKind::Void)
                } else {
                    self.types.intern(TypeKind::Primitive { name: name.clone() })
                };
                Ok((id, spec.quals))
            }
            BaseSpec::Named(name) => {
                if let Some(entry) = self.decls.lookup(DeclKind::Typedef, name) {
                    return Ok((entry.ty, entry.quals | spec.quals));
                }
                if let Some(prim) = commontypes::lookup(name) {
                    let id = self.types.intern(TypeKind::Primitive {
                        name: prim.to_string(),
                    });
                    return Ok((id, spec.quals));
                }
                Err(Error::unknown_identifier(self.files, spec.loc, name))
            }
            BaseSpec::Struct { tag, body } => {
                let id = self.resolve_composite(false, tag.as_deref(), body.as_deref(), forcename)?;
                Ok((id, spec.quals))
            }
            BaseSpec::Union { tag, body } => {
                let id = self.resolve_composite(true, tag.as_deref(), body.as_deref(), forcename)?;
                Ok((id, spec.quals))
            }
            BaseSpec::Enum { tag, body } => {
                let id = self.resolve_enum(tag.as_deref(), body.as_deref(), forcename)?;
                Ok((id, spec.quals))
            }
        }
    }

    /// tag bookkeeping shared by named and anonymous composites. returns the
    /// tag string, whether it renders bare, and the declaration kind.
    fn composite_tag(
        &mut self,
        tag: Option<&str>,
        forcename: Option<&str>,
        named_kind: DeclKind,
    ) -> (String, bool, DeclKind) {
        match tag {
            Some(t) => (t.to_string(), false, named_kind),
            None => match forcename {
                Some(n) => (n.to_string(), true, DeclKind::Anonymous),
                None => {
                    *self.anon_counter += 1;
                    (format!("${}", self.anon_counter), false, DeclKind::Anonymous)
                }
            },
        }
    }

    fn resolve_composite(
        &mut self,
        is_union: bool,
        tag: Option<&str>,
        body: Option<&[FieldDecl]>,
        forcename: Option<&str>,
    ) -> Result<TypeId> {
        let named_kind = if is_union { DeclKind::Union } else { DeclKind::Struct };
        let (tag, forced, decl_kind) = self.composite_tag(tag, forcename, named_kind);

        let make = |fields: Option<Vec<Field>>| {
            let c = Composite {
                tag: tag.clone(),
                forcename: forced,
                fields,
            };
            if is_union { TypeKind::Union(c) } else { TypeKind::Struct(c) }
        };

        // register the tag opaquely first, so pointer references inside the
        // body (including to the tag itself) resolve to the same entry
        let id = self.types.intern(make(None));

        if let Some(body) = body {
            let completed = match self.types.get(id) {
                Some(TypeKind::Struct(c)) | Some(TypeKind::Union(c)) => c.fields.clone(),
                _ => None,
            };
            let fields = self.build_fields(body)?;
            match completed {
                Some(existing) if existing == fields => {}
                Some(_) if !self.replace => {
                    return Err(Error::Redefinition {
                        kind: if is_union { "union" } else { "struct" },
                        name: tag.clone(),
                    });
                }
                _ => {
                    log::debug!(
                        "{:>12} {} ({} fields)",
                        if is_union { "union" } else { "struct" },
                        tag,
                        fields.len()
                    );
                    self.types.set(id, make(Some(fields)));
                }
            }
        }

        self.decls.declare(
            decl_kind,
            &tag,
            DeclEntry {
                ty: id,
                quals: Quals::NONE,
                value: None,
            },
            true, // tag re-mention is never a conflict; the entry is identical anyway
        )?;
        Ok(id)
    }

    fn resolve_enum(
        &mut self,
        tag: Option<&str>,
        body: Option<&[EnumItem]>,
        forcename: Option<&str>,
    ) -> Result<TypeId> {
        let (tag, _forced, decl_kind) = self.composite_tag(tag, forcename, DeclKind::Enum);

        let probe = TypeKind::Enum {
            tag: tag.clone(),
            members: vec![],
            partial: true,
        };
        let id = crate::model::compute_type_id(&probe);
        let existing = self.types.get(id).cloned();

        match (existing, body) {
            (None, None) => {
                self.types.intern(probe);
            }
            (None, Some(items)) => {
                let members = self.eval_enum_members(items)?;
                self.types.intern(TypeKind::Enum {
                    tag: tag.clone(),
                    members: members.clone(),
                    partial: false,
                });
                self.register_enum_constants(&members)?;
                log::debug!("{:>12} {} ({} members)", "enum", tag, members.len());
            }
            (Some(TypeKind::Enum { partial: true, .. }), Some(_)) => {
                return Err(Error::IllFormedEnum { tag });
            }
            (Some(TypeKind::Enum { partial: false, members: old, .. }), Some(items)) => {
                let members = self.eval_enum_members(items)?;
                if members != old {
                    if !self.replace {
                        return Err(Error::Redefinition {
                            kind: "enum",
                            name: tag,
                        });
                    }
                    self.types.set(
                        id,
                        TypeKind::Enum {
                            tag: tag.clone(),
                            members: members.clone(),
                            partial: false,
                        },
                    );
                    self.register_enum_constants(&members)?;
                }
            }
            (Some(_), None) => {}
            // the id is derived from the enum tag and discriminated by variant,
            // so a non-enum type can never be interned at this id
            (Some(_), Some(_)) => {
                unreachable!("type id from enum tag resolved to a non-enum type")
            }
        }

        self.decls.declare(
            decl_kind,
            &tag,
            DeclEntry {
                ty: id,
                quals: Quals::NONE,
                value: None,
            },
            true,
        )?;
        Ok(id)
    }

    /// evaluate member initializers left to right; an omitted value is the
    /// previous value plus one, starting at zero. earlier members of the
    /// same body and previously declared constants are in scope.
    fn eval_enum_members(&mut self, items: &[EnumItem]) -> Result<Vec<EnumMember>> {
        let mut members: Vec<EnumMember> = Vec::new();
        let mut next = 0i64;
        for item in items {
            let value = match &item.value {
                Some(expr) => {
                    let decls = &*self.decls;
                    let local = &members;
                    let lookup = |name: &str| {
                        local
                            .iter()
                            .find(|m| m.name == name)
                            .map(|m| m.value)
                            .or_else(|| {
                                decls
                                    .lookup(DeclKind::Constant, name)
                                    .and_then(|e| e.value)
                            })
                    };
                    eval_expr(expr, self.files, &lookup)?
                }
                None => next,
            };
            next = value.wrapping_add(1);
            members.push(EnumMember {
                name: item.name.clone(),
                value,
            });
        }
        Ok(members)
    }

    fn register_enum_constants(&mut self, members: &[EnumMember]) -> Result<()> {
        let int_id = self.int_id();
        for m in members {
            self.decls.declare(
                DeclKind::Constant,
                &m.name,
                DeclEntry {
                    ty: int_id,
                    quals: Quals::NONE,
                    value: Some(m.value),
                },
                self.replace,
            )?;
        }
        Ok(())
    }

    fn build_fields(&mut self, body: &[FieldDecl]) -> Result<Vec<Field>> {
        let mut fields = Vec::new();
        for fd in body {
            if fd.decls.is_empty() {
                // anonymous struct/union member
                let (ty, quals) = self.resolve_spec(&fd.spec, None)?;
                fields.push(Field {
                    name: String::new(),
                    ty,
                    quals,
                    bitsize: None,
                });
                continue;
            }
            let (base, base_quals) = self.resolve_spec(&fd.spec, None)?;
            for d in &fd.decls {
                let (name, ty, quals) = self.apply_declarator(base, base_quals, d)?;
                if matches!(self.types.get(ty), Some(TypeKind::Function { .. })) {
                    return Err(Error::unsupported(
                        self.files,
                        d.loc,
                        "a field cannot have function type, use a function pointer",
                    ));
                }
                let bitsize = match &d.bitsize {
                    Some(expr) => Some(self.eval_bitsize(expr, d.loc)?),
                    None => None,
                };
                if name.is_none() && bitsize.is_none() {
                    return Err(Error::syntax(self.files, d.loc, "field declaration without a name"));
                }
                fields.push(Field {
                    name: name.unwrap_or_default(),
                    ty,
                    quals,
                    bitsize,
                });
            }
        }
        Ok(fields)
    }

    fn eval_bitsize(&self, expr: &ConstExpr, loc: SourceLoc) -> Result<u32> {
        let decls = &*self.decls;
        let lookup =
            |name: &str| decls.lookup(DeclKind::Constant, name).and_then(|e| e.value);
        let v = eval_expr(expr, self.files, &lookup)?;
        if !(0..=64).contains(&v) {
            return Err(Error::syntax(self.files, loc, format!("invalid bitfield width {}", v)));
        }
        Ok(v as u32)
    }

    fn apply_declarator(
        &mut self,
        base: TypeId,
        quals: Quals,
        d: &Declarator,
    ) -> Result<(Option<String>, TypeId, Quals)> {
        let mut cur = base;
        let mut pending = quals;

        for level in &d.pointers {
            cur = self.types.intern(TypeKind::Pointer {
                to: cur,
                quals: pending,
            });
            pending = level.quals;
        }

        // suffixes bind tighter the closer they stand to the core, so they
        // wrap the current type from right to left
        for sfx in d.suffixes.iter().rev() {
            match sfx {
                DeclSuffix::Array { len } => {
                    let len = match len {
                        Some(expr) => Some(self.eval_array_len(expr, d.loc)?),
                        None => None,
                    };
                    cur = self.types.intern(TypeKind::Array { of: cur, len });
                    // element qualifiers stay pending and surface at the
                    // declaration level, like the C reading of const int[]
                }
                DeclSuffix::Func { params, varargs } => {
                    cur = self.build_function(cur, params, *varargs, d)?;
                    pending = Quals::NONE;
                }
            }
        }

        match &d.inner {
            DirectDecl::Name(n) => Ok((n.clone(), cur, pending)),
            DirectDecl::Paren(inner) => self.apply_declarator(cur, pending, inner),
        }
    }

    fn eval_array_len(&self, expr: &ConstExpr, loc: SourceLoc) -> Result<u64> {
        let decls = &*self.decls;
        let lookup =
            |name: &str| decls.lookup(DeclKind::Constant, name).and_then(|e| e.value);
        let v = eval_expr(expr, self.files, &lookup)?;
        if v < 0 {
            return Err(Error::syntax(self.files, loc, format!("negative array length {}", v)));
        }
        Ok(v as u64)
    }

    fn build_function(
        &mut self,
        result: TypeId,
        params: &[ParamDecl],
        varargs: bool,
        d: &Declarator,
    ) -> Result<TypeId> {
        if params.is_empty() && varargs {
            let name = d.name().unwrap_or("<anonymous>").to_string();
            let (file, line) = self.spot(d.loc);
            return Err(Error::InvalidVariadic { file, line, name });
        }

        let mut args = Vec::with_capacity(params.len());
        let mut sole_unnamed_void = false;
        for (i, p) in params.iter().enumerate() {
            let (pname, ty, pquals) = {
                let (base, base_quals) = self.resolve_spec(&p.spec, None)?;
                self.apply_declarator(base, base_quals, &p.decl)?
            };
            let param_kind = self.types.get(ty).cloned();
            let ty = match param_kind {
                // array and function parameters decay to pointers; the
                // element qualifiers become pointee qualifiers
                Some(TypeKind::Array { of, .. }) => self.types.intern(TypeKind::Pointer {
                    to: of,
                    quals: pquals,
                }),
                Some(TypeKind::Function { .. }) => self.types.intern(TypeKind::Pointer {
                    to: ty,
                    quals: Quals::NONE,
                }),
                Some(TypeKind::Void) => {
                    if params.len() == 1 && pname.is_none() && !varargs {
                        sole_unnamed_void = true;
                        break;
                    }
                    let (file, line) = self.spot(p.decl.loc);
                    return Err(Error::Unsupported {
                        file,
                        line,
                        message: format!("argument {} has type void", i + 1),
                    });
                }
                // a parameter's own top-level qualifiers are not part of
                // the function identity
                _ => ty,
            };
            args.push(ty);
        }
        if sole_unnamed_void {
            args.clear();
        }

        // stdcall does not apply to variadic functions
        let convention = if varargs {
            CallConv::Cdecl
        } else {
            effective_conv(d)
        };

        Ok(self.types.intern(TypeKind::Function {
            args,
            result,
            varargs,
            convention,
        }))
    }

    fn build_define(&mut self, def: &RawDefine) -> Result<()> {
        let body = def.body.trim();
        let name: String = body
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let valid_name =
            !name.is_empty() && !name.starts_with(|c: char| c.is_ascii_digit());
        let rest = body[name.len()..].trim();

        if valid_name {
            if rest == "..." {
                let int_id = self.int_id();
                return self.decls.declare(
                    DeclKind::Macro,
                    &name,
                    DeclEntry {
                        ty: int_id,
                        quals: Quals::NONE,
                        value: None,
                    },
                    self.replace,
                );
            }
            if let Ok(value) = parse_int_literal(rest) {
                let int_id = self.int_id();
                log::debug!("{:>12} {} = {}", "constant", name, value);
                return self.decls.declare(
                    DeclKind::Constant,
                    &name,
                    DeclEntry {
                        ty: int_id,
                        quals: Quals::NONE,
                        value: Some(value),
                    },
                    self.replace,
                );
            }
        }

        let shown = if valid_name { name.as_str() } else { "NAME" };
        let (file, line) = self.spot(def.loc);
        Err(Error::Unsupported {
            file,
            line,
            message: format!(
                "only supports one of the following syntax:\n  \
                 #define {0} ...     (literally dot-dot-dot)\n  \
                 #define {0} NUMBER  (with NUMBER an integer constant, decimal/hex/octal/binary)\n\
                 got:\n  #define {1}",
                shown, body
            ),
        })
    }

    fn int_id(&mut self) -> TypeId {
        self.types.intern(TypeKind::Primitive {
            name: "int".to_string(),
        })
    }

    fn spot(&self, loc: SourceLoc) -> (String, u32) {
        let file = self
            .files
            .get(loc.file as usize)
            .cloned()
            .unwrap_or_else(|| "<unknown>".to_string());
        (file, loc.line)
    }
}

/// the convention marker written closest to the core of a declarator
/// applies to the function type built around that core. a marker inside
/// parentheses belongs to the pointed-to function, not to an inner function
/// suffix of its own level.
fn effective_conv(d: &Declarator) -> CallConv {
    if let Some(c) = d.conv {
        return c;
    }
    if let DirectDecl::Paren(inner) = &d.inner {
        if !inner.has_func_suffix() {
            return effective_conv(inner);
        }
    }
    CallConv::Cdecl
}
