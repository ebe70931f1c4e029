//! A configuration session: one declaration registry, one type table, one
//! exclusive lock.

use crate::build::TypeBuilder;
use crate::cname;
use crate::cname::RenderOpts;
use crate::error::{Error, Result};
use crate::layout::{FieldOffset, Layout, LayoutEngine, Target};
use crate::lexer;
use crate::library::{Binding, Library};
use crate::model::{Quals, TypeId, TypeKind};
use crate::parser::Parser;
use crate::registry::{DeclEntry, DeclKind, DeclMap, TypeTable};
use crate::source::{self, DEFAULT_SOURCE_NAME};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub types: TypeTable,
    pub decls: DeclMap,
    pub anon_counter: u32,
}

/// owns all declarations parsed into it and serializes mutation behind one
/// lock. completed sessions can be read from several threads; dropping a
/// session discards its state without touching any other session.
#[derive(Debug, Default)]
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        log::debug!("new session");
        Self {
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session lock poisoned")
    }

    /// parse a declaration set and register everything it declares.
    pub fn cdef(&self, source: &str) -> Result<()> {
        self.cdef_inner(source, false)
    }

    /// like [`Session::cdef`], but conflicting redeclarations replace the
    /// previous entry instead of failing.
    pub fn cdef_override(&self, source: &str) -> Result<()> {
        self.cdef_inner(source, true)
    }

    fn cdef_inner(&self, source: &str, replace: bool) -> Result<()> {
        let norm = source::normalize(source, DEFAULT_SOURCE_NAME)?;
        let toks = lexer::tokenize(&norm)?;

        let mut st = self.lock();
        let known: HashSet<String> =
            st.decls.typedef_names().map(str::to_string).collect();
        let mut parser = Parser::new(&toks, &norm.files, known);
        let decls = parser.parse_declarations()?;

        let mut builder = TypeBuilder::new(&mut st, &norm.files, replace);
        builder.run(&decls, &norm.defines)
    }

    /// parse a type-only string, e.g. `"char * const *"` or `"fn_t"`.
    pub fn parse_type(&self, text: &str) -> Result<TypeId> {
        self.parse_type_and_quals(text).map(|(ty, _)| ty)
    }

    /// parse a type-only string, returning the top-level qualifiers
    /// separately from the node they qualify.
    pub fn parse_type_and_quals(&self, text: &str) -> Result<(TypeId, Quals)> {
        let norm = source::normalize(text, "<type string>")?;
        let toks = lexer::tokenize(&norm)?;

        let mut st = self.lock();
        let known: HashSet<String> =
            st.decls.typedef_names().map(str::to_string).collect();
        let mut parser = Parser::new(&toks, &norm.files, known);
        let (spec, decl) = parser.parse_type_expr()?;

        let mut builder = TypeBuilder::new(&mut st, &norm.files, false);
        builder.build_type_expr(&spec, &decl)
    }

    pub fn declaration(&self, kind: DeclKind, name: &str) -> Option<DeclEntry> {
        self.lock().decls.lookup(kind, name).cloned()
    }

    /// snapshot of all declarations in registration order.
    pub fn declarations(&self) -> Vec<(DeclKind, String, DeclEntry)> {
        self.lock()
            .decls
            .iter_ordered()
            .map(|(k, n, e)| (k, n.to_string(), e.clone()))
            .collect()
    }

    /// value of an integer constant (enum member or `#define`).
    pub fn constant_value(&self, name: &str) -> Option<i64> {
        self.lock()
            .decls
            .lookup(DeclKind::Constant, name)
            .and_then(|e| e.value)
    }

    /// the resolved type behind a typedef name.
    pub fn typedef_type(&self, name: &str) -> Option<TypeId> {
        self.lock()
            .decls
            .lookup(DeclKind::Typedef, name)
            .map(|e| e.ty)
    }

    pub fn type_kind(&self, id: TypeId) -> Option<TypeKind> {
        self.lock().types.get(id).cloned()
    }

    /// canonical spelling of a type node.
    pub fn cname(&self, id: TypeId, opts: &RenderOpts) -> Result<String> {
        cname::cname(&self.lock().types, id, opts)
    }

    /// canonical spelling of a declaration of `name` with this type.
    pub fn cname_decl(&self, id: TypeId, name: &str, opts: &RenderOpts) -> Result<String> {
        cname::cname_decl(&self.lock().types, id, name, opts)
    }

    pub fn layout_of(&self, id: TypeId, target: &Target) -> Result<Layout> {
        LayoutEngine::new(&self.lock().types, *target).layout_of(id)
    }

    pub fn offsets_of(&self, id: TypeId, target: &Target) -> Result<Vec<FieldOffset>> {
        LayoutEngine::new(&self.lock().types, *target).offsets_of(id)
    }

    /// import the declarations of another, completed session. the other
    /// session is read under its own lock and never modified; entries
    /// already present here keep their meaning, identical entries merge
    /// silently and conflicting ones are reported.
    pub fn include(&self, other: &Session) -> Result<()> {
        if std::ptr::eq(self, other) {
            log::warn!("ignoring include of a session into itself");
            return Ok(());
        }
        // lock order: importer first, then exporter
        let mut st = self.lock();
        let ot = other.lock();
        st.types.merge_from(&ot.types)?;
        st.decls.merge_from(&ot.decls)?;
        st.anon_counter = st.anon_counter.max(ot.anon_counter);
        Ok(())
    }

    /// pair a declared function with its address in `lib`. extern "Python"
    /// functions are implemented by the host and never looked up.
    pub fn bind_function(&self, lib: &dyn Library, name: &str) -> Result<Binding> {
        let ty = {
            let st = self.lock();
            if let Some(entry) = st.decls.lookup(DeclKind::Function, name) {
                entry.ty
            } else if st.decls.contains(DeclKind::ExternPython, name) {
                return Err(Error::Unbindable {
                    name: name.to_string(),
                    reason: "declared extern \"Python\", implemented by the host".to_string(),
                });
            } else {
                return Err(Error::Unbindable {
                    name: name.to_string(),
                    reason: "no function declaration with this name".to_string(),
                });
            }
        };
        let addr = lib.symbol(name)?;
        log::debug!("bound function {} at {:#x}", name, addr.0);
        Ok(Binding {
            name: name.to_string(),
            addr,
            ty,
        })
    }

    /// pair a declared global (variable or const global) with its address.
    pub fn bind_variable(&self, lib: &dyn Library, name: &str) -> Result<Binding> {
        let ty = {
            let st = self.lock();
            let entry = st
                .decls
                .lookup(DeclKind::Variable, name)
                .or_else(|| {
                    // const globals land under constant, but only symbols
                    // have an address; evaluated macros do not
                    st.decls
                        .lookup(DeclKind::Constant, name)
                        .filter(|e| e.value.is_none())
                });
            match entry {
                Some(e) => e.ty,
                None => {
                    return Err(Error::Unbindable {
                        name: name.to_string(),
                        reason: "no variable declaration with this name".to_string(),
                    });
                }
            }
        };
        let addr = lib.symbol(name)?;
        log::debug!("bound variable {} at {:#x}", name, addr.0);
        Ok(Binding {
            name: name.to_string(),
            addr,
            ty,
        })
    }
}
