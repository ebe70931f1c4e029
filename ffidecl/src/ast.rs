//! Declaration AST produced by the parser, consumed by the type builder.
//!
//! One [`Decl`] per top-level declaration. Declarators keep the source
//! nesting (pointer levels, parenthesized inner declarators, array and
//! parameter suffixes); the builder inverts them into type nodes.

use crate::model::{CallConv, Quals};
use crate::source::SourceLoc;

/// integer constant expression, evaluated by the constant evaluator.
#[derive(Debug, Clone)]
pub enum ConstExpr {
    /// raw literal text, base prefix and suffixes included
    Literal(String, SourceLoc),
    /// reference to a previously evaluated constant (enum member etc.)
    Name(String, SourceLoc),
    Unary {
        op: char,
        operand: Box<ConstExpr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<ConstExpr>,
        rhs: Box<ConstExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
}

/// declaration specifier: qualifiers plus a base type.
#[derive(Debug, Clone)]
pub struct TypeSpec {
    pub quals: Quals,
    pub base: BaseSpec,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub enum BaseSpec {
    /// normalized multi-word primitive name ("unsigned long long", "_Bool", "void")
    Primitive(String),
    /// typedef or common-type name, resolved by the builder
    Named(String),
    Struct {
        tag: Option<String>,
        body: Option<Vec<FieldDecl>>,
    },
    Union {
        tag: Option<String>,
        body: Option<Vec<FieldDecl>>,
    },
    Enum {
        tag: Option<String>,
        body: Option<Vec<EnumItem>>,
    },
}

/// one struct/union member line; `decls` is empty for an anonymous
/// struct/union member declared without a declarator.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub spec: TypeSpec,
    pub decls: Vec<Declarator>,
}

#[derive(Debug, Clone)]
pub struct EnumItem {
    pub name: String,
    pub value: Option<ConstExpr>,
    pub loc: SourceLoc,
}

/// a declarator as written: leading calling-convention marker, pointer
/// levels with the qualifiers written after each `*`, a core (name or
/// parenthesized inner declarator), and array/parameter suffixes.
#[derive(Debug, Clone)]
pub struct Declarator {
    pub conv: Option<CallConv>,
    pub pointers: Vec<PtrLevel>,
    pub inner: DirectDecl,
    pub suffixes: Vec<DeclSuffix>,
    pub bitsize: Option<ConstExpr>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub struct PtrLevel {
    pub quals: Quals,
}

#[derive(Debug, Clone)]
pub enum DirectDecl {
    /// named, or None for an abstract declarator
    Name(Option<String>),
    Paren(Box<Declarator>),
}

#[derive(Debug, Clone)]
pub enum DeclSuffix {
    Array {
        len: Option<ConstExpr>,
    },
    Func {
        params: Vec<ParamDecl>,
        varargs: bool,
    },
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub spec: TypeSpec,
    pub decl: Declarator,
}

/// one parsed top-level declaration.
#[derive(Debug, Clone)]
pub enum Decl {
    Typedef {
        spec: TypeSpec,
        decls: Vec<Declarator>,
        loc: SourceLoc,
    },
    Normal {
        spec: TypeSpec,
        decls: Vec<Declarator>,
        is_extern: bool,
        loc: SourceLoc,
    },
    ExternPython {
        decls: Vec<Decl>,
        loc: SourceLoc,
    },
}

impl Declarator {
    /// the declared name, if any, descending through parentheses.
    pub fn name(&self) -> Option<&str> {
        match &self.inner {
            DirectDecl::Name(n) => n.as_deref(),
            DirectDecl::Paren(inner) => inner.name(),
        }
    }

    /// true for a bare `name` with no pointers, suffixes or parentheses;
    /// used to pick the forced name for `typedef struct { ... } name`.
    pub fn is_direct_name(&self) -> bool {
        self.pointers.is_empty()
            && self.suffixes.is_empty()
            && matches!(&self.inner, DirectDecl::Name(Some(_)))
    }

    pub fn has_func_suffix(&self) -> bool {
        self.suffixes
            .iter()
            .any(|s| matches!(s, DeclSuffix::Func { .. }))
    }
}
