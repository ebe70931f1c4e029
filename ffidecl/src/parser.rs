//! Recursive-descent parser for the declaration subset.
//!
//! Grammar (informal):
//!
//! ```text
//! top        ::= typedef | extern-python | declaration
//! declaration::= ["extern"] specifier declarator ("," declarator)* ";"
//!              | specifier ";"                      (struct/union/enum only)
//! specifier  ::= (qualifier | primitive-word)* base (qualifier)*
//! declarator ::= [convention] ("*" qualifier*)* direct suffix* [":" expr]
//! direct     ::= name | "(" declarator ")" | <empty>
//! suffix     ::= "[" [expr] "]" | "(" params ")"
//! ```
//!
//! Identifiers used as base types are resolved later by the builder; the
//! parser only needs to know typedef names to disambiguate `(name)` as a
//! parameter list versus a parenthesized declarator.

use crate::ast::*;
use crate::commontypes;
use crate::error::{Error, Result};
use crate::lexer::Token;
use crate::model::{CallConv, Quals};
use crate::source::SourceLoc;
use std::collections::HashSet;

pub struct Parser<'a> {
    toks: &'a [Token],
    pos: usize,
    files: &'a [String],
    typedef_names: HashSet<String>,
}

fn qual_of(s: &str) -> Option<Quals> {
    match s {
        "const" => Some(Quals::CONST),
        "volatile" => Some(Quals::VOLATILE),
        "restrict" | "__restrict" | "__restrict__" => Some(Quals::RESTRICT),
        _ => None,
    }
}

fn conv_of(s: &str) -> Option<CallConv> {
    match s {
        "__cdecl" => Some(CallConv::Cdecl),
        "__stdcall" | "WINAPI" => Some(CallConv::Stdcall),
        _ => None,
    }
}

fn is_prim_word(s: &str) -> bool {
    matches!(
        s,
        "void" | "char" | "short" | "int" | "long" | "float" | "double" | "signed" | "unsigned"
            | "_Bool"
    )
}

fn is_reserved(s: &str) -> bool {
    is_prim_word(s)
        || qual_of(s).is_some()
        || conv_of(s).is_some()
        || matches!(s, "struct" | "union" | "enum" | "typedef" | "extern")
}

/// collapse a multiset of primitive words into the canonical name.
fn normalize_prim(words: &[String]) -> std::result::Result<String, String> {
    let mut longs = 0usize;
    let mut short = false;
    let mut signed = false;
    let mut unsigned = false;
    let mut base: Option<&str> = None;

    for w in words {
        match w.as_str() {
            "long" => longs += 1,
            "short" => short = true,
            "signed" => signed = true,
            "unsigned" => unsigned = true,
            other => {
                if base.is_some() {
                    return Err(format!("invalid type specifier '{}'", other));
                }
                base = Some(other);
            }
        }
    }
    if signed && unsigned {
        return Err("both 'signed' and 'unsigned' in type specifier".to_string());
    }

    let spelled = |name: &str| {
        if unsigned {
            format!("unsigned {}", name)
        } else {
            name.to_string()
        }
    };

    match base {
        Some("void") | Some("float") | Some("_Bool") => {
            let name = base.map(str::to_string).unwrap_or_default();
            if longs > 0 || short || signed || unsigned {
                return Err(format!("invalid modifiers for '{}'", name));
            }
            Ok(name)
        }
        Some("double") => match (longs, short || signed || unsigned) {
            (0, false) => Ok("double".to_string()),
            (1, false) => Ok("long double".to_string()),
            _ => Err("invalid modifiers for 'double'".to_string()),
        },
        Some("char") => {
            if longs > 0 || short {
                return Err("invalid modifiers for 'char'".to_string());
            }
            if signed {
                Ok("signed char".to_string())
            } else if unsigned {
                Ok("unsigned char".to_string())
            } else {
                Ok("char".to_string())
            }
        }
        Some("int") | None => {
            if short && longs > 0 {
                return Err("both 'short' and 'long' in type specifier".to_string());
            }
            match (short, longs) {
                (true, _) => Ok(spelled("short")),
                (false, 0) => Ok(spelled("int")),
                (false, 1) => Ok(spelled("long")),
                (false, 2) => Ok(spelled("long long")),
                _ => Err("too many 'long' in type specifier".to_string()),
            }
        }
        Some(other) => Err(format!("invalid type specifier '{}'", other)),
    }
}

impl<'a> Parser<'a> {
    pub fn new(toks: &'a [Token], files: &'a [String], known_typedefs: HashSet<String>) -> Self {
        Self {
            toks,
            pos: 0,
            files,
            typedef_names: known_typedefs,
        }
    }

    fn tok(&self) -> &Token {
        // the token stream always ends with Eof
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.toks[(self.pos + n).min(self.toks.len() - 1)]
    }

    fn loc(&self) -> SourceLoc {
        self.tok().loc()
    }

    fn syn(&self, loc: SourceLoc, msg: impl Into<String>) -> Error {
        Error::syntax(self.files, loc, msg)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if matches!(self.tok(), Token::Punct(p, _) if *p == c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.syn(self.loc(), format!("expected '{}', got {}", c, self.tok())))
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if matches!(self.tok(), Token::Ident(s, _) if s == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn is_known_type(&self, name: &str) -> bool {
        self.typedef_names.contains(name) || commontypes::is_common(name)
    }

    /// parse a whole declaration set.
    pub fn parse_declarations(&mut self) -> Result<Vec<Decl>> {
        let mut out = Vec::new();
        loop {
            while self.eat_punct(';') {}
            if matches!(self.tok(), Token::Eof(_)) {
                break;
            }
            out.push(self.parse_top_decl()?);
        }
        log::debug!("parsed {} top-level declarations", out.len());
        Ok(out)
    }

    /// parse a type-only string (for casts and type lookups). the
    /// declarator must stay abstract.
    pub fn parse_type_expr(&mut self) -> Result<(TypeSpec, Declarator)> {
        let spec = self.parse_type_spec()?;
        let decl = self.parse_declarator(false)?;
        if let Some(name) = decl.name() {
            return Err(self.syn(
                decl.loc,
                format!("unexpected identifier '{}' in type expression", name),
            ));
        }
        if !matches!(self.tok(), Token::Eof(_)) {
            return Err(self.syn(self.loc(), format!("unexpected {}", self.tok())));
        }
        Ok((spec, decl))
    }

    fn parse_top_decl(&mut self) -> Result<Decl> {
        let start = self.loc();
        if self.eat_kw("typedef") {
            return self.parse_typedef(start);
        }
        if matches!(self.tok(), Token::Ident(s, _) if s == "extern") {
            if let Token::Str(lang, sloc) = self.peek_at(1) {
                let (lang, sloc) = (lang.clone(), *sloc);
                if lang != "Python" {
                    return Err(Error::unsupported(
                        self.files,
                        sloc,
                        format!("extern \"{}\" is not supported, only extern \"Python\"", lang),
                    ));
                }
                self.pos += 2;
                return self.parse_extern_python(start);
            }
            self.pos += 1;
            return self.parse_plain_decl(start, true);
        }
        self.parse_plain_decl(start, false)
    }

    fn parse_typedef(&mut self, start: SourceLoc) -> Result<Decl> {
        let spec = self.parse_type_spec()?;
        let mut decls = Vec::new();
        loop {
            let d = self.parse_declarator(false)?;
            match d.name() {
                Some(name) => {
                    self.typedef_names.insert(name.to_string());
                }
                None => return Err(self.syn(d.loc, "typedef requires a name")),
            }
            decls.push(d);
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(';')?;
        Ok(Decl::Typedef { spec, decls, loc: start })
    }

    fn parse_extern_python(&mut self, start: SourceLoc) -> Result<Decl> {
        let mut decls = Vec::new();
        if self.eat_punct('{') {
            loop {
                while self.eat_punct(';') {}
                if self.eat_punct('}') {
                    break;
                }
                let loc = self.loc();
                decls.push(self.parse_plain_decl(loc, false)?);
            }
        } else {
            let loc = self.loc();
            decls.push(self.parse_plain_decl(loc, false)?);
        }
        Ok(Decl::ExternPython { decls, loc: start })
    }

    fn parse_plain_decl(&mut self, start: SourceLoc, is_extern: bool) -> Result<Decl> {
        let spec = self.parse_type_spec()?;
        let mut decls = Vec::new();
        if self.eat_punct(';') {
            match &spec.base {
                BaseSpec::Struct { .. } | BaseSpec::Union { .. } | BaseSpec::Enum { .. } => {
                    return Ok(Decl::Normal {
                        spec,
                        decls,
                        is_extern,
                        loc: start,
                    });
                }
                _ => return Err(self.syn(spec.loc, "declaration without declarator")),
            }
        }
        loop {
            let d = self.parse_declarator(false)?;
            if matches!(self.tok(), Token::Punct('{', _)) {
                return Err(Error::unsupported(
                    self.files,
                    self.loc(),
                    "unexpected function body: this construct is valid C but not supported here",
                ));
            }
            decls.push(d);
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(';')?;
        Ok(Decl::Normal {
            spec,
            decls,
            is_extern,
            loc: start,
        })
    }

    /// qualifiers and base type, in any order the subset allows.
    fn parse_type_spec(&mut self) -> Result<TypeSpec> {
        let start = self.loc();
        let mut quals = Quals::NONE;
        let mut words: Vec<String> = Vec::new();
        let mut named: Option<String> = None;
        let mut composite: Option<BaseSpec> = None;

        loop {
            let Token::Ident(s, _) = self.tok() else { break };
            let s = s.clone();
            if let Some(q) = qual_of(&s) {
                quals |= q;
                self.pos += 1;
                continue;
            }
            if conv_of(&s).is_some() {
                break; // belongs to the declarator
            }
            match s.as_str() {
                "struct" | "union" => {
                    if composite.is_some() || named.is_some() || !words.is_empty() {
                        break;
                    }
                    self.pos += 1;
                    let is_union = s == "union";
                    let tag = self.eat_tag();
                    let body = if matches!(self.tok(), Token::Punct('{', _)) {
                        Some(self.parse_struct_body()?)
                    } else {
                        None
                    };
                    if tag.is_none() && body.is_none() {
                        return Err(self.syn(start, format!("{} requires a tag or a body", s)));
                    }
                    composite = Some(if is_union {
                        BaseSpec::Union { tag, body }
                    } else {
                        BaseSpec::Struct { tag, body }
                    });
                }
                "enum" => {
                    if composite.is_some() || named.is_some() || !words.is_empty() {
                        break;
                    }
                    self.pos += 1;
                    let tag = self.eat_tag();
                    let body = if matches!(self.tok(), Token::Punct('{', _)) {
                        Some(self.parse_enum_body()?)
                    } else {
                        None
                    };
                    if tag.is_none() && body.is_none() {
                        return Err(self.syn(start, "enum requires a tag or a body"));
                    }
                    composite = Some(BaseSpec::Enum { tag, body });
                }
                _ if is_prim_word(&s) => {
                    if composite.is_some() || named.is_some() {
                        break;
                    }
                    words.push(s);
                    self.pos += 1;
                }
                _ => {
                    if composite.is_none() && named.is_none() && words.is_empty() {
                        named = Some(s);
                        self.pos += 1;
                        continue;
                    }
                    break;
                }
            }
        }

        let base = if let Some(c) = composite {
            c
        } else if !words.is_empty() {
            let name = normalize_prim(&words).map_err(|m| self.syn(start, m))?;
            BaseSpec::Primitive(name)
        } else if let Some(n) = named {
            BaseSpec::Named(n)
        } else {
            return Err(self.syn(self.loc(), format!("expected a type, got {}", self.tok())));
        };

        Ok(TypeSpec {
            quals,
            base,
            loc: start,
        })
    }

    fn eat_tag(&mut self) -> Option<String> {
        if let Token::Ident(t, _) = self.tok() {
            if !is_reserved(t) {
                let t = t.clone();
                self.pos += 1;
                return Some(t);
            }
        }
        None
    }

    fn parse_struct_body(&mut self) -> Result<Vec<FieldDecl>> {
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        loop {
            if self.eat_punct('}') {
                break;
            }
            let spec = self.parse_type_spec()?;
            if self.eat_punct(';') {
                // anonymous struct/union member
                match &spec.base {
                    BaseSpec::Struct { body: Some(_), .. } | BaseSpec::Union { body: Some(_), .. } => {
                        fields.push(FieldDecl { spec, decls: vec![] });
                        continue;
                    }
                    _ => return Err(self.syn(spec.loc, "field declaration without a name")),
                }
            }
            let mut decls = Vec::new();
            loop {
                decls.push(self.parse_declarator(true)?);
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct(';')?;
            fields.push(FieldDecl { spec, decls });
        }
        Ok(fields)
    }

    fn parse_enum_body(&mut self) -> Result<Vec<EnumItem>> {
        self.expect_punct('{')?;
        let mut items = Vec::new();
        loop {
            if self.eat_punct('}') {
                break;
            }
            let loc = self.loc();
            let name = match self.tok() {
                Token::Ident(s, _) if !is_reserved(s) => {
                    let s = s.clone();
                    self.pos += 1;
                    s
                }
                other => {
                    return Err(self.syn(loc, format!("expected enumerator name, got {}", other)));
                }
            };
            let value = if self.eat_punct('=') {
                Some(self.parse_const_expr()?)
            } else {
                None
            };
            items.push(EnumItem { name, value, loc });
            if self.eat_punct(',') {
                continue;
            }
            self.expect_punct('}')?;
            break;
        }
        Ok(items)
    }

    fn parse_declarator(&mut self, in_struct: bool) -> Result<Declarator> {
        let start = self.loc();
        let mut conv = None;
        if let Token::Ident(s, _) = self.tok() {
            if let Some(c) = conv_of(s) {
                conv = Some(c);
                self.pos += 1;
            }
        }

        let mut pointers = Vec::new();
        while self.eat_punct('*') {
            let mut quals = Quals::NONE;
            while let Token::Ident(s, _) = self.tok() {
                match qual_of(s) {
                    Some(q) => {
                        quals |= q;
                        self.pos += 1;
                    }
                    None => break,
                }
            }
            pointers.push(PtrLevel { quals });
        }

        let inner = match self.tok() {
            Token::Ident(s, _) if !is_reserved(s) => {
                let n = s.clone();
                self.pos += 1;
                DirectDecl::Name(Some(n))
            }
            Token::Punct('(', _) if self.paren_is_declarator() => {
                self.pos += 1;
                let d = self.parse_declarator(false)?;
                self.expect_punct(')')?;
                DirectDecl::Paren(Box::new(d))
            }
            _ => DirectDecl::Name(None),
        };

        let mut suffixes = Vec::new();
        loop {
            if self.eat_punct('[') {
                let len = if matches!(self.tok(), Token::Punct(']', _)) {
                    None
                } else {
                    Some(self.parse_const_expr()?)
                };
                self.expect_punct(']')?;
                suffixes.push(DeclSuffix::Array { len });
            } else if matches!(self.tok(), Token::Punct('(', _)) {
                self.pos += 1;
                let (params, varargs) = self.parse_params()?;
                suffixes.push(DeclSuffix::Func { params, varargs });
            } else {
                break;
            }
        }

        let bitsize = if in_struct && self.eat_punct(':') {
            Some(self.parse_const_expr()?)
        } else {
            None
        };

        Ok(Declarator {
            conv,
            pointers,
            inner,
            suffixes,
            bitsize,
            loc: start,
        })
    }

    /// decide whether `(` after a direct-declarator position opens a nested
    /// declarator or a parameter list. the only ambiguous case is a single
    /// identifier, resolved through the typedef table.
    fn paren_is_declarator(&self) -> bool {
        match self.peek_at(1) {
            Token::Punct('*', _) | Token::Punct('(', _) => true,
            Token::Ident(s, _) => {
                if qual_of(s).is_some()
                    || is_prim_word(s)
                    || matches!(s.as_str(), "struct" | "union" | "enum")
                {
                    false
                } else if conv_of(s).is_some() {
                    true
                } else {
                    !self.is_known_type(s)
                }
            }
            _ => false,
        }
    }

    fn parse_params(&mut self) -> Result<(Vec<ParamDecl>, bool)> {
        let mut params = Vec::new();
        if self.eat_punct(')') {
            return Ok((params, false));
        }
        loop {
            if matches!(self.tok(), Token::Ellipsis(_)) {
                self.pos += 1;
                self.expect_punct(')')?;
                return Ok((params, true));
            }
            let spec = self.parse_type_spec()?;
            let decl = self.parse_declarator(false)?;
            params.push(ParamDecl { spec, decl });
            if self.eat_punct(',') {
                continue;
            }
            self.expect_punct(')')?;
            return Ok((params, false));
        }
    }

    // constant expressions, standard C precedence

    pub(crate) fn parse_const_expr(&mut self) -> Result<ConstExpr> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<ConstExpr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some((op, prec)) = self.bin_op() else { break };
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_binary(prec + 1)?;
            lhs = ConstExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn bin_op(&self) -> Option<(BinOp, u8)> {
        match self.tok() {
            Token::Punct('|', _) => Some((BinOp::BitOr, 1)),
            Token::Punct('^', _) => Some((BinOp::BitXor, 2)),
            Token::Punct('&', _) => Some((BinOp::BitAnd, 3)),
            Token::Shl(_) => Some((BinOp::Shl, 4)),
            Token::Shr(_) => Some((BinOp::Shr, 4)),
            Token::Punct('+', _) => Some((BinOp::Add, 5)),
            Token::Punct('-', _) => Some((BinOp::Sub, 5)),
            Token::Punct('*', _) => Some((BinOp::Mul, 6)),
            Token::Punct('/', _) => Some((BinOp::Div, 6)),
            _ => None,
        }
    }

    fn parse_unary(&mut self) -> Result<ConstExpr> {
        let loc = self.loc();
        match self.tok() {
            Token::Punct(op @ ('+' | '-' | '~'), _) => {
                let op = *op;
                self.pos += 1;
                Ok(ConstExpr::Unary {
                    op,
                    operand: Box::new(self.parse_unary()?),
                })
            }
            Token::Number(s, _) => {
                let s = s.clone();
                self.pos += 1;
                Ok(ConstExpr::Literal(s, loc))
            }
            Token::Ident(s, _) if !is_reserved(s) => {
                let s = s.clone();
                self.pos += 1;
                Ok(ConstExpr::Name(s, loc))
            }
            Token::Punct('(', _) => {
                self.pos += 1;
                let e = self.parse_const_expr()?;
                self.expect_punct(')')?;
                Ok(e)
            }
            other => Err(self.syn(loc, format!("expected constant expression, got {}", other))),
        }
    }
}
