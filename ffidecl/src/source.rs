//! Source normalizer: comment stripping, line continuations and `#`-directives.
//!
//! The normalizer feeds the lexer a stream of characters that each carry
//! their logical position. Comments are replaced with spaces (newlines kept)
//! so that columns and line counts survive; `#line N "file"` and `# N "file"`
//! rewrite the position of everything that follows; `#define` lines are
//! collected for later processing instead of reaching the lexer.

use crate::error::{Error, Result};

/// file name used for positions when the caller provides a bare string.
pub const DEFAULT_SOURCE_NAME: &str = "<cdef source>";

/// logical position of a character or token. `file` indexes into
/// [`Normalized::files`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: u16,
    pub line: u32,
    pub col: u32,
}

/// one normalized character with its directive-adjusted position.
#[derive(Debug, Clone, Copy)]
pub struct PosChar {
    pub ch: char,
    pub loc: SourceLoc,
}

/// a `#define` directive collected during normalization. `body` is the raw
/// text after the `define` keyword with line continuations spliced.
#[derive(Debug, Clone)]
pub struct RawDefine {
    pub body: String,
    pub loc: SourceLoc,
}

#[derive(Debug)]
pub struct Normalized {
    pub chars: Vec<PosChar>,
    pub files: Vec<String>,
    pub defines: Vec<RawDefine>,
}

pub fn normalize(input: &str, source_name: &str) -> Result<Normalized> {
    let mut n = Normalizer {
        input: input.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
        file: 0,
        files: vec![source_name.to_string()],
        out: Vec::new(),
        defines: Vec::new(),
        line_blank: true,
    };
    n.run()?;
    Ok(Normalized {
        chars: n.out,
        files: n.files,
        defines: n.defines,
    })
}

struct Normalizer {
    input: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    file: u16,
    files: Vec<String>,
    out: Vec<PosChar>,
    defines: Vec<RawDefine>,
    // true while only whitespace has been emitted on the current line;
    // a directive is only recognized in that state
    line_blank: bool,
}

impl Normalizer {
    fn run(&mut self) -> Result<()> {
        while let Some(c) = self.peek() {
            if c == '\r' {
                self.bump();
                continue;
            }
            if self.line_blank && c == '#' {
                self.directive();
                continue;
            }
            match c {
                '/' if self.peek_at(1) == Some('/') => self.line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.block_comment()?,
                '\\' if self.peek_at(1) == Some('\n') => {
                    // line continuation: splice the logical line
                    self.bump();
                    self.bump();
                }
                '"' | '\'' => self.quoted(c)?,
                _ => {
                    self.emit(c);
                    self.bump();
                }
            }
        }
        Ok(())
    }

    /// emit a character at the current position, tracking line-blankness.
    fn emit(&mut self, ch: char) {
        if ch == '\n' {
            self.line_blank = true;
        } else if !ch.is_whitespace() {
            self.line_blank = false;
        }
        self.out.push(PosChar {
            ch,
            loc: self.loc(),
        });
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc {
            file: self.file,
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.input.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    /// `//` comment: spaces out everything up to the next unescaped
    /// newline. a backslash consumes the following character, so
    /// backslash-newline extends the comment onto the next line while a
    /// doubled backslash does not.
    fn line_comment(&mut self) {
        self.emit(' ');
        self.bump();
        self.emit(' ');
        self.bump();
        loop {
            match self.peek() {
                None => break,
                Some('\n') => break, // main loop emits the newline
                Some('\\') => {
                    self.emit(' ');
                    self.bump();
                    match self.peek() {
                        None => break,
                        Some('\n') => {
                            self.emit('\n');
                            self.bump();
                        }
                        Some(_) => {
                            self.emit(' ');
                            self.bump();
                        }
                    }
                }
                Some(_) => {
                    self.emit(' ');
                    self.bump();
                }
            }
        }
    }

    /// `/* */` comment: spaces, newlines preserved.
    fn block_comment(&mut self) -> Result<()> {
        let start = self.loc();
        self.emit(' ');
        self.bump();
        self.emit(' ');
        self.bump();
        loop {
            match self.peek() {
                None => {
                    return Err(Error::syntax(&self.files, start, "unterminated block comment"));
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.emit(' ');
                    self.bump();
                    self.emit(' ');
                    self.bump();
                    return Ok(());
                }
                Some('\n') => {
                    self.emit('\n');
                    self.bump();
                }
                Some(_) => {
                    self.emit(' ');
                    self.bump();
                }
            }
        }
    }

    /// string and character literals pass through verbatim; comment-like
    /// sequences inside them are inert.
    fn quoted(&mut self, quote: char) -> Result<()> {
        let start = self.loc();
        self.emit(quote);
        self.bump();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(Error::syntax(
                        &self.files,
                        start,
                        "unterminated string literal",
                    ));
                }
                Some('\\') => {
                    self.emit('\\');
                    self.bump();
                    if let Some(esc) = self.peek() {
                        self.emit(esc);
                        self.bump();
                    }
                }
                Some(c) if c == quote => {
                    self.emit(quote);
                    self.bump();
                    return Ok(());
                }
                Some(c) => {
                    self.emit(c);
                    self.bump();
                }
            }
        }
    }

    /// a `#` line. recognizes `#line N "file"` / `# N "file"` (updates the
    /// position mapping), collects `#define` bodies, and silently drops
    /// everything else (`#pragma` and friends). the directive text itself
    /// never reaches the lexer. malformed line directives are ignored.
    fn directive(&mut self) {
        let dloc = self.loc();
        self.bump(); // '#'
        let mut raw = String::new();
        loop {
            match self.peek() {
                None => break,
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                Some('\n') => {
                    self.bump();
                    break;
                }
                Some(c) => {
                    raw.push(c);
                    self.bump();
                }
            }
        }
        self.line_blank = true;

        let trimmed = raw.trim_start();
        if let Some(rest) = trimmed.strip_prefix("define") {
            if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace()) {
                log::trace!("collected #define at line {}", dloc.line);
                self.defines.push(RawDefine {
                    body: rest.trim().to_string(),
                    loc: dloc,
                });
                return;
            }
        }
        if let Some((n, name)) = parse_line_directive(&raw) {
            log::trace!("line directive: line {} file {:?}", n, name);
            self.line = n;
            if let Some(name) = name {
                self.file = self.intern_file(&name);
            }
        }
        // anything else is ignored, keeping the previous file/line context
    }

    fn intern_file(&mut self, name: &str) -> u16 {
        if let Some(idx) = self.files.iter().position(|f| f == name) {
            return idx as u16;
        }
        self.files.push(name.to_string());
        (self.files.len() - 1) as u16
    }
}

/// parse the text after `#` as a line directive. returns the line number
/// and the optional quoted file name, or None if it does not match.
fn parse_line_directive(s: &str) -> Option<(u32, Option<String>)> {
    let mut s = s.trim();
    if let Some(rest) = s.strip_prefix("line") {
        // "line" must be a whole word
        if !rest.starts_with(|c: char| c.is_whitespace()) {
            return None;
        }
        s = rest.trim_start();
    }
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let n: u32 = digits.parse().ok()?;
    s = s[digits.len()..].trim_start();
    if s.is_empty() {
        return Some((n, None));
    }
    let rest = s.strip_prefix('"')?;
    let end = rest.find('"')?;
    let name = rest[..end].to_string();
    if !rest[end + 1..].trim().is_empty() {
        return None;
    }
    Some((n, Some(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(n: &Normalized) -> String {
        n.chars.iter().map(|p| p.ch).collect()
    }

    #[test]
    fn test_comments_become_spaces() {
        let n = normalize("int /*x*/ a;", DEFAULT_SOURCE_NAME).unwrap();
        assert_eq!(text_of(&n), "int       a;");
        // column of 'a' is untouched
        let a = n.chars.iter().find(|p| p.ch == 'a').unwrap();
        assert_eq!((a.loc.line, a.loc.col), (1, 11));
    }

    #[test]
    fn test_block_comment_keeps_lines() {
        let n = normalize("int a;\n/* two\nlines */\nint b;\n", DEFAULT_SOURCE_NAME).unwrap();
        let b = n.chars.iter().find(|p| p.ch == 'b').unwrap();
        assert_eq!(b.loc.line, 4);
    }

    #[test]
    fn test_line_continuation_splices() {
        let n = normalize("in\\\nt a;", DEFAULT_SOURCE_NAME).unwrap();
        assert_eq!(text_of(&n), "int a;");
        let t = &n.chars[2];
        assert_eq!(t.ch, 't');
        assert_eq!(t.loc.line, 2);
    }

    #[test]
    fn test_continuation_extends_line_comment() {
        let n = normalize("double // blah \\\n more\nx;", DEFAULT_SOURCE_NAME).unwrap();
        let x = n.chars.iter().find(|p| p.ch == 'x').unwrap();
        assert_eq!(x.loc.line, 3);
        // "more" was commented out
        assert!(!text_of(&n).contains("more"));
    }

    #[test]
    fn test_double_backslash_ends_line_comment() {
        let n = normalize("double // blah\\\\\ny;", DEFAULT_SOURCE_NAME).unwrap();
        assert!(text_of(&n).contains('y'));
    }

    #[test]
    fn test_line_directive_both_spellings() {
        for src in [
            "\t # \t line \t 8 \t \"baz.c\" \t\nint a;\n",
            "\t # \t 8 \t \"baz.c\" \t\nint a;\n",
        ] {
            let n = normalize(src, DEFAULT_SOURCE_NAME).unwrap();
            let a = n.chars.iter().find(|p| p.ch == 'a').unwrap();
            assert_eq!(n.files[a.loc.file as usize], "baz.c");
            assert_eq!(a.loc.line, 8);
        }
    }

    #[test]
    fn test_directive_filename_keeps_slashes() {
        let n = normalize("#line 7 \"foo//bar.c\"\nint a;\n", DEFAULT_SOURCE_NAME).unwrap();
        let a = n.chars.iter().find(|p| p.ch == 'a').unwrap();
        assert_eq!(n.files[a.loc.file as usize], "foo//bar.c");
        assert_eq!(a.loc.line, 7);
    }

    #[test]
    fn test_directive_inside_block_comment_is_inert() {
        let n = normalize("/*\n#line 5 \"foo.c\"\n*/\nint a;\n", DEFAULT_SOURCE_NAME).unwrap();
        let a = n.chars.iter().find(|p| p.ch == 'a').unwrap();
        assert_eq!(n.files[a.loc.file as usize], DEFAULT_SOURCE_NAME);
        assert_eq!(a.loc.line, 4);
    }

    #[test]
    fn test_define_collected_with_continuation() {
        let n = normalize("#define ABC\\\n    42\n#define BCD   \\\n    43\n", DEFAULT_SOURCE_NAME)
            .unwrap();
        assert_eq!(n.defines.len(), 2);
        assert_eq!(n.defines[0].body, "ABC    42");
        assert_eq!(n.defines[1].body, "BCD       43");
    }

    #[test]
    fn test_pragma_ignored() {
        let n = normalize("#pragma foobar", DEFAULT_SOURCE_NAME).unwrap();
        assert!(n.defines.is_empty());
        assert!(text_of(&n).trim().is_empty());
    }

    #[test]
    fn test_malformed_directive_ignored() {
        let n = normalize("#line nonsense\nint a;\n", DEFAULT_SOURCE_NAME).unwrap();
        let a = n.chars.iter().find(|p| p.ch == 'a').unwrap();
        assert_eq!(a.loc.line, 2);
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert!(normalize("int a; /* oops", DEFAULT_SOURCE_NAME).is_err());
    }

    #[test]
    fn test_string_literal_hides_comment_markers() {
        let n = normalize("extern \"Py//thon\" int f(int);", DEFAULT_SOURCE_NAME).unwrap();
        assert!(text_of(&n).contains("Py//thon"));
    }
}
