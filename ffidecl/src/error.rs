use crate::source::SourceLoc;
use thiserror::Error;

/// all diagnostics surfaced by the library.
///
/// positions are 1-based and already adjusted for any `#line` directive
/// seen before the offending token.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{file}:{line}:{col}: syntax error: {message}")]
    Syntax {
        file: String,
        line: u32,
        col: u32,
        message: String,
    },

    #[error("redefinition of '{kind} {name}' with a conflicting type (declare with override to replace it)")]
    Redefinition { kind: &'static str, name: String },

    #[error("{file}:{line}: unknown identifier '{name}'")]
    UnknownIdentifier {
        file: String,
        line: u32,
        name: String,
    },

    #[error("{file}:{line}: {message}")]
    Unsupported {
        file: String,
        line: u32,
        message: String,
    },

    #[error("enum {tag}: the '{{...}}' declaration should appear on the first time the enum is mentioned, not later")]
    IllFormedEnum { tag: String },

    #[error("{file}:{line}: {name}: a function with only '(...)' as argument is not correct C")]
    InvalidVariadic {
        file: String,
        line: u32,
        name: String,
    },

    #[error("incomplete type: {what}")]
    Incomplete { what: String },

    #[error("symbol '{symbol}' not found in library {library}")]
    SymbolNotFound { symbol: String, library: String },

    #[error("cannot bind '{name}': {reason}")]
    Unbindable { name: String, reason: String },

    #[error("type has no C spelling: anonymous tag '{tag}'")]
    NoCName { tag: String },

    #[error("{file}:{line}: {message}")]
    Eval {
        file: String,
        line: u32,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn syntax(files: &[String], loc: SourceLoc, message: impl Into<String>) -> Error {
        Error::Syntax {
            file: file_name(files, loc),
            line: loc.line,
            col: loc.col,
            message: message.into(),
        }
    }

    pub(crate) fn unknown_identifier(files: &[String], loc: SourceLoc, name: &str) -> Error {
        Error::UnknownIdentifier {
            file: file_name(files, loc),
            line: loc.line,
            name: name.to_string(),
        }
    }

    pub(crate) fn unsupported(files: &[String], loc: SourceLoc, message: impl Into<String>) -> Error {
        Error::Unsupported {
            file: file_name(files, loc),
            line: loc.line,
            message: message.into(),
        }
    }

    pub(crate) fn eval(files: &[String], loc: SourceLoc, message: impl Into<String>) -> Error {
        Error::Eval {
            file: file_name(files, loc),
            line: loc.line,
            message: message.into(),
        }
    }
}

fn file_name(files: &[String], loc: SourceLoc) -> String {
    files
        .get(loc.file as usize)
        .cloned()
        .unwrap_or_else(|| "<unknown>".to_string())
}
