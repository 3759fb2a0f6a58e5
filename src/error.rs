//! Error handling.

use std::{fmt, path::PathBuf};

use fluent_i18n::t;

/// Where and why a parse operation failed.
///
/// Produced by the [`crate::tokenizer`] and [`crate::importer`] and attached
/// to [`Error::Parse`]. Also recorded on [`crate::Context`] in lenient mode,
/// where parsing continues past the failure.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParseDiagnostic {
    /// 1-based logical line number at which the failure was detected.
    pub line: usize,
    /// 0-based byte offset into the line at which the failure was detected.
    pub byte: usize,
    /// A short, human-readable description of what went wrong.
    pub reason: String,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, byte {}",
            self.reason, self.line, self.byte
        )
    }
}

/// The discriminated error kind exposed at every public API boundary (§4.8).
///
/// Every public operation can be reduced to one of these for callers that
/// only care about broad error classes (e.g. the CLI's exit-code mapping).
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum ErrorKind {
    /// Out of memory or an equivalent resource-exhaustion condition.
    Mem,
    /// An argument or pointer was syntactically invalid.
    Inval,
    /// The requested package, section, or option does not exist.
    NotFound,
    /// An I/O error occurred while reading or writing a file.
    Io,
    /// A parse error occurred while tokenizing or importing config text.
    Parse,
    /// A name collided with an existing sibling.
    Duplicate,
    /// Any other error not covered by the above.
    Unknown,
}

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A name failed [`crate::name::validate_name`] (or the type/value
    /// equivalents).
    #[error("{msg}", msg = t!("error-invalid-name", { "kind" => kind.to_string(), "value" => value.clone() }))]
    InvalidName {
        /// What kind of name was rejected (`"package"`, `"section"`, …).
        kind: &'static str,
        /// The offending value.
        value: String,
    },

    /// A scalar or list value contained a disallowed byte.
    #[error("{msg}", msg = t!("error-invalid-value", { "name" => name.clone() }))]
    InvalidValue {
        /// The name of the option whose value was rejected.
        name: String,
    },

    /// A pointer did not resolve to anything.
    #[error("{msg}", msg = t!("error-not-found", { "pointer" => pointer.clone() }))]
    NotFound {
        /// The pointer string that failed to resolve.
        pointer: String,
    },

    /// A pointer was syntactically malformed.
    #[error("{msg}", msg = t!("error-invalid-pointer", { "pointer" => pointer.clone(), "reason" => reason.clone() }))]
    InvalidPointer {
        /// The offending pointer string.
        pointer: String,
        /// Why the pointer was rejected.
        reason: String,
    },

    /// A name collided with an existing sibling (package, section, or
    /// option).
    #[error("{msg}", msg = t!("error-duplicate", { "kind" => kind, "name" => name.clone() }))]
    Duplicate {
        /// What kind of sibling collided (`"package"`, `"section"`, …).
        kind: &'static str,
        /// The colliding name.
        name: String,
    },

    /// I/O error not tied to a specific path.
    #[error("{msg}", msg = t!("error-io", { "context" => context.clone(), "source" => source.to_string() }))]
    Io {
        /// The context in which the error occurred, completing the
        /// sentence "I/O error while ".
        context: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// I/O error at a specific path.
    #[error("{msg}", msg = t!("error-io-path", {
        "path" => path.display().to_string(),
        "context" => context.clone(),
        "source" => source.to_string(),
    }))]
    IoPath {
        /// The path at which the error occurred.
        path: PathBuf,
        /// The context in which the error occurred.
        context: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Acquiring or releasing an advisory lock failed.
    #[error("{msg}", msg = t!("error-lock", {
        "path" => path.display().to_string(),
        "source" => source.to_string(),
    }))]
    Lock {
        /// The path of the file that could not be locked.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The tokenizer or importer failed to parse config text.
    #[error("{msg}", msg = t!("error-parse", { "diagnostic" => diagnostic.to_string() }))]
    Parse {
        /// Where and why parsing failed.
        diagnostic: ParseDiagnostic,
    },

    /// A logical line exceeded `LINEBUF_MAX` (§4.2).
    #[error("{msg}", msg = t!("error-line-too-long", { "line" => line.to_string(), "limit" => limit.to_string() }))]
    LineTooLong {
        /// The 1-based physical line number on which the limit was hit.
        line: usize,
        /// The configured maximum line length.
        limit: usize,
    },

    /// A mutation was attempted with no current section (`option`/`list`
    /// directive before any `config` directive).
    #[error("{msg}", msg = t!("error-no-current-section"))]
    NoCurrentSection,

    /// A `config` directive appeared before any `package` context was
    /// established and no default package was supplied.
    #[error("{msg}", msg = t!("error-no-current-package"))]
    NoCurrentPackage,

    /// An option name already names a value of the other shape (scalar vs.
    /// list) within the same section (invariant 6).
    #[error("{msg}", msg = t!("error-scalar-list-conflict", { "name" => .0.clone() }))]
    ScalarListConflict(String),

    /// A backend with the given name is not registered on the context.
    #[error("{msg}", msg = t!("error-unknown-backend", { "name" => .0.clone() }))]
    UnknownBackend(String),

    /// A batch command line used an unrecognized pointer form or keyword.
    #[error("{msg}", msg = t!("error-unknown-command", { "name" => .0.clone() }))]
    UnknownCommand(String),

    /// JSON (de)serialization error, used by the optional `cli` surface.
    #[cfg(feature = "cli")]
    #[error("{msg}", msg = t!("error-json", { "context" => context.clone(), "source" => source.to_string() }))]
    Json {
        /// The context in which the error occurred.
        context: String,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// No input was given on the command line or on stdin.
    #[cfg(feature = "cli")]
    #[error("{msg}", msg = t!("error-no-input"))]
    NoInput,
}

impl Error {
    /// Returns the broad [`ErrorKind`] this error maps to (§4.8, §7).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidName { .. }
            | Error::InvalidPointer { .. }
            | Error::InvalidValue { .. }
            | Error::ScalarListConflict(_)
            | Error::LineTooLong { .. } => ErrorKind::Inval,
            Error::NotFound { .. } | Error::NoCurrentSection | Error::NoCurrentPackage => {
                ErrorKind::NotFound
            }
            Error::Duplicate { .. } => ErrorKind::Duplicate,
            Error::Io { .. } | Error::IoPath { .. } | Error::Lock { .. } => ErrorKind::Io,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::UnknownBackend(_) | Error::UnknownCommand(_) => ErrorKind::Unknown,
            #[cfg(feature = "cli")]
            Error::Json { .. } | Error::NoInput => ErrorKind::Unknown,
        }
    }
}

impl<'a> From<winnow::error::ParseError<&'a str, winnow::error::ContextError>> for Error {
    /// Converts a [`winnow::error::ParseError`] into an [`Error::Parse`],
    /// recovering the byte offset winnow already tracked.
    fn from(value: winnow::error::ParseError<&'a str, winnow::error::ContextError>) -> Self {
        let byte = value.offset();
        Error::Parse {
            diagnostic: ParseDiagnostic {
                line: 0,
                byte,
                reason: value.inner().to_string(),
            },
        }
    }
}
