use std::fmt;

use crate::exception::ExceptionRecord;

/// Result alias used by every bridge operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Host-side error for failures at the runtime boundary.
///
/// Runtime faults never reach the caller untranslated: navigation faults become
/// `KeyNotFound` / `IndexOutOfRange`, everything else raised inside the runtime
/// is `Runtime` with the full exception record.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// `initialize` was called while a session already exists.
    AlreadyInitialized,
    /// No session exists: used before `initialize` or after `teardown`.
    NotInitialized,
    /// A handle or proxy outlived its value or the session that produced it.
    StaleHandle,
    /// The runtime raised an exception.
    Runtime(ExceptionRecord),
    /// The runtime value cannot be converted to the requested host type.
    TypeMismatch { expected: String, actual: String },
    /// Navigation by name found nothing.
    KeyNotFound { path: String, key: String },
    /// Navigation by position fell outside the sequence.
    IndexOutOfRange { path: String, index: i64 },
    /// The proxied value cannot be called.
    NotCallable { path: String, type_name: String },
    /// The proxy has no writable location.
    Immutable { path: String },
}

impl Error {
    /// The forwarded runtime exception, if this error carries one.
    #[must_use]
    pub fn exception(&self) -> Option<&ExceptionRecord> {
        match self {
            Self::Runtime(record) => Some(record),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => f.write_str("runtime session is already initialized"),
            Self::NotInitialized => f.write_str("runtime session is not initialized"),
            Self::StaleHandle => f.write_str("handle refers to a released value or a torn-down session"),
            Self::Runtime(record) => write!(f, "{}", record.summary()),
            Self::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {expected}, got {actual}")
            }
            Self::KeyNotFound { path, key } => write!(f, "{path} has no key '{key}'"),
            Self::IndexOutOfRange { path, index } => write!(f, "index {index} out of range for {path}"),
            Self::NotCallable { path, type_name } => write!(f, "{path} ('{type_name}') is not callable"),
            Self::Immutable { path } => write!(f, "{path} is not an assignable location"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ExceptionRecord> for Error {
    fn from(record: ExceptionRecord) -> Self {
        Self::Runtime(record)
    }
}
