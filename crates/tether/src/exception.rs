//! Fault translation.
//!
//! Every crossing into the runtime ends with [`check`]: it reads the fault
//! indicator, clears it, and turns a pending fault into the [`Error`] kind that
//! fits the crossing.

use std::fmt;

use serde::{Deserialize, Serialize};
use tether_vm::{ExcType, Fault, Runtime, StackFrame};

use crate::{
    error::{Error, Result},
    proxy::PathKey,
};

/// A runtime exception as observed by the host.
///
/// The record is always fully populated: an exception raised without a message
/// carries its type name as message, and `frames` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    /// Runtime exception type name, e.g. `ValueError`.
    pub exc_type: String,
    pub message: String,
    /// Stack at the point of the raise, innermost first.
    pub frames: Vec<StackFrame>,
}

impl ExceptionRecord {
    /// `Type: message` line.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.message == self.exc_type {
            self.exc_type.clone()
        } else {
            format!("{}: {}", self.exc_type, self.message)
        }
    }

    /// Parses the exception type name back into the runtime's enum.
    #[must_use]
    pub fn kind(&self) -> Option<ExcType> {
        self.exc_type.parse().ok()
    }
}

impl From<Fault> for ExceptionRecord {
    fn from(fault: Fault) -> Self {
        let exc_type = fault.exc_type.to_string();
        let message = if fault.message.is_empty() {
            exc_type.clone()
        } else {
            fault.message
        };
        let mut frames = fault.frames;
        if frames.is_empty() {
            frames.push(StackFrame::new("<runtime>", "<runtime>", None));
        }
        Self {
            exc_type,
            message,
            frames,
        }
    }
}

impl fmt::Display for ExceptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback (innermost first):")?;
        for frame in &self.frames {
            writeln!(f, "  {frame}")?;
        }
        write!(f, "{}", self.summary())
    }
}

/// The kind of boundary crossing that just finished.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Crossing<'a> {
    Evaluate,
    Navigate { path: &'a str, key: &'a PathKey },
    Call { path: &'a str },
    Assign { path: &'a str },
    Box,
}

/// Checks and clears the fault indicator after a crossing.
pub(crate) fn check(rt: &mut Runtime, crossing: Crossing<'_>) -> Result<()> {
    match rt.take_fault() {
        None => Ok(()),
        Some(fault) => Err(translate(fault, crossing)),
    }
}

fn translate(fault: Fault, crossing: Crossing<'_>) -> Error {
    tracing::debug!(
        crossing = ?crossing,
        exc_type = %fault.exc_type,
        message = %fault.message,
        frames = fault.frames.len(),
        "translating runtime fault"
    );
    if let Crossing::Navigate { path, key } = crossing {
        match (fault.exc_type, key) {
            (ExcType::IndexError, PathKey::Index(index)) => {
                return Error::IndexOutOfRange {
                    path: path.to_owned(),
                    index: *index,
                };
            }
            (exc_type, key) if exc_type.is_lookup() => {
                return Error::KeyNotFound {
                    path: path.to_owned(),
                    key: key.to_string(),
                };
            }
            _ => {}
        }
    }
    Error::Runtime(fault.into())
}
