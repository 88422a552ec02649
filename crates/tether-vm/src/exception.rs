use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can raise inside the runtime.
pub type RunResult<T> = Result<T, RunError>;

/// Exception types the runtime can raise.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Base class, matches any exception.
    Exception,
    ValueError,
    TypeError,
    /// Missing dict key.
    KeyError,
    /// Sequence index out of range.
    IndexError,
    /// Unbound name in every visible scope.
    NameError,
    /// Missing attribute or method.
    AttributeError,
    ZeroDivisionError,
    /// Integer arithmetic left the 64-bit signed range.
    OverflowError,
    RuntimeError,
    /// Call depth exceeded the configured limit.
    RecursionError,
    /// Source could not be parsed or uses unsupported syntax.
    SyntaxError,
    NotImplementedError,
    AssertionError,
}

impl ExcType {
    /// All exception types, in the order they are bound in the `Core` module.
    pub const ALL: [Self; 14] = [
        Self::Exception,
        Self::ValueError,
        Self::TypeError,
        Self::KeyError,
        Self::IndexError,
        Self::NameError,
        Self::AttributeError,
        Self::ZeroDivisionError,
        Self::OverflowError,
        Self::RuntimeError,
        Self::RecursionError,
        Self::SyntaxError,
        Self::NotImplementedError,
        Self::AssertionError,
    ];

    /// Whether an `except`-style match against `handler` would catch `self`.
    #[must_use]
    pub fn is_subclass_of(self, handler: Self) -> bool {
        self == handler || handler == Self::Exception
    }

    /// Whether this fault came from a failed key/index/name lookup.
    #[must_use]
    pub fn is_lookup(self) -> bool {
        matches!(
            self,
            Self::KeyError | Self::IndexError | Self::NameError | Self::AttributeError
        )
    }
}

/// One frame of a runtime traceback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Function name, `<module>` for top-level code.
    pub function: String,
    /// Script name the frame's code came from, `<builtin>` for native functions.
    pub filename: String,
    /// 1-based line being executed when the fault passed through this frame.
    pub line: Option<u32>,
}

impl StackFrame {
    #[must_use]
    pub fn new(function: impl Into<String>, filename: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            function: function.into(),
            filename: filename.into(),
            line,
        }
    }

    /// Frame contributed by a native (builtin) function.
    #[must_use]
    pub fn builtin(function: impl Into<String>) -> Self {
        Self::new(function, "<builtin>", None)
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at {}:{line}", self.function, self.filename),
            None => write!(f, "{} at {}", self.function, self.filename),
        }
    }
}

/// A raised runtime exception together with the stack it unwound through.
///
/// Frames are ordered innermost first. The evaluator appends a frame every time
/// the fault leaves a function activation, so a fault that reached the fault
/// indicator always has at least one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub exc_type: ExcType,
    pub message: String,
    pub frames: Vec<StackFrame>,
}

impl Fault {
    #[must_use]
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            exc_type,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// `ExcType: message` summary line.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.message.is_empty() {
            self.exc_type.to_string()
        } else {
            format!("{}: {}", self.exc_type, self.message)
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback (innermost first):")?;
        for frame in &self.frames {
            writeln!(f, "  {frame}")?;
        }
        write!(f, "{}", self.summary())
    }
}

/// Error propagated through the evaluator while a fault unwinds.
#[derive(Debug, Clone, PartialEq)]
pub struct RunError(pub Box<Fault>);

impl RunError {
    #[must_use]
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self(Box::new(Fault::new(exc_type, message)))
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExcType::TypeError, message)
    }

    #[must_use]
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExcType::ValueError, message)
    }

    #[must_use]
    pub fn overflow() -> Self {
        Self::new(ExcType::OverflowError, "integer overflow")
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.0.exc_type
    }

    /// Records that the fault left `frame` on its way out.
    pub(crate) fn push_frame(&mut self, frame: StackFrame) {
        self.0.frames.push(frame);
    }

    #[must_use]
    pub fn into_fault(self) -> Fault {
        *self.0
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.summary())
    }
}

impl std::error::Error for RunError {}

impl From<Fault> for RunError {
    fn from(fault: Fault) -> Self {
        Self(Box::new(fault))
    }
}
