//! Backend errors (spec.md §7 "Backend error").

use std::fmt;

#[derive(Debug)]
pub enum BackendError {
    /// A logical error while walking the lowered module (e.g. an
    /// instruction tag the C backend doesn't know how to emit).
    Logic(String),
    /// A formatting error while writing generated C text.
    Format(fmt::Error),
    /// Failure reading/writing the generated translation unit or
    /// artifact on disk.
    Io(std::io::Error),
    /// `cc` exited non-zero.
    Invoke { status: Option<i32>, stderr: String },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Logic(s) => write!(f, "{s}"),
            BackendError::Format(e) => write!(f, "C source generation error: {e}"),
            BackendError::Io(e) => write!(f, "I/O error: {e}"),
            BackendError::Invoke { status, stderr } => {
                write!(f, "cc exited with status {status:?}: {stderr}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

impl From<fmt::Error> for BackendError {
    fn from(e: fmt::Error) -> Self {
        BackendError::Format(e)
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e)
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError::Logic(s)
    }
}
