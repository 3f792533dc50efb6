//! Target errors (spec.md §7 "Target error").

use std::fmt;

#[derive(Debug, Clone)]
pub struct TargetError {
    pub triple: String,
    pub convention: String,
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported calling convention '{}' for triple '{}'",
            self.convention, self.triple
        )
    }
}

impl std::error::Error for TargetError {}
