//! Error types for linking and invocation.
//!
//! Two layers of errors exist:
//!
//! - [`InvocationError`] is produced by linked targets while they run
//!   (missing members, type mismatches, conversions). A guarded invocation
//!   may declare one [`InvocationErrorKind`] as "relink on", in which case
//!   the call site treats that error like a failed guard.
//! - [`LinkError`] is what a call site surfaces to its caller: linker
//!   exhaustion, fatal guard failures, misconfigured linkers and target
//!   errors wrapped from the layer below.

use std::fmt;

use crate::value::TypeKey;

/// Result type for linked targets
pub type InvocationResult = Result<crate::value::Value, InvocationError>;

/// Result type for linking operations
pub type LinkResult<T> = Result<T, LinkError>;

/// Discriminant of [`InvocationError`], used for `relink_on` matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationErrorKind {
    NoSuchMember,
    TypeMismatch,
    IndexOutOfBounds,
    Conversion,
    ReadOnly,
    NotCallable,
    Runtime,
}

/// Error raised by a linked target during execution
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationError {
    /// The receiver has no member with this name
    NoSuchMember { type_name: String, member: String },
    /// An argument had the wrong type
    TypeMismatch { expected: &'static str, got: String },
    /// List index outside `0..len`
    IndexOutOfBounds { index: i64, len: usize },
    /// Value could not be converted to the requested type
    Conversion { from: String, to: String },
    /// Attempt to write a private or read-only member
    ReadOnly(String),
    /// The callee is not a function, method or class
    NotCallable(String),
    /// Error raised by user code behind a target
    Runtime(String),
}

impl InvocationError {
    pub fn kind(&self) -> InvocationErrorKind {
        match self {
            Self::NoSuchMember { .. } => InvocationErrorKind::NoSuchMember,
            Self::TypeMismatch { .. } => InvocationErrorKind::TypeMismatch,
            Self::IndexOutOfBounds { .. } => InvocationErrorKind::IndexOutOfBounds,
            Self::Conversion { .. } => InvocationErrorKind::Conversion,
            Self::ReadOnly(_) => InvocationErrorKind::ReadOnly,
            Self::NotCallable(_) => InvocationErrorKind::NotCallable,
            Self::Runtime(_) => InvocationErrorKind::Runtime,
        }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchMember { type_name, member } => {
                write!(f, "no member '{}' on {}", member, type_name)
            }
            Self::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {}, got {}", expected, got)
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {} out of bounds for length {}", index, len)
            }
            Self::Conversion { from, to } => write!(f, "cannot convert {} to {}", from, to),
            Self::ReadOnly(member) => write!(f, "member '{}' is read-only", member),
            Self::NotCallable(what) => write!(f, "{} is not callable", what),
            Self::Runtime(msg) => write!(f, "runtime error: {}", msg),
        }
    }
}

impl std::error::Error for InvocationError {}

/// Error raised while evaluating a guard
///
/// Non-fatal guard errors count as a guard failure and the chain moves on to
/// its next entry. Fatal errors abort the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardError {
    pub message: String,
    pub fatal: bool,
}

impl GuardError {
    pub fn soft(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fatal {
            write!(f, "fatal guard error: {}", self.message)
        } else {
            write!(f, "guard error: {}", self.message)
        }
    }
}

impl std::error::Error for GuardError {}

/// Error surfaced by a call site to its caller
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// No linker, fallback included, produced an invocation
    LinkageFailure { descriptor: String, receiver: String },
    /// A guard failed fatally
    GuardEvaluation(GuardError),
    /// A linker broke its contract
    Misconfiguration { linker: String, reason: String },
    /// The call site was invoked with the wrong number of arguments
    ArityMismatch { expected: usize, got: usize },
    /// An operation string could not be parsed
    InvalidOperation(String),
    /// The linked target itself failed
    Invocation(InvocationError),
}

impl LinkError {
    pub(crate) fn linkage_failure(
        descriptor: &crate::descriptor::CallSiteDescriptor,
        receiver: Option<TypeKey>,
    ) -> Self {
        Self::LinkageFailure {
            descriptor: descriptor.to_string(),
            receiver: receiver
                .map(|key| key.to_string())
                .unwrap_or_else(|| "<no receiver>".to_string()),
        }
    }

    pub(crate) fn misconfigured(linker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Misconfiguration {
            linker: linker.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkageFailure {
                descriptor,
                receiver,
            } => write!(f, "no linker can link {} for receiver {}", descriptor, receiver),
            Self::GuardEvaluation(e) => write!(f, "{}", e),
            Self::Misconfiguration { linker, reason } => {
                write!(f, "linker '{}' is misconfigured: {}", linker, reason)
            }
            Self::ArityMismatch { expected, got } => {
                write!(f, "arity mismatch: expected {}, got {}", expected, got)
            }
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {}", msg),
            Self::Invocation(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::GuardEvaluation(e) => Some(e),
            Self::Invocation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InvocationError> for LinkError {
    fn from(e: InvocationError) -> Self {
        Self::Invocation(e)
    }
}

impl From<GuardError> for LinkError {
    fn from(e: GuardError) -> Self {
        Self::GuardEvaluation(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_error_kind() {
        let err = InvocationError::IndexOutOfBounds { index: 4, len: 2 };
        assert_eq!(err.kind(), InvocationErrorKind::IndexOutOfBounds);
        assert_eq!(err.to_string(), "index 4 out of bounds for length 2");
    }

    #[test]
    fn test_link_error_source() {
        use std::error::Error;

        let err = LinkError::from(GuardError::fatal("boom"));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "fatal guard error: boom");

        let err = LinkError::ArityMismatch {
            expected: 1,
            got: 3,
        };
        assert!(err.source().is_none());
    }
}
