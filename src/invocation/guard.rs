//! Guards: the preconditions under which a cached target stays valid.
//!
//! A guard runs on every call that goes through a cached entry, so the common
//! variants are plain data compared against [`Value::type_key`].

use std::fmt;
use std::sync::Arc;

use crate::error::GuardError;
use crate::value::{TypeKey, Value};

/// Predicate over the call arguments used by [`Guard::Custom`]
pub type GuardFn = Arc<dyn Fn(&[Value]) -> Result<bool, GuardError> + Send + Sync>;

#[derive(Clone)]
pub enum Guard {
    /// Always passes
    Always,
    /// Argument at `position` has exactly this runtime type
    TypeIs { position: usize, key: TypeKey },
    /// Argument at `position` is an instance of any host class
    AnyInstance { position: usize },
    /// Argument at `position` is this very value
    Identity { position: usize, value: Value },
    /// Arbitrary predicate; may fail softly or fatally
    Custom(GuardFn),
    /// Every guard passes
    All(Arc<[Guard]>),
}

impl Guard {
    /// Guard on the type of the receiver (argument 0)
    pub fn receiver_type(key: TypeKey) -> Self {
        Guard::TypeIs { position: 0, key }
    }

    pub fn argument_type(position: usize, key: TypeKey) -> Self {
        Guard::TypeIs { position, key }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        Guard::Custom(Arc::new(f))
    }

    /// Conjunction of `self` and `other`, flattening nested conjunctions
    pub fn and(self, other: Guard) -> Guard {
        match (self, other) {
            (Guard::Always, g) | (g, Guard::Always) => g,
            (a, b) => {
                let mut parts = Vec::new();
                for g in [a, b] {
                    match g {
                        Guard::All(inner) => parts.extend(inner.iter().cloned()),
                        g => parts.push(g),
                    }
                }
                Guard::All(parts.into())
            }
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Guard::Always)
    }

    /// Evaluate against the call arguments
    ///
    /// A position past the end of `args` fails the guard.
    #[inline]
    pub fn evaluate(&self, args: &[Value]) -> Result<bool, GuardError> {
        match self {
            Guard::Always => Ok(true),
            Guard::TypeIs { position, key } => {
                Ok(args.get(*position).is_some_and(|v| v.type_key() == *key))
            }
            Guard::AnyInstance { position } => {
                Ok(matches!(args.get(*position), Some(Value::Object(_))))
            }
            Guard::Identity { position, value } => {
                Ok(args.get(*position).is_some_and(|v| v.same_as(value)))
            }
            Guard::Custom(f) => f(args),
            Guard::All(guards) => {
                for guard in guards.iter() {
                    if !guard.evaluate(args)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Always => f.write_str("Always"),
            Guard::TypeIs { position, key } => write!(f, "TypeIs({}: {})", position, key),
            Guard::AnyInstance { position } => write!(f, "AnyInstance({})", position),
            Guard::Identity { position, value } => write!(f, "Identity({}: {})", position, value),
            Guard::Custom(_) => f.write_str("Custom"),
            Guard::All(guards) => f.debug_list().entries(guards.iter()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_guard() {
        let guard = Guard::receiver_type(TypeKey::Int);
        assert_eq!(guard.evaluate(&[Value::Int(1)]), Ok(true));
        assert_eq!(guard.evaluate(&[Value::str("1")]), Ok(false));
        assert_eq!(guard.evaluate(&[]), Ok(false));
    }

    #[test]
    fn test_and_flattens_and_drops_always() {
        let g = Guard::Always.and(Guard::receiver_type(TypeKey::Int));
        assert!(matches!(g, Guard::TypeIs { .. }));

        let g = g
            .and(Guard::argument_type(1, TypeKey::Str))
            .and(Guard::argument_type(2, TypeKey::Bool));
        match &g {
            Guard::All(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected All, got {:?}", other),
        }

        let args = [Value::Int(1), Value::str("a"), Value::Bool(true)];
        assert_eq!(g.evaluate(&args), Ok(true));
        let args = [Value::Int(1), Value::str("a"), Value::Int(0)];
        assert_eq!(g.evaluate(&args), Ok(false));
    }

    #[test]
    fn test_identity_guard() {
        let list = Value::list([]);
        let guard = Guard::Identity {
            position: 0,
            value: list.clone(),
        };
        assert_eq!(guard.evaluate(&[list]), Ok(true));
        assert_eq!(guard.evaluate(&[Value::list([])]), Ok(false));
    }

    #[test]
    fn test_custom_guard_errors_propagate() {
        let guard = Guard::Always.and(Guard::custom(|_| Err(GuardError::fatal("nope"))));
        assert_eq!(guard.evaluate(&[]), Err(GuardError::fatal("nope")));
    }
}
