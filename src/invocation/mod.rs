//! Guarded invocations.
//!
//! A [`GuardedInvocation`] pairs a [`Target`] with the [`Guard`] under which
//! it is valid. It may also carry [`SwitchPoint`]s and a "relink on" error
//! kind; either of those retires the entry independently of the guard.

mod guard;
mod switch_point;

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

pub use guard::{Guard, GuardFn};
pub use switch_point::SwitchPoint;

use crate::error::{GuardError, InvocationError, InvocationErrorKind, InvocationResult};
use crate::value::Value;

/// Number of arguments a target accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    #[inline]
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "{}+", n),
        }
    }
}

/// Executable body of a linked operation
#[derive(Clone)]
pub struct Target {
    arity: Arity,
    body: Arc<dyn Fn(&[Value]) -> InvocationResult + Send + Sync>,
}

impl Target {
    pub fn new<F>(arity: Arity, body: F) -> Self
    where
        F: Fn(&[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        Self {
            arity,
            body: Arc::new(body),
        }
    }

    pub fn exact<F>(arity: usize, body: F) -> Self
    where
        F: Fn(&[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        Self::new(Arity::Exact(arity), body)
    }

    pub fn variadic<F>(min: usize, body: F) -> Self
    where
        F: Fn(&[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        Self::new(Arity::AtLeast(min), body)
    }

    /// Target that returns `value` regardless of its arguments
    pub fn constant(arity: Arity, value: Value) -> Self {
        Self::new(arity, move |_| Ok(value.clone()))
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Run the body; argument counts outside [`Target::arity`] are rejected
    /// before the body sees them
    #[inline]
    pub fn invoke(&self, args: &[Value]) -> InvocationResult {
        if !self.arity.accepts(args.len()) {
            return Err(InvocationError::Runtime(format!(
                "target takes {} arguments, got {}",
                self.arity,
                args.len()
            )));
        }
        (self.body)(args)
    }

    /// Target that post-processes this target's result
    pub fn filter_return<F>(&self, filter: F) -> Target
    where
        F: Fn(Value) -> InvocationResult + Send + Sync + 'static,
    {
        let inner = self.body.clone();
        Target {
            arity: self.arity,
            body: Arc::new(move |args| inner(args).and_then(&filter)),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target").field("arity", &self.arity).finish()
    }
}

#[derive(Clone, Debug)]
pub struct GuardedInvocation {
    target: Target,
    guard: Guard,
    switch_points: SmallVec<[SwitchPoint; 2]>,
    relink_on: Option<InvocationErrorKind>,
}

impl GuardedInvocation {
    pub fn new(target: Target, guard: Guard) -> Self {
        Self {
            target,
            guard,
            switch_points: SmallVec::new(),
            relink_on: None,
        }
    }

    /// Invocation valid for any arguments
    pub fn unconditional(target: Target) -> Self {
        Self::new(target, Guard::Always)
    }

    pub fn with_switch_point(mut self, switch_point: SwitchPoint) -> Self {
        self.switch_points.push(switch_point);
        self
    }

    /// Treat `kind` errors from the target as a cache miss
    pub fn with_relink_on(mut self, kind: InvocationErrorKind) -> Self {
        self.relink_on = Some(kind);
        self
    }

    pub fn replace_target(self, target: Target) -> Self {
        Self { target, ..self }
    }

    pub fn map_target(self, f: impl FnOnce(&Target) -> Target) -> Self {
        let target = f(&self.target);
        self.replace_target(target)
    }

    /// Narrow the guard with an additional condition
    pub fn add_guard(self, guard: Guard) -> Self {
        Self {
            guard: self.guard.and(guard),
            ..self
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn switch_points(&self) -> &[SwitchPoint] {
        &self.switch_points
    }

    pub fn relink_on(&self) -> Option<InvocationErrorKind> {
        self.relink_on
    }

    /// True once any attached switch point has been invalidated
    #[inline]
    pub fn has_been_invalidated(&self) -> bool {
        self.switch_points.iter().any(|sp| !sp.is_valid())
    }

    /// Full validity check: switch points first, then the guard
    #[inline]
    pub fn check(&self, args: &[Value]) -> Result<bool, GuardError> {
        if self.has_been_invalidated() {
            return Ok(false);
        }
        self.guard.evaluate(args)
    }

    pub fn should_relink(&self, error: &InvocationError) -> bool {
        self.relink_on == Some(error.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeKey;

    #[test]
    fn test_invoke_rejects_wrong_argument_count() {
        let first = Target::exact(2, |args| Ok(args[1].clone()));
        assert_eq!(
            first.invoke(&[]),
            Err(InvocationError::Runtime(
                "target takes 2 arguments, got 0".to_string()
            ))
        );
        assert_eq!(first.invoke(&[Value::Int(1), Value::Int(2)]), Ok(Value::Int(2)));

        let rest = Target::variadic(1, |args| Ok(Value::Int(args.len() as i64)));
        assert!(rest.invoke(&[]).is_err());
        assert_eq!(rest.invoke(&[Value::Null, Value::Null]), Ok(Value::Int(2)));

        // Filtered targets keep the check
        let filtered = first.filter_return(Ok);
        assert!(filtered.invoke(&[Value::Null]).is_err());
    }

    #[test]
    fn test_check_respects_switch_points() {
        let sp = SwitchPoint::new();
        let inv = GuardedInvocation::unconditional(Target::constant(Arity::Exact(0), Value::Null))
            .with_switch_point(sp.clone());
        assert_eq!(inv.check(&[]), Ok(true));

        sp.invalidate();
        assert!(inv.has_been_invalidated());
        assert_eq!(inv.check(&[]), Ok(false));
    }

    #[test]
    fn test_filter_return() {
        let target = Target::exact(1, |args| Ok(args[0].clone()))
            .filter_return(|v| Ok(Value::Int(v.as_int().unwrap_or(0) * 2)));
        assert_eq!(target.invoke(&[Value::Int(21)]), Ok(Value::Int(42)));
    }

    #[test]
    fn test_should_relink() {
        let inv = GuardedInvocation::new(
            Target::exact(1, |_| Err(InvocationError::ReadOnly("x".into()))),
            Guard::receiver_type(TypeKey::Map),
        )
        .with_relink_on(InvocationErrorKind::ReadOnly);

        let err = inv.target().invoke(&[Value::Null]).unwrap_err();
        assert!(inv.should_relink(&err));
        assert!(!inv.should_relink(&InvocationError::runtime("other")));
    }

    #[test]
    fn test_arity() {
        assert!(Arity::Exact(2).accepts(2));
        assert!(!Arity::Exact(2).accepts(3));
        assert!(Arity::AtLeast(1).accepts(5));
        assert!(!Arity::AtLeast(1).accepts(0));
    }
}
