//! Services the dynamic linker offers to the linkers it drives.

use std::fmt;
use std::sync::Arc;

use super::{CompositeLinker, LinkRequest};
use crate::descriptor::MethodShape;
use crate::error::{InvocationError, InvocationResult, LinkResult};
use crate::invocation::GuardedInvocation;
use crate::value::{TypeKey, TypeSig, Value};

#[derive(Clone)]
pub struct LinkerServices {
    linker: Arc<CompositeLinker>,
}

impl LinkerServices {
    pub(crate) fn new(linker: Arc<CompositeLinker>) -> Self {
        Self { linker }
    }

    /// Link `request` through the full linker chain
    ///
    /// Lets a linker delegate, e.g. a proxy linker that unwraps its receiver
    /// and asks for an invocation on the wrapped value.
    pub fn get_guarded_invocation(
        &self,
        request: &LinkRequest<'_>,
    ) -> LinkResult<Option<GuardedInvocation>> {
        self.linker.link(request, self)
    }

    pub fn can_convert(&self, from: TypeKey, to: TypeSig) -> bool {
        can_convert(from, to)
    }

    pub fn convert(&self, value: Value, to: TypeSig) -> InvocationResult {
        convert(value, to)
    }

    /// Adapt an invocation's return value to the call site's return type
    pub fn as_type(&self, invocation: GuardedInvocation, shape: &MethodShape) -> GuardedInvocation {
        let ret = shape.ret();
        if ret == TypeSig::Any {
            return invocation;
        }
        invocation.map_target(|target| target.filter_return(move |value| convert(value, ret)))
    }
}

impl fmt::Debug for LinkerServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkerServices")
            .field("linkers", &self.linker.names())
            .finish()
    }
}

fn nullable(sig: TypeSig) -> bool {
    matches!(
        sig,
        TypeSig::Str | TypeSig::List | TypeSig::Map | TypeSig::Object | TypeSig::Function
    )
}

pub(crate) fn can_convert(from: TypeKey, to: TypeSig) -> bool {
    to.accepts(from)
        || (from == TypeKey::Int && to == TypeSig::Float)
        || (from == TypeKey::Null && nullable(to))
        || (matches!(from, TypeKey::Bool | TypeKey::Int | TypeKey::Float) && to == TypeSig::Str)
}

/// Widening conversions: Int to Float, primitives to Str, Null to any reference type
pub(crate) fn convert(value: Value, to: TypeSig) -> InvocationResult {
    let from = value.type_key();
    if to.accepts(from) {
        return Ok(value);
    }
    match (value, to) {
        (Value::Int(n), TypeSig::Float) => Ok(Value::Float(n as f64)),
        (Value::Null, sig) if nullable(sig) => Ok(Value::Null),
        (v @ (Value::Bool(_) | Value::Int(_) | Value::Float(_)), TypeSig::Str) => {
            Ok(Value::str(v.to_string()))
        }
        (v, sig) => Err(InvocationError::Conversion {
            from: v.type_name(),
            to: sig.to_string(),
        }),
    }
}
