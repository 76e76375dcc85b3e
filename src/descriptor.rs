//! Call-site descriptors.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::operation::Operation;
use crate::value::TypeSig;

static NEXT_CALLER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of the code that owns a call site
///
/// Two contexts are equal only if they came from the same `new` call (or
/// clones of it); the name is informational.
#[derive(Clone)]
pub struct CallerContext {
    id: u64,
    name: Arc<str>,
}

impl CallerContext {
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_CALLER_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for CallerContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CallerContext {}

impl Hash for CallerContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for CallerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Parameter and return types of a call site
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodShape {
    params: SmallVec<[TypeSig; 4]>,
    ret: TypeSig,
}

impl MethodShape {
    pub fn new(params: &[TypeSig], ret: TypeSig) -> Self {
        Self {
            params: SmallVec::from_slice(params),
            ret,
        }
    }

    /// `arity` untyped parameters returning `Any`
    pub fn generic(arity: usize) -> Self {
        Self {
            params: SmallVec::from_elem(TypeSig::Any, arity),
            ret: TypeSig::Any,
        }
    }

    pub fn params(&self) -> &[TypeSig] {
        &self.params
    }

    pub fn ret(&self) -> TypeSig {
        self.ret
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn with_return(&self, ret: TypeSig) -> Self {
        Self {
            params: self.params.clone(),
            ret,
        }
    }
}

impl fmt::Display for MethodShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// Static description of a call site: what it does, who owns it, and its shape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSiteDescriptor {
    caller: CallerContext,
    operation: Operation,
    shape: MethodShape,
}

impl CallSiteDescriptor {
    pub fn new(caller: CallerContext, operation: Operation, shape: MethodShape) -> Self {
        Self {
            caller,
            operation,
            shape,
        }
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn shape(&self) -> &MethodShape {
        &self.shape
    }

    pub fn arity(&self) -> usize {
        self.shape.arity()
    }

    pub fn change_operation(&self, operation: Operation) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    pub fn change_shape(&self, shape: MethodShape) -> Self {
        Self {
            shape,
            ..self.clone()
        }
    }
}

impl fmt::Display for CallSiteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} @ {}", self.operation, self.shape, self.caller.name)
    }
}
