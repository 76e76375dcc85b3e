//! Runtime values seen by call sites.
//!
//! [`Value`] is the host object model: primitives, shared lists and maps,
//! instances of host [`Class`]es, callables, and opaque [`Foreign`] objects
//! that belong to some other object model and are linked by contributed
//! linkers.
//!
//! Guards never inspect values deeply. They compare a [`TypeKey`], which is
//! `Copy` and cheap to hash.

mod host;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

pub use host::{
    BoundMethod, Class, ClassBuilder, ClassId, FieldDef, Function, Instance, Method, MethodBody,
};

use crate::error::{InvocationError, InvocationResult};

/// Shared, mutable list storage
pub type ListRef = Arc<RwLock<Vec<Value>>>;

/// Shared, mutable string-keyed map storage
pub type MapRef = Arc<RwLock<HashMap<Arc<str>, Value>>>;

/// A value flowing through a call site
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(ListRef),
    Map(MapRef),
    Object(Arc<Instance>),
    Class(Arc<Class>),
    Function(Arc<Function>),
    Method(Arc<BoundMethod>),
    Foreign(Foreign),
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    pub fn map<K: Into<Arc<str>>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(Arc::new(RwLock::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn object(instance: Arc<Instance>) -> Self {
        Value::Object(instance)
    }

    pub fn function<F>(name: &str, arity: Option<usize>, body: F) -> Self
    where
        F: Fn(&[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        Value::Function(Arc::new(Function::new(name, arity, body)))
    }

    /// Identity of this value's runtime type, used by guards
    #[inline]
    pub fn type_key(&self) -> TypeKey {
        match self {
            Value::Null => TypeKey::Null,
            Value::Bool(_) => TypeKey::Bool,
            Value::Int(_) => TypeKey::Int,
            Value::Float(_) => TypeKey::Float,
            Value::Str(_) => TypeKey::Str,
            Value::List(_) => TypeKey::List,
            Value::Map(_) => TypeKey::Map,
            Value::Object(obj) => TypeKey::Instance(obj.class().id()),
            Value::Class(class) => TypeKey::Class(class.id()),
            Value::Function(_) => TypeKey::Function,
            Value::Method(_) => TypeKey::Method,
            Value::Foreign(foreign) => TypeKey::Foreign(foreign.type_id, foreign.type_name),
        }
    }

    /// Human-readable type name for error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Object(obj) => obj.class().name().to_string(),
            Value::Class(class) => format!("class {}", class.name()),
            Value::Foreign(foreign) => foreign.type_name.to_string(),
            other => other.type_key().to_string(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Instance>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Reference identity for heap values, value equality for primitives
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Arc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            (a, b) => a == b,
        }
    }

    /// Extract a member name or map key from an argument
    pub(crate) fn to_key(&self) -> Result<Arc<str>, InvocationError> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Int(n) => Ok(Arc::from(n.to_string())),
            other => Err(InvocationError::TypeMismatch {
                expected: "member name",
                got: other.type_name(),
            }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (a, b) if a.type_key() == b.type_key() => a.same_as(b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => f.debug_list().entries(items.read().iter()).finish(),
            Value::Map(map) => f.debug_map().entries(map.read().iter()).finish(),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                let map = map.read();
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, map[key])?;
                }
                f.write_str("}")
            }
            Value::Object(obj) => write!(f, "<{} instance>", obj.class().name()),
            Value::Class(class) => write!(f, "<class {}>", class.name()),
            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::Method(bound) => write!(f, "<method {}>", bound.method().name()),
            Value::Foreign(foreign) => write!(f, "<{}>", foreign.type_name),
        }
    }
}

/// An object from a non-host object model
///
/// The host linker never links foreign values; contributed linkers recognize
/// them by `TypeKey::Foreign` and downcast.
#[derive(Clone)]
pub struct Foreign {
    type_id: TypeId,
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Foreign {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Type key a foreign value of type `T` would have
    pub fn key_of<T: Any>() -> TypeKey {
        TypeKey::Foreign(TypeId::of::<T>(), std::any::type_name::<T>())
    }
}

impl From<Foreign> for Value {
    fn from(foreign: Foreign) -> Self {
        Value::Foreign(foreign)
    }
}

/// Runtime type identity compared by guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Instance(ClassId),
    Class(ClassId),
    Function,
    Method,
    Foreign(TypeId, &'static str),
}

impl TypeKey {
    /// True for values of the host object model
    pub fn is_host(self) -> bool {
        !matches!(self, TypeKey::Foreign(..))
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKey::Null => f.write_str("Null"),
            TypeKey::Bool => f.write_str("Bool"),
            TypeKey::Int => f.write_str("Int"),
            TypeKey::Float => f.write_str("Float"),
            TypeKey::Str => f.write_str("Str"),
            TypeKey::List => f.write_str("List"),
            TypeKey::Map => f.write_str("Map"),
            TypeKey::Instance(id) => write!(f, "Instance({})", id),
            TypeKey::Class(id) => write!(f, "Class({})", id),
            TypeKey::Function => f.write_str("Function"),
            TypeKey::Method => f.write_str("Method"),
            TypeKey::Foreign(_, name) => write!(f, "Foreign({})", name),
        }
    }
}

/// Static type in a method shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeSig {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    /// Any reference value (instances, classes, callables, foreign objects)
    Object,
    Function,
}

impl TypeSig {
    /// True if a value of `key` already has this static type
    pub fn accepts(self, key: TypeKey) -> bool {
        match self {
            TypeSig::Any => true,
            TypeSig::Bool => key == TypeKey::Bool,
            TypeSig::Int => key == TypeKey::Int,
            TypeSig::Float => key == TypeKey::Float,
            TypeSig::Str => key == TypeKey::Str,
            TypeSig::List => key == TypeKey::List,
            TypeSig::Map => key == TypeKey::Map,
            TypeSig::Object => matches!(
                key,
                TypeKey::Instance(_)
                    | TypeKey::Class(_)
                    | TypeKey::Function
                    | TypeKey::Method
                    | TypeKey::Foreign(..)
            ),
            TypeSig::Function => matches!(key, TypeKey::Function | TypeKey::Method),
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
