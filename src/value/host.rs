//! Host classes, instances and callables.
//!
//! Classes follow bean conventions: a property `color` is either a public
//! field named `color`, or a `getColor()`/`isColor()` getter with a matching
//! `setColor(v)` setter.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::Value;
use crate::error::{InvocationError, InvocationResult};

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a host class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    fn next() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Native body of a method: `(this, args) -> result`
///
/// `this` is the instance for instance methods and constructors, and the
/// class value for static methods.
pub type MethodBody = Arc<dyn Fn(&Value, &[Value]) -> InvocationResult + Send + Sync>;

/// Declared field of a class
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: Arc<str>,
    pub default: Value,
    pub public: bool,
}

/// Method of a host class
pub struct Method {
    name: Arc<str>,
    arity: usize,
    body: MethodBody,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn invoke(&self, this: &Value, args: &[Value]) -> InvocationResult {
        if args.len() != self.arity {
            return Err(InvocationError::runtime(format!(
                "{} expects {} arguments, got {}",
                self.name,
                self.arity,
                args.len()
            )));
        }
        (self.body)(this, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A host class
pub struct Class {
    id: ClassId,
    name: Arc<str>,
    fields: Vec<FieldDef>,
    field_index: HashMap<Arc<str>, usize>,
    methods: HashMap<Arc<str>, Arc<Method>>,
    static_methods: HashMap<Arc<str>, Arc<Method>>,
    constructor: Option<Arc<Method>>,
}

impl Class {
    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Slot of a field, public or not
    pub fn field_slot(&self, name: &str) -> Option<(usize, &FieldDef)> {
        self.field_index
            .get(name)
            .map(|&slot| (slot, &self.fields[slot]))
    }

    /// Slot of a public field
    pub fn public_field(&self, name: &str) -> Option<usize> {
        self.field_slot(name)
            .filter(|(_, def)| def.public)
            .map(|(slot, _)| slot)
    }

    pub fn method(&self, name: &str) -> Option<&Arc<Method>> {
        self.methods.get(name)
    }

    pub fn static_method(&self, name: &str) -> Option<&Arc<Method>> {
        self.static_methods.get(name)
    }

    pub fn constructor(&self) -> Option<&Arc<Method>> {
        self.constructor.as_ref()
    }

    /// Bean getter for a property: `getName()` or `isName()`
    pub fn getter(&self, property: &str) -> Option<&Arc<Method>> {
        let suffix = capitalize(property);
        [format!("get{}", suffix), format!("is{}", suffix)]
            .iter()
            .filter_map(|name| self.methods.get(name.as_str()))
            .find(|m| m.arity == 0)
    }

    /// Bean setter for a property: `setName(value)`
    pub fn setter(&self, property: &str) -> Option<&Arc<Method>> {
        self.methods
            .get(format!("set{}", capitalize(property)).as_str())
            .filter(|m| m.arity == 1)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Builder for [`Class`]
pub struct ClassBuilder {
    name: Arc<str>,
    fields: Vec<FieldDef>,
    methods: HashMap<Arc<str>, Arc<Method>>,
    static_methods: HashMap<Arc<str>, Arc<Method>>,
    constructor: Option<Arc<Method>>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            fields: Vec::new(),
            methods: HashMap::new(),
            static_methods: HashMap::new(),
            constructor: None,
        }
    }

    /// Public field with a default value
    pub fn field(self, name: &str, default: Value) -> Self {
        self.add_field(name, default, true)
    }

    /// Field only reachable through methods
    pub fn private_field(self, name: &str, default: Value) -> Self {
        self.add_field(name, default, false)
    }

    fn add_field(mut self, name: &str, default: Value, public: bool) -> Self {
        self.fields.retain(|f| &*f.name != name);
        self.fields.push(FieldDef {
            name: Arc::from(name),
            default,
            public,
        });
        self
    }

    pub fn method<F>(mut self, name: &str, arity: usize, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        self.methods
            .insert(Arc::from(name), Arc::new(make_method(name, arity, body)));
        self
    }

    pub fn static_method<F>(mut self, name: &str, arity: usize, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        self.static_methods
            .insert(Arc::from(name), Arc::new(make_method(name, arity, body)));
        self
    }

    /// Constructor body; its return value is ignored and the new instance is returned
    pub fn constructor<F>(mut self, arity: usize, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(make_method("<init>", arity, body)));
        self
    }

    pub fn build(self) -> Arc<Class> {
        let field_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(slot, def)| (def.name.clone(), slot))
            .collect();
        Arc::new(Class {
            id: ClassId::next(),
            name: self.name,
            fields: self.fields,
            field_index,
            methods: self.methods,
            static_methods: self.static_methods,
            constructor: self.constructor,
        })
    }
}

fn make_method<F>(name: &str, arity: usize, body: F) -> Method
where
    F: Fn(&Value, &[Value]) -> InvocationResult + Send + Sync + 'static,
{
    Method {
        name: Arc::from(name),
        arity,
        body: Arc::new(body),
    }
}

/// An instance of a host class
pub struct Instance {
    class: Arc<Class>,
    fields: RwLock<Vec<Value>>,
}

impl Instance {
    /// New instance with every field at its default; the constructor is not run
    pub fn new(class: &Arc<Class>) -> Arc<Self> {
        Arc::new(Self {
            class: class.clone(),
            fields: RwLock::new(class.fields.iter().map(|f| f.default.clone()).collect()),
        })
    }

    #[inline]
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn get_field(&self, slot: usize) -> Value {
        self.fields.read().get(slot).cloned().unwrap_or(Value::Null)
    }

    pub fn set_field(&self, slot: usize, value: Value) {
        if let Some(field) = self.fields.write().get_mut(slot) {
            *field = value;
        }
    }

    /// Read a field by name, public or not
    pub fn field(&self, name: &str) -> Option<Value> {
        self.class
            .field_slot(name)
            .map(|(slot, _)| self.get_field(slot))
    }

    /// Write a field by name, public or not; returns false if there is no such field
    pub fn set_named(&self, name: &str, value: Value) -> bool {
        match self.class.field_slot(name) {
            Some((slot, _)) => {
                self.set_field(slot, value);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &*self.fields.read())
            .finish()
    }
}

/// A free-standing callable
pub struct Function {
    name: Arc<str>,
    arity: Option<usize>,
    body: Arc<dyn Fn(&[Value]) -> InvocationResult + Send + Sync>,
}

impl Function {
    pub fn new<F>(name: &str, arity: Option<usize>, body: F) -> Self
    where
        F: Fn(&[Value]) -> InvocationResult + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            arity,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> InvocationResult {
        if let Some(arity) = self.arity {
            if args.len() != arity {
                return Err(InvocationError::runtime(format!(
                    "{} expects {} arguments, got {}",
                    self.name,
                    arity,
                    args.len()
                )));
            }
        }
        (self.body)(args)
    }
}

/// A method together with the receiver it was read from
pub struct BoundMethod {
    receiver: Value,
    method: Arc<Method>,
}

impl BoundMethod {
    pub fn new(receiver: Value, method: Arc<Method>) -> Self {
        Self { receiver, method }
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    pub fn call(&self, args: &[Value]) -> InvocationResult {
        self.method.invoke(&self.receiver, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bean() -> Arc<Class> {
        ClassBuilder::new("Bean")
            .private_field("color", Value::str("blue"))
            .field("size", Value::Int(3))
            .method("getColor", 0, |this, _| {
                let obj = this.as_object().ok_or(InvocationError::NotCallable(
                    "getColor".to_string(),
                ))?;
                Ok(obj.field("color").unwrap_or(Value::Null))
            })
            .method("isShiny", 0, |_, _| Ok(Value::Bool(true)))
            .method("setColor", 1, |this, args| {
                if let Some(obj) = this.as_object() {
                    obj.set_named("color", args[0].clone());
                }
                Ok(Value::Null)
            })
            .build()
    }

    #[test]
    fn test_bean_accessors() {
        let class = bean();
        assert!(class.getter("color").is_some());
        assert!(class.getter("shiny").is_some());
        assert!(class.setter("color").is_some());
        assert!(class.setter("shiny").is_none());
        assert_eq!(class.public_field("size"), Some(1));
        assert_eq!(class.public_field("color"), None);
    }

    #[test]
    fn test_method_invoke_and_arity() {
        let class = bean();
        let obj = Value::object(Instance::new(&class));

        let setter = class.setter("color").unwrap();
        setter.invoke(&obj, &[Value::str("green")]).unwrap();
        let getter = class.getter("color").unwrap();
        assert_eq!(getter.invoke(&obj, &[]).unwrap(), Value::str("green"));

        assert!(getter.invoke(&obj, &[Value::Int(1)]).is_err());
    }

    #[test]
    fn test_class_ids_are_unique() {
        let a = ClassBuilder::new("Same").build();
        let b = ClassBuilder::new("Same").build();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_redeclared_field_replaces_previous() {
        let class = ClassBuilder::new("Dup")
            .field("x", Value::Int(1))
            .field("x", Value::Int(2))
            .build();
        assert_eq!(class.fields().len(), 1);
        let obj = Instance::new(&class);
        assert_eq!(obj.field("x"), Some(Value::Int(2)));
    }
}
