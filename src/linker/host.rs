//! Fallback linker for the host object model.
//!
//! Supported operations by receiver type:
//!
//! | receiver        | GET                          | SET               | REMOVE            | CALL / NEW                |
//! |-----------------|------------------------------|-------------------|-------------------|---------------------------|
//! | instance        | PROPERTY (field, getX/isX), METHOD (bound) | PROPERTY (field, setX) | -     | CALL named method         |
//! | class           | METHOD (bound static)        | -                 | -                 | CALL named static, NEW    |
//! | map             | PROPERTY, ELEMENT            | PROPERTY, ELEMENT | PROPERTY, ELEMENT | -                         |
//! | list            | ELEMENT, PROPERTY `length`   | ELEMENT           | ELEMENT           | -                         |
//! | string          | ELEMENT, PROPERTY `length`   | -                 | -                 | -                         |
//! | function/method | -                            | -                 | -                 | CALL unnamed              |
//!
//! Argument layouts: named GET/REMOVE take `[receiver]`, unnamed ones
//! `[receiver, name]`; named SET takes `[receiver, value]`, unnamed
//! `[receiver, name, value]`; CALL takes `[callee, args..]`; NEW takes
//! `[class, args..]`.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use super::{GuardingDynamicLinker, LinkRequest, LinkerServices, TypeBasedGuardingDynamicLinker};
use crate::error::{InvocationError, InvocationResult, LinkResult};
use crate::invocation::{Guard, GuardedInvocation, Target};
use crate::operation::{StandardNamespace, StandardOperation};
use crate::value::{BoundMethod, Class, Instance, Method, TypeKey, Value};

/// Default number of resolved members remembered by a [`HostLinker`]
pub const DEFAULT_MEMBER_CACHE_CAPACITY: usize = 256;

/// Member of a host class resolved for one (action, namespace, name)
#[derive(Clone)]
enum Member {
    Field(usize),
    Getter(Arc<Method>),
    Setter(Arc<Method>),
    Method(Arc<Method>),
}

type MemberKey = (TypeKey, StandardOperation, StandardNamespace, Arc<str>);

pub struct HostLinker {
    members: Mutex<LruCache<MemberKey, Option<Member>>>,
}

impl HostLinker {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_MEMBER_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            members: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of memoized member resolutions
    pub fn cached_members(&self) -> usize {
        self.members.lock().len()
    }

    fn resolve(
        &self,
        class: &Class,
        key: TypeKey,
        action: StandardOperation,
        namespace: StandardNamespace,
        name: &str,
    ) -> Option<Member> {
        let cache_key: MemberKey = (key, action, namespace, Arc::from(name));
        if let Some(hit) = self.members.lock().get(&cache_key) {
            return hit.clone();
        }
        let resolved = resolve_member(class, action, namespace, name);
        self.members.lock().put(cache_key, resolved.clone());
        resolved
    }

    fn link_get(
        &self,
        request: &LinkRequest<'_>,
        receiver: &Value,
        key: TypeKey,
    ) -> Option<GuardedInvocation> {
        let op = request.descriptor().operation();
        let namespaces: Arc<[StandardNamespace]> = supported(key, op.action(), op.namespaces())?;
        let arity = request.descriptor().arity();

        let Some(name) = op.name() else {
            if arity != 2 {
                return None;
            }
            return Some(GuardedInvocation::new(
                Target::exact(2, move |args| {
                    let name = args[1].to_key()?;
                    get_member(&args[0], &namespaces, &name)
                }),
                Guard::receiver_type(key),
            ));
        };
        if arity != 1 {
            return None;
        }

        match receiver {
            Value::Object(_) if request.is_call_site_unstable() => {
                let name: Arc<str> = Arc::from(name);
                Some(GuardedInvocation::new(
                    Target::exact(1, move |args| get_member(&args[0], &namespaces, &name)),
                    Guard::AnyInstance { position: 0 },
                ))
            }
            Value::Object(obj) => {
                for &ns in namespaces.iter() {
                    let target = match self.resolve(obj.class(), key, StandardOperation::Get, ns, name)
                    {
                        Some(Member::Field(slot)) => {
                            Target::exact(1, move |args| Ok(instance(&args[0])?.get_field(slot)))
                        }
                        Some(Member::Getter(getter)) => {
                            Target::exact(1, move |args| getter.invoke(&args[0], &[]))
                        }
                        Some(Member::Method(method)) => {
                            Target::exact(1, move |args| Ok(bind(&args[0], &method)))
                        }
                        _ => continue,
                    };
                    return Some(GuardedInvocation::new(target, Guard::receiver_type(key)));
                }
                None
            }
            Value::Class(class) => {
                let method = class.static_method(name)?.clone();
                Some(GuardedInvocation::new(
                    Target::exact(1, move |args| Ok(bind(&args[0], &method))),
                    Guard::receiver_type(key),
                ))
            }
            _ => {
                let name: Arc<str> = Arc::from(name);
                Some(GuardedInvocation::new(
                    Target::exact(1, move |args| get_member(&args[0], &namespaces, &name)),
                    Guard::receiver_type(key),
                ))
            }
        }
    }

    fn link_set(
        &self,
        request: &LinkRequest<'_>,
        receiver: &Value,
        key: TypeKey,
    ) -> Option<GuardedInvocation> {
        let op = request.descriptor().operation();
        let namespaces: Arc<[StandardNamespace]> = supported(key, op.action(), op.namespaces())?;
        let arity = request.descriptor().arity();

        let Some(name) = op.name() else {
            if arity != 3 {
                return None;
            }
            return Some(GuardedInvocation::new(
                Target::exact(3, move |args| {
                    let name = args[1].to_key()?;
                    set_member(&args[0], &namespaces, &name, args[2].clone())
                }),
                Guard::receiver_type(key),
            ));
        };
        if arity != 2 {
            return None;
        }

        if let Value::Object(obj) = receiver {
            if !request.is_call_site_unstable() {
                for &ns in namespaces.iter() {
                    let target = match self.resolve(obj.class(), key, StandardOperation::Set, ns, name)
                    {
                        Some(Member::Field(slot)) => Target::exact(2, move |args| {
                            instance(&args[0])?.set_field(slot, args[1].clone());
                            Ok(Value::Null)
                        }),
                        Some(Member::Setter(setter)) => Target::exact(2, move |args| {
                            setter.invoke(&args[0], &args[1..2])?;
                            Ok(Value::Null)
                        }),
                        _ => continue,
                    };
                    return Some(GuardedInvocation::new(target, Guard::receiver_type(key)));
                }
                return None;
            }
        }

        let guard = match receiver {
            Value::Object(_) => Guard::AnyInstance { position: 0 },
            _ => Guard::receiver_type(key),
        };
        let name: Arc<str> = Arc::from(name);
        Some(GuardedInvocation::new(
            Target::exact(2, move |args| {
                set_member(&args[0], &namespaces, &name, args[1].clone())
            }),
            guard,
        ))
    }

    fn link_remove(&self, request: &LinkRequest<'_>, key: TypeKey) -> Option<GuardedInvocation> {
        let op = request.descriptor().operation();
        let namespaces: Arc<[StandardNamespace]> = supported(key, op.action(), op.namespaces())?;
        let arity = request.descriptor().arity();

        let target = match op.name() {
            None if arity == 2 => Target::exact(2, move |args| {
                let name = args[1].to_key()?;
                remove_member(&args[0], &namespaces, &name)
            }),
            Some(name) if arity == 1 => {
                let name: Arc<str> = Arc::from(name);
                Target::exact(1, move |args| remove_member(&args[0], &namespaces, &name))
            }
            _ => return None,
        };
        Some(GuardedInvocation::new(target, Guard::receiver_type(key)))
    }

    fn link_call(
        &self,
        request: &LinkRequest<'_>,
        receiver: &Value,
        key: TypeKey,
    ) -> Option<GuardedInvocation> {
        let op = request.descriptor().operation();
        let arity = request.descriptor().arity();

        let Some(name) = op.name() else {
            return match receiver {
                Value::Function(_) | Value::Method(_) => Some(GuardedInvocation::new(
                    Target::variadic(1, |args| match &args[0] {
                        Value::Function(f) => f.call(&args[1..]),
                        Value::Method(m) => m.call(&args[1..]),
                        other => Err(InvocationError::NotCallable(other.type_name())),
                    }),
                    Guard::receiver_type(key),
                )),
                _ => None,
            };
        };
        if !op.namespaces().is_empty() && !op.contains_namespace(StandardNamespace::Method) {
            return None;
        }

        let method = match receiver {
            Value::Object(obj) => {
                match self.resolve(obj.class(), key, StandardOperation::Call, StandardNamespace::Method, name)? {
                    Member::Method(method) => method,
                    _ => return None,
                }
            }
            Value::Class(class) => class.static_method(name)?.clone(),
            _ => return None,
        };
        if method.arity() + 1 != arity {
            return None;
        }
        Some(GuardedInvocation::new(
            Target::exact(arity, move |args| method.invoke(&args[0], &args[1..])),
            Guard::receiver_type(key),
        ))
    }

    fn link_new(&self, request: &LinkRequest<'_>, receiver: &Value, key: TypeKey) -> Option<GuardedInvocation> {
        let Value::Class(class) = receiver else {
            return None;
        };
        let arity = request.descriptor().arity();
        let expected = class.constructor().map_or(0, |ctor| ctor.arity());
        if expected + 1 != arity {
            return None;
        }
        let class = class.clone();
        Some(GuardedInvocation::new(
            Target::exact(arity, move |args| {
                let obj = Value::object(Instance::new(&class));
                if let Some(ctor) = class.constructor() {
                    ctor.invoke(&obj, &args[1..])?;
                }
                Ok(obj)
            }),
            Guard::receiver_type(key),
        ))
    }
}

impl Default for HostLinker {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardingDynamicLinker for HostLinker {
    fn name(&self) -> &str {
        "host"
    }

    fn get_guarded_invocation(
        &self,
        request: &LinkRequest<'_>,
        _services: &LinkerServices,
    ) -> LinkResult<Option<GuardedInvocation>> {
        let Some(receiver) = request.receiver() else {
            return Ok(None);
        };
        let key = receiver.type_key();
        if !key.is_host() {
            return Ok(None);
        }

        let invocation = match request.descriptor().operation().action() {
            StandardOperation::Get => self.link_get(request, receiver, key),
            StandardOperation::Set => self.link_set(request, receiver, key),
            StandardOperation::Remove => self.link_remove(request, key),
            StandardOperation::Call => self.link_call(request, receiver, key),
            StandardOperation::New => self.link_new(request, receiver, key),
        };
        if invocation.is_some() {
            trace!(
                target: "dynlink::linker",
                linker = "host",
                receiver = %key,
                operation = %request.descriptor().operation(),
                unstable = request.is_call_site_unstable(),
                "Linked host operation"
            );
        }
        Ok(invocation)
    }
}

impl TypeBasedGuardingDynamicLinker for HostLinker {
    fn can_link_type(&self, key: TypeKey) -> bool {
        key.is_host()
    }
}

impl fmt::Debug for HostLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLinker")
            .field("cached_members", &self.cached_members())
            .finish()
    }
}

/// Namespaces of `requested` that make sense for `key` and `action`, or
/// `None` if there are none
fn supported(
    key: TypeKey,
    action: StandardOperation,
    requested: &[StandardNamespace],
) -> Option<Arc<[StandardNamespace]>> {
    use StandardNamespace as Ns;
    use StandardOperation as Op;

    let usable: Arc<[StandardNamespace]> = requested
        .iter()
        .copied()
        .filter(|&ns| match key {
            TypeKey::Instance(_) => matches!(
                (action, ns),
                (Op::Get, Ns::Property) | (Op::Get, Ns::Method) | (Op::Set, Ns::Property)
            ),
            TypeKey::Class(_) => matches!((action, ns), (Op::Get, Ns::Method)),
            TypeKey::Map => matches!(
                (action, ns),
                (Op::Get | Op::Set | Op::Remove, Ns::Property | Ns::Element)
            ),
            TypeKey::List => matches!(
                (action, ns),
                (Op::Get | Op::Set | Op::Remove, Ns::Element) | (Op::Get, Ns::Property)
            ),
            TypeKey::Str => matches!((action, ns), (Op::Get, Ns::Property | Ns::Element)),
            _ => false,
        })
        .collect();
    (!usable.is_empty()).then_some(usable)
}

fn resolve_member(
    class: &Class,
    action: StandardOperation,
    namespace: StandardNamespace,
    name: &str,
) -> Option<Member> {
    match (action, namespace) {
        (StandardOperation::Get, StandardNamespace::Property) => class
            .public_field(name)
            .map(Member::Field)
            .or_else(|| class.getter(name).cloned().map(Member::Getter)),
        (StandardOperation::Set, StandardNamespace::Property) => class
            .public_field(name)
            .map(Member::Field)
            .or_else(|| class.setter(name).cloned().map(Member::Setter)),
        (StandardOperation::Get | StandardOperation::Call, StandardNamespace::Method) => {
            class.method(name).cloned().map(Member::Method)
        }
        _ => None,
    }
}

fn instance(value: &Value) -> Result<&Arc<Instance>, InvocationError> {
    value.as_object().ok_or_else(|| InvocationError::TypeMismatch {
        expected: "object",
        got: value.type_name(),
    })
}

fn bind(receiver: &Value, method: &Arc<Method>) -> Value {
    Value::Method(Arc::new(BoundMethod::new(receiver.clone(), method.clone())))
}

fn no_such_member(receiver: &Value, name: &str) -> InvocationError {
    InvocationError::NoSuchMember {
        type_name: receiver.type_name(),
        member: name.to_string(),
    }
}

fn index(name: &str, len: usize) -> Result<usize, InvocationError> {
    let index: i64 = name.parse().map_err(|_| InvocationError::TypeMismatch {
        expected: "index",
        got: format!("\"{}\"", name),
    })?;
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(InvocationError::IndexOutOfBounds { index, len })
}

/// Read a member, trying `namespaces` in order
pub(crate) fn get_member(
    receiver: &Value,
    namespaces: &[StandardNamespace],
    name: &str,
) -> InvocationResult {
    for &ns in namespaces {
        match (receiver, ns) {
            (Value::Object(obj), StandardNamespace::Property) => {
                let class = obj.class();
                if let Some(slot) = class.public_field(name) {
                    return Ok(obj.get_field(slot));
                }
                if let Some(getter) = class.getter(name) {
                    return getter.invoke(receiver, &[]);
                }
            }
            (Value::Object(obj), StandardNamespace::Method) => {
                if let Some(method) = obj.class().method(name) {
                    return Ok(bind(receiver, method));
                }
            }
            (Value::Class(class), StandardNamespace::Method) => {
                if let Some(method) = class.static_method(name) {
                    return Ok(bind(receiver, method));
                }
            }
            (Value::Map(map), StandardNamespace::Property | StandardNamespace::Element) => {
                return Ok(map.read().get(name).cloned().unwrap_or(Value::Null));
            }
            (Value::List(list), StandardNamespace::Element) => {
                let list = list.read();
                return Ok(list[index(name, list.len())?].clone());
            }
            (Value::List(list), StandardNamespace::Property) if name == "length" => {
                return Ok(Value::Int(list.read().len() as i64));
            }
            (Value::Str(s), StandardNamespace::Element) => {
                let len = s.chars().count();
                let i = index(name, len)?;
                return Ok(s
                    .chars()
                    .nth(i)
                    .map(|c| Value::str(c.to_string()))
                    .unwrap_or(Value::Null));
            }
            (Value::Str(s), StandardNamespace::Property) if name == "length" => {
                return Ok(Value::Int(s.chars().count() as i64));
            }
            _ => {}
        }
    }
    Err(no_such_member(receiver, name))
}

/// Write a member, trying `namespaces` in order
pub(crate) fn set_member(
    receiver: &Value,
    namespaces: &[StandardNamespace],
    name: &str,
    value: Value,
) -> InvocationResult {
    for &ns in namespaces {
        match (receiver, ns) {
            (Value::Object(obj), StandardNamespace::Property) => {
                let class = obj.class();
                match class.field_slot(name) {
                    Some((slot, def)) if def.public => {
                        obj.set_field(slot, value);
                        return Ok(Value::Null);
                    }
                    _ => {}
                }
                if let Some(setter) = class.setter(name) {
                    setter.invoke(receiver, std::slice::from_ref(&value))?;
                    return Ok(Value::Null);
                }
                if class.field_slot(name).is_some() {
                    return Err(InvocationError::ReadOnly(name.to_string()));
                }
            }
            (Value::Map(map), StandardNamespace::Property | StandardNamespace::Element) => {
                map.write().insert(Arc::from(name), value);
                return Ok(Value::Null);
            }
            (Value::List(list), StandardNamespace::Element) => {
                let mut list = list.write();
                let i = index(name, list.len())?;
                list[i] = value;
                return Ok(Value::Null);
            }
            _ => {}
        }
    }
    Err(no_such_member(receiver, name))
}

/// Remove a member, returning the removed value (`Null` if absent from a map)
pub(crate) fn remove_member(
    receiver: &Value,
    namespaces: &[StandardNamespace],
    name: &str,
) -> InvocationResult {
    for &ns in namespaces {
        match (receiver, ns) {
            (Value::Map(map), StandardNamespace::Property | StandardNamespace::Element) => {
                return Ok(map.write().remove(name).unwrap_or(Value::Null));
            }
            (Value::List(list), StandardNamespace::Element) => {
                let mut list = list.write();
                let i = index(name, list.len())?;
                return Ok(list.remove(i));
            }
            _ => {}
        }
    }
    Err(no_such_member(receiver, name))
}
