//! Shared fixtures for integration tests
//!
//! - Color receivers: three unrelated types that all answer `color`
//! - `Record`: a foreign object model with its own contributed linker
//! - Helpers to bootstrap sites on a fresh linker

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dynlink::linker::ContributedLinker;
use dynlink::*;

/// `GET:PROPERTY|ELEMENT:color`
pub fn color_op() -> Operation {
    Operation::get()
        .with_namespaces(&[StandardNamespace::Property, StandardNamespace::Element])
        .named("color")
}

pub struct Palette {
    /// Instance with a public `color` field
    pub red: Value,
    /// Instance with a `getColor()` getter
    pub green: Value,
    /// Map with a `color` key
    pub blue: Value,
}

pub fn palette() -> Palette {
    let red = ClassBuilder::new("Red")
        .field("color", Value::str("red"))
        .build();
    let green = ClassBuilder::new("Green")
        .method("getColor", 0, |_, _| Ok(Value::str("green")))
        .build();
    Palette {
        red: Value::object(Instance::new(&red)),
        green: Value::object(Instance::new(&green)),
        blue: Value::map([("color", Value::str("blue"))]),
    }
}

/// One instance each of `count` distinct classes, `color` = "shade-i"
pub fn shades(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let class = ClassBuilder::new(&format!("Shade{}", i))
                .field("color", Value::str(format!("shade-{}", i)))
                .build();
            Value::object(Instance::new(&class))
        })
        .collect()
}

pub fn color_site(linker: &Arc<DynamicLinker>) -> CallSite {
    linker.bootstrap(
        CallerContext::new("test"),
        color_op(),
        MethodShape::generic(1),
    )
}

/// Object of a foreign object model
pub struct Record {
    fields: HashMap<&'static str, Value>,
}

impl Record {
    pub fn value(fields: &[(&'static str, Value)]) -> Value {
        Value::Foreign(Foreign::new(Record {
            fields: fields.iter().cloned().collect(),
        }))
    }
}

/// Links `GET:PROPERTY:<name>` on records
pub struct RecordLinker {
    pub links: AtomicUsize,
}

impl RecordLinker {
    pub fn new() -> Self {
        Self {
            links: AtomicUsize::new(0),
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.load(Ordering::SeqCst)
    }
}

impl GuardingDynamicLinker for RecordLinker {
    fn name(&self) -> &str {
        "record"
    }

    fn get_guarded_invocation(
        &self,
        request: &LinkRequest<'_>,
        _services: &LinkerServices,
    ) -> LinkResult<Option<GuardedInvocation>> {
        let op = request.descriptor().operation();
        let (Some(name), Some(key)) = (op.name(), request.receiver_type()) else {
            return Ok(None);
        };
        if op.action() != StandardOperation::Get || !self.can_link_type(key) {
            return Ok(None);
        }
        self.links.fetch_add(1, Ordering::SeqCst);

        let name = name.to_string();
        Ok(Some(GuardedInvocation::new(
            Target::exact(1, move |args| {
                let record = match &args[0] {
                    Value::Foreign(f) => f.downcast_ref::<Record>(),
                    _ => None,
                };
                record
                    .and_then(|r| r.fields.get(name.as_str()).cloned())
                    .ok_or_else(|| InvocationError::NoSuchMember {
                        type_name: "Record".to_string(),
                        member: name.clone(),
                    })
            }),
            Guard::receiver_type(key),
        )))
    }
}

impl TypeBasedGuardingDynamicLinker for RecordLinker {
    fn can_link_type(&self, key: TypeKey) -> bool {
        key == Foreign::key_of::<Record>()
    }
}

/// Exports a [`RecordLinker`] under an optional scope
pub struct RecordExporter {
    pub scope: Option<&'static str>,
    pub linker: Arc<RecordLinker>,
}

impl LinkerExporter for RecordExporter {
    fn name(&self) -> &str {
        "records"
    }

    fn scope(&self) -> Option<&str> {
        self.scope
    }

    fn linkers(&self) -> Vec<ContributedLinker> {
        vec![ContributedLinker::TypeBased(self.linker.clone())]
    }
}
