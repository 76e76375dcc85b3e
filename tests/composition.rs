//! Linker composition: prioritized, discovered and fallback linkers.

mod common;

use std::sync::Arc;

use common::*;
use dynlink::linker::FnLinker;
use dynlink::*;

#[test]
fn test_contributed_linker_handles_foreign_values() {
    let records = Arc::new(RecordLinker::new());
    let registry = LinkerRegistry::new().with(Arc::new(RecordExporter {
        scope: None,
        linker: records.clone(),
    }));
    let linker = DynamicLinkerFactory::new()
        .registry(registry)
        .build()
        .unwrap();
    let site = color_site(&linker);
    let p = palette();

    let record = Record::value(&[("color", Value::str("violet"))]);
    assert_eq!(site.invoke(&[record.clone()]), Ok(Value::str("violet")));
    assert_eq!(site.invoke(&[p.red.clone()]), Ok(Value::str("red")));
    assert_eq!(site.invoke(&[record]), Ok(Value::str("violet")));

    assert_eq!(records.link_count(), 1);
    assert_eq!(site.stats().chain_length, 2);
}

#[test]
fn test_out_of_scope_exporter_is_not_discovered() {
    let records = Arc::new(RecordLinker::new());
    let registry = LinkerRegistry::new().with(Arc::new(RecordExporter {
        scope: Some("records-runtime"),
        linker: records.clone(),
    }));

    let scoped_out = DynamicLinkerFactory::new()
        .registry(registry.clone())
        .discovery_scope("other-runtime")
        .build()
        .unwrap();
    assert_eq!(scoped_out.linker_names(), vec!["host"]);
    let record = Record::value(&[("color", Value::str("violet"))]);
    assert!(matches!(
        color_site(&scoped_out).invoke(&[record.clone()]),
        Err(LinkError::LinkageFailure { .. })
    ));

    let scoped_in = DynamicLinkerFactory::new()
        .registry(registry)
        .discovery_scope("records-runtime")
        .build()
        .unwrap();
    assert_eq!(
        color_site(&scoped_in).invoke(&[record]),
        Ok(Value::str("violet"))
    );
}

#[test]
fn test_prioritized_linker_shadows_fallback() {
    // Upper-cases string results read from maps, leaves everything else alone
    let host = HostLinker::new();
    let shouting = FnLinker::new("shouting", move |request, services| {
        if !matches!(request.receiver(), Some(Value::Map(_))) {
            return Ok(None);
        }
        let inner = host.get_guarded_invocation(request, services)?;
        Ok(inner.map(|invocation| {
            invocation.map_target(|target| {
                target.filter_return(|value| {
                    Ok(match value.as_str() {
                        Some(s) => Value::str(s.to_uppercase()),
                        None => value,
                    })
                })
            })
        }))
    });
    let linker = DynamicLinkerFactory::new()
        .prioritized_linker(Arc::new(shouting))
        .build()
        .unwrap();
    assert_eq!(linker.linker_names(), vec!["shouting", "host"]);

    let site = color_site(&linker);
    let p = palette();
    assert_eq!(site.invoke(&[p.blue.clone()]), Ok(Value::str("BLUE")));
    assert_eq!(site.invoke(&[p.red.clone()]), Ok(Value::str("red")));
}

/// Wraps another value; linked by delegating to whatever links the inner value
struct Proxy(Value);

fn unwrap_proxy(value: &Value) -> Option<Value> {
    match value {
        Value::Foreign(f) => f.downcast_ref::<Proxy>().map(|proxy| proxy.0.clone()),
        _ => None,
    }
}

#[test]
fn test_services_delegate_through_full_chain() {
    let proxy_linker = FnLinker::new("proxy", |request, services| {
        let Some(inner_value) = request.receiver().and_then(unwrap_proxy) else {
            return Ok(None);
        };
        let unwrapped = [inner_value];
        let Some(inner) = services.get_guarded_invocation(
            &request.with_arguments(request.descriptor(), &unwrapped),
        )?
        else {
            return Ok(None);
        };

        let for_guard = inner.clone();
        let guard = Guard::receiver_type(Foreign::key_of::<Proxy>()).and(Guard::custom(
            move |args| match unwrap_proxy(&args[0]) {
                Some(value) => for_guard.check(&[value]),
                None => Ok(false),
            },
        ));
        let target = Target::exact(1, move |args| match unwrap_proxy(&args[0]) {
            Some(value) => inner.target().invoke(&[value]),
            None => Err(InvocationError::TypeMismatch {
                expected: "proxy",
                got: args[0].type_name(),
            }),
        });
        Ok(Some(GuardedInvocation::new(target, guard)))
    });
    let linker = DynamicLinkerFactory::new()
        .prioritized_linker(Arc::new(proxy_linker))
        .build()
        .unwrap();
    let site = color_site(&linker);
    let p = palette();

    let proxied_red = Value::Foreign(Foreign::new(Proxy(p.red.clone())));
    let proxied_blue = Value::Foreign(Foreign::new(Proxy(p.blue.clone())));
    assert_eq!(site.invoke(&[proxied_red.clone()]), Ok(Value::str("red")));
    assert_eq!(site.invoke(&[proxied_blue]), Ok(Value::str("blue")));
    assert_eq!(site.invoke(&[proxied_red]), Ok(Value::str("red")));
    assert_eq!(site.stats().relinks, 2);
}

#[test]
fn test_duplicate_contributed_names_are_misconfiguration() {
    let registry = LinkerRegistry::new()
        .with(Arc::new(RecordExporter {
            scope: None,
            linker: Arc::new(RecordLinker::new()),
        }))
        .with(Arc::new(RecordExporter {
            scope: None,
            linker: Arc::new(RecordLinker::new()),
        }));
    let err = DynamicLinkerFactory::new()
        .registry(registry)
        .build()
        .unwrap_err();
    assert!(matches!(err, LinkError::Misconfiguration { ref linker, .. } if linker == "record"));
}

#[test]
fn test_type_based_linkers_are_grouped_with_contributed_ones() {
    let records = Arc::new(RecordLinker::new());
    let linker = DynamicLinkerFactory::new()
        .type_based_linker(records.clone())
        .registry(LinkerRegistry::new().with(Arc::new(RecordExporter {
            scope: None,
            linker: Arc::new(RecordLinker::new()),
        })))
        .build();
    // Same name contributed twice
    assert!(linker.is_err());

    let linker = DynamicLinkerFactory::new()
        .type_based_linker(records)
        .type_based_linker(Arc::new(HostLinker::new()))
        .fallback_linker(Arc::new(FnLinker::new("nothing", |_, _| Ok(None))))
        .build()
        .unwrap();
    assert_eq!(
        linker.linker_names(),
        vec!["type-based[record,host]", "nothing"]
    );

    let site = color_site(&linker);
    let record = Record::value(&[("color", Value::str("violet"))]);
    assert_eq!(site.invoke(&[record]), Ok(Value::str("violet")));
    assert_eq!(
        site.invoke(&[palette().green]),
        Ok(Value::str("green"))
    );
}

#[test]
fn test_code_unit_owns_its_sites() {
    let linker = DynamicLinkerFactory::new().build().unwrap();
    let unit = CodeUnit::new(linker, "module");
    let p = palette();
    let shape = MethodShape::generic(1);
    let op = color_op();
    let length = Operation::get()
        .with_namespace(StandardNamespace::Property)
        .named("length");

    assert_eq!(unit.invoke(0, &op, &shape, &[p.red.clone()]), Ok(Value::str("red")));
    assert_eq!(unit.invoke(1, &length, &shape, &[Value::str("abc")]), Ok(Value::Int(3)));
    assert_eq!(unit.invoke(0, &op, &shape, &[p.green.clone()]), Ok(Value::str("green")));
    assert_eq!(unit.site_count(), 2);

    let stats = unit.stats();
    assert_eq!(stats[0].1.relinks, 2);
    assert_eq!(stats[1].1.relinks, 1);
}
