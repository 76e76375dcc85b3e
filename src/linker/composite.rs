//! Linker composition.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use super::{GuardingDynamicLinker, LinkRequest, LinkerServices, TypeBasedGuardingDynamicLinker};
use crate::error::LinkResult;
use crate::invocation::GuardedInvocation;
use crate::value::TypeKey;

/// Ordered list of linkers; the first that produces an invocation wins
pub struct CompositeLinker {
    linkers: Vec<Arc<dyn GuardingDynamicLinker>>,
}

impl CompositeLinker {
    pub fn new(linkers: Vec<Arc<dyn GuardingDynamicLinker>>) -> Self {
        Self { linkers }
    }

    pub fn linkers(&self) -> &[Arc<dyn GuardingDynamicLinker>] {
        &self.linkers
    }

    pub fn names(&self) -> Vec<&str> {
        self.linkers.iter().map(|l| l.name()).collect()
    }

    /// Ask each linker in order
    pub fn link(
        &self,
        request: &LinkRequest<'_>,
        services: &LinkerServices,
    ) -> LinkResult<Option<GuardedInvocation>> {
        Ok(self
            .link_with_source(request, services)?
            .map(|(_, invocation)| invocation))
    }

    /// Like [`link`](Self::link), also naming the linker that answered
    pub fn link_with_source(
        &self,
        request: &LinkRequest<'_>,
        services: &LinkerServices,
    ) -> LinkResult<Option<(&str, GuardedInvocation)>> {
        for linker in &self.linkers {
            if let Some(invocation) = linker.get_guarded_invocation(request, services)? {
                trace!(
                    target: "dynlink::linker",
                    linker = linker.name(),
                    descriptor = %request.descriptor(),
                    "Linker produced invocation"
                );
                return Ok(Some((linker.name(), invocation)));
            }
        }
        Ok(None)
    }
}

impl GuardingDynamicLinker for CompositeLinker {
    fn name(&self) -> &str {
        "composite"
    }

    fn get_guarded_invocation(
        &self,
        request: &LinkRequest<'_>,
        services: &LinkerServices,
    ) -> LinkResult<Option<GuardedInvocation>> {
        self.link(request, services)
    }
}

impl fmt::Debug for CompositeLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeLinker")
            .field("linkers", &self.names())
            .finish()
    }
}

/// Default number of receiver types whose candidates a
/// [`CompositeTypeBasedLinker`] remembers
pub const DEFAULT_TYPE_CACHE_CAPACITY: usize = 256;

/// Type-based linkers grouped together
///
/// For each receiver type the indices of the linkers that claim it are
/// computed once and memoized, so dispatching a relink only consults the
/// linkers that can possibly answer. Classes built at run time each get a
/// fresh `TypeKey`, so the memo is an LRU of bounded size.
pub struct CompositeTypeBasedLinker {
    name: String,
    linkers: Vec<Arc<dyn TypeBasedGuardingDynamicLinker>>,
    by_type: Mutex<LruCache<TypeKey, Arc<[usize]>>>,
}

impl CompositeTypeBasedLinker {
    pub fn new(linkers: Vec<Arc<dyn TypeBasedGuardingDynamicLinker>>) -> Self {
        Self::with_cache_capacity(linkers, DEFAULT_TYPE_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(
        linkers: Vec<Arc<dyn TypeBasedGuardingDynamicLinker>>,
        capacity: usize,
    ) -> Self {
        let name = format!(
            "type-based[{}]",
            linkers.iter().map(|l| l.name()).collect::<Vec<_>>().join(",")
        );
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            linkers,
            by_type: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn linkers(&self) -> &[Arc<dyn TypeBasedGuardingDynamicLinker>] {
        &self.linkers
    }

    /// Indices of the linkers that claim `key`, in registration order
    pub fn candidates(&self, key: TypeKey) -> Arc<[usize]> {
        if let Some(cached) = self.by_type.lock().get(&key) {
            return cached.clone();
        }
        // Computed outside the lock; contributed linkers run arbitrary code
        let computed: Arc<[usize]> = self
            .linkers
            .iter()
            .enumerate()
            .filter(|(_, linker)| linker.can_link_type(key))
            .map(|(i, _)| i)
            .collect();
        self.by_type
            .lock()
            .get_or_insert(key, || computed)
            .clone()
    }

    /// Number of receiver types currently memoized
    pub fn cached_types(&self) -> usize {
        self.by_type.lock().len()
    }
}

impl GuardingDynamicLinker for CompositeTypeBasedLinker {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_guarded_invocation(
        &self,
        request: &LinkRequest<'_>,
        services: &LinkerServices,
    ) -> LinkResult<Option<GuardedInvocation>> {
        let Some(key) = request.receiver_type() else {
            return Ok(None);
        };
        for &index in self.candidates(key).iter() {
            let linker = &self.linkers[index];
            if let Some(invocation) = linker.get_guarded_invocation(request, services)? {
                return Ok(Some(invocation));
            }
        }
        Ok(None)
    }
}

impl TypeBasedGuardingDynamicLinker for CompositeTypeBasedLinker {
    fn can_link_type(&self, key: TypeKey) -> bool {
        !self.candidates(key).is_empty()
    }
}

impl fmt::Debug for CompositeTypeBasedLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeTypeBasedLinker")
            .field("name", &self.name)
            .field("cached_types", &self.cached_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::descriptor::{CallSiteDescriptor, CallerContext, MethodShape};
    use crate::invocation::{Arity, Guard, Target};
    use crate::linker::FnLinker;
    use crate::operation::Operation;
    use crate::value::{ClassBuilder, Instance, Value};

    struct IntOnly {
        calls: AtomicUsize,
    }

    impl GuardingDynamicLinker for IntOnly {
        fn name(&self) -> &str {
            "int-only"
        }

        fn get_guarded_invocation(
            &self,
            _request: &LinkRequest<'_>,
            _services: &LinkerServices,
        ) -> LinkResult<Option<GuardedInvocation>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(Some(GuardedInvocation::new(
                Target::constant(Arity::Exact(1), Value::str("int")),
                Guard::receiver_type(TypeKey::Int),
            )))
        }
    }

    impl TypeBasedGuardingDynamicLinker for IntOnly {
        fn can_link_type(&self, key: TypeKey) -> bool {
            key == TypeKey::Int
        }
    }

    fn descriptor() -> CallSiteDescriptor {
        CallSiteDescriptor::new(
            CallerContext::new("test"),
            Operation::get(),
            MethodShape::generic(1),
        )
    }

    fn services(linkers: Vec<Arc<dyn GuardingDynamicLinker>>) -> LinkerServices {
        LinkerServices::new(Arc::new(CompositeLinker::new(linkers)))
    }

    #[test]
    fn test_first_linker_wins() {
        let first: Arc<dyn GuardingDynamicLinker> = Arc::new(FnLinker::new("first", |_, _| {
            Ok(Some(GuardedInvocation::unconditional(Target::constant(
                Arity::Exact(1),
                Value::Int(1),
            ))))
        }));
        let second: Arc<dyn GuardingDynamicLinker> = Arc::new(FnLinker::new("second", |_, _| {
            Ok(Some(GuardedInvocation::unconditional(Target::constant(
                Arity::Exact(1),
                Value::Int(2),
            ))))
        }));
        let composite = CompositeLinker::new(vec![first, second]);
        let desc = descriptor();
        let args = [Value::Null];
        let request = LinkRequest::new(&desc, &args, false);

        let inv = composite
            .link(&request, &services(vec![]))
            .unwrap()
            .unwrap();
        assert_eq!(inv.target().invoke(&args), Ok(Value::Int(1)));
    }

    #[test]
    fn test_type_based_skips_unclaimed_types() {
        let int_only = Arc::new(IntOnly {
            calls: AtomicUsize::new(0),
        });
        let composite = CompositeTypeBasedLinker::new(vec![int_only.clone() as Arc<dyn TypeBasedGuardingDynamicLinker>]);
        let desc = descriptor();
        let svc = services(vec![]);

        let args = [Value::str("x")];
        let request = LinkRequest::new(&desc, &args, false);
        assert!(composite
            .get_guarded_invocation(&request, &svc)
            .unwrap()
            .is_none());
        assert_eq!(int_only.calls.load(Ordering::Relaxed), 0);

        let args = [Value::Int(3)];
        let request = LinkRequest::new(&desc, &args, false);
        assert!(composite
            .get_guarded_invocation(&request, &svc)
            .unwrap()
            .is_some());
        assert_eq!(int_only.calls.load(Ordering::Relaxed), 1);

        assert!(composite.can_link_type(TypeKey::Int));
        assert!(!composite.can_link_type(TypeKey::Bool));
        assert_eq!(composite.cached_types(), 3);
    }

    #[test]
    fn test_type_cache_is_bounded() {
        let int_only = Arc::new(IntOnly {
            calls: AtomicUsize::new(0),
        });
        let composite = CompositeTypeBasedLinker::with_cache_capacity(
            vec![int_only as Arc<dyn TypeBasedGuardingDynamicLinker>],
            4,
        );

        for i in 0..10 {
            let class = ClassBuilder::new(&format!("Short{}", i)).build();
            let key = Value::object(Instance::new(&class)).type_key();
            assert!(!composite.can_link_type(key));
            assert!(composite.cached_types() <= 4);
        }
        assert_eq!(composite.cached_types(), 4);

        // Evicted or not, answers stay the same
        assert!(composite.can_link_type(TypeKey::Int));
        assert_eq!(composite.cached_types(), 4);
    }
}
