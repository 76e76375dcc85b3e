//! Assembles a [`DynamicLinker`] from linkers and configuration.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::call_site::SitePolicy;
use crate::config::LinkerConfig;
use crate::dynamic_linker::{DynamicLinker, DEFAULT_UNSTABLE_RELINK_THRESHOLD};
use crate::error::{LinkError, LinkResult};
use crate::invocation::GuardedInvocation;
use crate::linker::{
    CompositeLinker, CompositeTypeBasedLinker, ContributedLinker, GuardingDynamicLinker,
    HostLinker, LinkRequest, LinkerRegistry, LinkerServices, TypeBasedGuardingDynamicLinker,
    DEFAULT_MEMBER_CACHE_CAPACITY,
};

/// Transformation applied to every freshly linked invocation before it is installed
pub type PrelinkFilter = Arc<
    dyn Fn(GuardedInvocation, &LinkRequest<'_>, &LinkerServices) -> GuardedInvocation
        + Send
        + Sync,
>;

pub struct DynamicLinkerFactory {
    prioritized: Vec<ContributedLinker>,
    fallback: Vec<ContributedLinker>,
    registry: Option<LinkerRegistry>,
    discovery_scope: Option<String>,
    prelink_filter: Option<PrelinkFilter>,
    site_policy: SitePolicy,
    unstable_relink_threshold: u64,
    sync_on_relink: bool,
    member_cache_capacity: usize,
}

impl DynamicLinkerFactory {
    pub fn new() -> Self {
        Self {
            prioritized: Vec::new(),
            fallback: Vec::new(),
            registry: None,
            discovery_scope: None,
            prelink_filter: None,
            site_policy: SitePolicy::default(),
            unstable_relink_threshold: DEFAULT_UNSTABLE_RELINK_THRESHOLD,
            sync_on_relink: false,
            member_cache_capacity: DEFAULT_MEMBER_CACHE_CAPACITY,
        }
    }

    /// Factory preconfigured from a [`LinkerConfig`]
    pub fn from_config(config: &LinkerConfig) -> Self {
        let mut factory = Self::new()
            .site_policy(config.site_policy())
            .unstable_relink_threshold(config.unstable_relink_threshold)
            .sync_on_relink(config.sync_on_relink)
            .member_cache_capacity(config.member_cache_capacity);
        if let Some(scope) = &config.discovery_scope {
            factory = factory.discovery_scope(scope);
        }
        factory
    }

    /// Linker consulted before any discovered or fallback linker
    pub fn prioritized_linker(mut self, linker: Arc<dyn GuardingDynamicLinker>) -> Self {
        self.prioritized.push(ContributedLinker::Plain(linker));
        self
    }

    /// Prioritized linker that is grouped with neighbouring type-based linkers
    pub fn type_based_linker(mut self, linker: Arc<dyn TypeBasedGuardingDynamicLinker>) -> Self {
        self.prioritized.push(ContributedLinker::TypeBased(linker));
        self
    }

    /// Replace the default host-object-model fallback
    pub fn fallback_linker(mut self, linker: Arc<dyn GuardingDynamicLinker>) -> Self {
        self.fallback.push(ContributedLinker::Plain(linker));
        self
    }

    pub fn registry(mut self, registry: LinkerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn discovery_scope(mut self, scope: &str) -> Self {
        self.discovery_scope = Some(scope.to_string());
        self
    }

    pub fn prelink_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(GuardedInvocation, &LinkRequest<'_>, &LinkerServices) -> GuardedInvocation
            + Send
            + Sync
            + 'static,
    {
        self.prelink_filter = Some(Arc::new(filter));
        self
    }

    /// Relinks after which a call site is reported unstable to linkers; 0 disables
    pub fn unstable_relink_threshold(mut self, threshold: u64) -> Self {
        self.unstable_relink_threshold = threshold;
        self
    }

    pub fn sync_on_relink(mut self, sync: bool) -> Self {
        self.sync_on_relink = sync;
        self
    }

    pub fn site_policy(mut self, policy: SitePolicy) -> Self {
        self.site_policy = policy;
        self
    }

    /// Capacity of the default host linker's member cache
    pub fn member_cache_capacity(mut self, capacity: usize) -> Self {
        self.member_cache_capacity = capacity;
        self
    }

    pub fn build(self) -> LinkResult<Arc<DynamicLinker>> {
        let mut primary = self.prioritized;
        if let Some(registry) = &self.registry {
            let discovered = registry.discover(self.discovery_scope.as_deref());
            debug!(
                target: "dynlink::factory",
                scope = self.discovery_scope.as_deref().unwrap_or("*"),
                discovered = discovered.len(),
                "Discovered contributed linkers"
            );
            primary.extend(discovered);
        }
        let fallback = if self.fallback.is_empty() {
            vec![ContributedLinker::TypeBased(Arc::new(
                HostLinker::with_cache_capacity(self.member_cache_capacity),
            ))]
        } else {
            self.fallback
        };

        check_names(primary.iter().chain(fallback.iter()))?;

        let mut linkers = group_type_based(primary);
        linkers.extend(group_type_based(fallback));
        let composite = Arc::new(CompositeLinker::new(linkers));

        info!(
            target: "dynlink::factory",
            linkers = ?composite.names(),
            policy = ?self.site_policy,
            unstable_relink_threshold = self.unstable_relink_threshold,
            sync_on_relink = self.sync_on_relink,
            "Built dynamic linker"
        );

        Ok(Arc::new(DynamicLinker::new(
            composite,
            self.prelink_filter,
            self.site_policy,
            self.unstable_relink_threshold,
            self.sync_on_relink,
        )))
    }
}

impl Default for DynamicLinkerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DynamicLinkerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLinkerFactory")
            .field("prioritized", &self.prioritized)
            .field("fallback", &self.fallback)
            .field("registry", &self.registry)
            .field("discovery_scope", &self.discovery_scope)
            .field("site_policy", &self.site_policy)
            .field("unstable_relink_threshold", &self.unstable_relink_threshold)
            .field("sync_on_relink", &self.sync_on_relink)
            .finish()
    }
}

fn check_names<'a>(linkers: impl Iterator<Item = &'a ContributedLinker>) -> LinkResult<()> {
    let mut seen = HashSet::new();
    for linker in linkers {
        let name = linker.name();
        if name.is_empty() {
            return Err(LinkError::misconfigured("<unnamed>", "linker name is empty"));
        }
        if !seen.insert(name.to_string()) {
            return Err(LinkError::misconfigured(name, "duplicate linker name"));
        }
    }
    Ok(())
}

/// Merge runs of adjacent type-based linkers into one composite
fn group_type_based(linkers: Vec<ContributedLinker>) -> Vec<Arc<dyn GuardingDynamicLinker>> {
    let mut out: Vec<Arc<dyn GuardingDynamicLinker>> = Vec::new();
    let mut run: Vec<Arc<dyn TypeBasedGuardingDynamicLinker>> = Vec::new();

    fn flush(
        run: &mut Vec<Arc<dyn TypeBasedGuardingDynamicLinker>>,
        out: &mut Vec<Arc<dyn GuardingDynamicLinker>>,
    ) {
        match run.len() {
            0 => {}
            1 => {
                if let Some(single) = run.pop() {
                    out.push(as_plain(single));
                }
            }
            _ => out.push(Arc::new(CompositeTypeBasedLinker::new(std::mem::take(run)))),
        }
    }

    for linker in linkers {
        match linker {
            ContributedLinker::TypeBased(l) => run.push(l),
            ContributedLinker::Plain(l) => {
                flush(&mut run, &mut out);
                out.push(l);
            }
        }
    }
    flush(&mut run, &mut out);
    out
}

/// View a type-based linker through its supertrait
fn as_plain(linker: Arc<dyn TypeBasedGuardingDynamicLinker>) -> Arc<dyn GuardingDynamicLinker> {
    struct Upcast(Arc<dyn TypeBasedGuardingDynamicLinker>);

    impl GuardingDynamicLinker for Upcast {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn get_guarded_invocation(
            &self,
            request: &LinkRequest<'_>,
            services: &LinkerServices,
        ) -> LinkResult<Option<GuardedInvocation>> {
            self.0.get_guarded_invocation(request, services)
        }
    }

    Arc::new(Upcast(linker))
}
