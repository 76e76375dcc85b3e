//! The dynamic linker: bootstraps call sites and relinks them on cache misses.
//!
//! Dispatch on a call site:
//!
//! 1. Load the chain snapshot (lock-free).
//! 2. Evaluate entries in order; on a hit run the target.
//! 3. On a miss build a [`LinkRequest`], ask the composite linker, run the
//!    prelink filter, adapt the return type, validate, install according to
//!    the site's policy, and run the new target for the current arguments.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::call_site::{
    CallSite, ChainLookup, ChainedCallSite, MonomorphicCallSite, RelinkableCallSite, SitePolicy,
};
use crate::descriptor::{CallSiteDescriptor, CallerContext, MethodShape};
use crate::error::{LinkError, LinkResult};
use crate::factory::PrelinkFilter;
use crate::invocation::GuardedInvocation;
use crate::linker::{CompositeLinker, LinkRequest, LinkerServices};
use crate::operation::Operation;
use crate::value::Value;

/// Relinks after which a call site counts as unstable
pub const DEFAULT_UNSTABLE_RELINK_THRESHOLD: u64 = 8;

pub struct DynamicLinker {
    linker: Arc<CompositeLinker>,
    services: LinkerServices,
    prelink_filter: Option<PrelinkFilter>,
    site_policy: SitePolicy,
    unstable_relink_threshold: u64,
    sync_on_relink: bool,
}

impl DynamicLinker {
    pub(crate) fn new(
        linker: Arc<CompositeLinker>,
        prelink_filter: Option<PrelinkFilter>,
        site_policy: SitePolicy,
        unstable_relink_threshold: u64,
        sync_on_relink: bool,
    ) -> Self {
        Self {
            services: LinkerServices::new(linker.clone()),
            linker,
            prelink_filter,
            site_policy,
            unstable_relink_threshold,
            sync_on_relink,
        }
    }

    pub fn services(&self) -> &LinkerServices {
        &self.services
    }

    pub fn linker_names(&self) -> Vec<&str> {
        self.linker.names()
    }

    pub fn site_policy(&self) -> SitePolicy {
        self.site_policy
    }

    /// 0 means call sites never become unstable
    pub fn unstable_relink_threshold(&self) -> u64 {
        self.unstable_relink_threshold
    }

    pub fn sync_on_relink(&self) -> bool {
        self.sync_on_relink
    }

    /// Create an unlinked call site according to the configured policy
    pub fn create_call_site(&self, descriptor: CallSiteDescriptor) -> Arc<dyn RelinkableCallSite> {
        match self.site_policy {
            SitePolicy::Monomorphic => {
                Arc::new(MonomorphicCallSite::new(descriptor, self.sync_on_relink))
            }
            SitePolicy::Chained {
                max_chain_length,
                eviction,
            } => Arc::new(ChainedCallSite::new(
                descriptor,
                max_chain_length,
                eviction,
                self.sync_on_relink,
            )),
        }
    }

    pub fn bootstrap(
        self: &Arc<Self>,
        caller: CallerContext,
        operation: Operation,
        shape: MethodShape,
    ) -> CallSite {
        let descriptor = CallSiteDescriptor::new(caller, operation, shape);
        trace!(target: "dynlink::linker", site = %descriptor, "Bootstrapping call site");
        CallSite::new(self.create_call_site(descriptor), self.clone())
    }

    /// Bootstrap from the textual operation form, e.g. `GET:PROPERTY|METHOD:color`
    pub fn bootstrap_str(
        self: &Arc<Self>,
        caller: CallerContext,
        operation: &str,
        shape: MethodShape,
    ) -> LinkResult<CallSite> {
        let operation = operation.parse::<Operation>()?;
        Ok(self.bootstrap(caller, operation, shape))
    }

    /// Resolve a validated guarded invocation for `descriptor` and `args`
    /// without touching any call site
    pub fn link(
        &self,
        descriptor: &CallSiteDescriptor,
        args: &[Value],
        call_site_unstable: bool,
    ) -> LinkResult<GuardedInvocation> {
        let request = LinkRequest::new(descriptor, args, call_site_unstable);
        let (source, invocation) = self
            .linker
            .link_with_source(&request, &self.services)?
            .ok_or_else(|| LinkError::linkage_failure(descriptor, request.receiver_type()))?;
        let source = source.to_string();

        let invocation = match &self.prelink_filter {
            Some(filter) => filter(invocation, &request, &self.services),
            None => invocation,
        };
        let invocation = self.services.as_type(invocation, descriptor.shape());

        let arity = invocation.target().arity();
        if !arity.accepts(descriptor.arity()) {
            return Err(LinkError::misconfigured(
                source,
                format!(
                    "target takes {} arguments, call site {} passes {}",
                    arity,
                    descriptor,
                    descriptor.arity()
                ),
            ));
        }
        match invocation.check(args) {
            Ok(true) => Ok(invocation),
            Ok(false) => Err(LinkError::misconfigured(
                source,
                format!("guard rejects the arguments it was linked for at {}", descriptor),
            )),
            Err(e) => Err(LinkError::GuardEvaluation(e)),
        }
    }

    /// Dispatch `args` through `site`
    pub fn invoke(&self, site: &dyn RelinkableCallSite, args: &[Value]) -> LinkResult<Value> {
        let core = site.core();
        let expected = core.descriptor().arity();
        if args.len() != expected {
            return Err(LinkError::ArityMismatch {
                expected,
                got: args.len(),
            });
        }

        let chain = core.chain();
        if chain.is_megamorphic() {
            return self.dispatch_megamorphic(site, args);
        }
        match chain.lookup(args) {
            ChainLookup::Hit(entry) => {
                core.record_hit();
                match entry.target().invoke(args) {
                    Ok(value) => return Ok(value),
                    Err(e) if entry.should_relink(&e) => {
                        debug!(
                            target: "dynlink::site",
                            site = %core.descriptor(),
                            error = %e,
                            "Target asked for relink, evicting entry"
                        );
                        site.evict(entry);
                        return self.relink_and_invoke(site, args, false);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            ChainLookup::Fatal(e) => return Err(LinkError::GuardEvaluation(e)),
            ChainLookup::Miss => self.relink_and_invoke(site, args, true),
        }
    }

    /// Relink `site` for `args` and run the new target. `missed` is set when
    /// the caller found no applicable entry; the miss is counted here, once
    /// it is known that no other thread linked in the meantime.
    fn relink_and_invoke(
        &self,
        site: &dyn RelinkableCallSite,
        args: &[Value],
        missed: bool,
    ) -> LinkResult<Value> {
        let core = site.core();
        let lock = core.relink_lock().map(|lock| lock.lock());
        if lock.is_some() {
            // Another thread may have linked while this one waited.
            let chain = core.chain();
            if chain.is_megamorphic() {
                drop(lock);
                return self.dispatch_megamorphic(site, args);
            }
            match chain.lookup(args) {
                ChainLookup::Hit(entry) => {
                    if missed {
                        core.record_hit();
                    }
                    let target = entry.target().clone();
                    drop(lock);
                    return target.invoke(args).map_err(LinkError::from);
                }
                ChainLookup::Fatal(e) => return Err(LinkError::GuardEvaluation(e)),
                ChainLookup::Miss => {}
            }
        }
        if missed {
            core.record_miss();
        }

        let previous = core.record_relink();
        let threshold = self.unstable_relink_threshold;
        let unstable = threshold > 0 && previous >= threshold;
        let invocation = self.link(core.descriptor(), args, unstable)?;
        let target = invocation.target().clone();

        if threshold > 0 && previous == threshold {
            debug!(
                target: "dynlink::site",
                site = %core.descriptor(),
                relinks = previous + 1,
                "Call site became unstable, resetting chain"
            );
            site.reset_and_relink(invocation);
        } else {
            site.relink(invocation);
        }
        trace!(
            target: "dynlink::site",
            site = %core.descriptor(),
            relinks = previous + 1,
            unstable,
            chain_length = core.chain().len(),
            "Relinked call site"
        );
        drop(lock);

        target.invoke(args).map_err(LinkError::from)
    }

    /// Resolve without caching; used once a site stopped caching
    fn dispatch_megamorphic(&self, site: &dyn RelinkableCallSite, args: &[Value]) -> LinkResult<Value> {
        let core = site.core();
        core.record_megamorphic_dispatch();
        let invocation = self.link(core.descriptor(), args, true)?;
        invocation.target().invoke(args).map_err(LinkError::from)
    }
}

impl fmt::Debug for DynamicLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLinker")
            .field("linkers", &self.linker.names())
            .field("site_policy", &self.site_policy)
            .field("unstable_relink_threshold", &self.unstable_relink_threshold)
            .field("sync_on_relink", &self.sync_on_relink)
            .field("prelink_filter", &self.prelink_filter.is_some())
            .finish()
    }
}
