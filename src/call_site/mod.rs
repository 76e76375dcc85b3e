//! Relinkable call sites.
//!
//! ```text
//!   Unlinked ──first relink──▶ Linked ──relink (guard miss)──▶ Linked
//!                                 │
//!                                 └── chain overflow, megamorphic policy ──▶ Megamorphic
//! ```
//!
//! A call site owns an immutable [`Chain`] snapshot behind an `ArcSwap`.
//! Readers load the snapshot without locking; relinking publishes a new
//! chain. Two relinks racing on one site are harmless: guards are evaluated
//! on every call, so a lost update costs one extra relink.
//!
//! Two policies exist:
//! - [`MonomorphicCallSite`] keeps a single entry and replaces it on relink.
//! - [`ChainedCallSite`] prepends up to a bound and then either evicts the
//!   oldest entries or stops caching altogether.

mod chain;
mod chained;
mod code_unit;
mod monomorphic;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Deserialize;

pub use chain::{Chain, ChainLookup};
pub use chained::ChainedCallSite;
pub use code_unit::CodeUnit;
pub use monomorphic::MonomorphicCallSite;

use crate::descriptor::CallSiteDescriptor;
use crate::dynamic_linker::DynamicLinker;
use crate::error::LinkResult;
use crate::invocation::GuardedInvocation;
use crate::value::Value;

/// Default bound for chained call sites
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 8;

/// Link state of a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never linked; the first call relinks
    Unlinked,
    /// Holds a chain of guarded invocations
    Linked,
    /// Stopped caching; every call resolves through the linker
    Megamorphic,
}

/// What a chained call site does when its chain would exceed its bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Drop the oldest entries
    #[default]
    Fifo,
    /// Discard the chain and stop caching
    Megamorphic,
}

/// Which call-site implementation a linker creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitePolicy {
    Monomorphic,
    Chained {
        max_chain_length: usize,
        eviction: EvictionPolicy,
    },
}

impl Default for SitePolicy {
    fn default() -> Self {
        SitePolicy::Chained {
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
            eviction: EvictionPolicy::Fifo,
        }
    }
}

/// State shared by every call-site implementation
pub struct CallSiteCore {
    descriptor: CallSiteDescriptor,
    chain: ArcSwap<Chain>,
    relinks: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    megamorphic_dispatches: AtomicU64,
    relink_lock: Option<Mutex<()>>,
}

impl CallSiteCore {
    pub fn new(descriptor: CallSiteDescriptor, sync_on_relink: bool) -> Self {
        Self {
            descriptor,
            chain: ArcSwap::from_pointee(Chain::empty()),
            relinks: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            megamorphic_dispatches: AtomicU64::new(0),
            relink_lock: sync_on_relink.then(|| Mutex::new(())),
        }
    }

    pub fn descriptor(&self) -> &CallSiteDescriptor {
        &self.descriptor
    }

    /// Current chain snapshot
    #[inline]
    pub fn chain(&self) -> Arc<Chain> {
        self.chain.load_full()
    }

    pub(crate) fn publish(&self, chain: Chain) {
        self.chain.store(Arc::new(chain));
    }

    /// Compare-and-swap loop over the chain
    pub(crate) fn update<F>(&self, mut f: F)
    where
        F: FnMut(&Chain) -> Chain,
    {
        self.chain.rcu(|current| f(current));
    }

    /// Count a relink, returning how many happened before this one
    pub(crate) fn record_relink(&self) -> u64 {
        self.relinks.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_megamorphic_dispatch(&self) {
        self.megamorphic_dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn relink_lock(&self) -> Option<&Mutex<()>> {
        self.relink_lock.as_ref()
    }

    pub fn relink_count(&self) -> u64 {
        self.relinks.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> LinkState {
        let chain = self.chain.load();
        if chain.is_megamorphic() {
            LinkState::Megamorphic
        } else if chain.is_empty() && self.relink_count() == 0 {
            LinkState::Unlinked
        } else {
            LinkState::Linked
        }
    }

    pub fn stats(&self) -> CallSiteStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CallSiteStats {
            state: self.state(),
            chain_length: self.chain.load().len(),
            hits,
            misses,
            relinks: self.relink_count(),
            megamorphic_dispatches: self.megamorphic_dispatches.load(Ordering::Relaxed),
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
        }
    }
}

impl fmt::Debug for CallSiteCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSiteCore")
            .field("descriptor", &self.descriptor.to_string())
            .field("state", &self.state())
            .field("chain_length", &self.chain.load().len())
            .field("relinks", &self.relink_count())
            .finish()
    }
}

/// Call-site statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CallSiteStats {
    pub state: LinkState,
    pub chain_length: usize,
    /// Calls served by a cached entry
    pub hits: u64,
    /// Calls that found no applicable entry
    pub misses: u64,
    pub relinks: u64,
    /// Calls resolved without caching after the site went megamorphic
    pub megamorphic_dispatches: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// A dispatch point whose target can be replaced
pub trait RelinkableCallSite: Send + Sync + fmt::Debug {
    fn core(&self) -> &CallSiteCore;

    /// Install a freshly linked invocation according to this site's policy
    fn relink(&self, invocation: GuardedInvocation);

    /// Discard every cached entry and install `invocation` alone
    fn reset_and_relink(&self, invocation: GuardedInvocation) {
        self.core().publish(Chain::single(Arc::new(invocation)));
    }

    /// Remove one entry from the chain
    fn evict(&self, entry: &Arc<GuardedInvocation>) {
        self.core().update(|chain| chain.without(entry));
    }

    fn descriptor(&self) -> &CallSiteDescriptor {
        self.core().descriptor()
    }

    fn state(&self) -> LinkState {
        self.core().state()
    }

    fn chain(&self) -> Arc<Chain> {
        self.core().chain()
    }

    fn stats(&self) -> CallSiteStats {
        self.core().stats()
    }
}

/// Handle returned by bootstrapping: a call site bound to the linker that relinks it
#[derive(Clone)]
pub struct CallSite {
    site: Arc<dyn RelinkableCallSite>,
    linker: Arc<DynamicLinker>,
}

impl CallSite {
    pub(crate) fn new(site: Arc<dyn RelinkableCallSite>, linker: Arc<DynamicLinker>) -> Self {
        Self { site, linker }
    }

    /// Perform the operation on `args`, relinking first if no cached entry applies
    #[inline]
    pub fn invoke(&self, args: &[Value]) -> LinkResult<Value> {
        self.linker.invoke(&*self.site, args)
    }

    pub fn site(&self) -> &Arc<dyn RelinkableCallSite> {
        &self.site
    }

    pub fn linker(&self) -> &Arc<DynamicLinker> {
        &self.linker
    }

    pub fn descriptor(&self) -> &CallSiteDescriptor {
        self.site.descriptor()
    }

    pub fn state(&self) -> LinkState {
        self.site.state()
    }

    pub fn stats(&self) -> CallSiteStats {
        self.site.stats()
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.site, f)
    }
}
