use std::sync::Arc;

use tracing::{debug, trace};

use super::{CallSiteCore, Chain, EvictionPolicy, RelinkableCallSite};
use crate::descriptor::CallSiteDescriptor;
use crate::invocation::GuardedInvocation;

/// Polymorphic call site holding up to `max_chain_length` guarded invocations
///
/// New entries go to the front. Entries whose switch points were
/// invalidated are pruned whenever the chain is rebuilt.
#[derive(Debug)]
pub struct ChainedCallSite {
    core: CallSiteCore,
    max_chain_length: usize,
    eviction: EvictionPolicy,
}

impl ChainedCallSite {
    pub fn new(
        descriptor: CallSiteDescriptor,
        max_chain_length: usize,
        eviction: EvictionPolicy,
        sync_on_relink: bool,
    ) -> Self {
        Self {
            core: CallSiteCore::new(descriptor, sync_on_relink),
            max_chain_length: max_chain_length.max(1),
            eviction,
        }
    }

    pub fn max_chain_length(&self) -> usize {
        self.max_chain_length
    }

    pub fn eviction(&self) -> EvictionPolicy {
        self.eviction
    }
}

impl RelinkableCallSite for ChainedCallSite {
    fn core(&self) -> &CallSiteCore {
        &self.core
    }

    fn relink(&self, invocation: GuardedInvocation) {
        let head = Arc::new(invocation);
        let mut dropped = 0;
        self.core.update(|current| {
            if current.is_megamorphic() {
                return current.clone();
            }
            let (next, overflow) = current.prepend(head.clone(), self.max_chain_length);
            dropped = overflow;
            if overflow > 0 && self.eviction == EvictionPolicy::Megamorphic {
                Chain::megamorphic()
            } else {
                next
            }
        });

        if dropped == 0 {
            trace!(target: "dynlink::site", site = %self.core.descriptor(), "Prepended chain entry");
        } else {
            debug!(
                target: "dynlink::site",
                site = %self.core.descriptor(),
                dropped,
                policy = ?self.eviction,
                "Chain exceeded its bound"
            );
        }
    }

    /// Reset to `invocation` alone, unless the megamorphic policy applies:
    /// a full chain overflows into megamorphic dispatch instead of resetting,
    /// and a megamorphic chain is never replaced.
    fn reset_and_relink(&self, invocation: GuardedInvocation) {
        let head = Arc::new(invocation);
        let mut overflowed = false;
        self.core.update(|current| {
            if current.is_megamorphic() {
                return current.clone();
            }
            let (_, overflow) = current.prepend(head.clone(), self.max_chain_length);
            overflowed = overflow > 0 && self.eviction == EvictionPolicy::Megamorphic;
            if overflowed {
                Chain::megamorphic()
            } else {
                Chain::single(head.clone())
            }
        });

        if overflowed {
            debug!(
                target: "dynlink::site",
                site = %self.core.descriptor(),
                "Chain exceeded its bound during reset, going megamorphic"
            );
        }
    }
}
