use std::sync::Arc;

use tracing::trace;

use super::{CallSiteCore, Chain, RelinkableCallSite};
use crate::descriptor::CallSiteDescriptor;
use crate::invocation::GuardedInvocation;

/// Single-entry call site: every relink replaces the cached target
#[derive(Debug)]
pub struct MonomorphicCallSite {
    core: CallSiteCore,
}

impl MonomorphicCallSite {
    pub fn new(descriptor: CallSiteDescriptor, sync_on_relink: bool) -> Self {
        Self {
            core: CallSiteCore::new(descriptor, sync_on_relink),
        }
    }
}

impl RelinkableCallSite for MonomorphicCallSite {
    fn core(&self) -> &CallSiteCore {
        &self.core
    }

    fn relink(&self, invocation: GuardedInvocation) {
        trace!(target: "dynlink::site", site = %self.core.descriptor(), guard = ?invocation.guard(), "Replacing monomorphic target");
        self.core.publish(Chain::single(Arc::new(invocation)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_site::LinkState;
    use crate::descriptor::{CallerContext, MethodShape};
    use crate::invocation::{Arity, Guard, Target};
    use crate::operation::Operation;
    use crate::value::{TypeKey, Value};

    fn site() -> MonomorphicCallSite {
        MonomorphicCallSite::new(
            CallSiteDescriptor::new(
                CallerContext::new("test"),
                Operation::parse("GET:PROPERTY:x").unwrap(),
                MethodShape::generic(1),
            ),
            false,
        )
    }

    fn invocation(key: TypeKey) -> GuardedInvocation {
        GuardedInvocation::new(
            Target::constant(Arity::Exact(1), Value::Null),
            Guard::receiver_type(key),
        )
    }

    #[test]
    fn test_relink_replaces() {
        let site = site();
        assert_eq!(site.state(), LinkState::Unlinked);
        assert!(site.chain().is_empty());

        site.relink(invocation(TypeKey::Int));
        site.relink(invocation(TypeKey::Str));

        let chain = site.chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.entries()[0].guard().evaluate(&[Value::str("a")]), Ok(true));
    }

    #[test]
    fn test_evict_empties_chain() {
        let site = site();
        site.relink(invocation(TypeKey::Int));
        let entry = site.chain().entries()[0].clone();
        site.evict(&entry);
        assert!(site.chain().is_empty());
    }
}
