//! Immutable inline-cache chains.
//!
//! A call site publishes a new [`Chain`] on every relink; readers hold an
//! `Arc<Chain>` snapshot and never observe a partially built chain.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use crate::error::GuardError;
use crate::invocation::GuardedInvocation;
use crate::value::Value;

/// Outcome of evaluating a chain against call arguments
pub enum ChainLookup<'a> {
    /// First entry whose switch points are valid and whose guard passed
    Hit(&'a Arc<GuardedInvocation>),
    /// No entry applies
    Miss,
    /// A guard failed fatally
    Fatal(GuardError),
}

#[derive(Debug, Clone, Default)]
pub struct Chain {
    entries: SmallVec<[Arc<GuardedInvocation>; 4]>,
    megamorphic: bool,
}

impl Chain {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(invocation: Arc<GuardedInvocation>) -> Self {
        let mut entries = SmallVec::new();
        entries.push(invocation);
        Self {
            entries,
            megamorphic: false,
        }
    }

    /// Chain of a site that stopped caching
    pub fn megamorphic() -> Self {
        Self {
            entries: SmallVec::new(),
            megamorphic: true,
        }
    }

    pub fn entries(&self) -> &[Arc<GuardedInvocation>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn is_megamorphic(&self) -> bool {
        self.megamorphic
    }

    /// Evaluate entries in order; first match wins
    #[inline]
    pub fn lookup(&self, args: &[Value]) -> ChainLookup<'_> {
        for entry in &self.entries {
            match entry.check(args) {
                Ok(true) => return ChainLookup::Hit(entry),
                Ok(false) => {}
                Err(e) if e.fatal => return ChainLookup::Fatal(e),
                Err(e) => {
                    trace!(target: "dynlink::site", error = %e, "Soft guard error, trying next entry");
                }
            }
        }
        ChainLookup::Miss
    }

    /// New chain with `head` in front of every still-valid entry of this one,
    /// truncated to `max_len`. Returns the chain and the number of entries
    /// dropped from the tail.
    pub(crate) fn prepend(&self, head: Arc<GuardedInvocation>, max_len: usize) -> (Chain, usize) {
        let mut entries: SmallVec<[Arc<GuardedInvocation>; 4]> = SmallVec::new();
        entries.push(head);
        entries.extend(
            self.entries
                .iter()
                .filter(|e| !e.has_been_invalidated())
                .cloned(),
        );
        let max_len = max_len.max(1);
        let dropped = entries.len().saturating_sub(max_len);
        entries.truncate(max_len);
        (
            Chain {
                entries,
                megamorphic: false,
            },
            dropped,
        )
    }

    /// New chain without `entry` (compared by identity)
    pub(crate) fn without(&self, entry: &Arc<GuardedInvocation>) -> Chain {
        Chain {
            entries: self
                .entries
                .iter()
                .filter(|e| !Arc::ptr_eq(e, entry))
                .cloned()
                .collect(),
            megamorphic: self.megamorphic,
        }
    }
}
