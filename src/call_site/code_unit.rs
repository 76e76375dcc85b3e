//! Owner of the call sites of one compiled unit of code.
//!
//! Call sites are created on first use, keyed by their index in the unit,
//! and dropped together with it.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::{CallSite, CallSiteStats};
use crate::descriptor::{CallerContext, MethodShape};
use crate::dynamic_linker::DynamicLinker;
use crate::error::LinkResult;
use crate::operation::Operation;
use crate::value::Value;

pub struct CodeUnit {
    linker: Arc<DynamicLinker>,
    caller: CallerContext,
    sites: DashMap<u32, CallSite>,
}

impl CodeUnit {
    pub fn new(linker: Arc<DynamicLinker>, name: &str) -> Self {
        Self {
            linker,
            caller: CallerContext::new(name),
            sites: DashMap::new(),
        }
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    /// Call site at `index`, bootstrapped on first request
    ///
    /// The operation and shape are only used when the site is created; a
    /// site keeps the descriptor it was bootstrapped with.
    pub fn call_site(&self, index: u32, operation: &Operation, shape: &MethodShape) -> CallSite {
        if let Some(site) = self.sites.get(&index) {
            return site.clone();
        }
        self.sites
            .entry(index)
            .or_insert_with(|| {
                self.linker
                    .bootstrap(self.caller.clone(), operation.clone(), shape.clone())
            })
            .clone()
    }

    pub fn invoke(
        &self,
        index: u32,
        operation: &Operation,
        shape: &MethodShape,
        args: &[Value],
    ) -> LinkResult<Value> {
        self.call_site(index, operation, shape).invoke(args)
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Statistics of every call site created so far, ordered by index
    pub fn stats(&self) -> Vec<(u32, CallSiteStats)> {
        let mut stats: Vec<_> = self
            .sites
            .iter()
            .map(|entry| (*entry.key(), entry.value().stats()))
            .collect();
        stats.sort_by_key(|(index, _)| *index);
        stats
    }
}

impl fmt::Debug for CodeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeUnit")
            .field("caller", &self.caller)
            .field("sites", &self.sites.len())
            .finish()
    }
}
