//! Linkers: resolve a link request into a guarded invocation.
//!
//! A linker answers one question: "given this call-site descriptor and
//! these live arguments, what should run, and under which guard does that
//! answer stay valid?" Returning `Ok(None)` means "not mine"; the composite
//! linker then asks the next one.
//!
//! Linkers that decide purely on the receiver's runtime type implement
//! [`TypeBasedGuardingDynamicLinker`] so that the factory can group them
//! into a [`CompositeTypeBasedLinker`], which remembers per type which
//! linkers apply.

mod composite;
mod host;
mod registry;
mod services;

use std::fmt;
use std::sync::Arc;

pub use composite::{CompositeLinker, CompositeTypeBasedLinker, DEFAULT_TYPE_CACHE_CAPACITY};
pub use host::{HostLinker, DEFAULT_MEMBER_CACHE_CAPACITY};
pub use registry::{ContributedLinker, LinkerExporter, LinkerRegistry};
pub use services::LinkerServices;

use crate::descriptor::CallSiteDescriptor;
use crate::error::LinkResult;
use crate::invocation::GuardedInvocation;
use crate::value::{TypeKey, Value};

/// Everything a linker gets to see about a call that needs linking
#[derive(Debug, Clone, Copy)]
pub struct LinkRequest<'a> {
    descriptor: &'a CallSiteDescriptor,
    arguments: &'a [Value],
    call_site_unstable: bool,
}

impl<'a> LinkRequest<'a> {
    pub fn new(
        descriptor: &'a CallSiteDescriptor,
        arguments: &'a [Value],
        call_site_unstable: bool,
    ) -> Self {
        Self {
            descriptor,
            arguments,
            call_site_unstable,
        }
    }

    pub fn descriptor(&self) -> &'a CallSiteDescriptor {
        self.descriptor
    }

    pub fn arguments(&self) -> &'a [Value] {
        self.arguments
    }

    /// First argument, the object the operation is applied to
    pub fn receiver(&self) -> Option<&'a Value> {
        self.arguments.first()
    }

    pub fn receiver_type(&self) -> Option<TypeKey> {
        self.receiver().map(Value::type_key)
    }

    /// True once the call site relinked more often than the unstable threshold;
    /// linkers should then prefer more general invocations
    pub fn is_call_site_unstable(&self) -> bool {
        self.call_site_unstable
    }

    /// Same request with a different descriptor and arguments, for delegation
    pub fn with_arguments<'b>(
        &self,
        descriptor: &'b CallSiteDescriptor,
        arguments: &'b [Value],
    ) -> LinkRequest<'b> {
        LinkRequest {
            descriptor,
            arguments,
            call_site_unstable: self.call_site_unstable,
        }
    }
}

/// A linker for one object model
pub trait GuardingDynamicLinker: Send + Sync {
    /// Unique name, used for diagnostics and duplicate detection
    fn name(&self) -> &str;

    /// Produce an invocation for `request`, or `None` if this linker does not
    /// handle it
    fn get_guarded_invocation(
        &self,
        request: &LinkRequest<'_>,
        services: &LinkerServices,
    ) -> LinkResult<Option<GuardedInvocation>>;
}

/// A linker whose applicability depends only on the receiver's type
pub trait TypeBasedGuardingDynamicLinker: GuardingDynamicLinker {
    fn can_link_type(&self, key: TypeKey) -> bool;
}

type LinkFn = dyn Fn(&LinkRequest<'_>, &LinkerServices) -> LinkResult<Option<GuardedInvocation>>
    + Send
    + Sync;

/// Linker defined by a closure
pub struct FnLinker {
    name: String,
    link: Arc<LinkFn>,
}

impl FnLinker {
    pub fn new<F>(name: &str, link: F) -> Self
    where
        F: Fn(&LinkRequest<'_>, &LinkerServices) -> LinkResult<Option<GuardedInvocation>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            link: Arc::new(link),
        }
    }
}

impl GuardingDynamicLinker for FnLinker {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_guarded_invocation(
        &self,
        request: &LinkRequest<'_>,
        services: &LinkerServices,
    ) -> LinkResult<Option<GuardedInvocation>> {
        (self.link)(request, services)
    }
}

impl fmt::Debug for FnLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLinker").field("name", &self.name).finish()
    }
}
