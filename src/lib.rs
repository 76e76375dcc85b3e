//! dynlink - Dynamic Call-Site Linking
//!
//! This library links dynamically-typed operations at call sites to concrete
//! targets at run time, caching what it linked behind guards so repeated
//! calls with the same kinds of arguments skip the lookup.
//!
//! # Architecture
//!
//! 1. **Operations and descriptors** (`operation`, `descriptor`)
//!    - `GET`, `SET`, `REMOVE`, `CALL`, `NEW` over `PROPERTY`, `ELEMENT`,
//!      `METHOD` namespaces, optionally named
//!    - A call site is described by its caller, operation and method shape
//!
//! 2. **Guarded invocations** (`invocation`)
//!    - A target plus the guard under which it is valid
//!    - Optional switch points and a "relink on" error kind
//!
//! 3. **Call sites** (`call_site`)
//!    - Monomorphic or chained (bounded inline cache, FIFO or megamorphic)
//!    - Chains are immutable snapshots read without locking
//!
//! 4. **Linkers** (`linker`, `factory`, `dynamic_linker`)
//!    - Prioritized, discovered and fallback linkers composed in order
//!    - The host-object-model linker is the default fallback
//!
//! # Example
//!
//! ```rust
//! use dynlink::*;
//!
//! let linker = DynamicLinkerFactory::new().build().unwrap();
//! let site = linker
//!     .bootstrap_str(CallerContext::new("demo"), "GET:PROPERTY|ELEMENT:color", MethodShape::generic(1))
//!     .unwrap();
//!
//! let red = ClassBuilder::new("Red").field("color", Value::str("red")).build();
//! let obj = Value::object(Instance::new(&red));
//! assert_eq!(site.invoke(&[obj]).unwrap(), Value::str("red"));
//!
//! let map = Value::map([("color", Value::str("blue"))]);
//! assert_eq!(site.invoke(&[map]).unwrap(), Value::str("blue"));
//! assert_eq!(site.stats().chain_length, 2);
//! ```

pub mod call_site;
pub mod config;
pub mod descriptor;
pub mod dynamic_linker;
pub mod error;
pub mod factory;
pub mod invocation;
pub mod linker;
pub mod operation;
pub mod value;

pub use call_site::{
    CallSite, CallSiteStats, ChainedCallSite, CodeUnit, EvictionPolicy, LinkState,
    MonomorphicCallSite, RelinkableCallSite, SitePolicy,
};
pub use config::{ConfigError, LinkerConfig, SiteKind};
pub use descriptor::{CallSiteDescriptor, CallerContext, MethodShape};
pub use dynamic_linker::DynamicLinker;
pub use error::{GuardError, InvocationError, InvocationErrorKind, LinkError, LinkResult};
pub use factory::{DynamicLinkerFactory, PrelinkFilter};
pub use invocation::{Arity, Guard, GuardedInvocation, SwitchPoint, Target};
pub use linker::{
    GuardingDynamicLinker, HostLinker, LinkRequest, LinkerExporter, LinkerRegistry,
    LinkerServices, TypeBasedGuardingDynamicLinker,
};
pub use operation::{Operation, StandardNamespace, StandardOperation};
pub use value::{ClassBuilder, Foreign, Instance, TypeKey, TypeSig, Value};
