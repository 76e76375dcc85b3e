//! Discovery of contributed linkers.
//!
//! Language runtimes contribute linkers through a [`LinkerExporter`]. An
//! exporter may restrict itself to a discovery scope; the factory only picks
//! up exporters that are global or whose scope matches its own.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{GuardingDynamicLinker, TypeBasedGuardingDynamicLinker};

/// A linker as contributed by an exporter
#[derive(Clone)]
pub enum ContributedLinker {
    Plain(Arc<dyn GuardingDynamicLinker>),
    TypeBased(Arc<dyn TypeBasedGuardingDynamicLinker>),
}

impl ContributedLinker {
    pub fn name(&self) -> &str {
        match self {
            ContributedLinker::Plain(l) => l.name(),
            ContributedLinker::TypeBased(l) => l.name(),
        }
    }

    pub fn is_type_based(&self) -> bool {
        matches!(self, ContributedLinker::TypeBased(_))
    }
}

impl fmt::Debug for ContributedLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContributedLinker::Plain(l) => f.debug_tuple("Plain").field(&l.name()).finish(),
            ContributedLinker::TypeBased(l) => f.debug_tuple("TypeBased").field(&l.name()).finish(),
        }
    }
}

/// Source of linkers for one language runtime
pub trait LinkerExporter: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Discovery scope; `None` means visible to every factory
    fn scope(&self) -> Option<&str> {
        None
    }

    fn linkers(&self) -> Vec<ContributedLinker>;
}

/// Registered exporters, in registration order
#[derive(Clone, Default)]
pub struct LinkerRegistry {
    exporters: Vec<Arc<dyn LinkerExporter>>,
}

impl LinkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, exporter: Arc<dyn LinkerExporter>) {
        debug!(
            target: "dynlink::factory",
            exporter = exporter.name(),
            scope = exporter.scope().unwrap_or("*"),
            "Registered linker exporter"
        );
        self.exporters.push(exporter);
    }

    pub fn with(mut self, exporter: Arc<dyn LinkerExporter>) -> Self {
        self.register(exporter);
        self
    }

    pub fn len(&self) -> usize {
        self.exporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }

    /// Linkers of every exporter visible from `scope`
    ///
    /// With `scope == None` every exporter is visible; otherwise only global
    /// exporters and those declaring exactly `scope`.
    pub fn discover(&self, scope: Option<&str>) -> Vec<ContributedLinker> {
        self.exporters
            .iter()
            .filter(|exporter| match (scope, exporter.scope()) {
                (None, _) | (_, None) => true,
                (Some(wanted), Some(declared)) => wanted == declared,
            })
            .flat_map(|exporter| exporter.linkers())
            .collect()
    }
}

impl fmt::Debug for LinkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkerRegistry")
            .field(
                "exporters",
                &self.exporters.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::FnLinker;

    struct Exporter {
        name: &'static str,
        scope: Option<&'static str>,
    }

    impl LinkerExporter for Exporter {
        fn name(&self) -> &str {
            self.name
        }

        fn scope(&self) -> Option<&str> {
            self.scope
        }

        fn linkers(&self) -> Vec<ContributedLinker> {
            vec![ContributedLinker::Plain(Arc::new(FnLinker::new(
                self.name,
                |_, _| Ok(None),
            )))]
        }
    }

    fn registry() -> LinkerRegistry {
        LinkerRegistry::new()
            .with(Arc::new(Exporter {
                name: "global",
                scope: None,
            }))
            .with(Arc::new(Exporter {
                name: "ruby",
                scope: Some("ruby"),
            }))
            .with(Arc::new(Exporter {
                name: "lua",
                scope: Some("lua"),
            }))
    }

    fn names(linkers: &[ContributedLinker]) -> Vec<&str> {
        linkers.iter().map(|l| l.name()).collect()
    }

    #[test]
    fn test_discover_all_without_scope() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(names(&registry.discover(None)), vec!["global", "ruby", "lua"]);
    }

    #[test]
    fn test_discover_scoped() {
        let registry = registry();
        assert_eq!(names(&registry.discover(Some("lua"))), vec!["global", "lua"]);
        assert_eq!(names(&registry.discover(Some("python"))), vec!["global"]);
    }
}
