use std::sync::Arc;

use crate::capability::{Batcher, MaterialBatcher, MeshSimplifier, PassthroughBatcher, PassthroughSimplifier};
use crate::error::BuildError;

type SimplifierFactory = Box<dyn Fn() -> Arc<dyn MeshSimplifier> + Send + Sync>;
type BatcherFactory = Box<dyn Fn() -> Arc<dyn Batcher> + Send + Sync>;

/// Name-keyed table of simplifier and batcher factories.
///
/// Populated once at start-up by whatever provides implementations. Lookup
/// by name; with no name configured the first registration wins.
#[derive(Default)]
pub struct CapabilityRegistry {
    simplifiers: Vec<(String, SimplifierFactory)>,
    batchers: Vec<(String, BatcherFactory)>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies: `passthrough` simplifier,
    /// `passthrough` and `material` batchers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_simplifier("passthrough", || Arc::new(PassthroughSimplifier));
        registry.register_batcher("passthrough", || Arc::new(PassthroughBatcher));
        registry.register_batcher("material", || Arc::new(MaterialBatcher));
        registry
    }

    /// Register (or replace) a simplifier under `name`.
    pub fn register_simplifier(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Arc<dyn MeshSimplifier> + Send + Sync + 'static,
    ) {
        let name = name.into();
        tracing::debug!(%name, "registered mesh simplifier");
        self.simplifiers.retain(|(n, _)| *n != name);
        self.simplifiers.push((name, Box::new(factory)));
    }

    /// Register (or replace) a batcher under `name`.
    pub fn register_batcher(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Arc<dyn Batcher> + Send + Sync + 'static,
    ) {
        let name = name.into();
        tracing::debug!(%name, "registered batcher");
        self.batchers.retain(|(n, _)| *n != name);
        self.batchers.push((name, Box::new(factory)));
    }

    pub fn simplifier_names(&self) -> Vec<&str> {
        self.simplifiers.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn batcher_names(&self) -> Vec<&str> {
        self.batchers.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.simplifiers.is_empty() && self.batchers.is_empty()
    }

    /// Instantiate the simplifier named `choice`, or the first registered one.
    pub fn resolve_simplifier(
        &self,
        choice: Option<&str>,
    ) -> Result<(String, Arc<dyn MeshSimplifier>), BuildError> {
        resolve(&self.simplifiers, choice).ok_or_else(|| BuildError::SimplifierUnavailable {
            name: choice.unwrap_or("<default>").to_string(),
        })
    }

    /// Instantiate the batcher named `choice`, or the first registered one.
    pub fn resolve_batcher(
        &self,
        choice: Option<&str>,
    ) -> Result<(String, Arc<dyn Batcher>), BuildError> {
        resolve(&self.batchers, choice).ok_or_else(|| BuildError::BatcherUnavailable {
            name: choice.unwrap_or("<default>").to_string(),
        })
    }
}

fn resolve<T: ?Sized>(
    table: &[(String, Box<dyn Fn() -> Arc<T> + Send + Sync>)],
    choice: Option<&str>,
) -> Option<(String, Arc<T>)> {
    let (name, factory) = match choice {
        Some(wanted) => table.iter().find(|(n, _)| n == wanted)?,
        None => table.first()?,
    };
    Some((name.clone(), factory()))
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("simplifiers", &self.simplifier_names())
            .field("batchers", &self.batcher_names())
            .finish()
    }
}
