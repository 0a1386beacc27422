//! Name-keyed registry of transport backends

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, TransportError};
use crate::flv::FlvTransport;
use crate::transport::MediaTransport;

type Constructor = Box<dyn Fn() -> Arc<dyn MediaTransport> + Send + Sync>;

/// Builds transports by name so the relay engine can be picked by configuration
pub struct TransportFactory {
    constructors: HashMap<String, Constructor>,
}

impl TransportFactory {
    /// An empty factory
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A factory with every built-in backend registered
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register(FlvTransport::NAME, || Arc::new(FlvTransport::new()));
        factory
    }

    /// Register a constructor, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn MediaTransport> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.constructors.insert(name.clone(), Box::new(constructor)).is_some() {
            tracing::debug!("Replaced transport constructor {}", name);
        }
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn MediaTransport>> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| TransportError::UnknownTransport(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransportFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}
