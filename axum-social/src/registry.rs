use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{OAuthError, Provider, Result};

/// Registered providers, keyed by [`Provider::name`].
///
/// Cheap to clone, clones share the same map. Safe to use from concurrent
/// request handlers.
#[derive(Clone, Default)]
pub struct Providers(Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>);

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the provider under its name. A provider registered earlier under
    /// the same name is replaced.
    pub fn register(&self, provider: impl Provider) {
        self.register_arc(Arc::new(provider));
    }

    pub fn register_arc(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_owned();
        tracing::debug!("registering provider {name}");
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, provider);
    }

    pub fn register_all(&self, providers: impl IntoIterator<Item = Arc<dyn Provider>>) {
        for provider in providers {
            self.register_arc(provider);
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| OAuthError::ProviderNotFound(name.to_owned()))
    }

    /// Snapshot of the registered providers, in no particular order.
    pub fn list(&self) -> Vec<Arc<dyn Provider>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.0.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl FromIterator<Arc<dyn Provider>> for Providers {
    fn from_iter<T: IntoIterator<Item = Arc<dyn Provider>>>(iter: T) -> Self {
        let providers = Providers::new();
        providers.register_all(iter);
        providers
    }
}
