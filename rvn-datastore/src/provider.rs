//! Storage provider registry.
//!
//! Replaces runtime service-loader discovery with an explicit, in-process
//! list built at startup: a [`ProviderRegistry`] is handed its providers by
//! the caller rather than scanning a classpath for implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rvn_api_types::ReversionError;

use crate::config::Config;
use crate::repository::Repository;

/// One storage backend's create/open/check surface. This crate ships a
/// single implementation (the relational `db-v1` provider backing
/// [`Repository`]); the trait exists so a caller wiring a registry isn't
/// tied to that being the only one.
pub trait StorageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn default_config(&self) -> Config;
    fn check(&self, path: &Path) -> bool;
    fn open(&self, path: &Path) -> Result<Arc<Repository>, ReversionError>;
    fn create(&self, path: &Path, config: Config) -> Result<Arc<Repository>>;
}

/// The provider behind this crate's relational repository format.
pub struct DbProvider;

impl StorageProvider for DbProvider {
    fn name(&self) -> &str {
        crate::repository::PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "SQLite-backed content-addressed repository"
    }

    fn default_config(&self) -> Config {
        Config::new()
    }

    fn check(&self, path: &Path) -> bool {
        Repository::check(path)
    }

    fn open(&self, path: &Path) -> Result<Arc<Repository>, ReversionError> {
        Repository::open(path)
    }

    fn create(&self, path: &Path, config: Config) -> Result<Arc<Repository>> {
        Repository::create(path, config)
    }
}

/// A process-wide list of providers, consulted in registration order.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn StorageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry { providers: Vec::new() }
    }

    /// A registry containing just this crate's own provider — the
    /// starting point for a caller that doesn't need to add others.
    pub fn with_defaults() -> Self {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(DbProvider));
        registry
    }

    pub fn register(&mut self, provider: Box<dyn StorageProvider>) {
        self.providers.push(provider);
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn StorageProvider> {
        self.providers.iter().find(|p| p.name() == name).map(|p| p.as_ref())
    }

    /// The first registered provider whose `check` recognises `path`.
    pub fn find_by_check(&self, path: &Path) -> Option<&dyn StorageProvider> {
        self.providers.iter().find(|p| p.check(path)).map(|p| p.as_ref())
    }

    /// Opens `path` through whichever registered provider recognises it,
    /// or fails with `IncompatibleRepository` if none do.
    pub fn open_repository(&self, path: &Path) -> Result<Arc<Repository>, ReversionError> {
        match self.find_by_check(path) {
            Some(provider) => provider.open(path),
            None => Err(ReversionError::IncompatibleRepository {
                path: path.display().to_string(),
            }),
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        ProviderRegistry::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_repository_delegates_to_matching_provider() {
        let dir = tempfile::tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        Repository::create(&repo_path, Config::new()).unwrap();

        let registry = ProviderRegistry::with_defaults();
        let opened = registry.open_repository(&repo_path).unwrap();
        assert_eq!(opened.path(), repo_path);
    }

    #[test]
    fn open_repository_reports_incompatible_for_unknown_path() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProviderRegistry::with_defaults();
        let err = registry.open_repository(dir.path()).unwrap_err();
        assert!(matches!(err, ReversionError::IncompatibleRepository { .. }));
    }

    #[test]
    fn by_name_finds_the_registered_provider() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.by_name(crate::repository::PROVIDER_NAME).is_some());
        assert!(registry.by_name("nonexistent").is_none());
    }
}
