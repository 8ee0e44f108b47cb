//! In-memory platform definition registry with query support.

use crate::{
    definition::{PlatformDefinition, PlatformKind, RiskTier},
    error::{PlatformError, Result},
    loader::PlatformLoader,
};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use tradeveil_core::PlatformId;

/// In-memory cache of platform definitions with query capabilities.
///
/// The registry loads definitions from disk and caches them in memory for
/// fast lookups during scheduling. Definitions are only replaced by a
/// reload; history rows keep referencing a platform by ID even if a later
/// config change removes it from the registry.
#[derive(Clone)]
pub struct PlatformRegistry {
    /// Cached platform definitions, indexed by platform ID
    definitions: Arc<RwLock<HashMap<PlatformId, PlatformDefinition>>>,
}

impl PlatformRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a registry and load all definitions from the given loader.
    ///
    /// # Errors
    /// Returns error if loading fails; any invalid definition aborts the
    /// load (fail fast at startup).
    pub fn load_from(loader: &PlatformLoader) -> Result<Self> {
        let registry = Self::new();
        registry.reload(loader)?;
        Ok(registry)
    }

    /// Reload all platform definitions from the loader.
    ///
    /// This replaces the current cache with freshly loaded definitions.
    ///
    /// # Errors
    /// Returns error if loading fails; the existing cache is left untouched.
    pub fn reload(&self, loader: &PlatformLoader) -> Result<()> {
        let definitions = loader.load_all()?;

        let mut cache = self
            .definitions
            .write()
            .expect("acquire write lock on definitions");

        cache.clear();

        for definition in definitions {
            let platform_id = definition.id().clone();
            cache.insert(platform_id, definition);
        }

        info!(count = cache.len(), "reloaded platform definitions");

        Ok(())
    }

    /// Default scan cadence for a risk tier.
    ///
    /// Defaults: VeryHigh=7d, High=14d, Medium=30d, Low=90d. Individual
    /// platforms may override via `cadence_override_days`; use
    /// [`Self::cadence_of`] for the effective per-platform value.
    #[must_use]
    pub fn cadence_for(tier: RiskTier) -> Duration {
        Duration::days(i64::from(tier.cadence_days()))
    }

    /// Effective scan cadence for a specific platform (override-aware).
    ///
    /// # Errors
    /// Returns error if the platform is not in the registry.
    pub fn cadence_of(&self, platform_id: &PlatformId) -> Result<Duration> {
        Ok(self.get(platform_id)?.cadence())
    }

    /// Get a platform definition by ID.
    ///
    /// # Errors
    /// Returns error if the platform is not found.
    pub fn get(&self, platform_id: &PlatformId) -> Result<PlatformDefinition> {
        let cache = self
            .definitions
            .read()
            .expect("acquire read lock on definitions");

        cache
            .get(platform_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound {
                platform_id: platform_id.to_string(),
            })
    }

    /// Get all platform definitions.
    #[must_use]
    pub fn get_all(&self) -> Vec<PlatformDefinition> {
        let cache = self
            .definitions
            .read()
            .expect("acquire read lock on definitions");

        cache.values().cloned().collect()
    }

    /// Query platforms by kind.
    #[must_use]
    pub fn get_by_kind(&self, kind: PlatformKind) -> Vec<PlatformDefinition> {
        let cache = self
            .definitions
            .read()
            .expect("acquire read lock on definitions");

        cache
            .values()
            .filter(|def| def.kind() == kind)
            .cloned()
            .collect()
    }

    /// Query platforms by risk tier.
    #[must_use]
    pub fn get_by_tier(&self, tier: RiskTier) -> Vec<PlatformDefinition> {
        let cache = self
            .definitions
            .read()
            .expect("acquire read lock on definitions");

        cache
            .values()
            .filter(|def| def.risk_tier() == tier)
            .cloned()
            .collect()
    }

    /// Get the total number of platforms in the registry.
    #[must_use]
    pub fn count(&self) -> usize {
        let cache = self
            .definitions
            .read()
            .expect("acquire read lock on definitions");

        cache.len()
    }

    /// Check if a platform exists in the registry.
    #[must_use]
    pub fn contains(&self, platform_id: &PlatformId) -> bool {
        let cache = self
            .definitions
            .read()
            .expect("acquire read lock on definitions");

        cache.contains_key(platform_id)
    }

    /// Get all platform IDs in the registry.
    #[must_use]
    pub fn get_all_ids(&self) -> Vec<PlatformId> {
        let cache = self
            .definitions
            .read()
            .expect("acquire read lock on definitions");

        cache.keys().cloned().collect()
    }

    /// Add or update a platform definition in the registry.
    ///
    /// This is useful for testing or dynamic updates.
    pub fn insert(&self, definition: PlatformDefinition) -> Result<()> {
        definition.validate()?;

        let mut cache = self
            .definitions
            .write()
            .expect("acquire write lock on definitions");

        let platform_id = definition.id().clone();
        cache.insert(platform_id.clone(), definition);

        debug!(platform_id = %platform_id, "inserted platform definition");

        Ok(())
    }

    /// Remove a platform definition from the registry.
    ///
    /// Returns `true` if the platform was present, `false` otherwise.
    pub fn remove(&self, platform_id: &PlatformId) -> bool {
        let mut cache = self
            .definitions
            .write()
            .expect("acquire write lock on definitions");

        let removed = cache.remove(platform_id).is_some();

        if removed {
            debug!(platform_id = %platform_id, "removed platform definition");
        }

        removed
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new()
    }
}
