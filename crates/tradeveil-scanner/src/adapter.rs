//! Scanner adapter contract and adapter set.

use crate::error::Result;
use crate::terms::ClientTerms;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tradeveil_platform::PlatformDefinition;

/// What a scanner found on a platform.
///
/// `exposed_count == 0` is an explicit, positive "no exposure" statement.
/// An adapter that cannot determine the answer must return an error — most
/// often [`crate::ScanError::MalformedResponse`] — never an empty report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Number of exposed records found
    pub exposed_count: u32,
    /// Trading partner named in the exposed records, if identifiable
    pub partner_company: Option<String>,
    /// Country of the named trading partner, if identifiable
    pub partner_country: Option<String>,
    /// Raw capture backing the finding (page snapshot, API payload)
    pub evidence: Option<Vec<u8>>,
}

impl ScanReport {
    /// A report stating explicitly that nothing was found.
    #[must_use]
    pub fn clear() -> Self {
        Self {
            exposed_count: 0,
            partner_company: None,
            partner_country: None,
            evidence: None,
        }
    }
}

/// Checks one platform for a client's shipment data.
///
/// One implementation per monitored platform (or per platform family
/// sharing a wire format). Implementations live with the integration code,
/// outside the engine.
#[async_trait]
pub trait ScannerAdapter: Send + Sync {
    /// The scanner reference platform definitions bind to.
    fn name(&self) -> &str;

    /// Run one check of `platform` for the given terms.
    async fn scan(&self, platform: &PlatformDefinition, terms: &ClientTerms) -> Result<ScanReport>;
}

/// Registry of scanner adapters, keyed by scanner reference.
#[derive(Clone, Default)]
pub struct ScannerSet {
    adapters: HashMap<String, Arc<dyn ScannerAdapter>>,
}

impl ScannerSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name.
    pub fn register(&mut self, adapter: Arc<dyn ScannerAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Look up an adapter by scanner reference.
    #[must_use]
    pub fn get(&self, scanner_ref: &str) -> Option<Arc<dyn ScannerAdapter>> {
        self.adapters.get(scanner_ref).cloned()
    }

    /// Whether an adapter is registered for the reference.
    #[must_use]
    pub fn contains(&self, scanner_ref: &str) -> bool {
        self.adapters.contains_key(scanner_ref)
    }

    /// All registered scanner references.
    #[must_use]
    pub fn refs(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}
