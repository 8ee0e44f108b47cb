//! Client identifying terms.
//!
//! The terms a scanner searches a platform for: the client's legal entity
//! name plus the aliases and registration numbers their shipments are filed
//! under. Term storage belongs to the enrollment side of the product; the
//! engine consumes terms through the [`TermsSource`] seam.

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A client's registered identifying terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTerms {
    /// Legal entity name
    pub company_name: String,
    /// Trading names and historical spellings
    pub aliases: Vec<String>,
    /// Tax/registration numbers shipments may be filed under
    pub registration_numbers: Vec<String>,
}

impl ClientTerms {
    /// Terms consisting of just a company name.
    #[must_use]
    pub fn for_company(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            aliases: Vec::new(),
            registration_numbers: Vec::new(),
        }
    }

    /// All searchable terms, company name first.
    #[must_use]
    pub fn search_terms(&self) -> Vec<&str> {
        std::iter::once(self.company_name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .chain(self.registration_numbers.iter().map(String::as_str))
            .collect()
    }
}

/// Resolves a client's identifying terms.
#[async_trait]
pub trait TermsSource: Send + Sync {
    /// Get the terms registered for a client.
    ///
    /// # Errors
    /// Returns [`ScanError::UnknownClient`] if the client has no terms.
    async fn terms_for(&self, client_id: &str) -> Result<ClientTerms>;
}

/// In-memory terms source.
///
/// Suitable for tests and for deployments that load enrollment data at
/// startup.
#[derive(Debug, Clone, Default)]
pub struct StaticTermsSource {
    terms: HashMap<String, ClientTerms>,
}

impl StaticTermsSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register terms for a client.
    pub fn insert(&mut self, client_id: impl Into<String>, terms: ClientTerms) {
        self.terms.insert(client_id.into(), terms);
    }
}

#[async_trait]
impl TermsSource for StaticTermsSource {
    async fn terms_for(&self, client_id: &str) -> Result<ClientTerms> {
        self.terms
            .get(client_id)
            .cloned()
            .ok_or_else(|| ScanError::UnknownClient {
                client_id: client_id.to_string(),
            })
    }
}
