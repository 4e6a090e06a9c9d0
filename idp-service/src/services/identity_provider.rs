use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Identity asserted by an external provider after a code exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Provider-assigned id, stable across sign-ins.
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar: String,
    pub email: String,
}

#[derive(Error, Debug)]
pub enum IdentityProviderError {
    #[error("code exchange rejected: {0}")]
    Rejected(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Exchanges a provider authorization code for the identity behind it.
#[async_trait]
pub trait ExternalIdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity, IdentityProviderError>;
}

/// Providers by tag, as sent in the `tag` parameter of the password grant.
#[derive(Clone, Default)]
pub struct IdentityProviders {
    providers: Arc<HashMap<String, Arc<dyn ExternalIdentityProvider>>>,
}

impl IdentityProviders {
    pub fn new(providers: HashMap<String, Arc<dyn ExternalIdentityProvider>>) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn ExternalIdentityProvider>> {
        self.providers.get(tag).cloned()
    }
}
