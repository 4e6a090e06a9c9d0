//! Services layer for the identity provider.
//!
//! Credential checks, token storage, JWT minting and parsing, the OAuth
//! grants, request policy and boot data.

pub mod credential;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod identity_provider;
pub mod init;
pub mod jwt;
pub mod metrics;
pub mod oauth;
pub mod organization;
pub mod policy;
pub mod redis;
pub mod store;
pub mod token_store;

pub use credential::{CredentialError, CredentialVerifier};
pub use directory::{BindOutcome, DirectoryBinder, DirectoryError, Ldap3Directory};
pub use error::{OAuthError, OAuthErrorCode, ServiceError, StoreError};
pub use identity_provider::{ExternalIdentity, ExternalIdentityProvider, IdentityProviders};
pub use jwt::{Claims, JwtError, JwtService, TokenKind};
pub use oauth::{LogoutOutcome, OAuthService, ADMIN_OWNER};
pub use organization::OrganizationService;
pub use policy::{PolicyMatcher, PolicyRequest, PolicyRule};
pub use redis::RedisTokenStore;
pub use store::ObjectStore;
pub use token_store::{MemoryTokenStore, TokenStore};
