pub mod application;
pub mod authorization_code;
pub mod cert;
pub mod ldap_server;
pub mod organization;
pub mod token;
pub mod user;

pub use application::Application;
pub use authorization_code::{AuthorizationCode, CodeRequest, PkceChallenge};
pub use cert::Cert;
pub use ldap_server::LdapServer;
pub use organization::Organization;
pub use token::{IssuedTokens, Token};
pub use user::{split_owner_name, CredentialSource, User};
