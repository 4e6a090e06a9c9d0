pub mod crypto;
pub mod params;
pub mod password;

pub use crypto::{pkce_challenge, pkce_matches, random_token};
pub use params::{basic_credentials, bearer_token, OAuthParams};
pub use password::{secure_eq, Password, PasswordError, PasswordScheme};
