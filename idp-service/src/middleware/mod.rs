pub mod authz;

pub use authz::{authz_middleware, Subject, APP_OWNER};
