use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Directory server used to authenticate delegated accounts of an organization.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LdapServer {
    pub id: String,
    /// Organization that owns the server.
    pub owner: String,
    #[serde(default)]
    pub server_name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub enable_ssl: bool,
    /// DN used for the admin bind that precedes the user search.
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub base_dn: String,
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "(objectClass=posixAccount)".to_string()
}

impl LdapServer {
    pub fn url(&self) -> String {
        let scheme = if self.enable_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Search filter for `uid`, escaped.
    pub fn user_filter(&self, uid: &str) -> String {
        format!("(&{}(uid={}))", self.filter, ldap3::ldap_escape(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_filter_escapes_uid() {
        let server = LdapServer {
            id: "ldap-built-in".to_string(),
            owner: "built-in".to_string(),
            server_name: "BuildIn LDAP Server".to_string(),
            host: "example.com".to_string(),
            port: 389,
            enable_ssl: false,
            username: "cn=buildin,dc=example,dc=com".to_string(),
            password: "123".to_string(),
            base_dn: "ou=BuildIn,dc=example,dc=com".to_string(),
            filter: default_filter(),
        };

        assert_eq!(server.url(), "ldap://example.com:389");
        assert_eq!(
            server.user_filter("alice*)(uid=*"),
            r"(&(objectClass=posixAccount)(uid=alice\2a\29\28uid=\2a))"
        );
    }
}
