use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::StoreError;
use crate::models::{Application, Cert, LdapServer, Organization, User};

#[derive(Default)]
struct Objects {
    organizations: BTreeMap<String, Organization>,
    applications: BTreeMap<String, Application>,
    users: BTreeMap<(String, String), User>,
    certs: BTreeMap<(String, String), Cert>,
    /// Insertion order is the order servers are tried in.
    ldap_servers: Vec<LdapServer>,
}

/// Organizations, applications, users, certificates and LDAP servers.
///
/// Every mutation runs under one write lock, so multi-object changes such as
/// an organization rename are applied as a single batch.
#[derive(Clone, Default)]
pub struct ObjectStore {
    inner: Arc<RwLock<Objects>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_organization(&self, name: &str) -> Option<Organization> {
        self.inner.read().await.organizations.get(name).cloned()
    }

    pub async fn list_organizations(&self) -> Vec<Organization> {
        self.inner.read().await.organizations.values().cloned().collect()
    }

    pub async fn add_organization(&self, org: Organization) -> Result<(), StoreError> {
        let mut objects = self.inner.write().await;
        if objects.organizations.contains_key(&org.name) {
            return Err(StoreError::Conflict(format!("organization {}", org.name)));
        }
        objects.organizations.insert(org.name.clone(), org);
        Ok(())
    }

    /// Replace organization `name` with `org`. When the name changes, every
    /// application, user, certificate and LDAP server that refers to the old
    /// name is moved in the same batch.
    pub async fn update_organization(&self, name: &str, org: Organization) -> Result<(), StoreError> {
        let mut objects = self.inner.write().await;
        if !objects.organizations.contains_key(name) {
            return Err(StoreError::NotFound(format!("organization {}", name)));
        }

        if org.name == name {
            objects.organizations.insert(org.name.clone(), org);
            return Ok(());
        }

        if objects.organizations.contains_key(&org.name) {
            return Err(StoreError::Conflict(format!("organization {}", org.name)));
        }

        let new_name = org.name.clone();
        objects.organizations.remove(name);
        objects.organizations.insert(new_name.clone(), org);

        for app in objects.applications.values_mut() {
            if app.organization == name {
                app.organization = new_name.clone();
            }
        }

        let moved: Vec<(String, String)> = objects
            .users
            .keys()
            .filter(|(owner, _)| owner == name)
            .cloned()
            .collect();
        for key in moved {
            if let Some(mut user) = objects.users.remove(&key) {
                user.owner = new_name.clone();
                objects.users.insert((new_name.clone(), key.1), user);
            }
        }

        let moved: Vec<(String, String)> = objects
            .certs
            .keys()
            .filter(|(owner, _)| owner == name)
            .cloned()
            .collect();
        for key in moved {
            if let Some(mut cert) = objects.certs.remove(&key) {
                cert.owner = new_name.clone();
                objects.certs.insert((new_name.clone(), key.1), cert);
            }
        }

        for server in objects.ldap_servers.iter_mut() {
            if server.owner == name {
                server.owner = new_name.clone();
            }
        }

        tracing::info!(from = %name, to = %new_name, "Organization renamed");
        Ok(())
    }

    pub async fn get_application(&self, name: &str) -> Option<Application> {
        self.inner.read().await.applications.get(name).cloned()
    }

    pub async fn get_application_by_client_id(&self, client_id: &str) -> Option<Application> {
        if client_id.is_empty() {
            return None;
        }
        self.inner
            .read()
            .await
            .applications
            .values()
            .find(|app| app.client_id == client_id)
            .cloned()
    }

    pub async fn list_applications(&self) -> Vec<Application> {
        self.inner.read().await.applications.values().cloned().collect()
    }

    pub async fn add_application(&self, app: Application) -> Result<(), StoreError> {
        app.validate().map_err(StoreError::Invalid)?;
        let mut objects = self.inner.write().await;
        if objects.applications.contains_key(&app.name) {
            return Err(StoreError::Conflict(format!("application {}", app.name)));
        }
        if objects
            .applications
            .values()
            .any(|existing| existing.client_id == app.client_id)
        {
            return Err(StoreError::Conflict(format!("client id {}", app.client_id)));
        }
        objects.applications.insert(app.name.clone(), app);
        Ok(())
    }

    pub async fn get_user(&self, owner: &str, name: &str) -> Option<User> {
        self.inner
            .read()
            .await
            .users
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn add_user(&self, user: User) -> Result<(), StoreError> {
        let mut objects = self.inner.write().await;
        let key = (user.owner.clone(), user.name.clone());
        if objects.users.contains_key(&key) {
            return Err(StoreError::Conflict(format!("user {}", user.id_string())));
        }
        objects.users.insert(key, user);
        Ok(())
    }

    pub async fn find_user_by_external_id(
        &self,
        owner: &str,
        provider: &str,
        external_id: &str,
    ) -> Option<User> {
        self.inner
            .read()
            .await
            .users
            .values()
            .find(|u| {
                u.owner == owner
                    && u.external_ids.get(provider).map(String::as_str) == Some(external_id)
            })
            .cloned()
    }

    /// Return the user linked to (`provider`, `external_id`), inserting
    /// `candidate` when there is none. The flag is true when inserted.
    pub async fn get_or_insert_external_user(
        &self,
        provider: &str,
        external_id: &str,
        candidate: User,
    ) -> Result<(User, bool), StoreError> {
        let mut objects = self.inner.write().await;

        if let Some(existing) = objects.users.values().find(|u| {
            u.owner == candidate.owner
                && u.external_ids.get(provider).map(String::as_str) == Some(external_id)
        }) {
            return Ok((existing.clone(), false));
        }

        let key = (candidate.owner.clone(), candidate.name.clone());
        if objects.users.contains_key(&key) {
            return Err(StoreError::Conflict(format!("user {}", candidate.id_string())));
        }

        let mut user = candidate;
        user.external_ids
            .insert(provider.to_string(), external_id.to_string());
        objects.users.insert(key, user.clone());
        Ok((user, true))
    }

    pub async fn get_cert(&self, owner: &str, name: &str) -> Option<Cert> {
        self.inner
            .read()
            .await
            .certs
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn list_certs(&self, owner: &str) -> Vec<Cert> {
        self.inner
            .read()
            .await
            .certs
            .values()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect()
    }

    pub async fn add_cert(&self, cert: Cert) -> Result<(), StoreError> {
        let mut objects = self.inner.write().await;
        let key = (cert.owner.clone(), cert.name.clone());
        if objects.certs.contains_key(&key) {
            return Err(StoreError::Conflict(format!("cert {}", cert.id())));
        }
        objects.certs.insert(key, cert);
        Ok(())
    }

    pub async fn list_ldap_servers(&self, owner: &str) -> Vec<LdapServer> {
        self.inner
            .read()
            .await
            .ldap_servers
            .iter()
            .filter(|s| s.owner == owner)
            .cloned()
            .collect()
    }

    pub async fn add_ldap_server(&self, server: LdapServer) -> Result<(), StoreError> {
        let mut objects = self.inner.write().await;
        if objects.ldap_servers.iter().any(|s| s.id == server.id) {
            return Err(StoreError::Conflict(format!("ldap server {}", server.id)));
        }
        objects.ldap_servers.push(server);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn org(name: &str) -> Organization {
        Organization {
            owner: "admin".to_string(),
            name: name.to_string(),
            created_time: Utc::now(),
            display_name: name.to_string(),
            website_url: String::new(),
            password_type: "plain".to_string(),
            password_salt: String::new(),
            master_password: String::new(),
            default_avatar: String::new(),
        }
    }

    fn app(name: &str, organization: &str) -> Application {
        Application {
            owner: "admin".to_string(),
            name: name.to_string(),
            created_time: Utc::now(),
            display_name: String::new(),
            organization: organization.to_string(),
            cert: "cert-built-in".to_string(),
            client_id: format!("{}-client", name),
            client_secret: "secret".to_string(),
            redirect_uris: vec![],
            grant_types: vec![],
            expire_in_hours: 1,
            refresh_expire_in_hours: 0,
            enable_sign_up: true,
        }
    }

    fn ldap(id: &str, owner: &str) -> LdapServer {
        LdapServer {
            id: id.to_string(),
            owner: owner.to_string(),
            server_name: id.to_string(),
            host: "ldap.example.com".to_string(),
            port: 389,
            enable_ssl: false,
            username: "cn=admin".to_string(),
            password: "pw".to_string(),
            base_dn: "dc=example".to_string(),
            filter: "(objectClass=posixAccount)".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rename_cascades_in_one_batch() {
        let store = ObjectStore::new();
        store.add_organization(org("acme")).await.expect("org");
        store.add_organization(org("other")).await.expect("org");
        store.add_application(app("app-acme", "acme")).await.expect("app");
        store.add_application(app("app-other", "other")).await.expect("app");
        store.add_user(User::new("acme", "alice")).await.expect("user");
        store.add_user(User::new("other", "bob")).await.expect("user");
        store.add_ldap_server(ldap("ldap-1", "acme")).await.expect("ldap");

        store
            .update_organization("acme", org("acme-corp"))
            .await
            .expect("rename");

        assert!(store.get_organization("acme").await.is_none());
        assert!(store.get_organization("acme-corp").await.is_some());
        assert_eq!(
            store.get_application("app-acme").await.expect("app").organization,
            "acme-corp"
        );
        assert_eq!(
            store.get_application("app-other").await.expect("app").organization,
            "other"
        );
        assert!(store.get_user("acme", "alice").await.is_none());
        assert_eq!(
            store.get_user("acme-corp", "alice").await.expect("user").owner,
            "acme-corp"
        );
        assert!(store.get_user("other", "bob").await.is_some());
        assert_eq!(store.list_ldap_servers("acme-corp").await.len(), 1);
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name_conflicts() {
        let store = ObjectStore::new();
        store.add_organization(org("acme")).await.expect("org");
        store.add_organization(org("other")).await.expect("org");

        let err = store
            .update_organization("acme", org("other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.get_organization("acme").await.is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_rejected() {
        let store = ObjectStore::new();
        let mut broken = app("app-broken", "acme");
        broken.expire_in_hours = 10_000_000_000_000;

        let err = store.add_application(broken).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(store.get_application("app-broken").await.is_none());
    }

    #[tokio::test]
    async fn test_external_user_insert_is_idempotent() {
        let store = ObjectStore::new();

        let (first, created) = store
            .get_or_insert_external_user("wechat", "ext-1", User::new("acme", "ext-1"))
            .await
            .expect("insert");
        assert!(created);

        let (second, created) = store
            .get_or_insert_external_user("wechat", "ext-1", User::new("acme", "ext-1-dup"))
            .await
            .expect("lookup");
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert!(store
            .find_user_by_external_id("acme", "wechat", "ext-1")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_client_id_lookup_and_uniqueness() {
        let store = ObjectStore::new();
        store.add_application(app("one", "acme")).await.expect("app");

        assert!(store.get_application_by_client_id("one-client").await.is_some());
        assert!(store.get_application_by_client_id("").await.is_none());

        let mut dup = app("two", "acme");
        dup.client_id = "one-client".to_string();
        assert!(store.add_application(dup).await.is_err());
    }

    #[tokio::test]
    async fn test_ldap_servers_keep_insertion_order() {
        let store = ObjectStore::new();
        store.add_ldap_server(ldap("b", "acme")).await.expect("ldap");
        store.add_ldap_server(ldap("a", "acme")).await.expect("ldap");
        store.add_ldap_server(ldap("c", "other")).await.expect("ldap");

        let ids: Vec<String> = store
            .list_ldap_servers("acme")
            .await
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
