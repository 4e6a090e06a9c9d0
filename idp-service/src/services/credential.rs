use std::sync::Arc;
use thiserror::Error;

use super::directory::{BindOutcome, DirectoryBinder};
use super::error::StoreError;
use super::store::ObjectStore;
use crate::models::{CredentialSource, User};
use crate::utils::{Password, PasswordScheme};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("the user does not exist, please sign up first")]
    UserNotFound,

    #[error("the user is forbidden to sign in, please contact the administrator")]
    Forbidden,

    #[error("organization does not exist")]
    OrganizationNotFound,

    #[error("password incorrect")]
    WrongPassword,

    #[error("multiple accounts with same uid, please check your ldap server")]
    DirectoryAmbiguous,

    #[error("ldap user name or password incorrect")]
    DirectoryRejected,

    /// Misconfigured organization; never retried.
    #[error("unsupported password type: {0}")]
    UnsupportedScheme(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CredentialError {
    /// True for failures caused by configuration rather than the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CredentialError::UnsupportedScheme(_) | CredentialError::Store(_)
        )
    }
}

/// Checks user passwords against stored hashes or directory servers.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: ObjectStore,
    directory: Arc<dyn DirectoryBinder>,
}

impl CredentialVerifier {
    pub fn new(store: ObjectStore, directory: Arc<dyn DirectoryBinder>) -> Self {
        Self { store, directory }
    }

    /// Look up `organization/username` and verify `password`.
    pub async fn check_user_password(
        &self,
        organization: &str,
        username: &str,
        password: &Password,
    ) -> Result<User, CredentialError> {
        let user = self
            .store
            .get_user(organization, username)
            .await
            .filter(|u| !u.is_deleted)
            .ok_or(CredentialError::UserNotFound)?;

        if user.is_forbidden {
            return Err(CredentialError::Forbidden);
        }

        self.verify_password(&user, password).await?;
        Ok(user)
    }

    pub async fn verify_password(
        &self,
        user: &User,
        supplied: &Password,
    ) -> Result<(), CredentialError> {
        match &user.credential_source {
            CredentialSource::Local => self.verify_local(user, supplied).await,
            CredentialSource::Directory { uid } => self.verify_directory(user, uid, supplied).await,
        }
    }

    async fn verify_local(&self, user: &User, supplied: &Password) -> Result<(), CredentialError> {
        let org = self
            .store
            .get_organization(&user.owner)
            .await
            .ok_or(CredentialError::OrganizationNotFound)?;

        let scheme: PasswordScheme = org
            .password_type
            .parse()
            .map_err(|_| CredentialError::UnsupportedScheme(org.password_type.clone()))?;

        if !org.master_password.is_empty()
            && scheme.verify(&org.master_password, supplied, "", &org.password_salt)
        {
            tracing::info!(user = %user.id_string(), "Signed in with organization master password");
            return Ok(());
        }

        if scheme.verify(&user.password, supplied, &user.password_salt, &org.password_salt) {
            Ok(())
        } else {
            Err(CredentialError::WrongPassword)
        }
    }

    async fn verify_directory(
        &self,
        user: &User,
        uid: &str,
        supplied: &Password,
    ) -> Result<(), CredentialError> {
        let servers = self.store.list_ldap_servers(&user.owner).await;

        for server in &servers {
            match self.directory.bind_user(server, uid, supplied).await {
                Ok(BindOutcome::Bound) => return Ok(()),
                Ok(BindOutcome::Ambiguous) => return Err(CredentialError::DirectoryAmbiguous),
                Ok(BindOutcome::NotFound) | Ok(BindOutcome::Rejected) => continue,
                Err(e) => {
                    tracing::warn!(server = %server.id, error = %e, "Directory server unavailable");
                    continue;
                }
            }
        }

        Err(CredentialError::DirectoryRejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LdapServer, Organization};
    use crate::services::directory::DirectoryError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Directory double answering per server id and recording call order.
    #[derive(Default)]
    struct ScriptedDirectory {
        answers: HashMap<String, Result<BindOutcome, DirectoryError>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DirectoryBinder for ScriptedDirectory {
        async fn bind_user(
            &self,
            server: &LdapServer,
            _uid: &str,
            _password: &Password,
        ) -> Result<BindOutcome, DirectoryError> {
            self.calls.lock().unwrap().push(server.id.clone());
            self.answers
                .get(&server.id)
                .cloned()
                .unwrap_or(Ok(BindOutcome::NotFound))
        }
    }

    fn organization(password_type: &str) -> Organization {
        Organization {
            owner: "admin".to_string(),
            name: "acme".to_string(),
            created_time: chrono::Utc::now(),
            display_name: "Acme".to_string(),
            website_url: String::new(),
            password_type: password_type.to_string(),
            password_salt: "org-salt".to_string(),
            master_password: String::new(),
            default_avatar: String::new(),
        }
    }

    fn ldap(id: &str) -> LdapServer {
        LdapServer {
            id: id.to_string(),
            owner: "acme".to_string(),
            server_name: String::new(),
            host: "ldap.acme.test".to_string(),
            port: 389,
            enable_ssl: false,
            username: "cn=admin".to_string(),
            password: "admin".to_string(),
            base_dn: "dc=acme".to_string(),
            filter: "(objectClass=posixAccount)".to_string(),
        }
    }

    async fn setup(
        org: Organization,
        directory: ScriptedDirectory,
    ) -> (ObjectStore, CredentialVerifier, Arc<ScriptedDirectory>) {
        let store = ObjectStore::new();
        let scheme: PasswordScheme = org.password_type.parse().unwrap_or(PasswordScheme::Plain);
        let org_salt = org.password_salt.clone();
        store.add_organization(org).await.unwrap();

        let mut alice = User::new("acme", "alice");
        alice.password_salt = "user-salt".to_string();
        alice.password = scheme
            .hash(&Password::new("correct"), "user-salt", &org_salt)
            .unwrap();
        store.add_user(alice).await.unwrap();

        let directory = Arc::new(directory);
        let verifier = CredentialVerifier::new(store.clone(), directory.clone());
        (store, verifier, directory)
    }

    #[tokio::test]
    async fn test_local_password() {
        let (_, verifier, _) = setup(organization("salt"), ScriptedDirectory::default()).await;

        let user = verifier
            .check_user_password("acme", "alice", &Password::new("correct"))
            .await
            .unwrap();
        assert_eq!(user.name, "alice");

        let err = verifier
            .check_user_password("acme", "alice", &Password::new("wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::WrongPassword));
    }

    #[tokio::test]
    async fn test_missing_deleted_and_forbidden_users() {
        let (store, verifier, _) = setup(organization("plain"), ScriptedDirectory::default()).await;

        let mut deleted = User::new("acme", "bob");
        deleted.password = "pw".to_string();
        deleted.is_deleted = true;
        store.add_user(deleted).await.unwrap();

        let mut banned = User::new("acme", "carol");
        banned.password = "pw".to_string();
        banned.is_forbidden = true;
        store.add_user(banned).await.unwrap();

        let pw = Password::new("pw");
        assert!(matches!(
            verifier.check_user_password("acme", "nobody", &pw).await,
            Err(CredentialError::UserNotFound)
        ));
        assert!(matches!(
            verifier.check_user_password("acme", "bob", &pw).await,
            Err(CredentialError::UserNotFound)
        ));
        let err = verifier
            .check_user_password("acme", "carol", &pw)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "the user is forbidden to sign in, please contact the administrator"
        );
    }

    #[tokio::test]
    async fn test_master_password_unlocks_local_users() {
        let mut org = organization("salt");
        org.master_password = PasswordScheme::Salt
            .hash(&Password::new("master"), "", "org-salt")
            .unwrap();
        let (_, verifier, _) = setup(org, ScriptedDirectory::default()).await;

        assert!(verifier
            .check_user_password("acme", "alice", &Password::new("master"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_fatal() {
        let (_, verifier, _) = setup(organization("bcrypt"), ScriptedDirectory::default()).await;

        let err = verifier
            .check_user_password("acme", "alice", &Password::new("correct"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "unsupported password type: bcrypt");
    }

    #[tokio::test]
    async fn test_directory_servers_tried_in_order() {
        let mut answers = HashMap::new();
        answers.insert("ldap-1".to_string(), Err(DirectoryError::Timeout));
        answers.insert("ldap-2".to_string(), Ok(BindOutcome::NotFound));
        answers.insert("ldap-3".to_string(), Ok(BindOutcome::Bound));
        answers.insert("ldap-4".to_string(), Ok(BindOutcome::Bound));
        let directory = ScriptedDirectory {
            answers,
            ..Default::default()
        };
        let (store, verifier, directory) = setup(organization("plain"), directory).await;

        for id in ["ldap-1", "ldap-2", "ldap-3", "ldap-4"] {
            store.add_ldap_server(ldap(id)).await.unwrap();
        }
        let mut dave = User::new("acme", "dave");
        dave.credential_source = CredentialSource::Directory {
            uid: "dave".to_string(),
        };
        store.add_user(dave).await.unwrap();

        assert!(verifier
            .check_user_password("acme", "dave", &Password::new("secret"))
            .await
            .is_ok());
        assert_eq!(
            *directory.calls.lock().unwrap(),
            vec!["ldap-1", "ldap-2", "ldap-3"]
        );
    }

    #[tokio::test]
    async fn test_ambiguous_directory_entry_stops_search() {
        let mut answers = HashMap::new();
        answers.insert("ldap-1".to_string(), Ok(BindOutcome::Ambiguous));
        answers.insert("ldap-2".to_string(), Ok(BindOutcome::Bound));
        let directory = ScriptedDirectory {
            answers,
            ..Default::default()
        };
        let (store, verifier, directory) = setup(organization("plain"), directory).await;

        store.add_ldap_server(ldap("ldap-1")).await.unwrap();
        store.add_ldap_server(ldap("ldap-2")).await.unwrap();
        let mut dave = User::new("acme", "dave");
        dave.credential_source = CredentialSource::Directory {
            uid: "dave".to_string(),
        };
        store.add_user(dave).await.unwrap();

        let err = verifier
            .check_user_password("acme", "dave", &Password::new("secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::DirectoryAmbiguous));
        assert_eq!(*directory.calls.lock().unwrap(), vec!["ldap-1"]);
    }

    #[tokio::test]
    async fn test_directory_rejection_after_all_servers() {
        let mut answers = HashMap::new();
        answers.insert("ldap-1".to_string(), Ok(BindOutcome::Rejected));
        let directory = ScriptedDirectory {
            answers,
            ..Default::default()
        };
        let (store, verifier, _) = setup(organization("plain"), directory).await;

        store.add_ldap_server(ldap("ldap-1")).await.unwrap();
        let mut dave = User::new("acme", "dave");
        dave.credential_source = CredentialSource::Directory {
            uid: "dave".to_string(),
        };
        store.add_user(dave).await.unwrap();

        let err = verifier
            .check_user_password("acme", "dave", &Password::new("secret"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ldap user name or password incorrect");
    }
}
