use super::error::ServiceError;
use super::store::ObjectStore;
use crate::models::organization::{BUILT_IN_ORGANIZATION, MASKED_SECRET};
use crate::models::Organization;
use crate::utils::{Password, PasswordScheme};

/// Organization reads and updates. Master passwords leave this service masked.
#[derive(Clone)]
pub struct OrganizationService {
    store: ObjectStore,
}

impl OrganizationService {
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, name: &str) -> Option<Organization> {
        self.store
            .get_organization(name)
            .await
            .map(|org| org.masked())
    }

    pub async fn list(&self) -> Vec<Organization> {
        self.store
            .list_organizations()
            .await
            .iter()
            .map(Organization::masked)
            .collect()
    }

    /// Replace organization `name` with `update`.
    ///
    /// A master password of `***` keeps the stored hash, an empty one clears
    /// it, anything else is hashed with the organization's scheme. Renaming
    /// moves every object that refers to the organization in one batch.
    pub async fn update(&self, name: &str, mut update: Organization) -> Result<(), ServiceError> {
        let existing = self
            .store
            .get_organization(name)
            .await
            .ok_or_else(|| ServiceError::NotFound(format!("organization {} not found", name)))?;

        if name == BUILT_IN_ORGANIZATION && update.name != name {
            return Err(ServiceError::Forbidden(
                "the built-in organization cannot be renamed".to_string(),
            ));
        }

        update.created_time = existing.created_time;
        update.master_password = if update.master_password == MASKED_SECRET {
            existing.master_password
        } else if update.master_password.is_empty() {
            String::new()
        } else {
            let scheme: PasswordScheme = update
                .password_type
                .parse()
                .map_err(|e: crate::utils::PasswordError| ServiceError::BadRequest(e.to_string()))?;
            scheme.hash(
                &Password::new(update.master_password.clone()),
                "",
                &update.password_salt,
            )?
        };

        self.store.update_organization(name, update).await?;
        tracing::info!(organization = %name, "Organization updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn org(name: &str) -> Organization {
        Organization {
            owner: "admin".to_string(),
            name: name.to_string(),
            created_time: chrono::Utc::now(),
            display_name: name.to_string(),
            website_url: String::new(),
            password_type: "salt".to_string(),
            password_salt: "org-salt".to_string(),
            master_password: String::new(),
            default_avatar: String::new(),
        }
    }

    async fn service() -> (ObjectStore, OrganizationService) {
        let store = ObjectStore::new();
        store.add_organization(org(BUILT_IN_ORGANIZATION)).await.unwrap();
        store.add_organization(org("acme")).await.unwrap();
        (store.clone(), OrganizationService::new(store))
    }

    #[tokio::test]
    async fn test_master_password_hashed_and_masked() {
        let (store, service) = service().await;

        let mut update = org("acme");
        update.master_password = "master".to_string();
        service.update("acme", update).await.unwrap();

        let stored = store.get_organization("acme").await.unwrap();
        assert!(PasswordScheme::Salt.verify(
            &stored.master_password,
            &Password::new("master"),
            "",
            "org-salt"
        ));
        assert_eq!(service.get("acme").await.unwrap().master_password, MASKED_SECRET);

        // *** keeps the stored hash
        let mut update = org("acme");
        update.master_password = MASKED_SECRET.to_string();
        service.update("acme", update).await.unwrap();
        let kept = store.get_organization("acme").await.unwrap();
        assert_eq!(kept.master_password, stored.master_password);

        // empty clears it
        service.update("acme", org("acme")).await.unwrap();
        assert_eq!(store.get_organization("acme").await.unwrap().master_password, "");
    }

    #[tokio::test]
    async fn test_rename_moves_users() {
        let (store, service) = service().await;
        store.add_user(User::new("acme", "alice")).await.unwrap();

        service.update("acme", org("acme-corp")).await.unwrap();

        assert!(store.get_organization("acme").await.is_none());
        assert!(store.get_user("acme", "alice").await.is_none());
        assert!(store.get_user("acme-corp", "alice").await.is_some());
    }

    #[tokio::test]
    async fn test_built_in_cannot_be_renamed() {
        let (_, service) = service().await;
        let err = service
            .update(BUILT_IN_ORGANIZATION, org("renamed"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_rejected() {
        let (_, service) = service().await;
        let mut update = org("acme");
        update.password_type = "bcrypt".to_string();
        update.master_password = "master".to_string();
        assert!(matches!(
            service.update("acme", update).await,
            Err(ServiceError::BadRequest(_))
        ));
    }
}
