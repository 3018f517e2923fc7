//! Maps authenticated principals onto User resources

use crate::crd::{User, UserSpec};
use crate::store::Store;
use kubermatic_common::{user_id_for_email, Error, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn Store>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Return the user for `email`, creating it on first sight.
    ///
    /// An existing user is returned unmodified, even when `name` differs.
    pub async fn resolve_or_create(&self, email: &str, name: &str) -> Result<User> {
        let id = user_id_for_email(email);
        if let Some(user) = self.store.get_user(&id).await? {
            return Ok(user);
        }

        if email.is_empty() || name.is_empty() {
            return Err(Error::InvalidInput(
                "Email, ID and Name cannot be empty when creating a new user resource".to_string(),
            ));
        }

        let user = User::new(
            &id,
            UserSpec {
                name: name.to_string(),
                email: email.to_string(),
                is_admin: false,
            },
        );

        match self.store.create_user(user).await {
            Ok(user) => {
                info!(user_id = %id, email = %email, "created user");
                Ok(user)
            }
            // lost a race with a concurrent first login
            Err(e) if e.is_already_exists() => self
                .store
                .get_user(&id)
                .await?
                .ok_or_else(|| Error::not_found("users.kubermatic.k8c.io", &id)),
            Err(e) => Err(e),
        }
    }

    pub async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.store.get_user(id).await
    }

    /// Case-insensitive lookup by email
    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.store.get_user(&user_id_for_email(email)).await
    }
}
