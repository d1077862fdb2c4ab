use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::auth::{hash_password, verify_password, PasswordError};
use crate::database::models::User;
use crate::database::repository::{ParentRepository, RepositoryError};
use crate::database::store::DocumentStore;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Username is already in use")]
    UsernameTaken,

    /// Covers both "no such user" and "wrong password"; callers must not be
    /// able to tell which field was wrong.
    #[error("Invalid password")]
    InvalidCredentials,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Signup and login against the `users` collection.
#[derive(Clone)]
pub struct AccountService {
    users: ParentRepository<User>,
}

impl AccountService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { users: ParentRepository::new(store, "users") }
    }

    /// Register a new credential record.
    ///
    /// Lookup by username, then create. A taken username fails with zero
    /// side effects. The check and the create are two store calls, so two
    /// concurrent signups for the same name can both pass the check; the
    /// store carries no unique constraint and the race stands as inherited
    /// behavior.
    pub async fn signup(
        &self,
        user_name: &str,
        raw_password: &str,
        email_address: Vec<String>,
    ) -> Result<User, AccountError> {
        if self.users.find_by_field("userName", user_name).await?.is_some() {
            return Err(AccountError::UsernameTaken);
        }

        let user = User {
            id: None,
            user_name: user_name.to_string(),
            password: hash_password(raw_password)?,
            email_address,
        };

        let created = self.users.insert(&user).await?;
        info!(user_name, "registered user");
        Ok(created)
    }

    /// One-shot password verification. No session, no token.
    pub async fn login(&self, user_name: &str, raw_password: &str) -> Result<(), AccountError> {
        let user = self
            .users
            .find_by_field("userName", user_name)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        if verify_password(raw_password, &user.password) {
            Ok(())
        } else {
            Err(AccountError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    fn service(store: Arc<MemoryStore>) -> AccountService {
        AccountService::new(store)
    }

    #[tokio::test]
    async fn signup_stores_a_hash_not_the_password() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(store);

        let user = accounts
            .signup("drachwalik", "s3cret", vec!["d@example.com".to_string()])
            .await
            .unwrap();

        assert!(user.id.is_some());
        assert_ne!(user.password, "s3cret");
        assert!(user.password.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn duplicate_signup_fails_without_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(store.clone());

        accounts.signup("drachwalik", "s3cret", vec![]).await.unwrap();
        let result = accounts.signup("drachwalik", "other", vec![]).await;

        assert!(matches!(result, Err(AccountError::UsernameTaken)));
        assert_eq!(store.count("users").await, 1);
    }

    #[tokio::test]
    async fn login_accepts_the_right_password_only() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(store);

        accounts.signup("drachwalik", "s3cret", vec![]).await.unwrap();

        assert!(accounts.login("drachwalik", "s3cret").await.is_ok());
        assert!(matches!(
            accounts.login("drachwalik", "wrong").await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_indistinguishable() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(store);

        accounts.signup("drachwalik", "s3cret", vec![]).await.unwrap();

        let wrong_password = accounts.login("drachwalik", "nope").await.unwrap_err();
        let unknown_user = accounts.login("nobody", "nope").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }
}
