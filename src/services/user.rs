//! User service
//!
//! Account business logic on top of the credential store:
//! - signup with field-level validation
//! - credential check for login
//! - password change for the signed-in principal
//! - user listing, editing and deletion for administrators
//!
//! Session cookies are not touched here; the API layer hands the verified
//! user to the session manager.

use crate::db::repositories::UserRepository;
use crate::models::{User, UserRole};
use crate::services::identity::Identity;
use crate::services::password::{hash_password, password_policy_violations, verify_password};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Minimum username length after trimming
pub const MIN_USERNAME_LENGTH: usize = 2;

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Validation messages keyed by form field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors holding a single message for one field
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages for one field
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Input failed validation
    #[error("Invalid fields. Please check your input.")]
    ValidationError(FieldErrors),

    /// Username or email already taken
    #[error("Unique constraint violation.")]
    UserExists(FieldErrors),

    /// Wrong email or password at login
    #[error("Invalid credentials")]
    AuthenticationError(FieldErrors),

    /// No identity, or the old password did not match
    #[error("{0}")]
    Unauthorized(String),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for signup
#[derive(Debug, Clone, Deserialize)]
pub struct SignupInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "confirmPassword")]
    pub confirm_password: String,
}

impl SignupInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            confirm_password: confirm_password.into(),
        }
    }
}

/// Input for login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Administrator edit of a user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
}

/// Account operations
pub struct UserService {
    users: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Create an account with the default role. Does not sign the user in.
    pub async fn signup(&self, input: SignupInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        let password = input.password.trim();

        let mut errors = FieldErrors::new();
        if username.chars().count() < MIN_USERNAME_LENGTH {
            errors.add("username", "Name must be at least 2 characters long.");
        }
        if !is_valid_email(&email) {
            errors.add("email", "Please enter a valid email.");
        }
        for violation in password_policy_violations(password) {
            errors.add("password", violation);
        }
        if password != input.confirm_password.trim() {
            errors.add("confirm_password", "Passwords do not match.");
        }
        if !errors.is_empty() {
            return Err(UserServiceError::ValidationError(errors));
        }

        if self
            .users
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(FieldErrors::single(
                "username",
                "This username is already in use.",
            )));
        }
        if self
            .users
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(FieldErrors::single(
                "email",
                "This email is already in use.",
            )));
        }

        let password_hash = hash_password(password).context("Failed to hash password")?;
        let user = User::new(username, email, password_hash, UserRole::User);
        let created = self
            .users
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!("User {} signed up", created.id);
        Ok(created)
    }

    /// Check credentials and return the user they belong to
    pub async fn login(&self, input: LoginInput) -> Result<User, UserServiceError> {
        let email = input.email.trim();
        let password = input.password.trim();

        let mut errors = FieldErrors::new();
        if !is_valid_email(email) {
            errors.add("email", "Please enter a valid email.");
        }
        if password.is_empty() {
            errors.add("password", "Password is required.");
        }
        if !errors.is_empty() {
            return Err(UserServiceError::ValidationError(errors));
        }

        let user = self
            .users
            .get_by_email(email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(|| {
                UserServiceError::AuthenticationError(FieldErrors::single("email", "Invalid email"))
            })?;

        if !verify_password(password, &user.password_hash).context("Failed to verify password")? {
            tracing::debug!("Wrong password for user {}", user.id);
            return Err(UserServiceError::AuthenticationError(FieldErrors::single(
                "password",
                "Invalid password",
            )));
        }

        Ok(user)
    }

    /// Change the password of the signed-in principal
    pub async fn change_password(
        &self,
        identity: Option<&Identity>,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        let identity = identity.ok_or_else(|| {
            UserServiceError::Unauthorized("Session is invalid or expired".to_string())
        })?;

        let user = self
            .users
            .find_by_subject_or_email(&identity.subject_id, &identity.email)
            .await
            .context("Failed to look up user")?
            .ok_or(UserServiceError::NotFound)?;

        if !verify_password(old_password.trim(), &user.password_hash)
            .context("Failed to verify password")?
        {
            return Err(UserServiceError::Unauthorized("Invalid old password".to_string()));
        }

        let new_password = new_password.trim();
        let violations = password_policy_violations(new_password);
        if !violations.is_empty() {
            let mut errors = FieldErrors::new();
            for violation in violations {
                errors.add("new_password", violation);
            }
            return Err(UserServiceError::ValidationError(errors));
        }

        let password_hash = hash_password(new_password).context("Failed to hash password")?;
        self.users
            .update_password(user.id, &password_hash)
            .await
            .context("Failed to update password")?;

        tracing::info!("User {} changed password", user.id);
        Ok(())
    }

    /// Every registered user
    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.users.list().await.context("Failed to list users")?)
    }

    /// Apply an administrator's edit to a user. Absent fields stay as they are.
    pub async fn update_user(&self, id: i64, input: UpdateUserInput) -> Result<User, UserServiceError> {
        let mut user = self
            .users
            .get_by_id(id)
            .await
            .context("Failed to look up user")?
            .ok_or(UserServiceError::NotFound)?;

        let username = input.username.map(|u| u.trim().to_string());
        let email = input.email.map(|e| e.trim().to_string());

        let mut errors = FieldErrors::new();
        if let Some(username) = &username {
            if username.chars().count() < MIN_USERNAME_LENGTH {
                errors.add("username", "Name must be at least 2 characters long.");
            }
        }
        if let Some(email) = &email {
            if !is_valid_email(email) {
                errors.add("email", "Please enter a valid email.");
            }
        }
        if !errors.is_empty() {
            return Err(UserServiceError::ValidationError(errors));
        }

        if let Some(username) = username {
            let taken = self
                .users
                .get_by_username(&username)
                .await
                .context("Failed to check username")?
                .is_some_and(|other| other.id != id);
            if taken {
                return Err(UserServiceError::UserExists(FieldErrors::single(
                    "username",
                    "This username is already in use.",
                )));
            }
            user.username = username;
        }
        if let Some(email) = email {
            let taken = self
                .users
                .get_by_email(&email)
                .await
                .context("Failed to check email")?
                .is_some_and(|other| other.id != id);
            if taken {
                return Err(UserServiceError::UserExists(FieldErrors::single(
                    "email",
                    "This email is already in use.",
                )));
            }
            user.email = email;
        }
        if let Some(role) = input.role {
            user.role = role;
        }

        let updated = self.users.update(&user).await.context("Failed to update user")?;
        tracing::info!("User {} updated", id);
        Ok(updated)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), UserServiceError> {
        if self
            .users
            .get_by_id(id)
            .await
            .context("Failed to look up user")?
            .is_none()
        {
            return Err(UserServiceError::NotFound);
        }

        self.users.delete(id).await.context("Failed to delete user")?;
        tracing::info!("User {} deleted", id);
        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        /// Any account that passes signup can log in with the same password
        #[test]
        fn signup_then_login(
            username in "[a-z]{2,12}",
            local in "[a-z]{1,10}",
            letters in "[a-zA-Z]{4,8}",
            digits in "[0-9]{1,3}",
            special in "[!@#$%^&*]{1,3}",
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let pool = create_test_pool().await.unwrap();
                migrations::run_migrations(&pool).await.unwrap();
                let service = UserService::new(SqlxUserRepository::boxed(pool));

                let email = format!("{}@example.com", local);
                let password = format!("{}{}{}", letters, digits, special);
                let created = service
                    .signup(SignupInput::new(username, email.clone(), password.clone(), password.clone()))
                    .await
                    .unwrap();

                let user = service.login(LoginInput::new(email, password)).await.unwrap();
                prop_assert_eq!(user.id, created.id);
                Ok(())
            });
            result?;
        }
    }
}
