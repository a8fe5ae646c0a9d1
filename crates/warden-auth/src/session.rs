//! User session lifecycle.
//!
//! [`SessionService`] orchestrates login, registration, credential refresh,
//! password changes and profile maintenance on top of the credential codec,
//! the password hasher, user storage and the policy engine. It keeps no state
//! between calls.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::password::{DUMMY_HASH, hash_password_async, verify_password_async};
use crate::policy::PolicyEngine;
use crate::storage::{User, UserStorage};
use crate::token::{JwtService, TokenKind, TokenPair};

/// Longest display name the user tables accept, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Longest email address the user tables accept, in characters.
pub const MAX_EMAIL_LEN: usize = 255;

/// Canonical form used to store and look up an email.
fn normalize_email(email: &str) -> String {
    email.trim().to_string()
}

fn check_name(name: &str) -> AuthResult<()> {
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AuthError::invalid_request(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn check_email(email: &str) -> AuthResult<()> {
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(AuthError::invalid_request(format!(
            "email must be at most {} characters",
            MAX_EMAIL_LEN
        )));
    }
    Ok(())
}

// =============================================================================
// Requests
// =============================================================================

/// Login payload.
#[derive(Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

/// Registration payload.
///
/// `role` is never read from request bodies; only trusted callers can set it.
#[derive(Clone, Deserialize, Serialize)]
pub struct RegisterRequest {
    /// Display name.
    pub name: String,
    /// Account email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
    /// Role to assign. Defaults to the configured least-privilege role.
    #[serde(skip)]
    pub role: Option<String>,
}

/// Refresh payload.
#[derive(Clone, Deserialize, Serialize)]
pub struct RefreshTokenRequest {
    /// Refresh credential.
    pub refresh_token: String,
}

/// Password change payload.
#[derive(Clone, Deserialize, Serialize)]
pub struct ChangePasswordRequest {
    /// Current password.
    pub old_password: String,
    /// Replacement password.
    pub new_password: String,
}

/// Profile update payload. Absent or empty fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    /// New display name.
    pub name: Option<String>,
    /// New email address.
    pub email: Option<String>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for RefreshTokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTokenRequest").finish_non_exhaustive()
    }
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordRequest").finish_non_exhaustive()
    }
}

// =============================================================================
// Session Service
// =============================================================================

/// Stateless user session orchestrator.
pub struct SessionService {
    jwt: Arc<JwtService>,
    users: Arc<dyn UserStorage>,
    policy: Arc<PolicyEngine>,
    default_role: String,
}

impl SessionService {
    /// Creates a new session service.
    #[must_use]
    pub fn new(
        jwt: Arc<JwtService>,
        users: Arc<dyn UserStorage>,
        policy: Arc<PolicyEngine>,
        default_role: impl Into<String>,
    ) -> Self {
        Self {
            jwt,
            users,
            policy,
            default_role: default_role.into(),
        }
    }

    /// Returns the credential codec.
    #[must_use]
    pub fn jwt(&self) -> &Arc<JwtService> {
        &self.jwt
    }

    /// Returns the policy engine.
    #[must_use]
    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    /// Exchanges email and password for an access + refresh pair.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown email or a wrong password
    ///   (indistinguishable)
    /// - `AccountInactive` if the account is not active
    pub async fn login(&self, req: LoginRequest) -> AuthResult<TokenPair> {
        let email = normalize_email(&req.email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            // Same Argon2 cost as a real mismatch.
            verify_password_async(req.password, DUMMY_HASH.to_string()).await?;
            tracing::debug!("Login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password_async(req.password, user.password_hash.clone()).await? {
            tracing::debug!(user_id = %user.id, "Login rejected: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active() {
            tracing::info!(user_id = %user.id, status = %user.status, "Login rejected: account inactive");
            return Err(AuthError::AccountInactive);
        }

        let pair = self.jwt.issue_pair(&user.id, &user.role)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Creates an active account and grants it its role.
    ///
    /// The grouping edge is written before the user record, so every stored
    /// user has one. If the user write fails, the edge is removed again on a
    /// best-effort basis.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty email or password, or an over-long
    ///   name or email
    /// - `DuplicateEmail` if the email is taken
    /// - `PolicyEngine` if the grouping edge cannot be persisted
    pub async fn register(&self, req: RegisterRequest) -> AuthResult<User> {
        let email = normalize_email(&req.email);
        if email.is_empty() {
            return Err(AuthError::invalid_request("email is required"));
        }
        check_email(&email)?;
        check_name(&req.name)?;
        if req.password.is_empty() {
            return Err(AuthError::invalid_request("password is required"));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let role = req
            .role
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.default_role.clone());
        let hash = hash_password_async(req.password).await?;
        let user = User::new(req.name, email, hash, role);

        self.policy.add_grouping(&user.id, &user.role).await?;

        if let Err(e) = self.users.create(&user).await {
            if let Err(cleanup) = self.policy.remove_grouping(&user.id, &user.role).await {
                tracing::warn!(
                    user_id = %user.id,
                    error = %cleanup,
                    "Failed to remove grouping after aborted registration"
                );
            }
            return Err(e);
        }

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Exchanges a refresh credential for a fresh pair.
    ///
    /// The user is reloaded, so role and status changes take effect.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` if the credential fails verification, has an
    ///   empty subject, or names a user that no longer exists
    /// - `AccountInactive` if the account is not active
    pub async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims = self
            .jwt
            .verify_async(refresh_token.to_string(), TokenKind::Refresh)
            .await?;

        if claims.sub.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let Some(user) = self.users.find_by_id(&claims.sub).await? else {
            tracing::debug!(user_id = %claims.sub, "Refresh rejected: user not found");
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active() {
            return Err(AuthError::AccountInactive);
        }

        self.jwt.issue_pair(&user.id, &user.role)
    }

    /// Replaces the password after checking the current one.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user does not exist
    /// - `IncorrectPassword` if `old_password` does not match
    /// - `InvalidRequest` for an empty new password
    pub async fn change_password(
        &self,
        user_id: &str,
        req: ChangePasswordRequest,
    ) -> AuthResult<()> {
        let mut user = self.load_user(user_id).await?;

        if !verify_password_async(req.old_password, user.password_hash.clone()).await? {
            return Err(AuthError::IncorrectPassword);
        }
        if req.new_password.is_empty() {
            return Err(AuthError::invalid_request("new password is required"));
        }

        user.password_hash = hash_password_async(req.new_password).await?;
        user.touch();
        self.users.update(&user).await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    /// Ends a session. Credentials stay valid until they expire.
    pub async fn logout(&self, user_id: &str) -> AuthResult<()> {
        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Decides whether `sub` may perform `act` on `obj`.
    ///
    /// # Errors
    ///
    /// Returns `PolicyEngine` if the engine cannot evaluate.
    pub async fn enforce(&self, sub: &str, obj: &str, act: &str) -> AuthResult<bool> {
        self.policy.enforce(sub, obj, act).await
    }

    /// Returns the user's own record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist.
    pub async fn profile(&self, user_id: &str) -> AuthResult<User> {
        self.load_user(user_id).await
    }

    /// Updates name and/or email.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user does not exist
    /// - `InvalidRequest` for an over-long name or email
    /// - `DuplicateEmail` if the new email belongs to another account
    pub async fn update_profile(
        &self,
        user_id: &str,
        req: UpdateProfileRequest,
    ) -> AuthResult<User> {
        let mut user = self.load_user(user_id).await?;

        if let Some(name) = req.name.filter(|n| !n.is_empty()) {
            check_name(&name)?;
            user.name = name;
        }

        if let Some(email) = req.email.map(|e| normalize_email(&e)).filter(|e| !e.is_empty())
            && email != user.email
        {
            check_email(&email)?;
            if let Some(existing) = self.users.find_by_email(&email).await?
                && existing.id != user.id
            {
                return Err(AuthError::DuplicateEmail);
            }
            user.email = email;
        }

        user.touch();
        self.users.update(&user).await?;
        Ok(user)
    }

    async fn load_user(&self, user_id: &str) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("user {}", user_id)))
    }
}
