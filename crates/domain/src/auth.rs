//! Accounts and bearer tokens.

use chrono::{DateTime, Duration, Utc};
use common::{Role, UserId};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use store::{NewUser, Store, Transaction, USERS_EMAIL_UNIQUE, User};
use uuid::Uuid;

use crate::context::{Caller, Principal};
use crate::error::{DomainError, Result};

const MIN_PASSWORD_LEN: usize = 8;

/// Token settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    role: Role,
    exp: i64,
}

/// An issued bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Hashes a password as `salt$hex(sha256(salt || password))`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest(&salt, password))
}

/// Checks `password` against a hash produced by [`hash_password`].
pub fn verify_password(password: &str, hash: &str) -> bool {
    hash.split_once('$')
        .is_some_and(|(salt, expected)| digest(salt, password) == expected)
}

fn digest(salt: &str, password: &str) -> String {
    let hash = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    format!("{hash:x}")
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim();
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
    });
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(DomainError::InvalidArgument(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(email.to_string())
}

fn invalid_credentials() -> DomainError {
    DomainError::Unauthorized("invalid email or password".to_string())
}

/// Service for registration, login and token resolution.
pub struct AuthService<S: Store> {
    store: S,
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl: Duration,
}

impl<S: Store> AuthService<S> {
    pub fn new(store: S, config: &AuthConfig) -> Self {
        Self {
            store,
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: config.token_ttl,
        }
    }

    /// Registers a new shopper account.
    #[tracing::instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User> {
        self.create_account(email, password, name, Role::User).await
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<User> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::InvalidArgument(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::InvalidArgument(
                "name must not be empty".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let user = tx
            .insert_user(NewUser {
                email,
                name: name.to_string(),
                password_hash: hash_password(password),
                role,
            })
            .await
            .map_err(|e| {
                if e.is_unique_violation(USERS_EMAIL_UNIQUE) {
                    DomainError::Conflict("email is already registered".to_string())
                } else {
                    e.into()
                }
            })?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = %user.role, "account registered");
        Ok(user)
    }

    /// Exchanges credentials for a bearer token.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthToken> {
        let mut tx = self.store.begin().await?;
        let user = tx
            .find_user_by_email(email.trim())
            .await?
            .ok_or_else(invalid_credentials)?;
        if !verify_password(password, &user.password_hash) {
            return Err(invalid_credentials());
        }
        self.issue(user)
    }

    fn issue(&self, user: User) -> Result<AuthToken> {
        let expires_at = Utc::now() + self.token_ttl;
        let claims = Claims {
            sub: user.id.get(),
            role: user.role,
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            DomainError::Internal("could not issue token".to_string())
        })?;
        Ok(AuthToken {
            token,
            expires_at,
            user,
        })
    }

    /// Resolves a bearer token into the principal it was issued for.
    pub fn resolve(&self, token: &str) -> Result<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| DomainError::Unauthorized("invalid or expired token".to_string()))?;
        Ok(Principal::new(UserId::new(data.claims.sub), data.claims.role))
    }

    /// Returns the account of the authenticated caller.
    pub async fn me(&self, caller: &Caller) -> Result<User> {
        let principal = caller.require_user()?;
        let mut tx = self.store.begin().await?;
        tx.get_user(principal.user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User", principal.user_id))
    }

    /// Creates the admin account unless the email is already registered.
    #[tracing::instrument(skip(self, password))]
    pub async fn ensure_admin(&self, email: &str, password: &str, name: &str) -> Result<User> {
        let mut tx = self.store.begin().await?;
        if let Some(existing) = tx.find_user_by_email(email.trim()).await? {
            if !existing.role.is_admin() {
                tracing::warn!(user_id = %existing.id, "bootstrap admin email belongs to a regular account");
            }
            return Ok(existing);
        }
        drop(tx);
        self.create_account(email, password, name, Role::Admin).await
    }
}

#[cfg(test)]
mod tests {
    use store::InMemoryStore;

    use super::*;

    fn service() -> AuthService<InMemoryStore> {
        AuthService::new(
            InMemoryStore::new(),
            &AuthConfig {
                jwt_secret: "test-secret".to_string(),
                token_ttl: Duration::hours(1),
            },
        )
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert_ne!(hash, hash_password("correct horse"));
        assert!(!verify_password("anything", "no-separator"));
    }

    #[test]
    fn email_validation() {
        assert!(normalize_email(" a@b.io ").is_ok());
        for bad in ["", "a", "a@b", "@b.io", "a@@b.io", "a b@c.io", "a@.io"] {
            assert!(normalize_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[tokio::test]
    async fn register_login_resolve() {
        let auth = service();
        let user = auth
            .register("Buyer@Example.com", "password123", "Buyer")
            .await
            .unwrap();
        assert_eq!(user.role, Role::User);

        let token = auth.login("buyer@example.com", "password123").await.unwrap();
        assert_eq!(token.user.id, user.id);

        let principal = auth.resolve(&token.token).unwrap();
        assert_eq!(principal, Principal::new(user.id, Role::User));

        let me = auth.me(&Caller::user(user.id)).await.unwrap();
        assert_eq!(me.email, "Buyer@Example.com");
    }

    #[tokio::test]
    async fn register_rejects_bad_input_and_duplicates() {
        let auth = service();
        assert!(matches!(
            auth.register("buyer@example.com", "short", "Buyer").await,
            Err(DomainError::InvalidArgument(_))
        ));
        assert!(matches!(
            auth.register("buyer@example.com", "password123", "  ").await,
            Err(DomainError::InvalidArgument(_))
        ));

        auth.register("buyer@example.com", "password123", "Buyer")
            .await
            .unwrap();
        assert!(matches!(
            auth.register("BUYER@example.com", "password123", "Buyer").await,
            Err(DomainError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn wrong_credentials_are_unauthorized() {
        let auth = service();
        auth.register("buyer@example.com", "password123", "Buyer")
            .await
            .unwrap();

        for (email, password) in [
            ("buyer@example.com", "password124"),
            ("nobody@example.com", "password123"),
        ] {
            let err = auth.login(email, password).await.unwrap_err();
            assert_eq!(err.to_string(), "invalid email or password");
        }
    }

    #[test]
    fn garbage_and_expired_tokens_are_rejected() {
        let auth = service();
        assert!(matches!(
            auth.resolve("not-a-token"),
            Err(DomainError::Unauthorized(_))
        ));

        let claims = Claims {
            sub: 1,
            role: Role::Admin,
            exp: (Utc::now() - Duration::hours(2)).timestamp(),
        };
        let expired = encode(&Header::default(), &claims, &auth.encoding).unwrap();
        assert!(matches!(
            auth.resolve(&expired),
            Err(DomainError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent() {
        let auth = service();
        let first = auth
            .ensure_admin("admin@example.com", "adminpass1", "Admin")
            .await
            .unwrap();
        let second = auth
            .ensure_admin("admin@example.com", "adminpass1", "Admin")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.role, Role::Admin);
    }
}
