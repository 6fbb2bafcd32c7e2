//! API-key authentication collaborator.
//!
//! Callers present a raw key in the `x-api-key` header; only the
//! SHA-256 hex digest is ever stored. The raw key is returned exactly
//! once, at registration, and cannot be recovered afterwards.
//!
//! The registry also records the user's linked broker account metadata
//! (broker name + account id). Broker credentials themselves are out of
//! scope and never accepted here.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Key hashing
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of a raw API key.
pub fn hash_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh raw API key (64 hex chars).
pub fn generate_api_key() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub id: Uuid,
    /// e.g. "MetaTrader5", "cTrader".
    pub broker_name: String,
    /// Broker-side account identifier.
    pub account_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub username: String,
    pub broker_account: BrokerAccount,
    pub created_at: DateTime<Utc>,
}

/// Returned by [`AccountRegistry::register`]. Carries the raw API key;
/// the only time it is ever visible.
#[derive(Debug, Clone)]
pub struct RegisteredAccount {
    pub user: UserRecord,
    pub api_key: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    UsernameTaken { username: String },
}

impl std::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterError::UsernameTaken { username } => {
                write!(f, "user '{username}' already exists")
            }
        }
    }
}

impl std::error::Error for RegisterError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No `x-api-key` header on the request.
    MissingKey,
    /// The presented key hashes to no known user.
    InvalidKey,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingKey => write!(f, "missing x-api-key header"),
            AuthError::InvalidKey => write!(f, "invalid API key"),
        }
    }
}

impl std::error::Error for AuthError {}

// ---------------------------------------------------------------------------
// AccountRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RegistryTables {
    users: HashMap<Uuid, UserRecord>,
    by_key_hash: HashMap<String, Uuid>,
    by_username: HashMap<String, Uuid>,
}

/// In-memory user + API-key table. Concurrency-safe behind one `RwLock`;
/// `authenticate` takes only the read half.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    tables: RwLock<RegistryTables>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a linked broker account. Allocates the user
    /// id and raw API key; stores only the key's digest.
    pub fn register(
        &self,
        username: &str,
        broker_name: &str,
        broker_account_id: &str,
    ) -> Result<RegisteredAccount, RegisterError> {
        let mut t = self.tables.write().expect("registry lock poisoned");
        if t.by_username.contains_key(username) {
            return Err(RegisterError::UsernameTaken {
                username: username.to_string(),
            });
        }

        let now = Utc::now();
        let api_key = generate_api_key();
        let user = UserRecord {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            broker_account: BrokerAccount {
                id: Uuid::new_v4(),
                broker_name: broker_name.to_string(),
                account_id: broker_account_id.to_string(),
                created_at: now,
            },
            created_at: now,
        };

        t.by_key_hash.insert(hash_api_key(&api_key), user.user_id);
        t.by_username.insert(username.to_string(), user.user_id);
        t.users.insert(user.user_id, user.clone());

        Ok(RegisteredAccount { user, api_key })
    }

    /// Resolve a raw API key to its owning user id.
    pub fn authenticate(&self, raw_key: Option<&str>) -> Result<Uuid, AuthError> {
        let raw = raw_key.ok_or(AuthError::MissingKey)?;
        let t = self.tables.read().expect("registry lock poisoned");
        t.by_key_hash
            .get(&hash_api_key(raw))
            .copied()
            .ok_or(AuthError::InvalidKey)
    }

    pub fn get_user(&self, user_id: Uuid) -> Option<UserRecord> {
        let t = self.tables.read().expect("registry lock poisoned");
        t.users.get(&user_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_hex() {
        let h = hash_api_key("test-key");
        assert_eq!(h, hash_api_key("test-key"));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn register_then_authenticate_round_trip() {
        let reg = AccountRegistry::new();
        let acct = reg.register("alice", "MetaTrader5", "MT-1001").unwrap();

        let user_id = reg.authenticate(Some(&acct.api_key)).unwrap();
        assert_eq!(user_id, acct.user.user_id);

        let user = reg.get_user(user_id).unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.broker_account.broker_name, "MetaTrader5");
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let reg = AccountRegistry::new();
        reg.register("alice", "MetaTrader5", "MT-1001").unwrap();
        let err = reg.register("alice", "cTrader", "CT-7").unwrap_err();
        assert_eq!(
            err,
            RegisterError::UsernameTaken {
                username: "alice".to_string()
            }
        );
    }

    #[test]
    fn missing_and_unknown_keys_fail() {
        let reg = AccountRegistry::new();
        reg.register("alice", "MetaTrader5", "MT-1001").unwrap();

        assert_eq!(reg.authenticate(None), Err(AuthError::MissingKey));
        assert_eq!(
            reg.authenticate(Some("not-a-key")),
            Err(AuthError::InvalidKey)
        );
    }

    #[test]
    fn generated_keys_are_unique_per_registration() {
        let reg = AccountRegistry::new();
        let a = reg.register("alice", "MetaTrader5", "MT-1").unwrap();
        let b = reg.register("bob", "MetaTrader5", "MT-2").unwrap();
        assert_ne!(a.api_key, b.api_key);
        assert_ne!(a.user.user_id, b.user.user_id);
    }
}
