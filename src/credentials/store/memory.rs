//! In-process credential store.
//!
//! A single async mutex guards all tables, which makes every trait method
//! trivially atomic. Unique constraints of the SQL schema are mirrored so the
//! same conflict paths are reachable in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::CredentialStore;
use crate::credentials::error::StoreError;
use crate::credentials::models::{
    AccountMutation, NewLinkedUser, OAuthLink, OneShotPurpose, OneShotToken, Provider, Role,
    SessionCredential, TokenKind, UserRecord,
};

/// Locally registered user, used to seed the store.
#[derive(Debug, Clone)]
pub struct LocalUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
}

impl LocalUser {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: String::new(),
            role: Role::User,
            password_hash: Some(String::from("$argon2id$placeholder")),
            is_active: true,
            email_verified: true,
        }
    }

    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub const fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    #[must_use]
    pub const fn with_email_verified(mut self, email_verified: bool) -> Self {
        self.email_verified = email_verified;
        self
    }

    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn without_password(mut self) -> Self {
        self.password_hash = None;
        self
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    record: UserRecord,
    password_hash: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    next_user_id: i64,
    users: BTreeMap<i64, StoredUser>,
    sessions: HashMap<i64, SessionCredential>,
    one_shots: HashMap<(OneShotPurpose, i64), OneShotToken>,
    links: Vec<OAuthLink>,
    roles: HashSet<Role>,
    providers: HashSet<Provider>,
}

impl Tables {
    fn user(&self, user_id: i64) -> Option<UserRecord> {
        self.users.get(&user_id).map(|stored| stored.record.clone())
    }
}

#[derive(Debug)]
pub struct MemoryCredentialStore {
    tables: Mutex<Tables>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCredentialStore {
    /// Store with the same role and provider seed rows as `sql/schema.sql`.
    #[must_use]
    pub fn new() -> Self {
        let tables = Tables {
            roles: HashSet::from([Role::Admin, Role::User]),
            providers: HashSet::from([Provider::Google, Provider::Facebook]),
            ..Tables::default()
        };
        Self {
            tables: Mutex::new(tables),
        }
    }

    /// Store with no seed rows, as after a botched migration.
    #[must_use]
    pub fn without_seed() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    pub async fn insert_user(&self, user: LocalUser) -> UserRecord {
        let mut tables = self.tables.lock().await;
        tables.next_user_id += 1;
        let record = UserRecord {
            id: tables.next_user_id,
            external_id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            role: user.role,
            is_active: user.is_active,
            email_verified: user.email_verified,
            has_password: user.password_hash.is_some(),
        };
        tables.users.insert(
            record.id,
            StoredUser {
                record: record.clone(),
                password_hash: user.password_hash,
            },
        );
        record
    }

    /// Delete a user and everything that cascades from it.
    pub async fn remove_user(&self, user_id: i64) -> bool {
        let mut tables = self.tables.lock().await;
        tables.sessions.remove(&user_id);
        tables.one_shots.retain(|(_, owner), _| *owner != user_id);
        tables.links.retain(|link| link.user_id != user_id);
        tables.users.remove(&user_id).is_some()
    }

    /// Drop only the user row, leaving dangling sessions and tokens behind.
    #[cfg(test)]
    pub(crate) async fn forget_user(&self, user_id: i64) {
        self.tables.lock().await.users.remove(&user_id);
    }

    pub async fn set_active(&self, user_id: i64, is_active: bool) {
        let mut tables = self.tables.lock().await;
        if let Some(stored) = tables.users.get_mut(&user_id) {
            stored.record.is_active = is_active;
        }
    }

    pub async fn password_hash(&self, user_id: i64) -> Option<String> {
        let tables = self.tables.lock().await;
        tables
            .users
            .get(&user_id)
            .and_then(|stored| stored.password_hash.clone())
    }

    pub async fn session_count(&self, user_id: i64) -> usize {
        let tables = self.tables.lock().await;
        tables
            .sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .count()
    }

    pub async fn one_shot_count(&self, purpose: OneShotPurpose, user_id: i64) -> usize {
        let tables = self.tables.lock().await;
        tables
            .one_shots
            .values()
            .filter(|token| token.purpose == purpose && token.user_id == user_id)
            .count()
    }

    pub async fn links(&self) -> Vec<OAuthLink> {
        self.tables.lock().await.links.clone()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn replace_session(&self, session: &SessionCredential) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&session.user_id) {
            return Err(StoreError::NotFound("user"));
        }
        let clashes = tables.sessions.values().any(|existing| {
            existing.user_id != session.user_id
                && (existing.access_token_hash == session.access_token_hash
                    || existing.refresh_token_hash == session.refresh_token_hash)
        });
        if clashes {
            return Err(StoreError::Conflict);
        }
        tables.sessions.insert(session.user_id, session.clone());
        Ok(())
    }

    async fn delete_session(&self, user_id: i64) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.sessions.remove(&user_id).is_some())
    }

    async fn find_session(
        &self,
        kind: TokenKind,
        token_hash: &str,
    ) -> Result<Option<SessionCredential>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .find(|session| session.token_hash(kind) == token_hash)
            .cloned())
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.tables.lock().await.user(user_id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|stored| {
                stored.password_hash.is_some() && stored.record.email.eq_ignore_ascii_case(email)
            })
            .map(|stored| stored.record.clone()))
    }

    async fn find_password_hash(&self, user_id: i64) -> Result<Option<String>, StoreError> {
        Ok(self.password_hash(user_id).await)
    }

    async fn replace_one_shot(&self, token: &OneShotToken) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound("user"));
        }
        let clashes = tables.one_shots.values().any(|existing| {
            existing.purpose == token.purpose
                && existing.user_id != token.user_id
                && existing.token_hash == token.token_hash
        });
        if clashes {
            return Err(StoreError::Conflict);
        }
        tables
            .one_shots
            .insert((token.purpose, token.user_id), token.clone());
        Ok(())
    }

    async fn find_one_shot(
        &self,
        purpose: OneShotPurpose,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OneShotToken>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .one_shots
            .values()
            .find(|token| {
                token.purpose == purpose && token.token_hash == token_hash && now < token.expires_at
            })
            .cloned())
    }

    async fn consume_one_shot(
        &self,
        purpose: OneShotPurpose,
        token_hash: &str,
        now: DateTime<Utc>,
        mutation: &AccountMutation,
    ) -> Result<Option<i64>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(user_id) = tables
            .one_shots
            .values()
            .find(|token| {
                token.purpose == purpose && token.token_hash == token_hash && now < token.expires_at
            })
            .map(|token| token.user_id)
        else {
            return Ok(None);
        };

        // Mutation first; bail before touching the token if it cannot apply.
        let stored = tables
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound("user"))?;
        match mutation {
            AccountMutation::SetPasswordHash(hash) => {
                stored.password_hash = Some(hash.clone());
                stored.record.has_password = true;
            }
            AccountMutation::MarkEmailVerified => stored.record.email_verified = true,
        }

        tables.one_shots.remove(&(purpose, user_id));
        Ok(Some(user_id))
    }

    async fn find_user_by_link(
        &self,
        provider: Provider,
        external_user_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .links
            .iter()
            .find(|link| link.provider == provider && link.external_user_id == external_user_id)
            .and_then(|link| tables.user(link.user_id)))
    }

    async fn create_linked_user(
        &self,
        new_user: &NewLinkedUser,
        _now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.roles.contains(&new_user.role) {
            return Err(StoreError::NotFound("role"));
        }
        if !tables.providers.contains(&new_user.provider) {
            return Err(StoreError::NotFound("provider"));
        }
        let taken = tables.links.iter().any(|link| {
            link.provider == new_user.provider && link.external_user_id == new_user.external_user_id
        });
        if taken {
            return Err(StoreError::Conflict);
        }

        tables.next_user_id += 1;
        let record = UserRecord {
            id: tables.next_user_id,
            external_id: Uuid::new_v4(),
            email: new_user.email.clone(),
            name: new_user.name.clone(),
            role: new_user.role,
            is_active: true,
            email_verified: new_user.email_verified,
            has_password: false,
        };
        tables.users.insert(
            record.id,
            StoredUser {
                record: record.clone(),
                password_hash: None,
            },
        );
        tables.links.push(OAuthLink {
            user_id: record.id,
            provider: new_user.provider,
            external_user_id: new_user.external_user_id.clone(),
            linked_email: new_user.email.clone(),
        });
        Ok(record)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
