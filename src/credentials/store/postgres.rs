//! `PostgreSQL` credential store.
//!
//! Every mutation runs in one transaction. "Now" is always bound from the
//! caller's clock instead of `NOW()` so expiry is decided in one place.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgPool, Row};
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::CredentialStore;
use crate::credentials::error::StoreError;
use crate::credentials::models::{
    AccountMutation, NewLinkedUser, OneShotPurpose, OneShotToken, Provider, SessionCredential,
    TokenKind, UserRecord,
};

const USER_COLUMNS: &str = r"
    users.id, users.external_id, users.email, users.name, roles.name AS role,
    users.is_active, users.email_verified, (users.password_hash IS NOT NULL) AS has_password
";

fn query_span(operation: &'static str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23505")
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23503")
}

fn has_sqlstate(err: &sqlx::Error, state: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == state),
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_user(
        &self,
        filter: &str,
        bind: UserFilter<'_>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users JOIN roles ON roles.id = users.role_id WHERE {filter} ORDER BY users.id LIMIT 1"
        );
        let span = query_span("SELECT", &query);
        let statement = sqlx::query_as::<_, UserRecord>(&query);
        let statement = match bind {
            UserFilter::Id(id) => statement.bind(id),
            UserFilter::Email(email) => statement.bind(email),
        };
        statement
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch user")
            .map_err(StoreError::from)
    }
}

enum UserFilter<'a> {
    Id(i64),
    Email(&'a str),
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn replace_session(&self, session: &SessionCredential) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin session transaction")?;

        let delete = "DELETE FROM authentication_tokens WHERE user_id = $1";
        sqlx::query(delete)
            .bind(session.user_id)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", delete))
            .await
            .context("failed to delete previous session")?;

        let insert = r"
            INSERT INTO authentication_tokens
                (user_id, access_token_hash, refresh_token_hash,
                 access_token_expires_at, refresh_token_expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let result = sqlx::query(insert)
            .bind(session.user_id)
            .bind(&session.access_token_hash)
            .bind(&session.refresh_token_hash)
            .bind(session.access_token_expires_at)
            .bind(session.refresh_token_expires_at)
            .bind(session.created_at)
            .execute(&mut *tx)
            .instrument(query_span("INSERT", insert))
            .await;

        match result {
            Ok(_) => {}
            // A concurrent replace committed first; its row wins.
            Err(err) if is_unique_violation(&err) => return Err(StoreError::Conflict),
            Err(err) if is_foreign_key_violation(&err) => return Err(StoreError::NotFound("user")),
            Err(err) => return Err(anyhow!(err).context("failed to insert session").into()),
        }

        tx.commit()
            .await
            .context("failed to commit session transaction")?;
        Ok(())
    }

    async fn delete_session(&self, user_id: i64) -> Result<bool, StoreError> {
        let query = "DELETE FROM authentication_tokens WHERE user_id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_session(
        &self,
        kind: TokenKind,
        token_hash: &str,
    ) -> Result<Option<SessionCredential>, StoreError> {
        let column = match kind {
            TokenKind::Access => "access_token_hash",
            TokenKind::Refresh => "refresh_token_hash",
        };
        let query = format!(
            r"
            SELECT user_id, access_token_hash, refresh_token_hash,
                   access_token_expires_at, refresh_token_expires_at, created_at
            FROM authentication_tokens
            WHERE {column} = $1
            "
        );
        let session = sqlx::query_as::<_, SessionCredential>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup session")?;
        Ok(session)
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_user("users.id = $1", UserFilter::Id(user_id)).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_user(
            "lower(users.email) = lower($1) AND users.password_hash IS NOT NULL",
            UserFilter::Email(email),
        )
        .await
    }

    async fn find_password_hash(&self, user_id: i64) -> Result<Option<String>, StoreError> {
        let query = "SELECT password_hash FROM users WHERE id = $1";
        let hash = sqlx::query_scalar::<_, Option<String>>(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to fetch password hash")?;
        Ok(hash.flatten())
    }

    async fn replace_one_shot(&self, token: &OneShotToken) -> Result<(), StoreError> {
        let table = token.purpose.table();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin one-shot transaction")?;

        let delete = format!("DELETE FROM {table} WHERE user_id = $1");
        sqlx::query(&delete)
            .bind(token.user_id)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", &delete))
            .await
            .context("failed to delete previous one-shot token")?;

        let insert = format!(
            "INSERT INTO {table} (user_id, token_hash, expires_at, created_at) VALUES ($1, $2, $3, $4)"
        );
        let result = sqlx::query(&insert)
            .bind(token.user_id)
            .bind(&token.token_hash)
            .bind(token.expires_at)
            .bind(token.created_at)
            .execute(&mut *tx)
            .instrument(query_span("INSERT", &insert))
            .await;

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Err(StoreError::Conflict),
            Err(err) if is_foreign_key_violation(&err) => return Err(StoreError::NotFound("user")),
            Err(err) => {
                return Err(anyhow!(err)
                    .context("failed to insert one-shot token")
                    .into());
            }
        }

        tx.commit()
            .await
            .context("failed to commit one-shot transaction")?;
        Ok(())
    }

    async fn find_one_shot(
        &self,
        purpose: OneShotPurpose,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OneShotToken>, StoreError> {
        let query = format!(
            "SELECT user_id, token_hash, expires_at, created_at FROM {} WHERE token_hash = $1 AND expires_at > $2",
            purpose.table()
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup one-shot token")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(OneShotToken {
            user_id: row.try_get("user_id")?,
            purpose,
            token_hash: row.try_get("token_hash")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn consume_one_shot(
        &self,
        purpose: OneShotPurpose,
        token_hash: &str,
        now: DateTime<Utc>,
        mutation: &AccountMutation,
    ) -> Result<Option<i64>, StoreError> {
        let table = purpose.table();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin consume transaction")?;

        // Row lock: a concurrent consumer blocks here and then sees no row.
        let select = format!(
            "SELECT user_id FROM {table} WHERE token_hash = $1 AND expires_at > $2 FOR UPDATE"
        );
        let user_id: Option<i64> = sqlx::query_scalar(&select)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(query_span("SELECT", &select))
            .await
            .context("failed to lock one-shot token")?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let update = match mutation {
            AccountMutation::SetPasswordHash(_) => {
                "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1"
            }
            AccountMutation::MarkEmailVerified => {
                "UPDATE users SET email_verified = TRUE, updated_at = $2 WHERE id = $1"
            }
        };
        let statement = sqlx::query(update).bind(user_id);
        let statement = match mutation {
            AccountMutation::SetPasswordHash(hash) => statement.bind(hash).bind(now),
            AccountMutation::MarkEmailVerified => statement.bind(now),
        };
        let updated = statement
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", update))
            .await
            .with_context(|| format!("failed to apply {}", mutation.as_str()))?;
        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls back; the token stays valid.
            return Err(StoreError::NotFound("user"));
        }

        let delete = format!("DELETE FROM {table} WHERE token_hash = $1");
        sqlx::query(&delete)
            .bind(token_hash)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", &delete))
            .await
            .context("failed to delete consumed token")?;

        tx.commit()
            .await
            .context("failed to commit consume transaction")?;
        Ok(Some(user_id))
    }

    async fn find_user_by_link(
        &self,
        provider: Provider,
        external_user_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let query = format!(
            r"
            SELECT {USER_COLUMNS}
            FROM oauth_links
            JOIN oauth_providers ON oauth_providers.id = oauth_links.provider_id
            JOIN users ON users.id = oauth_links.user_id
            JOIN roles ON roles.id = users.role_id
            WHERE oauth_providers.name = $1
              AND oauth_links.external_user_id = $2
            "
        );
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(provider.as_str())
            .bind(external_user_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup oauth link")?;
        Ok(user)
    }

    async fn create_linked_user(
        &self,
        new_user: &NewLinkedUser,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin oauth registration transaction")?;

        let role_query = "SELECT id FROM roles WHERE name = $1";
        let role_id: Option<i16> = sqlx::query_scalar(role_query)
            .bind(new_user.role.as_str())
            .fetch_optional(&mut *tx)
            .instrument(query_span("SELECT", role_query))
            .await
            .context("failed to lookup role")?;
        let role_id = role_id.ok_or(StoreError::NotFound("role"))?;

        let provider_query = "SELECT id FROM oauth_providers WHERE name = $1";
        let provider_id: Option<i16> = sqlx::query_scalar(provider_query)
            .bind(new_user.provider.as_str())
            .fetch_optional(&mut *tx)
            .instrument(query_span("SELECT", provider_query))
            .await
            .context("failed to lookup oauth provider")?;
        let provider_id = provider_id.ok_or(StoreError::NotFound("provider"))?;

        let external_id = Uuid::new_v4();
        let insert_user = r"
            INSERT INTO users (external_id, email, name, role_id, is_active, email_verified, created_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6)
            RETURNING id
        ";
        let user_id: i64 = sqlx::query_scalar(insert_user)
            .bind(external_id)
            .bind(&new_user.email)
            .bind(&new_user.name)
            .bind(role_id)
            .bind(new_user.email_verified)
            .bind(now)
            .fetch_one(&mut *tx)
            .instrument(query_span("INSERT", insert_user))
            .await
            .context("failed to insert oauth user")?;

        let insert_link = r"
            INSERT INTO oauth_links (provider_id, external_user_id, user_id, email, created_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let result = sqlx::query(insert_link)
            .bind(provider_id)
            .bind(&new_user.external_user_id)
            .bind(user_id)
            .bind(&new_user.email)
            .bind(now)
            .execute(&mut *tx)
            .instrument(query_span("INSERT", insert_link))
            .await;

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Err(StoreError::Conflict),
            Err(err) => return Err(anyhow!(err).context("failed to insert oauth link").into()),
        }

        tx.commit()
            .await
            .context("failed to commit oauth registration")?;

        Ok(UserRecord {
            id: user_id,
            external_id,
            email: new_user.email.clone(),
            name: new_user.name.clone(),
            role: new_user.role,
            is_active: true,
            email_verified: new_user.email_verified,
            has_password: false,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(tracing::info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .instrument(tracing::info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .context("failed to ping database")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::{borrow::Cow, error::Error as StdError, fmt};

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(TestDbError { code: Some(code) }))
    }

    #[test]
    fn sqlstate_classification() {
        assert!(is_unique_violation(&db_error("23505")));
        assert!(!is_unique_violation(&db_error("23503")));
        assert!(is_foreign_key_violation(&db_error("23503")));
        assert!(!is_foreign_key_violation(&db_error("99999")));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn user_columns_expose_every_record_field() {
        for column in [
            "users.id",
            "users.external_id",
            "users.email",
            "users.name",
            "AS role",
            "users.is_active",
            "users.email_verified",
            "AS has_password",
        ] {
            assert!(USER_COLUMNS.contains(column), "missing {column}");
        }
    }
}
