//! `PgCredentialStore` against a live database.
//!
//! Runs only when `SESAME_TEST_DSN` points at a disposable Postgres database;
//! the schema is applied on connect.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sesame::credentials::codec::hash_token;
use sesame::credentials::models::{NewLinkedUser, OneShotToken, SessionCredential};
use sesame::credentials::store::PgCredentialStore;
use sesame::credentials::{
    AccountMutation, CredentialStore, OneShotPurpose, Provider, Role, StoreError, TokenKind,
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

async fn store() -> Result<Option<PgCredentialStore>> {
    let Ok(dsn) = std::env::var("SESAME_TEST_DSN") else {
        eprintln!("SESAME_TEST_DSN not set, skipping");
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&dsn)
        .await
        .context("Failed to connect to test database")?;
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(&pool)
        .await
        .context("Failed to apply schema")?;
    Ok(Some(PgCredentialStore::new(pool)))
}

fn now() -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .context("valid instant")
}

fn new_user(external_user_id: &str) -> NewLinkedUser {
    NewLinkedUser {
        provider: Provider::Google,
        external_user_id: external_user_id.to_string(),
        email: format!("{external_user_id}@example.com"),
        name: "Test".to_string(),
        email_verified: true,
        role: Role::User,
    }
}

fn session(user_id: i64, seed: &str, now: DateTime<Utc>) -> SessionCredential {
    SessionCredential {
        user_id,
        access_token_hash: hash_token(&format!("access-{seed}")),
        refresh_token_hash: hash_token(&format!("refresh-{seed}")),
        access_token_expires_at: now + Duration::hours(1),
        refresh_token_expires_at: now + Duration::days(1),
        created_at: now,
    }
}

#[tokio::test]
async fn linked_user_round_trip() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let now = now()?;
    let external = Uuid::new_v4().to_string();

    let created = store.create_linked_user(&new_user(&external), now).await?;
    assert!(created.is_active);
    assert!(!created.has_password);

    let found = store
        .find_user_by_link(Provider::Google, &external)
        .await?
        .context("link not found")?;
    assert_eq!(found.id, created.id);

    let again = store.create_linked_user(&new_user(&external), now).await;
    assert!(matches!(again, Err(StoreError::Conflict)));
    Ok(())
}

#[tokio::test]
async fn one_session_per_user() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let now = now()?;
    let user = store
        .create_linked_user(&new_user(&Uuid::new_v4().to_string()), now)
        .await?;

    let seed_a = Uuid::new_v4().to_string();
    let seed_b = Uuid::new_v4().to_string();
    let first = session(user.id, &seed_a, now);
    let second = session(user.id, &seed_b, now);

    store.replace_session(&first).await?;
    store.replace_session(&second).await?;

    let old = store
        .find_session(TokenKind::Access, &first.access_token_hash)
        .await?;
    assert!(old.is_none());
    let current = store
        .find_session(TokenKind::Refresh, &second.refresh_token_hash)
        .await?
        .context("current session missing")?;
    assert_eq!(current.user_id, user.id);

    assert!(store.delete_session(user.id).await?);
    assert!(!store.delete_session(user.id).await?);
    Ok(())
}

#[tokio::test]
async fn concurrent_replacements_keep_one_row() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let now = now()?;
    let user = store
        .create_linked_user(&new_user(&Uuid::new_v4().to_string()), now)
        .await?;
    store
        .replace_session(&session(user.id, &Uuid::new_v4().to_string(), now))
        .await?;

    let left = session(user.id, &Uuid::new_v4().to_string(), now);
    let right = session(user.id, &Uuid::new_v4().to_string(), now);
    let (left_result, right_result) =
        tokio::join!(store.replace_session(&left), store.replace_session(&right));

    let outcomes = [&left_result, &right_result];
    assert!(outcomes.iter().any(|result| result.is_ok()));
    assert!(
        outcomes
            .iter()
            .all(|result| matches!(result, Ok(()) | Err(StoreError::Conflict)))
    );

    let mut live = 0;
    for candidate in [&left, &right] {
        if store
            .find_session(TokenKind::Access, &candidate.access_token_hash)
            .await?
            .is_some()
        {
            live += 1;
        }
    }
    assert_eq!(live, 1);

    let rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM authentication_tokens WHERE user_id = $1")
            .bind(user.id)
            .fetch_one(store.pool())
            .await?;
    assert_eq!(rows, 1);
    Ok(())
}

#[tokio::test]
async fn one_shot_consume_applies_mutation_once() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let now = now()?;
    let user = store
        .create_linked_user(&new_user(&Uuid::new_v4().to_string()), now)
        .await?;
    let token_hash = hash_token(&Uuid::new_v4().to_string());
    let token = OneShotToken {
        user_id: user.id,
        purpose: OneShotPurpose::PasswordReset,
        token_hash: token_hash.clone(),
        expires_at: now + Duration::hours(24),
        created_at: now,
    };
    store.replace_one_shot(&token).await?;

    let expired_view = store
        .find_one_shot(
            OneShotPurpose::PasswordReset,
            &token_hash,
            now + Duration::hours(24),
        )
        .await?;
    assert!(expired_view.is_none());

    let mutation = AccountMutation::SetPasswordHash("$argon2id$v=19$test".to_string());
    let consumed = store
        .consume_one_shot(OneShotPurpose::PasswordReset, &token_hash, now, &mutation)
        .await?;
    assert_eq!(consumed, Some(user.id));

    let refreshed = store.find_user(user.id).await?.context("user missing")?;
    assert!(refreshed.has_password);

    let replay = store
        .consume_one_shot(OneShotPurpose::PasswordReset, &token_hash, now, &mutation)
        .await?;
    assert_eq!(replay, None);
    Ok(())
}

#[tokio::test]
async fn ping_succeeds() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    store.ping().await?;
    Ok(())
}
