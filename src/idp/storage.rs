//! Postgres-backed user directory.

use sqlx::PgPool;
use tracing::{debug, info};

use super::{IdpError, UserAttributes, UserRecord, STATUS_UNCONFIRMED};

const USER_COLUMNS: &str = "id, username, phone_number, phone_number_verified, \
     email, email_verified, name, given_name, family_name, picture, status";

/// Create the directory schema if it does not exist yet. Idempotent; runs at
/// boot.
///
/// # Errors
///
/// Returns an error if the DDL fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS auth_users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            username TEXT NOT NULL UNIQUE,
            phone_number TEXT,
            phone_number_verified BOOLEAN NOT NULL DEFAULT FALSE,
            email TEXT,
            email_verified BOOLEAN NOT NULL DEFAULT FALSE,
            name TEXT,
            given_name TEXT,
            family_name TEXT,
            picture TEXT,
            status TEXT NOT NULL DEFAULT 'CONFIRMED',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up a user by username.
///
/// # Errors
///
/// Returns an error on transport failure.
pub async fn lookup_user(pool: &PgPool, username: &str) -> Result<Option<UserRecord>, sqlx::Error> {
    let query = format!("SELECT {USER_COLUMNS} FROM auth_users WHERE username = $1");
    sqlx::query_as::<_, UserRecord>(&query)
        .bind(username)
        .fetch_optional(pool)
        .await
}

/// Create a user in the confirmed state. Racing creators are tolerated: the
/// conflict path returns the already existing row, matching the original
/// sign-up flow that swallowed "username exists".
///
/// # Errors
///
/// Returns an error on transport failure.
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    attributes: &UserAttributes,
) -> Result<UserRecord, sqlx::Error> {
    let query = format!(
        "INSERT INTO auth_users \
             (username, phone_number, phone_number_verified, email, email_verified, \
              name, given_name, family_name, picture) \
         VALUES ($1, $2, COALESCE($3, FALSE), $4, COALESCE($5, FALSE), $6, $7, $8, $9) \
         ON CONFLICT (username) DO UPDATE SET updated_at = now() \
         RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, UserRecord>(&query)
        .bind(username)
        .bind(&attributes.phone_number)
        .bind(attributes.phone_number_verified)
        .bind(&attributes.email)
        .bind(attributes.email_verified)
        .bind(&attributes.name)
        .bind(&attributes.given_name)
        .bind(&attributes.family_name)
        .bind(&attributes.picture)
        .fetch_one(pool)
        .await
}

/// Apply the non-`None` fields of `updates` to an existing user.
///
/// # Errors
///
/// Returns an error on transport failure or for unknown users.
pub async fn update_attributes(
    pool: &PgPool,
    username: &str,
    updates: &UserAttributes,
) -> Result<UserRecord, sqlx::Error> {
    let query = format!(
        "UPDATE auth_users SET \
             phone_number = COALESCE($2, phone_number), \
             phone_number_verified = COALESCE($3, phone_number_verified), \
             email = COALESCE($4, email), \
             email_verified = COALESCE($5, email_verified), \
             name = COALESCE($6, name), \
             given_name = COALESCE($7, given_name), \
             family_name = COALESCE($8, family_name), \
             picture = COALESCE($9, picture), \
             updated_at = now() \
         WHERE username = $1 \
         RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, UserRecord>(&query)
        .bind(username)
        .bind(&updates.phone_number)
        .bind(updates.phone_number_verified)
        .bind(&updates.email)
        .bind(updates.email_verified)
        .bind(&updates.name)
        .bind(&updates.given_name)
        .bind(&updates.family_name)
        .bind(&updates.picture)
        .fetch_one(pool)
        .await
}

/// Move an unconfirmed user to the confirmed state.
///
/// # Errors
///
/// Returns an error on transport failure or for unknown users.
pub async fn confirm_user(pool: &PgPool, username: &str) -> Result<UserRecord, sqlx::Error> {
    let query = format!(
        "UPDATE auth_users SET status = 'CONFIRMED', updated_at = now() \
         WHERE username = $1 RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, UserRecord>(&query)
        .bind(username)
        .fetch_one(pool)
        .await
}

/// Make sure a directory user exists for `username`: create it confirmed on
/// first sight, reconcile changed attributes on every sighting, and confirm
/// any record stuck in the unconfirmed state.
///
/// # Errors
///
/// Returns [`IdpError::Transport`] on directory failures.
pub async fn ensure_user(
    pool: &PgPool,
    username: &str,
    desired: UserAttributes,
) -> Result<UserRecord, IdpError> {
    let Some(existing) = lookup_user(pool, username).await? else {
        let record = create_user(pool, username, &desired).await?;
        info!(%username, "Created directory user");
        return Ok(record);
    };

    let mut record = existing;

    let updates = desired.diff(&record);
    if !updates.is_empty() {
        debug!(%username, "Reconciling directory attributes");
        record = update_attributes(pool, username, &updates).await?;
    }

    if record.status == STATUS_UNCONFIRMED {
        record = confirm_user(pool, username).await?;
    }

    Ok(record)
}
