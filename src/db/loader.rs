use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tracing::info;

use super::schema::validate_identifier;
use super::Db;
use crate::models::Attempt;

/// Loads one batch of validated attempts.
///
/// Clients, courses, users and targets are upserted first so the attempt
/// rows can reference them; conflicting attempt inserts are silently ignored
/// to keep replays of the same window idempotent. Records whose identifier
/// failed to decode land with NULL course and target.
pub async fn insert_attempts(
    pool: &Db,
    schema: &str,
    client: &str,
    attempts: &[Attempt],
) -> Result<()> {
    validate_identifier(schema)?;

    sqlx::query(&format!(
        "INSERT INTO {schema}.clients (name) VALUES ($1) ON CONFLICT (name) DO NOTHING"
    ))
    .bind(client)
    .execute(pool)
    .await
    .context("inserting client failed")?;

    let client_id: i32 =
        sqlx::query_scalar(&format!("SELECT id FROM {schema}.clients WHERE name = $1"))
            .bind(client)
            .fetch_one(pool)
            .await
            .context("looking up client id failed")?;

    // Dedup referenced entities so each lands in one statement per value.
    let courses: BTreeSet<&str> = attempts
        .iter()
        .filter_map(|a| a.course_name.as_deref())
        .collect();
    let users: BTreeSet<&str> = attempts.iter().map(|a| a.user_id.as_str()).collect();
    let targets: BTreeSet<&str> = attempts
        .iter()
        .filter_map(|a| a.target_id.as_deref())
        .collect();

    for course in courses {
        sqlx::query(&format!(
            "INSERT INTO {schema}.courses (name, client_id) VALUES ($1, $2) \
             ON CONFLICT (name, client_id) DO NOTHING"
        ))
        .bind(course)
        .bind(client_id)
        .execute(pool)
        .await
        .context("inserting course failed")?;
    }

    for user in users {
        sqlx::query(&format!(
            "INSERT INTO {schema}.users (external_id) VALUES ($1) \
             ON CONFLICT (external_id) DO NOTHING"
        ))
        .bind(user)
        .execute(pool)
        .await
        .context("inserting user failed")?;
    }

    for target in targets {
        sqlx::query(&format!(
            "INSERT INTO {schema}.targets (external_id) VALUES ($1) \
             ON CONFLICT (external_id) DO NOTHING"
        ))
        .bind(target)
        .execute(pool)
        .await
        .context("inserting target failed")?;
    }

    for att in attempts {
        sqlx::query(&format!(
            "INSERT INTO {schema}.attempts (\
                 created_at, user_id, course_id, target_id, attempt_type, is_correct, \
                 raw_oauth_consumer_key, raw_lis_result_sourcedid, raw_lis_outcome_service_url\
             ) VALUES (\
                 $1, \
                 (SELECT id FROM {schema}.users WHERE external_id = $2), \
                 (SELECT id FROM {schema}.courses WHERE name = $3 AND client_id = $4), \
                 (SELECT id FROM {schema}.targets WHERE external_id = $5), \
                 $6, $7, $8, $9, $10\
             ) ON CONFLICT (user_id, created_at, raw_lis_result_sourcedid) DO NOTHING"
        ))
        .bind(att.created_at)
        .bind(&att.user_id)
        .bind(&att.course_name)
        .bind(client_id)
        .bind(&att.target_id)
        .bind(att.attempt_type.as_str())
        .bind(att.is_correct)
        .bind(&att.raw_oauth_consumer_key)
        .bind(&att.raw_lis_result_sourcedid)
        .bind(&att.raw_lis_outcome_service_url)
        .execute(pool)
        .await
        .context("inserting attempt failed")?;
    }

    info!("{} attempts processed into the database", attempts.len());
    Ok(())
}
