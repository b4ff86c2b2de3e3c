use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use sqlx::Executor;
use tracing::info;

use super::Db;

/// DDL for the five relations, embedded at build time.
const SCHEMA_SQL: &str = include_str!("../../db/schema.sql");
const SCHEMA_PLACEHOLDER: &str = "<schema_name>";

fn identifier_re() -> &'static Regex {
    static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER_RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"))
}

/// The schema name reaches SQL text by string substitution, not a bind
/// parameter, so it must be vetted first.
pub fn validate_identifier(name: &str) -> Result<()> {
    if !identifier_re().is_match(name) {
        bail!("invalid identifier: {name}");
    }
    Ok(())
}

/// Applies the static DDL script into `schema`. Idempotent: every statement
/// is CREATE IF NOT EXISTS.
pub async fn apply_schema(pool: &Db, schema: &str) -> Result<()> {
    validate_identifier(schema)?;
    let sql = SCHEMA_SQL.replace(SCHEMA_PLACEHOLDER, schema);
    // Executed as a simple query so the script can hold several statements.
    pool.execute(sql.as_str())
        .await
        .context("applying db/schema.sql failed")?;
    info!("schema 'db/schema.sql' applied");
    Ok(())
}
