use anyhow::{bail, Context, Result};
use tracing::info;

use super::schema::validate_identifier;
use super::Db;
use crate::config::DbSettings;

/// Creates the target database if it does not already exist. Runs against
/// the maintenance database; CREATE DATABASE cannot take bind parameters, so
/// the name is quoted as an identifier.
pub async fn ensure_database(admin: &Db, db: &DbSettings) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(&db.name)
        .fetch_optional(admin)
        .await
        .with_context(|| format!("checking for database {} failed", db.name))?;
    if exists.is_some() {
        info!("database {} already exists", db.name);
        return Ok(());
    }

    let stmt = format!("CREATE DATABASE {}", quote_ident(&db.name)?);
    sqlx::query(&stmt)
        .execute(admin)
        .await
        .with_context(|| format!("creating database {} failed", db.name))?;
    info!("database {} created", db.name);
    Ok(())
}

/// Creates the application role if it does not already exist.
pub async fn ensure_role(admin: &Db, db: &DbSettings) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM pg_roles WHERE rolname = $1")
        .bind(&db.user)
        .fetch_optional(admin)
        .await
        .with_context(|| format!("checking for role {} failed", db.user))?;
    if exists.is_some() {
        info!("role {} already exists", db.user);
        return Ok(());
    }

    let stmt = format!(
        "CREATE ROLE {} WITH LOGIN PASSWORD {}",
        quote_ident(&db.user)?,
        quote_literal(&db.password)
    );
    sqlx::query(&stmt)
        .execute(admin)
        .await
        .with_context(|| format!("creating role {} failed", db.user))?;
    info!("role {} created", db.user);
    Ok(())
}

/// Creates the schema inside the target database, owned by the application
/// role. Must run on an admin connection into that database.
pub async fn ensure_schema(admin_db: &Db, db: &DbSettings) -> Result<()> {
    let exists =
        sqlx::query("SELECT 1 FROM information_schema.schemata WHERE schema_name = $1")
            .bind(&db.schema)
            .fetch_optional(admin_db)
            .await
            .with_context(|| format!("checking for schema {} failed", db.schema))?;
    if exists.is_some() {
        info!("schema '{}' already exists", db.schema);
        return Ok(());
    }

    validate_identifier(&db.schema)?;
    let stmt = format!(
        "CREATE SCHEMA {} AUTHORIZATION {}",
        db.schema,
        quote_ident(&db.user)?
    );
    sqlx::query(&stmt)
        .execute(admin_db)
        .await
        .with_context(|| format!("creating schema {} failed", db.schema))?;
    info!("schema '{}' created and owned by '{}'", db.schema, db.user);
    Ok(())
}

/// Double-quoted SQL identifier. Names carrying a quote are refused rather
/// than escaped.
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('"') || name.contains('\0') {
        bail!("invalid identifier: {name:?}");
    }
    Ok(format!("\"{name}\""))
}

/// Single-quoted SQL literal for statements that cannot take binds.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_double_quoted() {
        assert_eq!(quote_ident("assessment-hub").unwrap(), "\"assessment-hub\"");
        assert!(quote_ident("we\"ird").is_err());
        assert!(quote_ident("").is_err());
    }

    #[test]
    fn literals_escape_embedded_quotes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }
}
