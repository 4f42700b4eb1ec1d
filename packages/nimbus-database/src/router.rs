//! # Connection Router
//!
//! Derives schema-scoped connection options for tenant database access.
//!
//! Every tenant lives in its own schema within the shared database. Rather
//! than qualifying each table name, connections are built with the tenant
//! schema as their `search_path` so all unqualified statements resolve inside
//! that tenant's namespace.

use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

/// PostgreSQL identifier length limit
const MAX_SCHEMA_NAME_LENGTH: usize = 63;

#[derive(Debug, Error)]
#[error("invalid tenant schema name: {0:?}")]
pub struct InvalidSchemaName(pub String);

/// Derive connection options confined to the provided tenant schema.
///
/// Statements on connections built from the returned options implicitly
/// operate inside `schema` without needing to qualify table names.
///
/// Schema names are validated by the tenant lifecycle tooling before they
/// reach the directory, the check here is only a last line of defense
/// against a malformed directory row reaching a connection string.
pub fn schema_connect_options(
    base: &PgConnectOptions,
    schema: &str,
) -> Result<PgConnectOptions, InvalidSchemaName> {
    validate_schema_name(schema)?;
    Ok(base.clone().options([("search_path", schema)]))
}

/// Validate that `schema` is a plain lowercase PostgreSQL identifier
pub fn validate_schema_name(schema: &str) -> Result<(), InvalidSchemaName> {
    let mut chars = schema.chars();

    let valid_first = chars
        .next()
        .is_some_and(|char| char.is_ascii_lowercase() || char == '_');

    let valid_rest =
        chars.all(|char| char.is_ascii_lowercase() || char.is_ascii_digit() || char == '_');

    if !valid_first || !valid_rest || schema.len() > MAX_SCHEMA_NAME_LENGTH {
        return Err(InvalidSchemaName(schema.to_string()));
    }

    Ok(())
}
