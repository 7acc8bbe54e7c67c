//! Bulk import of identifiers into a queue table.

use std::path::Path;

use sqlx::PgPool;

use crate::models::job::JobType;
use crate::services::queue::{QueueStore, StoreError};

/// Parse an identifier file: one id per line, only the first `|`-delimited
/// field counts, blank lines are skipped, ids are lower-cased.
pub fn parse_identifiers(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| line.split('|').next())
        .map(|id| id.trim().trim_matches('"'))
        .filter(|id| !id.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Load identifiers from a file into the queue. The caller is responsible
/// for truncating first when a fresh reload is wanted.
pub async fn load_from_file(store: &dyn QueueStore, path: &Path) -> Result<u64, LoadError> {
    let start = std::time::Instant::now();
    let contents = tokio::fs::read_to_string(path).await?;
    let ids = parse_identifiers(&contents);

    tracing::info!(
        job_type = %store.job_type(),
        file = %path.display(),
        ids = ids.len(),
        "Loading identifiers from file"
    );

    let inserted = store.bulk_insert(&ids).await?;

    tracing::info!(
        inserted,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Load from file done"
    );
    Ok(inserted)
}

/// Where the bulk-query loader reads identifiers from.
#[derive(Debug, Clone)]
pub struct SourceDataset {
    pub table: String,
    pub id_column: String,
}

impl SourceDataset {
    pub fn new(table: &str, id_column: &str) -> Result<Self, LoadError> {
        validate_identifier(table)?;
        validate_identifier(id_column)?;
        Ok(Self {
            table: table.to_string(),
            id_column: id_column.to_string(),
        })
    }

    fn insert_statement(&self, job_type: JobType, filter: Option<&str>) -> String {
        let mut sql = format!(
            "INSERT INTO {} (id) SELECT DISTINCT lower({}) FROM {} WHERE {} IS NOT NULL",
            job_type.table_name(),
            self.id_column,
            self.table,
            self.id_column
        );
        if let Some(filter) = filter {
            sql.push_str(" AND (");
            sql.push_str(filter);
            sql.push(')');
        }
        sql
    }
}

/// Load every identifier of the source dataset, optionally narrowed by an
/// operator-supplied SQL predicate.
pub async fn load_from_source(
    pool: &PgPool,
    job_type: JobType,
    source: &SourceDataset,
    filter: Option<&str>,
) -> Result<u64, LoadError> {
    tracing::info!(
        job_type = %job_type,
        source = %source.table,
        filter = filter.unwrap_or(""),
        "Adding all identifiers from source, this may take a while"
    );
    let start = std::time::Instant::now();

    let sql = source.insert_statement(job_type, filter);
    let result = sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(StoreError::from)?;

    tracing::info!(
        inserted = result.rows_affected(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Load from source done"
    );
    Ok(result.rows_affected())
}

/// Accept `name` or `schema.name` made of ASCII letters, digits and `_`.
fn validate_identifier(name: &str) -> Result<(), LoadError> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(LoadError::InvalidIdentifier(name.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read identifier file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid SQL identifier for source dataset: {0:?}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
