use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement, TransactionTrait,
};
use tokio::fs;

use crate::config::AppConfig;

const MIGRATIONS_DIR: &str = "migrations";

pub async fn create_orm_conn(config: &AppConfig) -> Result<DatabaseConnection> {
    let mut opts = ConnectOptions::new(config.database_url.clone());
    opts.max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    Ok(Database::connect(opts).await?)
}

/// Applies every `migrations/*.sql` file not yet recorded in `schema_migrations`,
/// in filename order. Each file runs in its own transaction together with its
/// ledger row.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let backend = conn.get_database_backend();
    conn.execute(Statement::from_string(
        backend,
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
             name TEXT PRIMARY KEY, \
             applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
    ))
    .await?;

    let applied: Vec<String> = conn
        .query_all(Statement::from_string(
            backend,
            "SELECT name FROM schema_migrations",
        ))
        .await?
        .iter()
        .map(|row| row.try_get::<String>("", "name"))
        .collect::<Result<_, _>>()?;

    for file in migration_files().await? {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if applied.contains(&name) {
            tracing::debug!(migration = %name, "already applied");
            continue;
        }

        let sql = fs::read_to_string(&file).await?;
        let txn = conn.begin().await?;
        for stmt in split_statements(&sql) {
            txn.execute(Statement::from_string(backend, stmt)).await?;
        }
        txn.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO schema_migrations (name) VALUES ($1)",
            [name.clone().into()],
        ))
        .await?;
        txn.commit().await?;
        tracing::info!(migration = %name, "migration applied");
    }

    Ok(())
}

async fn migration_files() -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(MIGRATIONS_DIR).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Splits a migration into single statements; prepared statements cannot
/// carry more than one command. `--` comment lines are dropped.
fn split_statements(sql: &str) -> Vec<String> {
    let stripped: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    stripped
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(|stmt| format!("{stmt};"))
        .collect()
}
