// Standard library imports
use std::path::Path;
use std::time::{Duration, Instant};

// External crate imports
use migration::{defined_migration_names, migrate, MigrationCommand};
use rand::Rng;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, Schema, SqlxSqliteConnector,
    Statement, TransactionTrait,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{error, info, trace, warn};

// Internal crate imports
use crate::config::db::{build_session_statements, sqlite_lock_path, DbSettings, LifecycleConfig};
use crate::entities::{blogs, posts};
use crate::error::DbInfraError;
use crate::infra::db::diagnostics::{lifecycle_counters, sqlite_diagnostics};
use crate::infra::db::locking::{Guard, SqliteFileLock};

const MIGRATIONS_TABLE: &str = "seaql_migrations";

/// Apply per-connection session settings (foreign_keys + busy_timeout).
async fn apply_sqlite_config(
    conn: &mut sqlx::SqliteConnection,
    settings: &DbSettings,
) -> Result<(), sqlx::Error> {
    for stmt in build_session_statements(settings) {
        sqlx::query(&stmt).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Open a single-connection pool on `db_path` and hand it to SeaORM.
///
/// With `create_if_missing = false` a missing file is an error rather than
/// a fresh empty store.
pub async fn open_sqlite(
    db_path: &Path,
    settings: &DbSettings,
    create_if_missing: bool,
) -> Result<DatabaseConnection, DbInfraError> {
    let connect_opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(create_if_missing);

    let db_settings = settings.clone();
    let pool: SqlitePool = SqlitePoolOptions::new()
        .min_connections(0)
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .after_connect(move |conn, _meta| {
            let settings = db_settings.clone();
            Box::pin(async move {
                apply_sqlite_config(conn, &settings).await?;
                trace!("db=sqlite hook=after_connect ok");
                Ok::<_, sqlx::Error>(())
            })
        })
        .connect_with(connect_opts)
        .await
        .map_err(|source| DbInfraError::Connect {
            path: db_path.to_path_buf(),
            source,
        })?;

    let db = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool);
    sqlite_diagnostics::log_pragma_snapshot(&db, db_path).await;
    Ok(db)
}

/// Close a connection opened by [`open_sqlite`]; failures are only logged.
pub async fn close_quietly(conn: DatabaseConnection, db_path: &Path) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, path = %db_path.display(), "Failed to close SQLite connection");
    }
}

/// Number of user tables in the store (SQLite internals excluded).
pub async fn user_table_count<C: ConnectionTrait>(conn: &C) -> Result<i64, DbErr> {
    let stmt = Statement::from_string(
        DatabaseBackend::Sqlite,
        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    );
    match conn.query_one(stmt).await? {
        Some(row) => row.try_get("", "n"),
        None => Ok(0),
    }
}

/// Applied migration names in order, read without creating the history table.
pub async fn applied_migration_names<C: ConnectionTrait>(conn: &C) -> Result<Vec<String>, DbErr> {
    let exists = Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
        vec![MIGRATIONS_TABLE.into()],
    );
    let present: i64 = match conn.query_one(exists).await? {
        Some(row) => row.try_get("", "n")?,
        None => 0,
    };
    if present == 0 {
        return Ok(Vec::new());
    }

    let rows = conn
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("SELECT version FROM {MIGRATIONS_TABLE} ORDER BY version"),
        ))
        .await?;
    rows.iter().map(|row| row.try_get("", "version")).collect()
}

/// Create every table of the current model inside one transaction.
/// No migration history is written.
pub async fn create_schema_from_model(conn: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    // Parents before children so foreign keys resolve.
    let statements = [
        backend.build(&schema.create_table_from_entity(blogs::Entity)),
        backend.build(&schema.create_table_from_entity(posts::Entity)),
    ];

    let txn = conn.begin().await?;
    for stmt in statements {
        txn.execute(stmt).await?;
    }
    txn.commit().await
}

fn migrate_failure(message: String) -> DbInfraError {
    DbInfraError::provision("migrate", DbErr::Custom(message))
}

async fn fast_path_schema_check(conn: &DatabaseConnection) -> Result<bool, DbInfraError> {
    let expected = defined_migration_names();
    let applied = applied_migration_names(conn)
        .await
        .map_err(|e| DbInfraError::provision("read migration history", e))?;

    let is_up_to_date = !expected.is_empty() && applied == expected;
    if is_up_to_date {
        lifecycle_counters::fast_path_hit();
        trace!(fastpath = "hit", applied_count = applied.len());
    } else {
        trace!(
            fastpath = "miss",
            applied_count = applied.len(),
            expected_count = expected.len(),
            current_last = %applied.last().map(String::as_str).unwrap_or(""),
            reason = "count_or_version_mismatch"
        );
    }
    Ok(is_up_to_date)
}

/// Bring the store at `db_path` to the latest migration under the
/// `<db>.migrate.lock` file lock. Creates the store when missing.
pub async fn migrate_sqlite_file(
    db_path: &Path,
    config: &LifecycleConfig,
) -> Result<(), DbInfraError> {
    info!("migrate=start engine=sqlite path={}", db_path.display());

    let conn = open_sqlite(db_path, &config.db_settings(), true).await?;
    let lock = SqliteFileLock::new(&sqlite_lock_path(db_path));
    let result = migrate_with_lock(&conn, lock, config).await;
    close_quietly(conn, db_path).await;

    if let Err(ref e) = result {
        if e.is_sqlite_busy() {
            lifecycle_counters::busy_event();
            error!("sqlite_busy op=migrate err={:?}", e);
        }
    }

    info!("migrate=done ok={}", result.is_ok());
    lifecycle_counters::log_snapshot("migrate_sqlite_file");
    result
}

async fn migrate_with_lock(
    conn: &DatabaseConnection,
    mut lock: SqliteFileLock,
    config: &LifecycleConfig,
) -> Result<(), DbInfraError> {
    let start = Instant::now();
    let mut attempts: u32 = 0;

    let guard = loop {
        attempts += 1;

        if fast_path_schema_check(conn).await? {
            info!("migrate=skipped up_to_date=true");
            return Ok(());
        }

        if let Some(acquired) = lock.try_acquire()? {
            trace!(
                lock = "won",
                attempts = attempts,
                elapsed_ms = start.elapsed().as_millis()
            );
            break acquired;
        }

        let base_delay_ms = (5u64 << attempts.saturating_sub(1).min(4)).min(80);
        let jitter_ms = rand::rng().random::<u64>() % 4;
        let delay_ms = base_delay_ms + jitter_ms;

        trace!(
            lock = "backoff",
            attempts = attempts,
            delay_ms = delay_ms,
            elapsed_ms = start.elapsed().as_millis()
        );
        lifecycle_counters::lock_backoff_event();

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if start.elapsed() >= Duration::from_millis(config.lock_acquire_ms) {
            lifecycle_counters::lock_acquire_timeout();
            return Err(DbInfraError::lock(format!(
                "migration lock acquisition timeout after {:?} ({} attempts)",
                start.elapsed(),
                attempts
            )));
        }
    };

    let result = migrate_with_guard(conn, &guard, config).await;

    if let Err(release_err) = guard.release() {
        warn!(error = %release_err, "Failed to release migration guard");
    }
    result
}

async fn migrate_with_guard(
    conn: &DatabaseConnection,
    guard: &Guard,
    config: &LifecycleConfig,
) -> Result<(), DbInfraError> {
    let start = Instant::now();

    // Another migrator may have finished while we were waiting for the lock.
    if fast_path_schema_check(conn).await? {
        info!("migrate=skipped up_to_date=true after_lock=true");
        return Ok(());
    }

    let pool = conn.clone();
    let mut task = tokio::spawn(async move { migrate(&pool, MigrationCommand::Up).await });
    let body_timeout = Duration::from_millis(config.migrate_body_timeout_ms);

    match tokio::time::timeout(body_timeout, &mut task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            lifecycle_counters::migration_failed();
            return Err(DbInfraError::provision("migrate", e));
        }
        Ok(Err(join_err)) => {
            lifecycle_counters::migration_failed();
            let what = if join_err.is_panic() {
                "panicked"
            } else {
                "was aborted"
            };
            return Err(migrate_failure(format!(
                "migration task {what} before completion"
            )));
        }
        Err(_) => {
            task.abort();
            let _ = task.await;
            lifecycle_counters::migration_body_timeout();
            return Err(migrate_failure(format!(
                "migration body execution timed out after {}ms",
                config.migrate_body_timeout_ms
            )));
        }
    }

    lifecycle_counters::migrator_ran();
    info!(
        migrator = "ran",
        lock_path = %guard.lock_path().display(),
        elapsed_ms = start.elapsed().as_millis()
    );

    let expected = defined_migration_names();
    let applied = applied_migration_names(conn)
        .await
        .map_err(|e| DbInfraError::provision("read migration history", e))?;
    info!(
        migrate = "counts",
        expected_count = expected.len(),
        applied_count = applied.len()
    );

    if applied != expected {
        lifecycle_counters::postcheck_mismatch();
        return Err(migrate_failure(format!(
            "Migration verification failed: expected {} migrations, but {} were applied",
            expected.len(),
            applied.len()
        )));
    }

    Ok(())
}
