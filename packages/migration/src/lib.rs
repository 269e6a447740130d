pub use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{DatabaseBackend, Statement};
pub use sea_orm::{ConnectionTrait, DatabaseConnection};

mod m20240301_000001_create_blogs;
mod m20240301_000002_create_posts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_blogs::Migration),
            Box::new(m20240301_000002_create_posts::Migration),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    Up,
    Down,
    Fresh,
    Reset,
    Refresh,
    Status,
}

/// Run one migrator command against an open connection and log the
/// store's migration state before and after.
pub async fn migrate(db: &DatabaseConnection, command: MigrationCommand) -> Result<(), DbErr> {
    let before = StoreSnapshot::capture(db).await?;
    tracing::info!(
        cmd = ?command,
        backend = %before.backend,
        store = %before.store,
        defined = before.defined,
        applied = before.applied,
        "migration command starting"
    );

    let result = match command {
        MigrationCommand::Up => Migrator::up(db, None).await,
        MigrationCommand::Down => Migrator::down(db, None).await,
        MigrationCommand::Fresh => Migrator::fresh(db).await,
        MigrationCommand::Reset => Migrator::reset(db).await,
        MigrationCommand::Refresh => Migrator::refresh(db).await,
        MigrationCommand::Status => Migrator::status(db).await,
    };

    if let Err(e) = result {
        tracing::error!(cmd = ?command, store = %before.store, error = %e, "migration command failed");
        return Err(e);
    }

    // Status leaves the store untouched.
    if command != MigrationCommand::Status {
        let after = StoreSnapshot::capture(db).await?;
        tracing::info!(
            cmd = ?command,
            store = %after.store,
            applied_before = before.applied,
            applied_after = after.applied,
            latest = after.latest.as_deref().unwrap_or("-"),
            "migration command finished"
        );
    }
    Ok(())
}

#[derive(Debug)]
struct StoreSnapshot {
    backend: String,
    store: String,
    defined: usize,
    applied: usize,
    latest: Option<String>,
}

impl StoreSnapshot {
    async fn capture(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let backend = db.get_database_backend();
        Ok(Self {
            backend: format!("{backend:?}"),
            store: store_name(db).await?,
            defined: Migrator::migrations().len(),
            applied: count_applied_migrations(db).await.unwrap_or(0),
            latest: get_latest_migration_version(db).await.unwrap_or(None),
        })
    }
}

/// File backing the `main` schema, `:memory:` for in-memory stores.
async fn store_name(db: &DatabaseConnection) -> Result<String, DbErr> {
    if db.get_database_backend() != DatabaseBackend::Sqlite {
        return Ok("<unsupported>".to_string());
    }
    let stmt = Statement::from_string(
        DatabaseBackend::Sqlite,
        "SELECT file FROM pragma_database_list WHERE name = 'main'",
    );
    let name = match db.query_one(stmt).await? {
        Some(row) => match row.try_get::<String>("", "file") {
            Ok(file) if file.is_empty() => ":memory:".to_string(),
            Ok(file) => file,
            Err(_) => "<unknown>".to_string(),
        },
        None => "<unknown>".to_string(),
    };
    Ok(name)
}

/// Names of every defined migration, in application order.
pub fn defined_migration_names() -> Vec<String> {
    Migrator::migrations()
        .iter()
        .map(|m| m.name().to_string())
        .collect()
}

/// Count the number of migrations that have been applied to the database.
/// Returns 0 if the migration table doesn't exist yet.
pub async fn count_applied_migrations(db: &DatabaseConnection) -> Result<usize, DbErr> {
    match Migrator::get_applied_migrations(db).await {
        Ok(migrations) => Ok(migrations.len()),
        Err(DbErr::Exec(_)) => Ok(0),
        Err(e) => Err(e),
    }
}

/// Get the version string of the latest applied migration.
/// Returns None if no migrations have been applied or the migration table doesn't exist.
pub async fn get_latest_migration_version(
    db: &DatabaseConnection,
) -> Result<Option<String>, DbErr> {
    match Migrator::get_applied_migrations(db).await {
        Ok(migrations) => Ok(migrations.last().map(|m| m.name().to_string())),
        Err(DbErr::Exec(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
