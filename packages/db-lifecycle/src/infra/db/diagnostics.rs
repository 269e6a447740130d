/// SQLite connection diagnostics
pub mod sqlite_diagnostics {
    use std::path::Path;

    use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
    use tracing::debug;

    /// Log a few PRAGMA values for the connection at debug level.
    pub async fn log_pragma_snapshot<C: ConnectionTrait>(conn: &C, db_path: &Path) {
        for pragma in ["journal_mode", "foreign_keys", "busy_timeout"] {
            let query = format!("PRAGMA {pragma};");
            if let Ok(Some(row)) = conn
                .query_one(Statement::from_string(DatabaseBackend::Sqlite, query))
                .await
            {
                let value = row
                    .try_get::<String>("", pragma)
                    .ok()
                    .or_else(|| row.try_get::<i64>("", pragma).ok().map(|v| v.to_string()));

                if let Some(value) = value {
                    debug!(
                        path = %db_path.display(),
                        pragma = pragma,
                        value = value,
                        "PRAGMA snapshot"
                    );
                }
            }
        }
    }
}

/// Lifecycle counters - module-local atomics
pub mod lifecycle_counters {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CREATED_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static CREATE_SKIPPED_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static MIGRATOR_RAN_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static FAST_PATH_HIT_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static DELETED_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static DELETE_MISSING_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static LOCK_BACKOFF_EVENTS_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static LOCK_ACQUIRE_TIMEOUTS_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static MIGRATION_BODY_TIMEOUTS_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static MIGRATION_FAILED_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static POSTCHECK_MISMATCH_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static BUSY_EVENTS_TOTAL: AtomicUsize = AtomicUsize::new(0);

    pub fn created() {
        CREATED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn create_skipped() {
        CREATE_SKIPPED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn migrator_ran() {
        MIGRATOR_RAN_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fast_path_hit() {
        FAST_PATH_HIT_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deleted() {
        DELETED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delete_missing() {
        DELETE_MISSING_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lock_backoff_event() {
        LOCK_BACKOFF_EVENTS_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lock_acquire_timeout() {
        LOCK_ACQUIRE_TIMEOUTS_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn migration_body_timeout() {
        MIGRATION_BODY_TIMEOUTS_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn migration_failed() {
        MIGRATION_FAILED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn postcheck_mismatch() {
        POSTCHECK_MISMATCH_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn busy_event() {
        BUSY_EVENTS_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    #[derive(Debug, Clone, Copy)]
    pub struct Snapshot {
        pub created_total: usize,
        pub create_skipped_total: usize,
        pub migrator_ran_total: usize,
        pub fast_path_hit_total: usize,
        pub deleted_total: usize,
        pub delete_missing_total: usize,
        pub lock_backoff_events_total: usize,
        pub lock_acquire_timeouts_total: usize,
        pub migration_body_timeouts_total: usize,
        pub migration_failed_total: usize,
        pub postcheck_mismatch_total: usize,
        pub busy_events_total: usize,
    }

    pub fn snapshot() -> Snapshot {
        Snapshot {
            created_total: CREATED_TOTAL.load(Ordering::Relaxed),
            create_skipped_total: CREATE_SKIPPED_TOTAL.load(Ordering::Relaxed),
            migrator_ran_total: MIGRATOR_RAN_TOTAL.load(Ordering::Relaxed),
            fast_path_hit_total: FAST_PATH_HIT_TOTAL.load(Ordering::Relaxed),
            deleted_total: DELETED_TOTAL.load(Ordering::Relaxed),
            delete_missing_total: DELETE_MISSING_TOTAL.load(Ordering::Relaxed),
            lock_backoff_events_total: LOCK_BACKOFF_EVENTS_TOTAL.load(Ordering::Relaxed),
            lock_acquire_timeouts_total: LOCK_ACQUIRE_TIMEOUTS_TOTAL.load(Ordering::Relaxed),
            migration_body_timeouts_total: MIGRATION_BODY_TIMEOUTS_TOTAL.load(Ordering::Relaxed),
            migration_failed_total: MIGRATION_FAILED_TOTAL.load(Ordering::Relaxed),
            postcheck_mismatch_total: POSTCHECK_MISMATCH_TOTAL.load(Ordering::Relaxed),
            busy_events_total: BUSY_EVENTS_TOTAL.load(Ordering::Relaxed),
        }
    }

    pub fn log_snapshot(context: &str) {
        let s = snapshot();
        tracing::info!(
            context = context,
            created_total = s.created_total,
            create_skipped_total = s.create_skipped_total,
            migrator_ran_total = s.migrator_ran_total,
            fast_path_hit_total = s.fast_path_hit_total,
            deleted_total = s.deleted_total,
            delete_missing_total = s.delete_missing_total,
            lock_backoff_events_total = s.lock_backoff_events_total,
            lock_acquire_timeouts_total = s.lock_acquire_timeouts_total,
            migration_body_timeouts_total = s.migration_body_timeouts_total,
            migration_failed_total = s.migration_failed_total,
            postcheck_mismatch_total = s.postcheck_mismatch_total,
            busy_events_total = s.busy_events_total,
            "db_lifecycle_counters_snapshot"
        );
    }
}
