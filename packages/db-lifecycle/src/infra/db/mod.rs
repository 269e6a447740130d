//! Database infrastructure - contexts, migrations, locking and diagnostics.

pub mod context;
pub mod core;
pub mod diagnostics;
pub mod locking;
pub mod sqlite;

pub use context::{ContextFactory, DatabaseContext, DefaultContextFactory};
pub use diagnostics::lifecycle_counters;
pub use locking::{Guard, SqliteFileLock};
pub use sqlite::SqliteContext;
