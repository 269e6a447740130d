//! Quiet-by-default tracing for lifecycle tests.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

const CRATES: [&str; 3] = ["db_lifecycle", "migration", "lifecycle_test_support"];

/// Install a test-writer subscriber once per test binary.
///
/// `TEST_LOG` wins over `RUST_LOG`; with neither set only warnings show.
/// A bare level in `TEST_LOG` (`TEST_LOG=debug`) applies to the lifecycle
/// crates only, so sqlx statement logging stays at `warn`.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let filter = match std::env::var("TEST_LOG") {
            Ok(value) => EnvFilter::new(expand_bare_level(&value)),
            Err(_) => std::env::var("RUST_LOG")
                .map(EnvFilter::new)
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        };

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .with_target(true)
            .try_init()
            .ok();
    });
}

fn expand_bare_level(value: &str) -> String {
    let value = value.trim();
    let is_bare = matches!(
        value.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    );
    if !is_bare {
        return value.to_string();
    }
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|krate| format!("{krate}={value}")));
    directives.join(",")
}
