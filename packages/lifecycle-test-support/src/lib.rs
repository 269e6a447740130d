//! Lifecycle test support utilities
//!
//! Unified logging initialization, throwaway data directories and a
//! file-backed fake context for providers without a real driver.

pub mod data_dir;
pub mod fake_context;
pub mod test_logging;
