//! Test utilities for intentcode
//!
//! Helpers shared by unit tests and the integration test binaries (enabled
//! there through the `test-utils` feature):
//!
//! - [`ScriptedProvider`] - a generation provider replaying scripted replies
//! - [`TestProject`] - a registered project in a temporary directory
//! - Fixtures for intent files, specs and extension packages
//!
//! # Example
//!
//! ```rust,no_run
//! use intentcode::test_utils::{IntentFixture, TestProject};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let project = TestProject::new()?;
//! project.write_intent(&IntentFixture::main_rs())?;
//! let summary = project.build().await?;
//! assert_eq!(summary.compiled, vec!["src/main.rs"]);
//! # Ok(())
//! # }
//! ```

pub mod environment;
pub mod fixtures;
pub mod provider;

pub use environment::TestProject;
pub use fixtures::{ExtensionFixture, IntentFixture, SpecFixture};
pub use provider::{ScriptedProvider, ScriptedReply};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging stays
/// off. Safe to call from every test.
///
/// ```bash
/// RUST_LOG=intentcode=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
