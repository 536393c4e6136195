//! Global constants used throughout the intentcode codebase.
//!
//! This module contains directory names, retention counts, retry bounds and
//! timeouts used across multiple modules. Defining them centrally keeps magic
//! numbers discoverable.

use std::time::Duration;

/// Scope holding the template project that extension packages are loaded into.
pub const SYSTEM_SCOPE: &str = "system";

/// Scope used by the CLI when none is given.
pub const DEFAULT_SCOPE: &str = "default";

/// Name of the template project inside [`SYSTEM_SCOPE`].
pub const SYSTEM_PROJECT: &str = "templates";

/// Per-project configuration directory.
pub const CONFIG_DIR: &str = ".intentcode";

/// Natural-language specification directory.
pub const SPECS_DIR: &str = "specs";

/// Intent file directory.
pub const INTENT_DIR: &str = "intent";

/// Dependency manifest file inside [`CONFIG_DIR`].
pub const DEPS_FILE: &str = "deps.json";

/// Build configuration file inside [`CONFIG_DIR`].
pub const BUILD_CONFIG_FILE: &str = "build.toml";

/// Specs file describing the tech stack.
pub const TECH_STACK_SPEC: &str = "tech-stack.md";

/// Extension used by specs and intent files.
pub const MARKDOWN_EXTENSION: &str = "md";

/// Graph database file inside the intentcode home directory.
pub const DATABASE_FILE: &str = "graph.db";

/// Extension template directory inside the intentcode home directory.
pub const EXTENSIONS_DIR: &str = "extensions";

/// Environment variable overriding the intentcode home directory.
pub const HOME_ENV_VAR: &str = "INTENTCODE_HOME";

/// Environment variable that disables progress spinners.
pub const NO_PROGRESS_ENV_VAR: &str = "INTENTCODE_NO_PROGRESS";

/// Runtime that dependency deltas fold into when neither the delta nor the
/// tech stack names one.
pub const DEFAULT_RUNTIME: &str = "default";

/// Maximum generation attempts before a call site gives up.
pub const MAX_GENERATION_ATTEMPTS: usize = 5;

/// Generation records kept per owner node.
pub const GENERATION_RECORD_RETENTION: usize = 5;

/// Build runs kept per project (including the one about to start).
pub const BUILD_RUN_RETENTION: usize = 3;

/// Re-plans allowed in one build before it is aborted.
pub const MAX_REPLANS: usize = 5;

/// Default time to wait for another build of the same project.
pub fn default_lock_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Maximum delay between lock attempts.
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// First delay between lock attempts.
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Default timeout for one command-provider invocation.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 300;

/// Name of every project's dependency-root node.
pub const DEPENDENCY_ROOT_NAME: &str = "dependencies";

/// Name of every project's extensions-root node.
pub const EXTENSIONS_ROOT_NAME: &str = "extensions";

/// Name of every project's build-container node.
pub const BUILD_CONTAINER_NAME: &str = "builds";

/// Name of every project's specs-root node.
pub const SPECS_ROOT_NAME: &str = "specs";

/// Name of every project's local-config-root node.
pub const LOCAL_CONFIG_ROOT_NAME: &str = "config";

/// Names of the per-run roots.
pub const INTENT_ROOT_NAME: &str = "intent";
pub const SOURCE_ROOT_NAME: &str = "source";
pub const ANALYSIS_ROOT_NAME: &str = "analysis";
pub const TECH_STACK_NODE_NAME: &str = "tech-stack";

/// Name of the `indexed-metadata` child of an intent file.
pub const INDEX_NODE_NAME: &str = "index";

/// Name of the `generation-metadata` child of a source file.
pub const GENERATION_NODE_NAME: &str = "generation";
