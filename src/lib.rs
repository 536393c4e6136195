//! intentcode - an incremental compiler from intent files to source code
//!
//! Projects describe what they want in natural-language specs (`specs/`) and
//! per-target pseudo-code intent files (`intent/src/main.rs.md` →
//! `src/main.rs`). A build turns specs into intent files and intent files into
//! source through a generation provider, validating every reply, caching valid
//! ones and recompiling only targets whose prompt changed.
//!
//! # Architecture Overview
//!
//! Every artifact of every build lives in one artifact graph (SQLite): projects,
//! build-runs, the path-shaped subtrees of specs, intent and source files,
//! generation metadata, dependency and extension nodes. Each node's content is
//! hashed; generation records keep the last few prompts and outputs per node.
//!
//! A build runs a plan of stages:
//!
//! ```text
//! verify-internals → define-tech-stack → specs-to-intent → update-deps
//!   → analyze-intent → [index] → compile → update-deps → verify-internals
//! ```
//!
//! and re-plans, up to a limit, whenever `update-deps` finds that the project's
//! dependencies moved.
//!
//! # Core Modules
//!
//! - [`graph`] - Artifact graph store and node model
//! - [`paths`] - Mapping between relative file paths and graph subtrees
//! - [`generation`] - Provider interface, cache, records, validated generation, prompts
//! - [`deps`] - `deps.json` manifest and the dependency reconciler
//! - [`extensions`] - Extension packages: parsing, loading, version selection
//! - [`build`] - Plan, session, orchestrator and stage handlers
//!
//! ## Supporting Modules
//! - [`core`] - Error types, user-facing error reporting, cancellation
//! - [`config`] - Per-project `build.toml` and the intentcode home directory
//! - [`project`] - Project layout and the [`Workspace`](project::Workspace) façade
//! - [`lock`] - Per-project build lock across processes
//! - [`cli`] - Command-line front end
//! - [`utils`] - Atomic writes, hashing, progress
//!
//! # Example
//!
//! ```rust,no_run
//! use intentcode::project::Workspace;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let workspace = Workspace::open(Path::new("/home/me/.intentcode"))?;
//! workspace.init_project("default", "web", Path::new("./web"))?;
//! let summary = workspace.run_build("default", "web").await?;
//! println!("compiled {} files", summary.compiled.len());
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod deps;
pub mod extensions;
pub mod generation;
pub mod graph;
pub mod lock;
pub mod paths;
pub mod project;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
