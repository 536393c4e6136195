//! Unit test suite for intentcode
//!
//! Exercises each component through the public API, one property per test.
//!
//! ```bash
//! cargo test --test unit
//! ```
//!
//! - **graph**: idempotent upsert, cascading delete, subtree copy
//! - **generation**: cache short-circuit, eviction between attempts, record retention
//! - **incremental**: recompilation only when the stable prompt or target changed
//! - **deps**: manifest divergence and front-matter reconciliation

mod deps;
mod generation;
mod graph;
mod incremental;
