//! Integration test suite for intentcode
//!
//! End-to-end builds against a scripted generation provider, plus the command
//! line surface driven through the compiled binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **build_pipeline**: full builds over specs, intent files and extensions
//! - **replan**: dependency-driven re-planning and its limit
//! - **cli**: `init`, `build`, `deps verify` and `extensions list`

mod build_pipeline;
mod cli;
mod replan;
