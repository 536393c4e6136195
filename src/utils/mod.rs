//! Shared helpers
//!
//! - [`fs`] - Atomic writes and directory helpers
//! - [`checksum`] - `sha256:` content hashing, including canonical JSON hashing
//! - [`progress`] - Spinners for build stages

pub mod checksum;
pub mod fs;
pub mod progress;

pub use checksum::{canonical_json, hash_bytes, hash_json, hash_parts, hash_text};
pub use fs::{atomic_write, ensure_dir, normalize_path_for_storage, read_text_if_exists, safe_write};
pub use progress::BuildProgress;
