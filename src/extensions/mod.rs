//! Extension packages
//!
//! An extension bundles skills (Markdown guidance rendered into compile
//! prompts) and hooks (JSON definitions) under a semver-versioned manifest.
//! Packages on disk are parsed by [`ExtensionPackage`] and moved into the graph
//! by [`ExtensionLoader`].

mod loader;
mod package;

pub use loader::{ExtensionLoader, LoadedExtensions};
pub use package::{
    ExtensionManifest, ExtensionPackage, HookFile, MANIFEST_FILE, SkillFile, minimum_requirement,
    parse_version,
};
