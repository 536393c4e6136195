//! Project dependencies
//!
//! Generation reports the packages a source file needs as
//! [`DependencyDelta`]s; intent files may also declare packages in YAML
//! front-matter. The [`DependencyReconciler`] folds both into the graph and
//! keeps `.intentcode/deps.json` in step with it.

mod manifest;
mod reconciler;

pub use manifest::{DeltaKind, DependencyDelta, DepsManifest, PackageMap};
pub use reconciler::{
    DependencyReconciler, declared_dependencies, diff_declared, file_declared, file_dependencies,
};
