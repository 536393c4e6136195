//! The dependency manifest model.
//!
//! [`DepsManifest`] is both the on-disk schema of `.intentcode/deps.json` and
//! the structured content of a project's dependency-root node, so the two can
//! be compared directly.

use crate::constants::DEFAULT_RUNTIME;
use crate::core::IntentError;
use crate::generation::validators;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Package requirements keyed by package name.
pub type PackageMap = BTreeMap<String, String>;

/// Whether a delta adds/updates or removes a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    Set,
    Delete,
}

/// One change to a file's dependency set, as emitted by generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDelta {
    pub kind: DeltaKind,
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

impl DependencyDelta {
    pub fn set(package_name: impl Into<String>, min_version: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Set,
            package_name: package_name.into(),
            min_version: Some(min_version.into()),
            runtime: None,
        }
    }

    pub fn delete(package_name: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Delete,
            package_name: package_name.into(),
            min_version: None,
            runtime: None,
        }
    }

    /// Requirement recorded for a set delta; `*` when none was given.
    #[must_use]
    pub fn requirement(&self) -> &str {
        self.min_version.as_deref().unwrap_or("*")
    }

    /// Check the delta the way generation output is checked.
    pub fn validate(&self) -> Result<(), IntentError> {
        let value = serde_json::to_value(self).map_err(IntentError::from)?;
        validators::dependency_delta(&value).map_err(|reason| IntentError::InvalidDependency {
            name: self.package_name.clone(),
            reason,
        })
    }

    /// Parse the `dependencyDeltas` array of a compile output.
    pub fn from_output(output: &Value) -> Result<Vec<Self>> {
        match output.get("dependencyDeltas") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(deltas) => {
                serde_json::from_value(deltas.clone()).context("Malformed dependencyDeltas in generation output")
            }
        }
    }
}

/// Project-level dependency state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepsManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<PackageMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtimes: Option<BTreeMap<String, PackageMap>>,
}

impl DepsManifest {
    /// Read from a node payload; an absent payload is an empty manifest.
    pub fn from_value(value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => {
                serde_json::from_value(value.clone()).context("Dependency root holds a malformed manifest")
            }
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Read `deps.json`. A missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self> {
        match crate::utils::read_text_if_exists(path)? {
            None => Ok(Self::default()),
            Some(text) if text.trim().is_empty() => Ok(Self::default()),
            Some(text) => serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse dependency manifest: {}", path.display())),
        }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Runtime that deltas without an explicit runtime fold into.
    #[must_use]
    pub fn default_runtime(&self) -> String {
        self.runtimes
            .as_ref()
            .and_then(|runtimes| runtimes.keys().next().cloned())
            .unwrap_or_else(|| DEFAULT_RUNTIME.to_string())
    }

    /// Record `package` under `runtime`, overwriting an earlier requirement.
    pub fn set_package(&mut self, runtime: &str, package: &str, requirement: &str) {
        self.runtimes
            .get_or_insert_with(BTreeMap::new)
            .entry(runtime.to_string())
            .or_default()
            .insert(package.to_string(), requirement.to_string());
    }

    /// Fold another manifest in: `tool` is replaced when present, runtimes and
    /// extensions are merged key by key. Nothing is removed.
    pub fn merge(&mut self, other: &Self) {
        if let Some(tool) = &other.tool {
            self.tool = Some(tool.clone());
        }
        if let Some(runtimes) = &other.runtimes {
            let ours = self.runtimes.get_or_insert_with(BTreeMap::new);
            for (runtime, packages) in runtimes {
                let entry = ours.entry(runtime.clone()).or_default();
                for (name, requirement) in packages {
                    entry.insert(name.clone(), requirement.clone());
                }
            }
        }
        if let Some(extensions) = &other.extensions {
            let ours = self.extensions.get_or_insert_with(BTreeMap::new);
            for (name, requirement) in extensions {
                ours.insert(name.clone(), requirement.clone());
            }
        }
    }

    /// Every package across runtimes.
    pub fn packages(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.runtimes.iter().flatten().flat_map(|(runtime, packages)| {
            packages.iter().map(move |(name, req)| (runtime.as_str(), name.as_str(), req.as_str()))
        })
    }
}
