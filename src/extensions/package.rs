//! On-disk extension packages.
//!
//! ```text
//! rust-style/
//! ├── extension.json      {"id": "...", "name": "rust-style", "version": "1.2.0", ...}
//! ├── skills/
//! │   └── errors.md       YAML front-matter + Markdown body
//! └── hooks/
//!     └── pre-compile.json
//! ```

use crate::core::IntentError;
use crate::utils::normalize_path_for_storage;
use anyhow::{Context, Result};
use gray_matter::Matter;
use gray_matter::engine::YAML;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Manifest file at the root of every package.
pub const MANIFEST_FILE: &str = "extension.json";

const SKILLS_DIR: &str = "skills";
const HOOKS_DIR: &str = "hooks";

/// Contents of `extension.json`. Unknown fields are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A Markdown skill: front-matter as structured metadata, body as prose.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillFile {
    /// Path relative to `skills/`.
    pub path: String,
    pub metadata: Option<Value>,
    pub body: String,
}

/// A JSON hook definition.
#[derive(Debug, Clone, PartialEq)]
pub struct HookFile {
    /// Path relative to `hooks/`.
    pub path: String,
    pub config: Value,
}

/// A parsed extension package.
#[derive(Debug, Clone)]
pub struct ExtensionPackage {
    pub dir: PathBuf,
    pub manifest: ExtensionManifest,
    pub version: Version,
    pub skills: Vec<SkillFile>,
    pub hooks: Vec<HookFile>,
}

impl ExtensionPackage {
    /// Parse the package in `dir`.
    pub fn read(dir: &Path) -> Result<Self> {
        let invalid = |reason: String| IntentError::InvalidExtension {
            path: dir.display().to_string(),
            reason,
        };

        let manifest_path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read extension manifest: {}", manifest_path.display()))?;
        let manifest: ExtensionManifest = serde_json::from_str(&text)
            .map_err(|e| invalid(format!("{MANIFEST_FILE} is malformed: {e}")))?;

        if manifest.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()).into());
        }
        if manifest.name.contains('@') || manifest.name.contains('/') {
            return Err(invalid(format!("name '{}' must not contain '@' or '/'", manifest.name)).into());
        }
        let version = parse_version(&manifest.version)
            .map_err(|e| invalid(format!("version '{}' is not semver: {e}", manifest.version)))?;

        let skills = walk_files(dir, SKILLS_DIR, "md")?
            .into_iter()
            .map(|(path, file)| read_skill(&file, path))
            .collect::<Result<Vec<_>>>()?;
        let hooks = walk_files(dir, HOOKS_DIR, "json")?
            .into_iter()
            .map(|(path, file)| {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read hook file: {}", file.display()))?;
                let config = serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse hook config: {}", file.display()))?;
                Ok(HookFile {
                    path,
                    config,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
            version,
            skills,
            hooks,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Graph node name: `<name>@<version>`.
    #[must_use]
    pub fn node_name(&self) -> String {
        format!("{}@{}", self.manifest.name, self.version)
    }
}

fn read_skill(file: &Path, path: String) -> Result<SkillFile> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read skill file: {}", file.display()))?;
    let parsed = Matter::<YAML>::new()
        .parse::<serde_yaml::Value>(&text)
        .with_context(|| format!("Failed to parse skill front-matter: {}", file.display()))?;
    let metadata = parsed
        .data
        .map(serde_json::to_value)
        .transpose()
        .with_context(|| format!("Skill front-matter is not representable as JSON: {}", file.display()))?;
    Ok(SkillFile {
        path,
        metadata,
        body: parsed.content,
    })
}

/// Files with `extension` under `package/sub`, sorted, as `(relative, absolute)`.
///
/// Symlinks are rejected: a package must not reach outside its directory.
fn walk_files(package: &Path, sub: &str, extension: &str) -> Result<Vec<(String, PathBuf)>> {
    let base = package.join(sub);
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&base).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_symlink() {
            return Err(IntentError::InvalidExtension {
                path: package.display().to_string(),
                reason: format!("{} is a symlink, which packages may not contain", entry.path().display()),
            }
            .into());
        }
        if entry.file_type().is_file() && entry.path().extension().and_then(|e| e.to_str()) == Some(extension) {
            let relative = entry.path().strip_prefix(&base)?;
            files.push((normalize_path_for_storage(relative), entry.path().to_path_buf()));
        }
    }
    Ok(files)
}

/// Parse a version, padding missing components (`1` is `1.0.0`, `1.2` is `1.2.0`).
pub fn parse_version(text: &str) -> Result<Version, semver::Error> {
    let text = text.trim().trim_start_matches('v');
    match Version::parse(text) {
        Ok(version) => Ok(version),
        Err(e) => {
            let core = text.split(['-', '+']).next().unwrap_or(text);
            let dots = core.matches('.').count();
            if dots >= 2 || core.is_empty() || !core.chars().all(|c| c.is_ascii_digit() || c == '.') {
                return Err(e);
            }
            let padded = format!("{core}{}{}", ".0".repeat(2 - dots), &text[core.len()..]);
            Version::parse(&padded)
        }
    }
}

/// Requirement for a requested minimum: a bare version means `>= version`,
/// anything else is parsed as a semver requirement.
pub fn minimum_requirement(min_version: &str) -> Result<VersionReq, semver::Error> {
    let min_version = min_version.trim();
    if min_version.starts_with(|c: char| c.is_ascii_digit() || c == 'v') {
        let version = parse_version(min_version)?;
        VersionReq::parse(&format!(">={version}"))
    } else {
        VersionReq::parse(min_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_package(root: &Path, name: &str, version: &str) -> PathBuf {
        let dir = root.join(format!("{name}-{version}"));
        std::fs::create_dir_all(dir.join("skills").join("style")).unwrap();
        std::fs::create_dir_all(dir.join("hooks")).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!(r#"{{"id": "{name}", "name": "{name}", "version": "{version}", "license": "MIT"}}"#),
        )
        .unwrap();
        std::fs::write(
            dir.join("skills").join("style").join("errors.md"),
            "---\ntitle: Errors\n---\nPropagate with ?\n",
        )
        .unwrap();
        std::fs::write(dir.join("hooks").join("pre.json"), r#"{"event": "pre-compile"}"#).unwrap();
        dir
    }

    #[test]
    fn test_read_package() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(temp.path(), "rust-style", "1.2");
        let package = ExtensionPackage::read(&dir).unwrap();

        assert_eq!(package.node_name(), "rust-style@1.2.0");
        assert_eq!(package.manifest.extra["license"], "MIT");
        assert_eq!(package.skills.len(), 1);
        assert_eq!(package.skills[0].path, "style/errors.md");
        assert_eq!(package.skills[0].metadata.as_ref().unwrap()["title"], "Errors");
        assert!(package.skills[0].body.contains("Propagate with ?"));
        assert_eq!(package.hooks[0].config["event"], "pre-compile");
    }

    #[test]
    fn test_read_rejects_bad_manifest() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("bad");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), r#"{"id": "x", "name": "x", "version": "soon"}"#).unwrap();
        let err = ExtensionPackage::read(&dir).unwrap_err();
        assert!(matches!(err.downcast_ref::<IntentError>(), Some(IntentError::InvalidExtension { .. })));

        std::fs::write(dir.join(MANIFEST_FILE), r#"{"id": "x", "name": "", "version": "1.0.0"}"#).unwrap();
        assert!(ExtensionPackage::read(&dir).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_rejects_symlinks() {
        let temp = TempDir::new().unwrap();
        let dir = write_package(temp.path(), "linked", "1.0.0");
        std::os::unix::fs::symlink("/etc/hosts", dir.join("skills").join("hosts.md")).unwrap();
        assert!(ExtensionPackage::read(&dir).is_err());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("1").unwrap(), Version::new(1, 0, 0));
        assert_eq!(parse_version("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_version("v2.0.1").unwrap(), Version::new(2, 0, 1));
        assert!(parse_version("latest").is_err());
        assert!(parse_version("").is_err());
    }

    #[test]
    fn test_minimum_requirement() {
        let req = minimum_requirement("1.2").unwrap();
        assert!(req.matches(&Version::new(1, 2, 0)));
        assert!(req.matches(&Version::new(3, 0, 0)));
        assert!(!req.matches(&Version::new(1, 1, 9)));

        let caret = minimum_requirement("^1.0").unwrap();
        assert!(!caret.matches(&Version::new(2, 0, 0)));
        assert!(minimum_requirement("*").unwrap().matches(&Version::new(0, 1, 0)));
    }
}
