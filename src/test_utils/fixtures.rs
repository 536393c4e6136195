//! Test fixtures: intent files, specs and extension packages on disk.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// An intent file with optional front-matter dependencies.
#[derive(Clone, Debug)]
pub struct IntentFixture {
    /// Path relative to `intent/`, e.g. `src/main.rs.md`.
    pub path: String,
    pub body: String,
    pub dependencies: BTreeMap<String, String>,
}

impl IntentFixture {
    pub fn new(path: &str, body: &str) -> Self {
        Self {
            path: path.to_string(),
            body: body.to_string(),
            dependencies: BTreeMap::new(),
        }
    }

    /// The entry point of a small command-line program.
    pub fn main_rs() -> Self {
        Self::new("src/main.rs.md", "# main\n\nPrint a greeting and exit with status 0.\n")
    }

    #[must_use]
    pub fn with_dependency(mut self, name: &str, min_version: &str) -> Self {
        self.dependencies.insert(name.to_string(), min_version.to_string());
        self
    }

    /// File content: YAML front-matter when dependencies are declared, then the body.
    pub fn content(&self) -> String {
        if self.dependencies.is_empty() {
            return self.body.clone();
        }
        let mut content = String::from("---\ndependencies:\n");
        for (name, version) in &self.dependencies {
            content.push_str(&format!("  {name}: \"{version}\"\n"));
        }
        content.push_str("---\n");
        content.push_str(&self.body);
        content
    }

    /// Write under `<project>/intent/`.
    pub fn write_to(&self, project_root: &Path) -> Result<PathBuf> {
        write_file(&project_root.join("intent").join(&self.path), &self.content())
    }
}

/// A spec file under `specs/`.
#[derive(Clone, Debug)]
pub struct SpecFixture {
    pub path: String,
    pub content: String,
}

impl SpecFixture {
    pub fn new(path: &str, content: &str) -> Self {
        Self {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    /// `specs/tech-stack.md` for a Rust command-line program.
    pub fn tech_stack() -> Self {
        Self::new("tech-stack.md", "# Tech stack\n\nA Rust binary built with cargo.\n")
    }

    pub fn write_to(&self, project_root: &Path) -> Result<PathBuf> {
        write_file(&project_root.join("specs").join(&self.path), &self.content)
    }
}

/// An extension package directory.
#[derive(Clone, Debug)]
pub struct ExtensionFixture {
    pub name: String,
    pub version: String,
    /// Skill path (relative to `skills/`) to body.
    pub skills: BTreeMap<String, String>,
    /// Hook path (relative to `hooks/`) to JSON text.
    pub hooks: BTreeMap<String, String>,
}

impl ExtensionFixture {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            skills: BTreeMap::new(),
            hooks: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_skill(mut self, path: &str, body: &str) -> Self {
        self.skills.insert(path.to_string(), body.to_string());
        self
    }

    #[must_use]
    pub fn with_hook(mut self, path: &str, json: &str) -> Self {
        self.hooks.insert(path.to_string(), json.to_string());
        self
    }

    /// Write as `<dir>/<name>-<version>/`. Returns the package directory.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let package = dir.join(format!("{}-{}", self.name, self.version));
        let manifest = serde_json::json!({
            "id": self.name,
            "name": self.name,
            "version": self.version,
            "description": format!("{} conventions", self.name),
        });
        write_file(&package.join("extension.json"), &serde_json::to_string_pretty(&manifest)?)?;
        for (path, body) in &self.skills {
            write_file(&package.join("skills").join(path), body)?;
        }
        for (path, json) in &self.hooks {
            write_file(&package.join("hooks").join(path), json)?;
        }
        Ok(package)
    }
}

fn write_file(path: &Path, content: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path.to_path_buf())
}
