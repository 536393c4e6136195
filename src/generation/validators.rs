//! Output validators, one per generation call site.
//!
//! A validator inspects the structured payload of a generation and returns the
//! reason it is unacceptable. Rejected payloads are retried, never cached.

use semver::VersionReq;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Validation result: `Err` carries the rejection reason.
pub type Validation = Result<(), String>;

fn package_name_pattern() -> Option<&'static regex::Regex> {
    static PATTERN: OnceLock<Option<regex::Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"^[@A-Za-z0-9][A-Za-z0-9._/@-]*$").ok()).as_ref()
}

/// Whether `name` is acceptable as a package name.
#[must_use]
pub fn is_valid_package_name(name: &str) -> bool {
    package_name_pattern().is_some_and(|pattern| pattern.is_match(name))
}

/// Check a version requirement string.
pub fn version_requirement(requirement: &str) -> Validation {
    VersionReq::parse(requirement.trim())
        .map(|_| ())
        .map_err(|e| format!("'{requirement}' is not a valid version requirement: {e}"))
}

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, String> {
    value.as_object().ok_or_else(|| format!("{what} must be an object"))
}

fn string_field<'a>(map: &'a Map<String, Value>, field: &str, what: &str) -> Result<&'a str, String> {
    match map.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(format!("{what}.{field} must be a string")),
        None => Err(format!("{what} is missing '{field}'")),
    }
}

fn optional_array<'a>(map: &'a Map<String, Value>, field: &str) -> Result<&'a [Value], String> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(format!("'{field}' must be an array")),
    }
}

/// One dependency delta: `{kind: set|delete, packageName, minVersion?, runtime?}`.
pub fn dependency_delta(entry: &Value) -> Validation {
    let map = object(entry, "dependency entry")?;
    let kind = string_field(map, "kind", "dependency entry")?;
    if kind != "set" && kind != "delete" {
        return Err(format!("dependency kind '{kind}' must be 'set' or 'delete'"));
    }

    let name = string_field(map, "packageName", "dependency entry")?;
    if !is_valid_package_name(name) {
        return Err(format!("'{name}' is not a valid package name"));
    }

    match map.get("minVersion") {
        None | Some(Value::Null) => {}
        Some(Value::String(requirement)) => version_requirement(requirement)?,
        Some(_) => return Err(format!("minVersion of '{name}' must be a string")),
    }

    match map.get("runtime") {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(format!("runtime of '{name}' must be a string")),
    }
}

/// Compile output: `targetSource` unless `errors` is non-empty, plus valid deltas.
pub fn compile_output(value: &Value) -> Validation {
    let map = object(value, "compile output")?;

    let errors = optional_array(map, "errors")?;
    if errors.is_empty() {
        string_field(map, "targetSource", "compile output")?;
    }

    for entry in optional_array(map, "dependencyDeltas")? {
        dependency_delta(entry)?;
    }
    Ok(())
}

/// Whether `path` is a safe relative Markdown path.
#[must_use]
pub fn is_safe_markdown_path(path: &str) -> bool {
    let path = path.replace('\\', "/");
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains(':')
        && path.ends_with(".md")
        && path.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Intent file operations: every `fileOps[i]` is a set (with content) or delete.
pub fn intent_file_ops(value: &Value) -> Validation {
    let map = object(value, "intent file operations")?;
    let ops = match map.get("fileOps") {
        Some(Value::Array(ops)) => ops,
        _ => return Err("'fileOps' must be an array".to_string()),
    };

    for (i, op) in ops.iter().enumerate() {
        let what = format!("fileOps[{i}]");
        let op_map = object(op, &what)?;
        let kind = string_field(op_map, "op", &what)?;
        let path = string_field(op_map, "path", &what)?;
        if !is_safe_markdown_path(path) {
            return Err(format!("{what}.path '{path}' must be a relative .md path"));
        }
        match kind {
            "set" => {
                string_field(op_map, "content", &what)?;
            }
            "delete" => {}
            other => return Err(format!("{what}.op '{other}' must be 'set' or 'delete'")),
        }
    }
    Ok(())
}

/// Tech stack manifest: `tool`, `runtimes` of package requirements, `extensions`.
pub fn tech_stack_manifest(value: &Value) -> Validation {
    let map = object(value, "tech stack manifest")?;
    let tool = string_field(map, "tool", "tech stack manifest")?;
    if tool.trim().is_empty() {
        return Err("tech stack manifest 'tool' must not be empty".to_string());
    }

    match map.get("runtimes") {
        None | Some(Value::Null) => {}
        Some(Value::Object(runtimes)) => {
            for (runtime, packages) in runtimes {
                let packages = object(packages, &format!("runtimes.{runtime}"))?;
                for (name, requirement) in packages {
                    if !is_valid_package_name(name) {
                        return Err(format!("'{name}' is not a valid package name"));
                    }
                    let requirement = requirement
                        .as_str()
                        .ok_or_else(|| format!("runtimes.{runtime}.{name} must be a string"))?;
                    version_requirement(requirement)?;
                }
            }
        }
        Some(_) => return Err("'runtimes' must be an object".to_string()),
    }

    match map.get("extensions") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Object(extensions)) => {
            for (name, requirement) in extensions {
                let requirement =
                    requirement.as_str().ok_or_else(|| format!("extensions.{name} must be a string"))?;
                version_requirement(requirement)?;
            }
            Ok(())
        }
        Some(_) => Err("'extensions' must be an object".to_string()),
    }
}

/// Index output: `summary` and `symbols[]` with `name` and `kind`.
pub fn index_output(value: &Value) -> Validation {
    let map = object(value, "index output")?;
    string_field(map, "summary", "index output")?;
    for (i, symbol) in optional_array(map, "symbols")?.iter().enumerate() {
        let what = format!("symbols[{i}]");
        let symbol = object(symbol, &what)?;
        string_field(symbol, "name", &what)?;
        string_field(symbol, "kind", &what)?;
    }
    Ok(())
}

/// Suggestions over a known set of intent files.
pub fn suggestions(known_paths: &BTreeSet<String>) -> impl Fn(&Value) -> Validation + '_ {
    move |value| {
        let map = object(value, "analysis output")?;
        let items = match map.get("suggestions") {
            Some(Value::Array(items)) => items,
            _ => return Err("'suggestions' must be an array".to_string()),
        };
        for (i, item) in items.iter().enumerate() {
            let what = format!("suggestions[{i}]");
            let item = object(item, &what)?;
            let text = string_field(item, "text", &what)?;
            if text.trim().is_empty() {
                return Err(format!("{what}.text must not be empty"));
            }
            let path = string_field(item, "intentPath", &what)?;
            if !known_paths.contains(path) {
                return Err(format!("{what}.intentPath '{path}' is not a known intent file"));
            }
        }
        Ok(())
    }
}
