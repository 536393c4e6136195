//! Prompt templates.
//!
//! Every prompt starts with a `# task: <call-site>` line. The body rendered
//! from a template is the *stable* part of the prompt; the existing contents of
//! a target file are appended separately so incremental checks can compare
//! prompts without them.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tera::{Context as TeraContext, Tera};

/// The places in a build that ask for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    Compile,
    SpecsToIntent,
    TechStack,
    Index,
    Analyze,
}

impl CallSite {
    pub const ALL: [Self; 5] = [Self::Compile, Self::SpecsToIntent, Self::TechStack, Self::Index, Self::Analyze];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::SpecsToIntent => "specs-to-intent",
            Self::TechStack => "define-tech-stack",
            Self::Index => "index",
            Self::Analyze => "analyze-intent",
        }
    }

    /// Read the call site from a prompt's `# task:` line.
    #[must_use]
    pub fn from_prompt(prompt: &str) -> Option<Self> {
        let task = prompt.lines().next()?.strip_prefix("# task:")?.trim();
        Self::ALL.into_iter().find(|site| site.as_str() == task)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    call_site: CallSite,
    stable: String,
    volatile: Option<String>,
}

impl Prompt {
    #[must_use]
    pub const fn new(call_site: CallSite, stable: String) -> Self {
        Self {
            call_site,
            stable,
            volatile: None,
        }
    }

    /// Attach the current contents of the target file.
    #[must_use]
    pub fn with_existing_source(mut self, source: &str) -> Self {
        self.volatile = Some(format!(
            "## Existing target source\n\nUpdate this file rather than starting over.\n\n```\n{source}\n```\n"
        ));
        self
    }

    /// Attach files that already exist under a heading.
    #[must_use]
    pub fn with_existing_files(mut self, heading: &str, files: &[PromptFile]) -> Self {
        if files.is_empty() {
            return self;
        }
        let mut section = format!("## {heading}\n");
        for file in files {
            section.push_str(&format!("\n### {}\n\n{}\n", file.path, file.text));
        }
        self.volatile = Some(section);
        self
    }

    #[must_use]
    pub const fn call_site(&self) -> CallSite {
        self.call_site
    }

    /// The prompt without the existing-content section.
    #[must_use]
    pub fn stable(&self) -> &str {
        &self.stable
    }

    /// The prompt sent to the provider.
    #[must_use]
    pub fn full(&self) -> String {
        match &self.volatile {
            Some(section) => format!("{}\n{section}", self.stable),
            None => self.stable.clone(),
        }
    }
}

/// A file handed to a prompt as context.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptFile {
    pub path: String,
    pub text: String,
}

/// Context for [`CallSite::Compile`].
#[derive(Debug, Clone, Serialize)]
pub struct CompilePromptContext {
    pub target_path: String,
    pub intent_path: String,
    pub intent_text: String,
    pub tech_stack: Option<String>,
    pub skills: Vec<PromptFile>,
    pub context_files: Vec<PromptFile>,
    pub declared_dependencies: BTreeMap<String, String>,
}

/// Context for [`CallSite::SpecsToIntent`]. Existing intent files go in the
/// volatile section via [`Prompt::with_existing_files`].
#[derive(Debug, Clone, Serialize)]
pub struct SpecsToIntentPromptContext {
    pub specs: Vec<PromptFile>,
}

/// Context for [`CallSite::TechStack`].
#[derive(Debug, Clone, Serialize)]
pub struct TechStackPromptContext {
    pub spec_text: String,
    pub available_extensions: Vec<String>,
}

/// Context for [`CallSite::Index`].
#[derive(Debug, Clone, Serialize)]
pub struct IndexPromptContext {
    pub intent_path: String,
    pub intent_text: String,
}

/// Context for [`CallSite::Analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzePromptContext {
    pub intent_files: Vec<PromptFile>,
    pub tech_stack: Option<String>,
}

const COMPILE_TEMPLATE: &str = r#"# task: compile

Translate the intent file `{{ intent_path }}` into the complete source file `{{ target_path }}`.

Reply with one JSON object:
{"targetSource": "<complete file contents>", "dependencyDeltas": [{"kind": "set", "packageName": "<name>", "minVersion": "<semver requirement>"}]}
Use "kind": "delete" for packages the file no longer needs.
When the intent cannot be compiled, reply {"errors": ["<reason>"]} instead.
{% if tech_stack %}
## Tech stack

{{ tech_stack }}
{% endif %}{% if skills %}
## Skills
{% for skill in skills %}
### {{ skill.path }}

{{ skill.text }}
{% endfor %}{% endif %}{% if context_files %}
## Related files
{% for file in context_files %}
### {{ file.path }}

{{ file.text }}
{% endfor %}{% endif %}{% if declared_dependencies %}
## Declared dependencies
{% for name, version in declared_dependencies %}
- {{ name }} {{ version }}
{%- endfor %}
{% endif %}
## Intent

{{ intent_text }}
"#;

const SPECS_TO_INTENT_TEMPLATE: &str = r#"# task: specs-to-intent

Turn the specification files below into intent files: one pseudo-code Markdown file per
source file, named `<relative source path>.md`.

Reply with one JSON object:
{"fileOps": [{"op": "set", "path": "<intent path>", "content": "<markdown>"}, {"op": "delete", "path": "<intent path>"}]}
Only emit operations for intent files that must change.

## Specifications
{% for spec in specs %}
### {{ spec.path }}

{{ spec.text }}
{% endfor %}"#;

const TECH_STACK_TEMPLATE: &str = r#"# task: define-tech-stack

Derive a tech stack manifest from the description below.

Reply with one JSON object:
{"tool": "<build tool>", "runtimes": {"<runtime>": {"<package>": "<semver requirement>"}}, "extensions": {"<extension>": "<minimum version>"}}
{% if available_extensions %}
Available extensions: {{ available_extensions | join(sep=", ") }}
{% endif %}
## Tech stack description

{{ spec_text }}
"#;

const INDEX_TEMPLATE: &str = r#"# task: index

Summarise the intent file `{{ intent_path }}` and list the symbols it defines.

Reply with one JSON object:
{"summary": "<one paragraph>", "symbols": [{"name": "<symbol>", "kind": "<function|type|constant|module>"}]}

## Intent

{{ intent_text }}
"#;

const ANALYZE_TEMPLATE: &str = r#"# task: analyze-intent

Review the intent files below for gaps, contradictions and missing error handling.

Reply with one JSON object:
{"suggestions": [{"intentPath": "<intent path>", "text": "<suggestion>"}]}
Return an empty list when nothing needs attention.
{% if tech_stack %}
## Tech stack

{{ tech_stack }}
{% endif %}
## Intent files
{% for file in intent_files %}
### {{ file.path }}

{{ file.text }}
{% endfor %}"#;

/// Registered prompt templates.
pub struct PromptTemplates {
    tera: Tera,
}

impl PromptTemplates {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (CallSite::Compile.as_str(), COMPILE_TEMPLATE),
            (CallSite::SpecsToIntent.as_str(), SPECS_TO_INTENT_TEMPLATE),
            (CallSite::TechStack.as_str(), TECH_STACK_TEMPLATE),
            (CallSite::Index.as_str(), INDEX_TEMPLATE),
            (CallSite::Analyze.as_str(), ANALYZE_TEMPLATE),
        ])
        .context("Failed to register prompt templates")?;
        Ok(Self {
            tera,
        })
    }

    /// Render the template for `call_site` with `context`.
    pub fn render<T: Serialize>(&self, call_site: CallSite, context: &T) -> Result<Prompt> {
        let context = TeraContext::from_serialize(context)
            .with_context(|| format!("Failed to build prompt context for {call_site}"))?;
        let stable = self
            .tera
            .render(call_site.as_str(), &context)
            .with_context(|| format!("Failed to render {call_site} prompt"))?;
        Ok(Prompt::new(call_site, stable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_context() -> CompilePromptContext {
        CompilePromptContext {
            target_path: "src/main.rs".to_string(),
            intent_path: "src/main.rs.md".to_string(),
            intent_text: "print <hello> & exit".to_string(),
            tech_stack: Some("{\"tool\":\"cargo\"}".to_string()),
            skills: vec![PromptFile {
                path: "rust@1.0.0/style.md".to_string(),
                text: "Use rustfmt".to_string(),
            }],
            context_files: Vec::new(),
            declared_dependencies: [("anyhow".to_string(), "1".to_string())].into_iter().collect(),
        }
    }

    #[test]
    fn test_render_compile() {
        let templates = PromptTemplates::new().unwrap();
        let prompt = templates.render(CallSite::Compile, &compile_context()).unwrap();

        let text = prompt.stable();
        assert!(text.starts_with("# task: compile\n"));
        assert!(text.contains("`src/main.rs`"));
        assert!(text.contains("print <hello> & exit"), "templates must not escape");
        assert!(text.contains("Use rustfmt"));
        assert!(text.contains("- anyhow 1"));
        assert!(!text.contains("Related files"));
        assert_eq!(CallSite::from_prompt(text), Some(CallSite::Compile));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let templates = PromptTemplates::new().unwrap();
        let a = templates.render(CallSite::Compile, &compile_context()).unwrap();
        let b = templates.render(CallSite::Compile, &compile_context()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_existing_source_is_volatile() {
        let prompt = Prompt::new(CallSite::Compile, "# task: compile\nbody\n".to_string());
        let with_source = prompt.clone().with_existing_source("fn main() {}");

        assert_eq!(prompt.stable(), with_source.stable());
        assert_ne!(prompt.full(), with_source.full());
        assert!(with_source.full().contains("fn main() {}"));

        let files = [PromptFile {
            path: "a.rs.md".to_string(),
            text: "old intent".to_string(),
        }];
        let with_files = prompt.clone().with_existing_files("Existing intent files", &files);
        assert_eq!(with_files.stable(), prompt.stable());
        assert!(with_files.full().contains("### a.rs.md"));
        assert_eq!(prompt.clone().with_existing_files("Nothing", &[]), prompt);
    }

    #[test]
    fn test_every_call_site_renders() {
        let templates = PromptTemplates::new().unwrap();
        let file = PromptFile {
            path: "a.md".to_string(),
            text: "text".to_string(),
        };

        let specs = templates
            .render(
                CallSite::SpecsToIntent,
                &SpecsToIntentPromptContext {
                    specs: vec![file.clone()],
                },
            )
            .unwrap();
        let stack = templates
            .render(
                CallSite::TechStack,
                &TechStackPromptContext {
                    spec_text: "Rust with tokio".to_string(),
                    available_extensions: vec!["rust".to_string()],
                },
            )
            .unwrap();
        let index = templates
            .render(
                CallSite::Index,
                &IndexPromptContext {
                    intent_path: "a.md".to_string(),
                    intent_text: "text".to_string(),
                },
            )
            .unwrap();
        let analyze = templates
            .render(
                CallSite::Analyze,
                &AnalyzePromptContext {
                    intent_files: vec![file],
                    tech_stack: None,
                },
            )
            .unwrap();

        for (prompt, site) in [
            (specs, CallSite::SpecsToIntent),
            (stack, CallSite::TechStack),
            (index, CallSite::Index),
            (analyze, CallSite::Analyze),
        ] {
            assert_eq!(CallSite::from_prompt(prompt.stable()), Some(site));
            assert_eq!(prompt.call_site(), site);
        }
    }

    #[test]
    fn test_from_prompt_unknown() {
        assert_eq!(CallSite::from_prompt("# task: dance"), None);
        assert_eq!(CallSite::from_prompt(""), None);
    }
}
