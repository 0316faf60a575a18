//! Prompt template manager.
//!
//! Templates are `*.md` files under a root directory. Each file may begin
//! with a YAML front matter block (`name`, `version`, `description`,
//! `variables`); the remainder is the body with `$var` / `${var}`
//! placeholders (`$$` escapes a literal dollar). Templates are cached on
//! first access; [`PromptManager::reload`] drops the cache.

mod substitute;

pub use substitute::{substitute, MissingVar};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use kg_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Front matter of a template file. Every field is optional; `name`
/// defaults to the file stem.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Declared substitution variables, for documentation and tooling.
    #[serde(default)]
    pub variables: Vec<String>,
}

struct Template {
    meta: TemplateMeta,
    body: String,
    raw: String,
}

/// Split an optional `--- … ---` YAML front matter block off a template.
/// Files without front matter (or with unparseable YAML) keep their full
/// content as the body.
fn parse_front_matter(content: &str) -> (TemplateMeta, String) {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        return (TemplateMeta::default(), content.to_string());
    }

    let after_open = &trimmed[3..];
    let Some(close_idx) = after_open.find("\n---") else {
        return (TemplateMeta::default(), content.to_string());
    };

    let yaml_str = &after_open[..close_idx];
    let body = after_open[close_idx + 4..]
        .trim_start_matches('\n')
        .to_string();

    match serde_yaml::from_str::<TemplateMeta>(yaml_str) {
        Ok(meta) => (meta, body),
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse template front matter");
            (TemplateMeta::default(), content.to_string())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PromptManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PromptManager {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl PromptManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Strict render: every placeholder must resolve.
    pub fn render(&self, name: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.get(name)?;
        substitute(&template.body, vars, MissingVar::Error).map_err(|var| {
            Error::Template(format!("template {name}: missing variable ${var}"))
        })
    }

    /// Lenient render: unresolved placeholders stay in the output.
    pub fn render_safe(&self, name: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.get(name)?;
        // Preserve mode never reports a missing variable.
        Ok(substitute(&template.body, vars, MissingVar::Preserve)
            .unwrap_or_else(|_| template.body.clone()))
    }

    /// Raw file content, front matter included.
    pub fn raw(&self, name: &str) -> Result<String> {
        Ok(self.get(name)?.raw.clone())
    }

    pub fn metadata(&self, name: &str) -> Result<TemplateMeta> {
        let template = self.get(name)?;
        let mut meta = template.meta.clone();
        if meta.name.is_none() {
            meta.name = Some(name.to_string());
        }
        Ok(meta)
    }

    /// Template names currently on disk (file stems of `*.md`).
    pub fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return names;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "md") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        names
    }

    /// Drop the cache; templates re-read from disk on next access.
    pub fn reload(&self) {
        self.cache.write().clear();
        tracing::debug!(root = %self.root.display(), "prompt cache cleared");
    }

    fn get(&self, name: &str) -> Result<Arc<Template>> {
        if let Some(template) = self.cache.read().get(name) {
            return Ok(template.clone());
        }

        let path = self.root.join(format!("{name}.md"));
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::Template(format!("template {name} ({}): {e}", path.display()))
        })?;
        let (meta, body) = parse_front_matter(&raw);
        let template = Arc::new(Template { meta, body, raw });
        self.cache
            .write()
            .insert(name.to_string(), template.clone());
        Ok(template)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_template(dir: &Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(format!("{name}.md"))).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const GREETING: &str = "---\nname: greeting\nversion: \"1.0\"\ndescription: test template\nvariables: [who]\n---\nHello, $who! Welcome to ${place}.\n";

    #[test]
    fn render_substitutes_both_placeholder_forms() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "greeting", GREETING);

        let manager = PromptManager::new(dir.path());
        let out = manager
            .render("greeting", &vars(&[("who", "mika"), ("place", "the stream")]))
            .unwrap();
        assert_eq!(out, "Hello, mika! Welcome to the stream.\n");
    }

    #[test]
    fn strict_render_errors_on_missing_variable() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "greeting", GREETING);

        let manager = PromptManager::new(dir.path());
        let err = manager
            .render("greeting", &vars(&[("who", "mika")]))
            .unwrap_err();
        assert!(err.to_string().contains("place"));
    }

    #[test]
    fn safe_render_preserves_missing_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "greeting", GREETING);

        let manager = PromptManager::new(dir.path());
        let out = manager
            .render_safe("greeting", &vars(&[("who", "mika")]))
            .unwrap();
        assert_eq!(out, "Hello, mika! Welcome to ${place}.\n");
    }

    #[test]
    fn metadata_comes_from_front_matter() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "greeting", GREETING);

        let manager = PromptManager::new(dir.path());
        let meta = manager.metadata("greeting").unwrap();
        assert_eq!(meta.version.as_deref(), Some("1.0"));
        assert_eq!(meta.variables, vec!["who"]);
    }

    #[test]
    fn missing_front_matter_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "plain", "Just $what.\n");

        let manager = PromptManager::new(dir.path());
        let out = manager.render("plain", &vars(&[("what", "text")])).unwrap();
        assert_eq!(out, "Just text.\n");
        let meta = manager.metadata("plain").unwrap();
        assert_eq!(meta.name.as_deref(), Some("plain"));
    }

    #[test]
    fn raw_includes_front_matter() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "greeting", GREETING);

        let manager = PromptManager::new(dir.path());
        assert!(manager.raw("greeting").unwrap().starts_with("---"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PromptManager::new(dir.path());
        assert!(manager.render("nope", &HashMap::new()).is_err());
    }

    #[test]
    fn reload_picks_up_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "t", "one\n");

        let manager = PromptManager::new(dir.path());
        assert_eq!(manager.render("t", &HashMap::new()).unwrap(), "one\n");

        write_template(dir.path(), "t", "two\n");
        // Cached until an explicit reload.
        assert_eq!(manager.render("t", &HashMap::new()).unwrap(), "one\n");
        manager.reload();
        assert_eq!(manager.render("t", &HashMap::new()).unwrap(), "two\n");
    }

    #[test]
    fn list_returns_sorted_stems() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "b", "x");
        write_template(dir.path(), "a", "x");
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let manager = PromptManager::new(dir.path());
        assert_eq!(manager.list(), vec!["a", "b"]);
    }
}
