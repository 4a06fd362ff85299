//! Local prompt templates stored one file per template.
//!
//! File names are derived from display names: spaces become `__`, any other
//! character outside `[A-Za-z0-9_]` becomes `-`. The reverse mapping turns both
//! `__` and `-` into spaces, so it is lossy for names containing punctuation.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::config_dir;
use crate::constants::{config, templates};
use crate::error::{Error, IoResultExt, Result};

pub fn normalize_template_name(name: &str) -> String {
    name.replace(' ', templates::SPACE_REPLACEMENT)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                templates::INVALID_CHAR_REPLACEMENT
            }
        })
        .collect()
}

pub fn denormalize_template_name(stem: &str) -> String {
    stem.replace(templates::SPACE_REPLACEMENT, " ")
        .chars()
        .map(|c| if c == templates::INVALID_CHAR_REPLACEMENT { ' ' } else { c })
        .collect()
}

pub fn is_server_template(name: &str) -> bool {
    name.ends_with(templates::SERVER_SUFFIX)
}

/// Local names plus server names (suffixed), sorted with "server" names last
pub fn merged_names<'a>(
    local: impl IntoIterator<Item = &'a String>,
    server: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let mut names: Vec<String> = local.into_iter().cloned().collect();
    names.extend(
        server
            .into_iter()
            .map(|name| format!("{name}{}", templates::SERVER_SUFFIX)),
    );
    names.sort_by(|a, b| {
        let a_server = a.contains("server");
        let b_server = b.contains("server");
        a_server.cmp(&b_server).then_with(|| a.cmp(b))
    });
    names.dedup();
    names
}

#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    dir: PathBuf,
}

impl TemplateLibrary {
    pub fn default_dir() -> PathBuf {
        config_dir().join(config::TEMPLATES_DIR)
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(normalize_template_name(name))
            .with_extension(config::TEMPLATE_EXTENSION)
    }

    /// Display name → content for every readable template file
    pub fn list_local(&self) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(dir = %self.dir.display(), "Templates directory does not exist");
                return found;
            }
            Err(err) => {
                error!(dir = %self.dir.display(), error = %err, "Failed to read templates directory");
                return found;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir()
                || path.extension().and_then(|e| e.to_str()) != Some(config::TEMPLATE_EXTENSION)
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match fs::read_to_string(&path) {
                Ok(content) => {
                    found.insert(denormalize_template_name(stem), content);
                }
                Err(err) => {
                    error!(file = %path.display(), error = %err, "Failed to read template file");
                }
            }
        }

        info!(count = found.len(), "Loaded local templates");
        found
    }

    pub fn save(&self, name: &str, content: &str) -> Result<PathBuf> {
        if name.trim().is_empty() {
            return Err(Error::Validation("template name cannot be empty".to_string()));
        }
        if content.is_empty() {
            return Err(Error::Validation("template content cannot be empty".to_string()));
        }

        fs::create_dir_all(&self.dir).with_path("create templates directory", &self.dir)?;
        let path = self.file_for(name);
        fs::write(&path, content).with_path("write template", &path)?;

        info!(name = %name, file = %path.display(), "Saved template");
        Ok(path)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        if is_server_template(name) {
            return Err(Error::Validation(format!(
                "server-side template '{name}' cannot be deleted"
            )));
        }

        let path = self.file_for(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(name = %name, "Deleted template");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::template_not_found(name)),
            Err(err) => Err(err).with_path("delete template", &path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_punctuation_scenario() {
        assert_eq!(normalize_template_name("My Template!"), "My__Template-");
        assert_eq!(denormalize_template_name("My__Template-"), "My Template ");
    }

    #[test]
    fn test_normalize_plain_names_roundtrip() {
        for name in ["chatml", "Llama 3 Instruct", "mistral_v2"] {
            assert_eq!(denormalize_template_name(&normalize_template_name(name)), name);
        }
    }

    #[test]
    fn test_normalize_non_ascii() {
        assert_eq!(normalize_template_name("café v1.2"), "caf-__v1-2");
    }

    #[test]
    fn test_save_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let library = TemplateLibrary::new(dir.path().join("templates"));

        assert!(library.list_local().is_empty());

        let path = library.save("My Chat", "{{ messages }}").unwrap();
        assert_eq!(path.file_name().unwrap(), "My__Chat.txt");

        let listed = library.list_local();
        assert_eq!(listed.get("My Chat").map(String::as_str), Some("{{ messages }}"));

        library.delete("My Chat").unwrap();
        assert!(library.list_local().is_empty());
        assert!(library.delete("My Chat").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.md"), "x").unwrap();
        fs::create_dir(dir.path().join("sub.txt")).unwrap();
        fs::write(dir.path().join("alpaca.txt"), "### Instruction").unwrap();

        let library = TemplateLibrary::new(dir.path());
        let names: Vec<_> = library.list_local().into_keys().collect();
        assert_eq!(names, vec!["alpaca".to_string()]);
    }

    #[test]
    fn test_save_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let library = TemplateLibrary::new(dir.path());
        assert!(matches!(library.save("", "x"), Err(Error::Validation(_))));
        assert!(matches!(library.save("x", ""), Err(Error::Validation(_))));
    }

    #[test]
    fn test_server_templates_not_deletable() {
        let dir = tempfile::tempdir().unwrap();
        let library = TemplateLibrary::new(dir.path());
        assert!(matches!(
            library.delete("chatml (server)"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_merged_names_server_last() {
        let local = vec!["zephyr".to_string(), "alpaca".to_string()];
        let server = vec!["chatml".to_string()];

        assert_eq!(
            merged_names(&local, &server),
            vec!["alpaca", "zephyr", "chatml (server)"]
        );
    }
}
