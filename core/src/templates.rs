//! Prompt templates: markdown files in a folder, used to prefill prompts.

use std::fs;
use std::path::PathBuf;

use log::debug;
use serde::Serialize;

use crate::errors::QuillError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub name: String,
    pub content: String,
}

pub trait TemplateProvider: Send + Sync {
    /// Templates found in `folder`. A blank path or a missing folder yields
    /// an empty list rather than an error.
    fn templates(&self, folder: &str) -> Result<Vec<Template>, QuillError>;
}

/// Reads `*.md` files (non-recursively) below a vault root.
pub struct FsTemplateProvider {
    root: PathBuf,
}

impl FsTemplateProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateProvider for FsTemplateProvider {
    fn templates(&self, folder: &str) -> Result<Vec<Template>, QuillError> {
        let folder = folder.trim().trim_matches('/');
        if folder.is_empty() {
            return Ok(Vec::new());
        }
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            debug!("template folder {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| QuillError::TemplateIo(e.to_string()))?;
        let mut templates = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| QuillError::TemplateIo(e.to_string()))?
                .path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = fs::read_to_string(&path)
                .map_err(|e| QuillError::TemplateIo(format!("{}: {e}", path.display())))?;
            templates.push(Template {
                name: name.to_string(),
                content,
            });
        }
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }
}
