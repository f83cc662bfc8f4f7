//! Key-value model of EddyPro project files.
//!
//! `*.eddypro` and `*.metadata` files are INI-style documents: `[Section]`
//! headers followed by `key=value` lines. The model keeps every line in
//! order so that a rendered file differs from its template only in the
//! values that were set.

use crate::error::{FluxRunError, Result};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Section(String),
    Entry { key: String, value: String },
    Other(String),
}

/// Parsed project file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    lines: Vec<Line>,
    line_ending: &'static str,
}

impl ProjectFile {
    pub fn parse(text: &str) -> Self {
        let line_ending = if text.contains("\r\n") { "\r\n" } else { "\n" };

        let lines = text
            .lines()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.starts_with('[') && trimmed.ends_with(']') {
                    Line::Section(trimmed[1..trimmed.len() - 1].to_string())
                } else if let Some((key, value)) = raw.split_once('=') {
                    Line::Entry {
                        key: key.trim().to_string(),
                        value: value.to_string(),
                    }
                } else {
                    Line::Other(raw.to_string())
                }
            })
            .collect();

        Self { lines, line_ending }
    }

    /// Read a template from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(FluxRunError::TemplateMissing {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|e| FluxRunError::io_at(path, e))?;
        Ok(Self::parse(&text))
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Replace the value of every `key` line, returning how many were changed
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> usize {
        let value = value.into();
        let mut replaced = 0;
        for line in &mut self.lines {
            if let Line::Entry { key: k, value: v } = line {
                if k == key {
                    *v = value.clone();
                    replaced += 1;
                }
            }
        }
        replaced
    }

    /// Names of all sections in order
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            Line::Section(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Section(name) => {
                    out.push('[');
                    out.push_str(name);
                    out.push(']');
                }
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Other(text) => out.push_str(text),
            }
            out.push_str(self.line_ending);
        }
        out
    }

    /// Write the rendered document to a fresh file
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render()).map_err(|e| FluxRunError::io_at(path, e))
    }
}

/// Path as written into project files: forward slashes, no trailing separator
pub fn config_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    if trimmed.is_empty() {
        normalized
    } else {
        trimmed.to_string()
    }
}
