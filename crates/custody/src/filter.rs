//! Inclusion filter: which paths are candidates for ingestion

use crate::config::SyncConfig;
use std::path::Path;

/// Decides whether a discovered file is a candidate for ingestion.
///
/// A file is excluded when its name starts with the hidden prefix, when
/// its extension is the in-progress marker, or when an allow-list is set
/// and does not contain its extension. Extensions compare
/// case-insensitively in ".ext" form.
#[derive(Debug, Clone)]
pub struct InclusionFilter {
    hidden_prefix: char,
    partial_suffix: String,
    allowed_extensions: Vec<String>,
}

impl InclusionFilter {
    pub fn new(hidden_prefix: char, partial_suffix: &str, allowed_extensions: &[String]) -> Self {
        Self {
            hidden_prefix,
            partial_suffix: normalize_extension(partial_suffix),
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.hidden_prefix,
            &config.partial_suffix,
            &config.file_extensions,
        )
    }

    /// True if `name` is a hidden file or directory name.
    pub fn is_hidden(&self, name: &str) -> bool {
        name.starts_with(self.hidden_prefix)
    }

    /// Apply the inclusion rules to a file path.
    pub fn includes(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if name.is_empty() || self.is_hidden(&name) {
            return false;
        }

        let ext = extension_of(path);
        if ext.as_deref() == Some(self.partial_suffix.as_str()) {
            return false;
        }

        allows_extension(&self.allowed_extensions, path)
    }
}

/// Lowercase ".ext" form of a path's extension, if it has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// Lowercase an extension and make sure it starts with a dot.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// Membership test against an allow-list; an empty list allows everything.
pub fn allows_extension(allowed: &[String], path: &Path) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match extension_of(path) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}
