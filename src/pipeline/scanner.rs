//! Project scanner: source files under a directory, by extension

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::types::{Result, ScoutError};

pub struct SourceScanner {
    root: PathBuf,
    extensions: Vec<String>,
    skipped_dirs: Vec<String>,
    exclude: Vec<glob::Pattern>,
}

impl SourceScanner {
    pub fn new<P: AsRef<Path>>(root: P, config: &PipelineConfig) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extensions: config
                .source_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            skipped_dirs: config.skipped_dirs.clone(),
            exclude: Vec::new(),
        }
    }

    /// Glob patterns matched against root-relative paths. Invalid patterns
    /// are dropped with a warning.
    pub fn with_exclude(mut self, patterns: &[String]) -> Self {
        self.exclude = patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid exclude pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        self
    }

    /// Matching files, sorted by path
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(ScoutError::Validation(format!(
                "Project path is not a directory: {}",
                self.root.display()
            )));
        }

        let skipped = self.skipped_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !name.starts_with('.') && !skipped.iter().any(|d| *d == name)
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if self.has_source_extension(path) && !self.is_excluded(path) {
                files.push(path.to_path_buf());
            }
        }

        debug!("Scanned {} source files under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        self.exclude.iter().any(|p| p.matches_path(rel))
    }
}
