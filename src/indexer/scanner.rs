// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Project file scanner
//!
//! A pull-based walk over the project tree. Entries are produced one at a
//! time as the caller advances the iterator, so dropping it mid-scan simply
//! stops the walk. `.gitignore` rules, the ignore-directory list, the
//! extension allow-list and the binary deny-list are applied while walking.

use std::fs::File;
use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ignore::{Walk, WalkBuilder};
use serde::{Deserialize, Serialize};

use crate::config::IndexerSettings;
use crate::error::{LoomError, Result};
use crate::utils::relative_path_string;

/// Bytes inspected by [`is_text_file`]
pub const TEXT_PROBE_BYTES: usize = 8 * 1024;

/// What a scanned path is, judged without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One scanned path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// Relative to the scan root, `/`-separated
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlink_target: Option<PathBuf>,
}

/// Progress report emitted once per yielded entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub current: usize,
    pub total: usize,
    pub path: String,
}

type ProgressFn = Box<dyn FnMut(&ScanProgress) + Send>;

/// Filters applied while walking
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub extensions: Vec<String>,
    pub ignore_dirs: Vec<String>,
    pub binary_extensions: Vec<String>,
    pub max_file_size: u64,
    pub respect_gitignore: bool,
    /// Yield directory entries as well as files and symlinks
    pub include_directories: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&IndexerSettings::default())
    }
}

impl From<&IndexerSettings> for ScanOptions {
    fn from(settings: &IndexerSettings) -> Self {
        Self {
            extensions: lowercase_all(&settings.extensions),
            ignore_dirs: settings.ignore_dirs.clone(),
            binary_extensions: lowercase_all(&settings.binary_extensions),
            max_file_size: settings.max_file_size,
            respect_gitignore: settings.respect_gitignore,
            include_directories: false,
        }
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim_start_matches('.').to_lowercase())
        .collect()
}

impl ScanOptions {
    fn extension_of(path: &Path) -> Option<String> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Whether a file path passes the extension filters
    pub fn accepts_file(&self, path: &Path) -> bool {
        match Self::extension_of(path) {
            Some(ext) => {
                !self.binary_extensions.contains(&ext)
                    && (self.extensions.is_empty() || self.extensions.contains(&ext))
            }
            None => self.extensions.is_empty(),
        }
    }
}

/// Walks a project root
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(root: impl AsRef<Path>, options: ScanOptions) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    fn walker(&self) -> Walk {
        let ignore_dirs = self.options.ignore_dirs.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(false)
            .follow_links(false)
            .git_ignore(self.options.respect_gitignore)
            .git_global(false)
            .git_exclude(self.options.respect_gitignore)
            .require_git(false)
            .ignore(self.options.respect_gitignore)
            .sort_by_file_name(|a, b| a.cmp(b));
        builder.filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !ignore_dirs.iter().any(|ignored| ignored.as_str() == name)
        });
        builder.build()
    }

    /// Start a scan. Each call walks the tree afresh.
    pub fn scan(&self) -> ScanIter {
        ScanIter {
            walk: self.walker(),
            root: self.root.clone(),
            options: self.options.clone(),
            yielded: 0,
            total: 0,
            progress: None,
        }
    }

    /// Start a scan that reports progress for every yielded entry.
    ///
    /// The total is established by a metadata-only counting pass first.
    pub fn scan_with_progress<F>(&self, on_progress: F) -> ScanIter
    where
        F: FnMut(&ScanProgress) + Send + 'static,
    {
        let total = self.scan().count();
        ScanIter {
            total,
            progress: Some(Box::new(on_progress)),
            ..self.scan()
        }
    }

    /// Collect every regular file the scan yields.
    pub fn files(&self) -> Vec<ScanEntry> {
        self.scan().filter(|e| e.kind == EntryKind::File).collect()
    }
}

/// Lazy iterator over scanned entries
pub struct ScanIter {
    walk: Walk,
    root: PathBuf,
    options: ScanOptions,
    yielded: usize,
    total: usize,
    progress: Option<ProgressFn>,
}

impl ScanIter {
    fn describe(&self, path: &Path) -> Result<Option<ScanEntry>> {
        let scan_err = |e: std::io::Error| LoomError::ScanIo {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let metadata = std::fs::symlink_metadata(path).map_err(scan_err)?;
        let file_type = metadata.file_type();

        let (kind, symlink_target) = if file_type.is_symlink() {
            (EntryKind::Symlink, Some(std::fs::read_link(path).map_err(scan_err)?))
        } else if file_type.is_dir() {
            (EntryKind::Directory, None)
        } else {
            (EntryKind::File, None)
        };

        match kind {
            EntryKind::Directory if !self.options.include_directories => return Ok(None),
            EntryKind::File | EntryKind::Symlink if !self.options.accepts_file(path) => {
                return Ok(None)
            }
            EntryKind::File if metadata.len() > self.options.max_file_size => {
                tracing::debug!(
                    "Skipping large file {} ({} bytes)",
                    path.display(),
                    metadata.len()
                );
                return Ok(None);
            }
            _ => {}
        }

        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(ScanEntry {
            path: relative_path_string(&self.root, path),
            kind,
            size: metadata.len(),
            last_modified,
            symlink_target,
        }))
    }

    fn report(&mut self, entry: &ScanEntry) {
        let Some(callback) = self.progress.as_mut() else {
            return;
        };
        let report = ScanProgress {
            current: self.yielded,
            total: self.total.max(self.yielded),
            path: entry.path.clone(),
        };
        if catch_unwind(AssertUnwindSafe(|| callback(&report))).is_err() {
            tracing::warn!("Scan progress callback panicked at {}", report.path);
        }
    }
}

impl Iterator for ScanIter {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            let dent = match self.walk.next()? {
                Ok(dent) => dent,
                Err(e) => {
                    tracing::warn!("Skipping unreadable path: {}", e);
                    continue;
                }
            };
            if dent.depth() == 0 {
                continue;
            }

            match self.describe(dent.path()) {
                Ok(Some(entry)) => {
                    self.yielded += 1;
                    self.report(&entry);
                    return Some(entry);
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("{}", e);
                    continue;
                }
            }
        }
    }
}

/// Whether the first 8 KiB of a file contain no null byte.
pub fn is_text_file(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; TEXT_PROBE_BYTES];
    let mut filled = 0;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(!buffer[..filled].contains(&0))
}
