//! Documents-folder scanner.
//!
//! Walks the documents root recursively and returns a [`DocumentRecord`]
//! for every file whose extension is on the allow-list. Other files are
//! skipped silently. Scanning never mutates anything, so it is safe to
//! call at any time, including between ingestion runs.

use anyhow::Result;
use chrono::{DateTime, Local};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::fingerprint::fingerprint_file;
use crate::models::{DocumentRecord, ScanReport};

/// Extensions (lower case, no dot) the vault knows how to index.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "docx", "csv", "md", "py", "js", "html", "css", "json", "tsx", "jsx", "ts",
    "yaml", "yml",
];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Lower-cased extension of `path` if it is on the allow-list.
pub fn supported_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

pub fn supported_types() -> Vec<String> {
    SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

/// Scan `root` and describe every supported file beneath it.
///
/// A missing root yields an empty report. Entries that cannot be walked
/// or stat'ed are skipped.
pub fn scan_documents(root: &Path, config: &ScanConfig) -> Result<ScanReport> {
    let exclude_set = build_globset(&config.exclude_globs)?;
    let mut files = Vec::new();

    if root.exists() {
        let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(file_type) = supported_type(path) else {
                continue;
            };

            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if exclude_set.is_match(&rel_str) {
                continue;
            }

            match file_to_record(path, rel_str, file_type) {
                Ok(record) => files.push(record),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping file");
                }
            }
        }
    }

    // Deterministic ordering across runs and platforms
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let total_size: u64 = files.iter().map(|f| f.size).sum();

    Ok(ScanReport {
        total_files: files.len(),
        total_size,
        total_size_mb: round_to(total_size as f64 / BYTES_PER_MB, 4),
        files,
        supported_types: supported_types(),
        scan_time: Local::now().to_rfc3339(),
    })
}

fn file_to_record(path: &Path, relative_path: String, file_type: String) -> Result<DocumentRecord> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();
    let modified = metadata
        .modified()
        .map(|t| DateTime::<Local>::from(t).to_rfc3339())
        .unwrap_or_default();

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(DocumentRecord {
        name,
        path: path.to_path_buf(),
        relative_path,
        size,
        size_mb: round_to(size as f64 / BYTES_PER_MB, 2),
        modified,
        file_type,
        fingerprint: fingerprint_file(path),
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn only_allow_listed_files_are_counted() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "notes.md", b"# Notes");
        write(root, "nested/deeper/data.CSV", b"a,b\n1,2\n");
        write(root, "script.py", b"print('hi')");
        write(root, "image.png", b"\x89PNG");
        write(root, "archive.zip", b"PK");
        write(root, "no_extension", b"plain");

        let report = scan_documents(root, &ScanConfig::default()).unwrap();
        assert_eq!(report.total_files, 3);
        assert_eq!(report.total_size, 7 + 8 + 11);
        let rels: Vec<&str> = report.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["nested/deeper/data.CSV", "notes.md", "script.py"]);
        assert_eq!(report.files[0].file_type, "csv");
    }

    #[test]
    fn rescan_is_identical() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", b"alpha");
        write(tmp.path(), "b/c.json", b"{}");

        let first = scan_documents(tmp.path(), &ScanConfig::default()).unwrap();
        let second = scan_documents(tmp.path(), &ScanConfig::default()).unwrap();
        assert_eq!(first.files, second.files);
        assert!(first.files.iter().all(|f| f.fingerprint.len() == 64));
    }

    #[test]
    fn missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let report = scan_documents(&tmp.path().join("nope"), &ScanConfig::default()).unwrap();
        assert_eq!(report.total_files, 0);
        assert_eq!(report.total_size_mb, 0.0);
    }

    #[test]
    fn exclude_globs_apply_to_relative_paths() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "keep.md", b"keep");
        write(tmp.path(), "drafts/skip.md", b"skip");

        let config = ScanConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            follow_symlinks: false,
        };
        let report = scan_documents(tmp.path(), &config).unwrap();
        assert_eq!(report.total_files, 1);
        assert_eq!(report.files[0].name, "keep.md");
    }

    #[test]
    fn sizes_are_rounded() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.00004, 4), 0.0);
        assert_eq!(round_to(2.5, 0), 3.0);
    }
}
